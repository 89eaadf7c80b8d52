// src/appointments/mod.rs

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::Serialize;

use crate::db::StoreError;

pub mod service;

pub type AppointmentId = i64;

const MAX_REASON_CHARS: usize = 255;

/* ============================================================
   Types
   ============================================================ */

/// The (practitioner, date, start time) triple that at most one
/// enabled appointment may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot {
    pub practitioner_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientBrief {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PractitionerBrief {
    pub id: i64,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Appointment {
    pub id: AppointmentId,
    pub reason: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub patient: PatientBrief,
    pub practitioner: PractitionerBrief,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn slot(&self) -> Slot {
        Slot {
            practitioner_id: self.practitioner.id,
            date: self.date,
            start_time: self.start_time,
        }
    }
}

/// Validated field values ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct AppointmentDraft {
    pub reason: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub patient_id: i64,
    pub practitioner_id: i64,
}

impl AppointmentDraft {
    pub fn slot(&self) -> Slot {
        Slot {
            practitioner_id: self.practitioner_id,
            date: self.date,
            start_time: self.start_time,
        }
    }
}

/// Raw create/update fields as received. `None` means absent (or JSON null).
#[derive(Debug, Clone, Default)]
pub struct AppointmentInput {
    pub reason: Option<String>,
    pub date: Option<String>,
    pub patient: Option<String>,
    pub practitioner: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    /// Wire names of fields that were present with the wrong JSON type.
    pub mistyped: Vec<&'static str>,
}

/// Every field present, nothing parsed yet.
#[derive(Debug, Clone)]
pub struct RequiredInput {
    pub reason: String,
    pub date: String,
    pub patient: String,
    pub practitioner: String,
    pub start_time: String,
    pub end_time: String,
}

/* ============================================================
   Errors
   ============================================================ */

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("missing fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("appointment not found")]
    NotFound,
    #[error("slot already booked")]
    SlotConflict,
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AppointmentError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::SlotTaken => AppointmentError::SlotConflict,
            other => AppointmentError::Store(other),
        }
    }
}

fn invalid(detail: impl Into<String>) -> AppointmentError {
    AppointmentError::ValidationFailed(detail.into())
}

/* ============================================================
   Input handling
   ============================================================ */

impl AppointmentInput {
    /// Presence check, then the type check; runs before any field is parsed.
    /// Field names are the wire names.
    pub fn require(self) -> Result<RequiredInput, AppointmentError> {
        let mut missing = Vec::new();
        if self.reason.is_none() {
            missing.push("motif");
        }
        if self.date.is_none() {
            missing.push("date");
        }
        if self.patient.is_none() {
            missing.push("patient");
        }
        if self.practitioner.is_none() {
            missing.push("medecin");
        }
        if self.start_time.is_none() {
            missing.push("heureDebut");
        }
        if self.end_time.is_none() {
            missing.push("heureFin");
        }

        match self {
            AppointmentInput {
                reason: Some(reason),
                date: Some(date),
                patient: Some(patient),
                practitioner: Some(practitioner),
                start_time: Some(start_time),
                end_time: Some(end_time),
                mistyped,
            } => {
                if !mistyped.is_empty() {
                    return Err(invalid(format!("wrong type for {}", mistyped.join(", "))));
                }
                Ok(RequiredInput {
                    reason,
                    date,
                    patient,
                    practitioner,
                    start_time,
                    end_time,
                })
            }
            _ => Err(AppointmentError::MissingFields(missing)),
        }
    }
}

impl RequiredInput {
    pub fn patient_id(&self) -> Result<i64, AppointmentError> {
        parse_entity_ref(&self.patient)
            .ok_or_else(|| invalid(format!("malformed patient reference {:?}", self.patient)))
    }

    pub fn practitioner_id(&self) -> Result<i64, AppointmentError> {
        parse_entity_ref(&self.practitioner).ok_or_else(|| {
            invalid(format!(
                "malformed practitioner reference {:?}",
                self.practitioner
            ))
        })
    }

    /// Field-level validation. References must already be resolved.
    pub fn into_draft(
        self,
        patient_id: i64,
        practitioner_id: i64,
    ) -> Result<AppointmentDraft, AppointmentError> {
        let reason = self.reason.trim();
        if reason.is_empty() {
            return Err(invalid("motif is empty"));
        }
        if reason.chars().count() > MAX_REASON_CHARS {
            return Err(invalid("motif is too long"));
        }

        let date =
            parse_date(&self.date).ok_or_else(|| invalid(format!("bad date {:?}", self.date)))?;
        let start_time = parse_time(&self.start_time)
            .ok_or_else(|| invalid(format!("bad heureDebut {:?}", self.start_time)))?;
        let end_time = parse_time(&self.end_time)
            .ok_or_else(|| invalid(format!("bad heureFin {:?}", self.end_time)))?;
        if end_time <= start_time {
            return Err(invalid("heureFin must be after heureDebut"));
        }

        Ok(AppointmentDraft {
            reason: reason.to_string(),
            date,
            start_time,
            end_time,
            patient_id,
            practitioner_id,
        })
    }
}

/// Accepts `42`, `"42"` or an IRI-like path ending in digits (`/api/users/42`).
pub fn parse_entity_ref(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let last = match raw.rsplit_once('/') {
        Some((_, tail)) => tail,
        None => raw,
    };
    if last.is_empty() || !last.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    last.parse().ok()
}

/// Hyphens are normalized to slashes before parsing, so `2024-03-01`
/// and `2024/03/01` name the same day.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let normalized = raw.trim().replace('-', "/");
    NaiveDate::parse_from_str(&normalized, "%Y/%m/%d").ok()
}

/// Times are kept to the minute; a seconds component is accepted and dropped.
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    let parsed = NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()?;
    NaiveTime::from_hms_opt(parsed.hour(), parsed.minute(), 0)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y/%m/%d").to_string()
}

pub fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}
