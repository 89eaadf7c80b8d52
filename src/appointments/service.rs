// src/appointments/service.rs

use std::sync::Arc;

use crate::appointments::{
    Appointment, AppointmentDraft, AppointmentError, AppointmentId, AppointmentInput,
    RequiredInput,
};
use crate::db::AppointmentStore;

/// Outcome of a status toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Cancelled,
    Reactivated,
}

impl StatusChange {
    pub fn message(self) -> &'static str {
        match self {
            StatusChange::Cancelled => "Appointment cancelled",
            StatusChange::Reactivated => "Appointment reactivated",
        }
    }
}

#[derive(Clone)]
pub struct AppointmentService {
    store: Arc<dyn AppointmentStore>,
    /// Apply the slot rule on create as well as update/toggle.
    enforce_slot_on_create: bool,
}

impl AppointmentService {
    pub fn new(store: Arc<dyn AppointmentStore>, enforce_slot_on_create: bool) -> Self {
        Self {
            store,
            enforce_slot_on_create,
        }
    }

    pub async fn list_all(&self) -> Result<Vec<Appointment>, AppointmentError> {
        Ok(self.store.list_all().await?)
    }

    pub async fn list_for_practitioner(
        &self,
        practitioner_id: i64,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        Ok(self.store.list_for_practitioner(practitioner_id).await?)
    }

    pub async fn get(&self, id: AppointmentId) -> Result<Appointment, AppointmentError> {
        self.store.find(id).await?.ok_or(AppointmentError::NotFound)
    }

    pub async fn create(&self, input: AppointmentInput) -> Result<Appointment, AppointmentError> {
        let draft = self.resolve(input.require()?).await?;

        let created = self
            .store
            .insert(&draft, self.enforce_slot_on_create)
            .await
            .map_err(AppointmentError::from)
            .inspect_err(|e| log_slot_conflict(e, &draft))?;

        tracing::info!(
            appointment_id = created.id,
            practitioner_id = draft.practitioner_id,
            "appointment created"
        );
        Ok(created)
    }

    pub async fn update(
        &self,
        id: AppointmentId,
        input: AppointmentInput,
    ) -> Result<Appointment, AppointmentError> {
        if self.store.find(id).await?.is_none() {
            return Err(AppointmentError::NotFound);
        }

        let draft = self.resolve(input.require()?).await?;

        let updated = self
            .store
            .update(id, &draft)
            .await
            .map_err(AppointmentError::from)
            .inspect_err(|e| log_slot_conflict(e, &draft))?
            .ok_or(AppointmentError::NotFound)?;

        tracing::info!(appointment_id = id, "appointment updated");
        Ok(updated)
    }

    pub async fn delete(&self, id: AppointmentId) -> Result<(), AppointmentError> {
        if !self.store.delete(id).await? {
            return Err(AppointmentError::NotFound);
        }
        tracing::info!(appointment_id = id, "appointment deleted");
        Ok(())
    }

    /// Cancels an enabled appointment, or re-enables a cancelled one if its
    /// slot is still free.
    pub async fn toggle_status(&self, id: AppointmentId) -> Result<StatusChange, AppointmentError> {
        let toggled = self
            .store
            .toggle_enabled(id)
            .await
            .map_err(AppointmentError::from)
            .inspect_err(|e| {
                if matches!(e, AppointmentError::SlotConflict) {
                    tracing::warn!(
                        appointment_id = id,
                        "reactivation refused, slot already booked"
                    );
                }
            })?
            .ok_or(AppointmentError::NotFound)?;

        let change = if toggled.is_enabled {
            StatusChange::Reactivated
        } else {
            StatusChange::Cancelled
        };

        tracing::info!(appointment_id = id, status = ?change, "appointment status toggled");
        Ok(change)
    }

    /// Reference parsing, lookup and field validation.
    async fn resolve(&self, input: RequiredInput) -> Result<AppointmentDraft, AppointmentError> {
        let patient_id = input.patient_id()?;
        let practitioner_id = input.practitioner_id()?;

        if self.store.find_patient(patient_id).await?.is_none() {
            return Err(AppointmentError::ValidationFailed(format!(
                "unknown patient {patient_id}"
            )));
        }
        if self.store.find_practitioner(practitioner_id).await?.is_none() {
            return Err(AppointmentError::ValidationFailed(format!(
                "unknown practitioner {practitioner_id}"
            )));
        }

        input.into_draft(patient_id, practitioner_id)
    }
}

fn log_slot_conflict(e: &AppointmentError, draft: &AppointmentDraft) {
    if matches!(e, AppointmentError::SlotConflict) {
        tracing::warn!(
            practitioner_id = draft.practitioner_id,
            date = %draft.date,
            start_time = %draft.start_time,
            "slot already booked"
        );
    }
}
