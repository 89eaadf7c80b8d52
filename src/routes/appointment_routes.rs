// src/routes/appointment_routes.rs

use axum::{
    Json, Router,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    routing::{get, put},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::{
    appointments::{
        Appointment, AppointmentInput, PatientBrief, PractitionerBrief, format_date, format_time,
    },
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{AppState, Role},
};

/*
Every appointment endpoint needs at least the secretary role
(doctors and admins rank above it).
*/
const REQUIRED_ROLE: Role = Role::Secretary;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list_appointments).post(create_appointment))
        .route("/appointments/mine", get(list_my_appointments))
        .route(
            "/appointments/{appointment_id}",
            get(get_appointment)
                .put(update_appointment)
                .delete(delete_appointment),
        )
        .route("/appointments/{appointment_id}/status", put(toggle_status))
}

/* ============================================================
   Response DTOs
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

/// `{status, message}` acknowledgement for delete and status toggles.
#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub status: u16,
    pub message: String,
}

impl StatusMessage {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(StatusMessage {
            status: StatusCode::OK.as_u16(),
            message: message.into(),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentDto {
    pub id: i64,
    pub motif: String,
    /// YYYY/MM/DD
    pub date: String,
    pub heure_debut: String,
    pub heure_fin: String,
    pub is_enabled: bool,
    pub patient: PatientBrief,
    pub medecin: PractitionerBrief,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Appointment> for AppointmentDto {
    fn from(a: Appointment) -> Self {
        AppointmentDto {
            id: a.id,
            motif: a.reason,
            date: format_date(a.date),
            heure_debut: format_time(a.start_time),
            heure_fin: format_time(a.end_time),
            is_enabled: a.is_enabled,
            patient: a.patient,
            medecin: a.practitioner,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

fn to_dtos(rows: Vec<Appointment>) -> Vec<AppointmentDto> {
    rows.into_iter().map(AppointmentDto::from).collect()
}

/* ============================================================
   Request body
   ============================================================ */

type JsonMap = serde_json::Map<String, JsonValue>;

/// Reads a create/update body. Fields are pulled out loosely so that
/// absence is detected before any type check.
fn read_input(
    payload: Result<Json<JsonValue>, JsonRejection>,
) -> Result<AppointmentInput, ApiError> {
    let Json(body) = payload?;
    let JsonValue::Object(mut fields) = body else {
        return Err(ApiError::BadRequest(
            "INVALID_REQUEST",
            "Request body must be a JSON object".into(),
        ));
    };

    let mut mistyped = Vec::new();
    Ok(AppointmentInput {
        reason: text_field(&mut fields, "motif", &mut mistyped),
        date: text_field(&mut fields, "date", &mut mistyped),
        patient: ref_field(&mut fields, "patient", &mut mistyped),
        practitioner: ref_field(&mut fields, "medecin", &mut mistyped),
        start_time: text_field(&mut fields, "heureDebut", &mut mistyped),
        end_time: text_field(&mut fields, "heureFin", &mut mistyped),
        mistyped,
    })
}

/// Strings only. Null is absent; any other type is present but mistyped.
fn text_field(
    fields: &mut JsonMap,
    name: &'static str,
    mistyped: &mut Vec<&'static str>,
) -> Option<String> {
    match fields.remove(name)? {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s),
        _ => {
            mistyped.push(name);
            Some(String::new())
        }
    }
}

/// Entity references also accept an integer id.
fn ref_field(
    fields: &mut JsonMap,
    name: &'static str,
    mistyped: &mut Vec<&'static str>,
) -> Option<String> {
    match fields.get(name) {
        Some(JsonValue::Number(n)) if n.is_i64() || n.is_u64() => {
            let id = n.to_string();
            fields.remove(name);
            Some(id)
        }
        _ => text_field(fields, name, mistyped),
    }
}

/* ============================================================
   GET /appointments, GET /appointments/mine
   ============================================================ */

pub async fn list_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<AppointmentDto>>>, ApiError> {
    auth.require(REQUIRED_ROLE)?;
    let rows = state.appointments.list_all().await?;
    Ok(Json(ApiOk { data: to_dtos(rows) }))
}

pub async fn list_my_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<AppointmentDto>>>, ApiError> {
    auth.require(REQUIRED_ROLE)?;
    let rows = state.appointments.list_for_practitioner(auth.user_id).await?;
    Ok(Json(ApiOk { data: to_dtos(rows) }))
}

/* ============================================================
   GET /appointments/{id}
   ============================================================ */

pub async fn get_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    auth.require(REQUIRED_ROLE)?;
    let Path(appointment_id) = path?;

    let appointment = state.appointments.get(appointment_id).await?;
    Ok(Json(ApiOk {
        data: appointment.into(),
    }))
}

/* ============================================================
   POST /appointments (create)
   ============================================================ */

pub async fn create_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    payload: Result<Json<JsonValue>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiOk<AppointmentDto>>), ApiError> {
    auth.require(REQUIRED_ROLE)?;
    let input = read_input(payload)?;

    let created = state.appointments.create(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiOk {
            data: created.into(),
        }),
    ))
}

/* ============================================================
   PUT /appointments/{id}
   ============================================================ */

pub async fn update_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<JsonValue>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiOk<AppointmentDto>>), ApiError> {
    auth.require(REQUIRED_ROLE)?;
    let Path(appointment_id) = path?;
    let input = read_input(payload)?;

    let updated = state.appointments.update(appointment_id, input).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiOk {
            data: updated.into(),
        }),
    ))
}

/* ============================================================
   DELETE /appointments/{id}
   ============================================================ */

pub async fn delete_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<StatusMessage>, ApiError> {
    auth.require(REQUIRED_ROLE)?;
    let Path(appointment_id) = path?;

    state.appointments.delete(appointment_id).await?;
    Ok(StatusMessage::ok("Appointment deleted"))
}

/* ============================================================
   PUT /appointments/{id}/status
   ============================================================ */

pub async fn toggle_status(
    State(state): State<AppState>,
    auth: AuthContext,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<StatusMessage>, ApiError> {
    auth.require(REQUIRED_ROLE)?;
    let Path(appointment_id) = path?;

    let change = state.appointments.toggle_status(appointment_id).await?;
    Ok(StatusMessage::ok(change.message()))
}
