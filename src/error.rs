use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::appointments::AppointmentError;
use crate::db::StoreError;

/// Body of every error response. `status` always equals the HTTP status.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str, String),
    Forbidden(&'static str, String),
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    Internal(String),
}

impl ApiError {
    pub fn invalid_credentials() -> Self {
        ApiError::Unauthorized("INVALID_CREDENTIALS", "Username or password is incorrect".into())
    }

    pub fn session_expired() -> Self {
        ApiError::Unauthorized("SESSION_EXPIRED", "Session expired".into())
    }

    pub fn access_denied() -> Self {
        ApiError::Forbidden("FORBIDDEN", "Access denied".into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(..) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(..) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(..) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(..) => StatusCode::NOT_FOUND,
            ApiError::Conflict(..) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (code, message) = match self {
            ApiError::Unauthorized(code, msg)
            | ApiError::Forbidden(code, msg)
            | ApiError::BadRequest(code, msg)
            | ApiError::NotFound(code, msg)
            | ApiError::Conflict(code, msg) => (code, msg),
            ApiError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                ("INTERNAL", "Internal server error".to_string())
            }
        };

        let body = Json(ErrorResponse {
            status: status.as_u16(),
            code: code.to_string(),
            message,
        });
        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::SlotTaken => {
                ApiError::Conflict("SLOT_CONFLICT", "Appointment already booked".into())
            }
            StoreError::Database(e) => ApiError::Internal(format!("db error: {e}")),
        }
    }
}

impl From<AppointmentError> for ApiError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::MissingFields(fields) => {
                tracing::debug!("missing fields: {}", fields.join(", "));
                ApiError::BadRequest("MISSING_FIELDS", "Fill in all fields".into())
            }
            AppointmentError::ValidationFailed(detail) => {
                tracing::debug!("validation failed: {detail}");
                ApiError::BadRequest("VALIDATION_ERROR", "Invalid data".into())
            }
            AppointmentError::NotFound => {
                ApiError::NotFound("NOT_FOUND", "Appointment does not exist".into())
            }
            AppointmentError::SlotConflict => StoreError::SlotTaken.into(),
            AppointmentError::Store(e) => e.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest("INVALID_REQUEST", e.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(e: PathRejection) -> Self {
        ApiError::BadRequest("INVALID_REQUEST", e.body_text())
    }
}
