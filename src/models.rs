use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::appointments::service::AppointmentService;
use crate::db::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub appointments: AppointmentService,
    pub sessions: Arc<dyn SessionStore>,
    pub session_ttl_hours: i64,
}

/* -------------------------
   Roles
--------------------------*/

/// Role stored as smallint in `app_user.roles`:
/// 0 patient, 1 admin, 2 doctor, 3 secretary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Patient,
    Admin,
    Doctor,
    Secretary,
}

impl Role {
    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(Role::Patient),
            1 => Some(Role::Admin),
            2 => Some(Role::Doctor),
            3 => Some(Role::Secretary),
            _ => None,
        }
    }

    pub fn as_i16(self) -> i16 {
        match self {
            Role::Patient => 0,
            Role::Admin => 1,
            Role::Doctor => 2,
            Role::Secretary => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Secretary => "secretary",
        }
    }

    /// Position in the hierarchy: admin > doctor > secretary > patient.
    fn rank(self) -> u8 {
        match self {
            Role::Patient => 0,
            Role::Secretary => 1,
            Role::Doctor => 2,
            Role::Admin => 3,
        }
    }
}

/// True when `caller` holds at least the capabilities of `required`.
pub fn authorize(caller: Role, required: Role) -> bool {
    caller.rank() >= required.rank()
}

pub fn role_to_string(role: i16) -> String {
    Role::from_i16(role)
        .map(Role::as_str)
        .unwrap_or("unknown")
        .to_string()
}

/* -------------------------
   API DTOs
--------------------------*/

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub device_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub data: LoginResponseData,
}

#[derive(Debug, Serialize)]
pub struct LoginResponseData {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub data: MeResponseData,
}

#[derive(Debug, Serialize)]
pub struct MeResponseData {
    pub user: UserProfile,
    pub session: SessionInfo,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub data: OkData,
}

#[derive(Debug, Serialize)]
pub struct OkData {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub username: String,
    pub display_name: String,
    /// Single role in DB, returned as an array.
    pub roles: Vec<String>,
}

impl From<&UserRow> for UserProfile {
    fn from(user: &UserRow) -> Self {
        UserProfile {
            user_id: user.user_id,
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            roles: vec![role_to_string(user.roles)],
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub user_id: i64,
    pub username: String,
    pub display_name: String,
    pub password_hash: String,
    pub roles: i16,
    pub is_active: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionTokenRow {
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Result of resolving a bearer token to a live session.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionLookupRow {
    pub session_token_id: Uuid,
    pub user_id: i64,
    pub roles: i16,
    pub expires_at: DateTime<Utc>,
}
