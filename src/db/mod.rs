use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::appointments::{
    Appointment, AppointmentDraft, AppointmentId, PatientBrief, PractitionerBrief,
};
use crate::models::{SessionLookupRow, SessionTokenRow, UserRow};

#[cfg(test)]
pub mod memory;
pub mod pg;

pub use pg::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Another enabled appointment already holds the slot.
    #[error("slot already booked")]
    SlotTaken,
    #[error("db error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence for appointments plus the patient and practitioner lookups
/// they reference.
///
/// Writes that can occupy a slot (`update`, a `toggle_enabled` that
/// re-enables, and `insert` with `guard_slot`) check the slot and write in one atomic step,
/// failing with [`StoreError::SlotTaken`].
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Appointment>, StoreError>;

    async fn list_for_practitioner(
        &self,
        practitioner_id: i64,
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn find(&self, id: AppointmentId) -> Result<Option<Appointment>, StoreError>;

    async fn find_patient(&self, patient_id: i64) -> Result<Option<PatientBrief>, StoreError>;

    /// Active users only.
    async fn find_practitioner(
        &self,
        user_id: i64,
    ) -> Result<Option<PractitionerBrief>, StoreError>;

    async fn insert(
        &self,
        draft: &AppointmentDraft,
        guard_slot: bool,
    ) -> Result<Appointment, StoreError>;

    /// Returns `None` when `id` does not exist.
    async fn update(
        &self,
        id: AppointmentId,
        draft: &AppointmentDraft,
    ) -> Result<Option<Appointment>, StoreError>;

    /// Flips `is_enabled`, reading the current state in the same unit of
    /// work as the write. Returns `None` when `id` does not exist.
    /// Re-enabling is slot-checked, disabling never is.
    async fn toggle_enabled(&self, id: AppointmentId)
    -> Result<Option<Appointment>, StoreError>;

    /// Returns false when `id` does not exist.
    async fn delete(&self, id: AppointmentId) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRow>, StoreError>;

    async fn find_user(&self, user_id: i64) -> Result<Option<UserRow>, StoreError>;

    async fn create_session(
        &self,
        user_id: i64,
        token_hash: &str,
        device_name: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<SessionTokenRow, StoreError>;

    /// Live session for `token_hash`: not revoked, not expired, user active.
    /// Touches `last_seen_at` on success.
    async fn find_session(&self, token_hash: &str)
    -> Result<Option<SessionLookupRow>, StoreError>;

    async fn revoke_session(&self, session_token_id: Uuid) -> Result<(), StoreError>;
}

pub async fn connect_pg(database_url: &str, max_connections: u32) -> anyhow::Result<sqlx::PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database migrations applied");

    Ok(pool)
}
