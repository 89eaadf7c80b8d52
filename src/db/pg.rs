// src/db/pg.rs

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::appointments::{
    Appointment, AppointmentDraft, AppointmentId, PatientBrief, PractitionerBrief, Slot,
};
use crate::db::{AppointmentStore, SessionStore, StoreError};
use crate::models::{SessionLookupRow, SessionTokenRow, UserRow};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_APPOINTMENT: &str = r#"
    SELECT
      a.appointment_id,
      a.reason,
      a.appointment_date,
      a.start_time,
      a.end_time,
      a.is_enabled,
      a.created_at,
      a.updated_at,

      p.patient_id,
      p.first_name AS p_first,
      p.last_name  AS p_last,

      u.user_id      AS practitioner_id,
      u.display_name AS d_display

    FROM appointment a
    JOIN patient p  ON p.patient_id = a.patient_id
    JOIN app_user u ON u.user_id = a.practitioner_id
"#;

#[derive(Debug, sqlx::FromRow)]
struct AppointmentRow {
    appointment_id: i64,
    reason: String,
    appointment_date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    is_enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    patient_id: i64,
    p_first: String,
    p_last: String,
    practitioner_id: i64,
    d_display: String,
}

impl From<AppointmentRow> for Appointment {
    fn from(r: AppointmentRow) -> Self {
        Appointment {
            id: r.appointment_id,
            reason: r.reason,
            date: r.appointment_date,
            start_time: r.start_time,
            end_time: r.end_time,
            patient: PatientBrief {
                id: r.patient_id,
                first_name: r.p_first,
                last_name: r.p_last,
            },
            practitioner: PractitionerBrief {
                id: r.practitioner_id,
                display_name: r.d_display,
            },
            is_enabled: r.is_enabled,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Advisory lock key for a slot: first 8 bytes of SHA-256 over its fields.
pub(crate) fn slot_lock_key(slot: &Slot) -> i64 {
    let mut hasher = Sha256::new();
    hasher.update(
        format!(
            "appointment-slot:{}:{}:{}",
            slot.practitioner_id, slot.date, slot.start_time
        )
        .as_bytes(),
    );
    let digest = hasher.finalize();
    let mut key = [0u8; 8];
    key.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(key)
}

/// Serializes writers on `slot` for the rest of the transaction, then fails
/// if another enabled appointment already holds it.
async fn claim_slot(
    tx: &mut Transaction<'_, Postgres>,
    slot: &Slot,
    exclude: Option<AppointmentId>,
) -> Result<(), StoreError> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(slot_lock_key(slot))
        .execute(&mut **tx)
        .await?;

    let taken: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
          SELECT 1
          FROM appointment
          WHERE practitioner_id = $1
            AND appointment_date = $2
            AND start_time = $3
            AND is_enabled
            AND ($4::BIGINT IS NULL OR appointment_id <> $4)
        )
        "#,
    )
    .bind(slot.practitioner_id)
    .bind(slot.date)
    .bind(slot.start_time)
    .bind(exclude)
    .fetch_one(&mut **tx)
    .await?;

    if taken {
        Err(StoreError::SlotTaken)
    } else {
        Ok(())
    }
}

async fn fetch_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: AppointmentId,
) -> Result<Appointment, StoreError> {
    let sql = format!("{SELECT_APPOINTMENT} WHERE a.appointment_id = $1");
    let row = sqlx::query_as::<_, AppointmentRow>(&sql)
        .bind(id)
        .fetch_one(&mut **tx)
        .await?;
    Ok(row.into())
}

#[async_trait]
impl AppointmentStore for PgStore {
    async fn list_all(&self) -> Result<Vec<Appointment>, StoreError> {
        let sql = format!("{SELECT_APPOINTMENT} ORDER BY a.appointment_id ASC");
        let rows = sqlx::query_as::<_, AppointmentRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Appointment::from).collect())
    }

    async fn list_for_practitioner(
        &self,
        practitioner_id: i64,
    ) -> Result<Vec<Appointment>, StoreError> {
        let sql = format!(
            "{SELECT_APPOINTMENT} WHERE a.practitioner_id = $1 ORDER BY a.appointment_id ASC"
        );
        let rows = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(practitioner_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Appointment::from).collect())
    }

    async fn find(&self, id: AppointmentId) -> Result<Option<Appointment>, StoreError> {
        let sql = format!("{SELECT_APPOINTMENT} WHERE a.appointment_id = $1");
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Appointment::from))
    }

    async fn find_patient(&self, patient_id: i64) -> Result<Option<PatientBrief>, StoreError> {
        let row: Option<(i64, String, String)> = sqlx::query_as(
            r#"
            SELECT patient_id, first_name, last_name
            FROM patient
            WHERE patient_id = $1
            "#,
        )
        .bind(patient_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, first_name, last_name)| PatientBrief {
            id,
            first_name,
            last_name,
        }))
    }

    async fn find_practitioner(
        &self,
        user_id: i64,
    ) -> Result<Option<PractitionerBrief>, StoreError> {
        let row: Option<(i64, String)> = sqlx::query_as(
            r#"
            SELECT user_id, display_name
            FROM app_user
            WHERE user_id = $1
              AND is_active = true
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, display_name)| PractitionerBrief { id, display_name }))
    }

    async fn insert(
        &self,
        draft: &AppointmentDraft,
        guard_slot: bool,
    ) -> Result<Appointment, StoreError> {
        let mut tx = self.pool.begin().await?;

        if guard_slot {
            claim_slot(&mut tx, &draft.slot(), None).await?;
        }

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO appointment (
              reason,
              appointment_date,
              start_time,
              end_time,
              patient_id,
              practitioner_id,
              is_enabled
            )
            VALUES ($1, $2, $3, $4, $5, $6, true)
            RETURNING appointment_id
            "#,
        )
        .bind(&draft.reason)
        .bind(draft.date)
        .bind(draft.start_time)
        .bind(draft.end_time)
        .bind(draft.patient_id)
        .bind(draft.practitioner_id)
        .fetch_one(&mut *tx)
        .await?;

        let created = fetch_in_tx(&mut tx, id).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn update(
        &self,
        id: AppointmentId,
        draft: &AppointmentDraft,
    ) -> Result<Option<Appointment>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar(
            "SELECT appointment_id FROM appointment WHERE appointment_id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        if exists.is_none() {
            return Ok(None);
        }

        claim_slot(&mut tx, &draft.slot(), Some(id)).await?;

        sqlx::query(
            r#"
            UPDATE appointment
            SET
              reason           = $2,
              appointment_date = $3,
              start_time       = $4,
              end_time         = $5,
              patient_id       = $6,
              practitioner_id  = $7,
              updated_at       = now()
            WHERE appointment_id = $1
            "#,
        )
        .bind(id)
        .bind(&draft.reason)
        .bind(draft.date)
        .bind(draft.start_time)
        .bind(draft.end_time)
        .bind(draft.patient_id)
        .bind(draft.practitioner_id)
        .execute(&mut *tx)
        .await?;

        let updated = fetch_in_tx(&mut tx, id).await?;
        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn toggle_enabled(
        &self,
        id: AppointmentId,
    ) -> Result<Option<Appointment>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(i64, NaiveDate, NaiveTime, bool)> = sqlx::query_as(
            r#"
            SELECT practitioner_id, appointment_date, start_time, is_enabled
            FROM appointment
            WHERE appointment_id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((practitioner_id, date, start_time, was_enabled)) = current else {
            return Ok(None);
        };

        let enable = !was_enabled;
        if enable {
            let slot = Slot {
                practitioner_id,
                date,
                start_time,
            };
            claim_slot(&mut tx, &slot, Some(id)).await?;
        }

        sqlx::query(
            r#"
            UPDATE appointment
            SET is_enabled = $2,
                updated_at = now()
            WHERE appointment_id = $1
            "#,
        )
        .bind(id)
        .bind(enable)
        .execute(&mut *tx)
        .await?;

        let updated = fetch_in_tx(&mut tx, id).await?;
        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn delete(&self, id: AppointmentId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM appointment WHERE appointment_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRow>, StoreError> {
        let user = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, username, display_name, password_hash, roles, is_active
            FROM app_user
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user(&self, user_id: i64) -> Result<Option<UserRow>, StoreError> {
        let user = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, username, display_name, password_hash, roles, is_active
            FROM app_user
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_session(
        &self,
        user_id: i64,
        token_hash: &str,
        device_name: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<SessionTokenRow, StoreError> {
        let session = sqlx::query_as::<_, SessionTokenRow>(
            r#"
            INSERT INTO session_token
                (user_id, session_token_hash, device_name, expires_at)
            VALUES
                ($1, $2, $3, $4)
            RETURNING session_token_id, expires_at
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(device_name)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(session)
    }

    async fn find_session(
        &self,
        token_hash: &str,
    ) -> Result<Option<SessionLookupRow>, StoreError> {
        let row = sqlx::query_as::<_, SessionLookupRow>(
            r#"
            SELECT st.session_token_id, st.user_id, u.roles, st.expires_at
            FROM session_token st
            JOIN app_user u ON u.user_id = st.user_id
            WHERE st.session_token_hash = $1
              AND st.revoked_at IS NULL
              AND st.expires_at > now()
              AND u.is_active = true
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(session) = &row {
            // best-effort
            if let Err(e) = sqlx::query(
                r#"
                UPDATE session_token
                SET last_seen_at = now()
                WHERE session_token_id = $1
                "#,
            )
            .bind(session.session_token_id)
            .execute(&self.pool)
            .await
            {
                tracing::debug!("failed to touch session last_seen_at: {e}");
            }
        }

        Ok(row)
    }

    async fn revoke_session(&self, session_token_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE session_token
            SET revoked_at = now()
            WHERE session_token_id = $1
              AND revoked_at IS NULL
            "#,
        )
        .bind(session_token_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
