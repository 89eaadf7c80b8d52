// src/db/memory.rs
//
// In-process store used by the test suites.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::appointments::{
    Appointment, AppointmentDraft, AppointmentId, PatientBrief, PractitionerBrief, Slot,
};
use crate::db::{AppointmentStore, SessionStore, StoreError};
use crate::models::{Role, SessionLookupRow, SessionTokenRow, UserRow};

#[derive(Debug, Clone)]
struct StoredAppointment {
    id: AppointmentId,
    draft: AppointmentDraft,
    is_enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredSession {
    session_token_id: Uuid,
    user_id: i64,
    expires_at: DateTime<Utc>,
    revoked: bool,
    last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    appointments: BTreeMap<AppointmentId, StoredAppointment>,
    /// Enabled appointments only.
    slots: HashMap<Slot, BTreeSet<AppointmentId>>,
    patients: HashMap<i64, PatientBrief>,
    users: HashMap<i64, UserRow>,
    sessions: HashMap<String, StoredSession>,
}

impl Inner {
    fn slot_taken(&self, slot: &Slot, exclude: Option<AppointmentId>) -> bool {
        self.slots
            .get(slot)
            .is_some_and(|ids| ids.iter().any(|id| Some(*id) != exclude))
    }

    fn index(&mut self, slot: Slot, id: AppointmentId) {
        self.slots.entry(slot).or_default().insert(id);
    }

    fn unindex(&mut self, slot: &Slot, id: AppointmentId) {
        if let Some(ids) = self.slots.get_mut(slot) {
            ids.remove(&id);
            if ids.is_empty() {
                self.slots.remove(slot);
            }
        }
    }

    fn hydrate(&self, stored: &StoredAppointment) -> Result<Appointment, StoreError> {
        let patient = self
            .patients
            .get(&stored.draft.patient_id)
            .cloned()
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        let practitioner = self
            .users
            .get(&stored.draft.practitioner_id)
            .map(|u| PractitionerBrief {
                id: u.user_id,
                display_name: u.display_name.clone(),
            })
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;

        Ok(Appointment {
            id: stored.id,
            reason: stored.draft.reason.clone(),
            date: stored.draft.date,
            start_time: stored.draft.start_time,
            end_time: stored.draft.end_time,
            patient,
            practitioner,
            is_enabled: stored.is_enabled,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_patient(&self, patient_id: i64, first_name: &str, last_name: &str) {
        let mut inner = self.inner.lock().await;
        inner.patients.insert(
            patient_id,
            PatientBrief {
                id: patient_id,
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
            },
        );
    }

    pub async fn add_user(&self, user_id: i64, username: &str, role: Role, password_hash: &str) {
        let mut inner = self.inner.lock().await;
        inner.users.insert(
            user_id,
            UserRow {
                user_id,
                username: username.to_string(),
                display_name: format!("Dr {username}"),
                password_hash: password_hash.to_string(),
                roles: role.as_i16(),
                is_active: true,
            },
        );
    }

    pub async fn deactivate_user(&self, user_id: i64) {
        let mut inner = self.inner.lock().await;
        if let Some(user) = inner.users.get_mut(&user_id) {
            user.is_active = false;
        }
    }

    /// Registers a live session directly, bypassing login.
    pub async fn add_session(&self, user_id: i64, token_hash: &str) -> Uuid {
        self.add_session_expiring(user_id, token_hash, Utc::now() + chrono::Duration::hours(1))
            .await
    }

    pub async fn add_session_expiring(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Uuid {
        let session_token_id = Uuid::new_v4();
        let mut inner = self.inner.lock().await;
        inner.sessions.insert(
            token_hash.to_string(),
            StoredSession {
                session_token_id,
                user_id,
                expires_at,
                revoked: false,
                last_seen_at: None,
            },
        );
        session_token_id
    }

    pub async fn count(&self) -> usize {
        self.inner.lock().await.appointments.len()
    }

    pub async fn last_seen(&self, token_hash: &str) -> Option<DateTime<Utc>> {
        let inner = self.inner.lock().await;
        inner.sessions.get(token_hash).and_then(|s| s.last_seen_at)
    }
}

#[async_trait]
impl AppointmentStore for MemoryStore {
    async fn list_all(&self) -> Result<Vec<Appointment>, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .appointments
            .values()
            .map(|a| inner.hydrate(a))
            .collect()
    }

    async fn list_for_practitioner(
        &self,
        practitioner_id: i64,
    ) -> Result<Vec<Appointment>, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .appointments
            .values()
            .filter(|a| a.draft.practitioner_id == practitioner_id)
            .map(|a| inner.hydrate(a))
            .collect()
    }

    async fn find(&self, id: AppointmentId) -> Result<Option<Appointment>, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .appointments
            .get(&id)
            .map(|a| inner.hydrate(a))
            .transpose()
    }

    async fn find_patient(&self, patient_id: i64) -> Result<Option<PatientBrief>, StoreError> {
        Ok(self.inner.lock().await.patients.get(&patient_id).cloned())
    }

    async fn find_practitioner(
        &self,
        user_id: i64,
    ) -> Result<Option<PractitionerBrief>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .get(&user_id)
            .filter(|u| u.is_active)
            .map(|u| PractitionerBrief {
                id: u.user_id,
                display_name: u.display_name.clone(),
            }))
    }

    async fn insert(
        &self,
        draft: &AppointmentDraft,
        guard_slot: bool,
    ) -> Result<Appointment, StoreError> {
        let mut inner = self.inner.lock().await;
        let slot = draft.slot();
        if guard_slot && inner.slot_taken(&slot, None) {
            return Err(StoreError::SlotTaken);
        }

        inner.next_id += 1;
        let now = Utc::now();
        let stored = StoredAppointment {
            id: inner.next_id,
            draft: draft.clone(),
            is_enabled: true,
            created_at: now,
            updated_at: now,
        };
        let appointment = inner.hydrate(&stored)?;
        inner.index(slot, stored.id);
        inner.appointments.insert(stored.id, stored);
        Ok(appointment)
    }

    async fn update(
        &self,
        id: AppointmentId,
        draft: &AppointmentDraft,
    ) -> Result<Option<Appointment>, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(current) = inner.appointments.get(&id).cloned() else {
            return Ok(None);
        };

        let new_slot = draft.slot();
        if inner.slot_taken(&new_slot, Some(id)) {
            return Err(StoreError::SlotTaken);
        }

        let updated = StoredAppointment {
            draft: draft.clone(),
            updated_at: Utc::now(),
            ..current.clone()
        };
        let appointment = inner.hydrate(&updated)?;
        if current.is_enabled {
            inner.unindex(&current.draft.slot(), id);
            inner.index(new_slot, id);
        }
        inner.appointments.insert(id, updated);
        Ok(Some(appointment))
    }

    async fn toggle_enabled(
        &self,
        id: AppointmentId,
    ) -> Result<Option<Appointment>, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(current) = inner.appointments.get(&id).cloned() else {
            return Ok(None);
        };

        let slot = current.draft.slot();
        let enable = !current.is_enabled;
        if enable && inner.slot_taken(&slot, Some(id)) {
            return Err(StoreError::SlotTaken);
        }

        let updated = StoredAppointment {
            is_enabled: enable,
            updated_at: Utc::now(),
            ..current
        };
        let appointment = inner.hydrate(&updated)?;
        if enable {
            inner.index(slot, id);
        } else {
            inner.unindex(&slot, id);
        }
        inner.appointments.insert(id, updated);
        Ok(Some(appointment))
    }

    async fn delete(&self, id: AppointmentId) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.appointments.remove(&id) {
            Some(removed) => {
                inner.unindex(&removed.draft.slot(), id);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRow>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_user(&self, user_id: i64) -> Result<Option<UserRow>, StoreError> {
        Ok(self.inner.lock().await.users.get(&user_id).cloned())
    }

    async fn create_session(
        &self,
        user_id: i64,
        token_hash: &str,
        _device_name: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<SessionTokenRow, StoreError> {
        let session_token_id = Uuid::new_v4();
        let mut inner = self.inner.lock().await;
        inner.sessions.insert(
            token_hash.to_string(),
            StoredSession {
                session_token_id,
                user_id,
                expires_at,
                revoked: false,
                last_seen_at: None,
            },
        );
        Ok(SessionTokenRow {
            session_token_id,
            expires_at,
        })
    }

    async fn find_session(
        &self,
        token_hash: &str,
    ) -> Result<Option<SessionLookupRow>, StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();

        let Some(session) = inner.sessions.get(token_hash).cloned() else {
            return Ok(None);
        };
        if session.revoked || session.expires_at <= now {
            return Ok(None);
        }
        let Some(user) = inner.users.get(&session.user_id).filter(|u| u.is_active) else {
            return Ok(None);
        };
        let roles = user.roles;

        if let Some(stored) = inner.sessions.get_mut(token_hash) {
            stored.last_seen_at = Some(now);
        }

        Ok(Some(SessionLookupRow {
            session_token_id: session.session_token_id,
            user_id: session.user_id,
            roles,
            expires_at: session.expires_at,
        }))
    }

    async fn revoke_session(&self, session_token_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        for session in inner.sessions.values_mut() {
            if session.session_token_id == session_token_id {
                session.revoked = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appointments::{parse_date, parse_time};

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.add_patient(1, "Awa", "Diop").await;
        store.add_user(10, "house", Role::Doctor, "x").await;
        store
    }

    fn draft(start: &str) -> AppointmentDraft {
        AppointmentDraft {
            reason: "Checkup".into(),
            date: parse_date("2024-03-01").unwrap(),
            start_time: parse_time(start).unwrap(),
            end_time: parse_time("11:00").unwrap(),
            patient_id: 1,
            practitioner_id: 10,
        }
    }

    #[tokio::test]
    async fn test_index_tracks_enabled_appointments_only() {
        let store = seeded().await;
        let a = store.insert(&draft("09:00"), true).await.unwrap();
        let slot = a.slot();

        let off = store.toggle_enabled(a.id).await.unwrap().unwrap();
        assert!(!off.is_enabled);
        assert!(!store.inner.lock().await.slot_taken(&slot, None));

        let on = store.toggle_enabled(a.id).await.unwrap().unwrap();
        assert!(on.is_enabled);
        assert!(store.inner.lock().await.slot_taken(&slot, None));

        store.delete(a.id).await.unwrap();
        assert!(store.inner.lock().await.slots.is_empty());
    }

    #[tokio::test]
    async fn test_update_moves_index_entry() {
        let store = seeded().await;
        let a = store.insert(&draft("09:00"), true).await.unwrap();
        let old_slot = a.slot();

        let moved = store.update(a.id, &draft("10:00")).await.unwrap().unwrap();
        let inner = store.inner.lock().await;
        assert!(!inner.slot_taken(&old_slot, None));
        assert!(inner.slot_taken(&moved.slot(), None));
    }

    #[tokio::test]
    async fn test_guarded_insert_rejects_taken_slot() {
        let store = seeded().await;
        store.insert(&draft("09:00"), true).await.unwrap();
        assert!(matches!(
            store.insert(&draft("09:00"), true).await,
            Err(StoreError::SlotTaken)
        ));
        assert!(store.insert(&draft("09:00"), false).await.is_ok());
        assert_eq!(store.count().await, 2);
    }
}
