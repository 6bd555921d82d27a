//! Volunteer edit access.
//!
//! Administrators assign shelters to volunteer emails; the board's callers
//! consult an [`AccessPolicy`] before publishing an update. Emails are
//! normalized (trimmed, lowercased) and stored under a key safe for
//! key-value stores that reserve `.`, `#`, `$`, `[` and `]`.
//!
//! A volunteer's own view can follow their record with
//! [`VolunteerAccessRegistry::watch`].

use crate::config::AccessConfig;
use crate::error::{BoardError, Result};
use crate::types::Timestamp;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// Trim and lowercase an email address.
pub fn normalize_email(email: &str) -> Result<String> {
    let normalized = email.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(BoardError::InvalidEmail(email.to_string()));
    }
    Ok(normalized)
}

/// Storage key for an email.
pub fn email_key(email: &str) -> Result<String> {
    Ok(normalize_email(email)?
        .chars()
        .map(|c| match c {
            '.' | '#' | '$' | '[' | ']' => '_',
            other => other,
        })
        .collect())
}

/// Shelters one email may edit, with audit metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolunteerAccessRecord {
    pub email: String,
    pub shelter_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
    #[serde(default)]
    pub updated_by: Option<String>,
}

/// Invoked with the new record each time a watched email's access is saved.
pub type AccessCallback = Arc<dyn Fn(VolunteerAccessRecord) + Send + Sync>;

type AccessWatchers = Mutex<HashMap<String, Vec<(u64, AccessCallback)>>>;

/// A live watch on one email's access record. Dropping it stops delivery.
pub struct AccessWatch {
    key: String,
    id: u64,
    watchers: Weak<AccessWatchers>,
}

impl AccessWatch {
    /// Storage key of the watched email.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for AccessWatch {
    fn drop(&mut self) {
        let Some(watchers) = self.watchers.upgrade() else {
            return;
        };
        let mut watchers = watchers.lock();
        if let Some(list) = watchers.get_mut(&self.key) {
            list.retain(|(watch_id, _)| *watch_id != self.id);
            if list.is_empty() {
                watchers.remove(&self.key);
            }
        }
    }
}

impl fmt::Debug for AccessWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessWatch").field("key", &self.key).finish()
    }
}

/// In-memory access registry keyed by [`email_key`].
#[derive(Default)]
pub struct VolunteerAccessRegistry {
    records: RwLock<HashMap<String, VolunteerAccessRecord>>,
    watchers: Arc<AccessWatchers>,
    next_watch: AtomicU64,
}

impl VolunteerAccessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the shelter set for `email`.
    ///
    /// Blank ids are dropped and duplicates collapse; the stored list is
    /// sorted.
    pub fn save<I, S>(&self, email: &str, shelter_ids: I, updated_by: Option<&str>) -> Result<VolunteerAccessRecord>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let email = normalize_email(email)?;
        let key = email_key(&email)?;
        let ids: BTreeSet<String> = shelter_ids
            .into_iter()
            .map(Into::<String>::into)
            .filter(|id: &String| !id.trim().is_empty())
            .collect();

        let record = VolunteerAccessRecord {
            email,
            shelter_ids: ids.into_iter().collect(),
            updated_at: Some(Timestamp::now()),
            updated_by: updated_by.map(str::to_string),
        };
        self.records.write().insert(key.clone(), record.clone());
        info!(email = %record.email, shelters = record.shelter_ids.len(), "volunteer access saved");
        self.notify(&key, &record);
        Ok(record)
    }

    /// Add shelters to whatever `email` already has.
    pub fn grant<I, S>(&self, email: &str, shelter_ids: I, updated_by: Option<&str>) -> Result<VolunteerAccessRecord>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids = self.allowed_shelters(email)?;
        ids.extend(shelter_ids.into_iter().map(Into::<String>::into));
        self.save(email, ids, updated_by)
    }

    /// Remove every shelter from `email`.
    pub fn revoke_all(&self, email: &str, updated_by: Option<&str>) -> Result<VolunteerAccessRecord> {
        self.save(email, Vec::<String>::new(), updated_by)
    }

    pub fn record(&self, email: &str) -> Result<Option<VolunteerAccessRecord>> {
        let key = email_key(email)?;
        Ok(self.records.read().get(&key).cloned())
    }

    /// Shelter ids `email` may edit.
    pub fn allowed_shelters(&self, email: &str) -> Result<Vec<String>> {
        Ok(self
            .record(email)?
            .map(|r| r.shelter_ids)
            .unwrap_or_default())
    }

    /// Follow later saves of `email`'s record, including grants and
    /// revocations made by an administrator. There is no initial delivery;
    /// read [`record`](Self::record) for the current value.
    pub fn watch(
        &self,
        email: &str,
        on_change: impl Fn(VolunteerAccessRecord) + Send + Sync + 'static,
    ) -> Result<AccessWatch> {
        let key = email_key(email)?;
        let id = self.next_watch.fetch_add(1, Ordering::SeqCst);
        self.watchers
            .lock()
            .entry(key.clone())
            .or_default()
            .push((id, Arc::new(on_change)));
        debug!(key = %key, watch = id, "access watch registered");

        Ok(AccessWatch {
            key,
            id,
            watchers: Arc::downgrade(&self.watchers),
        })
    }

    /// Number of live watches on `email`.
    pub fn watch_count(&self, email: &str) -> usize {
        email_key(email).map_or(0, |key| self.watchers.lock().get(&key).map_or(0, Vec::len))
    }

    fn notify(&self, key: &str, record: &VolunteerAccessRecord) {
        // Delivered outside the lock so callbacks may drop their own watch.
        let callbacks: Vec<AccessCallback> = self
            .watchers
            .lock()
            .get(key)
            .map(|list| list.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();

        for callback in callbacks {
            callback(record.clone());
        }
    }

    /// Records that still grant at least one shelter, sorted by email.
    pub fn directory(&self) -> Vec<VolunteerAccessRecord> {
        let mut records: Vec<VolunteerAccessRecord> = self
            .records
            .read()
            .values()
            .filter(|r| !r.shelter_ids.is_empty())
            .cloned()
            .collect();
        records.sort_by(|a, b| a.email.cmp(&b.email));
        records
    }
}

/// Role of an authenticated account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Volunteer,
    SuperAdmin,
}

/// Decides who may edit which shelter.
pub struct AccessPolicy {
    registry: Arc<VolunteerAccessRegistry>,
    super_admins: HashSet<String>,
}

impl AccessPolicy {
    pub fn new(registry: Arc<VolunteerAccessRegistry>, config: &AccessConfig) -> Self {
        Self {
            registry,
            super_admins: config
                .super_admin_emails
                .iter()
                .filter_map(|e| normalize_email(e).ok())
                .collect(),
        }
    }

    pub fn registry(&self) -> &VolunteerAccessRegistry {
        &self.registry
    }

    pub fn is_super_admin(&self, email: &str) -> bool {
        normalize_email(email).is_ok_and(|e| self.super_admins.contains(&e))
    }

    pub fn role_for(&self, email: &str) -> Role {
        if self.is_super_admin(email) {
            Role::SuperAdmin
        } else {
            Role::Volunteer
        }
    }

    /// Super admins may edit every shelter.
    pub fn can_edit(&self, email: &str, shelter_id: &str) -> bool {
        if self.is_super_admin(email) {
            return true;
        }
        self.registry
            .allowed_shelters(email)
            .is_ok_and(|ids| ids.iter().any(|id| id == shelter_id))
    }

    pub fn authorize(&self, email: &str, shelter_id: &str) -> Result<()> {
        if self.can_edit(email, shelter_id) {
            Ok(())
        } else {
            Err(BoardError::Unauthorized {
                email: email.to_string(),
                shelter_id: shelter_id.to_string(),
            })
        }
    }

    /// Overwrite a volunteer's shelters on behalf of `admin`.
    pub fn assign<I, S>(&self, admin: &str, email: &str, shelter_ids: I) -> Result<VolunteerAccessRecord>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if !self.is_super_admin(admin) {
            return Err(BoardError::NotAdmin(admin.to_string()));
        }
        let admin = normalize_email(admin)?;
        self.registry.save(email, shelter_ids, Some(&admin))
    }
}
