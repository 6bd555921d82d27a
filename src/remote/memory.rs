//! In-process override store with synchronous watch delivery.

use super::{OverrideStore, OverrideWatch, WatchCallback};
use crate::error::{BoardError, Result};
use crate::types::ShelterOverride;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

#[derive(Default)]
struct Inner {
    entries: RwLock<HashMap<String, ShelterOverride>>,
    watchers: Mutex<HashMap<String, Vec<(u64, WatchCallback)>>>,
    next_watch: AtomicU64,
    failing_reads: RwLock<HashSet<String>>,
    failing_writes: AtomicBool,
}

impl Inner {
    fn notify(&self, shelter_id: &str, value: Option<ShelterOverride>) {
        // Callbacks run outside the lock so they may register or drop watches.
        let callbacks: Vec<WatchCallback> = self
            .watchers
            .lock()
            .get(shelter_id)
            .map(|list| list.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();

        for callback in callbacks {
            callback(value.clone());
        }
    }
}

/// Override store held in memory.
///
/// Cloning yields another handle to the same data. Watches are delivered
/// synchronously on the thread that performed the write.
#[derive(Clone, Default)]
pub struct MemoryOverrideStore {
    inner: Arc<Inner>,
}

impl MemoryOverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the entry for `shelter_id` as an out-of-band writer would.
    pub fn put(&self, shelter_id: &str, value: ShelterOverride) {
        self.inner
            .entries
            .write()
            .insert(shelter_id.to_string(), value.clone());
        self.inner.notify(shelter_id, Some(value));
    }

    /// Delete the entry for `shelter_id`.
    pub fn remove(&self, shelter_id: &str) {
        let removed = self.inner.entries.write().remove(shelter_id);
        if removed.is_some() {
            self.inner.notify(shelter_id, None);
        }
    }

    /// Stored value without going through the async API.
    pub fn peek(&self, shelter_id: &str) -> Option<ShelterOverride> {
        self.inner.entries.read().get(shelter_id).cloned()
    }

    /// Number of live watches on `shelter_id`.
    pub fn watch_count(&self, shelter_id: &str) -> usize {
        self.inner
            .watchers
            .lock()
            .get(shelter_id)
            .map_or(0, Vec::len)
    }

    /// Number of live watches across all keys.
    pub fn total_watches(&self) -> usize {
        self.inner.watchers.lock().values().map(Vec::len).sum()
    }

    /// Make `get` fail for `shelter_id`.
    pub fn fail_reads_for(&self, shelter_id: &str) {
        self.inner.failing_reads.write().insert(shelter_id.to_string());
    }

    /// Make every `set` fail (or succeed again).
    pub fn fail_writes(&self, failing: bool) {
        self.inner.failing_writes.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl OverrideStore for MemoryOverrideStore {
    async fn get(&self, shelter_id: &str) -> Result<Option<ShelterOverride>> {
        if self.inner.failing_reads.read().contains(shelter_id) {
            return Err(BoardError::OverrideFetch {
                shelter_id: shelter_id.to_string(),
                reason: "read refused".to_string(),
            });
        }
        Ok(self.peek(shelter_id))
    }

    async fn set(&self, shelter_id: &str, patch: ShelterOverride) -> Result<()> {
        if self.inner.failing_writes.load(Ordering::SeqCst) {
            return Err(BoardError::Persist {
                shelter_id: shelter_id.to_string(),
                reason: "write refused".to_string(),
            });
        }

        let merged = {
            let mut entries = self.inner.entries.write();
            let entry = entries.entry(shelter_id.to_string()).or_default();
            entry.absorb(patch);
            entry.clone()
        };
        self.inner.notify(shelter_id, Some(merged));
        Ok(())
    }

    fn watch(&self, shelter_id: &str, on_change: WatchCallback) -> OverrideWatch {
        let id = self.inner.next_watch.fetch_add(1, Ordering::SeqCst);
        self.inner
            .watchers
            .lock()
            .entry(shelter_id.to_string())
            .or_default()
            .push((id, on_change));

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let key = shelter_id.to_string();
        OverrideWatch::new(shelter_id, move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut watchers = inner.watchers.lock();
            if let Some(list) = watchers.get_mut(&key) {
                list.retain(|(watch_id, _)| *watch_id != id);
                if list.is_empty() {
                    watchers.remove(&key);
                }
            }
        })
    }
}
