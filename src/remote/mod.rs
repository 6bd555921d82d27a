//! Contracts for the remote collaborators around the board.
//!
//! - [`OverrideStore`]: watchable key-value store of per-shelter overrides
//! - [`ShelterDirectory`]: source of base shelter records
//! - [`ApiMirror`]: best-effort external copy of every update
//!
//! [`MemoryOverrideStore`] is an in-process implementation used by tests
//! and by hosts that have no remote store.

mod memory;

pub use memory::MemoryOverrideStore;

use crate::error::Result;
use crate::types::{Shelter, ShelterOverride, ShelterUpdatePayload};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Invoked with the full current override whenever a watched key changes.
/// `None` means the entry was removed.
pub type WatchCallback = Arc<dyn Fn(Option<ShelterOverride>) + Send + Sync>;

/// A live watch on one override key. Dropping it stops delivery.
pub struct OverrideWatch {
    shelter_id: String,
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl OverrideWatch {
    pub fn new(shelter_id: impl Into<String>, cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            shelter_id: shelter_id.into(),
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn shelter_id(&self) -> &str {
        &self.shelter_id
    }
}

impl Drop for OverrideWatch {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for OverrideWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideWatch")
            .field("shelter_id", &self.shelter_id)
            .finish()
    }
}

/// Remote, watchable store of shelter overrides keyed by shelter id.
#[async_trait]
pub trait OverrideStore: Send + Sync {
    /// Current override for `shelter_id`, if any.
    async fn get(&self, shelter_id: &str) -> Result<Option<ShelterOverride>>;

    /// Merge `patch` into the stored entry field by field.
    async fn set(&self, shelter_id: &str, patch: ShelterOverride) -> Result<()>;

    /// Register `on_change` for later changes to `shelter_id`. There is no
    /// initial delivery of the current value.
    fn watch(&self, shelter_id: &str, on_change: WatchCallback) -> OverrideWatch;
}

/// Source of base (unmerged) shelter records.
#[async_trait]
pub trait ShelterDirectory: Send + Sync {
    /// The default directory listing.
    async fn fetch_all(&self) -> Result<Vec<Shelter>>;

    /// Shelters near a city/state pair.
    async fn search(&self, city: &str, state: &str) -> Result<Vec<Shelter>>;
}

/// External API that mirrors every published update.
#[async_trait]
pub trait ApiMirror: Send + Sync {
    async fn publish(&self, payload: &ShelterUpdatePayload) -> Result<()>;
}
