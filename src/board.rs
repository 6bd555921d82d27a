//! Main ShelterBoard struct tying all components together.

use crate::access::AccessPolicy;
use crate::config::BoardConfig;
use crate::error::Result;
use crate::merge::merge_all;
use crate::records::ShelterStore;
use crate::remote::{ApiMirror, OverrideStore, ShelterDirectory};
use crate::subscriptions::{EventReceiver, Subscription, SubscriptionManager};
use crate::sync::{SyncGateway, SyncJob, SyncStats};
use crate::types::{Shelter, ShelterList, ShelterOverride, ShelterUpdatePayload};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The shelter board.
///
/// Provides a unified interface for:
/// - Loading and replacing the working shelter set
/// - Merging remote overrides into base records
/// - Keeping one subscriber live as overrides change remotely
/// - Applying scoped updates optimistically and syncing them outward
pub struct ShelterBoard {
    config: BoardConfig,

    /// Working set (shared with the subscription manager).
    store: Arc<ShelterStore>,

    overrides: Arc<dyn OverrideStore>,

    directory: Arc<dyn ShelterDirectory>,

    subscriptions: SubscriptionManager,

    /// Outbound phase of every write.
    sync: SyncGateway,
}

impl ShelterBoard {
    /// Create a board with an empty working set.
    ///
    /// Must be called from within a tokio runtime; the sync worker is
    /// spawned onto it.
    pub fn new(
        config: BoardConfig,
        overrides: Arc<dyn OverrideStore>,
        directory: Arc<dyn ShelterDirectory>,
        mirror: Option<Arc<dyn ApiMirror>>,
    ) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(ShelterStore::new());
        let subscriptions = SubscriptionManager::new(Arc::clone(&store), Arc::clone(&overrides));
        let sync = SyncGateway::spawn(
            Arc::clone(&store),
            Arc::clone(&overrides),
            mirror,
            config.sync_queue_capacity,
        );

        Ok(Self {
            config,
            store,
            overrides,
            directory,
            subscriptions,
            sync,
        })
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    // --- Working Set ---

    /// Current effective shelter list. Never touches the network.
    pub fn load(&self) -> ShelterList {
        self.store.snapshot()
    }

    /// Current effective record for `id`.
    pub fn get(&self, id: &str) -> Option<Shelter> {
        self.store.get(id)
    }

    /// Install `next` as the working set, merged with its remote overrides.
    ///
    /// Overrides are fetched concurrently. A failed fetch leaves that
    /// shelter at its base values; it never fails the batch. Afterwards the
    /// watch set covers exactly the ids in `next`.
    pub async fn replace(&self, next: Vec<Shelter>) -> ShelterList {
        let overrides = self.fetch_overrides(&next).await;
        let merged = merge_all(&next, &overrides);
        let count = merged.len();

        let snapshot = self.store.install(next, merged);
        self.subscriptions.rewatch();
        info!(shelters = count, "working set replaced");

        self.subscriptions.notify(Arc::clone(&snapshot));
        snapshot
    }

    async fn fetch_overrides(&self, shelters: &[Shelter]) -> Vec<Option<ShelterOverride>> {
        stream::iter(shelters.iter().map(|s| s.id.clone()))
            .map(|id| {
                let overrides = Arc::clone(&self.overrides);
                async move {
                    match overrides.get(&id).await {
                        Ok(value) => value,
                        Err(e) => {
                            warn!(shelter_id = %id, error = %e, "override fetch failed, using base record");
                            None
                        }
                    }
                }
            })
            .buffered(self.config.override_fetch_concurrency)
            .collect()
            .await
    }

    /// Empty the working set and drop every watch.
    pub fn clear(&self) -> ShelterList {
        let snapshot = self.store.clear();
        self.subscriptions.rewatch();
        info!("working set cleared");

        self.subscriptions.notify(Arc::clone(&snapshot));
        snapshot
    }

    /// Refetch the default directory listing and replace the working set.
    ///
    /// On a directory failure the current working set is kept.
    pub async fn reload(&self) -> Result<ShelterList> {
        let bases = self.directory.fetch_all().await?;
        Ok(self.replace(bases).await)
    }

    /// Search the directory and replace the working set with the results.
    ///
    /// A blank city or state yields an empty result and leaves the
    /// working set alone.
    pub async fn search(&self, city: &str, state: &str) -> Result<ShelterList> {
        if city.trim().is_empty() || state.trim().is_empty() {
            return Ok(Arc::new(Vec::new()));
        }
        let bases = self.directory.search(city, state).await?;
        Ok(self.replace(bases).await)
    }

    // --- Subscriptions ---

    /// Register the single live subscriber, replacing any previous one.
    pub fn subscribe<F>(&self, subscriber: F) -> Subscription
    where
        F: Fn(ShelterList) + Send + Sync + 'static,
    {
        self.subscriptions.subscribe(subscriber)
    }

    /// Register a channel subscriber sized by `event_buffer_size`.
    pub fn subscribe_channel(&self) -> EventReceiver {
        self.subscriptions
            .subscribe_channel(self.config.event_buffer_size)
    }

    /// Detach the live subscriber, if any.
    pub fn unsubscribe(&self) -> bool {
        self.subscriptions.unsubscribe()
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    // --- Updates ---

    /// Apply `payload` to the working set now and sync it in the background.
    ///
    /// Returns the updated shelter as readers will see it from this point
    /// on, or `None` if the shelter is not in the working set or the
    /// category is unknown. Remote failures are logged, never returned.
    /// Remote changes observed before the sync job finishes are merged
    /// underneath this write, never over it. Callers are expected to have
    /// authorized the payload.
    pub fn publish_update(&self, payload: ShelterUpdatePayload) -> Option<Shelter> {
        let Some(applied) = self.store.apply(&payload) else {
            debug!(
                shelter_id = %payload.shelter_id,
                resource = %payload.resource,
                "update ignored"
            );
            return None;
        };
        self.subscriptions.notify(applied.snapshot);

        self.sync.enqueue(SyncJob {
            payload,
            patch: applied.patch,
            seq: applied.seq,
        });
        Some(applied.shelter)
    }

    /// [`publish_update`](Self::publish_update) after checking that `email`
    /// may edit the target shelter.
    pub fn publish_authorized(
        &self,
        policy: &AccessPolicy,
        email: &str,
        payload: ShelterUpdatePayload,
    ) -> Result<Option<Shelter>> {
        policy.authorize(email, &payload.shelter_id)?;
        Ok(self.publish_update(payload))
    }

    // --- Outbound Sync ---

    /// Wait for every queued sync job to finish.
    pub async fn flush(&self) -> Result<()> {
        self.sync.flush().await
    }

    /// Detach the subscriber, drain the sync queue and stop the worker.
    pub async fn shutdown(&self) {
        self.subscriptions.unsubscribe();
        self.sync.shutdown().await;
        info!(pending = self.store.pending_len(), "board shut down");
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.sync.stats()
    }

    /// Local writes whose sync job has not finished yet.
    pub fn pending_writes(&self) -> usize {
        self.store.pending_len()
    }
}
