//! Single-subscriber manager driving live re-merge from override watches.

use crate::records::ShelterStore;
use crate::remote::{OverrideStore, OverrideWatch, WatchCallback};
use crate::types::{ShelterList, ShelterOverride};
use crossbeam_channel::{bounded, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use super::types::{
    BoardEvent, DetachReason, EventReceiver, Subscriber, Subscription, SubscriptionId,
};

type DetachHook = Box<dyn Fn(DetachReason) + Send + Sync>;

/// The registered subscriber and the watches feeding it.
struct Attachment {
    id: SubscriptionId,
    /// Identifies the current watch set. Callbacks from any other epoch are stale.
    epoch: u64,
    subscriber: Subscriber,
    on_detach: Option<DetachHook>,
    watches: Vec<OverrideWatch>,
}

pub(crate) struct Shared {
    store: Arc<ShelterStore>,
    overrides: Arc<dyn OverrideStore>,
    active: Mutex<Option<Attachment>>,
    next_id: AtomicU64,
    next_epoch: AtomicU64,
}

impl Shared {
    pub(crate) fn active_id(&self) -> Option<SubscriptionId> {
        self.active.lock().as_ref().map(|a| a.id)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.active.lock().as_ref().is_some_and(|a| a.epoch == epoch)
    }

    /// Remove the active attachment. With `only`, detach only if that
    /// subscription is still the active one.
    pub(crate) fn detach(&self, only: Option<SubscriptionId>, reason: DetachReason) -> bool {
        let removed = {
            let mut active = self.active.lock();
            let matches = match (active.as_ref(), only) {
                (None, _) => false,
                (Some(a), Some(id)) => a.id == id,
                (Some(_), None) => true,
            };
            if matches {
                active.take()
            } else {
                None
            }
        };

        let Some(attachment) = removed else {
            return false;
        };
        debug!(
            subscription = attachment.id.0,
            watches = attachment.watches.len(),
            ?reason,
            "detaching subscriber"
        );
        let Attachment {
            watches, on_detach, ..
        } = attachment;
        drop(watches);
        if let Some(hook) = on_detach {
            hook(reason);
        }
        true
    }

    fn watch_all(self: &Arc<Self>, epoch: u64, ids: &[String]) -> Vec<OverrideWatch> {
        ids.iter()
            .map(|shelter_id| {
                let weak: Weak<Shared> = Arc::downgrade(self);
                let key = shelter_id.clone();
                let callback: WatchCallback = Arc::new(move |value: Option<ShelterOverride>| {
                    if let Some(shared) = weak.upgrade() {
                        shared.on_override(epoch, &key, value);
                    }
                });
                self.overrides.watch(shelter_id, callback)
            })
            .collect()
    }

    fn on_override(&self, epoch: u64, shelter_id: &str, value: Option<ShelterOverride>) {
        if !self.is_current(epoch) {
            return;
        }
        let Some(list) = self.store.remerge(shelter_id, value.as_ref()) else {
            debug!(shelter_id, "override change for shelter outside working set");
            return;
        };
        debug!(shelter_id, "override changed remotely");
        self.deliver_if(Some(epoch), list);
    }

    fn deliver_if(&self, epoch: Option<u64>, list: ShelterList) {
        let subscriber = {
            let active = self.active.lock();
            match &*active {
                Some(a) if epoch.map_or(true, |e| e == a.epoch) => Arc::clone(&a.subscriber),
                _ => return,
            }
        };
        subscriber(list);
    }
}

/// Keeps one registered subscriber informed of the effective shelter list.
///
/// States: detached (no subscriber, no watches) and attached (one
/// subscriber, one watch per shelter id in the store). A new `subscribe`
/// tears down the previous subscriber's watches before attaching.
pub struct SubscriptionManager {
    shared: Arc<Shared>,
}

impl SubscriptionManager {
    /// Create a detached manager.
    pub fn new(store: Arc<ShelterStore>, overrides: Arc<dyn OverrideStore>) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                overrides,
                active: Mutex::new(None),
                next_id: AtomicU64::new(1),
                next_epoch: AtomicU64::new(1),
            }),
        }
    }

    /// Register `subscriber`, replacing any current one.
    pub fn subscribe<F>(&self, subscriber: F) -> Subscription
    where
        F: Fn(ShelterList) + Send + Sync + 'static,
    {
        self.attach(Arc::new(subscriber), None)
    }

    /// Register a channel subscriber with a bounded buffer.
    pub fn subscribe_channel(&self, buffer_size: usize) -> EventReceiver {
        let (sender, receiver) = bounded(buffer_size.max(1));
        let detach_sender = sender.clone();

        let subscriber: Subscriber = Arc::new(move |list| {
            match sender.try_send(BoardEvent::Shelters(list)) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                Err(TrySendError::Full(_)) => warn!("event buffer full, skipping shelter event"),
            }
        });
        let hook: DetachHook = Box::new(move |reason| {
            let _ = detach_sender.try_send(BoardEvent::Detached { reason });
        });

        let subscription = self.attach(subscriber, Some(hook));
        EventReceiver {
            subscription,
            receiver,
        }
    }

    fn attach(&self, subscriber: Subscriber, on_detach: Option<DetachHook>) -> Subscription {
        self.shared.detach(None, DetachReason::Superseded);

        let id = SubscriptionId(self.shared.next_id.fetch_add(1, Ordering::SeqCst));
        let epoch = self.shared.next_epoch.fetch_add(1, Ordering::SeqCst);
        let ids = self.shared.store.ids();

        *self.shared.active.lock() = Some(Attachment {
            id,
            epoch,
            subscriber,
            on_detach,
            watches: Vec::new(),
        });
        let watches = self.shared.watch_all(epoch, &ids);
        self.install_watches(epoch, watches);

        debug!(subscription = id.0, watches = ids.len(), "subscriber attached");
        Subscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    fn install_watches(&self, epoch: u64, watches: Vec<OverrideWatch>) {
        let stale = {
            let mut active = self.shared.active.lock();
            match active.as_mut() {
                Some(a) if a.epoch == epoch => {
                    a.watches = watches;
                    None
                }
                _ => Some(watches),
            }
        };
        // Cancelling takes the override store's lock; never do it under ours.
        drop(stale);
    }

    /// Detach the active subscriber, if any.
    pub fn unsubscribe(&self) -> bool {
        self.shared.detach(None, DetachReason::Unsubscribed)
    }

    pub fn is_attached(&self) -> bool {
        self.shared.active.lock().is_some()
    }

    pub fn active_id(&self) -> Option<SubscriptionId> {
        self.shared.active_id()
    }

    /// Shelter ids currently watched, in attach order.
    pub fn watched_ids(&self) -> Vec<String> {
        self.shared
            .active
            .lock()
            .as_ref()
            .map(|a| a.watches.iter().map(|w| w.shelter_id().to_string()).collect())
            .unwrap_or_default()
    }

    /// Rebuild the watch set against the store's current ids.
    ///
    /// Old watches are torn down first. No-op when detached.
    pub fn rewatch(&self) {
        let epoch = self.shared.next_epoch.fetch_add(1, Ordering::SeqCst);
        let old = {
            let mut active = self.shared.active.lock();
            match active.as_mut() {
                Some(a) => {
                    a.epoch = epoch;
                    std::mem::take(&mut a.watches)
                }
                None => return,
            }
        };
        drop(old);

        let ids = self.shared.store.ids();
        let watches = self.shared.watch_all(epoch, &ids);
        self.install_watches(epoch, watches);
        debug!(watches = ids.len(), "watch set rebuilt");
    }

    /// Deliver `list` to the active subscriber, if any.
    pub fn notify(&self, list: ShelterList) {
        self.shared.deliver_if(None, list);
    }
}
