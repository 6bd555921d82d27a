//! Subscription types for live shelter updates.

use crate::types::ShelterList;
use std::sync::Arc;

use super::manager::Shared;

/// Callback registered by the single active subscriber. Always receives
/// the full effective list, never a diff.
pub type Subscriber = Arc<dyn Fn(ShelterList) + Send + Sync>;

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Why a subscriber stopped receiving updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetachReason {
    /// Explicitly unsubscribed, or its handle was dropped.
    Unsubscribed,
    /// Another subscriber took its place.
    Superseded,
}

/// Events delivered to channel subscribers.
#[derive(Clone, Debug)]
pub enum BoardEvent {
    /// The effective shelter list changed.
    Shelters(ShelterList),
    /// No further events will follow.
    Detached { reason: DetachReason },
}

/// Owned handle to the active subscription.
///
/// Dropping it detaches the subscriber and tears down its watches, unless
/// a newer subscriber has already replaced it.
pub struct Subscription {
    pub(crate) id: SubscriptionId,
    pub(crate) shared: std::sync::Weak<Shared>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// True while this subscription is the registered one.
    pub fn is_active(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.active_id() == Some(self.id))
    }

    /// Detach now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.detach(Some(self.id), DetachReason::Unsubscribed);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Subscription that delivers [`BoardEvent`]s through a bounded channel.
///
/// Every event carries the whole list, so a skipped event on a full buffer
/// is made good by the next one.
pub struct EventReceiver {
    pub(crate) subscription: Subscription,
    pub(crate) receiver: crossbeam_channel::Receiver<BoardEvent>,
}

impl EventReceiver {
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<BoardEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<BoardEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<BoardEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Detach and hand back the channel to drain remaining events.
    pub fn into_receiver(self) -> crossbeam_channel::Receiver<BoardEvent> {
        let EventReceiver {
            subscription,
            receiver,
        } = self;
        drop(subscription);
        receiver
    }
}
