//! Live subscription to the effective shelter list.
//!
//! Exactly one subscriber is registered at a time. While attached, the
//! manager holds one override watch per shelter in the store; a remote
//! override change re-merges that shelter in place and hands the full
//! list to the subscriber.
//!
//! # Example
//!
//! ```ignore
//! let manager = SubscriptionManager::new(store, overrides);
//!
//! // Callback style
//! let subscription = manager.subscribe(|shelters| render(&shelters));
//!
//! // Channel style
//! let events = manager.subscribe_channel(64);
//! loop {
//!     match events.recv() {
//!         Ok(BoardEvent::Shelters(list)) => render(&list),
//!         Ok(BoardEvent::Detached { .. }) | Err(_) => break,
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    BoardEvent, DetachReason, EventReceiver, Subscriber, Subscription, SubscriptionId,
};
