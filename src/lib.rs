//! # Shelter Board
//!
//! Live shelter availability: bed counts, meals, services and urgent needs
//! per shelter, reconciled against remotely persisted overrides and kept
//! live for a single subscriber.
//!
//! ## Core Concepts
//!
//! - **Base records**: shelters as fetched from a directory or search
//! - **Overrides**: sparse, remotely persisted availability patches
//! - **Effective shelters**: base records merged with their override
//! - **Resource categories**: disjoint update scopes (beds, meals, services, urgent needs)
//! - **Two-phase writes**: local apply first, remote persist and mirror after
//!
//! ## Example
//!
//! ```ignore
//! use shelter_board::{BoardConfig, MemoryOverrideStore, ShelterBoard, ShelterUpdatePayload, StaticDirectory};
//! use std::sync::Arc;
//!
//! let board = ShelterBoard::new(
//!     BoardConfig::from_env()?,
//!     Arc::new(MemoryOverrideStore::new()),
//!     Arc::new(StaticDirectory::new(shelters)),
//!     None,
//! )?;
//!
//! board.reload().await?;
//! let _live = board.subscribe(|list| println!("{} shelters", list.len()));
//!
//! // Visible immediately; persisted in the background
//! board.publish_update(ShelterUpdatePayload::beds("beacon-haven", Some(0), None));
//! ```

pub mod access;
pub mod board;
pub mod config;
pub mod directory;
pub mod error;
pub mod merge;
pub mod records;
pub mod remote;
pub mod shelter_id;
pub mod subscriptions;
pub mod sync;
pub mod types;
pub mod updates;

// Re-exports
pub use access::{
    email_key, normalize_email, AccessCallback, AccessPolicy, AccessWatch, Role, VolunteerAccessRecord,
    VolunteerAccessRegistry,
};
pub use board::ShelterBoard;
pub use config::{AccessConfig, BoardConfig};
pub use directory::{shelter_from_raw, shelters_from_listing, StaticDirectory};
pub use error::{BoardError, Result};
pub use merge::{merge, merge_all};
pub use records::{AppliedUpdate, ShelterStore};
pub use remote::{
    ApiMirror, MemoryOverrideStore, OverrideStore, OverrideWatch, ShelterDirectory, WatchCallback,
};
pub use shelter_id::{build_shelter_id, slugify};
pub use subscriptions::{
    BoardEvent, DetachReason, EventReceiver, Subscriber, Subscription, SubscriptionId,
    SubscriptionManager,
};
pub use sync::{SyncGateway, SyncJob, SyncStats};
pub use types::*;
pub use updates::{apply_update, apply_update_at, override_for_update};
