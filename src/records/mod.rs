//! The in-memory shelter record store.
//!
//! Holds the base records last installed by a replace together with the
//! effective (merged) snapshot handed out to readers. Snapshots are
//! copy-on-write: every mutation installs a new [`ShelterList`].

mod store;

pub use store::{AppliedUpdate, ShelterStore};
