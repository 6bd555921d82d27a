//! Snapshot store for the working shelter set.

use crate::merge::merge;
use crate::types::{ResourceCategory, Shelter, ShelterList, ShelterOverride, ShelterUpdatePayload};
use crate::updates::{apply_update, override_for_update};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A local patch applied to the snapshot but not yet settled remotely.
struct PendingPatch {
    seq: u64,
    patch: ShelterOverride,
}

/// Result of applying an update locally.
#[derive(Clone, Debug)]
pub struct AppliedUpdate {
    /// The shelter as readers now see it.
    pub shelter: Shelter,
    /// Snapshot containing `shelter`.
    pub snapshot: ShelterList,
    /// Sparse patch to persist; stays overlaid until [`ShelterStore::settle`].
    pub patch: ShelterOverride,
    pub seq: u64,
}

struct StoreState {
    /// Unmerged records from the last replace, keyed by id.
    bases: HashMap<String, Shelter>,
    /// Effective records in caller order.
    snapshot: ShelterList,
    /// Unsettled local patches per shelter, oldest first.
    pending: HashMap<String, Vec<PendingPatch>>,
    next_seq: u64,
}

impl StoreState {
    /// Overlay every unsettled local patch for `id` onto `shelter`.
    fn overlay_pending(&self, shelter: Shelter) -> Shelter {
        match self.pending.get(&shelter.id) {
            Some(patches) => patches
                .iter()
                .fold(shelter, |acc, p| merge(&acc, Some(&p.patch))),
            None => shelter,
        }
    }
}

/// Owns the current shelter list.
///
/// Readers get cheap `Arc` snapshots; writers swap in a new list under a
/// short write lock. No lock is held while callers use a snapshot.
///
/// Local updates stay overlaid on top of whatever the remote store reports
/// until their sync job settles them, so a remote change to one field never
/// rolls back a local write that is still in flight.
pub struct ShelterStore {
    state: RwLock<StoreState>,
}

impl ShelterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState {
                bases: HashMap::new(),
                snapshot: Arc::new(Vec::new()),
                pending: HashMap::new(),
                next_seq: 1,
            }),
        }
    }

    /// Current effective snapshot.
    pub fn snapshot(&self) -> ShelterList {
        Arc::clone(&self.state.read().snapshot)
    }

    pub fn len(&self) -> usize {
        self.state.read().snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().snapshot.is_empty()
    }

    /// Ids in snapshot order.
    pub fn ids(&self) -> Vec<String> {
        self.state.read().snapshot.iter().map(|s| s.id.clone()).collect()
    }

    /// Effective record for `id`.
    pub fn get(&self, id: &str) -> Option<Shelter> {
        self.state.read().snapshot.iter().find(|s| s.id == id).cloned()
    }

    /// Number of local patches not yet settled, across all shelters.
    pub fn pending_len(&self) -> usize {
        self.state.read().pending.values().map(Vec::len).sum()
    }

    /// Install a new working set wholesale.
    ///
    /// `bases` and `effective` must be the same length and in the same order.
    /// Unsettled local patches are overlaid onto `effective`.
    pub fn install(&self, bases: Vec<Shelter>, effective: Vec<Shelter>) -> ShelterList {
        debug_assert_eq!(bases.len(), effective.len());
        let mut state = self.state.write();
        let effective: Vec<Shelter> = effective
            .into_iter()
            .map(|s| state.overlay_pending(s))
            .collect();

        let snapshot = Arc::new(effective);
        state.bases = bases.into_iter().map(|s| (s.id.clone(), s)).collect();
        state.snapshot = Arc::clone(&snapshot);
        snapshot
    }

    /// Drop every record. Unsettled patches are kept until their jobs finish.
    pub fn clear(&self) -> ShelterList {
        self.install(Vec::new(), Vec::new())
    }

    /// Apply an update to the matching shelter and install the result.
    ///
    /// The persisted patch is recorded as pending. Returns `None` if the id
    /// is not in the working set or the category is unknown.
    pub fn apply(&self, payload: &ShelterUpdatePayload) -> Option<AppliedUpdate> {
        if payload.resource == ResourceCategory::Unknown {
            return None;
        }
        let mut state = self.state.write();
        let position = state.snapshot.iter().position(|s| s.id == payload.shelter_id)?;
        let updated = apply_update(&state.snapshot[position], payload);
        let patch = override_for_update(payload, &updated)?;

        let seq = state.next_seq;
        state.next_seq += 1;
        state
            .pending
            .entry(payload.shelter_id.clone())
            .or_default()
            .push(PendingPatch {
                seq,
                patch: patch.clone(),
            });

        let snapshot = Arc::new(splice(&state.snapshot, position, updated.clone()));
        state.snapshot = Arc::clone(&snapshot);
        Some(AppliedUpdate {
            shelter: updated,
            snapshot,
            patch,
            seq,
        })
    }

    /// Re-merge one shelter against a freshly observed override.
    ///
    /// Unsettled local patches for `id` are overlaid after `patch`. The
    /// shelter keeps its position; all others are untouched. Returns `None`
    /// if `id` is no longer part of the working set.
    pub fn remerge(&self, id: &str, patch: Option<&ShelterOverride>) -> Option<ShelterList> {
        let mut state = self.state.write();
        let base = state.bases.get(id)?;
        let merged = state.overlay_pending(merge(base, patch));
        let position = state.snapshot.iter().position(|s| s.id == id)?;

        let snapshot = Arc::new(splice(&state.snapshot, position, merged));
        state.snapshot = Arc::clone(&snapshot);
        Some(snapshot)
    }

    /// Retire the pending patch `seq` for `id` once its sync job finished,
    /// whatever the outcome. The snapshot is left as is.
    pub fn settle(&self, id: &str, seq: u64) -> bool {
        let mut state = self.state.write();
        let Some(patches) = state.pending.get_mut(id) else {
            return false;
        };
        let before = patches.len();
        patches.retain(|p| p.seq != seq);
        let removed = patches.len() != before;
        if patches.is_empty() {
            state.pending.remove(id);
        }
        removed
    }
}

impl Default for ShelterStore {
    fn default() -> Self {
        Self::new()
    }
}

fn splice(list: &[Shelter], position: usize, replacement: Shelter) -> Vec<Shelter> {
    let mut next = Vec::with_capacity(list.len());
    next.extend_from_slice(&list[..position]);
    next.push(replacement);
    next.extend_from_slice(&list[position + 1..]);
    next
}
