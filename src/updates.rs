//! Resource-scoped update application.
//!
//! Each [`ResourceCategory`] owns a disjoint slice of the availability
//! block:
//!
//! | category      | fields written                         |
//! |---------------|----------------------------------------|
//! | `beds`        | `bedsAvailable`, `status`              |
//! | `meals`       | `meals` (from `mealNote`)              |
//! | `services`    | `services` (whole list)                |
//! | `urgentNeeds` | `urgentNeeds` (whole list)             |
//!
//! Every known category also refreshes `lastUpdated`. Fields the payload
//! omits keep their prior value.

use crate::types::{ResourceCategory, Shelter, ShelterOverride, ShelterUpdatePayload, Timestamp};

/// Apply `payload` to `current`, stamping the result strictly after the
/// shelter's previous `lastUpdated`.
///
/// An unknown category returns `current` unchanged.
pub fn apply_update(current: &Shelter, payload: &ShelterUpdatePayload) -> Shelter {
    let at = Timestamp::now_after(current.availability.last_updated);
    apply_update_at(current, payload, at)
}

/// Like [`apply_update`] with an explicit apply time.
pub fn apply_update_at(current: &Shelter, payload: &ShelterUpdatePayload, at: Timestamp) -> Shelter {
    let mut next = current.clone();
    let availability = &mut next.availability;

    match payload.resource {
        ResourceCategory::Beds => {
            if let Some(beds) = payload.beds_available {
                availability.beds_available = beds;
            }
            if let Some(status) = payload.status {
                availability.status = status;
            }
        }
        ResourceCategory::Meals => {
            if let Some(note) = &payload.meal_note {
                availability.meals = note.clone();
            }
        }
        ResourceCategory::Services => {
            if let Some(services) = &payload.services {
                availability.services = services.clone();
            }
        }
        ResourceCategory::UrgentNeeds => {
            if let Some(needs) = &payload.urgent_needs {
                availability.urgent_needs = needs.clone();
            }
        }
        ResourceCategory::Unknown => return next,
    }

    availability.last_updated = at;
    next
}

/// The sparse patch to persist for an applied update.
///
/// Carries only the fields `payload` provided for its category, plus the
/// `lastUpdated` stamped on `applied`. `None` for unknown categories.
pub fn override_for_update(
    payload: &ShelterUpdatePayload,
    applied: &Shelter,
) -> Option<ShelterOverride> {
    let mut patch = ShelterOverride {
        last_updated: Some(applied.availability.last_updated),
        ..Default::default()
    };

    match payload.resource {
        ResourceCategory::Beds => {
            patch.beds_available = payload.beds_available;
            patch.status = payload.status;
        }
        ResourceCategory::Meals => patch.meals = payload.meal_note.clone(),
        ResourceCategory::Services => patch.services = payload.services.clone(),
        ResourceCategory::UrgentNeeds => patch.urgent_needs = payload.urgent_needs.clone(),
        ResourceCategory::Unknown => return None,
    }

    Some(patch)
}
