//! Override merging.
//!
//! An override only ever touches the availability block. Identity,
//! location and distance always come from the base record.

use crate::types::{Shelter, ShelterOverride};

/// Produce the effective shelter from a base record and its override.
///
/// `merge(base, None)` is the identity.
pub fn merge(base: &Shelter, patch: Option<&ShelterOverride>) -> Shelter {
    let mut effective = base.clone();
    let Some(patch) = patch else {
        return effective;
    };

    let availability = &mut effective.availability;
    if let Some(beds) = patch.beds_available {
        availability.beds_available = beds;
    }
    if let Some(status) = patch.status {
        availability.status = status;
    }
    if let Some(meals) = &patch.meals {
        availability.meals = meals.clone();
    }
    if let Some(services) = &patch.services {
        availability.services = services.clone();
    }
    if let Some(needs) = &patch.urgent_needs {
        availability.urgent_needs = needs.clone();
    }
    if let Some(ts) = patch.last_updated {
        availability.last_updated = ts;
    }

    effective
}

/// Merge a batch of bases with their fetched overrides, position by position.
///
/// Missing trailing overrides are treated as absent.
pub fn merge_all(bases: &[Shelter], overrides: &[Option<ShelterOverride>]) -> Vec<Shelter> {
    bases
        .iter()
        .enumerate()
        .map(|(i, base)| merge(base, overrides.get(i).and_then(Option::as_ref)))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{Availability, AvailabilityStatus, ShelterLocation, Timestamp};
    use proptest::prelude::*;

    pub(crate) fn beacon_haven() -> Shelter {
        Shelter {
            id: "beacon-haven".to_string(),
            name: "Beacon Haven".to_string(),
            distance_miles: 0.2,
            location: ShelterLocation {
                latitude: 41.8805,
                longitude: -87.6292,
                address: "123 Hope St, Chicago, IL".to_string(),
            },
            kind: None,
            availability: Availability {
                beds_available: 5,
                status: AvailabilityStatus::Open,
                meals: "Dinner served until 8 PM. Breakfast at 7 AM.".to_string(),
                services: vec!["Showers".into(), "Casework".into(), "Day storage".into()],
                urgent_needs: vec!["Blankets".into(), "Socks".into()],
                last_updated: Timestamp(1_700_000_000_000_000),
            },
        }
    }

    fn status_strategy() -> impl Strategy<Value = AvailabilityStatus> {
        prop_oneof![
            Just(AvailabilityStatus::Open),
            Just(AvailabilityStatus::Limited),
            Just(AvailabilityStatus::Full),
        ]
    }

    fn override_strategy() -> impl Strategy<Value = ShelterOverride> {
        (
            proptest::option::of(0u32..500),
            proptest::option::of(status_strategy()),
            proptest::option::of("[a-zA-Z ]{0,20}"),
            proptest::option::of(proptest::collection::vec("[a-z]{1,8}", 0..4)),
            proptest::option::of(proptest::collection::vec("[a-z]{1,8}", 0..4)),
            proptest::option::of(0i64..2_000_000_000_000_000),
        )
            .prop_map(|(beds, status, meals, services, needs, ts)| ShelterOverride {
                beds_available: beds,
                status,
                meals,
                services,
                urgent_needs: needs,
                last_updated: ts.map(Timestamp),
            })
    }

    #[test]
    fn test_merge_identity() {
        let base = beacon_haven();
        assert_eq!(merge(&base, None), base);
        assert_eq!(merge(&base, Some(&ShelterOverride::default())), base);
    }

    #[test]
    fn test_merge_keeps_identity_and_location() {
        let base = beacon_haven();
        let patch = ShelterOverride {
            beds_available: Some(0),
            status: Some(AvailabilityStatus::Full),
            ..Default::default()
        };
        let merged = merge(&base, Some(&patch));

        assert_eq!(merged.id, base.id);
        assert_eq!(merged.name, base.name);
        assert_eq!(merged.location, base.location);
        assert_eq!(merged.distance_miles, base.distance_miles);
        assert_eq!(merged.availability.beds_available, 0);
        assert_eq!(merged.availability.status, AvailabilityStatus::Full);
        assert_eq!(merged.availability.meals, base.availability.meals);
    }

    #[test]
    fn test_merge_all_pads_missing_overrides() {
        let base = beacon_haven();
        let mut other = beacon_haven();
        other.id = "ashland-shelter".into();
        let patch = ShelterOverride {
            beds_available: Some(9),
            ..Default::default()
        };

        let merged = merge_all(&[base.clone(), other.clone()], &[Some(patch)]);
        assert_eq!(merged[0].availability.beds_available, 9);
        assert_eq!(merged[1], other);
    }

    proptest! {
        #[test]
        fn prop_merge_overlay(patch in override_strategy()) {
            let base = beacon_haven();
            let merged = merge(&base, Some(&patch));
            let a = &merged.availability;
            let b = &base.availability;

            prop_assert_eq!(a.beds_available, patch.beds_available.unwrap_or(b.beds_available));
            prop_assert_eq!(a.status, patch.status.unwrap_or(b.status));
            prop_assert_eq!(&a.meals, patch.meals.as_ref().unwrap_or(&b.meals));
            prop_assert_eq!(&a.services, patch.services.as_ref().unwrap_or(&b.services));
            prop_assert_eq!(&a.urgent_needs, patch.urgent_needs.as_ref().unwrap_or(&b.urgent_needs));
            prop_assert_eq!(a.last_updated, patch.last_updated.unwrap_or(b.last_updated));
            prop_assert_eq!(&merged.id, &base.id);
            prop_assert_eq!(&merged.location, &base.location);
        }

        #[test]
        fn prop_merge_idempotent(patch in override_strategy()) {
            let base = beacon_haven();
            let once = merge(&base, Some(&patch));
            let twice = merge(&once, Some(&patch));
            prop_assert_eq!(&once, &twice);
            prop_assert_eq!(merge(&base, Some(&patch)), once);
        }
    }
}
