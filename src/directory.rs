//! Mapping of loosely-shaped upstream directory records into [`Shelter`]s,
//! and a static in-memory [`ShelterDirectory`].

use crate::error::{BoardError, Result};
use crate::remote::ShelterDirectory;
use crate::shelter_id::build_shelter_id;
use crate::types::{
    Availability, AvailabilityStatus, Shelter, ShelterKind, ShelterLocation, Timestamp,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

const UNKNOWN_NAME: &str = "Unknown shelter";
const NO_MEAL_INFO: &str = "No meal info";

/// First of `keys` (dotted paths allowed) that resolves to a non-null value.
fn lookup<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| {
        let mut current = raw;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        (!current.is_null()).then_some(current)
    })
}

fn non_empty_str<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| lookup(raw, &[*key]).and_then(Value::as_str).filter(|s| !s.is_empty()))
}

fn as_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

fn number(raw: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| lookup(raw, &[*key]).and_then(as_number))
}

fn coordinate(raw: &Value, keys: &[&str], index: usize) -> Option<f64> {
    number(raw, keys).or_else(|| {
        raw.get("coordinates")
            .and_then(|c| c.get(index))
            .and_then(as_number)
    })
}

fn labels(raw: &Value, keys: &[&str]) -> Vec<String> {
    match lookup(raw, keys) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => {
            s.split(',').map(|part| part.trim().to_string()).collect()
        }
        _ => Vec::new(),
    }
}

fn raw_id(raw: &Value) -> Option<String> {
    match lookup(raw, &["id", "_id"])? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Map one upstream record to a base [`Shelter`], filling safe defaults.
pub fn shelter_from_raw(raw: &Value) -> Shelter {
    let name = non_empty_str(raw, &["name", "title"]);
    let address = non_empty_str(raw, &["full_address", "location.address", "location.display"]);
    let latitude = coordinate(raw, &["latitude", "lat", "location.lat"], 1);
    let longitude = coordinate(raw, &["longitude", "lng", "location.lng"], 0);

    let id = raw_id(raw).unwrap_or_else(|| build_shelter_id(name, address, latitude, longitude));

    let beds = number(raw, &["bedsAvailable", "available_beds", "capacity"])
        .map(|n| n.max(0.0).min(u32::MAX as f64) as u32)
        .unwrap_or(0);
    let status = lookup(raw, &["status"])
        .and_then(Value::as_str)
        .and_then(AvailabilityStatus::parse)
        .unwrap_or_else(|| AvailabilityStatus::from_beds(beds));
    let kind = lookup(raw, &["type"]).and_then(Value::as_str).map(|t| match t {
        "shelter" => ShelterKind::Shelter,
        "foodbank" => ShelterKind::Foodbank,
        _ => ShelterKind::Other,
    });
    let last_updated = non_empty_str(raw, &["lastUpdated", "updated_at"])
        .and_then(Timestamp::parse)
        .unwrap_or_else(Timestamp::now);

    Shelter {
        id,
        name: name.unwrap_or(UNKNOWN_NAME).to_string(),
        distance_miles: number(raw, &["distanceMiles", "distance"])
            .filter(|d| *d >= 0.0)
            .unwrap_or(0.0),
        location: ShelterLocation {
            latitude: latitude.unwrap_or(0.0),
            longitude: longitude.unwrap_or(0.0),
            address: address.unwrap_or_default().to_string(),
        },
        kind,
        availability: Availability {
            beds_available: beds,
            status,
            meals: non_empty_str(raw, &["meals", "meal_note"])
                .unwrap_or(NO_MEAL_INFO)
                .to_string(),
            services: labels(raw, &["services"]),
            urgent_needs: labels(raw, &["urgentNeeds", "urgent_needs"]),
            last_updated,
        },
    }
}

/// Map a listing response: a bare array or an object with an `items` array.
/// Anything else yields no shelters.
pub fn shelters_from_listing(listing: &Value) -> Vec<Shelter> {
    let items: &[Value] = match listing {
        Value::Array(items) => items.as_slice(),
        other => match other.get("items") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        },
    };
    items.iter().map(shelter_from_raw).collect()
}

/// Directory backed by fixed in-memory lists.
#[derive(Default)]
pub struct StaticDirectory {
    default_list: RwLock<Vec<Shelter>>,
    searches: RwLock<HashMap<(String, String), Vec<Shelter>>>,
    failing: AtomicBool,
}

impl StaticDirectory {
    pub fn new(default_list: Vec<Shelter>) -> Self {
        Self {
            default_list: RwLock::new(default_list),
            ..Default::default()
        }
    }

    /// Replace the default listing.
    pub fn set_default(&self, shelters: Vec<Shelter>) {
        *self.default_list.write() = shelters;
    }

    /// Register search results for a city/state pair (case-insensitive).
    pub fn insert_search(&self, city: &str, state: &str, shelters: Vec<Shelter>) {
        self.searches.write().insert(search_key(city, state), shelters);
    }

    /// Make every lookup fail (or succeed again).
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BoardError::Fetch("directory unavailable".to_string()));
        }
        Ok(())
    }
}

fn search_key(city: &str, state: &str) -> (String, String) {
    (city.trim().to_lowercase(), state.trim().to_lowercase())
}

#[async_trait]
impl ShelterDirectory for StaticDirectory {
    async fn fetch_all(&self) -> Result<Vec<Shelter>> {
        self.check()?;
        Ok(self.default_list.read().clone())
    }

    async fn search(&self, city: &str, state: &str) -> Result<Vec<Shelter>> {
        if city.trim().is_empty() || state.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.check()?;
        Ok(self
            .searches
            .read()
            .get(&search_key(city, state))
            .cloned()
            .unwrap_or_default())
    }
}
