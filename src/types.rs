//! Core types for the shelter board.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Microseconds since Unix epoch, serialized as an RFC 3339 string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// 0001-01-01T00:00:00Z, the earliest instant RFC 3339 can express.
    pub const MIN: Timestamp = Timestamp(-62_135_596_800_000_000);
    /// 9999-12-31T23:59:59.999999Z, the latest instant RFC 3339 can express.
    pub const MAX: Timestamp = Timestamp(253_402_300_799_999_999);

    /// Current time.
    pub fn now() -> Self {
        Timestamp(Utc::now().timestamp_micros())
    }

    /// Current time, but never earlier than one microsecond after `prev`.
    pub fn now_after(prev: Timestamp) -> Self {
        let now = Self::now();
        if now > prev {
            now
        } else {
            Timestamp(prev.0.saturating_add(1))
        }
    }

    /// Parse an RFC 3339 / ISO-8601 string.
    pub fn parse(s: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| Timestamp(dt.with_timezone(&Utc).timestamp_micros()))
    }

    /// Render as an RFC 3339 string with microsecond precision. Values
    /// outside [`Timestamp::MIN`]..=[`Timestamp::MAX`] render as the nearest
    /// bound, so the output always parses back.
    pub fn to_rfc3339(&self) -> String {
        let micros = self.0.clamp(Self::MIN.0, Self::MAX.0);
        DateTime::<Utc>::from_timestamp_micros(micros)
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.to_rfc3339())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Timestamp::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}

/// Bed availability status. Nothing outside these three is ever persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityStatus {
    Open,
    Limited,
    Full,
}

impl AvailabilityStatus {
    /// Status implied by a bed count: none is full, fewer than three is limited.
    pub fn from_beds(beds: u32) -> Self {
        match beds {
            0 => AvailabilityStatus::Full,
            1 | 2 => AvailabilityStatus::Limited,
            _ => AvailabilityStatus::Open,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(AvailabilityStatus::Open),
            "limited" => Some(AvailabilityStatus::Limited),
            "full" => Some(AvailabilityStatus::Full),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AvailabilityStatus::Open => "open",
            AvailabilityStatus::Limited => "limited",
            AvailabilityStatus::Full => "full",
        }
    }
}

impl fmt::Display for AvailabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification reported by the upstream directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShelterKind {
    Shelter,
    Foodbank,
    Other,
}

/// Where a shelter is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShelterLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
}

/// The mutable part of a shelter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub beds_available: u32,
    pub status: AvailabilityStatus,
    /// Free-text meal note.
    pub meals: String,
    pub services: Vec<String>,
    pub urgent_needs: Vec<String>,
    pub last_updated: Timestamp,
}

/// A physical aid location.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shelter {
    /// Stable across refetches so overrides keep attaching.
    pub id: String,
    pub name: String,
    pub distance_miles: f64,
    pub location: ShelterLocation,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ShelterKind>,
    pub availability: Availability,
}

/// An immutable snapshot of the working shelter list.
///
/// Every mutation installs a fresh list, so holders of an older snapshot
/// keep a consistent view.
pub type ShelterList = Arc<Vec<Shelter>>;

/// Sparse, persisted patch of one shelter's availability block.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShelterOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beds_available: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AvailabilityStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meals: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgent_needs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<Timestamp>,
}

impl ShelterOverride {
    /// Overlay `patch` onto `self`, field by field. Fields absent in the
    /// patch keep their current value.
    pub fn absorb(&mut self, patch: ShelterOverride) {
        if patch.beds_available.is_some() {
            self.beds_available = patch.beds_available;
        }
        if patch.status.is_some() {
            self.status = patch.status;
        }
        if patch.meals.is_some() {
            self.meals = patch.meals;
        }
        if patch.services.is_some() {
            self.services = patch.services;
        }
        if patch.urgent_needs.is_some() {
            self.urgent_needs = patch.urgent_needs;
        }
        if patch.last_updated.is_some() {
            self.last_updated = patch.last_updated;
        }
    }
}

/// One of four disjoint update scopes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceCategory {
    Beds,
    Meals,
    Services,
    UrgentNeeds,
    /// Any tag this crate does not know. Applying it is a no-op.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceCategory::Beds => "beds",
            ResourceCategory::Meals => "meals",
            ResourceCategory::Services => "services",
            ResourceCategory::UrgentNeeds => "urgentNeeds",
            ResourceCategory::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A resource-scoped update request.
///
/// Only the fields belonging to `resource` are honored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShelterUpdatePayload {
    pub shelter_id: String,
    pub resource: ResourceCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AvailabilityStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beds_available: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgent_needs: Option<Vec<String>>,
    /// Free-text volunteer note. Carried to the mirror, never persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ShelterUpdatePayload {
    fn empty(shelter_id: impl Into<String>, resource: ResourceCategory) -> Self {
        Self {
            shelter_id: shelter_id.into(),
            resource,
            status: None,
            beds_available: None,
            meal_note: None,
            services: None,
            urgent_needs: None,
            note: None,
        }
    }

    /// Beds update. Either field may be omitted.
    pub fn beds(
        shelter_id: impl Into<String>,
        beds_available: Option<u32>,
        status: Option<AvailabilityStatus>,
    ) -> Self {
        Self {
            beds_available,
            status,
            ..Self::empty(shelter_id, ResourceCategory::Beds)
        }
    }

    pub fn meals(shelter_id: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            meal_note: Some(note.into()),
            ..Self::empty(shelter_id, ResourceCategory::Meals)
        }
    }

    pub fn services(shelter_id: impl Into<String>, services: Vec<String>) -> Self {
        Self {
            services: Some(services),
            ..Self::empty(shelter_id, ResourceCategory::Services)
        }
    }

    pub fn urgent_needs(shelter_id: impl Into<String>, needs: Vec<String>) -> Self {
        Self {
            urgent_needs: Some(needs),
            ..Self::empty(shelter_id, ResourceCategory::UrgentNeeds)
        }
    }

    /// Attach a volunteer note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}
