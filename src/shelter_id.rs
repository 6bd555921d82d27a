//! Stable shelter identifiers.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Disambiguates time-based ids minted within the same millisecond.
static FALLBACK_SEQ: AtomicU64 = AtomicU64::new(0);

/// Lowercase, hyphen-separated slug: whitespace and underscores become `-`,
/// anything outside `[a-z0-9-]` is dropped, repeated `-` collapse.
pub fn slugify(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.trim().to_lowercase().chars() {
        let c = if c.is_whitespace() || c == '_' { '-' } else { c };
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            continue;
        }
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    out
}

/// Derive a shelter id from its descriptive data.
///
/// Name and address win; coordinates are the fallback; a time-based id is
/// the last resort and is the only non-deterministic branch. Time-based ids
/// carry a process-wide counter so a batch never repeats one.
pub fn build_shelter_id(
    name: Option<&str>,
    address: Option<&str>,
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> String {
    let joined = [name.unwrap_or(""), address.unwrap_or("")]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("-");
    let base = slugify(&joined);
    if !base.is_empty() {
        return base;
    }

    if let (Some(lat), Some(lng)) = (latitude, longitude) {
        return format!("geo-{lat:.3}-{lng:.3}");
    }

    let seq = FALLBACK_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("shelter-{}-{seq}", Utc::now().timestamp_millis())
}
