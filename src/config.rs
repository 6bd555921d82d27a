//! Board configuration.

use crate::error::{BoardError, Result};
use serde::Deserialize;

/// Default admin accounts used when none are configured.
pub const DEFAULT_SUPER_ADMINS: [&str; 2] = ["founder@sheltersync.app", "ops@sheltersync.app"];

/// Board configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Max override fetches in flight during a replace.
    pub override_fetch_concurrency: usize,

    /// Max queued outbound sync jobs before new ones are dropped.
    pub sync_queue_capacity: usize,

    /// Buffer size for channel subscribers.
    pub event_buffer_size: usize,

    pub access: AccessConfig,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            override_fetch_concurrency: 8,
            sync_queue_capacity: 256,
            event_buffer_size: 64,
            access: AccessConfig::default(),
        }
    }
}

/// Who may administer volunteer access.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub super_admin_emails: Vec<String>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            super_admin_emails: DEFAULT_SUPER_ADMINS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Split a comma-separated email list, normalizing each entry.
pub fn parse_email_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

impl BoardConfig {
    /// Defaults overlaid with `SHELTER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("SHELTER_OVERRIDE_FETCH_CONCURRENCY") {
            config.override_fetch_concurrency = parse_usize("SHELTER_OVERRIDE_FETCH_CONCURRENCY", &raw)?;
        }
        if let Some(raw) = lookup("SHELTER_SYNC_QUEUE_CAPACITY") {
            config.sync_queue_capacity = parse_usize("SHELTER_SYNC_QUEUE_CAPACITY", &raw)?;
        }
        if let Some(raw) = lookup("SHELTER_SUPER_ADMIN_EMAILS") {
            let emails = parse_email_list(&raw);
            if !emails.is_empty() {
                config.access.super_admin_emails = emails;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse from JSON, filling missing fields with defaults.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| BoardError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.override_fetch_concurrency == 0 {
            return Err(BoardError::InvalidConfig(
                "override_fetch_concurrency must be at least 1".to_string(),
            ));
        }
        if self.sync_queue_capacity == 0 {
            return Err(BoardError::InvalidConfig(
                "sync_queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_usize(key: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse()
        .map_err(|_| BoardError::InvalidConfig(format!("{key} must be a positive integer, got {raw:?}")))
}
