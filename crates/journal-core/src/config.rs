//! Configuration module for sharded journals

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::store::IndexSpec;

/// Default period between metadata refreshes on read-only instances
pub const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_secs(60);

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("journal name must not be empty")]
    EmptyName,

    #[error("shard interval must be greater than zero")]
    ZeroInterval,

    #[error("refresh period must be greater than zero")]
    ZeroRefreshPeriod,

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Journal (logical collection) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Tags log lines of this instance
    pub instance_id: String,

    /// Logical collection name, prefix of every shard name
    pub name: String,

    /// Identifier span covered by one shard
    pub interval: u64,

    /// Indexes ensured on every shard written to
    pub indexes: Vec<IndexSpec>,

    /// Never writes metadata; refreshes it on a timer instead
    pub read_only: bool,

    /// Refresh period used in read-only mode
    pub refresh_period: Duration,
}

impl JournalConfig {
    /// Create a writer configuration
    pub fn new(name: impl Into<String>, interval: u64) -> Self {
        Self {
            instance_id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            interval,
            indexes: vec![],
            read_only: false,
            refresh_period: DEFAULT_REFRESH_PERIOD,
        }
    }

    pub fn with_indexes(mut self, indexes: Vec<IndexSpec>) -> Self {
        self.indexes = indexes;
        self
    }

    /// Switch to read-only (replica) mode
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_refresh_period(mut self, period: Duration) -> Self {
        self.refresh_period = period;
        self
    }

    /// Reject settings the router cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.interval == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.refresh_period.is_zero() {
            return Err(ConfigError::ZeroRefreshPeriod);
        }
        Ok(())
    }

    /// Load configuration from environment variables
    ///
    /// Unset variables keep their defaults; set but unparsable ones are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = JournalConfig::new("journal", 1_000_000);

        if let Ok(name) = std::env::var("JOURNAL_NAME") {
            config.name = name;
        }

        if let Ok(interval) = std::env::var("JOURNAL_INTERVAL") {
            config.interval = parse_var("JOURNAL_INTERVAL", &interval)?;
        }

        if let Ok(read_only) = std::env::var("JOURNAL_READ_ONLY") {
            config.read_only = match read_only.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" | "" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "JOURNAL_READ_ONLY",
                        value: read_only,
                    })
                }
            };
        }

        if let Ok(secs) = std::env::var("JOURNAL_REFRESH_SECS") {
            config.refresh_period = Duration::from_secs(parse_var("JOURNAL_REFRESH_SECS", &secs)?);
        }

        if let Ok(instance_id) = std::env::var("JOURNAL_INSTANCE_ID") {
            if !instance_id.trim().is_empty() {
                config.instance_id = instance_id;
            }
        }

        Ok(config)
    }
}

fn parse_var(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}
