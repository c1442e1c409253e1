//! Pipeline configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::cache::DEFAULT_EVENT_CAPACITY;
use crate::error::{DisclosureError, DisclosureResult};
use crate::fetch::DEFAULT_SERVICE_NOTICE_WINDOW;

/// Tunables for a disclosure session.
///
/// Every field has a default, so a config file only needs the keys it
/// overrides:
///
/// ```json
/// { "service_notice_window_secs": 60 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisclosureConfig {
    /// Minimum seconds between two "service degraded" notices
    pub service_notice_window_secs: u64,
    /// Capacity of the cache change broadcast channel
    pub event_channel_capacity: usize,
}

impl Default for DisclosureConfig {
    fn default() -> Self {
        Self {
            service_notice_window_secs: DEFAULT_SERVICE_NOTICE_WINDOW.as_secs(),
            event_channel_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl DisclosureConfig {
    pub fn service_notice_window(&self) -> Duration {
        Duration::from_secs(self.service_notice_window_secs)
    }

    pub fn validate(&self) -> DisclosureResult<()> {
        if self.service_notice_window_secs == 0 {
            return Err(DisclosureError::Config(
                "service_notice_window_secs must be at least 1".to_string(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(DisclosureError::Config(
                "event_channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> DisclosureResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DisclosureError::Config(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> DisclosureResult<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }
}
