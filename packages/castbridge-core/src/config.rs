//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CastError, CastResult};

/// Configuration for a cast session.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    // Providers
    /// Register the Google Cast provider.
    pub google_cast_enabled: bool,

    /// Register the AirPlay provider.
    pub airplay_enabled: bool,

    // Timing
    /// Interval between position polls while playing (milliseconds).
    pub position_interval_ms: u64,

    /// Give up on a connect that has not resolved after this long
    /// (milliseconds). `None` waits for the backend indefinitely.
    pub connect_timeout_ms: Option<u64>,

    // Host delivery
    /// Capacity of the host event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            google_cast_enabled: true,
            airplay_enabled: true,
            position_interval_ms: 500,
            connect_timeout_ms: None,
            event_channel_capacity: 100,
        }
    }
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> CastResult<()> {
        if !self.google_cast_enabled && !self.airplay_enabled {
            return Err(CastError::Configuration(
                "at least one provider must be enabled".to_string(),
            ));
        }
        if self.position_interval_ms == 0 {
            return Err(CastError::Configuration(
                "position_interval_ms must be >= 1".to_string(),
            ));
        }
        if self.connect_timeout_ms == Some(0) {
            return Err(CastError::Configuration(
                "connect_timeout_ms must be >= 1 when set".to_string(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(CastError::Configuration(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            ));
        }
        Ok(())
    }

    pub fn position_interval(&self) -> Duration {
        Duration::from_millis(self.position_interval_ms)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}
