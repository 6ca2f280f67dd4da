//! Simulator configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use castbridge_core::sim::{SimReceiver, SimulatedAirPlay, SimulatedGoogleCast};
use castbridge_core::Backends;
use serde::Deserialize;

/// A simulated Cast receiver as written in the config file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ReceiverConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_true")]
    pub reachable: bool,
}

fn default_true() -> bool {
    true
}

/// Simulator configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Interval between position polls while playing (milliseconds).
    /// Override: `CASTBRIDGE_POSITION_INTERVAL_MS`
    pub position_interval_ms: u64,

    /// Connect timeout (milliseconds); unset waits forever.
    /// Override: `CASTBRIDGE_CONNECT_TIMEOUT_MS`
    pub connect_timeout_ms: Option<u64>,

    /// Register the Google Cast provider.
    pub google_cast_enabled: bool,

    /// Register the AirPlay provider.
    pub airplay_enabled: bool,

    /// Simulated Cast receivers.
    pub receivers: Vec<ReceiverConfig>,

    /// Names of simulated AirPlay routes; the picker selects the first.
    /// Override: `CASTBRIDGE_AIRPLAY_ROUTES` (comma separated)
    pub airplay_routes: Vec<String>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            position_interval_ms: 500,
            connect_timeout_ms: None,
            google_cast_enabled: true,
            airplay_enabled: true,
            receivers: vec![
                ReceiverConfig {
                    id: "cast_living_room".to_string(),
                    name: "Living Room TV".to_string(),
                    model: Some("Chromecast Ultra".to_string()),
                    reachable: true,
                },
                ReceiverConfig {
                    id: "cast_kitchen".to_string(),
                    name: "Kitchen Speaker".to_string(),
                    model: Some("Nest Audio".to_string()),
                    reachable: true,
                },
            ],
            airplay_routes: vec!["Bedroom Apple TV".to_string()],
        }
    }
}

impl SimConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CASTBRIDGE_POSITION_INTERVAL_MS") {
            if let Ok(interval) = val.parse() {
                self.position_interval_ms = interval;
            }
        }

        if let Ok(val) = std::env::var("CASTBRIDGE_CONNECT_TIMEOUT_MS") {
            if let Ok(timeout) = val.parse() {
                self.connect_timeout_ms = Some(timeout);
            }
        }

        if let Ok(val) = std::env::var("CASTBRIDGE_AIRPLAY_ROUTES") {
            self.airplay_routes = val
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    /// Converts to castbridge-core's Config type.
    pub fn to_core_config(&self) -> castbridge_core::Config {
        castbridge_core::Config {
            google_cast_enabled: self.google_cast_enabled,
            airplay_enabled: self.airplay_enabled,
            position_interval_ms: self.position_interval_ms,
            connect_timeout_ms: self.connect_timeout_ms,
            ..Default::default()
        }
    }

    /// Builds the simulated backends for the enabled providers.
    pub fn backends(&self) -> Backends {
        let receivers = self
            .receivers
            .iter()
            .map(|r| {
                let mut receiver = SimReceiver::new(r.id.clone(), r.name.clone());
                receiver.model = r.model.clone();
                receiver.reachable = r.reachable;
                receiver
            })
            .collect();

        Backends {
            google_cast: self
                .google_cast_enabled
                .then(|| Arc::new(SimulatedGoogleCast::new(receivers)) as _),
            airplay: self
                .airplay_enabled
                .then(|| Arc::new(SimulatedAirPlay::new(self.airplay_routes.clone())) as _),
        }
    }
}
