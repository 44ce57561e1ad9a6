//! Configuration management for Tourbase

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration structure for Tourbase
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Real-time sync configuration
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

impl Config {
    /// Load configuration from a TOML or JSON file
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| Error::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Config = if path.as_ref().extension().map_or(false, |ext| ext == "toml") {
            toml::from_str(&content)
                .map_err(|e| Error::ConfigError(format!("Failed to parse TOML config: {}", e)))?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| Error::ConfigError(format!("Failed to parse JSON config: {}", e)))?
        };

        Ok(config)
    }
}

/// Real-time sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Liveness poll interval in seconds (default: 10)
    ///
    /// How often the liveness monitor samples connector states. Polling
    /// trades CPU for signal latency; values between 5 and 15 seconds
    /// work well for UI indicators.
    pub liveness_interval_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            liveness_interval_secs: 10,
        }
    }
}

impl RealtimeConfig {
    /// Liveness poll interval as a [`Duration`]
    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval_secs.max(1))
    }
}
