//! Settings file
//!
//! Optional TOML (or JSON) file for what the command line does not cover:
//!
//! ```toml
//! [discovery]
//! port = 11451
//! broadcast = "255.255.255.255"
//! timeout_secs = 5
//!
//! [engine]
//! program = "tun2socks"
//! args = ["-device", "tun://{iface}", "-proxy", "{proxy}"]
//! startup_grace_ms = 500
//! ```
//!
//! Every field is optional.

use lanlink_discovery::{DiscoveryOptions, DISCOVERY_PORT, SCAN_TIMEOUT};
use lanlink_session::EngineConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Settings errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse settings: {0}")]
    Parse(String),

    #[error("Unsupported settings format (use .toml or .json)")]
    UnsupportedFormat,

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Discovery section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Discovery port on the devices
    pub port: u16,
    /// Broadcast address
    pub broadcast: Ipv4Addr,
    /// Per-interface reply deadline (seconds)
    pub timeout_secs: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            port: DISCOVERY_PORT,
            broadcast: Ipv4Addr::BROADCAST,
            timeout_secs: SCAN_TIMEOUT.as_secs(),
        }
    }
}

impl DiscoverySettings {
    fn validate(&self) -> Result<(), SettingsError> {
        if self.port == 0 {
            return Err(SettingsError::Invalid {
                field: "discovery.port",
                reason: "must not be 0".to_string(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(SettingsError::Invalid {
                field: "discovery.timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Scanner options
    pub fn options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            broadcast: SocketAddr::new(IpAddr::V4(self.broadcast), self.port),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Whole settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub discovery: DiscoverySettings,
    pub engine: EngineConfig,
}

impl Settings {
    /// Load from a `.toml` or `.json` file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let content = || {
            std::fs::read_to_string(path).map_err(|e| SettingsError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        };

        match ext {
            "toml" => Self::from_toml(&content()?),
            "json" => Self::from_json(&content()?),
            _ => Err(SettingsError::UnsupportedFormat),
        }
    }

    /// Parse TOML
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Self =
            toml::from_str(content).map_err(|e| SettingsError::Parse(e.to_string()))?;
        settings.discovery.validate()?;
        Ok(settings)
    }

    /// Parse JSON
    pub fn from_json(content: &str) -> Result<Self, SettingsError> {
        let settings: Self =
            serde_json::from_str(content).map_err(|e| SettingsError::Parse(e.to_string()))?;
        settings.discovery.validate()?;
        Ok(settings)
    }
}
