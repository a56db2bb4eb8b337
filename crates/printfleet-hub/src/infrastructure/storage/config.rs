//! TOML configuration for the hub.
//!
//! ```toml
//! [hub]
//! log_level = "info"
//!
//! [polling]
//! interval_ms = 3000
//! inactive_interval_ms = 3000
//! tick_timeout_ms = 5000
//! failure_threshold = 5
//!
//! [backend]
//! init_timeout_ms = 15000
//! command_timeout_ms = 10000
//!
//! [relay]
//! port_min = 8181
//! port_max = 8190
//!
//! [[printers]]
//! name = "Workshop 5M Pro"
//! address = "192.168.1.50"
//! serial_number = "SNMOMC9900001"
//! model = "Adventurer 5M Pro"
//!
//! [printers.overrides]
//! camera_url = "http://192.168.1.60:8080/stream"
//! led = true
//! ```
//!
//! # Serde default values
//!
//! Every section and field falls back to a default when absent, so an empty
//! file (or no file at all) yields a working configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use printfleet_core::ConnectionParameters;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::backend_coordinator::BackendSettings;
use crate::application::fleet::FleetSettings;
use crate::application::polling_coordinator::PollingSettings;
use crate::infrastructure::relay::{PortError, PortRange};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Relay(#[from] PortError),
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub printers: Vec<PrinterEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HubConfig {
    /// `tracing` level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollingConfig {
    /// Poll period of the active session.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Poll period of every other session.
    #[serde(default = "default_interval_ms")]
    pub inactive_interval_ms: u64,
    /// Upper bound on one status query.
    #[serde(default = "default_tick_timeout_ms")]
    pub tick_timeout_ms: u64,
    /// Consecutive failed ticks before a session is marked degraded.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    /// Upper bound on connect + hardware probe.
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,
    /// Upper bound on one dispatched operation.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    #[serde(default = "default_port_min")]
    pub port_min: u16,
    #[serde(default = "default_port_max")]
    pub port_max: u16,
}

/// A known printer and its per-printer capability overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrinterEntry {
    pub name: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub force_legacy: bool,
    #[serde(default)]
    pub overrides: PrinterOverrides,
}

/// User-facing override switches. Absent means "no override".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PrinterOverrides {
    /// Custom camera stream; enables the camera on any backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_url: Option<String>,
    /// `false` hides the camera even when the printer has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<bool>,
    /// `true` enables custom LEDs driven through G-code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub led: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtration: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_station: Option<bool>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_interval_ms() -> u64 {
    3000
}
fn default_tick_timeout_ms() -> u64 {
    5000
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_init_timeout_ms() -> u64 {
    15_000
}
fn default_command_timeout_ms() -> u64 {
    10_000
}
fn default_port_min() -> u16 {
    8181
}
fn default_port_max() -> u16 {
    8190
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            inactive_interval_ms: default_interval_ms(),
            tick_timeout_ms: default_tick_timeout_ms(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            init_timeout_ms: default_init_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port_min: default_port_min(),
            port_max: default_port_max(),
        }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl PrinterEntry {
    pub fn connection_parameters(&self) -> ConnectionParameters {
        ConnectionParameters {
            display_name: self.name.clone(),
            address: self.address.clone(),
            serial_number: self.serial_number.clone(),
            check_code: self.check_code.clone(),
            model: self.model.clone(),
            force_legacy: self.force_legacy,
        }
    }
}

impl AppConfig {
    /// Checks value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.polling;
        if p.interval_ms == 0 || p.inactive_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "polling intervals must be greater than zero".to_string(),
            ));
        }
        if p.tick_timeout_ms == 0 || self.backend.init_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be greater than zero".to_string()));
        }
        if p.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "failure_threshold must be at least 1".to_string(),
            ));
        }
        PortRange::new(self.relay.port_min, self.relay.port_max)?;
        Ok(())
    }

    /// Builds the coordinator settings. Fails on an invalid relay range.
    pub fn fleet_settings(&self) -> Result<FleetSettings, ConfigError> {
        self.validate()?;
        Ok(FleetSettings {
            polling: PollingSettings {
                interval: Duration::from_millis(self.polling.interval_ms),
                inactive_interval: Duration::from_millis(self.polling.inactive_interval_ms),
                tick_timeout: Duration::from_millis(self.polling.tick_timeout_ms),
                failure_threshold: self.polling.failure_threshold,
            },
            backend: BackendSettings {
                init_timeout: Duration::from_millis(self.backend.init_timeout_ms),
                command_timeout: Duration::from_millis(self.backend.command_timeout_ms),
            },
            relay_ports: PortRange::new(self.relay.port_min, self.relay.port_max)?,
        })
    }
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
