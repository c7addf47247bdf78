//! Kernel configuration
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration. Unknown fields are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Parse(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("probe range {start:#04x}..={end:#04x} is not a valid 7-bit range")]
    ProbeRange { start: u8, end: u8 },
}

/// Capacities, service intervals and persistence policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelConfig {
    /// Device slots
    pub max_devices: usize,
    /// Endpoint table entries
    pub max_endpoints: usize,
    /// Resource claim table entries
    pub max_resources: usize,
    /// Retained log entries
    pub log_capacity: usize,
    /// Ticks between health reports
    pub health_interval: u64,
    /// Ticks between telemetry samples
    pub telemetry_interval: u64,
    /// Ticks between checks for a pending save
    pub persist_interval: u64,
    /// Request a save after every configuration change
    pub autosave: bool,
    /// First address tried by `ep.probe`
    pub probe_start: u8,
    /// Last address tried by `ep.probe`
    pub probe_end: u8,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_devices: 16,
            max_endpoints: 32,
            max_resources: 64,
            log_capacity: 128,
            health_interval: 1000,
            telemetry_interval: 100,
            persist_interval: 50,
            autosave: true,
            probe_start: 0x08,
            probe_end: 0x77,
        }
    }
}

impl KernelConfig {
    /// Parses and validates a JSON configuration
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: KernelConfig =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sizes = [
            ("max_devices", self.max_devices as u64),
            ("max_endpoints", self.max_endpoints as u64),
            ("max_resources", self.max_resources as u64),
            ("log_capacity", self.log_capacity as u64),
            ("health_interval", self.health_interval),
            ("telemetry_interval", self.telemetry_interval),
            ("persist_interval", self.persist_interval),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero(name));
        }
        if self.probe_start > self.probe_end || self.probe_end > hal::I2C_ADDR_MAX {
            return Err(ConfigError::ProbeRange {
                start: self.probe_start,
                end: self.probe_end,
            });
        }
        Ok(())
    }

    /// Addresses scanned by a bus probe
    pub fn probe_range(&self) -> RangeInclusive<u8> {
        self.probe_start..=self.probe_end
    }
}
