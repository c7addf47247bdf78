//! Driver lifecycle contract

use crate::CapabilitySchema;
use core_types::OwnerId;
use hal::{HalError, Platform};
use resources::{ResourceError, SharedResources};
use services_endpoints::Endpoint;
use thiserror::Error;

/// Errors returned by driver calls
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("unknown parameter '{0}'")]
    UnknownParam(String),

    #[error("invalid value '{value}' for '{name}'")]
    InvalidValue { name: String, value: String },

    #[error("parameter '{0}' is read-only")]
    ReadOnly(String),

    #[error("endpoint {address} is not usable: {reason}")]
    InvalidEndpoint { address: String, reason: String },

    #[error("unknown register {0:#04x}")]
    UnknownRegister(u8),

    #[error("{0} is not supported by this driver")]
    Unsupported(String),

    #[error("resource: {0}")]
    Resource(#[from] ResourceError),

    #[error("i/o: {0}")]
    Io(#[from] HalError),
}

impl DriverError {
    /// Returns true for hardware transaction failures
    pub fn is_io(&self) -> bool {
        matches!(self, DriverError::Io(_))
    }

    pub fn invalid_value(name: &str, value: &str) -> Self {
        DriverError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn invalid_endpoint(endpoint: &Endpoint, reason: impl Into<String>) -> Self {
        DriverError::InvalidEndpoint {
            address: endpoint.address.clone(),
            reason: reason.into(),
        }
    }
}

/// Everything a driver may touch during one call
///
/// Built by the device registry for the duration of a single driver call.
/// Resource claims made through `resources` must use `owner`.
pub struct DriverIo<'a> {
    pub platform: &'a mut dyn Platform,
    pub resources: &'a SharedResources,
    pub owner: OwnerId,
    pub endpoint: &'a Endpoint,
}

/// Driver lifecycle
///
/// A driver instance is owned by exactly one device slot. Resources it
/// claims must be held in guards it owns, so dropping the instance releases
/// them.
pub trait Driver {
    /// Catalog id this instance was created from
    fn driver_id(&self) -> &'static str;

    /// Validates the endpoint, claims resources and configures hardware
    fn init(&mut self, io: &mut DriverIo<'_>) -> Result<(), DriverError>;

    /// Periodic work; runs once per scheduler tick while the device is READY
    ///
    /// Must return in bounded time.
    fn update(&mut self, _io: &mut DriverIo<'_>) -> Result<(), DriverError> {
        Ok(())
    }

    /// Called once before the instance is dropped on unbind
    fn deinit(&mut self, _io: &mut DriverIo<'_>) {}

    fn set_param(
        &mut self,
        io: &mut DriverIo<'_>,
        name: &str,
        value: &str,
    ) -> Result<(), DriverError>;

    fn get_param(&self, name: &str) -> Result<String, DriverError>;

    fn schema(&self) -> CapabilitySchema;

    /// Signal snapshot as `(name, value)` pairs
    fn read(&mut self, io: &mut DriverIo<'_>) -> Result<Vec<(String, String)>, DriverError>;

    /// Optional register access capability
    fn register_access(&mut self) -> Option<&mut dyn RegisterAccess> {
        None
    }
}

/// Register description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterInfo {
    pub address: u8,
    pub name: String,
    pub writable: bool,
}

/// Raw register access capability
pub trait RegisterAccess {
    fn registers(&self) -> Vec<RegisterInfo>;
    fn reg_read(&mut self, io: &mut DriverIo<'_>, reg: u8) -> Result<u8, DriverError>;
    fn reg_write(&mut self, io: &mut DriverIo<'_>, reg: u8, value: u8) -> Result<(), DriverError>;
}

/// Parses `0|1|true|false|on|off|high|low`
pub fn parse_bool(name: &str, value: &str) -> Result<bool, DriverError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "high" => Ok(true),
        "0" | "false" | "off" | "low" => Ok(false),
        _ => Err(DriverError::invalid_value(name, value)),
    }
}

/// Parses an integer within `min..=max`; `0x` prefixes are accepted
pub fn parse_int(name: &str, value: &str, min: i64, max: i64) -> Result<i64, DriverError> {
    let text = value.trim();
    let parsed = match text.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => text.parse::<i64>(),
    };
    match parsed {
        Ok(v) if (min..=max).contains(&v) => Ok(v),
        _ => Err(DriverError::invalid_value(name, value)),
    }
}

/// Formats a bool the way parameters report it
pub fn bool_str(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}
