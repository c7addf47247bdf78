//! # Endpoint Registry
//!
//! Maps stable string addresses to a resource kind and a physical resource id.
//!
//! ## Philosophy
//!
//! - **Addresses are the public names of hardware**: `i2c0`, `i2c0:0x76`,
//!   `spi0:cs=5,dc=16`, `gpio.dout.2`
//! - **Buses are enumerated, pins are lazy**: bus endpoints come from the
//!   platform's bus counts at boot; GPIO endpoints appear on first bind
//! - **Never implicitly destroyed**: only an explicit unregister removes one
//!
//! The registry performs exactly one live hardware operation: probing a bus
//! endpoint for responding targets.

pub mod address;
pub mod probe;

pub use address::{parse_number, AddressError, EndpointAddress, SpiPins};
pub use probe::{ProbeReport, ProbeScan, DEFAULT_PROBE_RANGE};

use hal::{BusFamily, Platform};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default number of endpoints
pub const DEFAULT_MAX_ENDPOINTS: usize = 32;

/// Kind of endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointKind {
    I2cBus,
    SpiBus,
    UartBus,
    I2cDevice,
    SpiDevice,
    GpioDout,
    GpioDin,
}

impl EndpointKind {
    /// Bus endpoint kind for a family
    pub fn bus(family: BusFamily) -> Self {
        match family {
            BusFamily::I2c => EndpointKind::I2cBus,
            BusFamily::Spi => EndpointKind::SpiBus,
            BusFamily::Uart => EndpointKind::UartBus,
        }
    }

    pub fn is_bus(&self) -> bool {
        matches!(
            self,
            EndpointKind::I2cBus | EndpointKind::SpiBus | EndpointKind::UartBus
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKind::I2cBus => "I2C",
            EndpointKind::SpiBus => "SPI",
            EndpointKind::UartBus => "UART",
            EndpointKind::I2cDevice => "I2C_DEV",
            EndpointKind::SpiDevice => "SPI_DEV",
            EndpointKind::GpioDout => "GPIO_DOUT",
            EndpointKind::GpioDin => "GPIO_DIN",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub kind: EndpointKind,
    pub resource_id: u32,
}

impl Endpoint {
    /// Parses this endpoint's address
    pub fn parse_address(&self) -> Result<EndpointAddress, AddressError> {
        EndpointAddress::parse(&self.address)
    }
}

/// Endpoint registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("endpoint table is full ({0} entries)")]
    TableFull(usize),

    #[error("endpoint not found: {0}")]
    NotFound(String),

    #[error("invalid endpoint address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("parent bus {0} is not registered")]
    BusNotRegistered(String),

    #[error("{0} is not present on this board")]
    BusNotPresent(String),

    #[error("endpoint {0} cannot be probed")]
    NotProbeable(String),
}

/// Endpoint registry
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    endpoints: Vec<Endpoint>,
    capacity: usize,
}

impl EndpointRegistry {
    /// Creates a registry holding at most `capacity` endpoints
    pub fn new(capacity: usize) -> Self {
        Self {
            endpoints: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Registers one bus endpoint per controller the platform reports
    ///
    /// Returns the number of endpoints added. GPIO endpoints are not
    /// pre-registered.
    pub fn auto_register_endpoints(
        &mut self,
        platform: &dyn Platform,
    ) -> Result<usize, EndpointError> {
        let mut added = 0;
        for family in BusFamily::ALL {
            for index in 0..platform.bus_count(family) {
                let address = format!("{}{}", family, index);
                if self.endpoint_exists(&address) {
                    continue;
                }
                self.register_endpoint(&address, EndpointKind::bus(family), u32::from(index))?;
                added += 1;
            }
        }
        info!(added, total = self.endpoints.len(), "bus endpoints registered");
        Ok(added)
    }

    /// Registers an endpoint
    ///
    /// Idempotent: an existing address is left untouched and reported as
    /// success. Fails only when the table is full.
    pub fn register_endpoint(
        &mut self,
        address: &str,
        kind: EndpointKind,
        resource_id: u32,
    ) -> Result<(), EndpointError> {
        if self.endpoint_exists(address) {
            return Ok(());
        }
        if self.endpoints.len() >= self.capacity {
            warn!(address, capacity = self.capacity, "endpoint table full");
            return Err(EndpointError::TableFull(self.capacity));
        }
        self.endpoints.push(Endpoint {
            address: address.to_string(),
            kind,
            resource_id,
        });
        debug!(address, %kind, resource_id, "endpoint registered");
        Ok(())
    }

    /// Parses `address` and registers it under its canonical spelling
    ///
    /// Addressed endpoints require their parent bus to be registered.
    pub fn register_address(&mut self, address: &str) -> Result<Endpoint, EndpointError> {
        let parsed = EndpointAddress::parse(address)?;
        if let Some(bus) = parsed.parent_bus() {
            if !self.endpoint_exists(&bus) {
                return Err(EndpointError::BusNotRegistered(bus));
            }
        }
        let canonical = parsed.to_string();
        self.register_endpoint(&canonical, parsed.kind(), parsed.resource_id())?;
        self.get(&canonical)
            .cloned()
            .ok_or(EndpointError::NotFound(canonical))
    }

    /// Removes an endpoint
    pub fn unregister_endpoint(&mut self, address: &str) -> Result<Endpoint, EndpointError> {
        let pos = self
            .endpoints
            .iter()
            .position(|e| e.address == address)
            .ok_or_else(|| EndpointError::NotFound(address.to_string()))?;
        Ok(self.endpoints.remove(pos))
    }

    /// Resolves an endpoint for a device bind
    ///
    /// An unregistered `gpio.dout.<pin>` address is registered as a side
    /// effect; any other address must already exist.
    pub fn resolve_for_bind(&mut self, address: &str) -> Result<Endpoint, EndpointError> {
        if let Some(endpoint) = self.get(address) {
            return Ok(endpoint.clone());
        }
        match EndpointAddress::parse(address) {
            Ok(EndpointAddress::GpioDout { pin }) if address == format!("gpio.dout.{}", pin) => {
                self.register_endpoint(address, EndpointKind::GpioDout, u32::from(pin))?;
                info!(address, pin, "gpio output endpoint synthesized");
                self.get(address)
                    .cloned()
                    .ok_or_else(|| EndpointError::NotFound(address.to_string()))
            }
            _ => Err(EndpointError::NotFound(address.to_string())),
        }
    }

    pub fn endpoint_exists(&self, address: &str) -> bool {
        self.get(address).is_some()
    }

    pub fn endpoint_type(&self, address: &str) -> Option<EndpointKind> {
        self.get(address).map(|e| e.kind)
    }

    pub fn endpoint_resource(&self, address: &str) -> Option<u32> {
        self.get(address).map(|e| e.resource_id)
    }

    pub fn get(&self, address: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.address == address)
    }

    /// Endpoints in registration order
    pub fn list(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Probes an endpoint for responding targets
    ///
    /// Bus endpoints are scanned across `range`; an I2C device endpoint
    /// probes its own address. Blocks for the duration of the scan.
    pub fn probe_endpoint(
        &self,
        address: &str,
        platform: &mut dyn Platform,
        range: RangeInclusive<u8>,
    ) -> Result<ProbeReport, EndpointError> {
        let endpoint = self
            .get(address)
            .ok_or_else(|| EndpointError::NotFound(address.to_string()))?;

        let (bus_index, targets) = match endpoint.kind {
            EndpointKind::I2cBus => {
                let bus = u8::try_from(endpoint.resource_id)
                    .map_err(|_| EndpointError::NotFound(address.to_string()))?;
                (bus, range)
            }
            EndpointKind::I2cDevice => match endpoint.parse_address()? {
                EndpointAddress::I2cDevice { bus, addr } => (bus, addr..=addr),
                _ => return Err(EndpointError::NotProbeable(address.to_string())),
            },
            _ => return Err(EndpointError::NotProbeable(address.to_string())),
        };

        let bus = platform
            .i2c(bus_index)
            .ok_or_else(|| EndpointError::BusNotPresent(format!("i2c{}", bus_index)))?;
        let mut scan = ProbeScan::new(bus, targets);
        let found: Vec<u8> = scan.by_ref().collect();
        let report = ProbeReport {
            endpoint: address.to_string(),
            scanned: scan.scanned(),
            found,
        };
        info!(address, found = report.found.len(), "probe complete");
        Ok(report)
    }
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENDPOINTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hal::SimPlatform;

    fn booted(sim: &SimPlatform) -> EndpointRegistry {
        let mut registry = EndpointRegistry::default();
        registry.auto_register_endpoints(sim).unwrap();
        registry
    }

    #[test]
    fn test_auto_register_enumerates_buses() {
        let sim = SimPlatform::new();
        let registry = booted(&sim);

        let names: Vec<&str> = registry.list().iter().map(|e| e.address.as_str()).collect();
        assert_eq!(names, vec!["i2c0", "i2c1", "spi0", "spi1", "uart0"]);
        assert_eq!(registry.endpoint_type("spi1"), Some(EndpointKind::SpiBus));
        assert_eq!(registry.endpoint_resource("i2c1"), Some(1));
        assert!(!registry.endpoint_exists("gpio.dout.2"));
    }

    #[test]
    fn test_auto_register_twice_adds_nothing() {
        let sim = SimPlatform::new();
        let mut registry = booted(&sim);
        assert_eq!(registry.auto_register_endpoints(&sim), Ok(0));
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = EndpointRegistry::new(4);
        registry
            .register_endpoint("i2c0:0x76", EndpointKind::I2cDevice, 0x76)
            .unwrap();
        registry
            .register_endpoint("i2c0:0x76", EndpointKind::GpioDout, 1)
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.endpoint_type("i2c0:0x76"), Some(EndpointKind::I2cDevice));
    }

    #[test]
    fn test_register_fails_when_full() {
        let mut registry = EndpointRegistry::new(1);
        registry.register_endpoint("i2c0", EndpointKind::I2cBus, 0).unwrap();
        assert_eq!(
            registry.register_endpoint("i2c1", EndpointKind::I2cBus, 1),
            Err(EndpointError::TableFull(1))
        );
        // Existing addresses still succeed on a full table
        assert!(registry.register_endpoint("i2c0", EndpointKind::I2cBus, 0).is_ok());
    }

    #[test]
    fn test_register_address_requires_parent_bus() {
        let sim = SimPlatform::new().with_i2c_buses(1);
        let mut registry = booted(&sim);

        let endpoint = registry.register_address("i2c0:118").unwrap();
        assert_eq!(endpoint.address, "i2c0:0x76");
        assert_eq!(endpoint.kind, EndpointKind::I2cDevice);
        assert_eq!(endpoint.resource_id, 0x76);

        assert_eq!(
            registry.register_address("i2c1:0x76"),
            Err(EndpointError::BusNotRegistered("i2c1".to_string()))
        );
        assert!(matches!(
            registry.register_address("i2c0:0x99"),
            Err(EndpointError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_resolve_synthesizes_gpio_output() {
        let mut registry = EndpointRegistry::default();
        let endpoint = registry.resolve_for_bind("gpio.dout.5").unwrap();
        assert_eq!(endpoint.kind, EndpointKind::GpioDout);
        assert_eq!(endpoint.resource_id, 5);
        assert!(registry.endpoint_exists("gpio.dout.5"));

        // Second resolve finds the registered endpoint
        registry.resolve_for_bind("gpio.dout.5").unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_requires_registration_otherwise() {
        let mut registry = EndpointRegistry::default();
        assert_eq!(
            registry.resolve_for_bind("i2c0:0x76"),
            Err(EndpointError::NotFound("i2c0:0x76".to_string()))
        );
        assert!(registry.resolve_for_bind("gpio.din.4").is_err());
        assert!(registry.resolve_for_bind("gpio.dout.05").is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister() {
        let mut registry = EndpointRegistry::default();
        registry.resolve_for_bind("gpio.dout.2").unwrap();
        let removed = registry.unregister_endpoint("gpio.dout.2").unwrap();
        assert_eq!(removed.resource_id, 2);
        assert_eq!(
            registry.unregister_endpoint("gpio.dout.2"),
            Err(EndpointError::NotFound("gpio.dout.2".to_string()))
        );
    }

    #[test]
    fn test_probe_empty_bus() {
        let mut sim = SimPlatform::new();
        let registry = booted(&sim);
        let report = registry
            .probe_endpoint("i2c0", &mut sim, DEFAULT_PROBE_RANGE)
            .unwrap();
        assert!(report.is_empty());
        assert_eq!(report.summary(), "No devices found");
        assert_eq!(report.scanned, 112);
    }

    #[test]
    fn test_probe_lists_responder_once() {
        let mut sim = SimPlatform::new();
        sim.add_i2c_target(0, 0x76);
        sim.add_i2c_target(1, 0x40);
        let registry = booted(&sim);

        let report = registry
            .probe_endpoint("i2c0", &mut sim, DEFAULT_PROBE_RANGE)
            .unwrap();
        assert_eq!(report.found, vec![0x76]);
    }

    #[test]
    fn test_bus_scan_rejects_out_of_range_index() {
        let mut sim = SimPlatform::new();
        sim.add_i2c_target(0, 0x76);
        let mut registry = booted(&sim);
        registry
            .register_endpoint("i2c256", EndpointKind::I2cBus, 256)
            .unwrap();

        assert_eq!(
            registry.probe_endpoint("i2c256", &mut sim, DEFAULT_PROBE_RANGE),
            Err(EndpointError::NotFound("i2c256".to_string()))
        );
    }

    #[test]
    fn test_probe_device_endpoint_and_unsupported_kinds() {
        let mut sim = SimPlatform::new();
        sim.add_i2c_target(0, 0x76);
        let mut registry = booted(&sim);
        registry.register_address("i2c0:0x76").unwrap();

        let report = registry
            .probe_endpoint("i2c0:0x76", &mut sim, DEFAULT_PROBE_RANGE)
            .unwrap();
        assert_eq!(report.found, vec![0x76]);
        assert_eq!(report.scanned, 1);

        assert_eq!(
            registry.probe_endpoint("spi0", &mut sim, DEFAULT_PROBE_RANGE),
            Err(EndpointError::NotProbeable("spi0".to_string()))
        );
        assert_eq!(
            registry.probe_endpoint("i2c7", &mut sim, DEFAULT_PROBE_RANGE),
            Err(EndpointError::NotFound("i2c7".to_string()))
        );
    }
}
