//! # Device Registry
//!
//! Fixed-capacity slot table binding driver instances to endpoints.
//!
//! ## Philosophy
//!
//! - **Slots own drivers**: each active slot exclusively owns one
//!   `Box<dyn Driver>`; freeing the slot drops the driver and with it every
//!   resource guard the driver holds
//! - **Ids are never reused**: device ids come from a monotonic counter and
//!   are only allocated after a successful `init`
//! - **Failures are counted, not acted on**: IO errors bump health counters;
//!   only an explicit state assignment moves a device to FAULT
//!
//! ## Core Concepts
//!
//! - [`Driver`]: lifecycle contract implemented by every driver
//! - [`DriverCatalog`]: named driver factories
//! - [`DeviceRegistry`]: the slot table, bind/unbind and per-tick update
//! - [`DeviceStatus`]: health snapshot reported by `dev.status`

pub mod catalog;
pub mod driver;
pub mod schema;

pub use catalog::{DriverCatalog, DriverDescriptor, DriverFactory};
pub use driver::{
    bool_str, parse_bool, parse_int, Driver, DriverError, DriverIo, RegisterAccess, RegisterInfo,
};
pub use schema::{CapabilitySchema, CommandSpec, SettingSpec, SignalSpec, ValueKind};

use core_types::{DeviceId, OwnerId};
use hal::Platform;
use resources::SharedResources;
use serde::{Deserialize, Serialize};
use services_endpoints::{Endpoint, EndpointError, EndpointRegistry};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default number of device slots
pub const DEFAULT_MAX_DEVICES: usize = 16;

/// Device lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceState {
    Ready,
    Fault,
    Disabled,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Ready => "READY",
            DeviceState::Fault => "FAULT",
            DeviceState::Disabled => "DISABLED",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "READY" => Ok(DeviceState::Ready),
            "FAULT" => Ok(DeviceState::Fault),
            "DISABLED" => Ok(DeviceState::Disabled),
            _ => Err(()),
        }
    }
}

/// Device registry errors
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("endpoint not found: {0}")]
    EndpointNotFound(String),

    #[error("endpoint: {0}")]
    Endpoint(EndpointError),

    #[error("no free device slot ({0} in use)")]
    NoFreeSlot(usize),

    #[error("unknown driver '{0}'")]
    UnknownDriver(String),

    #[error("driver '{0}' is already registered")]
    DuplicateDriver(String),

    #[error("{driver} init on {endpoint} failed: {source}")]
    InitFailed {
        driver: String,
        endpoint: String,
        source: DriverError,
    },

    #[error("device {0} not found")]
    NotFound(DeviceId),

    #[error("device {0}: {1}")]
    Driver(DeviceId, DriverError),
}

impl From<EndpointError> for DeviceError {
    fn from(err: EndpointError) -> Self {
        match err {
            EndpointError::NotFound(address) => DeviceError::EndpointNotFound(address),
            other => DeviceError::Endpoint(other),
        }
    }
}

/// Health snapshot of one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub id: DeviceId,
    pub slot: usize,
    pub driver: String,
    pub endpoint: String,
    pub state: DeviceState,
    pub init_failures: u32,
    pub io_failures: u32,
    pub last_ok_ms: u64,
}

struct Device {
    id: DeviceId,
    owner: OwnerId,
    endpoint: Endpoint,
    state: DeviceState,
    driver: Box<dyn Driver>,
    io_fail_count: u32,
    last_ok_ms: u64,
}

#[derive(Default)]
struct Slot {
    device: Option<Device>,
    init_fail_count: u32,
}

/// Device slot table
pub struct DeviceRegistry {
    slots: Vec<Slot>,
    catalog: DriverCatalog,
    resources: SharedResources,
    next_id: DeviceId,
    next_owner: u32,
}

impl DeviceRegistry {
    /// Creates a registry with `capacity` slots
    pub fn new(capacity: usize, catalog: DriverCatalog, resources: SharedResources) -> Self {
        Self {
            slots: (0..capacity).map(|_| Slot::default()).collect(),
            catalog,
            resources,
            next_id: DeviceId::FIRST,
            next_owner: OwnerId::KERNEL.as_u32() + 1,
        }
    }

    pub fn catalog(&self) -> &DriverCatalog {
        &self.catalog
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of active devices
    pub fn count(&self) -> usize {
        self.slots.iter().filter(|s| s.device.is_some()).count()
    }

    /// Binds driver `driver_id` to `endpoint`
    ///
    /// 1. Resolve the endpoint (GPIO outputs are registered on demand)
    /// 2. Find a free slot
    /// 3. Construct the driver from the catalog
    /// 4. Run `init`; on failure the slot's init failure counter is bumped
    ///    and no id is allocated
    /// 5. Allocate the next id and activate the slot as READY
    pub fn bind_device(
        &mut self,
        endpoints: &mut EndpointRegistry,
        platform: &mut dyn Platform,
        driver_id: &str,
        endpoint: &str,
    ) -> Result<DeviceId, DeviceError> {
        let endpoint = endpoints.resolve_for_bind(endpoint)?;

        let slot_index = self
            .slots
            .iter()
            .position(|s| s.device.is_none())
            .ok_or(DeviceError::NoFreeSlot(self.slots.len()))?;

        let mut driver = self
            .catalog
            .create(driver_id)
            .ok_or_else(|| DeviceError::UnknownDriver(driver_id.to_string()))?;

        let owner = OwnerId::new(self.next_owner);
        self.next_owner = self.next_owner.wrapping_add(1).max(1);

        let init = {
            let mut io = DriverIo {
                platform: &mut *platform,
                resources: &self.resources,
                owner,
                endpoint: &endpoint,
            };
            driver.init(&mut io)
        };

        if let Err(source) = init {
            let slot = &mut self.slots[slot_index];
            slot.init_fail_count = slot.init_fail_count.saturating_add(1);
            drop(driver);
            let leaked = self.resources.borrow_mut().release_all(owner);
            if leaked > 0 {
                warn!(driver = driver_id, leaked, "driver left claims after failed init");
            }
            warn!(
                driver = driver_id,
                endpoint = %endpoint.address,
                slot = slot_index,
                %source,
                "init failed"
            );
            return Err(DeviceError::InitFailed {
                driver: driver_id.to_string(),
                endpoint: endpoint.address,
                source,
            });
        }

        let id = self.next_id;
        self.next_id = id.next();
        info!(
            device = %id,
            driver = driver_id,
            endpoint = %endpoint.address,
            slot = slot_index,
            "device bound"
        );
        self.slots[slot_index].device = Some(Device {
            id,
            owner,
            endpoint,
            state: DeviceState::Ready,
            driver,
            io_fail_count: 0,
            last_ok_ms: platform.millis(),
        });
        Ok(id)
    }

    /// Unbinds a device, dropping its driver and releasing its resources
    pub fn unbind_device(
        &mut self,
        id: DeviceId,
        platform: &mut dyn Platform,
    ) -> Result<(), DeviceError> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.device.as_ref().map(|d| d.id) == Some(id))
            .ok_or(DeviceError::NotFound(id))?;
        if let Some(device) = slot.device.take() {
            self.release(device, platform);
        }
        info!(device = %id, "device unbound");
        Ok(())
    }

    /// Unbinds every active device, returning how many were released
    pub fn unbind_all(&mut self, platform: &mut dyn Platform) -> usize {
        let devices: Vec<Device> = self.slots.iter_mut().filter_map(|s| s.device.take()).collect();
        let count = devices.len();
        for device in devices {
            self.release(device, platform);
        }
        info!(count, "all devices unbound");
        count
    }

    fn release(&self, mut device: Device, platform: &mut dyn Platform) {
        {
            let mut io = DriverIo {
                platform,
                resources: &self.resources,
                owner: device.owner,
                endpoint: &device.endpoint,
            };
            device.driver.deinit(&mut io);
        }
        let owner = device.owner;
        drop(device);
        let leaked = self.resources.borrow_mut().release_all(owner);
        if leaked > 0 {
            debug!(%owner, leaked, "released claims not held by guards");
        }
    }

    /// Enables (READY) or disables (DISABLED) a device
    ///
    /// Enabling also clears FAULT. Neither touches the driver or its
    /// resources.
    pub fn set_device_enabled(
        &mut self,
        id: DeviceId,
        enabled: bool,
    ) -> Result<DeviceState, DeviceError> {
        let state = if enabled {
            DeviceState::Ready
        } else {
            DeviceState::Disabled
        };
        self.set_device_state(id, state)?;
        Ok(state)
    }

    /// Assigns a state, returning the previous one
    pub fn set_device_state(
        &mut self,
        id: DeviceId,
        state: DeviceState,
    ) -> Result<DeviceState, DeviceError> {
        let device = self.device_mut(id)?;
        let previous = std::mem::replace(&mut device.state, state);
        if previous != state {
            info!(device = %id, from = %previous, to = %state, "device state changed");
        }
        Ok(previous)
    }

    /// Runs `update` on every READY device in slot order
    ///
    /// Returns the number of devices updated. IO failures only increment the
    /// device's failure counter.
    pub fn update_all(&mut self, platform: &mut dyn Platform) -> usize {
        let mut updated = 0;
        for slot in self.slots.iter_mut() {
            let device = match slot.device.as_mut() {
                Some(d) if d.state == DeviceState::Ready => d,
                _ => continue,
            };
            let result = {
                let mut io = DriverIo {
                    platform: &mut *platform,
                    resources: &self.resources,
                    owner: device.owner,
                    endpoint: &device.endpoint,
                };
                device.driver.update(&mut io)
            };
            match result {
                Ok(()) => device.last_ok_ms = platform.millis(),
                Err(err) if err.is_io() => {
                    device.io_fail_count = device.io_fail_count.saturating_add(1);
                    debug!(
                        device = %device.id,
                        %err,
                        failures = device.io_fail_count,
                        "update io failure"
                    );
                }
                Err(err) => debug!(device = %device.id, %err, "update failed"),
            }
            updated += 1;
        }
        updated
    }

    /// Runs one driver call with health accounting
    fn with_driver<T>(
        &mut self,
        id: DeviceId,
        platform: &mut dyn Platform,
        call: impl FnOnce(&mut dyn Driver, &mut DriverIo<'_>) -> Result<T, DriverError>,
    ) -> Result<T, DeviceError> {
        let resources = &self.resources;
        let device = self
            .slots
            .iter_mut()
            .filter_map(|s| s.device.as_mut())
            .find(|d| d.id == id)
            .ok_or(DeviceError::NotFound(id))?;

        let result = {
            let mut io = DriverIo {
                platform: &mut *platform,
                resources,
                owner: device.owner,
                endpoint: &device.endpoint,
            };
            call(device.driver.as_mut(), &mut io)
        };

        match result {
            Ok(value) => {
                device.last_ok_ms = platform.millis();
                Ok(value)
            }
            Err(err) => {
                if err.is_io() {
                    device.io_fail_count = device.io_fail_count.saturating_add(1);
                }
                Err(DeviceError::Driver(id, err))
            }
        }
    }

    pub fn set_param(
        &mut self,
        id: DeviceId,
        platform: &mut dyn Platform,
        name: &str,
        value: &str,
    ) -> Result<(), DeviceError> {
        self.with_driver(id, platform, |driver, io| driver.set_param(io, name, value))?;
        debug!(device = %id, name, value, "param set");
        Ok(())
    }

    pub fn get_param(&self, id: DeviceId, name: &str) -> Result<String, DeviceError> {
        self.device(id)?
            .driver
            .get_param(name)
            .map_err(|err| DeviceError::Driver(id, err))
    }

    pub fn schema(&self, id: DeviceId) -> Result<CapabilitySchema, DeviceError> {
        Ok(self.device(id)?.driver.schema())
    }

    /// Current values of every schema setting
    pub fn params(&self, id: DeviceId) -> Result<Vec<(String, String)>, DeviceError> {
        let driver = &self.device(id)?.driver;
        Ok(driver
            .schema()
            .setting_names()
            .filter_map(|name| driver.get_param(name).ok().map(|v| (name.to_string(), v)))
            .collect())
    }

    /// Signal snapshot
    pub fn read(
        &mut self,
        id: DeviceId,
        platform: &mut dyn Platform,
    ) -> Result<Vec<(String, String)>, DeviceError> {
        self.with_driver(id, platform, |driver, io| driver.read(io))
    }

    /// Returns true if the device offers register access
    pub fn has_registers(&mut self, id: DeviceId) -> Result<bool, DeviceError> {
        Ok(self.device_mut(id)?.driver.register_access().is_some())
    }

    pub fn registers(&mut self, id: DeviceId) -> Result<Vec<RegisterInfo>, DeviceError> {
        self.device_mut(id)?
            .driver
            .register_access()
            .map(|regs| regs.registers())
            .ok_or_else(|| {
                DeviceError::Driver(id, DriverError::Unsupported("register access".to_string()))
            })
    }

    pub fn reg_read(
        &mut self,
        id: DeviceId,
        platform: &mut dyn Platform,
        reg: u8,
    ) -> Result<u8, DeviceError> {
        self.with_driver(id, platform, |driver, io| {
            driver
                .register_access()
                .ok_or_else(|| DriverError::Unsupported("register access".to_string()))?
                .reg_read(io, reg)
        })
    }

    pub fn reg_write(
        &mut self,
        id: DeviceId,
        platform: &mut dyn Platform,
        reg: u8,
        value: u8,
    ) -> Result<(), DeviceError> {
        self.with_driver(id, platform, |driver, io| {
            driver
                .register_access()
                .ok_or_else(|| DriverError::Unsupported("register access".to_string()))?
                .reg_write(io, reg, value)
        })
    }

    pub fn status(&self, id: DeviceId) -> Result<DeviceStatus, DeviceError> {
        self.slots
            .iter()
            .enumerate()
            .find_map(|(index, slot)| match &slot.device {
                Some(device) if device.id == id => Some(Self::snapshot(index, slot, device)),
                _ => None,
            })
            .ok_or(DeviceError::NotFound(id))
    }

    /// Active devices in slot order
    pub fn list(&self) -> Vec<DeviceStatus> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.device.as_ref().map(|d| Self::snapshot(index, slot, d))
            })
            .collect()
    }

    /// Init failure counter of a slot, active or not
    pub fn slot_init_failures(&self, slot: usize) -> Option<u32> {
        self.slots.get(slot).map(|s| s.init_fail_count)
    }

    /// Owner id used for the device's resource claims
    pub fn owner_of(&self, id: DeviceId) -> Result<OwnerId, DeviceError> {
        Ok(self.device(id)?.owner)
    }

    fn snapshot(index: usize, slot: &Slot, device: &Device) -> DeviceStatus {
        DeviceStatus {
            id: device.id,
            slot: index,
            driver: device.driver.driver_id().to_string(),
            endpoint: device.endpoint.address.clone(),
            state: device.state,
            init_failures: slot.init_fail_count,
            io_failures: device.io_fail_count,
            last_ok_ms: device.last_ok_ms,
        }
    }

    fn device(&self, id: DeviceId) -> Result<&Device, DeviceError> {
        self.slots
            .iter()
            .filter_map(|s| s.device.as_ref())
            .find(|d| d.id == id)
            .ok_or(DeviceError::NotFound(id))
    }

    fn device_mut(&mut self, id: DeviceId) -> Result<&mut Device, DeviceError> {
        self.slots
            .iter_mut()
            .filter_map(|s| s.device.as_mut())
            .find(|d| d.id == id)
            .ok_or(DeviceError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hal::{HalError, SimPlatform};
    use resources::{ClaimSet, ResourceKind, ResourceManager};

    /// Claims its GPIO pin and counts updates
    struct PinDriver {
        _claims: Option<ClaimSet>,
        updates: u32,
        label: String,
    }

    fn pin_driver() -> Box<dyn Driver> {
        Box::new(PinDriver {
            _claims: None,
            updates: 0,
            label: "x".to_string(),
        })
    }

    impl Driver for PinDriver {
        fn driver_id(&self) -> &'static str {
            "test.pin"
        }

        fn init(&mut self, io: &mut DriverIo<'_>) -> Result<(), DriverError> {
            let claims = ClaimSet::new(io.resources, io.owner)
                .with(ResourceKind::GpioPin, io.endpoint.resource_id)?;
            self._claims = Some(claims);
            Ok(())
        }

        fn update(&mut self, _io: &mut DriverIo<'_>) -> Result<(), DriverError> {
            self.updates += 1;
            Ok(())
        }

        fn set_param(
            &mut self,
            _io: &mut DriverIo<'_>,
            name: &str,
            value: &str,
        ) -> Result<(), DriverError> {
            match name {
                "label" => {
                    self.label = value.to_string();
                    Ok(())
                }
                _ => Err(DriverError::UnknownParam(name.to_string())),
            }
        }

        fn get_param(&self, name: &str) -> Result<String, DriverError> {
            match name {
                "label" => Ok(self.label.clone()),
                _ => Err(DriverError::UnknownParam(name.to_string())),
            }
        }

        fn schema(&self) -> CapabilitySchema {
            CapabilitySchema::new()
                .with_setting("label", ValueKind::Text, "x", "free text")
                .with_signal("updates", "")
        }

        fn read(&mut self, _io: &mut DriverIo<'_>) -> Result<Vec<(String, String)>, DriverError> {
            Ok(vec![("updates".to_string(), self.updates.to_string())])
        }
    }

    /// Claims its pin, then fails
    struct BrokenDriver {
        _claims: Option<ClaimSet>,
    }

    fn broken_driver() -> Box<dyn Driver> {
        Box::new(BrokenDriver { _claims: None })
    }

    impl Driver for BrokenDriver {
        fn driver_id(&self) -> &'static str {
            "test.broken"
        }

        fn init(&mut self, io: &mut DriverIo<'_>) -> Result<(), DriverError> {
            self._claims = Some(
                ClaimSet::new(io.resources, io.owner)
                    .with(ResourceKind::GpioPin, io.endpoint.resource_id)?,
            );
            Err(DriverError::Io(HalError::Bus))
        }

        fn set_param(
            &mut self,
            _io: &mut DriverIo<'_>,
            name: &str,
            _value: &str,
        ) -> Result<(), DriverError> {
            Err(DriverError::UnknownParam(name.to_string()))
        }

        fn get_param(&self, name: &str) -> Result<String, DriverError> {
            Err(DriverError::UnknownParam(name.to_string()))
        }

        fn schema(&self) -> CapabilitySchema {
            CapabilitySchema::new()
        }

        fn read(&mut self, _io: &mut DriverIo<'_>) -> Result<Vec<(String, String)>, DriverError> {
            Ok(Vec::new())
        }
    }

    /// Every update fails with a bus error; exposes one register
    struct FlakyDriver {
        reg: u8,
    }

    fn flaky_driver() -> Box<dyn Driver> {
        Box::new(FlakyDriver { reg: 0 })
    }

    impl Driver for FlakyDriver {
        fn driver_id(&self) -> &'static str {
            "test.flaky"
        }

        fn init(&mut self, _io: &mut DriverIo<'_>) -> Result<(), DriverError> {
            Ok(())
        }

        fn update(&mut self, _io: &mut DriverIo<'_>) -> Result<(), DriverError> {
            Err(DriverError::Io(HalError::Nack(0x76)))
        }

        fn set_param(
            &mut self,
            _io: &mut DriverIo<'_>,
            name: &str,
            _value: &str,
        ) -> Result<(), DriverError> {
            Err(DriverError::UnknownParam(name.to_string()))
        }

        fn get_param(&self, name: &str) -> Result<String, DriverError> {
            Err(DriverError::UnknownParam(name.to_string()))
        }

        fn schema(&self) -> CapabilitySchema {
            CapabilitySchema::new()
        }

        fn read(&mut self, _io: &mut DriverIo<'_>) -> Result<Vec<(String, String)>, DriverError> {
            Err(DriverError::Io(HalError::Nack(0x76)))
        }

        fn register_access(&mut self) -> Option<&mut dyn RegisterAccess> {
            Some(self)
        }
    }

    impl RegisterAccess for FlakyDriver {
        fn registers(&self) -> Vec<RegisterInfo> {
            vec![RegisterInfo {
                address: 0,
                name: "r0".to_string(),
                writable: true,
            }]
        }

        fn reg_read(&mut self, _io: &mut DriverIo<'_>, reg: u8) -> Result<u8, DriverError> {
            match reg {
                0 => Ok(self.reg),
                other => Err(DriverError::UnknownRegister(other)),
            }
        }

        fn reg_write(
            &mut self,
            _io: &mut DriverIo<'_>,
            reg: u8,
            value: u8,
        ) -> Result<(), DriverError> {
            match reg {
                0 => {
                    self.reg = value;
                    Ok(())
                }
                other => Err(DriverError::UnknownRegister(other)),
            }
        }
    }

    struct Fixture {
        sim: SimPlatform,
        endpoints: EndpointRegistry,
        resources: SharedResources,
        devices: DeviceRegistry,
    }

    fn fixture(capacity: usize) -> Fixture {
        let sim = SimPlatform::new();
        let mut endpoints = EndpointRegistry::default();
        endpoints.auto_register_endpoints(&sim).unwrap();
        let resources = ResourceManager::new().into_shared();
        let catalog = DriverCatalog::new()
            .with_driver("test.pin", "claims a pin", pin_driver)
            .with_driver("test.broken", "always fails init", broken_driver)
            .with_driver("test.flaky", "always fails io", flaky_driver);
        let devices = DeviceRegistry::new(capacity, catalog, resources.clone());
        Fixture {
            sim,
            endpoints,
            resources,
            devices,
        }
    }

    impl Fixture {
        fn bind(&mut self, driver: &str, endpoint: &str) -> Result<DeviceId, DeviceError> {
            self.devices
                .bind_device(&mut self.endpoints, &mut self.sim, driver, endpoint)
        }
    }

    #[test]
    fn test_bind_synthesizes_gpio_endpoint() {
        let mut fx = fixture(4);
        let id = fx.bind("test.pin", "gpio.dout.5").unwrap();

        assert_eq!(id, DeviceId::FIRST);
        assert!(fx.endpoints.endpoint_exists("gpio.dout.5"));
        assert!(fx.resources.borrow().is_claimed(ResourceKind::GpioPin, 5));
        let status = fx.devices.status(id).unwrap();
        assert_eq!(status.state, DeviceState::Ready);
        assert_eq!(status.driver, "test.pin");
        assert_eq!(status.io_failures, 0);
    }

    #[test]
    fn test_bind_unknown_endpoint_and_driver() {
        let mut fx = fixture(4);
        assert!(matches!(
            fx.bind("test.pin", "i2c0:0x76"),
            Err(DeviceError::EndpointNotFound(_))
        ));
        assert!(matches!(
            fx.bind("no.such", "gpio.dout.2"),
            Err(DeviceError::UnknownDriver(_))
        ));
        assert_eq!(fx.devices.count(), 0);
    }

    #[test]
    fn test_bind_fails_when_slots_exhausted() {
        let mut fx = fixture(2);
        fx.bind("test.pin", "gpio.dout.2").unwrap();
        fx.bind("test.pin", "gpio.dout.4").unwrap();
        assert!(matches!(
            fx.bind("test.pin", "gpio.dout.5"),
            Err(DeviceError::NoFreeSlot(2))
        ));
    }

    #[test]
    fn test_conflicting_bind_fails_init() {
        let mut fx = fixture(4);
        let first = fx.bind("test.pin", "gpio.dout.5").unwrap();
        let err = fx.bind("test.pin", "gpio.dout.5").unwrap_err();
        assert!(matches!(
            err,
            DeviceError::InitFailed {
                source: DriverError::Resource(_),
                ..
            }
        ));
        // Original owner is untouched
        let owner = fx.devices.owner_of(first).unwrap();
        assert_eq!(fx.resources.borrow().owner(ResourceKind::GpioPin, 5), Some(owner));
    }

    #[test]
    fn test_failed_init_allocates_no_id() {
        let mut fx = fixture(4);
        assert!(matches!(
            fx.bind("test.broken", "gpio.dout.3"),
            Err(DeviceError::InitFailed { .. })
        ));
        assert_eq!(fx.devices.count(), 0);
        assert_eq!(fx.devices.slot_init_failures(0), Some(1));
        // Partial claims were rolled back
        assert!(fx.resources.borrow().is_available(ResourceKind::GpioPin, 3));

        // Next success still gets the first id and inherits the slot counter
        let id = fx.bind("test.pin", "gpio.dout.3").unwrap();
        assert_eq!(id, DeviceId::FIRST);
        assert_eq!(fx.devices.status(id).unwrap().init_failures, 1);
    }

    #[test]
    fn test_ids_are_monotonic_across_unbind() {
        let mut fx = fixture(4);
        let a = fx.bind("test.pin", "gpio.dout.2").unwrap();
        fx.devices.unbind_device(a, &mut fx.sim).unwrap();
        let b = fx.bind("test.pin", "gpio.dout.2").unwrap();
        let c = fx.bind("test.pin", "gpio.dout.4").unwrap();
        assert!(a < b && b < c);
        assert_eq!(b, DeviceId::new(2));
    }

    #[test]
    fn test_unbind_releases_resources() {
        let mut fx = fixture(4);
        let id = fx.bind("test.pin", "gpio.dout.5").unwrap();
        fx.devices.unbind_device(id, &mut fx.sim).unwrap();

        assert!(!fx.resources.borrow().is_claimed(ResourceKind::GpioPin, 5));
        assert!(matches!(fx.devices.status(id), Err(DeviceError::NotFound(_))));
        assert!(matches!(
            fx.devices.unbind_device(id, &mut fx.sim),
            Err(DeviceError::NotFound(_))
        ));
        fx.bind("test.pin", "gpio.dout.5").unwrap();
    }

    #[test]
    fn test_unbind_all() {
        let mut fx = fixture(4);
        fx.bind("test.pin", "gpio.dout.2").unwrap();
        fx.bind("test.pin", "gpio.dout.4").unwrap();
        assert_eq!(fx.devices.unbind_all(&mut fx.sim), 2);
        assert_eq!(fx.devices.count(), 0);
        assert_eq!(fx.resources.borrow().claim_count(), 0);
    }

    #[test]
    fn test_disabled_devices_skip_update() {
        let mut fx = fixture(4);
        let a = fx.bind("test.pin", "gpio.dout.2").unwrap();
        let b = fx.bind("test.pin", "gpio.dout.4").unwrap();
        fx.devices.set_device_enabled(b, false).unwrap();

        assert_eq!(fx.devices.update_all(&mut fx.sim), 1);
        assert_eq!(fx.devices.update_all(&mut fx.sim), 1);

        let read = |fx: &mut Fixture, id| fx.devices.read(id, &mut fx.sim).unwrap();
        assert_eq!(read(&mut fx, a), vec![("updates".to_string(), "2".to_string())]);
        assert_eq!(read(&mut fx, b), vec![("updates".to_string(), "0".to_string())]);
        // Disabled devices keep their resources
        assert!(fx.resources.borrow().is_claimed(ResourceKind::GpioPin, 4));
    }

    #[test]
    fn test_io_failures_count_but_never_fault() {
        let mut fx = fixture(4);
        let id = fx.bind("test.flaky", "i2c0").unwrap();
        for _ in 0..5 {
            fx.devices.update_all(&mut fx.sim);
        }
        assert!(fx.devices.read(id, &mut fx.sim).is_err());

        let status = fx.devices.status(id).unwrap();
        assert_eq!(status.io_failures, 6);
        assert_eq!(status.state, DeviceState::Ready);
    }

    #[test]
    fn test_fault_only_by_assignment() {
        let mut fx = fixture(4);
        let id = fx.bind("test.pin", "gpio.dout.2").unwrap();
        assert_eq!(
            fx.devices.set_device_state(id, DeviceState::Fault).unwrap(),
            DeviceState::Ready
        );
        assert_eq!(fx.devices.update_all(&mut fx.sim), 0);

        assert_eq!(fx.devices.set_device_enabled(id, true).unwrap(), DeviceState::Ready);
        assert_eq!(fx.devices.status(id).unwrap().state, DeviceState::Ready);
    }

    #[test]
    fn test_update_runs_in_slot_order() {
        let mut fx = fixture(4);
        let a = fx.bind("test.pin", "gpio.dout.2").unwrap();
        fx.bind("test.pin", "gpio.dout.4").unwrap();
        fx.devices.unbind_device(a, &mut fx.sim).unwrap();
        let c = fx.bind("test.pin", "gpio.dout.5").unwrap();

        let order: Vec<DeviceId> = fx.devices.list().iter().map(|s| s.id).collect();
        assert_eq!(order, vec![c, DeviceId::new(2)]);
        assert_eq!(fx.devices.status(c).unwrap().slot, 0);
    }

    #[test]
    fn test_params_pass_through() {
        let mut fx = fixture(4);
        let id = fx.bind("test.pin", "gpio.dout.2").unwrap();
        fx.devices.set_param(id, &mut fx.sim, "label", "lamp").unwrap();
        assert_eq!(fx.devices.get_param(id, "label").unwrap(), "lamp");
        assert_eq!(
            fx.devices.params(id).unwrap(),
            vec![("label".to_string(), "lamp".to_string())]
        );
        assert!(matches!(
            fx.devices.get_param(id, "nope"),
            Err(DeviceError::Driver(_, DriverError::UnknownParam(_)))
        ));
        assert_eq!(fx.devices.schema(id).unwrap().signals.len(), 1);
    }

    #[test]
    fn test_register_capability_is_probed() {
        let mut fx = fixture(4);
        let pin = fx.bind("test.pin", "gpio.dout.2").unwrap();
        let flaky = fx.bind("test.flaky", "i2c0").unwrap();

        assert!(!fx.devices.has_registers(pin).unwrap());
        assert!(matches!(
            fx.devices.reg_read(pin, &mut fx.sim, 0),
            Err(DeviceError::Driver(_, DriverError::Unsupported(_)))
        ));

        assert_eq!(fx.devices.registers(flaky).unwrap().len(), 1);
        fx.devices.reg_write(flaky, &mut fx.sim, 0, 0x5a).unwrap();
        assert_eq!(fx.devices.reg_read(flaky, &mut fx.sim, 0).unwrap(), 0x5a);
        assert!(matches!(
            fx.devices.reg_read(flaky, &mut fx.sim, 9),
            Err(DeviceError::Driver(_, DriverError::UnknownRegister(9)))
        ));
    }
}
