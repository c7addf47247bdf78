//! Owned kernel context
//!
//! [`KernelState`] holds every registry. Built-in services receive it on
//! each tick and intent handlers reach it through the kernel, so there is no
//! global mutable state.

use crate::config::KernelConfig;
use crate::error::KernelError;
use core_types::{DeviceId, SessionId};
use hal::Platform;
use resources::{ResourceManager, SharedResources};
use serde::Serialize;
use services_device_manager::{DeviceRegistry, DeviceState, DriverCatalog};
use services_endpoints::{EndpointAddress, EndpointRegistry};
use services_logger::{LogBuffer, LogEntry, LogLevel};
use services_persistence::{
    deserialize_document, serialize_document, ConfigDocument, DeviceRecord, PersistenceBackend,
};
use tracing::debug;

/// Counters and gauges sampled by the telemetry service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Telemetry {
    /// Intents dispatched
    pub intents: u64,
    /// Intents answered with an error
    pub intent_errors: u64,
    /// Driver updates run by the devices service
    pub device_updates: u64,
    /// Telemetry samples taken
    pub samples: u64,
    /// Successful saves
    pub saves: u64,
    /// Free heap at the last sample
    pub heap_free: u32,
    /// Sum of device IO failure counters at the last sample
    pub io_failures: u64,
}

/// Outcome of applying a configuration document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Endpoints registered
    pub endpoints: usize,
    /// Devices bound
    pub restored: usize,
    /// Endpoints or devices that could not be restored
    pub failed: usize,
}

/// Everything the kernel owns
pub struct KernelState {
    pub config: KernelConfig,
    pub platform: Box<dyn Platform>,
    pub resources: SharedResources,
    pub endpoints: EndpointRegistry,
    pub devices: DeviceRegistry,
    pub log: LogBuffer,
    pub backend: Option<Box<dyn PersistenceBackend>>,
    pub session: SessionId,
    /// Set by configuration changes, cleared by a successful save
    pub save_requested: bool,
    pub telemetry: Telemetry,
}

impl KernelState {
    pub fn new(config: KernelConfig, platform: Box<dyn Platform>, catalog: DriverCatalog) -> Self {
        let resources = ResourceManager::with_capacity(config.max_resources).into_shared();
        Self {
            endpoints: EndpointRegistry::new(config.max_endpoints),
            devices: DeviceRegistry::new(config.max_devices, catalog, resources.clone()),
            log: LogBuffer::new(config.log_capacity),
            resources,
            platform,
            backend: None,
            session: SessionId::new(),
            save_requested: false,
            telemetry: Telemetry::default(),
            config,
        }
    }

    /// Milliseconds since boot
    pub fn now(&self) -> u64 {
        self.platform.millis()
    }

    /// Records an operator-visible log entry
    pub fn record(&mut self, level: LogLevel, source: &str, message: impl Into<String>) {
        let now = self.now();
        self.log.record(level, source, now, message);
    }

    /// Records an entry with structured fields
    pub fn record_entry(&mut self, entry: LogEntry) {
        let now = self.now();
        self.log.push(entry.at(now));
    }

    /// Marks the configuration dirty when autosave is on
    pub fn request_save(&mut self) {
        if self.config.autosave {
            self.save_requested = true;
        }
    }

    /// Snapshot of the current configuration
    ///
    /// Bus endpoints are omitted since they are re-created at boot.
    pub fn export_document(&self) -> ConfigDocument {
        let mut document = ConfigDocument::new().with_session(self.session);
        for endpoint in self.endpoints.list().iter().filter(|e| !e.kind.is_bus()) {
            document = document.with_endpoint(endpoint.address.clone());
        }
        for status in self.devices.list() {
            let mut record = DeviceRecord::new(status.driver, status.endpoint)
                .with_enabled(status.state != DeviceState::Disabled);
            for (name, value) in self.devices.params(status.id).unwrap_or_default() {
                record = record.with_param(name, value);
            }
            document = document.with_device(record);
        }
        document
    }

    /// Unbinds everything and rebuilds endpoints and devices from `document`
    ///
    /// Individual failures are logged and counted; they never stop the load.
    pub fn apply_document(&mut self, document: &ConfigDocument) -> LoadReport {
        let mut report = LoadReport::default();
        self.devices.unbind_all(self.platform.as_mut());

        for address in &document.endpoints {
            match self.endpoints.register_address(address) {
                Ok(_) => report.endpoints += 1,
                Err(err) => {
                    report.failed += 1;
                    let message = format!("endpoint {}: {}", address, err);
                    self.record(LogLevel::Warn, "persist", message);
                }
            }
        }

        for record in &document.devices {
            match self.restore_device(record) {
                Ok(_) => report.restored += 1,
                Err(err) => {
                    report.failed += 1;
                    self.record(
                        LogLevel::Warn,
                        "persist",
                        format!("{} on {}: {}", record.driver, record.endpoint, err),
                    );
                }
            }
        }
        report
    }

    fn restore_device(&mut self, record: &DeviceRecord) -> Result<DeviceId, KernelError> {
        let id = self.devices.bind_device(
            &mut self.endpoints,
            self.platform.as_mut(),
            &record.driver,
            &record.endpoint,
        )?;
        for (name, value) in &record.params {
            if let Err(err) = self.devices.set_param(id, self.platform.as_mut(), name, value) {
                self.record(LogLevel::Warn, "persist", format!("device {}: {}", id, err));
            }
        }
        if !record.enabled {
            self.devices.set_device_enabled(id, false)?;
        }
        Ok(id)
    }

    /// Problems that would prevent `document` from applying cleanly
    pub fn validate_document(&self, document: &ConfigDocument) -> Vec<String> {
        let mut problems = Vec::new();
        for address in &document.endpoints {
            if let Err(err) = EndpointAddress::parse(address) {
                problems.push(format!("endpoint {}: {}", address, err));
            }
        }
        for (index, record) in document.devices.iter().enumerate() {
            if let Err(err) = EndpointAddress::parse(&record.endpoint) {
                problems.push(format!("device.{}: endpoint {}: {}", index, record.endpoint, err));
            }
            let schema = match self.devices.catalog().create(&record.driver) {
                Some(driver) => driver.schema(),
                None => {
                    problems.push(format!("device.{}: unknown driver '{}'", index, record.driver));
                    continue;
                }
            };
            for name in record.params.keys() {
                if schema.setting(name).is_none() {
                    problems.push(format!("device.{}: unknown parameter '{}'", index, name));
                }
            }
        }
        problems
    }

    /// Writes the current configuration to the backend
    ///
    /// Returns the number of devices saved.
    pub fn save_all(&mut self) -> Result<usize, KernelError> {
        let document = self.export_document();
        let bytes = serialize_document(&document)?;
        self.backend
            .as_mut()
            .ok_or(KernelError::NoBackend)?
            .store(&bytes)?;
        self.save_requested = false;
        self.telemetry.saves += 1;
        let count = document.devices.len();
        self.record_entry(
            LogEntry::new(LogLevel::Info, "configuration saved")
                .with_source("persist")
                .with_field("devices", count)
                .with_field("bytes", bytes.len()),
        );
        Ok(count)
    }

    /// Replaces the live configuration with the stored one
    pub fn load_all(&mut self) -> Result<LoadReport, KernelError> {
        let bytes = self
            .backend
            .as_ref()
            .ok_or(KernelError::NoBackend)?
            .fetch()?
            .ok_or(KernelError::NothingStored)?;
        let document = deserialize_document(&bytes)?;
        let report = self.apply_document(&document);
        self.save_requested = false;
        self.record_entry(
            LogEntry::new(LogLevel::Info, "configuration loaded")
                .with_source("persist")
                .with_field("restored", report.restored)
                .with_field("failed", report.failed),
        );
        Ok(report)
    }

    /// Removes the stored configuration
    pub fn clear_store(&mut self) -> Result<(), KernelError> {
        self.backend.as_mut().ok_or(KernelError::NoBackend)?.clear()?;
        self.save_requested = false;
        debug!("stored configuration cleared");
        Ok(())
    }

    /// Unbinds every device, forgets non-bus endpoints, clears the store
    /// (when there is one) and the log
    ///
    /// Returns the number of devices unbound.
    pub fn factory_reset(&mut self) -> Result<usize, KernelError> {
        let unbound = self.devices.unbind_all(self.platform.as_mut());
        let addresses: Vec<String> = self
            .endpoints
            .list()
            .iter()
            .filter(|e| !e.kind.is_bus())
            .map(|e| e.address.clone())
            .collect();
        for address in addresses {
            self.endpoints.unregister_endpoint(&address)?;
        }
        if self.backend.is_some() {
            self.clear_store()?;
        }
        self.save_requested = false;
        self.log.clear();
        let message = format!("factory reset, {} devices unbound", unbound);
        self.record(LogLevel::Warn, "kernel", message);
        Ok(unbound)
    }
}
