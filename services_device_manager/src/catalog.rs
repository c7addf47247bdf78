//! Named driver factories

use crate::{DeviceError, Driver};

/// Creates a fresh driver instance
pub type DriverFactory = fn() -> Box<dyn Driver>;

/// Catalog entry
#[derive(Clone)]
pub struct DriverDescriptor {
    pub id: &'static str,
    pub summary: &'static str,
    factory: DriverFactory,
}

impl std::fmt::Debug for DriverDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverDescriptor")
            .field("id", &self.id)
            .field("summary", &self.summary)
            .finish()
    }
}

/// Lookup table from driver id to factory
#[derive(Debug, Clone, Default)]
pub struct DriverCatalog {
    entries: Vec<DriverDescriptor>,
}

impl DriverCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a driver; ids are unique
    pub fn register(
        &mut self,
        id: &'static str,
        summary: &'static str,
        factory: DriverFactory,
    ) -> Result<(), DeviceError> {
        if self.contains(id) {
            return Err(DeviceError::DuplicateDriver(id.to_string()));
        }
        self.entries.push(DriverDescriptor {
            id,
            summary,
            factory,
        });
        Ok(())
    }

    /// Builder form of [`DriverCatalog::register`]; a duplicate id is ignored
    pub fn with_driver(
        mut self,
        id: &'static str,
        summary: &'static str,
        factory: DriverFactory,
    ) -> Self {
        let _ = self.register(id, summary, factory);
        self
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Constructs a new instance of driver `id`
    pub fn create(&self, id: &str) -> Option<Box<dyn Driver>> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| (e.factory)())
    }

    /// Registered drivers, in registration order
    pub fn list(&self) -> &[DriverDescriptor] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
