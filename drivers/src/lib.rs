//! # Reference Drivers
//!
//! Generic drivers that need no chip-specific knowledge.
//!
//! | id            | endpoint          | purpose                         |
//! |---------------|-------------------|---------------------------------|
//! | `gpio.dout`   | `gpio.dout.<pin>` | digital output                  |
//! | `gpio.din`    | `gpio.din.<pin>`  | digital input with edge counter |
//! | `i2c.generic` | `i2c<n>:<addr>`   | raw register access             |
//! | `spi.generic` | `spi<n>:cs=..`    | raw transfers                   |

pub mod gpio_din;
pub mod gpio_dout;
pub mod i2c_generic;
pub mod spi_generic;

pub use gpio_din::GpioInput;
pub use gpio_dout::GpioOutput;
pub use i2c_generic::I2cGeneric;
pub use spi_generic::SpiGeneric;

use services_device_manager::{DeviceError, DriverCatalog};

/// Adds every reference driver to `catalog`
pub fn register_builtin(catalog: &mut DriverCatalog) -> Result<(), DeviceError> {
    catalog.register(gpio_dout::DRIVER_ID, "digital output pin", GpioOutput::create)?;
    catalog.register(gpio_din::DRIVER_ID, "digital input pin", GpioInput::create)?;
    catalog.register(i2c_generic::DRIVER_ID, "raw i2c register device", I2cGeneric::create)?;
    catalog.register(spi_generic::DRIVER_ID, "raw spi device", SpiGeneric::create)?;
    Ok(())
}

/// Catalog holding only the reference drivers
pub fn builtin_catalog() -> DriverCatalog {
    let mut catalog = DriverCatalog::new();
    // Ids are distinct constants, registration cannot collide.
    let _ = register_builtin(&mut catalog);
    catalog
}

#[cfg(test)]
pub(crate) mod testing {
    use core_types::OwnerId;
    use hal::SimPlatform;
    use resources::{ResourceManager, SharedResources};
    use services_device_manager::{Driver, DriverError, DriverIo};
    use services_endpoints::{Endpoint, EndpointAddress};

    pub struct Bench {
        pub sim: SimPlatform,
        pub resources: SharedResources,
        pub endpoint: Endpoint,
        pub owner: OwnerId,
    }

    impl Bench {
        pub fn new(address: &str) -> Self {
            let parsed = EndpointAddress::parse(address).unwrap();
            Self {
                sim: SimPlatform::new(),
                resources: ResourceManager::new().into_shared(),
                endpoint: Endpoint {
                    address: parsed.to_string(),
                    kind: parsed.kind(),
                    resource_id: parsed.resource_id(),
                },
                owner: OwnerId::new(7),
            }
        }

        pub fn call<T>(
            &mut self,
            driver: &mut dyn Driver,
            f: impl FnOnce(&mut dyn Driver, &mut DriverIo<'_>) -> Result<T, DriverError>,
        ) -> Result<T, DriverError> {
            let mut io = DriverIo {
                platform: &mut self.sim,
                resources: &self.resources,
                owner: self.owner,
                endpoint: &self.endpoint,
            };
            f(driver, &mut io)
        }

        pub fn init(&mut self, driver: &mut dyn Driver) -> Result<(), DriverError> {
            self.call(driver, |d, io| d.init(io))
        }
    }
}
