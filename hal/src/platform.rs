//! Platform capability interface
//!
//! A board pack implements [`Platform`] once. The kernel only calls this
//! abstract contract: bus counts for endpoint enumeration, pin predicates for
//! driver validation, heap/flash statistics for health reporting, and the
//! blocking time primitives.

use crate::{GpioPort, HalError, I2cBus, SpiBus};
use std::fmt;
use std::str::FromStr;

/// Bus families known to the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BusFamily {
    I2c,
    Spi,
    Uart,
}

impl BusFamily {
    /// All families, in enumeration order
    pub const ALL: [BusFamily; 3] = [BusFamily::I2c, BusFamily::Spi, BusFamily::Uart];

    /// Address prefix used in endpoint names (`i2c`, `spi`, `uart`)
    pub fn prefix(&self) -> &'static str {
        match self {
            BusFamily::I2c => "i2c",
            BusFamily::Spi => "spi",
            BusFamily::Uart => "uart",
        }
    }
}

impl fmt::Display for BusFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for BusFamily {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "i2c" => Ok(BusFamily::I2c),
            "spi" => Ok(BusFamily::Spi),
            "uart" => Ok(BusFamily::Uart),
            _ => Err(()),
        }
    }
}

/// Current configuration of one bus instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusInfo {
    pub family: BusFamily,
    pub index: u8,
    /// Clock (I2C/SPI) or baud rate (UART)
    pub freq_hz: u32,
    /// Pin assignment, e.g. `("sda", 21)`
    pub pins: Vec<(&'static str, u8)>,
}

/// Heap statistics in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    pub total: u32,
    pub free: u32,
    /// Lowest free value observed since boot
    pub min_free: u32,
}

/// Flash statistics in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlashStats {
    pub total: u32,
    pub used: u32,
}

/// Board capability trait
pub trait Platform {
    /// Human-readable board name
    fn board_name(&self) -> &str;

    fn i2c_count(&self) -> u8;
    fn spi_count(&self) -> u8;
    fn uart_count(&self) -> u8;
    fn gpio_count(&self) -> u8;

    /// Number of instances of a bus family
    fn bus_count(&self, family: BusFamily) -> u8 {
        match family {
            BusFamily::I2c => self.i2c_count(),
            BusFamily::Spi => self.spi_count(),
            BusFamily::Uart => self.uart_count(),
        }
    }

    /// Returns true if the pin exists on this board
    fn gpio_is_valid(&self, pin: u8) -> bool;

    /// Returns true if the pin may be driven (not strapping, flash or input-only)
    fn gpio_is_safe_output(&self, pin: u8) -> bool;

    fn heap_stats(&self) -> HeapStats;
    fn flash_stats(&self) -> FlashStats;

    /// Milliseconds since boot
    fn millis(&self) -> u64;

    /// Blocks for `ms` milliseconds
    fn delay_ms(&mut self, ms: u32);

    /// Returns the configuration of a bus instance, if present
    fn bus_info(&self, family: BusFamily, index: u8) -> Option<BusInfo>;

    /// Changes the clock (or baud rate) of a bus instance
    fn configure_bus(&mut self, family: BusFamily, index: u8, freq_hz: u32)
        -> Result<(), HalError>;

    /// GPIO port covering every pin
    fn gpio(&mut self) -> &mut dyn GpioPort;

    /// I2C controller `index`, if present
    fn i2c(&mut self, index: u8) -> Option<&mut dyn I2cBus>;

    /// SPI controller `index`, if present
    fn spi(&mut self, index: u8) -> Option<&mut dyn SpiBus>;
}
