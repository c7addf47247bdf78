//! # Hardware Abstraction Layer (HAL)
//!
//! This crate defines the platform capability interface the device kernel
//! consumes.
//!
//! ## Philosophy
//!
//! **Boards must be fully abstracted and swappable.**
//!
//! The kernel never touches registers. It asks the platform how many buses
//! exist, whether a pin may be driven, and borrows bus handles for the
//! duration of one driver call.
//!
//! ## Design Principles
//!
//! 1. **Synchronous**: every call returns when the bus transaction is done
//! 2. **Trait-based**: each board pack implements [`Platform`]
//! 3. **Testable**: [`sim::SimPlatform`] is a deterministic board for tests

pub mod error;
pub mod gpio;
pub mod i2c;
pub mod platform;
#[cfg(feature = "sim")]
pub mod sim;
pub mod spi;

pub use error::HalError;
pub use gpio::{GpioPort, Level, PinMode};
pub use i2c::{I2cBus, I2C_ADDR_MAX};
pub use platform::{BusFamily, BusInfo, FlashStats, HeapStats, Platform};
#[cfg(feature = "sim")]
pub use sim::SimPlatform;
pub use spi::SpiBus;
