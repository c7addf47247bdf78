//! HAL error type

use crate::platform::BusFamily;
use thiserror::Error;

/// Errors reported by platform and bus operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HalError {
    /// Target did not acknowledge its address
    #[error("no acknowledge from address {0:#04x}")]
    Nack(u8),

    /// Bus instance does not exist on this board
    #[error("{family}{index} is not present")]
    NoSuchBus { family: BusFamily, index: u8 },

    /// Pin number is outside the board's GPIO range
    #[error("pin {0} is not valid on this board")]
    InvalidPin(u8),

    /// Pin exists but must not be driven
    #[error("pin {0} cannot be used as an output")]
    UnsafePin(u8),

    /// Requested bus frequency is outside the supported range
    #[error("unsupported frequency {0} Hz")]
    UnsupportedFrequency(u32),

    /// Generic bus failure (arbitration lost, timeout)
    #[error("bus transaction failed")]
    Bus,
}
