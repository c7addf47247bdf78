//! I2C bus abstraction

use crate::HalError;

/// Highest valid 7-bit target address
pub const I2C_ADDR_MAX: u8 = 0x7f;

/// I2C controller trait
///
/// All calls are blocking and return when the transaction has completed or
/// failed. Register-oriented targets are addressed with a write of the
/// register index followed by a repeated-start read.
pub trait I2cBus {
    /// Performs a zero-length write and reports whether the target acknowledged
    fn probe(&mut self, addr: u8) -> bool;

    /// Writes `bytes` to the target
    fn write(&mut self, addr: u8, bytes: &[u8]) -> Result<(), HalError>;

    /// Writes `bytes`, then reads `buf.len()` bytes with a repeated start
    fn write_read(&mut self, addr: u8, bytes: &[u8], buf: &mut [u8]) -> Result<(), HalError>;
}
