//! SPI bus abstraction

use crate::HalError;

/// SPI controller trait
///
/// The chip-select pin is passed per transfer; it is asserted for the whole
/// transfer and released afterwards. Full duplex: `rx` is filled while `tx`
/// is shifted out, and bytes beyond `tx.len()` are clocked out as `0xff`.
pub trait SpiBus {
    fn transfer(&mut self, cs_pin: u8, tx: &[u8], rx: &mut [u8]) -> Result<(), HalError>;
}
