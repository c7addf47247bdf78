//! GPIO abstraction

use crate::HalError;
use std::fmt;

/// Logic level of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Level {
    #[default]
    Low,
    High,
}

impl Level {
    /// Builds a level from a boolean (`true` is high)
    pub fn from_bool(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }

    pub fn is_high(&self) -> bool {
        matches!(self, Level::High)
    }

    /// Returns the opposite level
    pub fn inverted(&self) -> Self {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Low => write!(f, "0"),
            Level::High => write!(f, "1"),
        }
    }
}

/// Electrical configuration of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    InputPullUp,
    InputPullDown,
    Output,
}

/// GPIO port trait
///
/// One port covers every pin of the board. Pin ownership is not checked
/// here; callers arbitrate through the resource manager first.
pub trait GpioPort {
    /// Configures the electrical mode of a pin
    fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<(), HalError>;

    /// Drives an output pin
    fn write(&mut self, pin: u8, level: Level) -> Result<(), HalError>;

    /// Samples a pin
    fn read(&mut self, pin: u8) -> Result<Level, HalError>;
}
