//! Endpoint address grammar
//!
//! ```text
//! bus        := family index                 i2c0, spi1, uart0
//! addressed  := bus ":" number               i2c0:0x76, i2c1:64
//! spi device := "spi" index ":" pin-list     spi0:cs=5,dc=16,rst=17
//! pin-list   := "cs=" pin ("," key "=" pin)*   key in dc, rst, irq, busy
//! gpio       := "gpio.dout." pin | "gpio.din." pin
//! ```

use crate::EndpointKind;
use hal::{BusFamily, I2C_ADDR_MAX};
use std::fmt;
use thiserror::Error;

/// Address parse errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("empty address")]
    Empty,

    #[error("unknown bus family '{0}'")]
    UnknownFamily(String),

    #[error("bad bus index '{0}'")]
    BadIndex(String),

    #[error("bad device address '{0}'")]
    BadAddress(String),

    #[error("i2c address {0:#x} is outside the 7-bit range")]
    AddressOutOfRange(u32),

    #[error("spi device requires cs=<pin>")]
    MissingChipSelect,

    #[error("pin '{0}' given twice")]
    DuplicatePin(String),

    #[error("unknown pin key '{0}'")]
    UnknownPinKey(String),

    #[error("bad pin number '{0}'")]
    BadPin(String),

    #[error("unsupported address form '{0}'")]
    Unsupported(String),
}

/// Pin assignment of an SPI device endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpiPins {
    pub cs: u8,
    pub dc: Option<u8>,
    pub rst: Option<u8>,
    pub irq: Option<u8>,
    pub busy: Option<u8>,
}

impl SpiPins {
    /// All assigned pins in grammar order, chip-select first
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u8)> {
        [
            ("cs", Some(self.cs)),
            ("dc", self.dc),
            ("rst", self.rst),
            ("irq", self.irq),
            ("busy", self.busy),
        ]
        .into_iter()
        .filter_map(|(name, pin)| pin.map(|p| (name, p)))
    }

    fn parse(text: &str) -> Result<Self, AddressError> {
        let mut cs = None;
        let mut pins = SpiPins::default();
        for item in text.split(',') {
            let (key, value) = item
                .split_once('=')
                .ok_or_else(|| AddressError::BadAddress(item.to_string()))?;
            let pin = parse_number(value)
                .ok()
                .and_then(|v| u8::try_from(v).ok())
                .ok_or_else(|| AddressError::BadPin(value.to_string()))?;
            let slot = match key.trim() {
                "cs" => &mut cs,
                "dc" => &mut pins.dc,
                "rst" => &mut pins.rst,
                "irq" => &mut pins.irq,
                "busy" => &mut pins.busy,
                other => return Err(AddressError::UnknownPinKey(other.to_string())),
            };
            if slot.replace(pin).is_some() {
                return Err(AddressError::DuplicatePin(key.to_string()));
            }
        }
        pins.cs = cs.ok_or(AddressError::MissingChipSelect)?;
        Ok(pins)
    }
}

impl fmt::Display for SpiPins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, pin)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", name, pin)?;
        }
        Ok(())
    }
}

/// Parsed endpoint address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointAddress {
    Bus { family: BusFamily, index: u8 },
    I2cDevice { bus: u8, addr: u8 },
    SpiDevice { bus: u8, pins: SpiPins },
    GpioDout { pin: u8 },
    GpioDin { pin: u8 },
}

impl EndpointAddress {
    /// Parses an address string
    pub fn parse(text: &str) -> Result<Self, AddressError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AddressError::Empty);
        }

        if let Some(rest) = text.strip_prefix("gpio.") {
            let (direction, pin) = rest
                .split_once('.')
                .ok_or_else(|| AddressError::Unsupported(text.to_string()))?;
            let pin: u8 = pin
                .parse()
                .map_err(|_| AddressError::BadPin(pin.to_string()))?;
            return match direction {
                "dout" => Ok(EndpointAddress::GpioDout { pin }),
                "din" => Ok(EndpointAddress::GpioDin { pin }),
                _ => Err(AddressError::Unsupported(text.to_string())),
            };
        }

        let (bus_part, tail) = match text.split_once(':') {
            Some((bus, tail)) => (bus, Some(tail)),
            None => (text, None),
        };
        let (family, index) = parse_bus(bus_part)?;

        match (family, tail) {
            (family, None) => Ok(EndpointAddress::Bus { family, index }),
            (BusFamily::I2c, Some(tail)) => {
                let addr = parse_number(tail)
                    .map_err(|_| AddressError::BadAddress(tail.to_string()))?;
                if addr > u32::from(I2C_ADDR_MAX) {
                    return Err(AddressError::AddressOutOfRange(addr));
                }
                Ok(EndpointAddress::I2cDevice {
                    bus: index,
                    addr: addr as u8,
                })
            }
            (BusFamily::Spi, Some(tail)) => Ok(EndpointAddress::SpiDevice {
                bus: index,
                pins: SpiPins::parse(tail)?,
            }),
            (BusFamily::Uart, Some(_)) => Err(AddressError::Unsupported(text.to_string())),
        }
    }

    /// Endpoint kind this address registers as
    pub fn kind(&self) -> EndpointKind {
        match self {
            EndpointAddress::Bus { family, .. } => EndpointKind::bus(*family),
            EndpointAddress::I2cDevice { .. } => EndpointKind::I2cDevice,
            EndpointAddress::SpiDevice { .. } => EndpointKind::SpiDevice,
            EndpointAddress::GpioDout { .. } => EndpointKind::GpioDout,
            EndpointAddress::GpioDin { .. } => EndpointKind::GpioDin,
        }
    }

    /// Physical resource id: bus index, I2C address, SPI chip-select or GPIO pin
    pub fn resource_id(&self) -> u32 {
        match self {
            EndpointAddress::Bus { index, .. } => u32::from(*index),
            EndpointAddress::I2cDevice { addr, .. } => u32::from(*addr),
            EndpointAddress::SpiDevice { pins, .. } => u32::from(pins.cs),
            EndpointAddress::GpioDout { pin } | EndpointAddress::GpioDin { pin } => {
                u32::from(*pin)
            }
        }
    }

    /// Name of the bus this address lives on, if any
    pub fn parent_bus(&self) -> Option<String> {
        match self {
            EndpointAddress::I2cDevice { bus, .. } => Some(format!("i2c{}", bus)),
            EndpointAddress::SpiDevice { bus, .. } => Some(format!("spi{}", bus)),
            _ => None,
        }
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointAddress::Bus { family, index } => write!(f, "{}{}", family, index),
            EndpointAddress::I2cDevice { bus, addr } => write!(f, "i2c{}:{:#04x}", bus, addr),
            EndpointAddress::SpiDevice { bus, pins } => write!(f, "spi{}:{}", bus, pins),
            EndpointAddress::GpioDout { pin } => write!(f, "gpio.dout.{}", pin),
            EndpointAddress::GpioDin { pin } => write!(f, "gpio.din.{}", pin),
        }
    }
}

fn parse_bus(text: &str) -> Result<(BusFamily, u8), AddressError> {
    let split = text
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| AddressError::BadIndex(text.to_string()))?;
    let (family, index) = text.split_at(split);
    let family = family
        .parse::<BusFamily>()
        .map_err(|_| AddressError::UnknownFamily(family.to_string()))?;
    let index = index
        .parse::<u8>()
        .map_err(|_| AddressError::BadIndex(index.to_string()))?;
    Ok((family, index))
}

/// Parses `0x`-prefixed hex or plain decimal
pub fn parse_number(text: &str) -> Result<u32, std::num::ParseIntError> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse::<u32>(),
    }
}
