//! Raw SPI device

use hal::{BusFamily, HalError, Level, PinMode};
use resources::{ClaimSet, ResourceKind};
use services_device_manager::{
    parse_int, CapabilitySchema, Driver, DriverError, DriverIo, ValueKind,
};
use services_endpoints::{EndpointAddress, EndpointKind, SpiPins};

pub const DRIVER_ID: &str = "spi.generic";

/// SPI device addressed by its pin list
///
/// Every listed pin is claimed; `cs`, `dc` and `rst` are driven, `irq` and
/// `busy` are inputs. Writing hex bytes to the `tx` command performs one
/// full-duplex transfer.
#[derive(Debug)]
pub struct SpiGeneric {
    bus: u8,
    pins: SpiPins,
    freq_hz: u32,
    mode: u8,
    transfers: u64,
    last_rx: Vec<u8>,
    claims: Option<ClaimSet>,
}

impl Default for SpiGeneric {
    fn default() -> Self {
        Self {
            bus: 0,
            pins: SpiPins::default(),
            freq_hz: 1_000_000,
            mode: 0,
            transfers: 0,
            last_rx: Vec::new(),
            claims: None,
        }
    }
}

fn is_output(role: &str) -> bool {
    matches!(role, "cs" | "dc" | "rst")
}

fn parse_hex_bytes(name: &str, value: &str) -> Result<Vec<u8>, DriverError> {
    let digits: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.is_empty()
        || digits.len() % 2 != 0
        || !digits.chars().all(|c| c.is_ascii_hexdigit())
    {
        return Err(DriverError::invalid_value(name, value));
    }
    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|text| u8::from_str_radix(text, 16).ok())
                .ok_or_else(|| DriverError::invalid_value(name, value))
        })
        .collect()
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

impl SpiGeneric {
    pub fn create() -> Box<dyn Driver> {
        Box::new(Self::default())
    }

    fn transfer(&mut self, io: &mut DriverIo<'_>, tx: &[u8]) -> Result<(), DriverError> {
        let cs = self.pins.cs;
        io.platform.gpio().write(cs, Level::Low)?;
        let mut rx = vec![0u8; tx.len()];
        let result = match io.platform.spi(self.bus) {
            Some(spi) => spi.transfer(cs, tx, &mut rx),
            None => Err(HalError::NoSuchBus {
                family: BusFamily::Spi,
                index: self.bus,
            }),
        };
        io.platform.gpio().write(cs, Level::High)?;
        result?;
        self.transfers += 1;
        self.last_rx = rx;
        Ok(())
    }
}

impl Driver for SpiGeneric {
    fn driver_id(&self) -> &'static str {
        DRIVER_ID
    }

    fn init(&mut self, io: &mut DriverIo<'_>) -> Result<(), DriverError> {
        let (bus, pins) = match (io.endpoint.kind, io.endpoint.parse_address()) {
            (EndpointKind::SpiDevice, Ok(EndpointAddress::SpiDevice { bus, pins })) => (bus, pins),
            _ => {
                return Err(DriverError::invalid_endpoint(
                    io.endpoint,
                    "expected a spi<n>:cs=<pin> endpoint",
                ))
            }
        };
        if io.platform.spi(bus).is_none() {
            return Err(HalError::NoSuchBus {
                family: BusFamily::Spi,
                index: bus,
            }
            .into());
        }

        let mut seen = Vec::new();
        for (role, pin) in pins.iter() {
            let usable = if is_output(role) {
                io.platform.gpio_is_safe_output(pin)
            } else {
                io.platform.gpio_is_valid(pin)
            };
            if !usable {
                return Err(DriverError::invalid_endpoint(
                    io.endpoint,
                    format!("{} pin {} is not usable", role, pin),
                ));
            }
            if seen.contains(&pin) {
                return Err(DriverError::invalid_endpoint(
                    io.endpoint,
                    format!("pin {} assigned twice", pin),
                ));
            }
            seen.push(pin);
        }

        // Claims roll back in reverse order if any pin is taken.
        let mut claims = ClaimSet::new(io.resources, io.owner);
        for (_, pin) in pins.iter() {
            claims.claim(ResourceKind::GpioPin, u32::from(pin))?;
        }

        let gpio = io.platform.gpio();
        for (role, pin) in pins.iter() {
            match role {
                "cs" | "rst" => {
                    gpio.set_mode(pin, PinMode::Output)?;
                    gpio.write(pin, Level::High)?;
                }
                "dc" => {
                    gpio.set_mode(pin, PinMode::Output)?;
                    gpio.write(pin, Level::Low)?;
                }
                _ => gpio.set_mode(pin, PinMode::Input)?,
            }
        }

        self.bus = bus;
        self.pins = pins;
        self.claims = Some(claims);
        Ok(())
    }

    fn set_param(
        &mut self,
        io: &mut DriverIo<'_>,
        name: &str,
        value: &str,
    ) -> Result<(), DriverError> {
        match name {
            "freq_hz" => self.freq_hz = parse_int(name, value, 1_000, 80_000_000)? as u32,
            "mode" => self.mode = parse_int(name, value, 0, 3)? as u8,
            "tx" => {
                let bytes = parse_hex_bytes(name, value)?;
                self.transfer(io, &bytes)?;
            }
            _ => return Err(DriverError::UnknownParam(name.to_string())),
        }
        Ok(())
    }

    fn get_param(&self, name: &str) -> Result<String, DriverError> {
        match name {
            "freq_hz" => Ok(self.freq_hz.to_string()),
            "mode" => Ok(self.mode.to_string()),
            _ => Err(DriverError::UnknownParam(name.to_string())),
        }
    }

    fn schema(&self) -> CapabilitySchema {
        CapabilitySchema::new()
            .with_setting(
                "freq_hz",
                ValueKind::Int {
                    min: 1_000,
                    max: 80_000_000,
                },
                "1000000",
                "device clock",
            )
            .with_setting("mode", ValueKind::Int { min: 0, max: 3 }, "0", "clock polarity/phase")
            .with_signal("transfers", "")
            .with_signal("last_rx", "")
            .with_command("tx", "transfer hex bytes, e.g. 9f00")
    }

    fn read(&mut self, _io: &mut DriverIo<'_>) -> Result<Vec<(String, String)>, DriverError> {
        Ok(vec![
            ("transfers".to_string(), self.transfers.to_string()),
            ("last_rx".to_string(), hex_string(&self.last_rx)),
        ])
    }
}
