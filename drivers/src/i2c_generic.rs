//! Raw I2C register device

use hal::HalError;
use services_device_manager::{
    bool_str, parse_bool, parse_int, CapabilitySchema, Driver, DriverError, DriverIo,
    RegisterAccess, RegisterInfo, ValueKind,
};
use services_endpoints::{EndpointAddress, EndpointKind};

pub const DRIVER_ID: &str = "i2c.generic";

/// Exposes `reg_count` byte registers of an I2C target
///
/// With `poll` enabled, `poll_reg` is read on every update.
#[derive(Debug, Clone)]
pub struct I2cGeneric {
    bus: u8,
    addr: u8,
    reg_count: u16,
    poll: bool,
    poll_reg: u8,
    last_value: Option<u8>,
}

impl Default for I2cGeneric {
    fn default() -> Self {
        Self {
            bus: 0,
            addr: 0,
            reg_count: 16,
            poll: false,
            poll_reg: 0,
            last_value: None,
        }
    }
}

impl I2cGeneric {
    pub fn create() -> Box<dyn Driver> {
        Box::new(Self::default())
    }

    fn read_reg(&self, io: &mut DriverIo<'_>, reg: u8) -> Result<u8, DriverError> {
        let bus = io
            .platform
            .i2c(self.bus)
            .ok_or(HalError::NoSuchBus {
                family: hal::BusFamily::I2c,
                index: self.bus,
            })?;
        let mut buf = [0u8; 1];
        bus.write_read(self.addr, &[reg], &mut buf)?;
        Ok(buf[0])
    }

    fn check_reg(&self, reg: u8) -> Result<(), DriverError> {
        if u16::from(reg) < self.reg_count {
            Ok(())
        } else {
            Err(DriverError::UnknownRegister(reg))
        }
    }
}

impl Driver for I2cGeneric {
    fn driver_id(&self) -> &'static str {
        DRIVER_ID
    }

    fn init(&mut self, io: &mut DriverIo<'_>) -> Result<(), DriverError> {
        let (bus, addr) = match (io.endpoint.kind, io.endpoint.parse_address()) {
            (EndpointKind::I2cDevice, Ok(EndpointAddress::I2cDevice { bus, addr })) => (bus, addr),
            _ => {
                return Err(DriverError::invalid_endpoint(
                    io.endpoint,
                    "expected an i2c<n>:<addr> endpoint",
                ))
            }
        };
        let i2c = io.platform.i2c(bus).ok_or(HalError::NoSuchBus {
            family: hal::BusFamily::I2c,
            index: bus,
        })?;
        if !i2c.probe(addr) {
            return Err(DriverError::Io(HalError::Nack(addr)));
        }
        self.bus = bus;
        self.addr = addr;
        Ok(())
    }

    fn update(&mut self, io: &mut DriverIo<'_>) -> Result<(), DriverError> {
        if self.poll {
            self.last_value = Some(self.read_reg(io, self.poll_reg)?);
        }
        Ok(())
    }

    fn set_param(
        &mut self,
        _io: &mut DriverIo<'_>,
        name: &str,
        value: &str,
    ) -> Result<(), DriverError> {
        match name {
            "reg_count" => self.reg_count = parse_int(name, value, 1, 256)? as u16,
            "poll" => self.poll = parse_bool(name, value)?,
            "poll_reg" => {
                let reg = parse_int(name, value, 0, 255)? as u8;
                self.check_reg(reg)?;
                self.poll_reg = reg;
                self.last_value = None;
            }
            "address" => return Err(DriverError::ReadOnly(name.to_string())),
            _ => return Err(DriverError::UnknownParam(name.to_string())),
        }
        Ok(())
    }

    fn get_param(&self, name: &str) -> Result<String, DriverError> {
        match name {
            "reg_count" => Ok(self.reg_count.to_string()),
            "poll" => Ok(bool_str(self.poll)),
            "poll_reg" => Ok(format!("{:#04x}", self.poll_reg)),
            "address" => Ok(format!("{:#04x}", self.addr)),
            _ => Err(DriverError::UnknownParam(name.to_string())),
        }
    }

    fn schema(&self) -> CapabilitySchema {
        CapabilitySchema::new()
            .with_setting(
                "reg_count",
                ValueKind::Int { min: 1, max: 256 },
                "16",
                "exposed registers",
            )
            .with_setting("poll", ValueKind::Bool, "0", "read poll_reg on every update")
            .with_setting(
                "poll_reg",
                ValueKind::Int { min: 0, max: 255 },
                "0",
                "register sampled by poll",
            )
            .with_signal("value", "")
    }

    fn read(&mut self, io: &mut DriverIo<'_>) -> Result<Vec<(String, String)>, DriverError> {
        let value = self.read_reg(io, self.poll_reg)?;
        self.last_value = Some(value);
        Ok(vec![
            ("reg".to_string(), format!("{:#04x}", self.poll_reg)),
            ("value".to_string(), format!("{:#04x}", value)),
        ])
    }

    fn register_access(&mut self) -> Option<&mut dyn RegisterAccess> {
        Some(self)
    }
}

impl RegisterAccess for I2cGeneric {
    fn registers(&self) -> Vec<RegisterInfo> {
        (0..self.reg_count)
            .map(|reg| RegisterInfo {
                address: reg as u8,
                name: format!("r{:02x}", reg),
                writable: true,
            })
            .collect()
    }

    fn reg_read(&mut self, io: &mut DriverIo<'_>, reg: u8) -> Result<u8, DriverError> {
        self.check_reg(reg)?;
        self.read_reg(io, reg)
    }

    fn reg_write(&mut self, io: &mut DriverIo<'_>, reg: u8, value: u8) -> Result<(), DriverError> {
        self.check_reg(reg)?;
        let bus = io.platform.i2c(self.bus).ok_or(HalError::NoSuchBus {
            family: hal::BusFamily::I2c,
            index: self.bus,
        })?;
        bus.write(self.addr, &[reg, value])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Bench;

    fn bench_with_target() -> Bench {
        let mut bench = Bench::new("i2c0:0x76");
        bench.sim.add_i2c_target(0, 0x76);
        bench
    }

    #[test]
    fn test_init_requires_ack() {
        let mut bench = Bench::new("i2c0:0x76");
        let mut driver = I2cGeneric::default();
        assert_eq!(
            bench.init(&mut driver),
            Err(DriverError::Io(HalError::Nack(0x76)))
        );

        let mut bench = bench_with_target();
        bench.init(&mut driver).unwrap();
        assert_eq!(driver.get_param("address").unwrap(), "0x76");
    }

    #[test]
    fn test_rejects_bus_endpoint() {
        let mut bench = Bench::new("i2c0");
        let mut driver = I2cGeneric::default();
        assert!(matches!(
            bench.init(&mut driver),
            Err(DriverError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_register_access() {
        let mut bench = bench_with_target();
        bench.sim.set_i2c_register(0, 0x76, 0x03, 0xaa);
        let mut driver = I2cGeneric::default();
        bench.init(&mut driver).unwrap();

        let value = bench
            .call(&mut driver, |d, io| d.register_access().unwrap().reg_read(io, 0x03))
            .unwrap();
        assert_eq!(value, 0xaa);

        bench
            .call(&mut driver, |d, io| d.register_access().unwrap().reg_write(io, 0x04, 0x55))
            .unwrap();
        assert_eq!(bench.sim.i2c_register(0, 0x76, 0x04), Some(0x55));

        assert_eq!(
            bench.call(&mut driver, |d, io| d.register_access().unwrap().reg_read(io, 0x20)),
            Err(DriverError::UnknownRegister(0x20))
        );
        assert_eq!(driver.registers().len(), 16);
    }

    #[test]
    fn test_poll_reads_on_update() {
        let mut bench = bench_with_target();
        bench.sim.set_i2c_register(0, 0x76, 0x01, 0x42);
        let mut driver = I2cGeneric::default();
        bench.init(&mut driver).unwrap();

        let before = bench.sim.i2c_transactions(0);
        bench.call(&mut driver, |d, io| d.update(io)).unwrap();
        assert_eq!(bench.sim.i2c_transactions(0), before);

        bench.call(&mut driver, |d, io| d.set_param(io, "poll", "1")).unwrap();
        bench.call(&mut driver, |d, io| d.set_param(io, "poll_reg", "0x01")).unwrap();
        bench.call(&mut driver, |d, io| d.update(io)).unwrap();
        assert_eq!(driver.last_value, Some(0x42));
    }

    #[test]
    fn test_io_errors_surface() {
        let mut bench = bench_with_target();
        let mut driver = I2cGeneric::default();
        bench.init(&mut driver).unwrap();
        bench.sim.set_i2c_failing(0, 0x76, true);

        let result = bench.call(&mut driver, |d, io| d.read(io));
        assert!(result.unwrap_err().is_io());
    }

    #[test]
    fn test_address_is_read_only() {
        let mut bench = bench_with_target();
        let mut driver = I2cGeneric::default();
        bench.init(&mut driver).unwrap();
        assert_eq!(
            bench.call(&mut driver, |d, io| d.set_param(io, "address", "0x10")),
            Err(DriverError::ReadOnly("address".to_string()))
        );
    }
}
