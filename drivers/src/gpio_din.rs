//! Digital input with an edge counter

use hal::{Level, PinMode};
use resources::{ClaimSet, ResourceKind};
use services_device_manager::{
    bool_str, parse_bool, CapabilitySchema, Driver, DriverError, DriverIo, ValueKind,
};
use services_endpoints::EndpointKind;

pub const DRIVER_ID: &str = "gpio.din";

const PULL_CHOICES: &[&str] = &["none", "up", "down"];

/// Samples one pin every update and counts level changes
#[derive(Debug)]
pub struct GpioInput {
    pin: u8,
    pull: PinMode,
    invert: bool,
    last: Option<Level>,
    edges: u64,
    claims: Option<ClaimSet>,
}

impl Default for GpioInput {
    fn default() -> Self {
        Self {
            pin: 0,
            pull: PinMode::Input,
            invert: false,
            last: None,
            edges: 0,
            claims: None,
        }
    }
}

impl GpioInput {
    pub fn create() -> Box<dyn Driver> {
        Box::new(Self::default())
    }

    fn pull_name(&self) -> &'static str {
        match self.pull {
            PinMode::InputPullUp => "up",
            PinMode::InputPullDown => "down",
            _ => "none",
        }
    }

    fn sample(&mut self, io: &mut DriverIo<'_>) -> Result<Level, DriverError> {
        let level = io.platform.gpio().read(self.pin)?;
        if let Some(previous) = self.last {
            if previous != level {
                self.edges += 1;
            }
        }
        self.last = Some(level);
        Ok(level)
    }

    fn value(&self, level: Level) -> bool {
        level.is_high() != self.invert
    }
}

impl Driver for GpioInput {
    fn driver_id(&self) -> &'static str {
        DRIVER_ID
    }

    fn init(&mut self, io: &mut DriverIo<'_>) -> Result<(), DriverError> {
        if io.endpoint.kind != EndpointKind::GpioDin {
            return Err(DriverError::invalid_endpoint(io.endpoint, "expected a gpio.din endpoint"));
        }
        let pin = u8::try_from(io.endpoint.resource_id)
            .ok()
            .filter(|pin| io.platform.gpio_is_valid(*pin))
            .ok_or_else(|| DriverError::invalid_endpoint(io.endpoint, "no such pin"))?;

        let claims =
            ClaimSet::new(io.resources, io.owner).with(ResourceKind::GpioPin, u32::from(pin))?;
        self.pin = pin;
        io.platform.gpio().set_mode(pin, self.pull)?;
        self.sample(io)?;
        self.claims = Some(claims);
        Ok(())
    }

    fn update(&mut self, io: &mut DriverIo<'_>) -> Result<(), DriverError> {
        self.sample(io).map(|_| ())
    }

    fn set_param(
        &mut self,
        io: &mut DriverIo<'_>,
        name: &str,
        value: &str,
    ) -> Result<(), DriverError> {
        match name {
            "pull" => {
                let pull = match value.trim() {
                    "none" => PinMode::Input,
                    "up" => PinMode::InputPullUp,
                    "down" => PinMode::InputPullDown,
                    _ => return Err(DriverError::invalid_value(name, value)),
                };
                io.platform.gpio().set_mode(self.pin, pull)?;
                self.pull = pull;
            }
            "invert" => self.invert = parse_bool(name, value)?,
            "reset_edges" => self.edges = 0,
            _ => return Err(DriverError::UnknownParam(name.to_string())),
        }
        Ok(())
    }

    fn get_param(&self, name: &str) -> Result<String, DriverError> {
        match name {
            "pull" => Ok(self.pull_name().to_string()),
            "invert" => Ok(bool_str(self.invert)),
            _ => Err(DriverError::UnknownParam(name.to_string())),
        }
    }

    fn schema(&self) -> CapabilitySchema {
        CapabilitySchema::new()
            .with_setting("pull", ValueKind::Choice(PULL_CHOICES), "none", "input bias")
            .with_setting("invert", ValueKind::Bool, "0", "active-low input")
            .with_signal("value", "")
            .with_signal("edges", "")
            .with_command("reset_edges", "zero the edge counter")
    }

    fn read(&mut self, io: &mut DriverIo<'_>) -> Result<Vec<(String, String)>, DriverError> {
        let level = self.sample(io)?;
        Ok(vec![
            ("value".to_string(), bool_str(self.value(level))),
            ("edges".to_string(), self.edges.to_string()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Bench;

    fn booted(address: &str) -> (Bench, Box<dyn Driver>) {
        let mut bench = Bench::new(address);
        let mut driver = GpioInput::create();
        bench.init(driver.as_mut()).unwrap();
        (bench, driver)
    }

    #[test]
    fn test_input_only_pin_is_accepted() {
        let (bench, _driver) = booted("gpio.din.34");
        assert_eq!(bench.sim.pin_mode(34), Some(PinMode::Input));
        assert!(bench.resources.borrow().is_claimed(ResourceKind::GpioPin, 34));
    }

    #[test]
    fn test_counts_edges_on_update() {
        let (mut bench, mut driver) = booted("gpio.din.4");
        for level in [Level::High, Level::High, Level::Low, Level::High] {
            bench.sim.set_input_level(4, level);
            bench.call(driver.as_mut(), |d, io| d.update(io)).unwrap();
        }
        let signals = bench.call(driver.as_mut(), |d, io| d.read(io)).unwrap();
        assert_eq!(signals[0], ("value".to_string(), "1".to_string()));
        assert_eq!(signals[1], ("edges".to_string(), "3".to_string()));

        bench.call(driver.as_mut(), |d, io| d.set_param(io, "reset_edges", "")).unwrap();
        let signals = bench.call(driver.as_mut(), |d, io| d.read(io)).unwrap();
        assert_eq!(signals[1], ("edges".to_string(), "0".to_string()));
    }

    #[test]
    fn test_pull_and_invert() {
        let (mut bench, mut driver) = booted("gpio.din.5");
        bench.call(driver.as_mut(), |d, io| d.set_param(io, "pull", "up")).unwrap();
        assert_eq!(bench.sim.pin_mode(5), Some(PinMode::InputPullUp));
        assert_eq!(driver.get_param("pull").unwrap(), "up");

        bench.call(driver.as_mut(), |d, io| d.set_param(io, "invert", "1")).unwrap();
        bench.sim.set_input_level(5, Level::Low);
        let signals = bench.call(driver.as_mut(), |d, io| d.read(io)).unwrap();
        assert_eq!(signals[0], ("value".to_string(), "1".to_string()));

        assert!(matches!(
            bench.call(driver.as_mut(), |d, io| d.set_param(io, "pull", "sideways")),
            Err(DriverError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_failed_pull_change_keeps_mode() {
        let (mut bench, mut driver) = booted("gpio.din.5");
        bench.sim.set_gpio_failing(5, true);
        assert!(bench
            .call(driver.as_mut(), |d, io| d.set_param(io, "pull", "down"))
            .is_err());
        assert_eq!(driver.get_param("pull").unwrap(), "none");
        assert_eq!(bench.sim.pin_mode(5), Some(PinMode::Input));
    }

    #[test]
    fn test_rejects_flash_pin() {
        let mut bench = Bench::new("gpio.din.8");
        let mut driver = GpioInput::create();
        assert!(matches!(
            bench.init(driver.as_mut()),
            Err(DriverError::InvalidEndpoint { .. })
        ));
    }
}
