//! Digital output

use hal::{Level, PinMode};
use resources::{ClaimSet, ResourceKind};
use services_device_manager::{
    bool_str, parse_bool, CapabilitySchema, Driver, DriverError, DriverIo, ValueKind,
};
use services_endpoints::EndpointKind;
use tracing::debug;

pub const DRIVER_ID: &str = "gpio.dout";

/// Drives one pin; `state` is the logical value, `invert` flips the
/// electrical level
#[derive(Debug, Default)]
pub struct GpioOutput {
    pin: u8,
    state: bool,
    invert: bool,
    claims: Option<ClaimSet>,
}

impl GpioOutput {
    pub fn create() -> Box<dyn Driver> {
        Box::new(Self::default())
    }

    fn drive(&self, io: &mut DriverIo<'_>) -> Result<(), DriverError> {
        self.drive_as(io, self.state, self.invert)
    }

    fn drive_as(
        &self,
        io: &mut DriverIo<'_>,
        state: bool,
        invert: bool,
    ) -> Result<(), DriverError> {
        io.platform.gpio().write(self.pin, Level::from_bool(state != invert))?;
        Ok(())
    }
}

impl Driver for GpioOutput {
    fn driver_id(&self) -> &'static str {
        DRIVER_ID
    }

    fn init(&mut self, io: &mut DriverIo<'_>) -> Result<(), DriverError> {
        if io.endpoint.kind != EndpointKind::GpioDout {
            return Err(DriverError::invalid_endpoint(io.endpoint, "expected a gpio.dout endpoint"));
        }
        let pin = u8::try_from(io.endpoint.resource_id)
            .map_err(|_| DriverError::invalid_endpoint(io.endpoint, "pin out of range"))?;
        if !io.platform.gpio_is_safe_output(pin) {
            return Err(DriverError::invalid_endpoint(
                io.endpoint,
                format!("pin {} cannot be driven", pin),
            ));
        }

        let claims =
            ClaimSet::new(io.resources, io.owner).with(ResourceKind::GpioPin, u32::from(pin))?;
        self.pin = pin;
        io.platform.gpio().set_mode(pin, PinMode::Output)?;
        self.drive(io)?;
        self.claims = Some(claims);
        Ok(())
    }

    fn deinit(&mut self, io: &mut DriverIo<'_>) {
        self.state = false;
        if let Err(err) = self.drive(io) {
            debug!(pin = self.pin, %err, "could not park output");
        }
    }

    fn set_param(
        &mut self,
        io: &mut DriverIo<'_>,
        name: &str,
        value: &str,
    ) -> Result<(), DriverError> {
        let (state, invert) = match name {
            "state" => (parse_bool(name, value)?, self.invert),
            "invert" => (self.state, parse_bool(name, value)?),
            "toggle" => (!self.state, self.invert),
            _ => return Err(DriverError::UnknownParam(name.to_string())),
        };
        // The cached values only change once the pin follows them
        self.drive_as(io, state, invert)?;
        self.state = state;
        self.invert = invert;
        Ok(())
    }

    fn get_param(&self, name: &str) -> Result<String, DriverError> {
        match name {
            "state" => Ok(bool_str(self.state)),
            "invert" => Ok(bool_str(self.invert)),
            _ => Err(DriverError::UnknownParam(name.to_string())),
        }
    }

    fn schema(&self) -> CapabilitySchema {
        CapabilitySchema::new()
            .with_setting("state", ValueKind::Bool, "0", "logical output value")
            .with_setting("invert", ValueKind::Bool, "0", "active-low output")
            .with_signal("state", "")
            .with_signal("level", "")
            .with_command("toggle", "invert the logical value")
    }

    fn read(&mut self, io: &mut DriverIo<'_>) -> Result<Vec<(String, String)>, DriverError> {
        let level = io.platform.gpio().read(self.pin)?;
        Ok(vec![
            ("state".to_string(), bool_str(self.state)),
            ("level".to_string(), level.to_string()),
        ])
    }
}
