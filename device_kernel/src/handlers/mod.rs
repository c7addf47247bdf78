//! v1 intent handlers
//!
//! One submodule per opcode family. Every handler has the router's
//! `fn(&mut Kernel, &IntentRequest) -> HandlerResult` shape; kernel errors
//! convert into the wire taxonomy through `?`.

mod config;
mod devices;
mod endpoints;
mod system;

use crate::error::KernelError;
use crate::kernel::Kernel;
use core_types::DeviceId;
use intent_router::{IntentRequest, IntentRouter, RouterError};
use services_endpoints::parse_number;

/// Registers every handler
pub(crate) fn register_all(router: &mut IntentRouter<Kernel>) -> Result<(), RouterError> {
    system::register(router)?;
    endpoints::register(router)?;
    devices::register(router)?;
    config::register(router)?;
    Ok(())
}

/// Argument `index`; the router has already checked the minimum count
fn arg(request: &IntentRequest, index: usize) -> Result<&str, KernelError> {
    request
        .arg(index)
        .ok_or_else(|| KernelError::bad_args(format!("missing argument {}", index + 1)))
}

fn device_id(request: &IntentRequest, index: usize) -> Result<DeviceId, KernelError> {
    let text = arg(request, index)?;
    text.parse()
        .map_err(|_| KernelError::bad_args(format!("invalid device id '{}'", text)))
}

/// Hex (`0x..`) or decimal number no larger than `max`
fn number(request: &IntentRequest, index: usize, name: &str, max: u32) -> Result<u32, KernelError> {
    let text = arg(request, index)?;
    match parse_number(text) {
        Ok(value) if value <= max => Ok(value),
        _ => Err(KernelError::bad_args(format!("invalid {} '{}'", name, text))),
    }
}

/// Optional number with a default
fn optional_number(
    request: &IntentRequest,
    index: usize,
    name: &str,
    max: u32,
    default: u32,
) -> Result<u32, KernelError> {
    match request.arg(index) {
        Some(_) => number(request, index, name, max),
        None => Ok(default),
    }
}
