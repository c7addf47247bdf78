//! Device, parameter, schema and register intents

use super::{arg, device_id, number, optional_number};
use crate::error::KernelError;
use crate::kernel::Kernel;
use core_types::DeviceId;
use intent_router::{HandlerResult, IntentRequest, IntentRouter, ResponseWriter, RouterError};
use services_device_manager::{DeviceState, DeviceStatus};
use services_logger::{LogEntry, LogLevel};

/// Upper bound on `dev.stream` samples per request
pub const MAX_STREAM_SAMPLES: u32 = 32;

pub(super) fn register(router: &mut IntentRouter<Kernel>) -> Result<(), RouterError> {
    router.route("dev.list", 0, "", "bound devices in slot order", dev_list)?;
    router.route("dev.bind", 2, "<driver> <endpoint>", "bind a driver to an endpoint", dev_bind)?;
    router.route("dev.unbind", 1, "<id>", "unbind a device", dev_unbind)?;
    router.route("dev.enable", 1, "<id>", "resume updates of a device", dev_enable)?;
    router.route("dev.disable", 1, "<id>", "skip a device in updates", dev_disable)?;
    router.route("dev.fault", 1, "<id>", "mark a device as faulted", dev_fault)?;
    router.route("dev.status", 1, "<id>", "device health", dev_status)?;
    router.route("dev.read", 1, "<id>", "read device signals", dev_read)?;
    router.route("dev.stream", 1, "<id> [count]", "consecutive signal reads", dev_stream)?;
    router.route("param.get", 2, "<id> <name>", "read a parameter", param_get)?;
    router.route("param.set", 3, "<id> <name> <value>", "write a parameter", param_set)?;
    router.route("schema.get", 1, "<id>", "settings, signals and commands", schema_get)?;
    router.route("reg.list", 1, "<id>", "registers of a device", reg_list)?;
    router.route("reg.read", 2, "<id> <reg>", "read a register", reg_read)?;
    router.route("reg.write", 3, "<id> <reg> <value>", "write a register", reg_write)?;
    Ok(())
}

fn status_lines(out: &mut ResponseWriter, status: &DeviceStatus) {
    out.kv("id", status.id)
        .kv("driver", &status.driver)
        .kv("endpoint", &status.endpoint)
        .kv("state", status.state)
        .kv("slot", status.slot)
        .kv("init_failures", status.init_failures)
        .kv("io_failures", status.io_failures)
        .kv("last_ok_ms", status.last_ok_ms);
}

fn dev_list(kernel: &mut Kernel, _request: &IntentRequest) -> HandlerResult {
    let devices = kernel.state.devices.list();
    let mut out = ResponseWriter::new();
    out.kv("count", devices.len());
    for status in &devices {
        out.kv(
            format!("dev.{}", status.id),
            format!("{} {} {}", status.driver, status.endpoint, status.state),
        );
    }
    Ok(out)
}

fn dev_bind(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let driver = arg(request, 0)?;
    let endpoint = arg(request, 1)?;
    let state = &mut kernel.state;
    let result = state
        .devices
        .bind_device(&mut state.endpoints, state.platform.as_mut(), driver, endpoint);
    match result {
        Ok(id) => {
            state.record_entry(
                LogEntry::new(LogLevel::Info, "device bound")
                    .with_source("devices")
                    .with_field("id", id)
                    .with_field("driver", driver)
                    .with_field("endpoint", endpoint),
            );
            state.request_save();
            Ok(ResponseWriter::new().with("device_id", id))
        }
        Err(err) => {
            let message = format!("bind {} {} failed: {}", driver, endpoint, err);
            state.record(LogLevel::Warn, "devices", message);
            Err(KernelError::from(err).into())
        }
    }
}

fn dev_unbind(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let id = device_id(request, 0)?;
    let state = &mut kernel.state;
    state
        .devices
        .unbind_device(id, state.platform.as_mut())
        .map_err(KernelError::from)?;
    state.record(LogLevel::Info, "devices", format!("device {} unbound", id));
    state.request_save();
    Ok(ResponseWriter::new().with("device_id", id))
}

fn set_state(kernel: &mut Kernel, id: DeviceId, target: DeviceState) -> HandlerResult {
    let state = &mut kernel.state;
    let previous = state
        .devices
        .set_device_state(id, target)
        .map_err(KernelError::from)?;
    if previous != target {
        state.record(
            LogLevel::Info,
            "devices",
            format!("device {} {} -> {}", id, previous, target),
        );
        state.request_save();
    }
    Ok(ResponseWriter::new().with("device_id", id).with("state", target))
}

fn dev_enable(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let id = device_id(request, 0)?;
    set_state(kernel, id, DeviceState::Ready)
}

fn dev_disable(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let id = device_id(request, 0)?;
    set_state(kernel, id, DeviceState::Disabled)
}

fn dev_fault(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let id = device_id(request, 0)?;
    set_state(kernel, id, DeviceState::Fault)
}

fn dev_status(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let id = device_id(request, 0)?;
    let status = kernel.state.devices.status(id).map_err(KernelError::from)?;
    let mut out = ResponseWriter::new();
    status_lines(&mut out, &status);
    Ok(out)
}

fn read_signals(kernel: &mut Kernel, id: DeviceId) -> Result<Vec<(String, String)>, KernelError> {
    let state = &mut kernel.state;
    Ok(state.devices.read(id, state.platform.as_mut())?)
}

fn dev_read(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let id = device_id(request, 0)?;
    let mut out = ResponseWriter::new();
    for (name, value) in read_signals(kernel, id)? {
        out.kv(name, value);
    }
    Ok(out)
}

fn dev_stream(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let id = device_id(request, 0)?;
    let count = optional_number(request, 1, "count", MAX_STREAM_SAMPLES, 1)?;
    if count == 0 {
        return Err(KernelError::bad_args("count must be at least 1").into());
    }
    let mut out = ResponseWriter::new();
    out.kv("count", count);
    for sample in 0..count {
        for (name, value) in read_signals(kernel, id)? {
            out.kv(format!("sample.{}.{}", sample, name), value);
        }
    }
    Ok(out)
}

fn param_get(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let id = device_id(request, 0)?;
    let name = arg(request, 1)?;
    let value = kernel.state.devices.get_param(id, name).map_err(KernelError::from)?;
    Ok(ResponseWriter::new().with(name, value))
}

fn param_set(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let id = device_id(request, 0)?;
    let name = arg(request, 1)?;
    let value = arg(request, 2)?;
    let state = &mut kernel.state;
    state
        .devices
        .set_param(id, state.platform.as_mut(), name, value)
        .map_err(KernelError::from)?;
    state.request_save();

    let mut out = ResponseWriter::new();
    // Commands have no readable value.
    if let Ok(current) = state.devices.get_param(id, name) {
        out.kv(name, current);
    }
    Ok(out)
}

fn schema_get(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let id = device_id(request, 0)?;
    let schema = kernel.state.devices.schema(id).map_err(KernelError::from)?;
    let mut out = ResponseWriter::new();
    out.kv("driver", kernel.state.devices.status(id).map_err(KernelError::from)?.driver);
    for setting in &schema.settings {
        out.kv(
            format!("setting.{}", setting.name),
            format!("{} default={} - {}", setting.kind, setting.default, setting.description),
        );
    }
    for signal in &schema.signals {
        out.kv(format!("signal.{}", signal.name), signal.unit);
    }
    for command in &schema.commands {
        out.kv(format!("command.{}", command.name), command.description);
    }
    Ok(out)
}

fn reg_list(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let id = device_id(request, 0)?;
    let registers = kernel.state.devices.registers(id).map_err(KernelError::from)?;
    let mut out = ResponseWriter::new();
    out.kv("count", registers.len());
    for info in registers {
        out.kv(
            format!("reg.{:#04x}", info.address),
            format!("{} {}", info.name, if info.writable { "rw" } else { "ro" }),
        );
    }
    Ok(out)
}

fn reg_read(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let id = device_id(request, 0)?;
    let reg = number(request, 1, "register", u32::from(u8::MAX))? as u8;
    let state = &mut kernel.state;
    let value = state
        .devices
        .reg_read(id, state.platform.as_mut(), reg)
        .map_err(KernelError::from)?;
    Ok(ResponseWriter::new()
        .with("reg", format!("{:#04x}", reg))
        .with("value", format!("{:#04x}", value)))
}

fn reg_write(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let id = device_id(request, 0)?;
    let reg = number(request, 1, "register", u32::from(u8::MAX))? as u8;
    let value = number(request, 2, "value", u32::from(u8::MAX))? as u8;
    let state = &mut kernel.state;
    state
        .devices
        .reg_write(id, state.platform.as_mut(), reg, value)
        .map_err(KernelError::from)?;
    Ok(ResponseWriter::new()
        .with("reg", format!("{:#04x}", reg))
        .with("value", format!("{:#04x}", value)))
}
