//! System, log and service intents

use super::{arg, optional_number};
use crate::kernel::Kernel;
use intent_router::{
    HandlerResult, IntentRequest, IntentRouter, ResponseWriter, RouterError, PROTOCOL_VERSION,
};
use services_logger::LogLevel;

/// Firmware version reported by `identify`
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_LOG_TAIL: u32 = 20;

pub(super) fn register(router: &mut IntentRouter<Kernel>) -> Result<(), RouterError> {
    router.route("help", 0, "", "list opcodes", help)?;
    router.route("sys.info", 0, "", "kernel summary", sys_info)?;
    router.route("hal.caps", 0, "", "platform capabilities", hal_caps)?;
    router.route("identify", 0, "", "board and firmware identity", identify)?;
    router.route("log.tail", 0, "[n]", "last n log entries", log_tail)?;
    router.route("log.clear", 0, "", "clear the log", log_clear)?;
    router.route("svc.list", 0, "", "system services", svc_list)?;
    router.route("svc.start", 1, "<name>", "start a service", svc_start)?;
    router.route("svc.stop", 1, "<name>", "stop a service", svc_stop)?;
    router.route("svc.pause", 1, "<name>", "pause a service", svc_pause)?;
    router.route("svc.resume", 1, "<name>", "resume a service", svc_resume)?;
    Ok(())
}

fn help(kernel: &mut Kernel, _request: &IntentRequest) -> HandlerResult {
    Ok(kernel.router.help())
}

fn sys_info(kernel: &mut Kernel, _request: &IntentRequest) -> HandlerResult {
    let state = &kernel.state;
    let heap = state.platform.heap_stats();
    let drivers: Vec<&str> = state.devices.catalog().list().iter().map(|d| d.id).collect();
    let mut out = ResponseWriter::new();
    out.kv("protocol", PROTOCOL_VERSION)
        .kv("board", state.platform.board_name())
        .kv("session", state.session)
        .kv("uptime_ms", state.now())
        .kv("ticks", kernel.services.tick_count())
        .kv("heap_free", heap.free)
        .kv("heap_min_free", heap.min_free)
        .kv("devices", state.devices.count())
        .kv("max_devices", state.devices.capacity())
        .kv("endpoints", state.endpoints.len())
        .kv("claims", state.resources.borrow().claim_count())
        .kv("services", kernel.services.len())
        .kv("drivers", drivers.join(","))
        .kv("intents", state.telemetry.intents)
        .kv("intent_errors", state.telemetry.intent_errors)
        .kv("saves", state.telemetry.saves)
        .kv("save_pending", u8::from(state.save_requested));
    Ok(out)
}

fn hal_caps(kernel: &mut Kernel, _request: &IntentRequest) -> HandlerResult {
    let platform = kernel.state.platform.as_ref();
    let heap = platform.heap_stats();
    let flash = platform.flash_stats();
    Ok(ResponseWriter::new()
        .with("i2c", platform.i2c_count())
        .with("spi", platform.spi_count())
        .with("uart", platform.uart_count())
        .with("gpio", platform.gpio_count())
        .with("heap_total", heap.total)
        .with("heap_free", heap.free)
        .with("flash_total", flash.total)
        .with("flash_used", flash.used))
}

fn identify(kernel: &mut Kernel, _request: &IntentRequest) -> HandlerResult {
    Ok(ResponseWriter::new()
        .with("board", kernel.state.platform.board_name())
        .with("protocol", PROTOCOL_VERSION)
        .with("firmware", FIRMWARE_VERSION)
        .with("session", kernel.state.session))
}

fn log_tail(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let capacity = u32::try_from(kernel.state.log.capacity()).unwrap_or(u32::MAX);
    let n = optional_number(request, 0, "count", capacity, DEFAULT_LOG_TAIL)?;
    let log = &kernel.state.log;
    let mut out = ResponseWriter::new();
    let entries: Vec<_> = log.tail(n as usize).collect();
    out.kv("count", entries.len()).kv("dropped", log.dropped());
    for (index, entry) in entries.iter().enumerate() {
        out.kv(format!("log.{}", index), entry);
    }
    Ok(out)
}

fn log_clear(kernel: &mut Kernel, _request: &IntentRequest) -> HandlerResult {
    let cleared = kernel.state.log.len();
    kernel.state.log.clear();
    Ok(ResponseWriter::new().with("cleared", cleared))
}

fn svc_list(kernel: &mut Kernel, _request: &IntentRequest) -> HandlerResult {
    let mut out = ResponseWriter::new();
    for info in kernel.services.list() {
        out.kv(
            format!("svc.{}", info.name),
            format!("{} interval={} runs={}", info.state, info.interval, info.runs),
        );
    }
    Ok(out)
}

fn service_state(kernel: &Kernel, name: &str) -> ResponseWriter {
    let mut out = ResponseWriter::new();
    out.kv("service", name);
    if let Some(state) = kernel.services.state(name) {
        out.kv("state", state);
    }
    out
}

fn svc_start(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let name = arg(request, 0)?;
    kernel
        .services
        .start(name, &mut kernel.state)
        .map_err(crate::KernelError::from)?;
    kernel.state.record(LogLevel::Info, "kernel", format!("service {} started", name));
    Ok(service_state(kernel, name))
}

fn svc_stop(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let name = arg(request, 0)?;
    kernel
        .services
        .stop(name, &mut kernel.state)
        .map_err(crate::KernelError::from)?;
    kernel.state.record(LogLevel::Info, "kernel", format!("service {} stopped", name));
    Ok(service_state(kernel, name))
}

fn svc_pause(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let name = arg(request, 0)?;
    kernel.services.pause(name).map_err(crate::KernelError::from)?;
    Ok(service_state(kernel, name))
}

fn svc_resume(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let name = arg(request, 0)?;
    kernel.services.resume(name).map_err(crate::KernelError::from)?;
    Ok(service_state(kernel, name))
}

#[cfg(test)]
mod tests {
    use crate::{Kernel, KernelConfig};
    use hal::SimPlatform;
    use intent_router::{ErrorKind, IntentRequest};

    fn kernel() -> Kernel {
        let platform = Box::new(SimPlatform::new());
        let mut kernel = Kernel::new(KernelConfig::default(), platform).unwrap();
        kernel.boot().unwrap();
        kernel
    }

    #[test]
    fn test_sys_info() {
        let mut kernel = kernel();
        kernel.tick();
        let response = kernel.dispatch(&IntentRequest::new("sys.info"));
        assert!(response.is_ok());
        assert_eq!(response.value("protocol"), Some("1.0"));
        assert_eq!(response.value("board"), Some("sim"));
        assert_eq!(response.value("ticks"), Some("1"));
        assert_eq!(response.value("devices"), Some("0"));
        assert_eq!(
            response.value("drivers"),
            Some("gpio.dout,gpio.din,i2c.generic,spi.generic")
        );
    }

    #[test]
    fn test_hal_caps() {
        let mut kernel = kernel();
        let response = kernel.dispatch(&IntentRequest::new("hal.caps"));
        assert_eq!(response.value("i2c"), Some("2"));
        assert_eq!(response.value("spi"), Some("2"));
        assert_eq!(response.value("uart"), Some("1"));
        assert_eq!(response.value("gpio"), Some("40"));
    }

    #[test]
    fn test_identify() {
        let mut kernel = kernel();
        let response = kernel.dispatch(&IntentRequest::new("identify"));
        assert_eq!(response.value("firmware"), Some(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_help_lists_every_opcode() {
        let mut kernel = kernel();
        let response = kernel.dispatch(&IntentRequest::new("help"));
        assert_eq!(response.value("protocol"), Some("1.0"));
        assert_eq!(
            response.value("dev.bind"),
            Some("<driver> <endpoint> - bind a driver to an endpoint")
        );
        for opcode in ["ep.probe", "param.set", "reg.write", "config.import", "factory_reset"] {
            assert!(response.value(opcode).is_some(), "{} missing from help", opcode);
        }
    }

    #[test]
    fn test_log_tail_and_clear() {
        let mut kernel = kernel();
        let response = kernel.dispatch(&IntentRequest::new("log.tail").with_arg("1"));
        assert_eq!(response.value("count"), Some("1"));
        assert!(response.value("log.0").unwrap().contains("kernel booted"));

        let response = kernel.dispatch(&IntentRequest::new("log.clear"));
        assert_eq!(response.value("cleared"), Some("1"));
        let response = kernel.dispatch(&IntentRequest::new("log.tail"));
        assert_eq!(response.value("count"), Some("0"));

        let response = kernel.dispatch(&IntentRequest::new("log.tail").with_arg("lots"));
        assert_eq!(response.error, ErrorKind::BadArgs);
    }

    #[test]
    fn test_service_control() {
        let mut kernel = kernel();
        let response = kernel.dispatch(&IntentRequest::new("svc.pause").with_arg("health"));
        assert_eq!(response.value("state"), Some("PAUSED"));

        let response = kernel.dispatch(&IntentRequest::new("svc.pause").with_arg("health"));
        assert_eq!(response.error, ErrorKind::Conflict);

        let response = kernel.dispatch(&IntentRequest::new("svc.resume").with_arg("health"));
        assert_eq!(response.value("state"), Some("RUNNING"));

        let response = kernel.dispatch(&IntentRequest::new("svc.stop").with_arg("telemetry"));
        assert_eq!(response.value("state"), Some("STOPPED"));
        let response = kernel.dispatch(&IntentRequest::new("svc.start").with_arg("telemetry"));
        assert_eq!(response.value("state"), Some("RUNNING"));

        let response = kernel.dispatch(&IntentRequest::new("svc.list"));
        assert_eq!(response.value("svc.devices"), Some("RUNNING interval=1 runs=0"));

        let response = kernel.dispatch(&IntentRequest::new("svc.start").with_arg("ghost"));
        assert_eq!(response.error, ErrorKind::NotFound);
    }
}
