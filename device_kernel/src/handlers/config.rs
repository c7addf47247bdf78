//! Persistence and configuration intents

use crate::error::KernelError;
use crate::kernel::Kernel;
use crate::state::LoadReport;
use intent_router::{HandlerResult, IntentRequest, IntentRouter, ResponseWriter, RouterError};
use services_logger::LogLevel;
use services_persistence::{export_text, parse_text, ConfigDocument};

pub(super) fn register(router: &mut IntentRouter<Kernel>) -> Result<(), RouterError> {
    router.route("persist.save", 0, "", "save the configuration now", persist_save)?;
    router.route("persist.load", 0, "", "restore the saved configuration", persist_load)?;
    router.route("config.export", 0, "", "configuration as key=value lines", config_export)?;
    router.route("config.import", 1, "<line>...", "replace the configuration", config_import)?;
    router.route("config.validate", 1, "<line>...", "check a configuration", config_validate)?;
    router.route("factory_reset", 0, "", "unbind everything and clear the store", factory_reset)?;
    Ok(())
}

/// Configuration text carried by the arguments, one or more lines per argument
fn document_arg(request: &IntentRequest) -> Result<ConfigDocument, KernelError> {
    Ok(parse_text(&request.args.join("\n"))?)
}

fn report_lines(report: &LoadReport) -> ResponseWriter {
    ResponseWriter::new()
        .with("endpoints", report.endpoints)
        .with("restored", report.restored)
        .with("failed", report.failed)
}

fn persist_save(kernel: &mut Kernel, _request: &IntentRequest) -> HandlerResult {
    let devices = kernel.state.save_all()?;
    Ok(ResponseWriter::new().with("devices", devices))
}

fn persist_load(kernel: &mut Kernel, _request: &IntentRequest) -> HandlerResult {
    let report = kernel.state.load_all()?;
    Ok(report_lines(&report))
}

fn config_export(kernel: &mut Kernel, _request: &IntentRequest) -> HandlerResult {
    let text = export_text(&kernel.state.export_document());
    let mut out = ResponseWriter::new();
    for (key, value) in text.lines().filter_map(|line| line.split_once('=')) {
        out.kv(key, value);
    }
    Ok(out)
}

fn config_import(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let document = document_arg(request)?;
    let state = &mut kernel.state;
    let report = state.apply_document(&document);
    state.record(
        LogLevel::Info,
        "persist",
        format!("configuration imported, {} devices restored", report.restored),
    );
    state.request_save();
    Ok(report_lines(&report))
}

fn config_validate(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let document = document_arg(request)?;
    let problems = kernel.state.validate_document(&document);
    let mut out = ResponseWriter::new();
    out.kv("valid", u8::from(problems.is_empty()))
        .kv("endpoints", document.endpoints.len())
        .kv("devices", document.devices.len());
    for (index, problem) in problems.iter().enumerate() {
        out.kv(format!("problem.{}", index), problem);
    }
    Ok(out)
}

fn factory_reset(kernel: &mut Kernel, _request: &IntentRequest) -> HandlerResult {
    let unbound = kernel.state.factory_reset()?;
    Ok(ResponseWriter::new().with("unbound", unbound))
}

#[cfg(test)]
mod tests {
    use crate::{Kernel, KernelConfig};
    use hal::SimPlatform;
    use intent_router::{ErrorKind, IntentRequest, IntentResponse};
    use services_persistence::MemoryBackend;

    fn kernel(with_backend: bool) -> Kernel {
        let platform = Box::new(SimPlatform::new());
        let mut kernel = Kernel::new(KernelConfig::default(), platform).unwrap();
        if with_backend {
            kernel = kernel.with_backend(Box::new(MemoryBackend::new()));
        }
        kernel.boot().unwrap();
        kernel
    }

    fn call(kernel: &mut Kernel, opcode: &str, args: &[&str]) -> IntentResponse {
        let request = args
            .iter()
            .fold(IntentRequest::new(opcode), |req, arg| req.with_arg(*arg));
        kernel.dispatch(&request)
    }

    #[test]
    fn test_save_and_load() {
        let mut kernel = kernel(true);
        assert_eq!(call(&mut kernel, "persist.load", &[]).error, ErrorKind::NotFound);

        call(&mut kernel, "dev.bind", &["gpio.dout", "gpio.dout.2"]);
        call(&mut kernel, "param.set", &["1", "state", "1"]);
        assert_eq!(call(&mut kernel, "persist.save", &[]).value("devices"), Some("1"));

        call(&mut kernel, "dev.unbind", &["1"]);
        let response = call(&mut kernel, "persist.load", &[]);
        assert_eq!(response.value("restored"), Some("1"));
        assert_eq!(response.value("failed"), Some("0"));

        let response = call(&mut kernel, "dev.list", &[]);
        assert_eq!(response.value("dev.2"), Some("gpio.dout gpio.dout.2 READY"));
        assert_eq!(call(&mut kernel, "param.get", &["2", "state"]).value("state"), Some("1"));
    }

    #[test]
    fn test_persistence_without_backend_is_unsupported() {
        let mut kernel = kernel(false);
        assert_eq!(call(&mut kernel, "persist.save", &[]).error, ErrorKind::Unsupported);
        assert_eq!(call(&mut kernel, "persist.load", &[]).error, ErrorKind::Unsupported);
        assert!(call(&mut kernel, "factory_reset", &[]).is_ok());
    }

    #[test]
    fn test_export_import() {
        let mut kernel = kernel(false);
        call(&mut kernel, "dev.bind", &["gpio.dout", "gpio.dout.2"]);
        call(&mut kernel, "dev.disable", &["1"]);

        let response = call(&mut kernel, "config.export", &[]);
        assert_eq!(response.value("version"), Some("1"));
        assert_eq!(response.value("device.0.driver"), Some("gpio.dout"));
        assert_eq!(response.value("device.0.endpoint"), Some("gpio.dout.2"));
        assert_eq!(response.value("device.0.enabled"), Some("0"));

        let response = call(
            &mut kernel,
            "config.import",
            &[
                "device.0.driver=gpio.dout;device.0.endpoint=gpio.dout.4",
                "device.1.driver=gpio.dout;device.1.endpoint=gpio.dout.7",
            ],
        );
        assert_eq!(response.value("restored"), Some("1"));
        assert_eq!(response.value("failed"), Some("1"));

        let response = call(&mut kernel, "dev.list", &[]);
        assert_eq!(response.value("count"), Some("1"));
        assert_eq!(response.value("dev.2"), Some("gpio.dout gpio.dout.4 READY"));
    }

    #[test]
    fn test_import_rejects_malformed_text() {
        let mut kernel = kernel(false);
        let response = call(&mut kernel, "config.import", &["device.0.driver"]);
        assert_eq!(response.error, ErrorKind::BadArgs);
    }

    #[test]
    fn test_validate_does_not_apply() {
        let mut kernel = kernel(false);
        let response = call(
            &mut kernel,
            "config.validate",
            &["device.0.driver=bme280;device.0.endpoint=i2c0:0x76"],
        );
        assert_eq!(response.value("valid"), Some("0"));
        assert_eq!(response.value("devices"), Some("1"));
        assert!(response.value("problem.0").unwrap().contains("bme280"));

        let response = call(
            &mut kernel,
            "config.validate",
            &["device.0.driver=gpio.dout;device.0.endpoint=gpio.dout.2;device.0.param.state=1"],
        );
        assert_eq!(response.value("valid"), Some("1"));
        assert_eq!(call(&mut kernel, "dev.list", &[]).value("count"), Some("0"));
    }

    #[test]
    fn test_factory_reset() {
        let mut kernel = kernel(true);
        call(&mut kernel, "dev.bind", &["gpio.dout", "gpio.dout.2"]);
        call(&mut kernel, "persist.save", &[]);

        let response = call(&mut kernel, "factory_reset", &[]);
        assert_eq!(response.value("unbound"), Some("1"));
        assert_eq!(call(&mut kernel, "dev.list", &[]).value("count"), Some("0"));
        assert_eq!(call(&mut kernel, "persist.load", &[]).error, ErrorKind::NotFound);

        let response = call(&mut kernel, "dev.bind", &["gpio.dout", "gpio.dout.2"]);
        assert_eq!(response.value("device_id"), Some("2"));
    }
}
