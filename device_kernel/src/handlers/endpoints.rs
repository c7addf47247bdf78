//! Endpoint and bus intents

use super::{arg, number};
use crate::error::KernelError;
use crate::kernel::Kernel;
use hal::{BusFamily, BusInfo, HalError};
use intent_router::{HandlerResult, IntentRequest, IntentRouter, ResponseWriter, RouterError};
use services_endpoints::EndpointAddress;
use services_logger::{LogEntry, LogLevel};

pub(super) fn register(router: &mut IntentRouter<Kernel>) -> Result<(), RouterError> {
    router.route("ep.list", 0, "", "registered endpoints", ep_list)?;
    router.route("ep.probe", 1, "<address>", "scan a bus for responding targets", ep_probe)?;
    router.route("ep.register", 1, "<address>", "register an endpoint", ep_register)?;
    router.route("ep.unregister", 1, "<address>", "remove an unused endpoint", ep_unregister)?;
    router.route("bus.list", 0, "", "bus instances", bus_list)?;
    router.route("bus.info", 1, "<bus>", "bus frequency and pins", bus_info)?;
    router.route("bus.config", 2, "<bus> <freq_hz>", "change a bus frequency", bus_config)?;
    Ok(())
}

fn ep_list(kernel: &mut Kernel, _request: &IntentRequest) -> HandlerResult {
    let endpoints = kernel.state.endpoints.list();
    let mut out = ResponseWriter::new();
    out.kv("count", endpoints.len());
    for (index, endpoint) in endpoints.iter().enumerate() {
        out.kv(
            format!("ep.{}", index),
            format!("{} kind={} res={}", endpoint.address, endpoint.kind, endpoint.resource_id),
        );
    }
    Ok(out)
}

fn ep_probe(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let address = arg(request, 0)?;
    let state = &mut kernel.state;
    let range = state.config.probe_range();
    let report = state
        .endpoints
        .probe_endpoint(address, state.platform.as_mut(), range)
        .map_err(KernelError::from)?;

    state.record_entry(
        LogEntry::new(LogLevel::Info, report.summary())
            .with_source("endpoints")
            .with_field("endpoint", address)
            .with_field("scanned", report.scanned),
    );

    let mut out = ResponseWriter::new();
    out.kv("bus", &report.endpoint)
        .kv("scanned", report.scanned)
        .kv("count", report.found.len());
    for device in report.addresses() {
        out.kv("device", device);
    }
    out.kv("result", report.summary());
    Ok(out)
}

fn ep_register(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let endpoint = kernel
        .state
        .endpoints
        .register_address(arg(request, 0)?)
        .map_err(KernelError::from)?;
    kernel.state.request_save();
    Ok(ResponseWriter::new()
        .with("address", &endpoint.address)
        .with("kind", endpoint.kind)
        .with("res", endpoint.resource_id))
}

fn ep_unregister(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let address = arg(request, 0)?;
    if let Some(device) = kernel
        .state
        .devices
        .list()
        .into_iter()
        .find(|d| d.endpoint == address)
    {
        let message = format!("{} is used by device {}", address, device.id);
        return Err(KernelError::Conflict(message).into());
    }
    let endpoint = kernel
        .state
        .endpoints
        .unregister_endpoint(address)
        .map_err(KernelError::from)?;
    kernel.state.request_save();
    Ok(ResponseWriter::new().with("address", endpoint.address))
}

/// Parses a bare bus name such as `i2c0`
fn parse_bus(text: &str) -> Result<(BusFamily, u8), KernelError> {
    match EndpointAddress::parse(text) {
        Ok(EndpointAddress::Bus { family, index }) => Ok((family, index)),
        _ => Err(KernelError::bad_args(format!("'{}' is not a bus name", text))),
    }
}

fn bus_info_for(kernel: &Kernel, family: BusFamily, index: u8) -> Result<BusInfo, KernelError> {
    kernel
        .state
        .platform
        .bus_info(family, index)
        .ok_or(KernelError::Hal(HalError::NoSuchBus { family, index }))
}

fn pins(info: &BusInfo) -> String {
    info.pins
        .iter()
        .map(|(name, pin)| format!("{}={}", name, pin))
        .collect::<Vec<_>>()
        .join(" ")
}

fn bus_list(kernel: &mut Kernel, _request: &IntentRequest) -> HandlerResult {
    let platform = kernel.state.platform.as_ref();
    let mut out = ResponseWriter::new();
    for family in BusFamily::ALL {
        for index in 0..platform.bus_count(family) {
            if let Some(info) = platform.bus_info(family, index) {
                out.kv(
                    format!("{}{}", family, index),
                    format!("freq_hz={} {}", info.freq_hz, pins(&info)),
                );
            }
        }
    }
    Ok(out)
}

fn bus_info(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let (family, index) = parse_bus(arg(request, 0)?)?;
    let info = bus_info_for(kernel, family, index)?;
    let mut out = ResponseWriter::new();
    out.kv("bus", format!("{}{}", family, index)).kv("freq_hz", info.freq_hz);
    for (name, pin) in &info.pins {
        out.kv(format!("pin.{}", name), pin);
    }
    Ok(out)
}

fn bus_config(kernel: &mut Kernel, request: &IntentRequest) -> HandlerResult {
    let (family, index) = parse_bus(arg(request, 0)?)?;
    let freq_hz = number(request, 1, "frequency", u32::MAX)?;
    kernel
        .state
        .platform
        .configure_bus(family, index, freq_hz)
        .map_err(KernelError::from)?;
    kernel.state.record(
        LogLevel::Info,
        "endpoints",
        format!("{}{} set to {} Hz", family, index, freq_hz),
    );
    let info = bus_info_for(kernel, family, index)?;
    Ok(ResponseWriter::new()
        .with("bus", format!("{}{}", family, index))
        .with("freq_hz", info.freq_hz))
}

#[cfg(test)]
mod tests {
    use crate::{Kernel, KernelConfig};
    use hal::SimPlatform;
    use intent_router::{ErrorKind, IntentRequest, IntentResponse};

    fn kernel_with(sim: SimPlatform) -> Kernel {
        let mut kernel = Kernel::new(KernelConfig::default(), Box::new(sim)).unwrap();
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
    fn test_ep_list_shows_buses() {
        let mut kernel = kernel_with(SimPlatform::new());
        let response = call(&mut kernel, "ep.list", &[]);
        assert_eq!(response.value("count"), Some("5"));
        assert_eq!(response.value("ep.0"), Some("i2c0 kind=I2C res=0"));
        assert_eq!(response.value("ep.4"), Some("uart0 kind=UART res=0"));
    }

    #[test]
    fn test_probe_empty_bus() {
        let mut kernel = kernel_with(SimPlatform::new());
        let response = call(&mut kernel, "ep.probe", &["i2c0"]);
        assert!(response.is_ok());
        assert_eq!(response.value("count"), Some("0"));
        assert_eq!(response.value("result"), Some("No devices found"));
        assert_eq!(response.value("scanned"), Some("112"));
    }

    #[test]
    fn test_probe_lists_responder_once() {
        let mut sim = SimPlatform::new();
        sim.add_i2c_target(0, 0x76);
        let mut kernel = kernel_with(sim);
        let response = call(&mut kernel, "ep.probe", &["i2c0"]);
        assert_eq!(response.value("count"), Some("1"));
        assert_eq!(response.data.matches("0x76").count(), 1);
        assert!(response.data.contains("device=0x76\n"));
    }

    #[test]
    fn test_probe_errors() {
        let mut kernel = kernel_with(SimPlatform::new());
        assert_eq!(call(&mut kernel, "ep.probe", &["i2c7"]).error, ErrorKind::NotFound);
        assert_eq!(call(&mut kernel, "ep.probe", &["spi0"]).error, ErrorKind::Unsupported);
        assert_eq!(call(&mut kernel, "ep.probe", &[]).error, ErrorKind::BadArgs);
    }

    #[test]
    fn test_register_and_unregister() {
        let mut kernel = kernel_with(SimPlatform::new());
        let response = call(&mut kernel, "ep.register", &["i2c0:118"]);
        assert_eq!(response.value("address"), Some("i2c0:0x76"));
        assert_eq!(response.value("kind"), Some("I2C_DEV"));
        assert_eq!(response.value("res"), Some("118"));

        assert_eq!(call(&mut kernel, "ep.register", &["i2c0:0x99"]).error, ErrorKind::BadArgs);
        assert_eq!(call(&mut kernel, "ep.register", &["i2c5:0x10"]).error, ErrorKind::NotFound);

        assert!(call(&mut kernel, "ep.unregister", &["i2c0:0x76"]).is_ok());
        assert_eq!(call(&mut kernel, "ep.unregister", &["i2c0:0x76"]).error, ErrorKind::NotFound);
    }

    #[test]
    fn test_unregister_in_use_conflicts() {
        let mut kernel = kernel_with(SimPlatform::new());
        assert!(call(&mut kernel, "dev.bind", &["gpio.dout", "gpio.dout.2"]).is_ok());
        let response = call(&mut kernel, "ep.unregister", &["gpio.dout.2"]);
        assert_eq!(response.error, ErrorKind::Conflict);
    }

    #[test]
    fn test_bus_queries() {
        let mut kernel = kernel_with(SimPlatform::new());
        let response = call(&mut kernel, "bus.list", &[]);
        assert_eq!(response.value("i2c0"), Some("freq_hz=100000 sda=21 scl=22"));
        assert_eq!(response.value("uart0"), Some("freq_hz=115200 tx=1 rx=3"));

        let response = call(&mut kernel, "bus.info", &["spi0"]);
        assert_eq!(response.value("pin.sck"), Some("18"));
        assert_eq!(call(&mut kernel, "bus.info", &["i2c0:0x76"]).error, ErrorKind::BadArgs);
        assert_eq!(call(&mut kernel, "bus.info", &["i2c3"]).error, ErrorKind::NotFound);
    }

    #[test]
    fn test_bus_config() {
        let mut kernel = kernel_with(SimPlatform::new());
        let response = call(&mut kernel, "bus.config", &["i2c0", "400000"]);
        assert_eq!(response.value("freq_hz"), Some("400000"));
        let response = call(&mut kernel, "bus.info", &["i2c0"]);
        assert_eq!(response.value("freq_hz"), Some("400000"));

        let response = call(&mut kernel, "bus.config", &["i2c0", "5000000"]);
        assert_eq!(response.error, ErrorKind::BadArgs);
        let response = call(&mut kernel, "bus.config", &["i2c0", "fast"]);
        assert_eq!(response.error, ErrorKind::BadArgs);
    }
}
