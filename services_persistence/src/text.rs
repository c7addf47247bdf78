//! Line-oriented text form of a [`ConfigDocument`]
//!
//! ```text
//! version=1
//! endpoint.0=i2c0:0x76
//! device.0.driver=gpio.dout
//! device.0.endpoint=gpio.dout.2
//! device.0.enabled=1
//! device.0.param.state=1
//! ```
//!
//! Lines may also be separated by `;`. Blank lines and lines starting with
//! `#` are ignored. Indices only order entries; gaps are allowed.

use crate::{ConfigDocument, DeviceRecord, PersistenceError, PersistenceResult};
use std::collections::BTreeMap;

/// Renders a document as `key=value` lines
pub fn export_text(document: &ConfigDocument) -> String {
    let mut out = format!("version={}\n", document.version);
    for (i, address) in document.endpoints.iter().enumerate() {
        out.push_str(&format!("endpoint.{}={}\n", i, address));
    }
    for (i, device) in document.devices.iter().enumerate() {
        out.push_str(&format!("device.{}.driver={}\n", i, device.driver));
        out.push_str(&format!("device.{}.endpoint={}\n", i, device.endpoint));
        out.push_str(&format!("device.{}.enabled={}\n", i, u8::from(device.enabled)));
        for (name, value) in &device.params {
            out.push_str(&format!("device.{}.param.{}={}\n", i, name, value));
        }
    }
    out
}

#[derive(Default)]
struct PartialDevice {
    driver: Option<String>,
    endpoint: Option<String>,
    enabled: Option<bool>,
    params: BTreeMap<String, String>,
}

fn parse_error(line: usize, reason: impl Into<String>) -> PersistenceError {
    PersistenceError::Parse {
        line,
        reason: reason.into(),
    }
}

fn parse_index(line: usize, text: &str) -> PersistenceResult<usize> {
    text.parse::<usize>()
        .map_err(|_| parse_error(line, format!("bad index '{}'", text)))
}

/// Parses the text form
///
/// Every device needs a `driver` and an `endpoint`; `enabled` defaults to 1.
pub fn parse_text(text: &str) -> PersistenceResult<ConfigDocument> {
    let mut document = ConfigDocument::new();
    let mut endpoints: BTreeMap<usize, String> = BTreeMap::new();
    let mut devices: BTreeMap<usize, PartialDevice> = BTreeMap::new();

    for (number, raw) in text.split(['\n', ';']).enumerate() {
        let line_no = number + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| parse_error(line_no, "expected key=value"))?;
        let (key, value) = (key.trim(), value.trim());

        if key == "version" {
            let version = value
                .parse::<u32>()
                .map_err(|_| parse_error(line_no, "bad version"))?;
            if version != ConfigDocument::CURRENT_VERSION {
                return Err(PersistenceError::UnsupportedVersion(version));
            }
            continue;
        }

        if let Some(index) = key.strip_prefix("endpoint.") {
            endpoints.insert(parse_index(line_no, index)?, value.to_string());
            continue;
        }

        let rest = key
            .strip_prefix("device.")
            .ok_or_else(|| parse_error(line_no, format!("unknown key '{}'", key)))?;
        let (index, field) = rest
            .split_once('.')
            .ok_or_else(|| parse_error(line_no, format!("incomplete key '{}'", key)))?;
        let device = devices.entry(parse_index(line_no, index)?).or_default();
        match field {
            "driver" => device.driver = Some(value.to_string()),
            "endpoint" => device.endpoint = Some(value.to_string()),
            "enabled" => {
                device.enabled = Some(match value {
                    "1" | "true" => true,
                    "0" | "false" => false,
                    _ => return Err(parse_error(line_no, format!("bad enabled value '{}'", value))),
                })
            }
            other => match other.strip_prefix("param.") {
                Some(name) if !name.is_empty() => {
                    device.params.insert(name.to_string(), value.to_string());
                }
                _ => return Err(parse_error(line_no, format!("unknown device field '{}'", other))),
            },
        }
    }

    document.endpoints = endpoints.into_values().collect();
    for (index, partial) in devices {
        let missing = |what: &str| PersistenceError::Parse {
            line: 0,
            reason: format!("device.{} has no {}", index, what),
        };
        let driver = partial.driver.ok_or_else(|| missing("driver"))?;
        let endpoint = partial.endpoint.ok_or_else(|| missing("endpoint"))?;
        document.devices.push(DeviceRecord {
            driver,
            endpoint,
            enabled: partial.enabled.unwrap_or(true),
            params: partial.params,
        });
    }
    Ok(document)
}
