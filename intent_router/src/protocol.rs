//! Wire types of the intent protocol

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Protocol version; argument order and meaning are fixed within a version
pub const PROTOCOL_VERSION: &str = "1.0";

/// Maximum number of arguments in one request
pub const MAX_INTENT_ARGS: usize = 8;

/// Error taxonomy
///
/// Numeric codes are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Ok = 0,
    /// Malformed or insufficient arguments
    BadArgs = 1,
    /// Unknown opcode, device, endpoint or parameter
    NotFound = 2,
    /// Resource already owned, bind collision
    Conflict = 3,
    /// Hardware transaction failure
    Io = 4,
    /// Capability not implemented
    Unsupported = 5,
    /// Invariant violation
    Internal = 6,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::Ok,
        ErrorKind::BadArgs,
        ErrorKind::NotFound,
        ErrorKind::Conflict,
        ErrorKind::Io,
        ErrorKind::Unsupported,
        ErrorKind::Internal,
    ];

    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.code() == code)
    }

    /// Name used on the wire
    pub fn wire_name(&self) -> &'static str {
        match self {
            ErrorKind::Ok => "OK",
            ErrorKind::BadArgs => "ERR_BAD_ARGS",
            ErrorKind::NotFound => "ERR_NOT_FOUND",
            ErrorKind::Conflict => "ERR_CONFLICT",
            ErrorKind::Io => "ERR_IO",
            ErrorKind::Unsupported => "ERR_UNSUPPORTED",
            ErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// A request: an opcode plus positional arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRequest {
    /// Dotted opcode, e.g. `dev.bind`
    pub opcode: String,
    /// Positional arguments
    pub args: Vec<String>,
}

impl IntentRequest {
    pub fn new(opcode: impl Into<String>) -> Self {
        Self {
            opcode: opcode.into(),
            args: Vec::new(),
        }
    }

    /// Adds a positional argument
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }
}

/// A response: error kind, human message and `key=value` data lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentResponse {
    pub error: ErrorKind,
    pub message: String,
    /// Newline-terminated `key=value` lines, empty when there is no data
    pub data: String,
}

impl IntentResponse {
    /// Bare success
    pub fn ok() -> Self {
        Self {
            error: ErrorKind::Ok,
            message: String::new(),
            data: String::new(),
        }
    }

    /// Success carrying data lines
    pub fn with_data(data: ResponseWriter) -> Self {
        Self {
            data: data.finish(),
            ..Self::ok()
        }
    }

    /// Response for a handler outcome
    pub fn from_result(result: Result<ResponseWriter, IntentError>) -> Self {
        match result {
            Ok(data) => Self::with_data(data),
            Err(err) => err.into(),
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error: kind,
            message: message.into(),
            data: String::new(),
        }
    }

    pub fn bad_args(message: impl Into<String>) -> Self {
        Self::error(ErrorKind::BadArgs, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::error(ErrorKind::NotFound, message)
    }

    pub fn is_ok(&self) -> bool {
        self.error == ErrorKind::Ok
    }

    /// Value of the first data line with `key`
    pub fn value(&self, key: &str) -> Option<&str> {
        self.data.lines().find_map(|line| {
            line.split_once('=')
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v)
        })
    }

    /// Renders the status line followed by the data lines
    pub fn render(&self) -> String {
        let mut out = String::from(self.error.wire_name());
        if !self.message.is_empty() {
            out.push_str(": ");
            out.push_str(&self.message);
        }
        out.push('\n');
        out.push_str(&self.data);
        out
    }
}

/// A failed intent: error kind plus human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct IntentError {
    pub kind: ErrorKind,
    pub message: String,
}

impl IntentError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn bad_args(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadArgs, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }
}

impl From<IntentError> for IntentResponse {
    fn from(err: IntentError) -> Self {
        IntentResponse::error(err.kind, err.message)
    }
}

/// Builder for `key=value\n` payloads
///
/// Keys and values are flattened to a single line so a payload always
/// parses line by line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseWriter {
    buf: String,
}

fn flatten(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one `key=value` line
    pub fn kv(&mut self, key: impl fmt::Display, value: impl fmt::Display) -> &mut Self {
        self.buf.push_str(&flatten(&key.to_string()));
        self.buf.push('=');
        self.buf.push_str(&flatten(&value.to_string()));
        self.buf.push('\n');
        self
    }

    /// Builder form of [`ResponseWriter::kv`]
    pub fn with(mut self, key: impl fmt::Display, value: impl fmt::Display) -> Self {
        self.kv(key, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        let codes: Vec<u8> = ErrorKind::ALL.iter().map(|k| k.code()).collect();
        assert_eq!(codes, vec![0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(ErrorKind::from_code(3), Some(ErrorKind::Conflict));
        assert_eq!(ErrorKind::from_code(7), None);
        assert_eq!(ErrorKind::NotFound.to_string(), "ERR_NOT_FOUND");
    }

    #[test]
    fn test_error_kind_serializes_by_name() {
        let json = serde_json::to_string(&ErrorKind::BadArgs).unwrap();
        assert_eq!(json, "\"BAD_ARGS\"");
    }

    #[test]
    fn test_writer_flattens_newlines() {
        let data = ResponseWriter::new()
            .with("device_id", 1)
            .with("message", "line one\nline two")
            .finish();
        assert_eq!(data, "device_id=1\nmessage=line one line two\n");
    }

    #[test]
    fn test_render() {
        let ok = IntentResponse::with_data(ResponseWriter::new().with("state", "READY"));
        assert_eq!(ok.render(), "OK\nstate=READY\n");
        assert_eq!(ok.value("state"), Some("READY"));
        assert_eq!(ok.value("missing"), None);

        let err = IntentResponse::not_found("device 1 not found");
        assert_eq!(err.render(), "ERR_NOT_FOUND: device 1 not found\n");
        assert!(!err.is_ok());
    }

    #[test]
    fn test_from_result() {
        let ok = IntentResponse::from_result(Ok(ResponseWriter::new().with("count", 0)));
        assert_eq!(ok.render(), "OK\ncount=0\n");

        let err = IntentError::new(ErrorKind::Conflict, "pin 4 is owned by device 1");
        assert_eq!(err.to_string(), "ERR_CONFLICT: pin 4 is owned by device 1");
        let response = IntentResponse::from_result(Err(err));
        assert_eq!(response.error, ErrorKind::Conflict);
        assert_eq!(response.render(), "ERR_CONFLICT: pin 4 is owned by device 1\n");
    }

    #[test]
    fn test_request_builder() {
        let req = IntentRequest::new("dev.bind")
            .with_arg("gpio.dout")
            .with_arg("gpio.dout.2");
        assert_eq!(req.arg_count(), 2);
        assert_eq!(req.arg(1), Some("gpio.dout.2"));
        assert_eq!(req.arg(2), None);
    }
}
