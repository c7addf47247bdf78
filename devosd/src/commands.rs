//! # Host Command Lines
//!
//! Maps operator lines onto intents.
//!
//! ## Command Set
//!
//! - Any opcode (`sys.info`, `dev.bind gpio.dout gpio.dout.2`, `help`) is
//!   passed through verbatim
//! - `bind <driver> <endpoint|pin>` - a bare pin number becomes
//!   `<driver>.<pin>` for GPIO drivers
//! - `unbind`, `enable`, `disable`, `status`, `read`, `stream`, `schema <id>`
//! - `list` - active devices
//! - `param get <id> <name>` / `param set <id> <name> <value>`
//! - `ep list` / `ep probe <bus>` / `ep register <addr>` / `ep unregister <addr>`
//! - `reg list <id>` / `reg read <id> <reg>` / `reg write <id> <reg> <value>`
//! - `save`, `load`, `reset`
//! - `wait <ticks>` - let the kernel tick without input
//! - `quit` - stop the host
//!
//! Double-quoted tokens keep their spaces.

use intent_router::{IntentRequest, MAX_INTENT_ARGS};
use thiserror::Error;

/// Host command error types
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostCommandError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Missing argument: {0}")]
    MissingArgument(String),

    #[error("Unterminated quote")]
    UnterminatedQuote,

    #[error("Too many arguments ({0} > {max})", max = MAX_INTENT_ARGS)]
    TooManyArguments(usize),
}

/// Host commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    /// Dispatch an intent to the kernel
    Intent(IntentRequest),

    /// Run `ticks` scheduler ticks without dispatching
    Wait { ticks: u64 },

    /// Quit the host
    Quit,
}

/// True for lines the host skips: blank lines and `#` comments
pub fn is_ignorable(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.starts_with('#')
}

/// Host command parser
pub struct HostCommandParser;

impl HostCommandParser {
    /// Parses a command line
    pub fn parse(input: &str) -> Result<HostCommand, HostCommandError> {
        let tokens = Self::tokenize(input)?;
        let (first, rest) = tokens
            .split_first()
            .ok_or_else(|| HostCommandError::InvalidCommand("Empty command".to_string()))?;

        match first.to_lowercase().as_str() {
            "quit" | "exit" => Ok(HostCommand::Quit),
            "wait" => Self::parse_wait(rest),
            "bind" => Self::intent("dev.bind", Self::bind_args(rest)),
            "unbind" => Self::device_intent("dev.unbind", rest),
            "enable" => Self::device_intent("dev.enable", rest),
            "disable" => Self::device_intent("dev.disable", rest),
            "status" => Self::device_intent("dev.status", rest),
            "read" => Self::device_intent("dev.read", rest),
            "stream" => Self::device_intent("dev.stream", rest),
            "schema" => Self::device_intent("schema.get", rest),
            "list" => Self::intent("dev.list", rest.to_vec()),
            "param" => Self::parse_family("param", &["get", "set"], rest),
            "ep" => Self::parse_family("ep", &["list", "probe", "register", "unregister"], rest),
            "reg" => Self::parse_family("reg", &["list", "read", "write"], rest),
            "save" => Self::intent("persist.save", rest.to_vec()),
            "load" => Self::intent("persist.load", rest.to_vec()),
            "reset" => Self::intent("factory_reset", rest.to_vec()),
            _ => Self::intent(first, rest.to_vec()),
        }
    }

    /// Splits a line on whitespace, keeping double-quoted runs together
    fn tokenize(input: &str) -> Result<Vec<String>, HostCommandError> {
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut in_token = false;
        let mut quoted = false;

        for c in input.chars() {
            match c {
                '"' => {
                    quoted = !quoted;
                    in_token = true;
                }
                c if c.is_whitespace() && !quoted => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                c => {
                    current.push(c);
                    in_token = true;
                }
            }
        }

        if quoted {
            return Err(HostCommandError::UnterminatedQuote);
        }
        if in_token {
            tokens.push(current);
        }
        Ok(tokens)
    }

    fn intent(opcode: &str, args: Vec<String>) -> Result<HostCommand, HostCommandError> {
        if args.len() > MAX_INTENT_ARGS {
            return Err(HostCommandError::TooManyArguments(args.len()));
        }
        let request = args
            .into_iter()
            .fold(IntentRequest::new(opcode), |request, arg| request.with_arg(arg));
        Ok(HostCommand::Intent(request))
    }

    /// Device shorthands take the device id first
    fn device_intent(opcode: &str, args: &[String]) -> Result<HostCommand, HostCommandError> {
        if args.is_empty() {
            return Err(HostCommandError::MissingArgument("device id".to_string()));
        }
        Self::intent(opcode, args.to_vec())
    }

    /// Expands `bind gpio.dout 2` to `dev.bind gpio.dout gpio.dout.2`
    fn bind_args(args: &[String]) -> Vec<String> {
        let mut args = args.to_vec();
        if let [driver, target, ..] = args.as_mut_slice() {
            let bare_pin = !target.is_empty() && target.chars().all(|c| c.is_ascii_digit());
            if bare_pin && driver.starts_with("gpio.") {
                *target = format!("{}.{}", driver, target);
            }
        }
        args
    }

    /// `<family> <sub> ...` becomes `<family>.<sub> ...`
    fn parse_family(
        family: &str,
        subcommands: &[&str],
        args: &[String],
    ) -> Result<HostCommand, HostCommandError> {
        let (sub, rest) = args
            .split_first()
            .ok_or_else(|| HostCommandError::MissingArgument(subcommands.join(" | ")))?;
        let sub = sub.to_lowercase();
        if !subcommands.contains(&sub.as_str()) {
            return Err(HostCommandError::InvalidCommand(format!(
                "Unknown {} command: {}",
                family, sub
            )));
        }
        Self::intent(&format!("{}.{}", family, sub), rest.to_vec())
    }

    fn parse_wait(args: &[String]) -> Result<HostCommand, HostCommandError> {
        let text = args
            .first()
            .ok_or_else(|| HostCommandError::MissingArgument("tick count".to_string()))?;
        let ticks = text.parse().map_err(|_| {
            HostCommandError::InvalidCommand(format!("Invalid tick count: {}", text))
        })?;
        Ok(HostCommand::Wait { ticks })
    }
}
