//! Capability schema
//!
//! A driver describes itself with three lists: settings it accepts through
//! `param.set`, signals it reports through `dev.read`, and commands. A
//! command is a write-only setting: setting it performs an action and
//! `param.get` on it is not meaningful.

use serde::Serialize;
use std::fmt;

/// Value domain of a setting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ValueKind {
    Bool,
    Int { min: i64, max: i64 },
    Choice(&'static [&'static str]),
    Text,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Bool => f.write_str("bool"),
            ValueKind::Int { min, max } => write!(f, "int[{}..{}]", min, max),
            ValueKind::Choice(options) => write!(f, "enum[{}]", options.join("|")),
            ValueKind::Text => f.write_str("text"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingSpec {
    pub name: &'static str,
    pub kind: ValueKind,
    pub default: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalSpec {
    pub name: &'static str,
    /// Unit suffix, empty when dimensionless
    pub unit: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
}

/// Settings, signals and commands of a driver
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapabilitySchema {
    pub settings: Vec<SettingSpec>,
    pub signals: Vec<SignalSpec>,
    pub commands: Vec<CommandSpec>,
}

impl CapabilitySchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_setting(
        mut self,
        name: &'static str,
        kind: ValueKind,
        default: &'static str,
        description: &'static str,
    ) -> Self {
        self.settings.push(SettingSpec {
            name,
            kind,
            default,
            description,
        });
        self
    }

    pub fn with_signal(mut self, name: &'static str, unit: &'static str) -> Self {
        self.signals.push(SignalSpec { name, unit });
        self
    }

    pub fn with_command(mut self, name: &'static str, description: &'static str) -> Self {
        self.commands.push(CommandSpec { name, description });
        self
    }

    pub fn setting(&self, name: &str) -> Option<&SettingSpec> {
        self.settings.iter().find(|s| s.name == name)
    }

    pub fn is_command(&self, name: &str) -> bool {
        self.commands.iter().any(|c| c.name == name)
    }

    /// Names of persistable settings, in schema order
    pub fn setting_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.settings.iter().map(|s| s.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_builder() {
        let schema = CapabilitySchema::new()
            .with_setting("state", ValueKind::Bool, "0", "output level")
            .with_setting("rate", ValueKind::Int { min: 1, max: 10 }, "1", "poll rate")
            .with_signal("level", "")
            .with_command("toggle", "invert the output");

        assert_eq!(schema.setting("rate").map(|s| s.default), Some("1"));
        assert!(schema.setting("toggle").is_none());
        assert!(schema.is_command("toggle"));
        assert_eq!(schema.setting_names().collect::<Vec<_>>(), vec!["state", "rate"]);
    }

    #[test]
    fn test_value_kind_display() {
        assert_eq!(ValueKind::Int { min: 0, max: 3 }.to_string(), "int[0..3]");
        assert_eq!(ValueKind::Choice(&["none", "up"]).to_string(), "enum[none|up]");
    }
}
