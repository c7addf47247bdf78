//! # Logger Service
//!
//! This crate implements the kernel's operator-visible log.
//!
//! ## Philosophy
//!
//! Logging is explicit and structured, not text-based or printf-style.
//! Entries carry a level, a message and key/value fields; they are kept in a
//! bounded ring for `log.tail` and mirrored to `tracing` as they are pushed.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Default number of retained entries
pub const DEFAULT_LOG_CAPACITY: usize = 128;

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational messages
    Info,
    /// Warnings
    Warn,
    /// Errors
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Log level
    pub level: LogLevel,
    /// Milliseconds since boot
    pub timestamp_ms: u64,
    /// Emitting component, e.g. `devices`
    pub source: Option<String>,
    /// Log message
    pub message: String,
    /// Structured fields
    pub fields: Vec<(String, String)>,
}

impl LogEntry {
    /// Creates a new log entry
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            timestamp_ms: 0,
            source: None,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Sets the emitting component
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Sets the timestamp
    pub fn at(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    /// Adds a field to the log entry
    pub fn with_field(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }

    fn mirror(&self) {
        let source = self.source.as_deref().unwrap_or("kernel");
        let fields = self.render_fields();
        match self.level {
            LogLevel::Debug => tracing::debug!(source, %fields, "{}", self.message),
            LogLevel::Info => tracing::info!(source, %fields, "{}", self.message),
            LogLevel::Warn => tracing::warn!(source, %fields, "{}", self.message),
            LogLevel::Error => tracing::error!(source, %fields, "{}", self.message),
        }
    }

    fn render_fields(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for LogEntry {
    /// `[   1500] INFO  devices: device bound id=1`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>7}] {:<5} ", self.timestamp_ms, self.level.as_str())?;
        if let Some(source) = &self.source {
            write!(f, "{}: ", source)?;
        }
        f.write_str(&self.message)?;
        if !self.fields.is_empty() {
            write!(f, " {}", self.render_fields())?;
        }
        Ok(())
    }
}

/// Bounded log ring; the oldest entry is evicted when full
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    dropped: u64,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Appends an entry and mirrors it to `tracing`
    pub fn push(&mut self, entry: LogEntry) {
        entry.mirror();
        if self.capacity == 0 {
            self.dropped += 1;
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.dropped += 1;
        }
        self.entries.push_back(entry);
    }

    /// Convenience for `push(LogEntry::new(..).with_source(..).at(..))`
    pub fn record(
        &mut self,
        level: LogLevel,
        source: &str,
        timestamp_ms: u64,
        message: impl Into<String>,
    ) {
        self.push(LogEntry::new(level, message).with_source(source).at(timestamp_ms));
    }

    /// Last `n` entries, oldest first
    pub fn tail(&self, n: usize) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().skip(self.entries.len().saturating_sub(n))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries evicted since creation
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}
