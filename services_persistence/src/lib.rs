//! # Persistence
//!
//! Saves and restores the kernel's device configuration.
//!
//! ## Philosophy
//!
//! - **Backends store bytes**: a [`PersistenceBackend`] knows nothing about
//!   devices; it stores, fetches and clears one blob
//! - **Documents are versioned**: [`ConfigDocument::CURRENT_VERSION`] is
//!   checked on load, separately from the checksum
//! - **Corruption is detected, not guessed around**: the stored envelope
//!   carries a SHA-256 of the payload
//!
//! ## Core Concepts
//!
//! - [`ConfigDocument`]: endpoints and device records
//! - [`serialize_document`] / [`deserialize_document`]: checksummed JSON
//! - [`export_text`] / [`parse_text`]: `key=value` form used by
//!   `config.export` and `config.import`
//! - [`MemoryBackend`], [`FileBackend`]

pub mod document;
pub mod text;

pub use document::{
    checksum, deserialize_document, serialize_document, ConfigDocument, DeviceRecord,
    StoredDocument,
};
pub use text::{export_text, parse_text};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Errors that can occur during persistence operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    #[error("failed to serialize config: {0}")]
    SerializationFailed(String),

    #[error("failed to deserialize config: {0}")]
    DeserializationFailed(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(u32),

    #[error("checksum mismatch (expected {expected}, found {actual})")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("storage: {0}")]
    Storage(String),
}

impl From<io::Error> for PersistenceError {
    fn from(err: io::Error) -> Self {
        PersistenceError::Storage(err.to_string())
    }
}

/// Byte store for one configuration blob
pub trait PersistenceBackend {
    /// Replaces the stored blob
    fn store(&mut self, bytes: &[u8]) -> PersistenceResult<()>;

    /// Returns the stored blob, or `None` if nothing was stored
    fn fetch(&self) -> PersistenceResult<Option<Vec<u8>>>;

    /// Removes the stored blob
    fn clear(&mut self) -> PersistenceResult<()>;

    /// Short description for diagnostics, e.g. `memory`
    fn describe(&self) -> String;
}

/// In-memory backend
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    blob: Option<Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceBackend for MemoryBackend {
    fn store(&mut self, bytes: &[u8]) -> PersistenceResult<()> {
        self.blob = Some(bytes.to_vec());
        Ok(())
    }

    fn fetch(&self) -> PersistenceResult<Option<Vec<u8>>> {
        Ok(self.blob.clone())
    }

    fn clear(&mut self) -> PersistenceResult<()> {
        self.blob = None;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Single-file backend
///
/// Writes go to a sibling temporary file that is renamed over the target,
/// so a crash mid-write leaves the previous blob intact.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl PersistenceBackend for FileBackend {
    fn store(&mut self, bytes: &[u8]) -> PersistenceResult<()> {
        let temp = self.temp_path();
        fs::write(&temp, bytes)?;
        fs::rename(&temp, &self.path)?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "config stored");
        Ok(())
    }

    fn fetch(&self) -> PersistenceResult<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn clear(&mut self) -> PersistenceResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}
