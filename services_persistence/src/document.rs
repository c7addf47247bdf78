//! Versioned configuration document
//!
//! The stored form wraps the document's JSON in an envelope carrying a
//! SHA-256 checksum, so a truncated or edited store is detected on load.

use crate::{PersistenceError, PersistenceResult};
use core_types::SessionId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// One bound device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub driver: String,
    pub endpoint: String,
    pub enabled: bool,
    /// Parameter values (stable ordering via BTreeMap)
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl DeviceRecord {
    pub fn new(driver: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            endpoint: endpoint.into(),
            enabled: true,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Saved kernel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    /// Version of the document format (for future migrations)
    pub version: u32,
    /// Session that wrote the document
    #[serde(default)]
    pub session: Option<SessionId>,
    /// Explicitly registered endpoint addresses
    #[serde(default)]
    pub endpoints: Vec<String>,
    /// Devices in slot order
    #[serde(default)]
    pub devices: Vec<DeviceRecord>,
}

impl ConfigDocument {
    /// Current version of the document format
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            session: None,
            endpoints: Vec::new(),
            devices: Vec::new(),
        }
    }

    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_endpoint(mut self, address: impl Into<String>) -> Self {
        self.endpoints.push(address.into());
        self
    }

    pub fn with_device(mut self, device: DeviceRecord) -> Self {
        self.devices.push(device);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty() && self.devices.is_empty()
    }
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// Envelope written to the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub format: u32,
    /// Lowercase hex SHA-256 of `payload`
    pub checksum: String,
    /// JSON of the [`ConfigDocument`]
    pub payload: String,
}

impl StoredDocument {
    pub const FORMAT: u32 = 1;
}

/// Lowercase hex SHA-256
pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Serializes a document into its checksummed stored form
pub fn serialize_document(document: &ConfigDocument) -> PersistenceResult<Vec<u8>> {
    let payload = serde_json::to_string(document)
        .map_err(|e| PersistenceError::SerializationFailed(e.to_string()))?;
    let stored = StoredDocument {
        format: StoredDocument::FORMAT,
        checksum: checksum(payload.as_bytes()),
        payload,
    };
    serde_json::to_vec_pretty(&stored)
        .map_err(|e| PersistenceError::SerializationFailed(e.to_string()))
}

/// Deserializes and verifies a stored document
pub fn deserialize_document(bytes: &[u8]) -> PersistenceResult<ConfigDocument> {
    let stored: StoredDocument = serde_json::from_slice(bytes)
        .map_err(|e| PersistenceError::DeserializationFailed(e.to_string()))?;
    if stored.format != StoredDocument::FORMAT {
        return Err(PersistenceError::UnsupportedVersion(stored.format));
    }

    let actual = checksum(stored.payload.as_bytes());
    if actual != stored.checksum {
        return Err(PersistenceError::ChecksumMismatch {
            expected: stored.checksum,
            actual,
        });
    }

    let document: ConfigDocument = serde_json::from_str(&stored.payload)
        .map_err(|e| PersistenceError::DeserializationFailed(e.to_string()))?;

    // Check version compatibility
    if document.version != ConfigDocument::CURRENT_VERSION {
        return Err(PersistenceError::UnsupportedVersion(document.version));
    }
    Ok(document)
}
