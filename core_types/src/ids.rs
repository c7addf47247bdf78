//! Unique identifiers for system entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a bound device
///
/// Device ids are allocated from a monotonically increasing counter and are
/// never reused within a session, even after the device is unbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(u32);

impl DeviceId {
    /// The first id handed out in a session
    pub const FIRST: DeviceId = DeviceId(1);

    /// Creates a device id from its raw value
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw value
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// Returns the id that follows this one
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u32>().map(Self)
    }
}

/// Opaque owner of a resource claim
///
/// The kernel reserves [`OwnerId::KERNEL`]; every bind attempt in the device
/// registry receives a fresh owner so a failed bind can never be confused
/// with a live device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerId(u32);

impl OwnerId {
    /// Owner used by the kernel itself
    pub const KERNEL: OwnerId = OwnerId(0);

    /// Creates an owner id from its raw value
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw value
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::KERNEL {
            write!(f, "kernel")
        } else {
            write!(f, "owner:{}", self.0)
        }
    }
}

/// Identifier of one kernel boot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a session ID from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_next_is_increasing() {
        let id = DeviceId::FIRST;
        assert_eq!(id.as_u32(), 1);
        assert!(id.next() > id);
        assert_eq!(id.next().as_u32(), 2);
    }

    #[test]
    fn test_device_id_parse_and_display() {
        let id: DeviceId = " 42 ".parse().unwrap();
        assert_eq!(id, DeviceId::new(42));
        assert_eq!(id.to_string(), "42");
        assert!("abc".parse::<DeviceId>().is_err());
    }

    #[test]
    fn test_device_id_serializes_as_number() {
        let json = serde_json::to_string(&DeviceId::new(3)).unwrap();
        assert_eq!(json, "3");
        let back: DeviceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, DeviceId::new(3));
    }

    #[test]
    fn test_owner_display() {
        assert_eq!(OwnerId::KERNEL.to_string(), "kernel");
        assert_eq!(OwnerId::new(7).to_string(), "owner:7");
    }

    #[test]
    fn test_session_id_creation() {
        let id1 = SessionId::new();
        let id2 = SessionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_session_id_from_uuid() {
        let uuid = Uuid::new_v4();
        let id = SessionId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
    }
}
