//! # Core Types
//!
//! Identifiers shared by every crate of the device kernel.
//!
//! ## Philosophy
//!
//! - **Explicit over implicit**: devices, resource owners and boot sessions
//!   each have their own identifier type and cannot be confused.
//! - **Handles, not pointers**: registries hand out small integer handles
//!   that stay valid across slot reuse.
//!
//! ## Key Types
//!
//! - [`DeviceId`]: monotonic identifier of a bound device
//! - [`OwnerId`]: opaque owner of a physical resource claim
//! - [`SessionId`]: random identifier of one kernel boot

pub mod ids;

pub use ids::{DeviceId, OwnerId, SessionId};
