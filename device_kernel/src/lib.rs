//! # Device Kernel
//!
//! This crate assembles the registries and services of one board into a
//! single kernel object driven by intents.
//!
//! ## Philosophy
//!
//! **One owner, one loop.**
//!
//! There are no threads and no interrupts here. The host calls
//! [`Kernel::tick`] at a fixed rate and hands it intents between ticks.
//! Every piece of state lives in [`KernelState`], which the services and the
//! intent handlers borrow mutably one at a time.
//!
//! ## Core Concepts
//!
//! - **KernelState**: platform, resource table, endpoints, devices, log and
//!   the optional persistence backend
//! - **Services**: device updates, health, telemetry and persistence flushes,
//!   each on its own tick interval
//! - **Intents**: the v1 opcode table (`sys.info`, `dev.bind`, `param.set`,
//!   `persist.save`, ...). Handler failures come back as error responses,
//!   never as panics
//!
//! ## Example
//!
//! ```
//! use device_kernel::{Kernel, KernelConfig};
//! use hal::SimPlatform;
//! use intent_router::IntentRequest;
//!
//! let mut kernel = Kernel::new(KernelConfig::default(), Box::new(SimPlatform::new())).unwrap();
//! kernel.boot().unwrap();
//!
//! let response = kernel.dispatch(
//!     &IntentRequest::new("dev.bind").with_arg("gpio.dout").with_arg("gpio.dout.2"),
//! );
//! assert_eq!(response.value("device_id"), Some("1"));
//! kernel.tick();
//! ```

pub mod config;
pub mod error;
mod handlers;
pub mod kernel;
pub mod services;
pub mod state;

pub use config::{ConfigError, KernelConfig};
pub use error::KernelError;
pub use kernel::{Kernel, DEVICE_UPDATE_INTERVAL};
pub use services::{DEVICES_SERVICE, HEALTH_SERVICE, PERSIST_SERVICE, TELEMETRY_SERVICE};
pub use state::{KernelState, LoadReport, Telemetry};
