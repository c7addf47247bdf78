//! # Device OS Host Runtime
//!
//! This crate runs the device kernel on the simulated board and feeds it
//! operator command lines.
//!
//! ## Philosophy
//!
//! - **Host owns I/O**: the kernel never prints; responses are collected
//!   and written out by the host
//! - **Sequential**: one command line, then one tick, never interleaved
//! - **Deterministic mode is first-class**: scripts and a simulated clock
//!   make every run reproducible
//!
//! ## Responsibilities
//!
//! The host runtime:
//! - Boots the kernel, restoring a file-backed store if one is configured
//! - Translates shorthand commands (`bind gpio.dout 2`) into intents
//! - Drives the tick loop and advances simulated time
//! - Flushes pending configuration on exit

pub mod commands;
pub mod runtime;

pub use commands::{is_ignorable, HostCommand, HostCommandError, HostCommandParser};
pub use runtime::{HostRuntime, HostRuntimeConfig, HostRuntimeError};
