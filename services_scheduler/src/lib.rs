//! # Service Manager
//!
//! A deterministic, cooperative scheduler for periodic system services.
//!
//! ## Philosophy
//!
//! - **Deterministic**: cadence is measured in ticks, never wall-clock time
//! - **Cooperative**: a service's `tick` runs to completion before the next
//! - **Explicit**: state only changes through start/stop/pause/resume; the
//!   one exception is a failed `init`, which leaves the service in FAULT
//! - **Context-generic**: services receive `&mut C`, the kernel's owned
//!   state, on every lifecycle call
//!
//! ## Scheduling rule
//!
//! Every call to [`ServiceManager::tick`] increments the tick counter, then
//! runs each RUNNING service whose `tick_count % interval == 0`, in
//! registration order. A service with interval `N` therefore runs exactly
//! `k` times over `k * N` ticks.
//!
//! ## Example
//!
//! ```ignore
//! let mut services = ServiceManager::new(8);
//! services.register(Box::new(Heartbeat::default()), 10)?;
//! services.start("heartbeat", &mut ctx)?;
//! for _ in 0..100 {
//!     services.tick(&mut ctx);
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default number of services
pub const DEFAULT_MAX_SERVICES: usize = 8;

/// Service lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceState {
    /// Registered but not running
    Stopped,
    /// Ticked on its interval
    Running,
    /// Skipped by the scheduler; no lifecycle hooks were called
    Paused,
    /// `init` failed during start
    Fault,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Stopped => "STOPPED",
            ServiceState::Running => "RUNNING",
            ServiceState::Paused => "PAUSED",
            ServiceState::Fault => "FAULT",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service manager errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("service '{0}' is already registered")]
    Duplicate(String),

    #[error("service '{0}' needs a tick interval of at least 1")]
    ZeroInterval(String),

    #[error("service table is full ({0} services)")]
    TableFull(usize),

    #[error("service '{0}' not found")]
    NotFound(String),

    #[error("service '{name}' is {state}")]
    InvalidState { name: String, state: ServiceState },

    #[error("service '{name}' failed to start: {reason}")]
    InitFailed { name: String, reason: String },
}

/// A periodic system service
pub trait SystemService<C> {
    /// Unique service name
    fn name(&self) -> &str;

    /// Called on start; an error moves the service to FAULT
    fn init(&mut self, _ctx: &mut C) -> Result<(), ServiceError> {
        Ok(())
    }

    /// Called every `interval` ticks while RUNNING
    fn tick(&mut self, ctx: &mut C);

    /// Called on every stop
    fn shutdown(&mut self, _ctx: &mut C) {}
}

/// Snapshot of one registered service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub state: ServiceState,
    /// Ticks between runs
    pub interval: u64,
    /// Number of times `tick` was invoked
    pub runs: u64,
}

struct ServiceEntry<C> {
    name: String,
    service: Box<dyn SystemService<C>>,
    state: ServiceState,
    interval: u64,
    runs: u64,
}

/// Tick scheduler
pub struct ServiceManager<C> {
    entries: Vec<ServiceEntry<C>>,
    capacity: usize,
    tick_count: u64,
}

impl<C> ServiceManager<C> {
    /// Creates a manager holding at most `capacity` services
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            tick_count: 0,
        }
    }

    /// Registers a service in STOPPED state
    pub fn register(
        &mut self,
        service: Box<dyn SystemService<C>>,
        interval: u64,
    ) -> Result<(), ServiceError> {
        let name = service.name().to_string();
        if self.entries.iter().any(|e| e.name == name) {
            return Err(ServiceError::Duplicate(name));
        }
        if interval == 0 {
            return Err(ServiceError::ZeroInterval(name));
        }
        if self.entries.len() >= self.capacity {
            return Err(ServiceError::TableFull(self.capacity));
        }
        debug!(service = %name, interval, "service registered");
        self.entries.push(ServiceEntry {
            name,
            service,
            state: ServiceState::Stopped,
            interval,
            runs: 0,
        });
        Ok(())
    }

    fn entry_mut(&mut self, name: &str) -> Result<&mut ServiceEntry<C>, ServiceError> {
        self.entries
            .iter_mut()
            .find(|e| e.name == name)
            .ok_or_else(|| ServiceError::NotFound(name.to_string()))
    }

    /// STOPPED -> RUNNING, or FAULT if `init` fails
    pub fn start(&mut self, name: &str, ctx: &mut C) -> Result<(), ServiceError> {
        let entry = self.entry_mut(name)?;
        if entry.state != ServiceState::Stopped {
            return Err(ServiceError::InvalidState {
                name: name.to_string(),
                state: entry.state,
            });
        }
        match entry.service.init(ctx) {
            Ok(()) => {
                entry.state = ServiceState::Running;
                info!(service = name, "service started");
                Ok(())
            }
            Err(err) => {
                entry.state = ServiceState::Fault;
                warn!(service = name, %err, "service init failed");
                Err(ServiceError::InitFailed {
                    name: name.to_string(),
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Calls `shutdown` and moves to STOPPED, whatever the current state
    pub fn stop(&mut self, name: &str, ctx: &mut C) -> Result<(), ServiceError> {
        let entry = self.entry_mut(name)?;
        entry.service.shutdown(ctx);
        entry.state = ServiceState::Stopped;
        info!(service = name, "service stopped");
        Ok(())
    }

    /// RUNNING -> PAUSED
    pub fn pause(&mut self, name: &str) -> Result<(), ServiceError> {
        self.transition(name, ServiceState::Running, ServiceState::Paused)
    }

    /// PAUSED -> RUNNING
    pub fn resume(&mut self, name: &str) -> Result<(), ServiceError> {
        self.transition(name, ServiceState::Paused, ServiceState::Running)
    }

    fn transition(
        &mut self,
        name: &str,
        from: ServiceState,
        to: ServiceState,
    ) -> Result<(), ServiceError> {
        let entry = self.entry_mut(name)?;
        if entry.state != from {
            return Err(ServiceError::InvalidState {
                name: name.to_string(),
                state: entry.state,
            });
        }
        entry.state = to;
        debug!(service = name, %to, "service state changed");
        Ok(())
    }

    /// Starts every STOPPED service in registration order
    ///
    /// Returns the failures; the remaining services are still started.
    pub fn start_all(&mut self, ctx: &mut C) -> Vec<ServiceError> {
        let names: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.state == ServiceState::Stopped)
            .map(|e| e.name.clone())
            .collect();
        names
            .iter()
            .filter_map(|name| self.start(name, ctx).err())
            .collect()
    }

    /// Stops every service that is not STOPPED, in reverse registration order
    pub fn stop_all(&mut self, ctx: &mut C) {
        for entry in self.entries.iter_mut().rev() {
            if entry.state != ServiceState::Stopped {
                entry.service.shutdown(ctx);
                entry.state = ServiceState::Stopped;
                debug!(service = %entry.name, "service stopped");
            }
        }
    }

    /// Advances the tick counter and runs every due service
    ///
    /// Returns the number of services run.
    pub fn tick(&mut self, ctx: &mut C) -> usize {
        self.tick_count += 1;
        let now = self.tick_count;
        let mut ran = 0;
        for entry in self.entries.iter_mut() {
            if entry.state == ServiceState::Running && now % entry.interval == 0 {
                entry.service.tick(ctx);
                entry.runs += 1;
                ran += 1;
            }
        }
        ran
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn state(&self, name: &str) -> Option<ServiceState> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.state)
    }

    pub fn info(&self, name: &str) -> Option<ServiceInfo> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(Self::snapshot)
    }

    /// Services in registration order
    pub fn list(&self) -> Vec<ServiceInfo> {
        self.entries.iter().map(Self::snapshot).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn snapshot(entry: &ServiceEntry<C>) -> ServiceInfo {
        ServiceInfo {
            name: entry.name.clone(),
            state: entry.state,
            interval: entry.interval,
            runs: entry.runs,
        }
    }
}

impl<C> Default for ServiceManager<C> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SERVICES)
    }
}
