//! # Host Runtime
//!
//! The main loop: one command line, then one kernel tick.

use crate::commands::{is_ignorable, HostCommand, HostCommandParser};
use device_kernel::{Kernel, KernelConfig, KernelError};
use hal::{Platform, SimPlatform};
use intent_router::IntentResponse;
use services_persistence::FileBackend;
use std::collections::VecDeque;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

/// Host runtime error types
#[derive(Debug, Error)]
pub enum HostRuntimeError {
    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),
}

/// Host runtime configuration
#[derive(Debug, Clone)]
pub struct HostRuntimeConfig {
    /// Command lines to run, one per tick
    pub script: Option<String>,
    /// Maximum ticks to run (0 = unlimited)
    pub max_ticks: u64,
    /// Simulated milliseconds per tick
    pub tick_ms: u32,
    /// Kernel capacities and service intervals
    pub kernel: KernelConfig,
    /// File used as the persistence store
    pub store: Option<PathBuf>,
    /// Prefix each response with the line that produced it
    pub echo: bool,
}

impl Default for HostRuntimeConfig {
    fn default() -> Self {
        Self {
            script: None,
            max_ticks: 0,
            tick_ms: 10,
            kernel: KernelConfig::default(),
            store: None,
            echo: false,
        }
    }
}

/// Host runtime state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostState {
    Running,
    /// `quit` seen; no further ticks
    Quitting,
    /// Kernel services stopped
    Stopped,
}

/// Host runtime
pub struct HostRuntime {
    config: HostRuntimeConfig,
    kernel: Kernel,
    /// Lines waiting for dispatch
    pending: VecDeque<String>,
    /// Ticks left from a `wait`
    idle_ticks: u64,
    /// Rendered responses not yet collected
    output: Vec<String>,
    state: HostState,
}

impl HostRuntime {
    /// Creates a runtime on the default simulated board
    pub fn new(config: HostRuntimeConfig) -> Result<Self, HostRuntimeError> {
        Self::with_platform(config, Box::new(SimPlatform::new()))
    }

    /// Creates a runtime on `platform` and boots the kernel
    ///
    /// A configured store is restored during boot.
    pub fn with_platform(
        config: HostRuntimeConfig,
        platform: Box<dyn Platform>,
    ) -> Result<Self, HostRuntimeError> {
        let mut kernel = Kernel::new(config.kernel.clone(), platform)?;
        if let Some(path) = &config.store {
            kernel = kernel.with_backend(Box::new(FileBackend::new(path)));
        }
        let report = kernel.boot()?;
        info!(
            restored = report.restored,
            failed = report.failed,
            "host runtime ready"
        );

        let mut runtime = Self {
            config,
            kernel,
            pending: VecDeque::new(),
            idle_ticks: 0,
            output: Vec::new(),
            state: HostState::Running,
        };
        if let Some(script) = runtime.config.script.take() {
            for line in script.lines() {
                runtime.submit(line);
            }
        }
        Ok(runtime)
    }

    /// Queues one command line; blank lines and comments are dropped
    pub fn submit(&mut self, line: &str) {
        if !is_ignorable(line) {
            self.pending.push_back(line.trim().to_string());
        }
    }

    /// Runs until `quit`, the end of the queued lines or `max_ticks`
    pub fn run(&mut self) {
        loop {
            if self.state != HostState::Running {
                break;
            }
            if self.config.max_ticks > 0 && self.tick_count() >= self.config.max_ticks {
                break;
            }
            if self.pending.is_empty() && self.idle_ticks == 0 {
                break;
            }
            self.step();
        }
        self.shutdown();
    }

    /// Executes one step of the loop
    ///
    /// Dispatches at most one queued line, then runs one kernel tick. The
    /// two never interleave.
    pub fn step(&mut self) {
        if self.state != HostState::Running {
            return;
        }

        if self.idle_ticks > 0 {
            self.idle_ticks -= 1;
        } else if let Some(line) = self.pending.pop_front() {
            self.execute_line(&line);
        }

        if self.state == HostState::Running {
            self.kernel.tick();
            self.kernel.state_mut().platform.delay_ms(self.config.tick_ms);
        }
    }

    fn execute_line(&mut self, line: &str) {
        match HostCommandParser::parse(line) {
            Ok(HostCommand::Intent(request)) => {
                let response = self.kernel.dispatch(&request);
                self.emit(line, &response);
            }
            // This step's own tick counts toward the wait
            Ok(HostCommand::Wait { ticks }) => self.idle_ticks = ticks.saturating_sub(1),
            Ok(HostCommand::Quit) => {
                info!("quit requested");
                self.state = HostState::Quitting;
            }
            Err(err) => self.emit(line, &IntentResponse::bad_args(err.to_string())),
        }
    }

    fn emit(&mut self, line: &str, response: &IntentResponse) {
        debug!(line, result = %response.error, "command handled");
        let rendered = response.render();
        if self.config.echo {
            self.output.push(format!("> {}\n{}", line, rendered));
        } else {
            self.output.push(rendered);
        }
    }

    /// Stops the kernel services, flushing a pending save
    pub fn shutdown(&mut self) {
        if self.state != HostState::Stopped {
            self.kernel.shutdown();
            self.state = HostState::Stopped;
        }
    }

    /// Takes the rendered responses produced so far
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// False once `quit` was seen or the runtime was shut down
    pub fn is_running(&self) -> bool {
        self.state == HostState::Running
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn tick_count(&self) -> u64 {
        self.kernel.tick_count()
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn kernel_mut(&mut self) -> &mut Kernel {
        &mut self.kernel
    }
}
