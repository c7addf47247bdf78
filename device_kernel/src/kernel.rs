//! The kernel object

use crate::config::KernelConfig;
use crate::error::KernelError;
use crate::handlers;
use crate::services::{DeviceUpdateService, HealthService, PersistService, TelemetryService};
use crate::state::{KernelState, LoadReport};
use hal::Platform;
use intent_router::{IntentRequest, IntentResponse, IntentRouter};
use services_device_manager::DriverCatalog;
use services_logger::{LogEntry, LogLevel};
use services_persistence::PersistenceBackend;
use services_scheduler::ServiceManager;
use tracing::{debug, info, warn};

/// Interval of the device update service, in ticks
pub const DEVICE_UPDATE_INTERVAL: u64 = 1;

/// Registries, services and intent table of one board
pub struct Kernel {
    pub(crate) state: KernelState,
    pub(crate) services: ServiceManager<KernelState>,
    pub(crate) router: IntentRouter<Kernel>,
    booted: bool,
}

impl Kernel {
    /// Creates a kernel with the built-in driver catalog
    pub fn new(config: KernelConfig, platform: Box<dyn Platform>) -> Result<Self, KernelError> {
        Self::with_catalog(config, platform, drivers::builtin_catalog())
    }

    /// Creates a kernel with a custom driver catalog
    pub fn with_catalog(
        config: KernelConfig,
        platform: Box<dyn Platform>,
        catalog: DriverCatalog,
    ) -> Result<Self, KernelError> {
        config.validate()?;

        let mut services = ServiceManager::new(services_scheduler::DEFAULT_MAX_SERVICES);
        services.register(Box::new(DeviceUpdateService), DEVICE_UPDATE_INTERVAL)?;
        services.register(Box::new(HealthService), config.health_interval)?;
        services.register(Box::new(TelemetryService), config.telemetry_interval)?;
        services.register(Box::new(PersistService), config.persist_interval)?;

        let mut router = IntentRouter::new();
        handlers::register_all(&mut router)?;

        Ok(Self {
            state: KernelState::new(config, platform, catalog),
            services,
            router,
            booted: false,
        })
    }

    /// Builder: attaches a persistence backend
    pub fn with_backend(mut self, backend: Box<dyn PersistenceBackend>) -> Self {
        self.state.backend = Some(backend);
        self
    }

    /// Registers bus endpoints, starts services and restores the saved
    /// configuration, if any
    ///
    /// Returns what was restored. Booting twice is a no-op.
    pub fn boot(&mut self) -> Result<LoadReport, KernelError> {
        if self.booted {
            return Ok(LoadReport::default());
        }
        let buses = self.state.endpoints.auto_register_endpoints(self.state.platform.as_ref())?;

        for err in self.services.start_all(&mut self.state) {
            warn!(%err, "service failed to start");
            self.state.record(LogLevel::Error, "kernel", err.to_string());
        }

        let report = match self.state.load_all() {
            Ok(report) => report,
            Err(KernelError::NoBackend | KernelError::NothingStored) => LoadReport::default(),
            Err(err) => {
                warn!(%err, "stored configuration not restored");
                self.state.record(LogLevel::Error, "persist", format!("restore failed: {}", err));
                LoadReport::default()
            }
        };

        self.booted = true;
        let board = self.state.platform.board_name().to_string();
        self.state.record_entry(
            LogEntry::new(LogLevel::Info, "kernel booted")
                .with_source("kernel")
                .with_field("board", &board)
                .with_field("buses", buses)
                .with_field("devices", report.restored),
        );
        info!(board = %board, session = %self.state.session, "kernel booted");
        Ok(report)
    }

    /// Runs one scheduler tick, returning the number of services run
    pub fn tick(&mut self) -> usize {
        self.services.tick(&mut self.state)
    }

    /// Dispatches one intent
    pub fn dispatch(&mut self, request: &IntentRequest) -> IntentResponse {
        self.state.telemetry.intents += 1;
        let result = self
            .router
            .resolve(request)
            .and_then(|handler| handler(self, request));
        if result.is_err() {
            self.state.telemetry.intent_errors += 1;
        }
        let response = IntentResponse::from_result(result);
        debug!(opcode = %request.opcode, result = %response.error, "intent handled");
        response
    }

    /// Stops every service in reverse order, flushing a pending save
    pub fn shutdown(&mut self) {
        self.services.stop_all(&mut self.state);
        info!("kernel stopped");
    }

    pub fn is_booted(&self) -> bool {
        self.booted
    }

    pub fn state(&self) -> &KernelState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut KernelState {
        &mut self.state
    }

    pub fn services(&self) -> &ServiceManager<KernelState> {
        &self.services
    }

    pub fn router(&self) -> &IntentRouter<Kernel> {
        &self.router
    }

    pub fn tick_count(&self) -> u64 {
        self.services.tick_count()
    }
}
