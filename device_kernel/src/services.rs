//! Built-in system services
//!
//! Registered by the kernel in this order, so within one tick devices are
//! updated before health and telemetry observe them and before a pending
//! save is flushed.

use crate::state::KernelState;
use services_logger::{LogEntry, LogLevel};
use services_scheduler::SystemService;
use tracing::warn;

pub const DEVICES_SERVICE: &str = "devices";
pub const HEALTH_SERVICE: &str = "health";
pub const TELEMETRY_SERVICE: &str = "telemetry";
pub const PERSIST_SERVICE: &str = "persist";

/// Runs `update` on every READY device
pub struct DeviceUpdateService;

impl SystemService<KernelState> for DeviceUpdateService {
    fn name(&self) -> &str {
        DEVICES_SERVICE
    }

    fn tick(&mut self, ctx: &mut KernelState) {
        let updated = ctx.devices.update_all(ctx.platform.as_mut());
        ctx.telemetry.device_updates += updated as u64;
    }
}

/// Periodic heap and device-count report
pub struct HealthService;

impl HealthService {
    /// Free heap below this percentage of total is reported as a warning
    const LOW_HEAP_PERCENT: u64 = 10;
}

impl SystemService<KernelState> for HealthService {
    fn name(&self) -> &str {
        HEALTH_SERVICE
    }

    fn tick(&mut self, ctx: &mut KernelState) {
        let heap = ctx.platform.heap_stats();
        let claims = ctx.resources.borrow().claim_count();
        let devices = ctx.devices.count();
        let low = u64::from(heap.free) * 100 < u64::from(heap.total) * Self::LOW_HEAP_PERCENT;
        let level = if low { LogLevel::Warn } else { LogLevel::Info };
        ctx.record_entry(
            LogEntry::new(level, if low { "heap low" } else { "health" })
                .with_source(HEALTH_SERVICE)
                .with_field("heap_free", heap.free)
                .with_field("heap_min_free", heap.min_free)
                .with_field("devices", devices)
                .with_field("claims", claims),
        );
    }
}

/// Samples counters and gauges into [`crate::state::Telemetry`]
pub struct TelemetryService;

impl SystemService<KernelState> for TelemetryService {
    fn name(&self) -> &str {
        TELEMETRY_SERVICE
    }

    fn tick(&mut self, ctx: &mut KernelState) {
        let io_failures: u64 = ctx
            .devices
            .list()
            .iter()
            .map(|d| u64::from(d.io_failures))
            .sum();
        ctx.telemetry.samples += 1;
        ctx.telemetry.heap_free = ctx.platform.heap_stats().free;
        ctx.telemetry.io_failures = io_failures;
    }
}

/// Flushes a requested save on its tick and on shutdown
pub struct PersistService;

impl PersistService {
    fn flush(ctx: &mut KernelState) {
        if !ctx.save_requested {
            return;
        }
        if ctx.backend.is_none() {
            ctx.save_requested = false;
            return;
        }
        // The request stays set on failure, so the next tick retries.
        if let Err(err) = ctx.save_all() {
            warn!(%err, "deferred save failed");
            ctx.record(LogLevel::Error, PERSIST_SERVICE, format!("save failed: {}", err));
        }
    }
}

impl SystemService<KernelState> for PersistService {
    fn name(&self) -> &str {
        PERSIST_SERVICE
    }

    fn tick(&mut self, ctx: &mut KernelState) {
        Self::flush(ctx);
    }

    fn shutdown(&mut self, ctx: &mut KernelState) {
        Self::flush(ctx);
    }
}
