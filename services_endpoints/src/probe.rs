//! I2C bus scanning

use hal::I2cBus;
use std::ops::RangeInclusive;

/// First and last address of a default scan; 0x00-0x07 and 0x78-0x7f are reserved
pub const DEFAULT_PROBE_RANGE: RangeInclusive<u8> = 0x08..=0x77;

/// Lazy scan over an address range
///
/// Each call to `next` issues zero-length transactions until one target
/// acknowledges, so callers that stop early never touch the remaining
/// addresses.
pub struct ProbeScan<'a> {
    bus: &'a mut dyn I2cBus,
    range: RangeInclusive<u8>,
    scanned: u32,
}

impl<'a> ProbeScan<'a> {
    pub fn new(bus: &'a mut dyn I2cBus, range: RangeInclusive<u8>) -> Self {
        Self {
            bus,
            range,
            scanned: 0,
        }
    }

    /// Addresses tried so far
    pub fn scanned(&self) -> u32 {
        self.scanned
    }
}

impl Iterator for ProbeScan<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        for addr in self.range.by_ref() {
            self.scanned += 1;
            if self.bus.probe(addr) {
                return Some(addr);
            }
        }
        None
    }
}

/// Result of probing an endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    /// Endpoint that was probed
    pub endpoint: String,
    /// Number of addresses tried
    pub scanned: u32,
    /// Responding addresses, ascending
    pub found: Vec<u8>,
}

impl ProbeReport {
    pub fn is_empty(&self) -> bool {
        self.found.is_empty()
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        match self.found.len() {
            0 => "No devices found".to_string(),
            1 => "Found 1 device".to_string(),
            n => format!("Found {} devices", n),
        }
    }

    /// Responding addresses formatted as `0x76`
    pub fn addresses(&self) -> impl Iterator<Item = String> + '_ {
        self.found.iter().map(|addr| format!("{:#04x}", addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hal::{Platform, SimPlatform};

    #[test]
    fn test_scan_is_lazy() {
        let mut sim = SimPlatform::new();
        sim.add_i2c_target(0, 0x10);
        sim.add_i2c_target(0, 0x50);

        let bus = sim.i2c(0).unwrap();
        let mut scan = ProbeScan::new(bus, DEFAULT_PROBE_RANGE);
        assert_eq!(scan.next(), Some(0x10));
        assert_eq!(scan.scanned(), 0x10 - 0x08 + 1);
        drop(scan);

        assert_eq!(sim.i2c_transactions(0), u64::from(0x10u8 - 0x08 + 1));
    }

    #[test]
    fn test_scan_full_range() {
        let mut sim = SimPlatform::new();
        sim.add_i2c_target(0, 0x76);
        sim.add_i2c_target(0, 0x03);

        let found: Vec<u8> = ProbeScan::new(sim.i2c(0).unwrap(), DEFAULT_PROBE_RANGE).collect();
        assert_eq!(found, vec![0x76]);
        assert_eq!(sim.i2c_transactions(0), 0x77 - 0x08 + 1);
    }

    #[test]
    fn test_report_summary() {
        let mut report = ProbeReport {
            endpoint: "i2c0".to_string(),
            scanned: 112,
            found: Vec::new(),
        };
        assert_eq!(report.summary(), "No devices found");
        report.found = vec![0x08, 0x76];
        assert_eq!(report.summary(), "Found 2 devices");
        assert_eq!(report.addresses().collect::<Vec<_>>(), vec!["0x08", "0x76"]);
    }
}
