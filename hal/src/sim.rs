//! Simulated board
//!
//! A deterministic [`Platform`] used by tests and by the host daemon. Nothing
//! here depends on wall-clock time: `millis()` only moves when `delay_ms` or
//! [`SimPlatform::advance`] is called.

use crate::{
    BusFamily, BusInfo, FlashStats, GpioPort, HalError, HeapStats, I2cBus, Level, PinMode,
    Platform, SpiBus, I2C_ADDR_MAX,
};
use std::collections::{BTreeMap, BTreeSet};

const I2C_FREQ_RANGE: (u32, u32) = (10_000, 1_000_000);
const SPI_FREQ_MAX: u32 = 80_000_000;

/// Simulated I2C target with a 256-byte register map
///
/// The first byte of every write sets the register pointer; further bytes
/// are stored with auto-increment. Reads continue from the pointer.
#[derive(Debug, Clone)]
pub struct SimI2cTarget {
    registers: [u8; 256],
    pointer: u8,
}

impl SimI2cTarget {
    pub fn new() -> Self {
        Self {
            registers: [0; 256],
            pointer: 0,
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        let Some((first, rest)) = bytes.split_first() else {
            return;
        };
        self.pointer = *first;
        for byte in rest {
            self.registers[self.pointer as usize] = *byte;
            self.pointer = self.pointer.wrapping_add(1);
        }
    }

    fn read(&mut self, buf: &mut [u8]) {
        for slot in buf.iter_mut() {
            *slot = self.registers[self.pointer as usize];
            self.pointer = self.pointer.wrapping_add(1);
        }
    }
}

impl Default for SimI2cTarget {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
struct SimI2c {
    index: u8,
    freq_hz: u32,
    sda: u8,
    scl: u8,
    targets: BTreeMap<u8, SimI2cTarget>,
    failing: BTreeSet<u8>,
    transactions: u64,
}

impl SimI2c {
    fn target(&mut self, addr: u8) -> Result<&mut SimI2cTarget, HalError> {
        self.transactions += 1;
        if self.failing.contains(&addr) {
            return Err(HalError::Bus);
        }
        self.targets.get_mut(&addr).ok_or(HalError::Nack(addr))
    }
}

impl I2cBus for SimI2c {
    fn probe(&mut self, addr: u8) -> bool {
        addr <= I2C_ADDR_MAX && self.target(addr).is_ok()
    }

    fn write(&mut self, addr: u8, bytes: &[u8]) -> Result<(), HalError> {
        self.target(addr)?.write(bytes);
        Ok(())
    }

    fn write_read(&mut self, addr: u8, bytes: &[u8], buf: &mut [u8]) -> Result<(), HalError> {
        let target = self.target(addr)?;
        target.write(bytes);
        target.read(buf);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct SimSpi {
    index: u8,
    freq_hz: u32,
    pins: [(&'static str, u8); 3],
    transfers: Vec<(u8, Vec<u8>)>,
}

impl SpiBus for SimSpi {
    // Loopback: MISO mirrors MOSI.
    fn transfer(&mut self, cs_pin: u8, tx: &[u8], rx: &mut [u8]) -> Result<(), HalError> {
        for (i, slot) in rx.iter_mut().enumerate() {
            *slot = tx.get(i).copied().unwrap_or(0xff);
        }
        self.transfers.push((cs_pin, tx.to_vec()));
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct SimGpio {
    count: u8,
    modes: BTreeMap<u8, PinMode>,
    levels: BTreeMap<u8, Level>,
    failing: BTreeSet<u8>,
}

impl SimGpio {
    fn check(&self, pin: u8) -> Result<(), HalError> {
        if pin < self.count {
            Ok(())
        } else {
            Err(HalError::InvalidPin(pin))
        }
    }
}

impl GpioPort for SimGpio {
    fn set_mode(&mut self, pin: u8, mode: PinMode) -> Result<(), HalError> {
        self.check(pin)?;
        if self.failing.contains(&pin) {
            return Err(HalError::Bus);
        }
        self.modes.insert(pin, mode);
        if mode == PinMode::InputPullUp && !self.levels.contains_key(&pin) {
            self.levels.insert(pin, Level::High);
        }
        Ok(())
    }

    fn write(&mut self, pin: u8, level: Level) -> Result<(), HalError> {
        self.check(pin)?;
        if self.failing.contains(&pin) {
            return Err(HalError::Bus);
        }
        self.levels.insert(pin, level);
        Ok(())
    }

    fn read(&mut self, pin: u8) -> Result<Level, HalError> {
        self.check(pin)?;
        Ok(self.levels.get(&pin).copied().unwrap_or_default())
    }
}

/// Deterministic simulated board
///
/// Defaults mirror a small dual-core microcontroller: 40 GPIOs with the
/// flash pins (6-11) unusable and 34-39 input-only, two I2C controllers, two
/// SPI controllers and one UART.
#[derive(Debug, Clone)]
pub struct SimPlatform {
    board: String,
    clock_ms: u64,
    gpio: SimGpio,
    unsafe_pins: BTreeSet<u8>,
    input_only_pins: BTreeSet<u8>,
    i2c: Vec<SimI2c>,
    spi: Vec<SimSpi>,
    uart_bauds: Vec<u32>,
    heap: HeapStats,
    flash: FlashStats,
}

impl SimPlatform {
    /// Creates the default simulated board
    pub fn new() -> Self {
        Self {
            board: "sim".to_string(),
            clock_ms: 0,
            gpio: SimGpio {
                count: 40,
                modes: BTreeMap::new(),
                levels: BTreeMap::new(),
                failing: BTreeSet::new(),
            },
            unsafe_pins: (6..=11).collect(),
            input_only_pins: (34..=39).collect(),
            i2c: vec![Self::i2c_bus(0, 21, 22), Self::i2c_bus(1, 25, 26)],
            spi: vec![
                Self::spi_bus(0, [("sck", 18), ("mosi", 23), ("miso", 19)]),
                Self::spi_bus(1, [("sck", 14), ("mosi", 13), ("miso", 12)]),
            ],
            uart_bauds: vec![115_200],
            heap: HeapStats {
                total: 320 * 1024,
                free: 280 * 1024,
                min_free: 270 * 1024,
            },
            flash: FlashStats {
                total: 4 * 1024 * 1024,
                used: 1024 * 1024,
            },
        }
    }

    fn i2c_bus(index: u8, sda: u8, scl: u8) -> SimI2c {
        SimI2c {
            index,
            freq_hz: 100_000,
            sda,
            scl,
            targets: BTreeMap::new(),
            failing: BTreeSet::new(),
            transactions: 0,
        }
    }

    fn spi_bus(index: u8, pins: [(&'static str, u8); 3]) -> SimSpi {
        SimSpi {
            index,
            freq_hz: 1_000_000,
            pins,
            transfers: Vec::new(),
        }
    }

    /// Builder: sets the board name
    pub fn with_board_name(mut self, name: impl Into<String>) -> Self {
        self.board = name.into();
        self
    }

    /// Builder: sets the number of I2C controllers
    pub fn with_i2c_buses(mut self, count: u8) -> Self {
        self.i2c = (0..count)
            .map(|i| Self::i2c_bus(i, 21 + 2 * i, 22 + 2 * i))
            .collect();
        self
    }

    /// Builder: sets the number of SPI controllers
    pub fn with_spi_buses(mut self, count: u8) -> Self {
        self.spi = (0..count)
            .map(|i| Self::spi_bus(i, [("sck", 18), ("mosi", 23), ("miso", 19)]))
            .collect();
        self
    }

    /// Builder: sets the number of UARTs
    pub fn with_uarts(mut self, count: u8) -> Self {
        self.uart_bauds = vec![115_200; count as usize];
        self
    }

    /// Builder: sets heap statistics
    pub fn with_heap(mut self, heap: HeapStats) -> Self {
        self.heap = heap;
        self
    }

    /// Attaches a target that acknowledges `addr` on I2C bus `bus`
    pub fn add_i2c_target(&mut self, bus: u8, addr: u8) {
        if let Some(b) = self.i2c.get_mut(bus as usize) {
            b.targets.entry(addr).or_default();
        }
    }

    /// Detaches a target
    pub fn remove_i2c_target(&mut self, bus: u8, addr: u8) {
        if let Some(b) = self.i2c.get_mut(bus as usize) {
            b.targets.remove(&addr);
        }
    }

    /// Makes every transaction to `addr` fail with a bus error (or heals it)
    pub fn set_i2c_failing(&mut self, bus: u8, addr: u8, failing: bool) {
        if let Some(b) = self.i2c.get_mut(bus as usize) {
            if failing {
                b.failing.insert(addr);
            } else {
                b.failing.remove(&addr);
            }
        }
    }

    /// Presets a register of a simulated target
    pub fn set_i2c_register(&mut self, bus: u8, addr: u8, reg: u8, value: u8) {
        if let Some(target) = self
            .i2c
            .get_mut(bus as usize)
            .and_then(|b| b.targets.get_mut(&addr))
        {
            target.registers[reg as usize] = value;
        }
    }

    /// Returns a register of a simulated target
    pub fn i2c_register(&self, bus: u8, addr: u8, reg: u8) -> Option<u8> {
        self.i2c
            .get(bus as usize)
            .and_then(|b| b.targets.get(&addr))
            .map(|t| t.registers[reg as usize])
    }

    /// Number of transactions attempted on an I2C bus
    pub fn i2c_transactions(&self, bus: u8) -> u64 {
        self.i2c.get(bus as usize).map_or(0, |b| b.transactions)
    }

    /// Bytes sent on an SPI bus, with the chip-select used
    pub fn spi_transfers(&self, bus: u8) -> &[(u8, Vec<u8>)] {
        self.spi
            .get(bus as usize)
            .map_or(&[][..], |b| b.transfers.as_slice())
    }

    /// Current level of a pin as last driven or injected
    pub fn pin_level(&self, pin: u8) -> Option<Level> {
        self.gpio.levels.get(&pin).copied()
    }

    /// Current mode of a pin, if configured
    pub fn pin_mode(&self, pin: u8) -> Option<PinMode> {
        self.gpio.modes.get(&pin).copied()
    }

    /// Makes writes and mode changes on `pin` fail with a bus error (or heals it)
    pub fn set_gpio_failing(&mut self, pin: u8, failing: bool) {
        if failing {
            self.gpio.failing.insert(pin);
        } else {
            self.gpio.failing.remove(&pin);
        }
    }

    /// Injects an external level on an input pin
    pub fn set_input_level(&mut self, pin: u8, level: Level) {
        self.gpio.levels.insert(pin, level);
    }

    /// Moves the simulated clock forward
    pub fn advance(&mut self, ms: u64) {
        self.clock_ms += ms;
    }
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for SimPlatform {
    fn board_name(&self) -> &str {
        &self.board
    }

    fn i2c_count(&self) -> u8 {
        self.i2c.len() as u8
    }

    fn spi_count(&self) -> u8 {
        self.spi.len() as u8
    }

    fn uart_count(&self) -> u8 {
        self.uart_bauds.len() as u8
    }

    fn gpio_count(&self) -> u8 {
        self.gpio.count
    }

    fn gpio_is_valid(&self, pin: u8) -> bool {
        pin < self.gpio.count && !self.unsafe_pins.contains(&pin)
    }

    fn gpio_is_safe_output(&self, pin: u8) -> bool {
        self.gpio_is_valid(pin) && !self.input_only_pins.contains(&pin)
    }

    fn heap_stats(&self) -> HeapStats {
        self.heap
    }

    fn flash_stats(&self) -> FlashStats {
        self.flash
    }

    fn millis(&self) -> u64 {
        self.clock_ms
    }

    fn delay_ms(&mut self, ms: u32) {
        self.clock_ms += u64::from(ms);
    }

    fn bus_info(&self, family: BusFamily, index: u8) -> Option<BusInfo> {
        match family {
            BusFamily::I2c => self.i2c.get(index as usize).map(|b| BusInfo {
                family,
                index: b.index,
                freq_hz: b.freq_hz,
                pins: vec![("sda", b.sda), ("scl", b.scl)],
            }),
            BusFamily::Spi => self.spi.get(index as usize).map(|b| BusInfo {
                family,
                index: b.index,
                freq_hz: b.freq_hz,
                pins: b.pins.to_vec(),
            }),
            BusFamily::Uart => self.uart_bauds.get(index as usize).map(|baud| BusInfo {
                family,
                index,
                freq_hz: *baud,
                pins: vec![("tx", 1 + 15 * index), ("rx", 3 + 15 * index)],
            }),
        }
    }

    fn configure_bus(
        &mut self,
        family: BusFamily,
        index: u8,
        freq_hz: u32,
    ) -> Result<(), HalError> {
        let missing = HalError::NoSuchBus { family, index };
        match family {
            BusFamily::I2c => {
                let bus = self.i2c.get_mut(index as usize).ok_or(missing)?;
                if freq_hz < I2C_FREQ_RANGE.0 || freq_hz > I2C_FREQ_RANGE.1 {
                    return Err(HalError::UnsupportedFrequency(freq_hz));
                }
                bus.freq_hz = freq_hz;
            }
            BusFamily::Spi => {
                let bus = self.spi.get_mut(index as usize).ok_or(missing)?;
                if freq_hz == 0 || freq_hz > SPI_FREQ_MAX {
                    return Err(HalError::UnsupportedFrequency(freq_hz));
                }
                bus.freq_hz = freq_hz;
            }
            BusFamily::Uart => {
                let baud = self.uart_bauds.get_mut(index as usize).ok_or(missing)?;
                if freq_hz == 0 {
                    return Err(HalError::UnsupportedFrequency(freq_hz));
                }
                *baud = freq_hz;
            }
        }
        Ok(())
    }

    fn gpio(&mut self) -> &mut dyn GpioPort {
        &mut self.gpio
    }

    fn i2c(&mut self, index: u8) -> Option<&mut dyn I2cBus> {
        self.i2c
            .get_mut(index as usize)
            .map(|b| b as &mut dyn I2cBus)
    }

    fn spi(&mut self, index: u8) -> Option<&mut dyn SpiBus> {
        self.spi
            .get_mut(index as usize)
            .map(|b| b as &mut dyn SpiBus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_board_counts() {
        let sim = SimPlatform::new();
        assert_eq!(sim.i2c_count(), 2);
        assert_eq!(sim.spi_count(), 2);
        assert_eq!(sim.uart_count(), 1);
        assert_eq!(sim.bus_count(BusFamily::I2c), 2);
    }

    #[test]
    fn test_pin_predicates() {
        let sim = SimPlatform::new();
        assert!(sim.gpio_is_safe_output(2));
        assert!(!sim.gpio_is_valid(6));
        assert!(sim.gpio_is_valid(36));
        assert!(!sim.gpio_is_safe_output(36));
        assert!(!sim.gpio_is_valid(40));
    }

    #[test]
    fn test_i2c_probe_and_registers() {
        let mut sim = SimPlatform::new();
        sim.add_i2c_target(0, 0x76);
        sim.set_i2c_register(0, 0x76, 0xd0, 0x60);

        let bus = sim.i2c(0).unwrap();
        assert!(bus.probe(0x76));
        assert!(!bus.probe(0x77));

        let mut buf = [0u8; 1];
        bus.write_read(0x76, &[0xd0], &mut buf).unwrap();
        assert_eq!(buf[0], 0x60);

        bus.write(0x76, &[0x10, 0xaa, 0xbb]).unwrap();
        assert_eq!(sim.i2c_register(0, 0x76, 0x10), Some(0xaa));
        assert_eq!(sim.i2c_register(0, 0x76, 0x11), Some(0xbb));
    }

    #[test]
    fn test_i2c_failure_injection() {
        let mut sim = SimPlatform::new();
        sim.add_i2c_target(1, 0x40);
        sim.set_i2c_failing(1, 0x40, true);

        let bus = sim.i2c(1).unwrap();
        assert!(!bus.probe(0x40));
        assert_eq!(bus.write(0x40, &[0]), Err(HalError::Bus));

        sim.set_i2c_failing(1, 0x40, false);
        assert!(sim.i2c(1).unwrap().probe(0x40));
    }

    #[test]
    fn test_gpio_failure_injection() {
        let mut sim = SimPlatform::new();
        sim.gpio().write(4, Level::High).unwrap();
        sim.set_gpio_failing(4, true);
        assert_eq!(sim.gpio().write(4, Level::Low), Err(HalError::Bus));
        assert_eq!(sim.gpio().set_mode(4, PinMode::Input), Err(HalError::Bus));
        assert_eq!(sim.pin_level(4), Some(Level::High));

        sim.set_gpio_failing(4, false);
        sim.gpio().write(4, Level::Low).unwrap();
        assert_eq!(sim.pin_level(4), Some(Level::Low));
    }

    #[test]
    fn test_gpio_write_and_read() {
        let mut sim = SimPlatform::new();
        sim.gpio().set_mode(2, PinMode::Output).unwrap();
        sim.gpio().write(2, Level::High).unwrap();
        assert_eq!(sim.pin_level(2), Some(Level::High));
        assert_eq!(sim.pin_mode(2), Some(PinMode::Output));
        assert_eq!(sim.gpio().read(2), Ok(Level::High));
        assert_eq!(sim.gpio().write(45, Level::High), Err(HalError::InvalidPin(45)));
    }

    #[test]
    fn test_spi_loopback() {
        let mut sim = SimPlatform::new();
        let mut rx = [0u8; 3];
        sim.spi(0).unwrap().transfer(5, &[1, 2], &mut rx).unwrap();
        assert_eq!(rx, [1, 2, 0xff]);
        assert_eq!(sim.spi_transfers(0), &[(5, vec![1, 2])]);
    }

    #[test]
    fn test_clock_only_moves_explicitly() {
        let mut sim = SimPlatform::new();
        assert_eq!(sim.millis(), 0);
        sim.delay_ms(5);
        sim.advance(10);
        assert_eq!(sim.millis(), 15);
    }

    #[test]
    fn test_configure_bus() {
        let mut sim = SimPlatform::new();
        sim.configure_bus(BusFamily::I2c, 0, 400_000).unwrap();
        assert_eq!(sim.bus_info(BusFamily::I2c, 0).unwrap().freq_hz, 400_000);
        assert_eq!(
            sim.configure_bus(BusFamily::I2c, 0, 5_000_000),
            Err(HalError::UnsupportedFrequency(5_000_000))
        );
        assert_eq!(
            sim.configure_bus(BusFamily::Spi, 4, 1_000),
            Err(HalError::NoSuchBus {
                family: BusFamily::Spi,
                index: 4
            })
        );
    }
}
