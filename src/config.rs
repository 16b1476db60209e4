//! Board wiring and timing defaults

use std::time::Duration;

/// GPIO numbers the reader is wired to.
///
/// Printed during bring-up so a miswired board can be diagnosed from the
/// serial console. With the `esp32` feature, [`PinConfig::BOARD`] is checked
/// at compile time against the pins `esp_board` wires up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinConfig {
    /// MFRC522 reset (RST)
    pub rst: u8,
    /// MFRC522 slave select (SDA/SS)
    pub ss: u8,
    pub mosi: u8,
    pub miso: u8,
    pub sck: u8,
}

impl PinConfig {
    // RST moved off GPIO2 to keep clear of the on-board LED. SPI uses the VSPI pins.
    pub const BOARD: PinConfig = PinConfig {
        rst: 4,
        ss: 5,
        mosi: 23,
        miso: 19,
        sck: 18,
    };
}

impl Default for PinConfig {
    fn default() -> Self {
        Self::BOARD
    }
}

/// Retry counts and settle times used while bringing the chip up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    pub pins: PinConfig,
    /// How long RST is held low, and how long to wait after releasing it
    pub reset_pulse: Duration,
    /// Settle time after the reset pulse and again after chip init
    pub settle: Duration,
    pub version_attempts: u8,
    pub version_retry_delay: Duration,
    /// Pause between a valid version read and the first self-test
    pub self_test_pause: Duration,
    pub self_test_attempts: u8,
    pub self_test_retry_delay: Duration,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            pins: PinConfig::default(),
            reset_pulse: Duration::from_millis(10),
            settle: Duration::from_millis(50),
            version_attempts: 3,
            version_retry_delay: Duration::from_millis(100),
            self_test_pause: Duration::from_millis(100),
            self_test_attempts: 3,
            self_test_retry_delay: Duration::from_millis(200),
        }
    }
}

impl ReaderConfig {
    /// Same retry counts with every delay set to zero
    pub fn without_delays() -> Self {
        Self {
            reset_pulse: Duration::ZERO,
            settle: Duration::ZERO,
            version_retry_delay: Duration::ZERO,
            self_test_pause: Duration::ZERO,
            self_test_retry_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Behaviour of the polling loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationConfig {
    /// How long a card screen stays up before the waiting screen returns
    pub card_hold: Duration,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            card_hold: Duration::from_secs(3),
        }
    }
}
