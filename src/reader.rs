use log::{debug, error, info, warn};
use std::time::Duration;

use crate::config::ReaderConfig;
use crate::pcd::Pcd;
use crate::types::{BringUpReport, RfidError, Uid};

pub struct RfidReader<P: Pcd> {
    pcd: P,
    config: ReaderConfig,
}

impl<P: Pcd> RfidReader<P> {
    // Version register values that mean nobody is driving MISO
    const NO_RESPONSE_LOW: u8 = 0x00;
    const NO_RESPONSE_HIGH: u8 = 0xFF;

    /// Create a new reader with the default pin map and timings
    pub fn new(pcd: P) -> Self {
        Self::with_config(pcd, ReaderConfig::default())
    }

    pub fn with_config(pcd: P, config: ReaderConfig) -> Self {
        Self { pcd, config }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Access the underlying chip driver
    pub fn pcd_mut(&mut self) -> &mut P {
        &mut self.pcd
    }

    pub fn into_inner(self) -> P {
        self.pcd
    }

    /// Reset and initialize the reader chip, with diagnostics on the log.
    ///
    /// The version register is read up to `version_attempts` times until it
    /// holds something other than 0x00/0xFF. A failing self-test is only
    /// reported as a warning since card reads often still work.
    ///
    /// # Returns
    /// The version register value and the self-test result, or
    /// [`RfidError::NoCommunication`] when the chip never answered.
    pub fn init(&mut self) -> Result<BringUpReport, RfidError> {
        let pins = self.config.pins;
        info!("[RFID] Starting initialization...");
        info!(
            "[RFID] Pin configuration: RST=D{} (GPIO {}), SS=D{} (GPIO {})",
            pins.rst, pins.rst, pins.ss, pins.ss
        );
        info!(
            "[RFID] SPI pins: MOSI=D{}, MISO=D{}, SCK=D{}",
            pins.mosi, pins.miso, pins.sck
        );

        info!("[RFID] Performing hardware reset...");
        self.pcd.set_reset(false)?;
        self.pause(self.config.reset_pulse);
        self.pcd.set_reset(true)?;
        self.pause(self.config.reset_pulse);
        self.pause(self.config.settle);

        info!("[RFID] Initializing MFRC522...");
        self.pcd.init()?;
        self.pause(self.config.settle);

        let version = self.read_version();
        if Self::is_no_response(version) {
            self.log_wiring_help();
            return Err(RfidError::NoCommunication { version });
        }

        info!("[RFID] Performing self-test...");
        self.pause(self.config.self_test_pause);
        let self_test_passed = self.run_self_test();
        if !self_test_passed {
            warn!("[RFID] WARNING: Self-test failed, but version is valid (0x{:02X})", version);
            warn!("[RFID] Module communication is working - card reading may still work!");
            warn!("[RFID] This could be due to:");
            warn!("  - Power supply current limits (module needs ~13-26mA)");
            warn!("  - Module needs more stabilization time");
            warn!("  - Antenna tuning (some modules need adjustment)");
            warn!("[RFID] Proceeding anyway - try reading a card to test functionality.");
        }

        info!("[RFID] MFRC522 version: 0x{:02X}", version);
        info!("[RFID] Reader initialized successfully!");
        info!("[RFID] Ready to read cards - hold a card near the reader!");

        Ok(BringUpReport {
            version,
            self_test_passed,
        })
    }

    /// Check for a new card and read its UID.
    ///
    /// Returns immediately with `None` when no card is in the field. Read
    /// errors are logged at debug level and also reported as `None`. A card
    /// that was read is halted so the same pass does not read it twice.
    pub fn read_card(&mut self) -> Option<Uid> {
        match self.pcd.is_new_card_present() {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                debug!("[RFID] Presence check failed: {:?}", e);
                return None;
            }
        }

        let uid = match self.pcd.read_card_serial() {
            Ok(uid) => uid,
            Err(e) => {
                debug!("[RFID] Could not read card serial: {:?}", e);
                return None;
            }
        };

        if let Err(e) = self.pcd.halt() {
            debug!("[RFID] Halt failed: {:?}", e);
        }

        Some(uid)
    }

    /// Like [`read_card`](Self::read_card) but copies the UID bytes into a caller buffer.
    ///
    /// # Returns
    /// Number of UID bytes written, or `None` when nothing was read or the
    /// buffer is too small to hold the UID.
    pub fn read_card_into(&mut self, buf: &mut [u8]) -> Option<usize> {
        let uid = self.read_card()?;
        let bytes = uid.as_bytes();

        if bytes.len() > buf.len() {
            warn!(
                "[RFID] UID has {} bytes but buffer only holds {}",
                bytes.len(),
                buf.len()
            );
            return None;
        }

        buf[..bytes.len()].copy_from_slice(bytes);
        Some(bytes.len())
    }

    fn read_version(&mut self) -> u8 {
        let attempts = self.config.version_attempts;
        let mut version = Self::NO_RESPONSE_LOW;

        for attempt in 1..=attempts {
            version = match self.pcd.version() {
                Ok(v) => v,
                Err(e) => {
                    debug!("[RFID] Version read failed: {:?}", e);
                    Self::NO_RESPONSE_LOW
                }
            };
            info!(
                "[RFID] Version register read attempt {}: 0x{:02X}",
                attempt, version
            );

            if !Self::is_no_response(version) {
                break;
            }
            if attempt < attempts {
                self.pause(self.config.version_retry_delay);
            }
        }

        version
    }

    fn run_self_test(&mut self) -> bool {
        let attempts = self.config.self_test_attempts;

        for attempt in 1..=attempts {
            match self.pcd.self_test() {
                Ok(true) => {
                    info!("[RFID] Self-test PASSED!");
                    return true;
                }
                Ok(false) => {}
                Err(e) => debug!("[RFID] Self-test error: {:?}", e),
            }
            warn!("[RFID] Self-test attempt {} failed, retrying...", attempt);
            if attempt < attempts {
                self.pause(self.config.self_test_retry_delay);
            }
        }

        false
    }

    fn log_wiring_help(&self) {
        let pins = self.config.pins;
        error!("[RFID] ERROR: Cannot communicate with module!");
        error!("[RFID] Version register reads 0x00 or 0xFF = No SPI communication");
        error!("[RFID] CRITICAL CHECKS:");
        error!("  - Power LED on the module should be ON");
        error!("  ? RST pin connected to D{} (NOT D2!)", pins.rst);
        error!("  ? SDA/SS pin connected to D{}", pins.ss);
        error!("  ? MOSI connected to D{}", pins.mosi);
        error!("  ? MISO connected to D{}", pins.miso);
        error!("  ? SCK connected to D{}", pins.sck);
        error!("[RFID] COMMON MISTAKES:");
        error!("  1. SDA/SS pin NOT connected (most common!)");
        error!("  2. MOSI and MISO swapped");
        error!("  3. Using wrong D pin numbers");
        error!("  4. Loose breadboard connections");
        error!("  5. Wrong power pin (must be 3.3V, not 5V)");
        error!("[RFID] TEST: Unplug and replug all wires, especially SDA/SS!");
    }

    fn is_no_response(version: u8) -> bool {
        version == Self::NO_RESPONSE_LOW || version == Self::NO_RESPONSE_HIGH
    }

    fn pause(&mut self, duration: Duration) {
        if !duration.is_zero() {
            self.pcd.pause(duration);
        }
    }
}
