//! MFRC522 RFID reader and SSD1306 status display for ESP32 boards.
//!
//! The reader chip sits behind the [`Pcd`] trait and the display behind
//! [`Panel`], so everything except the `esp32` wiring runs on the host with
//! software doubles.
//!
//! # Features
//!
//! - `esp32` - SPI/I2C wiring, logger setup and the firmware binary for ESP32
//!   using esp-idf-svc
//!
//! # Example
//!
//! ```ignore
//! use esp_idf_svc::hal::peripherals::Peripherals;
//! use nami_rfid::{esp_board, init_esp_runtime, CardStation, RfidReader};
//!
//! init_esp_runtime();
//! let (mfrc522, oled) = esp_board(Peripherals::take()?)?;
//! let mut station = CardStation::new(RfidReader::new(mfrc522), oled);
//!
//! station.start()?;
//! loop {
//!     if let Some(uid) = station.poll() {
//!         println!("Card: {}", uid);
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(100));
//! }
//! ```

mod config;
mod display;
mod mfrc522;
mod pcd;
mod reader;
mod ssd1306;
mod station;
mod types;

#[cfg(feature = "esp32")]
mod esp32;

// Re-exports
pub use config::{PinConfig, ReaderConfig, StationConfig};
pub use display::{centered_x, show_card, show_waiting, split_uid, text_width, Panel};
pub use mfrc522::{Mfrc522, Register};
pub use pcd::Pcd;
pub use reader::RfidReader;
pub use ssd1306::Ssd1306;
pub use station::CardStation;
pub use types::{uid_to_string, BringUpReport, RfidError, Uid, MAX_UID_LEN};

#[cfg(feature = "esp32")]
pub use esp32::{esp_board, esp_mfrc522, esp_ssd1306, init_esp_runtime, EspMfrc522, EspSsd1306};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mfrc522::fake::FakeChip;
    use crate::ssd1306::fake::RecordingI2c;
    use embedded_graphics::pixelcolor::BinaryColor;
    use embedded_graphics::prelude::*;
    use std::collections::VecDeque;
    use std::time::{Duration, Instant};

    /// Scripted chip for exercising the reader's retry logic without hardware
    struct MockPcd {
        versions: VecDeque<Result<u8, RfidError>>,
        self_tests: VecDeque<bool>,
        card: Option<Uid>,
        serial_error: bool,
        calls: Vec<&'static str>,
        pauses: Vec<Duration>,
    }

    impl MockPcd {
        fn new(versions: Vec<Result<u8, RfidError>>, self_tests: Vec<bool>) -> Self {
            Self {
                versions: versions.into(),
                self_tests: self_tests.into(),
                card: None,
                serial_error: false,
                calls: Vec::new(),
                pauses: Vec::new(),
            }
        }

        fn healthy() -> Self {
            Self::new(vec![Ok(0x92)], vec![true])
        }

        fn with_card(uid: &[u8]) -> Self {
            let mut pcd = Self::healthy();
            pcd.card = Some(Uid::new(uid, 0x08).unwrap());
            pcd
        }

        fn count(&self, call: &str) -> usize {
            self.calls.iter().filter(|c| **c == call).count()
        }
    }

    impl Pcd for MockPcd {
        fn set_reset(&mut self, high: bool) -> Result<(), RfidError> {
            self.calls.push(if high { "reset_high" } else { "reset_low" });
            Ok(())
        }

        fn init(&mut self) -> Result<(), RfidError> {
            self.calls.push("init");
            Ok(())
        }

        fn version(&mut self) -> Result<u8, RfidError> {
            self.calls.push("version");
            self.versions.pop_front().unwrap_or(Ok(0x00))
        }

        fn self_test(&mut self) -> Result<bool, RfidError> {
            self.calls.push("self_test");
            Ok(self.self_tests.pop_front().unwrap_or(false))
        }

        fn is_new_card_present(&mut self) -> Result<bool, RfidError> {
            self.calls.push("present");
            Ok(self.card.is_some())
        }

        fn read_card_serial(&mut self) -> Result<Uid, RfidError> {
            self.calls.push("serial");
            if self.serial_error {
                return Err(RfidError::Timeout);
            }
            self.card.ok_or(RfidError::Timeout)
        }

        fn halt(&mut self) -> Result<(), RfidError> {
            self.calls.push("halt");
            self.card = None;
            Ok(())
        }

        fn pause(&mut self, duration: Duration) {
            self.pauses.push(duration);
        }
    }

    fn reader(pcd: MockPcd) -> RfidReader<MockPcd> {
        RfidReader::with_config(pcd, ReaderConfig::without_delays())
    }

    fn panel() -> Ssd1306<RecordingI2c> {
        Ssd1306::new(RecordingI2c::default())
    }

    fn rows_lit(panel: &Ssd1306<RecordingI2c>, rows: std::ops::Range<usize>) -> bool {
        rows.into_iter()
            .any(|y| (0..ssd1306::WIDTH).any(|x| panel.pixel(x, y)))
    }

    // ===================
    // uid_to_string tests
    // ===================

    #[test]
    fn test_uid_to_string_four_bytes() {
        assert_eq!(uid_to_string(&[0xDE, 0xAD, 0xBE, 0xEF]), "DE:AD:BE:EF");
    }

    #[test]
    fn test_uid_to_string_pads_small_bytes() {
        assert_eq!(uid_to_string(&[0x04, 0x0A, 0x00]), "04:0A:00");
    }

    #[test]
    fn test_uid_to_string_single_byte() {
        assert_eq!(uid_to_string(&[0xAB]), "AB");
    }

    #[test]
    fn test_uid_to_string_empty() {
        assert_eq!(uid_to_string(&[]), "");
    }

    #[test]
    fn test_uid_to_string_shape() {
        let bytes: Vec<u8> = (0..=255u8).step_by(7).collect();
        let text = uid_to_string(&bytes);

        assert_eq!(text.len(), bytes.len() * 3 - 1);
        assert!(!text.ends_with(':'));
        for (pair, byte) in text.split(':').zip(&bytes) {
            assert_eq!(pair.len(), 2);
            assert_eq!(pair, pair.to_uppercase());
            assert_eq!(u8::from_str_radix(pair, 16).unwrap(), *byte);
        }
    }

    #[test]
    fn test_uid_display_matches_formatter() {
        let uid = Uid::new(&[0x04, 0xA1, 0x0B, 0xFF, 0x12, 0x34, 0x56], 0x00).unwrap();
        assert_eq!(uid.to_string(), "04:A1:0B:FF:12:34:56");
        assert_eq!(uid.len(), 7);
    }

    #[test]
    fn test_uid_too_long() {
        let result = Uid::new(&[0u8; 11], 0x00);
        assert!(matches!(result, Err(RfidError::InvalidParameter(_))));
    }

    // ===================
    // split_uid tests
    // ===================

    #[test]
    fn test_split_uid_short_stays_on_one_line() {
        assert_eq!(split_uid("DE:AD:BE:EF"), ("DE:AD:BE:EF", None));
    }

    #[test]
    fn test_split_uid_twenty_chars_stays_on_one_line() {
        // 7-byte UID renders to exactly 20 characters
        let text = "04:11:22:33:44:55:66";
        assert_eq!(text.len(), 20);
        assert_eq!(split_uid(text), (text, None));
    }

    #[test]
    fn test_split_uid_after_colon_near_midpoint() {
        let text = "04:11:22:33:44:55:66:77:88:99";
        let (first, second) = split_uid(text);
        assert_eq!(first, "04:11:22:33:44:");
        assert_eq!(second, Some("55:66:77:88:99"));
    }

    #[test]
    fn test_split_uid_colon_later_in_window() {
        // mid = 10, colon at index 14 is the last position searched
        let text = "ABCDEFGHIJKLMN:OPQRST";
        assert_eq!(text.len(), 21);
        assert_eq!(split_uid(text), ("ABCDEFGHIJKLMN:", Some("OPQRST")));
    }

    #[test]
    fn test_split_uid_without_colon_uses_midpoint() {
        let text = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
        assert_eq!(split_uid(text), ("ABCDEFGHIJKLM", Some("NOPQRSTUVWXYZ")));
    }

    #[test]
    fn test_split_uid_odd_length_without_colon_uses_floor_midpoint() {
        // 21 chars, no colon: split at 21 / 2 = 10
        let text = "ABCDEFGHIJKLMNOPQRSTU";
        assert_eq!(split_uid(text), ("ABCDEFGHIJ", Some("KLMNOPQRSTU")));
    }

    #[test]
    fn test_split_uid_colon_outside_window_ignored() {
        // mid = 11, window is 11..16, colon sits at 16
        let text = "ABCDEFGHIJKLMNOP:RSTUV";
        assert_eq!(text.len(), 22);
        assert_eq!(split_uid(text), ("ABCDEFGHIJK", Some("LMNOP:RSTUV")));
    }

    // ===================
    // display tests
    // ===================

    #[test]
    fn test_centered_x() {
        // 9 chars * 6 px = 54 px
        assert_eq!(text_width("RFID Card"), 54);
        assert_eq!(centered_x("RFID Card"), 37);
        assert_eq!(centered_x(""), 64);
    }

    #[test]
    fn test_show_card_short_uid_uses_one_line() {
        let mut oled = panel();
        show_card(&mut oled, "DE:AD:BE:EF").unwrap();

        assert!(rows_lit(&oled, 40..50));
        assert!(!rows_lit(&oled, 50..64));
    }

    #[test]
    fn test_show_card_long_uid_uses_two_lines() {
        let mut oled = panel();
        show_card(&mut oled, "04:11:22:33:44:55:66:77:88:99").unwrap();

        assert!(rows_lit(&oled, 40..50));
        assert!(rows_lit(&oled, 50..60));
    }

    #[test]
    fn test_show_card_layout() {
        let mut oled = panel();
        show_card(&mut oled, "DE:AD:BE:EF").unwrap();

        // Separator spans the whole width
        assert!((0..ssd1306::WIDTH).all(|x| oled.pixel(x, 15)));
        // Title is centered: nothing left of x=37 in the title band
        assert!(rows_lit(&oled, 5..15));
        assert!((5..15).all(|y| (0..37).all(|x| !oled.pixel(x, y))));
        // "UID:" label
        assert!(rows_lit(&oled, 25..35));
    }

    #[test]
    fn test_show_card_flushes() {
        let mut oled = panel();
        show_card(&mut oled, "DE:AD:BE:EF").unwrap();

        let i2c = oled.release();
        assert!(i2c.writes.iter().any(|(_, bytes)| bytes[0] == 0x40));
    }

    #[test]
    fn test_show_waiting_replaces_card_screen() {
        let mut oled = panel();
        show_card(&mut oled, "DE:AD:BE:EF").unwrap();
        show_waiting(&mut oled).unwrap();

        assert!(!(0..ssd1306::WIDTH).all(|x| oled.pixel(x, 15)));
        assert!(rows_lit(&oled, 20..30));
        assert!(rows_lit(&oled, 35..45));
        assert!(!rows_lit(&oled, 0..20));
        assert!(!rows_lit(&oled, 50..64));
    }

    // ===================
    // reader init tests
    // ===================

    #[test]
    fn test_init_success_first_attempt() {
        let mut rfid = reader(MockPcd::healthy());

        let report = rfid.init().unwrap();
        assert_eq!(report, BringUpReport { version: 0x92, self_test_passed: true });

        let pcd = rfid.into_inner();
        assert_eq!(pcd.calls, vec!["reset_low", "reset_high", "init", "version", "self_test"]);
    }

    #[test]
    fn test_init_retries_version_read() {
        let pcd = MockPcd::new(vec![Ok(0x00), Ok(0xFF), Ok(0x82)], vec![true]);
        let mut rfid = reader(pcd);

        let report = rfid.init().unwrap();
        assert_eq!(report.version, 0x82);
        assert_eq!(rfid.pcd_mut().count("version"), 3);
    }

    #[test]
    fn test_init_fails_after_three_bad_versions() {
        let pcd = MockPcd::new(vec![Ok(0x00), Ok(0x00), Ok(0xFF), Ok(0x92)], vec![true]);
        let mut rfid = reader(pcd);

        assert_eq!(rfid.init(), Err(RfidError::NoCommunication { version: 0xFF }));

        let pcd = rfid.into_inner();
        assert_eq!(pcd.count("version"), 3);
        assert_eq!(pcd.count("self_test"), 0);
    }

    #[test]
    fn test_init_bus_error_counts_as_failed_read() {
        let pcd = MockPcd::new(vec![Err(RfidError::Bus("spi".into())), Ok(0x91)], vec![true]);
        let mut rfid = reader(pcd);

        assert_eq!(rfid.init().unwrap().version, 0x91);
    }

    #[test]
    fn test_init_self_test_failure_is_not_fatal() {
        let pcd = MockPcd::new(vec![Ok(0x82)], vec![false, false, false, true]);
        let mut rfid = reader(pcd);

        let report = rfid.init().unwrap();
        assert!(!report.self_test_passed);
        assert_eq!(rfid.pcd_mut().count("self_test"), 3);
    }

    #[test]
    fn test_init_self_test_passes_on_retry() {
        let pcd = MockPcd::new(vec![Ok(0x92)], vec![false, true]);
        let mut rfid = reader(pcd);

        assert!(rfid.init().unwrap().self_test_passed);
        assert_eq!(rfid.pcd_mut().count("self_test"), 2);
    }

    fn ms(values: &[u64]) -> Vec<Duration> {
        values.iter().map(|&v| Duration::from_millis(v)).collect()
    }

    #[test]
    fn test_init_version_retries_are_spaced() {
        let pcd = MockPcd::new(vec![Ok(0x00), Ok(0xFF), Ok(0x00)], vec![]);
        let mut rfid = RfidReader::new(pcd);

        assert!(rfid.init().is_err());
        // reset pulse, release, settle, post-init settle, then 100 ms
        // between version reads and none after the last one
        assert_eq!(rfid.into_inner().pauses, ms(&[10, 10, 50, 50, 100, 100]));
    }

    #[test]
    fn test_init_self_test_retries_are_spaced() {
        let pcd = MockPcd::new(vec![Ok(0x92)], vec![false, false, false]);
        let mut rfid = RfidReader::new(pcd);

        assert!(!rfid.init().unwrap().self_test_passed);
        assert_eq!(rfid.into_inner().pauses, ms(&[10, 10, 50, 50, 100, 200, 200]));
    }

    #[test]
    fn test_init_without_delays_never_pauses() {
        let pcd = MockPcd::new(vec![Ok(0x00), Ok(0x00), Ok(0x00)], vec![]);
        let mut rfid = reader(pcd);

        assert!(rfid.init().is_err());
        assert!(rfid.into_inner().pauses.is_empty());
    }

    #[test]
    fn test_default_config_matches_board() {
        let config = ReaderConfig::default();
        assert_eq!(config.version_attempts, 3);
        assert_eq!(config.version_retry_delay, Duration::from_millis(100));
        assert_eq!(config.self_test_attempts, 3);
        assert_eq!(config.self_test_retry_delay, Duration::from_millis(200));
        assert_eq!((config.pins.rst, config.pins.ss), (4, 5));
        assert_eq!((config.pins.mosi, config.pins.miso, config.pins.sck), (23, 19, 18));
        assert_eq!(config.pins, PinConfig::BOARD);
    }

    // ===================
    // read_card tests
    // ===================

    #[test]
    fn test_read_card_none_present() {
        let mut rfid = reader(MockPcd::healthy());

        assert!(rfid.read_card().is_none());
        assert_eq!(rfid.pcd_mut().calls, vec!["present"]);
    }

    #[test]
    fn test_read_card_halts_after_read() {
        let mut rfid = reader(MockPcd::with_card(&[0xDE, 0xAD, 0xBE, 0xEF]));

        let uid = rfid.read_card().unwrap();
        assert_eq!(uid.as_bytes(), &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(rfid.pcd_mut().calls, vec!["present", "serial", "halt"]);

        // Halted card is not reported again
        assert!(rfid.read_card().is_none());
    }

    #[test]
    fn test_read_card_serial_error_is_silent() {
        let mut pcd = MockPcd::with_card(&[0x01, 0x02, 0x03, 0x04]);
        pcd.serial_error = true;
        let mut rfid = reader(pcd);

        assert!(rfid.read_card().is_none());
        assert_eq!(rfid.pcd_mut().count("halt"), 0);
    }

    #[test]
    fn test_read_card_into_buffer() {
        let mut rfid = reader(MockPcd::with_card(&[0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66]));

        let mut buf = [0u8; 10];
        let len = rfid.read_card_into(&mut buf).unwrap();
        assert_eq!(len, 7);
        assert_eq!(&buf[..len], &[0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
    }

    #[test]
    fn test_read_card_into_small_buffer() {
        let mut rfid = reader(MockPcd::with_card(&[0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66]));

        let mut buf = [0u8; 4];
        assert!(rfid.read_card_into(&mut buf).is_none());
        assert_eq!(buf, [0u8; 4]);
    }

    // ===================
    // station tests
    // ===================

    #[test]
    fn test_station_start_shows_waiting() {
        let mut station = CardStation::new(reader(MockPcd::healthy()), panel());

        station.start().unwrap();
        assert!(!station.showing_card());
        assert!(rows_lit(station.panel(), 20..30));
    }

    #[test]
    fn test_station_start_propagates_bring_up_failure() {
        let pcd = MockPcd::new(vec![], vec![]);
        let mut station = CardStation::new(reader(pcd), panel());

        assert!(matches!(station.start(), Err(RfidError::NoCommunication { .. })));
    }

    #[test]
    fn test_station_shows_card_then_returns_to_waiting() {
        let config = StationConfig { card_hold: Duration::from_secs(3) };
        let pcd = MockPcd::with_card(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let mut station = CardStation::with_config(reader(pcd), panel(), config);
        station.start().unwrap();

        let t0 = Instant::now();
        let uid = station.poll_at(t0).unwrap();
        assert_eq!(uid.to_string(), "DE:AD:BE:EF");
        assert!(station.showing_card());
        assert!((0..ssd1306::WIDTH).all(|x| station.panel().pixel(x, 15)));

        // Still inside the hold time
        assert!(station.poll_at(t0 + Duration::from_secs(1)).is_none());
        assert!(station.showing_card());

        assert!(station.poll_at(t0 + Duration::from_secs(3)).is_none());
        assert!(!station.showing_card());
        assert!(!(0..ssd1306::WIDTH).all(|x| station.panel().pixel(x, 15)));
    }

    // ===================
    // driver integration tests
    // ===================

    #[test]
    fn test_reader_over_mfrc522_driver() {
        let chip = FakeChip::with_card(0x92, &[0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
        let mfrc = Mfrc522::new(chip, crate::mfrc522::fake::FakePin::default());
        let mut rfid = RfidReader::with_config(mfrc, ReaderConfig::without_delays());

        let report = rfid.init().unwrap();
        assert_eq!(report, BringUpReport { version: 0x92, self_test_passed: true });

        let uid = rfid.read_card().unwrap();
        assert_eq!(uid.to_string(), "04:11:22:33:44:55:66");
        assert!(rfid.read_card().is_none());

        let (_, rst) = rfid.into_inner().release();
        assert_eq!(rst.levels, vec![false, true]);
    }

    #[test]
    fn test_reader_over_silent_bus() {
        let mfrc = Mfrc522::new(FakeChip::new(0x00), crate::mfrc522::fake::FakePin::default());
        let mut rfid = RfidReader::with_config(mfrc, ReaderConfig::without_delays());

        assert_eq!(rfid.init(), Err(RfidError::NoCommunication { version: 0x00 }));
    }

    #[test]
    fn test_panel_draws_through_embedded_graphics() {
        let mut oled = panel();
        Pixel(Point::new(0, 0), BinaryColor::On).draw(&mut oled).unwrap();
        assert!(oled.pixel(0, 0));
    }
}
