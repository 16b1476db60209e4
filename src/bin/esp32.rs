//! Firmware entry point: bring the reader up, then poll and paint forever.

use std::time::Duration;

use esp_idf_svc::hal::peripherals::Peripherals;
use log::info;
use nami_rfid::{CardStation, RfidError, RfidReader, esp_board, init_esp_runtime};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> Result<(), RfidError> {
    init_esp_runtime();

    let peripherals = Peripherals::take().map_err(|e| RfidError::Bus(format!("{:?}", e)))?;
    let (mfrc522, oled) = esp_board(peripherals)?;
    let mut station = CardStation::new(RfidReader::new(mfrc522), oled);

    let report = station.start()?;
    info!("[RFID] Chip version 0x{:02X}, polling every {:?}", report.version, POLL_INTERVAL);

    loop {
        station.poll();
        std::thread::sleep(POLL_INTERVAL);
    }
}
