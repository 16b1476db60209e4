//! ESP32 wiring using esp-idf-svc

use esp_idf_svc::hal::gpio::{self, InputPin, Output, OutputPin, PinDriver};
use esp_idf_svc::hal::i2c::{self, I2cConfig, I2cDriver};
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::prelude::*;
use esp_idf_svc::hal::spi::{self, SpiAnyPins, SpiDeviceDriver, SpiDriver, SpiDriverConfig};
use esp_idf_svc::sys::EspError;
use log::info;

use crate::config::PinConfig;
use crate::mfrc522::Mfrc522;
use crate::ssd1306::Ssd1306;
use crate::types::RfidError;

pub type EspMfrc522<'d, RST> = Mfrc522<SpiDeviceDriver<'d, SpiDriver<'d>>, PinDriver<'d, RST, Output>>;
pub type EspSsd1306<'d> = Ssd1306<I2cDriver<'d>>;

// esp_board() picks its GPIOs by type; keep the diagnostics pin map in step
const _: () = {
    let pins = PinConfig::BOARD;
    assert!(pins.rst == 4 && pins.ss == 5);
    assert!(pins.sck == 18 && pins.mosi == 23 && pins.miso == 19);
};

/// Apply esp-idf runtime patches and route `log` records to the serial console
pub fn init_esp_runtime() {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
}

/// MFRC522 on a SPI host. The chip tolerates up to 10 MHz; 4 MHz is safe on breadboards.
pub fn esp_mfrc522<'d, RST: OutputPin>(
    spi: impl Peripheral<P = impl SpiAnyPins> + 'd,
    sck: impl Peripheral<P = impl OutputPin> + 'd,
    mosi: impl Peripheral<P = impl OutputPin> + 'd,
    miso: impl Peripheral<P = impl InputPin> + 'd,
    ss: impl Peripheral<P = impl OutputPin> + 'd,
    rst: impl Peripheral<P = RST> + 'd,
) -> Result<EspMfrc522<'d, RST>, EspError> {
    let driver = SpiDriver::new(spi, sck, mosi, Some(miso), &SpiDriverConfig::new())?;
    let config = spi::config::Config::new().baudrate(4.MHz().into());
    let device = SpiDeviceDriver::new(driver, Some(ss), &config)?;
    let rst = PinDriver::output(rst)?;

    Ok(Mfrc522::new(device, rst))
}

/// SSD1306 on an I2C port at 400 kHz, initialized and ready to draw
pub fn esp_ssd1306<'d>(
    i2c: impl Peripheral<P = impl i2c::I2c> + 'd,
    sda: impl Peripheral<P = impl InputPin + OutputPin> + 'd,
    scl: impl Peripheral<P = impl InputPin + OutputPin> + 'd,
) -> Result<EspSsd1306<'d>, RfidError> {
    let config = I2cConfig::new().baudrate(400.kHz().into());
    let driver = I2cDriver::new(i2c, sda, scl, &config)
        .map_err(|e| RfidError::Bus(format!("{:?}", e)))?;

    let mut oled = Ssd1306::new(driver);
    oled.init()?;
    Ok(oled)
}

/// Reader on VSPI (see [`PinConfig::BOARD`]) and display on I2C0 with SDA=GPIO21, SCL=GPIO22
pub fn esp_board(
    peripherals: Peripherals,
) -> Result<(EspMfrc522<'static, gpio::Gpio4>, EspSsd1306<'static>), RfidError> {
    let pins = peripherals.pins;
    info!("[RFID] Initializing SPI bus...");
    let reader = esp_mfrc522(
        peripherals.spi3,
        pins.gpio18,
        pins.gpio23,
        pins.gpio19,
        pins.gpio5,
        pins.gpio4,
    )
    .map_err(|e| RfidError::Bus(format!("{:?}", e)))?;

    let oled = esp_ssd1306(peripherals.i2c0, pins.gpio21, pins.gpio22)?;
    Ok((reader, oled))
}
