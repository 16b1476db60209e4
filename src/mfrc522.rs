//! Register level MFRC522 driver over an `embedded-hal` SPI device.
//!
//! Only what is needed to find a card and read its UID is implemented:
//! chip init, version and self-test, REQA, anticollision/select for all
//! three cascade levels, and HLTA.

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiDevice;
use log::{debug, trace};
use std::time::{Duration, Instant};

use crate::pcd::Pcd;
use crate::types::{RfidError, Uid, MAX_UID_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    CommandReg = 0x01,
    ComIrqReg = 0x04,
    DivIrqReg = 0x05,
    ErrorReg = 0x06,
    FIFODataReg = 0x09,
    FIFOLevelReg = 0x0A,
    ControlReg = 0x0C,
    BitFramingReg = 0x0D,
    CollReg = 0x0E,
    ModeReg = 0x11,
    TxModeReg = 0x12,
    RxModeReg = 0x13,
    TxControlReg = 0x14,
    TxASKReg = 0x15,
    CRCResultRegHigh = 0x21,
    CRCResultRegLow = 0x22,
    ModWidthReg = 0x24,
    TModeReg = 0x2A,
    TPrescalerReg = 0x2B,
    TReloadRegHigh = 0x2C,
    TReloadRegLow = 0x2D,
    AutoTestReg = 0x36,
    VersionReg = 0x37,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Idle = 0b0000,
    Mem = 0b0001,
    CalcCRC = 0b0011,
    Transceive = 0b1100,
    SoftReset = 0b1111,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PiccCommand {
    ReqA = 0x26,
    CascadeTag = 0x88,
    SelCl1 = 0x93,
    SelCl2 = 0x95,
    SelCl3 = 0x97,
    HltA = 0x50,
}

/// Frame returned by the card: data plus the number of valid bits in the
/// last byte (0 means all 8).
#[derive(Debug)]
struct PiccResponse {
    data: Vec<u8>,
    valid_bits: u8,
}

// ComIrqReg bits
const IRQ_TIMER: u8 = 0x01;
const IRQ_RX_IDLE: u8 = 0x30;
// DivIrqReg bits
const IRQ_CRC: u8 = 0x04;
// ErrorReg bits
const ERR_COLLISION: u8 = 0x08;
const ERR_FATAL: u8 = 0x13;
// SAK bit set while the UID is still incomplete
const SAK_CASCADE: u8 = 0x04;

const COMMAND_TIMEOUT: Duration = Duration::from_millis(36);
const CRC_TIMEOUT: Duration = Duration::from_millis(90);
const SELF_TEST_LEN: usize = 64;

/// Self-test output for MFRC522 version 0.0 (0x90)
const SELF_TEST_V0: [u8; SELF_TEST_LEN] = [
    0x00, 0x87, 0x98, 0x0F, 0x49, 0xFF, 0x07, 0x19, 0xBF, 0x22, 0x30, 0x49, 0x59, 0x63, 0xAD, 0xCA,
    0x7F, 0xE3, 0x4E, 0x03, 0x5C, 0x4E, 0x49, 0x50, 0x47, 0x9A, 0x37, 0x61, 0xE7, 0xE2, 0xC6, 0x2E,
    0x75, 0x5A, 0xED, 0x04, 0x3D, 0x02, 0x4B, 0x78, 0x32, 0xFF, 0x58, 0x3B, 0x7C, 0xE9, 0x00, 0x94,
    0xB4, 0x4A, 0x59, 0x5B, 0xFD, 0xC9, 0x29, 0xDF, 0x35, 0x96, 0x98, 0x9E, 0x4F, 0x30, 0x32, 0x8D,
];

/// Self-test output for MFRC522 version 0x88 (FM17522 clone)
const SELF_TEST_FM17522: [u8; SELF_TEST_LEN] = [
    0x00, 0xD6, 0x78, 0x8C, 0xE2, 0xAA, 0x0C, 0x18, 0x2A, 0xB8, 0x7A, 0x7F, 0xD3, 0x6A, 0xCF, 0x0B,
    0xB1, 0x37, 0x63, 0x4B, 0x69, 0xAE, 0x91, 0xC7, 0xC3, 0x97, 0xAE, 0x77, 0xF4, 0x37, 0xD7, 0x9B,
    0x7C, 0xF5, 0x3C, 0x11, 0x8F, 0x15, 0xC3, 0xD7, 0xC1, 0x5B, 0x00, 0x2A, 0xD0, 0x75, 0xDE, 0x9E,
    0x51, 0x64, 0xAB, 0x3E, 0xE9, 0x15, 0xB5, 0xAB, 0x56, 0x9A, 0x98, 0x82, 0x26, 0xEA, 0x2A, 0x62,
];

/// Self-test output for MFRC522 version 1.0 (0x91)
const SELF_TEST_V1: [u8; SELF_TEST_LEN] = [
    0x00, 0xC6, 0x37, 0xD5, 0x32, 0xB7, 0x57, 0x5C, 0xC2, 0xD8, 0x7C, 0x4D, 0xD9, 0x70, 0xC7, 0x73,
    0x10, 0xE6, 0xD2, 0xAA, 0x5E, 0xA1, 0x3E, 0x5A, 0x14, 0xAF, 0x30, 0x61, 0xC9, 0x70, 0xDB, 0x2E,
    0x64, 0x22, 0x72, 0xB5, 0xBD, 0x65, 0xF4, 0xEC, 0x22, 0xBC, 0xD3, 0x72, 0x35, 0xCD, 0xAA, 0x41,
    0x1F, 0xA7, 0xF3, 0x53, 0x14, 0xDE, 0x7E, 0x02, 0xD9, 0x0F, 0xB5, 0x5E, 0x25, 0x1D, 0x29, 0x79,
];

/// Self-test output for MFRC522 version 2.0 (0x92)
const SELF_TEST_V2: [u8; SELF_TEST_LEN] = [
    0x00, 0xEB, 0x66, 0xBA, 0x57, 0xBF, 0x23, 0x95, 0xD0, 0xE3, 0x0D, 0x3D, 0x27, 0x89, 0x5C, 0xDE,
    0x9D, 0x3B, 0xA7, 0x00, 0x21, 0x5B, 0x89, 0x82, 0x51, 0x3A, 0xEB, 0x02, 0x0C, 0xA5, 0x00, 0x49,
    0x7C, 0x84, 0x4D, 0xB3, 0xCC, 0xD2, 0x1B, 0x81, 0x5D, 0x48, 0x76, 0xD5, 0x71, 0x61, 0x21, 0xA9,
    0x86, 0x96, 0x83, 0x38, 0xCF, 0x9D, 0x5B, 0x6D, 0xDC, 0x15, 0xBA, 0x3E, 0x7D, 0x95, 0x3B, 0x2F,
];

/// Expected self-test output for a version register value, if known
fn self_test_reference(version: u8) -> Option<&'static [u8; SELF_TEST_LEN]> {
    match version {
        0x88 => Some(&SELF_TEST_FM17522),
        0x90 => Some(&SELF_TEST_V0),
        0x91 => Some(&SELF_TEST_V1),
        0x92 => Some(&SELF_TEST_V2),
        _ => None,
    }
}

pub struct Mfrc522<SPI, RST> {
    spi: SPI,
    rst: RST,
}

impl<SPI, RST> Mfrc522<SPI, RST>
where
    SPI: SpiDevice,
    RST: OutputPin,
{
    pub fn new(spi: SPI, rst: RST) -> Self {
        Self { spi, rst }
    }

    pub fn release(self) -> (SPI, RST) {
        (self.spi, self.rst)
    }

    fn read_address(reg: Register) -> u8 {
        0x80 | ((reg as u8) << 1)
    }

    fn write_address(reg: Register) -> u8 {
        (reg as u8) << 1
    }

    pub fn read_register(&mut self, reg: Register) -> Result<u8, RfidError> {
        let mut buf = [Self::read_address(reg), 0x00];
        self.spi
            .transfer_in_place(&mut buf)
            .map_err(|e| RfidError::Bus(format!("{:?}", e)))?;
        Ok(buf[1])
    }

    /// Read `count` bytes from the same register (used to drain the FIFO)
    pub fn read_multiple(&mut self, reg: Register, count: usize) -> Result<Vec<u8>, RfidError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![Self::read_address(reg); count + 1];
        buf[count] = 0x00;
        self.spi
            .transfer_in_place(&mut buf)
            .map_err(|e| RfidError::Bus(format!("{:?}", e)))?;
        buf.remove(0);
        Ok(buf)
    }

    pub fn write_register(&mut self, reg: Register, value: u8) -> Result<(), RfidError> {
        self.write_multiple(reg, &[value])
    }

    pub fn write_multiple(&mut self, reg: Register, values: &[u8]) -> Result<(), RfidError> {
        let mut buf = Vec::with_capacity(values.len() + 1);
        buf.push(Self::write_address(reg));
        buf.extend_from_slice(values);
        self.spi
            .write(&buf)
            .map_err(|e| RfidError::Bus(format!("{:?}", e)))
    }

    fn set_register_bitmask(&mut self, reg: Register, mask: u8) -> Result<(), RfidError> {
        let value = self.read_register(reg)?;
        self.write_register(reg, value | mask)
    }

    fn clear_register_bitmask(&mut self, reg: Register, mask: u8) -> Result<(), RfidError> {
        let value = self.read_register(reg)?;
        self.write_register(reg, value & !mask)
    }

    pub fn soft_reset(&mut self) -> Result<(), RfidError> {
        self.write_register(Register::CommandReg, Command::SoftReset as u8)?;

        // PowerDown stays set until the oscillator is running again
        for _ in 0..3 {
            if self.read_register(Register::CommandReg)? & 0x10 == 0 {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        Ok(())
    }

    fn antenna_on(&mut self) -> Result<(), RfidError> {
        let value = self.read_register(Register::TxControlReg)?;
        if value & 0x03 != 0x03 {
            self.write_register(Register::TxControlReg, value | 0x03)?;
        }
        Ok(())
    }

    fn configure(&mut self) -> Result<(), RfidError> {
        self.soft_reset()?;

        self.write_register(Register::TxModeReg, 0x00)?;
        self.write_register(Register::RxModeReg, 0x00)?;
        self.write_register(Register::ModWidthReg, 0x26)?;

        // Timer: TAuto, f_timer = 40 kHz, reload 1000 => 25 ms receive timeout
        self.write_register(Register::TModeReg, 0x80)?;
        self.write_register(Register::TPrescalerReg, 0xA9)?;
        self.write_register(Register::TReloadRegHigh, 0x03)?;
        self.write_register(Register::TReloadRegLow, 0xE8)?;

        // 100% ASK, CRC preset 0x6363
        self.write_register(Register::TxASKReg, 0x40)?;
        self.write_register(Register::ModeReg, 0x3D)?;

        self.antenna_on()
    }

    /// Compute CRC_A on the chip's coprocessor
    pub fn calculate_crc(&mut self, data: &[u8]) -> Result<[u8; 2], RfidError> {
        self.write_register(Register::CommandReg, Command::Idle as u8)?;
        self.write_register(Register::DivIrqReg, IRQ_CRC)?;
        self.write_register(Register::FIFOLevelReg, 0x80)?;
        self.write_multiple(Register::FIFODataReg, data)?;
        self.write_register(Register::CommandReg, Command::CalcCRC as u8)?;

        let deadline = Instant::now() + CRC_TIMEOUT;
        loop {
            if self.read_register(Register::DivIrqReg)? & IRQ_CRC != 0 {
                self.write_register(Register::CommandReg, Command::Idle as u8)?;
                let low = self.read_register(Register::CRCResultRegLow)?;
                let high = self.read_register(Register::CRCResultRegHigh)?;
                return Ok([low, high]);
            }
            if Instant::now() > deadline {
                return Err(RfidError::Timeout);
            }
        }
    }

    fn transceive(
        &mut self,
        send: &[u8],
        valid_bits: u8,
        check_crc: bool,
    ) -> Result<PiccResponse, RfidError> {
        trace!("[RFID] -> {:02X?} ({} bits in last byte)", send, valid_bits);

        self.write_register(Register::CommandReg, Command::Idle as u8)?;
        self.write_register(Register::ComIrqReg, 0x7F)?;
        self.write_register(Register::FIFOLevelReg, 0x80)?;
        self.write_multiple(Register::FIFODataReg, send)?;
        self.write_register(Register::BitFramingReg, valid_bits & 0x07)?;
        self.write_register(Register::CommandReg, Command::Transceive as u8)?;
        // StartSend
        self.set_register_bitmask(Register::BitFramingReg, 0x80)?;

        let deadline = Instant::now() + COMMAND_TIMEOUT;
        loop {
            let irq = self.read_register(Register::ComIrqReg)?;
            if irq & IRQ_RX_IDLE != 0 {
                break;
            }
            if irq & IRQ_TIMER != 0 || Instant::now() > deadline {
                return Err(RfidError::Timeout);
            }
        }

        let error = self.read_register(Register::ErrorReg)?;
        if error & ERR_FATAL != 0 {
            return Err(RfidError::InvalidResponse(format!(
                "ErrorReg reports 0x{:02X}",
                error
            )));
        }

        let level = self.read_register(Register::FIFOLevelReg)? as usize;
        let data = self.read_multiple(Register::FIFODataReg, level)?;
        let valid_bits = self.read_register(Register::ControlReg)? & 0x07;

        if error & ERR_COLLISION != 0 {
            return Err(RfidError::Collision);
        }

        trace!("[RFID] <- {:02X?}", data);

        if check_crc {
            if data.len() < 3 || valid_bits != 0 {
                return Err(RfidError::InvalidResponse(format!(
                    "Frame too short for CRC_A: {:02X?}",
                    data
                )));
            }
            let (payload, crc) = data.split_at(data.len() - 2);
            if self.calculate_crc(payload)? != crc {
                return Err(RfidError::InvalidResponse("CRC_A mismatch".into()));
            }
        }

        Ok(PiccResponse { data, valid_bits })
    }

    /// Send REQA and return the two ATQA bytes
    pub fn request_a(&mut self) -> Result<[u8; 2], RfidError> {
        // ValuesAfterColl: clear bits received after a collision
        self.clear_register_bitmask(Register::CollReg, 0x80)?;
        let response = self.transceive(&[PiccCommand::ReqA as u8], 7, false)?;

        if response.data.len() != 2 || response.valid_bits != 0 {
            return Err(RfidError::InvalidResponse(format!(
                "ATQA must be 16 bits, got {:02X?}",
                response.data
            )));
        }
        Ok([response.data[0], response.data[1]])
    }

    /// Run anticollision and select over all cascade levels.
    ///
    /// Bit-level collision resolution is not performed; with several cards
    /// in the field this returns [`RfidError::Collision`].
    pub fn select(&mut self) -> Result<Uid, RfidError> {
        let mut uid = Vec::with_capacity(MAX_UID_LEN);

        for level in [PiccCommand::SelCl1, PiccCommand::SelCl2, PiccCommand::SelCl3] {
            self.clear_register_bitmask(Register::CollReg, 0x80)?;

            let anticoll = self.transceive(&[level as u8, 0x20], 0, false)?;
            if anticoll.data.len() != 5 {
                return Err(RfidError::InvalidResponse(format!(
                    "Anticollision response must be 5 bytes, got {:02X?}",
                    anticoll.data
                )));
            }
            let chunk = &anticoll.data[..4];
            let bcc = anticoll.data[4];
            if chunk.iter().fold(0u8, |acc, &b| acc ^ b) != bcc {
                return Err(RfidError::InvalidResponse("UID check byte mismatch".into()));
            }

            let mut frame = vec![level as u8, 0x70];
            frame.extend_from_slice(&anticoll.data);
            let crc = self.calculate_crc(&frame)?;
            frame.extend_from_slice(&crc);

            let sak = self.transceive(&frame, 0, true)?.data[0];

            if sak & SAK_CASCADE != 0 {
                if chunk[0] != PiccCommand::CascadeTag as u8 {
                    return Err(RfidError::InvalidResponse(
                        "UID incomplete but cascade tag missing".into(),
                    ));
                }
                uid.extend_from_slice(&chunk[1..]);
                continue;
            }

            uid.extend_from_slice(chunk);
            debug!("[RFID] Selected card, SAK=0x{:02X}", sak);
            return Uid::new(&uid, sak);
        }

        Err(RfidError::InvalidResponse(
            "UID incomplete after cascade level 3".into(),
        ))
    }

    /// Send HLTA. A card acknowledges HALT by staying silent.
    pub fn halt_a(&mut self) -> Result<(), RfidError> {
        let mut frame = vec![PiccCommand::HltA as u8, 0x00];
        let crc = self.calculate_crc(&frame)?;
        frame.extend_from_slice(&crc);

        match self.transceive(&frame, 0, false) {
            Err(RfidError::Timeout) => Ok(()),
            Ok(_) => Err(RfidError::InvalidResponse("Card answered HLTA".into())),
            Err(e) => Err(e),
        }
    }

    /// Digital self-test from the MFRC522 datasheet, section 16.1.1
    pub fn perform_self_test(&mut self) -> Result<bool, RfidError> {
        self.soft_reset()?;

        // Clear the internal 25 byte buffer
        self.write_register(Register::FIFOLevelReg, 0x80)?;
        self.write_multiple(Register::FIFODataReg, &[0u8; 25])?;
        self.write_register(Register::CommandReg, Command::Mem as u8)?;

        self.write_register(Register::AutoTestReg, 0x09)?;
        self.write_register(Register::FIFODataReg, 0x00)?;
        self.write_register(Register::CommandReg, Command::CalcCRC as u8)?;

        let deadline = Instant::now() + CRC_TIMEOUT;
        while (self.read_register(Register::FIFOLevelReg)? as usize) < SELF_TEST_LEN {
            if Instant::now() > deadline {
                break;
            }
        }
        self.write_register(Register::CommandReg, Command::Idle as u8)?;

        let result = self.read_multiple(Register::FIFODataReg, SELF_TEST_LEN)?;
        self.write_register(Register::AutoTestReg, 0x00)?;

        let version = self.read_register(Register::VersionReg)?;
        let passed = match self_test_reference(version) {
            Some(reference) => result.as_slice() == reference.as_slice(),
            None => {
                debug!("[RFID] No self-test reference for version 0x{:02X}", version);
                false
            }
        };

        // The test leaves the chip in an unusable state
        self.configure()?;
        Ok(passed)
    }
}

impl<SPI, RST> Pcd for Mfrc522<SPI, RST>
where
    SPI: SpiDevice,
    RST: OutputPin,
{
    fn set_reset(&mut self, high: bool) -> Result<(), RfidError> {
        let result = if high {
            self.rst.set_high()
        } else {
            self.rst.set_low()
        };
        result.map_err(|e| RfidError::Bus(format!("{:?}", e)))
    }

    fn init(&mut self) -> Result<(), RfidError> {
        self.configure()
    }

    fn version(&mut self) -> Result<u8, RfidError> {
        self.read_register(Register::VersionReg)
    }

    fn self_test(&mut self) -> Result<bool, RfidError> {
        self.perform_self_test()
    }

    fn is_new_card_present(&mut self) -> Result<bool, RfidError> {
        self.write_register(Register::TxModeReg, 0x00)?;
        self.write_register(Register::RxModeReg, 0x00)?;
        self.write_register(Register::ModWidthReg, 0x26)?;

        match self.request_a() {
            Ok(_) | Err(RfidError::Collision) => Ok(true),
            Err(RfidError::Bus(e)) => Err(RfidError::Bus(e)),
            Err(_) => Ok(false),
        }
    }

    fn read_card_serial(&mut self) -> Result<Uid, RfidError> {
        self.select()
    }

    fn halt(&mut self) -> Result<(), RfidError> {
        self.halt_a()
    }
}
