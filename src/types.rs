//! Types for RFID operations

use std::fmt;

/// Largest UID an ISO 14443-A card can report (triple size).
pub const MAX_UID_LEN: usize = 10;

/// Identifier of a selected card (4, 7 or 10 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uid {
    bytes: [u8; MAX_UID_LEN],
    len: u8,
    sak: u8,
}

impl Uid {
    /// Build a UID from raw bytes and the SAK byte returned on selection.
    pub fn new(bytes: &[u8], sak: u8) -> Result<Self, RfidError> {
        if bytes.len() > MAX_UID_LEN {
            return Err(RfidError::InvalidParameter(format!(
                "UID too long: {} bytes (maximum: {} bytes)",
                bytes.len(),
                MAX_UID_LEN
            )));
        }

        let mut uid = Self {
            bytes: [0; MAX_UID_LEN],
            len: bytes.len() as u8,
            sak,
        };
        uid.bytes[..bytes.len()].copy_from_slice(bytes);
        Ok(uid)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Select acknowledge byte
    pub fn sak(&self) -> u8 {
        self.sak
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&uid_to_string(self.as_bytes()))
    }
}

/// Outcome of a successful chip bring-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BringUpReport {
    /// Value of the chip's version register
    pub version: u8,
    /// Whether the digital self-test passed within the allowed attempts
    pub self_test_passed: bool,
}

/// Errors that can occur during RFID and display operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RfidError {
    /// Bus layer error (SPI, I2C, GPIO)
    Bus(String),
    /// The card or the chip did not answer in time
    Timeout,
    /// More than one card answered at once
    Collision,
    /// Invalid response received from the chip or the card
    InvalidResponse(String),
    /// Invalid parameter passed to a function
    InvalidParameter(String),
    /// The version register read back 0x00 or 0xFF on every attempt
    NoCommunication { version: u8 },
    /// Drawing or flushing the display failed
    Display(String),
}

impl fmt::Display for RfidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RfidError::Bus(msg) => write!(f, "bus error: {}", msg),
            RfidError::Timeout => f.write_str("timed out waiting for the card"),
            RfidError::Collision => f.write_str("card collision"),
            RfidError::InvalidResponse(msg) => write!(f, "invalid response: {}", msg),
            RfidError::InvalidParameter(msg) => write!(f, "invalid parameter: {}", msg),
            RfidError::NoCommunication { version } => {
                write!(f, "no communication with reader (version register 0x{:02X})", version)
            }
            RfidError::Display(msg) => write!(f, "display error: {}", msg),
        }
    }
}

impl std::error::Error for RfidError {}

/// Convert UID bytes to colon separated uppercase hex, e.g. `04:A1:0B:FF`
pub fn uid_to_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}
