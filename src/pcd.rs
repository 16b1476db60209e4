use std::time::Duration;

use crate::types::{RfidError, Uid};

/// Trait for proximity coupling device backends (the reader chip).
/// Implement this trait for different chips or for test doubles.
pub trait Pcd {
    /// Drive the hardware reset line (`false` holds the chip in reset)
    fn set_reset(&mut self, high: bool) -> Result<(), RfidError>;

    /// Soft reset and configure the chip for ISO 14443-A
    fn init(&mut self) -> Result<(), RfidError>;

    /// Read the version register
    fn version(&mut self) -> Result<u8, RfidError>;

    /// Run the chip's digital self-test. The chip must be usable again afterwards.
    fn self_test(&mut self) -> Result<bool, RfidError>;

    /// Check for a card in the field without blocking
    fn is_new_card_present(&mut self) -> Result<bool, RfidError>;

    /// Select the card that answered the last presence check and return its UID
    fn read_card_serial(&mut self) -> Result<Uid, RfidError>;

    /// Put the selected card into HALT state
    fn halt(&mut self) -> Result<(), RfidError>;

    /// Block for `duration` between bring-up steps
    fn pause(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
