use core::fmt::Debug;
use log::{info, warn};
use std::time::Instant;

use crate::config::StationConfig;
use crate::display::{self, Panel};
use crate::pcd::Pcd;
use crate::reader::RfidReader;
use crate::types::{BringUpReport, RfidError, Uid};

/// Reader plus status panel: the firmware's polling loop.
///
/// Shows the waiting prompt until a card is read, then the card screen for
/// `card_hold` before going back to the prompt. A new card replaces the
/// card screen right away.
pub struct CardStation<P: Pcd, D: Panel> {
    reader: RfidReader<P>,
    panel: D,
    config: StationConfig,
    card_shown_at: Option<Instant>,
}

impl<P, D> CardStation<P, D>
where
    P: Pcd,
    D: Panel,
    D::Error: Debug,
{
    pub fn new(reader: RfidReader<P>, panel: D) -> Self {
        Self::with_config(reader, panel, StationConfig::default())
    }

    pub fn with_config(reader: RfidReader<P>, panel: D, config: StationConfig) -> Self {
        Self {
            reader,
            panel,
            config,
            card_shown_at: None,
        }
    }

    /// Bring the reader up and show the waiting prompt
    pub fn start(&mut self) -> Result<BringUpReport, RfidError> {
        let report = self.reader.init()?;
        self.show_waiting()?;
        Ok(report)
    }

    /// One polling pass.
    ///
    /// # Returns
    /// The UID of a card read during this pass, if any. Display errors are
    /// logged and do not hide the UID.
    pub fn poll(&mut self) -> Option<Uid> {
        self.poll_at(Instant::now())
    }

    pub(crate) fn poll_at(&mut self, now: Instant) -> Option<Uid> {
        if let Some(uid) = self.reader.read_card() {
            let text = uid.to_string();
            info!("[RFID] Card detected! UID: {}", text);
            if let Err(e) = display::show_card(&mut self.panel, &text) {
                warn!("[OLED] Could not show card: {}", e);
            }
            self.card_shown_at = Some(now);
            return Some(uid);
        }

        if self.hold_expired(now) {
            self.card_shown_at = None;
            if let Err(e) = self.show_waiting() {
                warn!("[OLED] Could not show waiting screen: {}", e);
            }
        }
        None
    }

    /// Whether the card screen is currently up
    pub fn showing_card(&self) -> bool {
        self.card_shown_at.is_some()
    }

    pub fn panel(&self) -> &D {
        &self.panel
    }

    fn hold_expired(&self, now: Instant) -> bool {
        self.card_shown_at
            .is_some_and(|shown| now.saturating_duration_since(shown) >= self.config.card_hold)
    }

    fn show_waiting(&mut self) -> Result<(), RfidError> {
        display::show_waiting(&mut self.panel)
    }
}
