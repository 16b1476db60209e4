//! Status screens for a 128x64 monochrome panel.
//!
//! Two screens exist: the waiting prompt shown while no card is in the
//! field, and the card screen with the UID of the last card read. All text
//! uses a 6x10 mono font anchored at its top-left corner.
//!
//! # Card screen layout
//!
//! ```text
//! y=5   |        RFID Card        |   centered title
//! y=15  |-------------------------|   separator
//! y=25  |UID:                     |
//! y=40  |04:A1:0B:FF              |   whole UID if <= 20 chars
//! y=50  |                         |   second half of a long UID
//! ```

use core::fmt::Debug;

use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Line, PrimitiveStyle};
use embedded_graphics::text::renderer::TextRenderer;
use embedded_graphics::text::{Baseline, Text};

use crate::types::RfidError;

const SCREEN_WIDTH: i32 = 128;

/// Longest UID string drawn on a single line
const MAX_LINE_CHARS: usize = 20;
/// How far past the midpoint a colon is searched for when splitting
const SPLIT_SEARCH: usize = 5;

const CARD_TITLE: &str = "RFID Card";
const CARD_TITLE_Y: i32 = 5;
const SEPARATOR_Y: i32 = 15;
const UID_LABEL_Y: i32 = 25;
const UID_LINE1_Y: i32 = 40;
const UID_LINE2_Y: i32 = 50;

const WAITING_TITLE: &str = "Waiting for";
const WAITING_SUBTITLE: &str = "RFID Card...";
const WAITING_TITLE_Y: i32 = 20;
const WAITING_SUBTITLE_Y: i32 = 35;

const TEXT_STYLE: MonoTextStyle<'static, BinaryColor> = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);

/// A monochrome draw target whose contents only show up after `flush`
pub trait Panel: DrawTarget<Color = BinaryColor> {
    fn flush(&mut self) -> Result<(), RfidError>;
}

/// Width of `text` in pixels when drawn in the screen font
pub fn text_width(text: &str) -> u32 {
    TEXT_STYLE
        .measure_string(text, Point::zero(), Baseline::Top)
        .bounding_box
        .size
        .width
}

/// X position that centers `text` horizontally on the screen
pub fn centered_x(text: &str) -> i32 {
    (SCREEN_WIDTH - text_width(text) as i32) / 2
}

/// Split a UID string for display.
///
/// Strings of up to 20 characters stay on one line. Longer ones are split
/// right after the first colon found within 5 characters from the midpoint,
/// or exactly at the midpoint when there is none.
pub fn split_uid(uid: &str) -> (&str, Option<&str>) {
    let len = uid.len();
    if len <= MAX_LINE_CHARS {
        return (uid, None);
    }

    let mid = len / 2;
    let end = len.min(mid + SPLIT_SEARCH);
    let split = uid.as_bytes()[mid..end]
        .iter()
        .position(|&b| b == b':')
        .map(|offset| mid + offset + 1)
        .unwrap_or_else(|| {
            // Only matters for non-ASCII input; UID strings never need it
            (mid..=len).find(|&i| uid.is_char_boundary(i)).unwrap_or(len)
        });

    let (first, second) = uid.split_at(split);
    (first, Some(second))
}

/// Paint the card screen for a UID string and flush it
pub fn show_card<D>(panel: &mut D, uid: &str) -> Result<(), RfidError>
where
    D: Panel,
    D::Error: Debug,
{
    panel.clear(BinaryColor::Off).map_err(draw_error)?;

    draw_centered(panel, CARD_TITLE, CARD_TITLE_Y)?;

    Line::new(Point::new(0, SEPARATOR_Y), Point::new(SCREEN_WIDTH, SEPARATOR_Y))
        .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 1))
        .draw(panel)
        .map_err(draw_error)?;

    draw_text(panel, "UID:", 0, UID_LABEL_Y)?;

    let (first, second) = split_uid(uid);
    draw_text(panel, first, 0, UID_LINE1_Y)?;
    if let Some(second) = second {
        draw_text(panel, second, 0, UID_LINE2_Y)?;
    }

    panel.flush()
}

/// Paint the "Waiting for RFID Card..." prompt and flush it
pub fn show_waiting<D>(panel: &mut D) -> Result<(), RfidError>
where
    D: Panel,
    D::Error: Debug,
{
    panel.clear(BinaryColor::Off).map_err(draw_error)?;
    draw_centered(panel, WAITING_TITLE, WAITING_TITLE_Y)?;
    draw_centered(panel, WAITING_SUBTITLE, WAITING_SUBTITLE_Y)?;
    panel.flush()
}

fn draw_centered<D>(panel: &mut D, text: &str, y: i32) -> Result<(), RfidError>
where
    D: Panel,
    D::Error: Debug,
{
    draw_text(panel, text, centered_x(text), y)
}

fn draw_text<D>(panel: &mut D, text: &str, x: i32, y: i32) -> Result<(), RfidError>
where
    D: Panel,
    D::Error: Debug,
{
    Text::with_baseline(text, Point::new(x, y), TEXT_STYLE, Baseline::Top)
        .draw(panel)
        .map(|_| ())
        .map_err(draw_error)
}

fn draw_error<E: Debug>(e: E) -> RfidError {
    RfidError::Display(format!("{:?}", e))
}
