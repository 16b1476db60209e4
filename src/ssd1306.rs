//! SSD1306 128x64 OLED over I2C with an in-RAM framebuffer.
//!
//! Drawing only touches the framebuffer; [`Panel::flush`] sends the whole
//! buffer to the display in horizontal addressing mode.

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PointsIter, Rectangle};
use embedded_hal::i2c::I2c;
use log::debug;

use crate::display::Panel;
use crate::types::RfidError;

pub(crate) const WIDTH: usize = 128;
pub(crate) const HEIGHT: usize = 64;
const BUFFER_SIZE: usize = WIDTH * HEIGHT / 8;

/// Default 7-bit address (SA0 low)
const DEFAULT_ADDRESS: u8 = 0x3C;

// Control bytes
const CONTROL_COMMAND: u8 = 0x00;
const CONTROL_DATA: u8 = 0x40;

// Commands
const DISPLAY_OFF: u8 = 0xAE;
const DISPLAY_ON: u8 = 0xAF;
const SET_CLOCK_DIV: u8 = 0xD5;
const SET_MULTIPLEX: u8 = 0xA8;
const SET_DISPLAY_OFFSET: u8 = 0xD3;
const SET_START_LINE: u8 = 0x40;
const CHARGE_PUMP: u8 = 0x8D;
const MEMORY_MODE: u8 = 0x20;
const SEG_REMAP: u8 = 0xA1;
const COM_SCAN_DEC: u8 = 0xC8;
const SET_COM_PINS: u8 = 0xDA;
const SET_CONTRAST: u8 = 0x81;
const SET_PRECHARGE: u8 = 0xD9;
const SET_VCOM_DETECT: u8 = 0xDB;
const DISPLAY_ALL_ON_RESUME: u8 = 0xA4;
const NORMAL_DISPLAY: u8 = 0xA6;
const COLUMN_ADDR: u8 = 0x21;
const PAGE_ADDR: u8 = 0x22;

// Data bytes per I2C write during flush
const FLUSH_CHUNK: usize = 32;

pub struct Ssd1306<I2C> {
    i2c: I2C,
    address: u8,
    buffer: [u8; BUFFER_SIZE],
}

impl<I2C: I2c> Ssd1306<I2C> {
    /// Panel at the usual 0x3C address
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self {
            i2c,
            address,
            buffer: [0; BUFFER_SIZE],
        }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    /// Power up the panel with the internal charge pump (3.3V modules)
    pub fn init(&mut self) -> Result<(), RfidError> {
        debug!("[OLED] Initializing SSD1306 at 0x{:02X}", self.address);
        let sequence: &[&[u8]] = &[
            &[DISPLAY_OFF],
            &[SET_CLOCK_DIV, 0x80],
            &[SET_MULTIPLEX, (HEIGHT - 1) as u8],
            &[SET_DISPLAY_OFFSET, 0x00],
            &[SET_START_LINE],
            &[CHARGE_PUMP, 0x14],
            &[MEMORY_MODE, 0x00],
            &[SEG_REMAP],
            &[COM_SCAN_DEC],
            &[SET_COM_PINS, 0x12],
            &[SET_CONTRAST, 0xCF],
            &[SET_PRECHARGE, 0xF1],
            &[SET_VCOM_DETECT, 0x40],
            &[DISPLAY_ALL_ON_RESUME],
            &[NORMAL_DISPLAY],
            &[DISPLAY_ON],
        ];
        for command in sequence {
            self.command(command)?;
        }
        Ok(())
    }

    /// Whether the framebuffer pixel at (x, y) is lit
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        if x >= WIDTH || y >= HEIGHT {
            return false;
        }
        self.buffer[x + (y / 8) * WIDTH] & (1 << (y % 8)) != 0
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    fn set_pixel(&mut self, x: i32, y: i32, on: bool) {
        if x < 0 || y < 0 || x >= WIDTH as i32 || y >= HEIGHT as i32 {
            return;
        }
        let (x, y) = (x as usize, y as usize);
        let idx = x + (y / 8) * WIDTH;
        let bit = 1 << (y % 8);
        if on {
            self.buffer[idx] |= bit;
        } else {
            self.buffer[idx] &= !bit;
        }
    }

    fn command(&mut self, bytes: &[u8]) -> Result<(), RfidError> {
        let mut frame = Vec::with_capacity(bytes.len() + 1);
        frame.push(CONTROL_COMMAND);
        frame.extend_from_slice(bytes);
        self.i2c
            .write(self.address, &frame)
            .map_err(|e| RfidError::Bus(format!("{:?}", e)))
    }
}

impl<I2C: I2c> Panel for Ssd1306<I2C> {
    fn flush(&mut self) -> Result<(), RfidError> {
        self.command(&[COLUMN_ADDR, 0, (WIDTH - 1) as u8])?;
        self.command(&[PAGE_ADDR, 0, (HEIGHT / 8 - 1) as u8])?;

        let mut frame = [0u8; FLUSH_CHUNK + 1];
        frame[0] = CONTROL_DATA;
        for chunk in self.buffer.chunks(FLUSH_CHUNK) {
            frame[1..=chunk.len()].copy_from_slice(chunk);
            self.i2c
                .write(self.address, &frame[..=chunk.len()])
                .map_err(|e| RfidError::Bus(format!("{:?}", e)))?;
        }
        Ok(())
    }
}

impl<I2C> OriginDimensions for Ssd1306<I2C> {
    fn size(&self) -> Size {
        Size::new(WIDTH as u32, HEIGHT as u32)
    }
}

impl<I2C: I2c> DrawTarget for Ssd1306<I2C> {
    type Color = BinaryColor;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.set_pixel(point.x, point.y, color.is_on());
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let area = area.intersection(&self.bounding_box());
        for point in area.points() {
            self.set_pixel(point.x, point.y, color.is_on());
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        let fill = if color.is_on() { 0xFF } else { 0x00 };
        self.buffer.fill(fill);
        Ok(())
    }
}
