// MIT License
// Copyright (c) 2025 Gianluca Cannata <gcannata23@gmail.com>
//
// av-gif-codec - A GIF decoder and encoder written in Rust
use crate::error::{out_of_range, Result};

/// Fully transparent ARGB pixel.
pub const TRANSPARENT: u32 = 0x0000_0000;

/// Anything the encoder can read a frame from.
pub trait PixelSource {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Pixel at `(x, y)` as `0xAARRGGBB`. Only called inside the bounds.
    fn argb(&self, x: u32, y: u32) -> u32;
}

/// Row-major ARGB pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    width: u16,
    height: u16,
    pixels: Vec<u32>,
}

impl Raster {
    /// Fully transparent raster.
    pub fn new(width: u16, height: u16) -> Self {
        Raster {
            width,
            height,
            pixels: vec![TRANSPARENT; width as usize * height as usize],
        }
    }

    pub fn from_pixels(width: u16, height: u16, pixels: Vec<u32>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(out_of_range("pixel count", pixels.len() as i64));
        }
        Ok(Raster {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// # Panics
    ///
    /// If `(x, y)` lies outside the raster.
    pub fn get(&self, x: u16, y: u16) -> u32 {
        self.pixels[self.offset(x, y)]
    }

    /// # Panics
    ///
    /// If `(x, y)` lies outside the raster.
    pub fn set(&mut self, x: u16, y: u16, argb: u32) {
        let offset = self.offset(x, y);
        self.pixels[offset] = argb;
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u32> {
        self.pixels
    }

    fn offset(&self, x: u16, y: u16) -> usize {
        assert!(x < self.width && y < self.height, "pixel ({}, {}) out of bounds", x, y);
        y as usize * self.width as usize + x as usize
    }
}

impl PixelSource for Raster {
    fn width(&self) -> u32 {
        self.width.into()
    }

    fn height(&self) -> u32 {
        self.height.into()
    }

    fn argb(&self, x: u32, y: u32) -> u32 {
        self.pixels[y as usize * self.width as usize + x as usize]
    }
}

/// Order in which the rows of an interlaced image are stored: every 8th row
/// from 0, every 8th from 4, every 4th from 2, then every 2nd from 1.
pub fn interlaced_rows(height: usize) -> impl Iterator<Item = usize> {
    (0..height)
        .step_by(8)
        .chain((4..height).step_by(8))
        .chain((2..height).step_by(4))
        .chain((1..height).step_by(2))
}
