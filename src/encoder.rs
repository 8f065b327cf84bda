// MIT License
// Copyright (c) 2025 Gianluca Cannata <gcannata23@gmail.com>
//
// av-gif-codec - A GIF decoder and encoder written in Rust
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::time::Duration;

use tracing::debug;

use crate::elements::{
    ColorTable, GraphicsControlExtension, Header, ImageDescriptor, LogicalScreenDescriptor, Rgb,
    MAX_DELAY_TIME,
};
use crate::error::Result;
use crate::raster::{PixelSource, Raster, TRANSPARENT};
use crate::writer::GifWriter;

/// Delay used for frames added without one.
pub const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(100);

/// Most colors one image can carry next to the transparent entry.
pub const MAX_BATCH_COLORS: usize = 255;

/// Fills index 0, the transparent entry, of every local table.
const PLACEHOLDER: Rgb = Rgb::new(0xFF, 0x00, 0xFF);

/// Disposal method 1: leave the image in place for the next one.
const DO_NOT_DISPOSE: u8 = 1;

/// Animated GIF encoder.
///
/// Every frame is composited onto the image the viewer already shows: only
/// pixels that changed are written, all other pixels are transparent, and
/// frames with more than 255 distinct colors are written as several stacked
/// images sharing one bounding box.
///
/// ```no_run
/// # fn run() -> gif::Result<()> {
/// use gif::{Encoder, Raster};
///
/// let file = std::fs::File::create("out.gif")?;
/// let mut encoder = Encoder::new(64, 64, file)?;
/// encoder.start_repetition(0)?;
/// encoder.add_frame(&Raster::new(64, 64), None)?;
/// encoder.finish()?;
/// # Ok(())
/// # }
/// ```
pub struct Encoder<W: Write> {
    writer: GifWriter<W>,
    previous: Raster,
    frame_count: usize,
}

/// Inclusive bounding box of the pixels that changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bounds {
    left: u16,
    top: u16,
    right: u16,
    bottom: u16,
}

impl Bounds {
    fn at(x: u16, y: u16) -> Self {
        Bounds {
            left: x,
            top: y,
            right: x,
            bottom: y,
        }
    }

    fn extend(&mut self, x: u16, y: u16) {
        self.left = self.left.min(x);
        self.top = self.top.min(y);
        self.right = self.right.max(x);
        self.bottom = self.bottom.max(y);
    }

    fn width(&self) -> u16 {
        self.right - self.left + 1
    }

    fn height(&self) -> u16 {
        self.bottom - self.top + 1
    }
}

impl<W: Write> Encoder<W> {
    /// Writes the GIF89a header and a logical screen without global color
    /// table. The previous frame starts fully transparent.
    pub fn new(width: u16, height: u16, output: W) -> Result<Self> {
        let screen = LogicalScreenDescriptor::new(width, height)?;
        let mut writer = GifWriter::new(output);
        writer.write_header(&Header::new("89a")?)?;
        writer.write_logical_screen_descriptor(&screen)?;

        Ok(Encoder {
            writer,
            previous: Raster::new(width, height),
            frame_count: 0,
        })
    }

    /// Makes viewers loop the animation, `repetitions` of 0 loops forever.
    /// Call it before the first frame.
    pub fn start_repetition(&mut self, repetitions: u16) -> Result<()> {
        self.writer.write_netscape_repetitions(repetitions)
    }

    /// Everything shown so far, composited.
    pub fn previous_frame(&self) -> &Raster {
        &self.previous
    }

    /// Appends a frame shown for `delay`, or [`DEFAULT_FRAME_DELAY`].
    ///
    /// The frame is placed at the origin of the screen without scaling, parts
    /// outside the screen are dropped. Pixels with an alpha of at least 0x80
    /// are opaque, all others transparent.
    pub fn add_frame(&mut self, frame: &impl PixelSource, delay: Option<Duration>) -> Result<()> {
        let delay = delay_time(delay.unwrap_or(DEFAULT_FRAME_DELAY));
        let (changes, bounds) = self.difference(frame);

        match bounds {
            None => self.write_unchanged(delay)?,
            Some(bounds) => self.write_changes(&changes, bounds, delay)?,
        }
        self.frame_count += 1;
        Ok(())
    }

    /// Writes the trailer, flushes and returns the sink.
    pub fn finish(mut self) -> Result<W> {
        self.writer.write_trailer()?;
        self.writer.flush()?;
        debug!("encoder: finished after {} frames", self.frame_count);
        Ok(self.writer.into_inner())
    }

    /// Composites `frame` onto the previous frame. Returns the changed
    /// pixels, transparent everywhere else, and their bounding box.
    fn difference(&mut self, frame: &impl PixelSource) -> (Raster, Option<Bounds>) {
        let width = self.previous.width();
        let height = self.previous.height();
        let mut changes = Raster::new(width, height);
        let mut bounds: Option<Bounds> = None;

        for y in 0..height {
            for x in 0..width {
                let inside = u32::from(x) < frame.width() && u32::from(y) < frame.height();
                let argb = if inside {
                    opaque_or_transparent(frame.argb(x.into(), y.into()))
                } else {
                    TRANSPARENT
                };

                if argb == self.previous.get(x, y) || argb == TRANSPARENT {
                    continue;
                }
                self.previous.set(x, y, argb);
                changes.set(x, y, argb);
                match bounds.as_mut() {
                    Some(b) => b.extend(x, y),
                    None => bounds = Some(Bounds::at(x, y)),
                }
            }
        }
        (changes, bounds)
    }

    /// A frame identical to the previous one still needs an image to carry
    /// its delay: a single transparent pixel.
    fn write_unchanged(&mut self, delay: u16) -> Result<()> {
        let table = ColorTable::new(vec![PLACEHOLDER, Rgb::new(0, 0, 0)])?;
        let descriptor = ImageDescriptor::new(0, 0, 1, 1)?.with_local_color_table(table.len())?;

        self.writer
            .write_graphics_control_extension(&GraphicsControlExtension::new(
                DO_NOT_DISPOSE,
                false,
                delay,
                true,
                0,
            )?)?;
        self.writer.write_image_descriptor(&descriptor)?;
        self.writer.write_color_table(&table)?;
        self.writer.write_image_data(table.len(), &[0])?;
        debug!("encoder: frame {} unchanged", self.frame_count);
        Ok(())
    }

    fn write_changes(&mut self, changes: &Raster, bounds: Bounds, delay: u16) -> Result<()> {
        let mut cropped = Vec::with_capacity(usize::from(bounds.width()) * usize::from(bounds.height()));
        for y in bounds.top..=bounds.bottom {
            for x in bounds.left..=bounds.right {
                cropped.push(changes.get(x, y));
            }
        }

        let colors = distinct_colors(&cropped);
        let batches = colors.chunks(MAX_BATCH_COLORS).count();
        debug!(
            "encoder: frame {} changes {}x{} at ({}, {}), {} colors in {} images",
            self.frame_count,
            bounds.width(),
            bounds.height(),
            bounds.left,
            bounds.top,
            colors.len(),
            batches
        );

        for (i, batch) in colors.chunks(MAX_BATCH_COLORS).enumerate() {
            let lookup: HashMap<u32, u8> = batch
                .iter()
                .enumerate()
                .map(|(index, &argb)| (argb, (index + 1) as u8))
                .collect();
            let indices: Vec<u8> = cropped
                .iter()
                .map(|argb| lookup.get(argb).copied().unwrap_or(0))
                .collect();

            let table = batch_table(batch)?;
            let descriptor = ImageDescriptor::new(bounds.left, bounds.top, bounds.width(), bounds.height())?
                .with_local_color_table(table.len())?;
            let batch_delay = if i + 1 == batches { delay } else { 0 };

            self.writer
                .write_graphics_control_extension(&GraphicsControlExtension::new(
                    DO_NOT_DISPOSE,
                    false,
                    batch_delay,
                    true,
                    0,
                )?)?;
            self.writer.write_image_descriptor(&descriptor)?;
            self.writer.write_color_table(&table)?;
            self.writer.write_image_data(table.len(), &indices)?;
        }
        Ok(())
    }
}

/// Snaps alpha to fully opaque or fully transparent.
fn opaque_or_transparent(argb: u32) -> u32 {
    if argb >> 24 >= 0x80 {
        argb | 0xFF00_0000
    } else {
        TRANSPARENT
    }
}

/// Opaque colors of `pixels` in order of first appearance.
fn distinct_colors(pixels: &[u32]) -> Vec<u32> {
    let mut seen = HashSet::new();
    let mut colors = Vec::new();
    for &argb in pixels.iter().filter(|&&p| p != TRANSPARENT) {
        if seen.insert(argb) {
            colors.push(argb);
        }
    }
    colors
}

/// Local table holding the placeholder followed by `batch`, padded with
/// black up to a legal table size.
fn batch_table(batch: &[u32]) -> Result<ColorTable> {
    let mut colors = vec![PLACEHOLDER];
    colors.extend(batch.iter().map(|&argb| Rgb::from_argb(argb)));
    let size = ColorTable::table_size_for(colors.len()).unwrap_or(256);
    colors.resize(size, Rgb::new(0, 0, 0));
    ColorTable::new(colors)
}

/// Centiseconds, rounded to nearest with ties to even and clamped to what a
/// Graphics Control Extension can hold.
fn delay_time(delay: Duration) -> u16 {
    const MICROS_PER_CENTISECOND: u128 = 10_000;
    let micros = delay.as_micros();
    let mut centiseconds = micros / MICROS_PER_CENTISECOND;
    let remainder = micros % MICROS_PER_CENTISECOND;
    let half = MICROS_PER_CENTISECOND / 2;
    if remainder > half || (remainder == half && centiseconds % 2 == 1) {
        centiseconds += 1;
    }
    centiseconds.min(u128::from(MAX_DELAY_TIME)) as u16
}
