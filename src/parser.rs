// MIT License
// Copyright (c) 2025 Gianluca Cannata <gcannata23@gmail.com>
//
// av-gif-codec - A GIF decoder and encoder written in Rust
use std::collections::VecDeque;
use std::io::{self, Read};
use std::iter::FusedIterator;

use av_data::rational::Rational32;
use nom::bytes::complete::{tag, take};
use nom::combinator::{map, rest};
use nom::number::complete::{le_u16, le_u8};
use nom::sequence::preceded;
use nom::{IResult, Parser};
use tracing::{debug, trace, warn};

use crate::bits::{read_full, read_sub_blocks};
use crate::elements::{
    ApplicationExtension, ColorTable, Comment, DecodeIssue, Diagnostic, Element,
    GraphicsControlExtension, Header, ImageDescriptor, LogicalScreenDescriptor,
    APPLICATION_EXTENSION_LABEL, COMMENT_EXTENSION_LABEL, EXTENSION_INTRODUCER_ID,
    GRAPHIC_CONTROL_EXTENSION_LABEL, IMAGE_DESCRIPTOR_BLOCK_ID, TRAILER_BLOCK_ID,
};
use crate::lzw::{self, LzwError};
use crate::raster::{interlaced_rows, Raster};

const HEADER_LEN: usize = 6;
const SCREEN_DESCRIPTOR_LEN: usize = 7;
const IMAGE_DESCRIPTOR_LEN: usize = 9;

/// Largest image, in pixels, a [`Decoder`] turns into a [`Raster`] unless
/// told otherwise. 8192 x 8192 ARGB pixels take 256 MiB.
pub const DEFAULT_PIXEL_LIMIT: usize = 1 << 26;

type Fatal = Diagnostic;

/// Where the parser stands in the block grammar.
#[derive(Debug)]
enum State {
    Header,
    ScreenDescriptor,
    GlobalColorTable(usize),
    Blocks,
    LocalColorTable(ImageDescriptor),
    ImageData(ImageDescriptor, Option<ColorTable>),
    Done,
}

/// Lazy, forward-only sequence of the [`Element`]s of a GIF stream.
///
/// Each call to `next` reads only as much of the input as the next element
/// needs. Problems in the stream are yielded in line: a
/// [`Element::DecoderWarning`] lets decoding go on, a
/// [`Element::DecoderError`] is always the last element.
pub struct Decoder<R: Read> {
    reader: R,
    state: State,
    global_color_table: Option<ColorTable>,
    pending: VecDeque<Element>,
    pixel_limit: usize,
}

/// Starts decoding the GIF held by `reader`.
pub fn decode<R: Read>(reader: R) -> Decoder<R> {
    Decoder::new(reader)
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Decoder {
            reader,
            state: State::Header,
            global_color_table: None,
            pending: VecDeque::new(),
            pixel_limit: DEFAULT_PIXEL_LIMIT,
        }
    }

    /// Caps the pixel count of any single image. A larger image descriptor
    /// ends decoding with an [`DecodeIssue::ImageTooLarge`] error instead of
    /// allocating its raster.
    pub fn with_pixel_limit(mut self, limit: usize) -> Self {
        self.pixel_limit = limit;
        self
    }

    /// Gives the reader back, positioned wherever decoding stopped.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn emit(&mut self, element: Element) {
        trace!("parser: {}", element.name());
        self.pending.push_back(element);
    }

    fn warn(&mut self, diagnostic: Diagnostic) {
        warn!("parser: {}", diagnostic);
        self.pending.push_back(Element::DecoderWarning(diagnostic));
    }

    fn step(&mut self) -> Result<(), Fatal> {
        match std::mem::replace(&mut self.state, State::Done) {
            State::Header => self.read_header(),
            State::ScreenDescriptor => self.read_screen_descriptor(),
            State::GlobalColorTable(size) => {
                let bytes = self.read_fixed(3 * size, DecodeIssue::TruncatedGlobalColorTable)?;
                let table = ColorTable::from_rgb_bytes(&bytes).map_err(invalid_record)?;
                self.global_color_table = Some(table.clone());
                self.emit(Element::GlobalColorTable(table));
                self.state = State::Blocks;
                Ok(())
            }
            State::Blocks => self.read_block(),
            State::LocalColorTable(descriptor) => {
                let bytes = self.read_fixed(
                    3 * descriptor.size_of_local_color_table(),
                    DecodeIssue::TruncatedLocalColorTable,
                )?;
                let table = ColorTable::from_rgb_bytes(&bytes).map_err(invalid_record)?;
                self.emit(Element::LocalColorTable(table.clone()));
                self.state = State::ImageData(descriptor, Some(table));
                Ok(())
            }
            State::ImageData(descriptor, local) => self.read_image_data(descriptor, local),
            State::Done => Ok(()),
        }
    }

    fn read_header(&mut self) -> Result<(), Fatal> {
        let mut bytes = [0u8; HEADER_LEN];
        let read = read_full(&mut self.reader, &mut bytes).map_err(read_failed)?;
        let version = match signature(&bytes[..read]) {
            Ok((_, version)) => latin1(version),
            Err(_) => {
                return Err(Diagnostic::new(DecodeIssue::HeaderNotFound)
                    .with("Header", bytes[..read].to_vec()))
            }
        };
        let header = Header::new(&version).map_err(invalid_record)?;
        self.emit(Element::Header(header));
        self.state = State::ScreenDescriptor;
        Ok(())
    }

    fn read_screen_descriptor(&mut self) -> Result<(), Fatal> {
        let bytes = self.read_fixed(
            SCREEN_DESCRIPTOR_LEN,
            DecodeIssue::TruncatedLogicalScreenDescriptor,
        )?;
        let (_, fields) = screen_descriptor(&bytes).map_err(invalid_record)?;

        let has_global_table = fields.packed & 0b1000_0000 != 0;
        let aspect = match fields.pixel_aspect_ratio {
            0 => None,
            value => Some(Rational32::new(i32::from(value) + 15, 64)),
        };
        let mut screen = LogicalScreenDescriptor::new(fields.width, fields.height)
            .and_then(|s| s.with_color_resolution(((fields.packed & 0b0111_0000) >> 4) + 1))
            .and_then(|s| s.with_pixel_aspect_ratio(aspect))
            .map_err(invalid_record)?
            .with_sort_flag(fields.packed & 0b0000_1000 != 0);

        let mut next = State::Blocks;
        if has_global_table {
            let size = table_size(fields.packed);
            screen = screen
                .with_global_color_table(size, fields.background_color_index)
                .map_err(invalid_record)?;
            next = State::GlobalColorTable(size);
        } else if fields.background_color_index != 0 {
            self.warn(
                Diagnostic::new(DecodeIssue::BackgroundWithoutGlobalTable(
                    fields.background_color_index,
                ))
                .with("BackgroundColorIndex", fields.background_color_index),
            );
        }

        debug!(
            "parser: logical screen {}x{}, global color table: {}",
            screen.width(),
            screen.height(),
            screen.size_of_global_color_table()
        );
        self.emit(Element::LogicalScreenDescriptor(screen));
        self.state = next;
        Ok(())
    }

    fn read_block(&mut self) -> Result<(), Fatal> {
        let Some(separator) = self.read_byte()? else {
            return Err(Diagnostic::new(DecodeIssue::EndOfStream));
        };

        match separator {
            IMAGE_DESCRIPTOR_BLOCK_ID => self.read_image_descriptor(),
            EXTENSION_INTRODUCER_ID => self.read_extension(),
            TRAILER_BLOCK_ID => {
                self.emit(Element::Trailer);
                self.state = State::Done;
                Ok(())
            }
            x => Err(Diagnostic::new(DecodeIssue::UnsupportedBlock(x)).with("Separator", x)),
        }
    }

    fn read_image_descriptor(&mut self) -> Result<(), Fatal> {
        let bytes = self.read_fixed(IMAGE_DESCRIPTOR_LEN, DecodeIssue::TruncatedImageDescriptor)?;
        let (_, fields) = image_descriptor(&bytes).map_err(invalid_record)?;

        let has_local_table = fields.packed & 0b1000_0000 != 0;
        let size_bits = fields.packed & 0b0000_0111;
        if !has_local_table && size_bits != 0 {
            self.warn(
                Diagnostic::new(DecodeIssue::NonzeroLocalColorTableSize)
                    .with("SizeOfLocalColorTableValue", size_bits),
            );
        }

        let mut descriptor = ImageDescriptor::new(fields.left, fields.top, fields.width, fields.height)
            .map_err(invalid_record)?
            .with_interlace(fields.packed & 0b0100_0000 != 0)
            .with_sort_flag(fields.packed & 0b0010_0000 != 0);
        if has_local_table {
            descriptor = descriptor
                .with_local_color_table(table_size(fields.packed))
                .map_err(invalid_record)?;
        }

        self.emit(Element::ImageDescriptor(descriptor));
        self.state = if has_local_table {
            State::LocalColorTable(descriptor)
        } else {
            State::ImageData(descriptor, None)
        };
        Ok(())
    }

    fn read_image_data(
        &mut self,
        descriptor: ImageDescriptor,
        local: Option<ColorTable>,
    ) -> Result<(), Fatal> {
        let table = local.or_else(|| self.global_color_table.clone());
        if table.is_none() {
            self.warn(Diagnostic::new(DecodeIssue::NoColorTable));
        }

        let Some(min_code_size) = self.read_byte()? else {
            return Err(Diagnostic::new(DecodeIssue::TruncatedMinimumCodeSize));
        };
        let Some(encoded) = read_sub_blocks(&mut self.reader).map_err(read_failed)? else {
            return Err(Diagnostic::new(DecodeIssue::TruncatedImageData));
        };
        self.state = State::Blocks;

        let Some(table) = table else {
            return Ok(());
        };

        let expected = descriptor.pixel_count();
        if expected > self.pixel_limit {
            return Err(Diagnostic::new(DecodeIssue::ImageTooLarge(expected))
                .with("Pixels", expected)
                .with("Limit", self.pixel_limit));
        }

        let indices = lzw::decode(min_code_size, &encoded).map_err(|e| match e {
            LzwError::CodeOutOfRange { code, table_size } => {
                Diagnostic::new(DecodeIssue::CodeOutOfRange)
                    .with("Value", code)
                    .with("CodeCount", table_size)
            }
            LzwError::InvalidMinimumCodeSize(size) => {
                Diagnostic::new(DecodeIssue::InvalidMinimumCodeSize(size))
            }
            other => Diagnostic::new(DecodeIssue::InvalidRecord(other.to_string())),
        })?;

        if indices.len() != expected {
            self.warn(
                Diagnostic::new(DecodeIssue::PixelCountMismatch)
                    .with("Read", indices.len())
                    .with("Expected", expected),
            );
        }

        let raster = build_raster(&descriptor, &table, &indices).map_err(invalid_record)?;
        self.emit(Element::Raster(raster));
        Ok(())
    }

    fn read_extension(&mut self) -> Result<(), Fatal> {
        let Some(label) = self.read_byte()? else {
            return Err(Diagnostic::new(DecodeIssue::TruncatedExtensionLabel));
        };
        let Some(data) = read_sub_blocks(&mut self.reader).map_err(read_failed)? else {
            return Err(Diagnostic::new(DecodeIssue::TruncatedExtensionData));
        };
        self.state = State::Blocks;

        match label {
            GRAPHIC_CONTROL_EXTENSION_LABEL => {
                if data.len() != 4 {
                    self.warn(
                        Diagnostic::new(DecodeIssue::IgnoringGraphicsControlExtension(data.len()))
                            .with("ExtensionData", data),
                    );
                    return Ok(());
                }
                let (_, (packed, delay, transparency_index)) =
                    graphics_control(&data).map_err(invalid_record)?;
                match GraphicsControlExtension::new(
                    (packed & 0b0001_1100) >> 2,
                    packed & 0b0000_0010 != 0,
                    delay,
                    packed & 0b0000_0001 != 0,
                    transparency_index,
                ) {
                    Ok(extension) => self.emit(Element::GraphicsControlExtension(extension)),
                    Err(e) => self.warn(
                        Diagnostic::new(DecodeIssue::InvalidRecord(e.to_string()))
                            .with("ExtensionData", data),
                    ),
                }
            }
            COMMENT_EXTENSION_LABEL => {
                self.emit(Element::Comment(Comment::new(latin1(&data))));
            }
            APPLICATION_EXTENSION_LABEL => {
                if data.len() < 11 {
                    self.warn(
                        Diagnostic::new(DecodeIssue::IgnoringApplicationExtension(data.len()))
                            .with("ExtensionData", data),
                    );
                    return Ok(());
                }
                let (_, (identifier, authentication_code, payload)) =
                    application(&data).map_err(invalid_record)?;
                let payload = (!payload.is_empty()).then(|| payload.to_vec());
                match ApplicationExtension::new(
                    &latin1(identifier),
                    &latin1(authentication_code),
                    payload,
                ) {
                    Ok(extension) => self.emit(Element::ApplicationExtension(extension)),
                    Err(e) => self.warn(
                        Diagnostic::new(DecodeIssue::InvalidRecord(e.to_string()))
                            .with("ExtensionData", data),
                    ),
                }
            }
            x => self.warn(Diagnostic::new(DecodeIssue::UnsupportedExtension(x)).with("Extension", x)),
        }
        Ok(())
    }

    fn read_byte(&mut self) -> Result<Option<u8>, Fatal> {
        let mut byte = [0u8; 1];
        match read_full(&mut self.reader, &mut byte).map_err(read_failed)? {
            1 => Ok(Some(byte[0])),
            _ => Ok(None),
        }
    }

    /// Reads exactly `len` bytes, a short read is fatal.
    fn read_fixed(&mut self, len: usize, issue: DecodeIssue) -> Result<Vec<u8>, Fatal> {
        let mut bytes = vec![0u8; len];
        let read = read_full(&mut self.reader, &mut bytes).map_err(read_failed)?;
        if read != len {
            return Err(Diagnostic::new(issue)
                .with("Read", read)
                .with("Expected", len));
        }
        Ok(bytes)
    }
}

impl<R: Read> Iterator for Decoder<R> {
    type Item = Element;

    fn next(&mut self) -> Option<Element> {
        loop {
            if let Some(element) = self.pending.pop_front() {
                return Some(element);
            }
            if matches!(self.state, State::Done) {
                return None;
            }
            if let Err(diagnostic) = self.step() {
                debug!("parser: fatal: {}", diagnostic);
                self.state = State::Done;
                self.pending.push_back(Element::DecoderError(diagnostic));
            }
        }
    }
}

impl<R: Read> FusedIterator for Decoder<R> {}

/// Maps every decoded index through `table`. Missing indices and indices
/// past the end of the table fall back to entry 0.
fn build_raster(
    descriptor: &ImageDescriptor,
    table: &ColorTable,
    indices: &[u8],
) -> crate::Result<Raster> {
    let width = descriptor.width() as usize;
    let height = descriptor.height() as usize;
    let fallback = table.colors()[0].to_argb();
    let color = |i: usize| {
        indices
            .get(i)
            .and_then(|&index| table.get(index as usize))
            .map_or(fallback, |c| c.to_argb())
    };

    let mut pixels = vec![fallback; width * height];
    let rows: Vec<usize> = if descriptor.interlace_flag() {
        interlaced_rows(height).collect()
    } else {
        (0..height).collect()
    };
    for (stored, &row) in rows.iter().enumerate() {
        for x in 0..width {
            pixels[row * width + x] = color(stored * width + x);
        }
    }
    Raster::from_pixels(descriptor.width(), descriptor.height(), pixels)
}

/// Size of the color table announced in the low bits of a packed field.
fn table_size(packed: u8) -> usize {
    1 << ((packed & 0b0000_0111) + 1)
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn invalid_record(e: impl ToString) -> Diagnostic {
    Diagnostic::new(DecodeIssue::InvalidRecord(e.to_string()))
}

fn read_failed(e: io::Error) -> Diagnostic {
    Diagnostic::new(DecodeIssue::ReadFailed(e.to_string()))
}

struct ScreenFields {
    width: u16,
    height: u16,
    packed: u8,
    background_color_index: u8,
    pixel_aspect_ratio: u8,
}

struct ImageFields {
    left: u16,
    top: u16,
    width: u16,
    height: u16,
    packed: u8,
}

fn signature(input: &[u8]) -> IResult<&[u8], &[u8]> {
    preceded(tag(&b"GIF"[..]), take(3usize)).parse(input)
}

fn screen_descriptor(input: &[u8]) -> IResult<&[u8], ScreenFields> {
    map(
        (le_u16, le_u16, le_u8, le_u8, le_u8),
        |(width, height, packed, background_color_index, pixel_aspect_ratio)| ScreenFields {
            width,
            height,
            packed,
            background_color_index,
            pixel_aspect_ratio,
        },
    )
    .parse(input)
}

fn image_descriptor(input: &[u8]) -> IResult<&[u8], ImageFields> {
    map(
        (le_u16, le_u16, le_u16, le_u16, le_u8),
        |(left, top, width, height, packed)| ImageFields {
            left,
            top,
            width,
            height,
            packed,
        },
    )
    .parse(input)
}

/// Packed fields, delay and transparency index.
fn graphics_control(input: &[u8]) -> IResult<&[u8], (u8, u16, u8)> {
    (le_u8, le_u16, le_u8).parse(input)
}

/// Identifier, authentication code and trailing data.
fn application(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8], &[u8])> {
    (take(8usize), take(3usize), rest).parse(input)
}
