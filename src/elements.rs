// MIT License
// Copyright (c) 2025 Gianluca Cannata <gcannata23@gmail.com>
//
// av-gif-codec - A GIF decoder and encoder written in Rust
use std::collections::BTreeMap;
use std::fmt;

use av_data::rational::Rational32;
use thiserror::Error;

use crate::error::{out_of_range, Error, Result};
use crate::raster::Raster;

/// Every length a GIF color table may have.
pub const TABLE_SIZES: [usize; 8] = [2, 4, 8, 16, 32, 64, 128, 256];

/// Largest delay a Graphics Control Extension may carry, in centiseconds.
pub const MAX_DELAY_TIME: u16 = 65534;

/// GIF block ID for the "Image Descriptor".
pub const IMAGE_DESCRIPTOR_BLOCK_ID: u8 = 0x2C;

/// GIF block ID for the "Trailer".
pub const TRAILER_BLOCK_ID: u8 = 0x3B;

/// GIF block ID for the "Extension Introducer".
pub const EXTENSION_INTRODUCER_ID: u8 = 0x21;

/// GIF label of the "Graphic Control Extension".
pub const GRAPHIC_CONTROL_EXTENSION_LABEL: u8 = 0xF9;

/// GIF label of a "Comment Extension".
pub const COMMENT_EXTENSION_LABEL: u8 = 0xFE;

/// GIF label of an "Application Extension".
pub const APPLICATION_EXTENSION_LABEL: u8 = 0xFF;

pub(crate) fn is_table_size(len: usize) -> bool {
    TABLE_SIZES.contains(&len)
}

/// Packed-field encoding of a table size: log2(len) - 1.
pub(crate) fn size_code(len: usize) -> u8 {
    (len.trailing_zeros() as u8).saturating_sub(1)
}

/// One color table entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    /// Opaque `0xAARRGGBB` value of this color.
    pub const fn to_argb(self) -> u32 {
        0xFF00_0000 | (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }

    /// Drops the alpha channel of an `0xAARRGGBB` value.
    pub const fn from_argb(argb: u32) -> Self {
        Rgb {
            r: (argb >> 16) as u8,
            g: (argb >> 8) as u8,
            b: argb as u8,
        }
    }
}

/// Ordered palette of RGB triples. Used both as the Global and as a Local
/// Color Table, the role is given by the [`Element`] variant carrying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorTable {
    colors: Vec<Rgb>,
}

impl ColorTable {
    pub fn new(colors: Vec<Rgb>) -> Result<Self> {
        if !is_table_size(colors.len()) {
            return Err(Error::InvalidColorTableSize(colors.len()));
        }
        Ok(ColorTable { colors })
    }

    /// Smallest legal table length able to hold `count` colors.
    pub fn table_size_for(count: usize) -> Option<usize> {
        TABLE_SIZES.iter().copied().find(|&size| size >= count)
    }

    pub(crate) fn from_rgb_bytes(bytes: &[u8]) -> Result<Self> {
        let colors = bytes
            .chunks_exact(3)
            .map(|c| Rgb::new(c[0], c[1], c[2]))
            .collect();
        ColorTable::new(colors)
    }

    pub(crate) fn to_rgb_bytes(&self) -> Vec<u8> {
        self.colors.iter().flat_map(|c| [c.r, c.g, c.b]).collect()
    }

    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }

    pub fn get(&self, index: usize) -> Option<Rgb> {
        self.colors.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Always false, a table holds at least two entries.
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn size_code(&self) -> u8 {
        size_code(self.len())
    }
}

/// Signature version, `"87a"` or `"89a"` in practice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    version: String,
}

impl Header {
    pub fn new(version: &str) -> Result<Self> {
        if version.chars().count() != 3 {
            return Err(Error::InvalidText {
                field: "version",
                expected: 3,
                actual: version.to_owned(),
            });
        }
        Ok(Header {
            version: version.to_owned(),
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalScreenDescriptor {
    width: u16,
    height: u16,
    global_color_table_flag: bool,
    color_resolution: u8,
    sort_flag: bool,
    size_of_global_color_table: usize,
    background_color_index: u8,
    pixel_aspect_ratio: Option<Rational32>,
}

impl LogicalScreenDescriptor {
    /// Screen with 8 bits of color resolution and no global color table.
    pub fn new(width: u16, height: u16) -> Result<Self> {
        if width == 0 {
            return Err(out_of_range("width", width));
        }
        if height == 0 {
            return Err(out_of_range("height", height));
        }
        Ok(LogicalScreenDescriptor {
            width,
            height,
            global_color_table_flag: false,
            color_resolution: 8,
            sort_flag: false,
            size_of_global_color_table: 0,
            background_color_index: 0,
            pixel_aspect_ratio: None,
        })
    }

    pub fn with_global_color_table(mut self, size: usize, background_color_index: u8) -> Result<Self> {
        if !is_table_size(size) {
            return Err(Error::InvalidColorTableSize(size));
        }
        self.global_color_table_flag = true;
        self.size_of_global_color_table = size;
        self.background_color_index = background_color_index;
        Ok(self)
    }

    pub fn with_color_resolution(mut self, bits: u8) -> Result<Self> {
        if !(1..=8).contains(&bits) {
            return Err(out_of_range("color resolution", bits));
        }
        self.color_resolution = bits;
        Ok(self)
    }

    pub fn with_sort_flag(mut self, sort_flag: bool) -> Self {
        self.sort_flag = sort_flag;
        self
    }

    pub fn with_pixel_aspect_ratio(mut self, ratio: Option<Rational32>) -> Result<Self> {
        if let Some(ratio) = ratio {
            if ratio <= Rational32::from_integer(0) {
                return Err(out_of_range("pixel aspect ratio", *ratio.numer()));
            }
        }
        self.pixel_aspect_ratio = ratio;
        Ok(self)
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn global_color_table_flag(&self) -> bool {
        self.global_color_table_flag
    }

    pub fn color_resolution(&self) -> u8 {
        self.color_resolution
    }

    pub fn sort_flag(&self) -> bool {
        self.sort_flag
    }

    /// 0 when there is no global color table.
    pub fn size_of_global_color_table(&self) -> usize {
        self.size_of_global_color_table
    }

    pub fn background_color_index(&self) -> u8 {
        self.background_color_index
    }

    pub fn pixel_aspect_ratio(&self) -> Option<Rational32> {
        self.pixel_aspect_ratio
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphicsControlExtension {
    disposal_method: u8,
    user_input_flag: bool,
    delay_time: u16,
    transparency_flag: bool,
    transparency_index: u8,
}

impl GraphicsControlExtension {
    /// `delay_time` is in hundredths of a second.
    pub fn new(
        disposal_method: u8,
        user_input_flag: bool,
        delay_time: u16,
        transparency_flag: bool,
        transparency_index: u8,
    ) -> Result<Self> {
        if disposal_method >= 8 {
            return Err(out_of_range("disposal method", disposal_method));
        }
        if delay_time > MAX_DELAY_TIME {
            return Err(out_of_range("delay time", delay_time));
        }
        if transparency_index == u8::MAX {
            return Err(out_of_range("transparency index", transparency_index));
        }
        Ok(GraphicsControlExtension {
            disposal_method,
            user_input_flag,
            delay_time,
            transparency_flag,
            transparency_index,
        })
    }

    pub fn disposal_method(&self) -> u8 {
        self.disposal_method
    }

    pub fn user_input_flag(&self) -> bool {
        self.user_input_flag
    }

    pub fn delay_time(&self) -> u16 {
        self.delay_time
    }

    pub fn transparency_flag(&self) -> bool {
        self.transparency_flag
    }

    pub fn transparency_index(&self) -> u8 {
        self.transparency_index
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDescriptor {
    left: u16,
    top: u16,
    width: u16,
    height: u16,
    local_color_table_flag: bool,
    interlace_flag: bool,
    sort_flag: bool,
    size_of_local_color_table: usize,
}

impl ImageDescriptor {
    /// Non-interlaced image without a local color table.
    pub fn new(left: u16, top: u16, width: u16, height: u16) -> Result<Self> {
        if width == 0 {
            return Err(out_of_range("width", width));
        }
        if height == 0 {
            return Err(out_of_range("height", height));
        }
        Ok(ImageDescriptor {
            left,
            top,
            width,
            height,
            local_color_table_flag: false,
            interlace_flag: false,
            sort_flag: false,
            size_of_local_color_table: 0,
        })
    }

    pub fn with_local_color_table(mut self, size: usize) -> Result<Self> {
        if !is_table_size(size) {
            return Err(Error::InvalidColorTableSize(size));
        }
        self.local_color_table_flag = true;
        self.size_of_local_color_table = size;
        Ok(self)
    }

    pub fn with_interlace(mut self, interlace_flag: bool) -> Self {
        self.interlace_flag = interlace_flag;
        self
    }

    pub fn with_sort_flag(mut self, sort_flag: bool) -> Self {
        self.sort_flag = sort_flag;
        self
    }

    pub fn left(&self) -> u16 {
        self.left
    }

    pub fn top(&self) -> u16 {
        self.top
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn local_color_table_flag(&self) -> bool {
        self.local_color_table_flag
    }

    pub fn interlace_flag(&self) -> bool {
        self.interlace_flag
    }

    pub fn sort_flag(&self) -> bool {
        self.sort_flag
    }

    pub fn size_of_local_color_table(&self) -> usize {
        self.size_of_local_color_table
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    text: String,
}

impl Comment {
    pub fn new(text: impl Into<String>) -> Self {
        Comment { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationExtension {
    identifier: String,
    authentication_code: String,
    data: Option<Vec<u8>>,
}

impl ApplicationExtension {
    pub fn new(identifier: &str, authentication_code: &str, data: Option<Vec<u8>>) -> Result<Self> {
        if identifier.len() != 8 || !identifier.is_ascii() {
            return Err(Error::InvalidText {
                field: "application identifier",
                expected: 8,
                actual: identifier.to_owned(),
            });
        }
        if authentication_code.len() != 3 || !authentication_code.is_ascii() {
            return Err(Error::InvalidText {
                field: "application authentication code",
                expected: 3,
                actual: authentication_code.to_owned(),
            });
        }
        Ok(ApplicationExtension {
            identifier: identifier.to_owned(),
            authentication_code: authentication_code.to_owned(),
            data,
        })
    }

    /// Extension controlling how many times an animation is played.
    pub fn netscape_looping(repetitions: u16) -> Self {
        let [lo, hi] = repetitions.to_le_bytes();
        ApplicationExtension {
            identifier: "NETSCAPE".to_owned(),
            authentication_code: "2.0".to_owned(),
            data: Some(vec![0x01, lo, hi]),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn authentication_code(&self) -> &str {
        &self.authentication_code
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Loop count of a NETSCAPE2.0 extension, 0 meaning forever.
    pub fn netscape_repetitions(&self) -> Option<u16> {
        if self.identifier != "NETSCAPE" || self.authentication_code != "2.0" {
            return None;
        }
        match self.data.as_deref() {
            Some([0x01, lo, hi, ..]) => Some(u16::from_le_bytes([*lo, *hi])),
            _ => None,
        }
    }
}

/// What went wrong while reading a stream. The `Display` output is the
/// human readable message of a [`Diagnostic`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeIssue {
    #[error("GIF header not found")]
    HeaderNotFound,
    #[error("end of stream while reading the logical screen descriptor")]
    TruncatedLogicalScreenDescriptor,
    #[error("end of stream while reading the global color table")]
    TruncatedGlobalColorTable,
    #[error("end of stream while reading an image descriptor")]
    TruncatedImageDescriptor,
    #[error("end of stream while reading a local color table")]
    TruncatedLocalColorTable,
    #[error("end of stream while reading the LZW minimum code size")]
    TruncatedMinimumCodeSize,
    #[error("end of stream while reading image data")]
    TruncatedImageData,
    #[error("end of stream while reading an extension label")]
    TruncatedExtensionLabel,
    #[error("end of stream while reading extension data")]
    TruncatedExtensionData,
    #[error("end of stream while looking for the next block")]
    EndOfStream,
    #[error("block type 0x{0:02X} is not supported")]
    UnsupportedBlock(u8),
    #[error("decoded value is outside the range of the code table")]
    CodeOutOfRange,
    #[error("LZW minimum code size {0} is not supported")]
    InvalidMinimumCodeSize(u8),
    #[error("image of {0} pixels exceeds the decoder pixel limit")]
    ImageTooLarge(usize),
    #[error("record fields are out of range: {0}")]
    InvalidRecord(String),
    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("local color table size is set but the local color table flag is clear")]
    NonzeroLocalColorTableSize,
    #[error("background color index {0} given without a global color table")]
    BackgroundWithoutGlobalTable(u8),
    #[error("no color table is available for the image, skipping it")]
    NoColorTable,
    #[error("decoded pixel count does not match the image size")]
    PixelCountMismatch,
    #[error("ignoring graphics control extension with {0} bytes of data")]
    IgnoringGraphicsControlExtension(usize),
    #[error("ignoring application extension with {0} bytes of data")]
    IgnoringApplicationExtension(usize),
    #[error("extension 0x{0:02X} is not supported")]
    UnsupportedExtension(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextValue {
    Number(u64),
    Bytes(Vec<u8>),
}

impl From<usize> for ContextValue {
    fn from(value: usize) -> Self {
        ContextValue::Number(value as u64)
    }
}

impl From<u16> for ContextValue {
    fn from(value: u16) -> Self {
        ContextValue::Number(value.into())
    }
}

impl From<u8> for ContextValue {
    fn from(value: u8) -> Self {
        ContextValue::Number(value.into())
    }
}

impl From<Vec<u8>> for ContextValue {
    fn from(value: Vec<u8>) -> Self {
        ContextValue::Bytes(value)
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ContextValue::Number(n) => write!(f, "{}", n),
            ContextValue::Bytes(bytes) => write!(f, "{:02X?}", bytes),
        }
    }
}

/// A decode problem together with the structured details of what was lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub issue: DecodeIssue,
    pub context: BTreeMap<&'static str, ContextValue>,
}

impl Diagnostic {
    pub fn new(issue: DecodeIssue) -> Self {
        Diagnostic {
            issue,
            context: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &'static str, value: impl Into<ContextValue>) -> Self {
        self.context.insert(key, value.into());
        self
    }

    pub fn message(&self) -> String {
        self.issue.to_string()
    }

    pub fn context(&self, key: &str) -> Option<&ContextValue> {
        self.context.get(key)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.issue)?;
        for (key, value) in &self.context {
            write!(f, " [{}: {}]", key, value)?;
        }
        Ok(())
    }
}

/// One unit of a GIF stream, in the order it appears in the file.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Header(Header),
    LogicalScreenDescriptor(LogicalScreenDescriptor),
    GlobalColorTable(ColorTable),
    LocalColorTable(ColorTable),
    GraphicsControlExtension(GraphicsControlExtension),
    ImageDescriptor(ImageDescriptor),
    /// Decoded image, every index mapped through the active color table.
    Raster(Raster),
    Comment(Comment),
    ApplicationExtension(ApplicationExtension),
    Trailer,
    /// Fatal, nothing follows it.
    DecoderError(Diagnostic),
    /// Recoverable, decoding goes on.
    DecoderWarning(Diagnostic),
}

impl Element {
    pub fn is_error(&self) -> bool {
        matches!(self, Element::DecoderError(_))
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Element::DecoderWarning(_))
    }

    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            Element::DecoderError(d) | Element::DecoderWarning(d) => Some(d),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Element::Header(_) => "Header",
            Element::LogicalScreenDescriptor(_) => "LogicalScreenDescriptor",
            Element::GlobalColorTable(_) => "GlobalColorTable",
            Element::LocalColorTable(_) => "LocalColorTable",
            Element::GraphicsControlExtension(_) => "GraphicsControlExtension",
            Element::ImageDescriptor(_) => "ImageDescriptor",
            Element::Raster(_) => "Raster",
            Element::Comment(_) => "Comment",
            Element::ApplicationExtension(_) => "ApplicationExtension",
            Element::Trailer => "Trailer",
            Element::DecoderError(_) => "DecoderError",
            Element::DecoderWarning(_) => "DecoderWarning",
        }
    }
}
