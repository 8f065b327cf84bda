// MIT License
// Copyright (c) 2025 Gianluca Cannata <gcannata23@gmail.com>
//
// av-gif-codec - A GIF decoder and encoder written in Rust
use std::io::Write;

use tracing::trace;

use crate::bits::MAX_SUB_BLOCK;
use crate::elements::{
    size_code, ApplicationExtension, ColorTable, Comment, GraphicsControlExtension, Header,
    ImageDescriptor, LogicalScreenDescriptor, APPLICATION_EXTENSION_LABEL,
    COMMENT_EXTENSION_LABEL, EXTENSION_INTRODUCER_ID, GRAPHIC_CONTROL_EXTENSION_LABEL,
    IMAGE_DESCRIPTOR_BLOCK_ID, TRAILER_BLOCK_ID,
};
use crate::error::{Error, Result};
use crate::lzw;

/// Serializes GIF records, in the order they are given, into a byte sink.
///
/// The writer does not check the block grammar: emitting a color table that
/// agrees with the preceding descriptor is up to the caller.
pub struct GifWriter<W: Write> {
    output: W,
}

impl<W: Write> GifWriter<W> {
    pub fn new(output: W) -> Self {
        GifWriter { output }
    }

    pub fn get_ref(&self) -> &W {
        &self.output
    }

    pub fn into_inner(self) -> W {
        self.output
    }

    pub fn flush(&mut self) -> Result<()> {
        self.output.flush()?;
        Ok(())
    }

    pub fn write_header(&mut self, header: &Header) -> Result<()> {
        // GIF signature + version
        self.output.write_all(b"GIF")?;
        self.output.write_all(&latin1(header.version(), "version")?)?;
        Ok(())
    }

    pub fn write_logical_screen_descriptor(&mut self, screen: &LogicalScreenDescriptor) -> Result<()> {
        self.output.write_all(&screen.width().to_le_bytes())?;
        self.output.write_all(&screen.height().to_le_bytes())?;

        // Global Color Table Flag (1 bit) | Color Resolution (3 bits) | Sort Flag (1 bit) | Size of Global Color Table (3 bits)
        let mut packed_fields = (screen.color_resolution() - 1) << 4;
        if screen.global_color_table_flag() {
            packed_fields |= 0b1000_0000;
            packed_fields |= size_code(screen.size_of_global_color_table()) & 0b0000_0111;
        }
        if screen.sort_flag() {
            packed_fields |= 0b0000_1000;
        }

        let aspect = match screen.pixel_aspect_ratio() {
            None => 0,
            Some(ratio) => {
                let ratio = f64::from(*ratio.numer()) / f64::from(*ratio.denom());
                (ratio * 64.0 - 15.0).round().clamp(1.0, 255.0) as u8
            }
        };

        self.output.write_all(&[
            packed_fields,
            screen.background_color_index(),
            aspect,
        ])?;
        trace!("writer: logical screen {}x{}", screen.width(), screen.height());
        Ok(())
    }

    /// Writes the RGB triples of a global or local color table.
    pub fn write_color_table(&mut self, table: &ColorTable) -> Result<()> {
        self.output.write_all(&table.to_rgb_bytes())?;
        Ok(())
    }

    pub fn write_graphics_control_extension(&mut self, extension: &GraphicsControlExtension) -> Result<()> {
        // Reserved (3 bits) | Disposal Method (3 bits) | User Input Flag (1 bit) | Transparent Color Flag (1 bit)
        let mut packed_fields = (extension.disposal_method() & 0b0000_0111) << 2;
        if extension.user_input_flag() {
            packed_fields |= 0b0000_0010;
        }
        if extension.transparency_flag() {
            packed_fields |= 0b0000_0001;
        }

        let [delay_lo, delay_hi] = extension.delay_time().to_le_bytes();
        self.write_extension(
            GRAPHIC_CONTROL_EXTENSION_LABEL,
            &[&[packed_fields, delay_lo, delay_hi, extension.transparency_index()][..]],
        )
    }

    pub fn write_image_descriptor(&mut self, descriptor: &ImageDescriptor) -> Result<()> {
        self.output.write_all(&[IMAGE_DESCRIPTOR_BLOCK_ID])?;
        self.output.write_all(&descriptor.left().to_le_bytes())?;
        self.output.write_all(&descriptor.top().to_le_bytes())?;
        self.output.write_all(&descriptor.width().to_le_bytes())?;
        self.output.write_all(&descriptor.height().to_le_bytes())?;

        // Local Color Table Flag (1 bit) | Interlace Flag (1 bit) | Sort Flag (1 bit) | Reserved (2 bits) | Size of Local Color Table (3 bits)
        let mut packed_fields = 0u8;
        if descriptor.local_color_table_flag() {
            packed_fields |= 0b1000_0000;
            packed_fields |= size_code(descriptor.size_of_local_color_table()) & 0b0000_0111;
        }
        if descriptor.interlace_flag() {
            packed_fields |= 0b0100_0000;
        }
        if descriptor.sort_flag() {
            packed_fields |= 0b0010_0000;
        }
        self.output.write_all(&[packed_fields])?;
        Ok(())
    }

    /// LZW-compresses `indices` for a palette of `table_size` entries and
    /// writes the minimum code size byte and the framed code stream.
    ///
    /// Rows are written in the order given, interlacing is left to the caller.
    pub fn write_image_data(&mut self, table_size: usize, indices: &[u8]) -> Result<()> {
        lzw::encode(indices, table_size, &mut self.output)?;
        Ok(())
    }

    /// Writes an extension block whose data is already cut into sub-blocks.
    pub fn write_extension(&mut self, label: u8, blocks: &[&[u8]]) -> Result<()> {
        if let Some(block) = blocks.iter().find(|b| b.len() > MAX_SUB_BLOCK) {
            return Err(Error::SubBlockTooLong(block.len()));
        }

        self.output.write_all(&[EXTENSION_INTRODUCER_ID, label])?;
        for block in blocks.iter().filter(|b| !b.is_empty()) {
            self.output.write_all(&[block.len() as u8])?;
            self.output.write_all(block)?;
        }
        // Block Terminator
        self.output.write_all(&[0x00])?;
        Ok(())
    }

    /// Comment text is written as Latin-1, split into 255 byte sub-blocks.
    pub fn write_comment(&mut self, comment: &Comment) -> Result<()> {
        let text = latin1(comment.text(), "comment")?;
        let blocks: Vec<&[u8]> = text.chunks(MAX_SUB_BLOCK).collect();
        self.write_extension(COMMENT_EXTENSION_LABEL, &blocks)
    }

    pub fn write_application_extension(&mut self, extension: &ApplicationExtension) -> Result<()> {
        let mut header = Vec::with_capacity(11);
        header.extend_from_slice(extension.identifier().as_bytes());
        header.extend_from_slice(extension.authentication_code().as_bytes());

        let mut blocks: Vec<&[u8]> = vec![header.as_slice()];
        if let Some(data) = extension.data() {
            blocks.extend(data.chunks(MAX_SUB_BLOCK));
        }
        self.write_extension(APPLICATION_EXTENSION_LABEL, &blocks)
    }

    /// NETSCAPE2.0 looping extension, 0 repeats forever.
    pub fn write_netscape_repetitions(&mut self, repetitions: u16) -> Result<()> {
        self.write_application_extension(&ApplicationExtension::netscape_looping(repetitions))
    }

    pub fn write_trailer(&mut self) -> Result<()> {
        self.output.write_all(&[TRAILER_BLOCK_ID])?;
        Ok(())
    }
}

/// Text fields are single byte per char on the wire.
fn latin1(text: &str, field: &'static str) -> Result<Vec<u8>> {
    text.chars()
        .map(u8::try_from)
        .collect::<std::result::Result<Vec<u8>, _>>()
        .map_err(|_| Error::InvalidText {
            field,
            expected: text.chars().count(),
            actual: text.to_owned(),
        })
}
