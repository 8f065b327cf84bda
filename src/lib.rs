// MIT License
// Copyright (c) 2025 Gianluca Cannata <gcannata23@gmail.com>
//
// av-gif-codec - A GIF decoder and encoder written in Rust

//! GIF decoding as a lazy stream of elements, and animated GIF encoding.
//!
//! Decoding never stops at the first problem: malformed but skippable blocks
//! are reported as [`Element::DecoderWarning`] and decoding goes on, anything
//! that makes the rest of the stream unreadable ends it with a single
//! [`Element::DecoderError`].
//!
//! ```no_run
//! # fn run() -> gif::Result<()> {
//! let file = std::io::BufReader::new(std::fs::File::open("in.gif")?);
//! for element in gif::decode(file) {
//!     if let gif::Element::Raster(raster) = element {
//!         println!("{}x{} image", raster.width(), raster.height());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod bits;
pub mod elements;
pub mod encoder;
pub mod error;
pub mod lzw;
pub mod parser;
pub mod raster;
pub mod writer;

pub use crate::elements::{
    ApplicationExtension, ColorTable, Comment, ContextValue, DecodeIssue, Diagnostic, Element,
    GraphicsControlExtension, Header, ImageDescriptor, LogicalScreenDescriptor, Rgb,
};
pub use crate::encoder::Encoder;
pub use crate::error::{Error, Result};
pub use crate::lzw::LzwError;
pub use crate::parser::{decode, Decoder, DEFAULT_PIXEL_LIMIT};
pub use crate::raster::{PixelSource, Raster, TRANSPARENT};
pub use crate::writer::GifWriter;
