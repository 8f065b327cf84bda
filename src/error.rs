// MIT License
// Copyright (c) 2025 Gianluca Cannata <gcannata23@gmail.com>
//
// av-gif-codec - A GIF decoder and encoder written in Rust
use thiserror::Error;

use crate::lzw::LzwError;

/// Errors raised synchronously to a caller that builds records or drives the
/// encoder with values GIF cannot represent.
///
/// Problems found in the *content* of a decoded stream never take this path,
/// they are yielded as [`Element::DecoderError`](crate::Element::DecoderError)
/// and [`Element::DecoderWarning`](crate::Element::DecoderWarning) instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("color table length {0} is not a power of two between 2 and 256")]
    InvalidColorTableSize(usize),

    #[error("{field} is out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },

    #[error("{field} must be exactly {expected} characters, got {actual:?}")]
    InvalidText {
        field: &'static str,
        expected: usize,
        actual: String,
    },

    #[error("extension sub-block of {0} bytes does not fit a 255 byte block")]
    SubBlockTooLong(usize),

    #[error(transparent)]
    Lzw(#[from] LzwError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) fn out_of_range(field: &'static str, value: impl Into<i64>) -> Error {
    Error::OutOfRange {
        field,
        value: value.into(),
    }
}
