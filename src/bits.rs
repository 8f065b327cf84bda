// MIT License
// Copyright (c) 2025 Gianluca Cannata <gcannata23@gmail.com>
//
// av-gif-codec - A GIF decoder and encoder written in Rust
use std::io::{self, Read, Write};

/// Largest payload of a single sub-block.
pub const MAX_SUB_BLOCK: usize = 255;

/// Packs variable width codes least significant bit first and frames the
/// resulting bytes into sub-blocks.
pub struct BitPacker<W: Write> {
    output: W,
    block: Vec<u8>,  // Payload of the sub-block being filled
    bit_buffer: u32, // Bits not yet written to `block`
    bit_count: u32,  // Number of valid bits in `bit_buffer`
}

impl<W: Write> BitPacker<W> {
    pub fn new(output: W) -> Self {
        Self {
            output,
            block: Vec::with_capacity(MAX_SUB_BLOCK),
            bit_buffer: 0,
            bit_count: 0,
        }
    }

    /// Appends the `width` low bits of `code`. `width` is at most 16.
    pub fn pack(&mut self, code: u16, width: u8) -> io::Result<()> {
        debug_assert!(width <= 16);
        let mask = (1u32 << width) - 1;
        self.bit_buffer |= (u32::from(code) & mask) << self.bit_count;
        self.bit_count += u32::from(width);

        while self.bit_count >= 8 {
            self.push_byte((self.bit_buffer & 0xFF) as u8)?;
            self.bit_buffer >>= 8;
            self.bit_count -= 8;
        }
        Ok(())
    }

    /// Writes the zero padded partial byte, the last sub-block and the block
    /// terminator.
    pub fn finish(mut self) -> io::Result<W> {
        if self.bit_count > 0 {
            let byte = (self.bit_buffer & 0xFF) as u8;
            self.bit_buffer = 0;
            self.bit_count = 0;
            self.push_byte(byte)?;
        }
        self.flush_block()?;
        self.output.write_all(&[0x00])?;
        Ok(self.output)
    }

    fn push_byte(&mut self, byte: u8) -> io::Result<()> {
        self.block.push(byte);
        if self.block.len() == MAX_SUB_BLOCK {
            self.flush_block()?;
        }
        Ok(())
    }

    fn flush_block(&mut self) -> io::Result<()> {
        if self.block.is_empty() {
            return Ok(());
        }
        self.output.write_all(&[self.block.len() as u8])?;
        self.output.write_all(&self.block)?;
        self.block.clear();
        Ok(())
    }
}

/// Reads variable width codes, least significant bit first, from a byte
/// buffer with an explicit bit cursor.
#[derive(Debug, Clone)]
pub struct BitUnpacker<'a> {
    data: &'a [u8],
    byte: usize,
    bit: u8,
}

impl<'a> BitUnpacker<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte: 0,
            bit: 0,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.byte >= self.data.len()
    }

    /// Consumes the next `width` bits. Returns `None` when no bit is left;
    /// a code cut short by the end of data keeps the bits that were there.
    pub fn read(&mut self, width: u8) -> Option<u16> {
        if self.is_exhausted() {
            return None;
        }
        let mut value = 0u16;
        for written in 0..width {
            let Some(&byte) = self.data.get(self.byte) else {
                break;
            };
            value |= u16::from((byte >> self.bit) & 1) << written;
            self.bit += 1;
            if self.bit == 8 {
                self.bit = 0;
                self.byte += 1;
            }
        }
        Some(value)
    }

    /// Same as [`read`](Self::read) without moving the cursor.
    pub fn peek(&self, width: u8) -> Option<u16> {
        self.clone().read(width)
    }
}

/// Reads a sequence of sub-blocks up to and including its zero length
/// terminator and returns the concatenated payload. `None` means the stream
/// ended first.
pub fn read_sub_blocks<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut data = Vec::new();
    let mut chunk = [0u8; MAX_SUB_BLOCK];
    loop {
        let mut size = [0u8; 1];
        if read_full(reader, &mut size)? != 1 {
            return Ok(None);
        }
        let size = size[0] as usize;
        if size == 0 {
            return Ok(Some(data));
        }
        if read_full(reader, &mut chunk[..size])? != size {
            return Ok(None);
        }
        data.extend_from_slice(&chunk[..size]);
    }
}

/// Fills as much of `buf` as the reader allows and returns how many bytes
/// were read. A short count means end of stream.
pub fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
