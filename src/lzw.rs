// MIT License
// Copyright (c) 2025 Gianluca Cannata <gcannata23@gmail.com>
//
// av-gif-codec - A GIF decoder and encoder written in Rust
use std::collections::HashMap;
use std::io::Write;

use thiserror::Error;
use tracing::debug;

use crate::bits::{BitPacker, BitUnpacker};
use crate::error::Result;

/// Code table capacity, codes never grow past 12 bits.
pub const MAX_CODES: usize = 4096;

type Code = u16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LzwError {
    #[error("code {code} is outside a code table of {table_size} entries")]
    CodeOutOfRange { code: u16, table_size: usize },
    #[error("minimum code size {0} is not supported")]
    InvalidMinimumCodeSize(u8),
    #[error("palette index {index} is outside a color table of {table_size} entries")]
    IndexOutOfRange { index: u8, table_size: usize },
}

/// Minimum code size written before the code stream of a `table_size` entry
/// palette. Never below 2.
pub fn minimum_code_size(table_size: usize) -> u8 {
    let bits = usize::BITS - table_size.saturating_sub(1).leading_zeros();
    (bits as u8).max(2)
}

/// Bits needed to write any code of a table holding `table_len` entries.
pub fn code_width(table_len: usize) -> u8 {
    (usize::BITS - table_len.saturating_sub(1).leading_zeros()) as u8
}

/// One dictionary entry: the sequence of `prefix` followed by `suffix`.
#[derive(Debug, Clone, Copy)]
struct Node {
    prefix: Option<Code>,
    suffix: u8,
    first: u8,
    len: u32,
}

/// Arena of index sequences addressed by code. Every sequence is stored as
/// its parent code plus one trailing index.
#[derive(Debug)]
struct CodeTable {
    min_code_size: u8,
    nodes: Vec<Node>,
}

impl CodeTable {
    fn new(min_code_size: u8) -> Self {
        let literals = 1usize << min_code_size;
        let mut nodes = Vec::with_capacity(MAX_CODES);
        for i in 0..literals {
            nodes.push(Node {
                prefix: None,
                suffix: i as u8,
                first: i as u8,
                len: 1,
            });
        }
        // Clear and End of Information
        let marker = Node {
            prefix: None,
            suffix: 0,
            first: 0,
            len: 0,
        };
        nodes.push(marker);
        nodes.push(marker);
        CodeTable {
            min_code_size,
            nodes,
        }
    }

    fn clear_code(&self) -> Code {
        1 << self.min_code_size
    }

    fn end_code(&self) -> Code {
        self.clear_code() + 1
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn truncate(&mut self) {
        self.nodes.truncate((1 << self.min_code_size) + 2);
    }

    fn first(&self, code: Code) -> u8 {
        self.nodes[code as usize].first
    }

    fn push(&mut self, prefix: Code, suffix: u8) {
        let parent = self.nodes[prefix as usize];
        self.nodes.push(Node {
            prefix: Some(prefix),
            suffix,
            first: parent.first,
            len: parent.len + 1,
        });
    }

    /// Appends the sequence of `code` to `out`.
    fn expand(&self, code: Code, out: &mut Vec<u8>) {
        let len = self.nodes[code as usize].len as usize;
        let start = out.len();
        out.resize(start + len, 0);
        let mut at = start + len;
        let mut next = Some(code);
        while let Some(code) = next {
            let node = self.nodes[code as usize];
            at -= 1;
            out[at] = node.suffix;
            next = node.prefix;
        }
    }
}

/// Greedy LZW compressor writing a GIF image data block: the minimum code
/// size byte followed by the sub-block framed code stream.
///
/// Once the dictionary holds [`MAX_CODES`] entries it stops growing, no Clear
/// code is emitted mid-stream.
pub struct LzwEncoder<W: Write> {
    packer: BitPacker<W>,
    min_code_size: u8,
    table_size: usize,
    dictionary: HashMap<(Code, u8), Code>, // (prefix, index) -> code
    table_len: usize,
    current_sequence: Option<Code>,
}

impl<W: Write> LzwEncoder<W> {
    pub fn new(mut output: W, table_size: usize) -> Result<Self> {
        let min_code_size = minimum_code_size(table_size);
        output.write_all(&[min_code_size])?;

        let mut encoder = Self {
            packer: BitPacker::new(output),
            min_code_size,
            table_size,
            dictionary: HashMap::new(),
            table_len: (1 << min_code_size) + 2,
            current_sequence: None,
        };
        encoder.write_code(1 << min_code_size)?;
        Ok(encoder)
    }

    pub fn encode_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        for &index in chunk {
            if usize::from(index) >= self.table_size {
                return Err(LzwError::IndexOutOfRange {
                    index,
                    table_size: self.table_size,
                }
                .into());
            }

            let Some(current) = self.current_sequence else {
                self.current_sequence = Some(index.into());
                continue;
            };

            if let Some(&code) = self.dictionary.get(&(current, index)) {
                self.current_sequence = Some(code);
            } else {
                self.write_code(current)?;
                if self.table_len < MAX_CODES {
                    self.dictionary.insert((current, index), self.table_len as Code);
                    self.table_len += 1;
                }
                self.current_sequence = Some(index.into());
            }
        }
        Ok(())
    }

    /// Writes the pending sequence, the End of Information code and the
    /// sub-block terminator.
    pub fn finalize(mut self) -> Result<W> {
        if let Some(current) = self.current_sequence.take() {
            self.write_code(current)?;
        }
        let end = (1 << self.min_code_size) + 1;
        self.write_code(end)?;
        debug!(
            "lzw: encoded with min code size {}, {} table entries",
            self.min_code_size, self.table_len
        );
        Ok(self.packer.finish()?)
    }

    fn write_code(&mut self, code: Code) -> Result<()> {
        self.packer.pack(code, code_width(self.table_len))?;
        Ok(())
    }
}

/// Compresses `indices` drawn from a `table_size` entry palette into `output`.
pub fn encode<W: Write>(indices: &[u8], table_size: usize, output: W) -> Result<W> {
    let mut encoder = LzwEncoder::new(output, table_size)?;
    encoder.encode_chunk(indices)?;
    encoder.finalize()
}

/// Expands an LZW code stream (sub-block payloads already concatenated) back
/// into palette indices.
///
/// The code table entry following each code is built by peeking at the next
/// code, so the table is always one entry ahead of a classic decoder and the
/// read width follows the same rule the encoder uses. Decoding stops at the
/// End of Information code or when the data runs out.
pub fn decode(min_code_size: u8, data: &[u8]) -> Result<Vec<u8>, LzwError> {
    if min_code_size > 8 {
        return Err(LzwError::InvalidMinimumCodeSize(min_code_size));
    }

    let mut table = CodeTable::new(min_code_size);
    let mut reader = BitUnpacker::new(data);
    let mut decoded = Vec::new();
    let width = |table_len: usize| code_width(table_len).max(min_code_size);

    while let Some(code) = reader.read(width(table.len())) {
        if code as usize >= table.len() {
            return Err(LzwError::CodeOutOfRange {
                code,
                table_size: table.len(),
            });
        }
        if code == table.clear_code() {
            table.truncate();
            continue;
        }
        if code == table.end_code() {
            break;
        }

        table.expand(code, &mut decoded);

        if table.len() < MAX_CODES {
            if let Some(next) = reader.peek(width(table.len() + 1)) {
                let tail = match next as usize {
                    n if n < table.len() => table.first(next),
                    n if n == table.len() => table.first(code),
                    _ => {
                        return Err(LzwError::CodeOutOfRange {
                            code: next,
                            table_size: table.len(),
                        })
                    }
                };
                table.push(code, tail);
            }
        }
    }

    debug!(
        "lzw: decoded {} indices with min code size {}",
        decoded.len(),
        min_code_size
    );
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use quickcheck::quickcheck;

    use super::*;
    use crate::bits::read_sub_blocks;

    /// Image data of the 3x5 sample from the GIF89a article on Wikipedia.
    const SAMPLE_STREAM: [u8; 11] = [0x00, 0x51, 0xFC, 0x1B, 0x28, 0x70, 0xA0, 0xC1, 0x83, 0x01, 0x01];

    fn sample_indices() -> Vec<u8> {
        let mut indices = vec![40, 255, 255, 255, 40];
        indices.extend([255; 10]);
        indices
    }

    fn round_trip(indices: &[u8], table_size: usize) -> Vec<u8> {
        let block = encode(indices, table_size, Vec::new()).unwrap();
        let (min_code_size, rest) = block.split_first().unwrap();
        let mut rest = rest;
        let data = read_sub_blocks(&mut rest).unwrap().unwrap();
        assert!(rest.is_empty());
        decode(*min_code_size, &data).unwrap()
    }

    #[test]
    fn minimum_code_sizes() {
        assert_eq!(minimum_code_size(2), 2);
        assert_eq!(minimum_code_size(4), 2);
        assert_eq!(minimum_code_size(8), 3);
        assert_eq!(minimum_code_size(16), 4);
        assert_eq!(minimum_code_size(256), 8);
    }

    #[test]
    fn code_widths() {
        assert_eq!(code_width(258), 9);
        assert_eq!(code_width(512), 9);
        assert_eq!(code_width(513), 10);
        assert_eq!(code_width(MAX_CODES), 12);
    }

    #[test]
    fn decodes_sample_stream() {
        assert_eq!(decode(8, &SAMPLE_STREAM).unwrap(), sample_indices());
    }

    #[test]
    fn encodes_sample_stream() {
        let mut expected = vec![8, SAMPLE_STREAM.len() as u8];
        expected.extend_from_slice(&SAMPLE_STREAM);
        expected.push(0);
        assert_eq!(encode(&sample_indices(), 256, Vec::new()).unwrap(), expected);
    }

    #[test]
    fn test_lzw_encoder() {
        let chunk: Vec<u8> = b"ABABABABABABABABA".iter().map(|b| b - b'A').collect();
        assert_eq!(round_trip(&chunk, 2), chunk);
    }

    #[test]
    fn empty_input() {
        let block = encode(&[], 4, Vec::new()).unwrap();
        // clear (4) and end (5) at 3 bits each
        assert_eq!(block, vec![2, 1, 0b0010_1100, 0]);
        assert!(round_trip(&[], 4).is_empty());
    }

    #[test]
    fn rejects_index_outside_alphabet() {
        let result = encode(&[0, 1, 4], 4, Vec::new());
        assert!(matches!(
            result,
            Err(crate::Error::Lzw(LzwError::IndexOutOfRange { index: 4, .. }))
        ));
    }

    #[test]
    fn rejects_index_past_a_small_table() {
        // two colors still get a minimum code size of 2
        let result = encode(&[0, 1, 2], 2, Vec::new());
        assert!(matches!(
            result,
            Err(crate::Error::Lzw(LzwError::IndexOutOfRange {
                index: 2,
                table_size: 2
            }))
        ));
        assert!(encode(&[0, 1, 3], 3, Vec::new()).is_err());
        assert!(encode(&[0, 1, 2], 3, Vec::new()).is_ok());
    }

    #[test]
    fn dictionary_stops_growing_at_cap() {
        // Pseudo random indices need far more than 4096 codes.
        let mut state = 0x2545_F491u32;
        let indices: Vec<u8> = (0..60_000)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state >> 24) as u8
            })
            .collect();

        let mut encoder = LzwEncoder::new(Vec::new(), 256).unwrap();
        encoder.encode_chunk(&indices).unwrap();
        assert_eq!(encoder.table_len, MAX_CODES);
        assert_eq!(code_width(encoder.table_len), 12);
        encoder.finalize().unwrap();

        assert_eq!(round_trip(&indices, 256), indices);
    }

    #[test]
    fn long_runs_hit_the_kwkwk_case() {
        let indices = vec![1u8; 10_000];
        assert_eq!(round_trip(&indices, 2), indices);
    }

    #[test]
    fn code_outside_table_is_an_error() {
        // clear (256) then 300 at 9 bits
        let mut packer = BitPacker::new(Vec::new());
        packer.pack(256, 9).unwrap();
        packer.pack(300, 9).unwrap();
        let framed = packer.finish().unwrap();
        let data = read_sub_blocks(&mut framed.as_slice()).unwrap().unwrap();
        assert_eq!(
            decode(8, &data),
            Err(LzwError::CodeOutOfRange {
                code: 300,
                table_size: 258
            })
        );
    }

    #[test]
    fn clear_code_resets_the_table() {
        let mut packer = BitPacker::new(Vec::new());
        // clear, 1, 2, clear, 3, end with a 4 entry alphabet
        for (code, width) in [(4, 3), (1, 3), (2, 3), (4, 3), (3, 3), (5, 3)] {
            packer.pack(code, width).unwrap();
        }
        let framed = packer.finish().unwrap();
        let data = read_sub_blocks(&mut framed.as_slice()).unwrap().unwrap();
        assert_eq!(decode(2, &data).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn rejects_large_minimum_code_size() {
        assert_eq!(decode(9, &[0]), Err(LzwError::InvalidMinimumCodeSize(9)));
    }

    quickcheck! {
        fn lzw_round_trips(indices: Vec<u8>, size_code: u8) -> bool {
            let table_size = 2usize << (size_code % 8);
            let indices: Vec<u8> = indices
                .into_iter()
                .map(|i| (i as usize % table_size) as u8)
                .collect();
            round_trip(&indices, table_size) == indices
        }
    }
}
