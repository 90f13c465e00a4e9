//! The LZX block decoder (C6, decode direction).

use crate::bitreader::BitReader;
use crate::error::{LzxError, Result};
use crate::huffman::HuffmanTable;
use crate::position_slots::{build_position_slots, num_position_slots_for_window, PositionSlot};
use crate::trees::{decode_lengths, main_tree_size, ALIGNED_TREE_SIZE, LENGTH_TREE_SIZE, NUM_CHARS, PRETREE_SIZE};
use crate::window::Window;
use tracing::trace;

const BLOCK_TYPE_VERBATIM: u8 = 1;
const BLOCK_TYPE_ALIGNED: u8 = 2;
const BLOCK_TYPE_UNCOMPRESSED: u8 = 3;

/// Returns `true` if `window_size` is one of the LZXC-allowed power-of-two window sizes.
pub fn is_valid_window_size(window_size: u32) -> bool {
    num_position_slots_for_window(window_size).is_some()
}

/// Decodes LZX content one reset interval at a time.
///
/// A single instance is meant to decode exactly one reset interval's worth of bytes and then
/// either be `reset()` (for the next interval) or dropped. It owns the sliding window, the
/// carried-over main/length tree code lengths, and the LRU distance queue.
pub struct LzxDecoder {
    window: Window,
    position_slots: Vec<PositionSlot>,
    main_lengths: Vec<u8>,
    length_lengths: Vec<u8>,
    r: [u32; 3],
}

impl LzxDecoder {
    /// Creates a decoder for the given window size. Fails with [`LzxError::WindowTooSmall`] if
    /// `window_size` is not one of the allowed LZXC sizes.
    pub fn new(window_size: u32) -> Result<Self> {
        let Some(num_slots) = num_position_slots_for_window(window_size) else {
            return Err(LzxError::WindowTooSmall);
        };
        Ok(Self {
            window: Window::new(window_size),
            position_slots: build_position_slots(num_slots),
            main_lengths: vec![0u8; main_tree_size(num_slots)],
            length_lengths: vec![0u8; LENGTH_TREE_SIZE],
            r: [1, 1, 1],
        })
    }

    /// Resets window, tree state, and LRU distances, as required at every reset-interval
    /// boundary.
    pub fn reset(&mut self) {
        self.window.reset();
        self.main_lengths.iter_mut().for_each(|l| *l = 0);
        self.length_lengths.iter_mut().for_each(|l| *l = 0);
        self.r = [1, 1, 1];
    }

    /// Decodes exactly `interval_len` bytes of plaintext from `reader`, appending them to `out`.
    ///
    /// The caller is responsible for calling [`LzxDecoder::reset`] at reset-interval boundaries
    /// and for positioning `reader` at the start of the interval's first block.
    pub fn decode_interval(&mut self, reader: &mut BitReader<'_>, interval_len: u32, out: &mut Vec<u8>) -> Result<()> {
        let start_len = out.len();
        let target_len = start_len + interval_len as usize;

        while out.len() < target_len {
            self.decode_block(reader, target_len, out)?;
        }

        if out.len() != target_len {
            return Err(LzxError::OutputOverflow);
        }
        Ok(())
    }

    fn decode_block(&mut self, reader: &mut BitReader<'_>, target_len: usize, out: &mut Vec<u8>) -> Result<()> {
        let block_type = reader.read_bits(3)? as u8;
        let size_hi = reader.read_bits(16)?;
        let size_lo = reader.read_bits(8)?;
        let block_size = (size_hi << 8) | size_lo;
        trace!(block_type, block_size, "decoding LZX block");

        if out.len() + block_size as usize > target_len {
            return Err(LzxError::OutputOverflow);
        }

        match block_type {
            BLOCK_TYPE_VERBATIM => self.decode_compressed_block(reader, block_size, out, None),
            BLOCK_TYPE_ALIGNED => {
                let mut aligned_lengths = vec![0u8; ALIGNED_TREE_SIZE];
                for l in aligned_lengths.iter_mut() {
                    *l = reader.read_bits(3)? as u8;
                }
                let aligned_tree = HuffmanTable::build(&aligned_lengths)?;
                self.decode_compressed_block(reader, block_size, out, Some(&aligned_tree))
            }
            BLOCK_TYPE_UNCOMPRESSED => self.decode_uncompressed_block(reader, block_size, out),
            other => Err(LzxError::UnknownBlockType(other)),
        }
    }

    fn decode_compressed_block(
        &mut self,
        reader: &mut BitReader<'_>,
        block_size: u32,
        out: &mut Vec<u8>,
        aligned_tree: Option<&HuffmanTable>,
    ) -> Result<()> {
        let mut pretree_lengths = vec![0u8; PRETREE_SIZE];
        for l in pretree_lengths.iter_mut() {
            *l = reader.read_bits(4)? as u8;
        }
        let pretree = HuffmanTable::build(&pretree_lengths)?;
        decode_lengths(reader, &pretree, &mut self.main_lengths)?;
        let main_tree = HuffmanTable::build(&self.main_lengths)?;

        let pretree_lengths2 = {
            let mut v = vec![0u8; PRETREE_SIZE];
            for l in v.iter_mut() {
                *l = reader.read_bits(4)? as u8;
            }
            v
        };
        let pretree2 = HuffmanTable::build(&pretree_lengths2)?;
        decode_lengths(reader, &pretree2, &mut self.length_lengths)?;
        let length_tree = HuffmanTable::build(&self.length_lengths)?;

        let block_end = out.len() + block_size as usize;
        while out.len() < block_end {
            let sym = main_tree.decode(reader)?;
            if (sym as usize) < NUM_CHARS {
                self.window.write_byte(sym as u8, out);
                continue;
            }

            let match_sym = sym as usize - NUM_CHARS;
            let length_header = (match_sym % 8) as u32;
            let position_slot = match_sym / 8;

            let mut length = 2 + length_header;
            if length_header == 7 {
                let extra = length_tree.decode(reader)? as u32;
                length = 9 + extra;
            }

            let distance = self.decode_distance(reader, position_slot, aligned_tree)?;

            if out.len() + length as usize > block_end {
                return Err(LzxError::OutputOverflow);
            }
            self.window.copy_match(distance, length, out)?;
        }
        Ok(())
    }

    fn decode_distance(
        &mut self,
        reader: &mut BitReader<'_>,
        position_slot: usize,
        aligned_tree: Option<&HuffmanTable>,
    ) -> Result<u32> {
        if position_slot < 3 {
            let distance = self.r[position_slot];
            match position_slot {
                1 => self.r.swap(0, 1),
                2 => {
                    let d = self.r[2];
                    self.r[2] = self.r[1];
                    self.r[1] = self.r[0];
                    self.r[0] = d;
                }
                _ => {}
            }
            return Ok(distance);
        }

        let slot = *self
            .position_slots
            .get(position_slot)
            .ok_or(LzxError::InvalidMatch {
                distance: 0,
                length: 0,
                window_filled: 0,
            })?;

        let footer = if let (Some(aligned), true) = (aligned_tree, slot.footer_bits >= 3) {
            let high = if slot.footer_bits > 3 {
                reader.read_bits((slot.footer_bits - 3) as u32)?
            } else {
                0
            };
            let low = aligned.decode(reader)? as u32;
            (high << 3) | low
        } else if slot.footer_bits > 0 {
            reader.read_bits(slot.footer_bits as u32)?
        } else {
            0
        };

        let distance = slot.base + footer;
        self.r[2] = self.r[1];
        self.r[1] = self.r[0];
        self.r[0] = distance;
        Ok(distance)
    }

    fn decode_uncompressed_block(&mut self, reader: &mut BitReader<'_>, block_size: u32, out: &mut Vec<u8>) -> Result<()> {
        reader.align();
        // The three R0..R2 u32s (12 bytes) plus the declared payload must both be physically
        // present; check up front so a short buffer is reported as a truncated block rather than
        // a generic end-of-stream partway through reading the R values.
        if reader.bytes_remaining() < 12 + block_size as usize {
            return Err(LzxError::TruncatedBlock);
        }
        self.r[0] = reader.read_u32_le()?;
        self.r[1] = reader.read_u32_le()?;
        self.r[2] = reader.read_u32_le()?;
        let bytes = reader.read_bytes(block_size as usize)?;
        for &b in bytes {
            self.window.write_byte(b, out);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode_reset_interval;

    #[test]
    fn round_trip_small_repeated_input() {
        let input = b"AAAAAAAAAA".to_vec();
        let window_size = 0x8000;
        let mut bits = Vec::new();
        encode_reset_interval(&input, &mut bits).unwrap();

        let mut reader = BitReader::new(&bits);
        let mut decoder = LzxDecoder::new(window_size).unwrap();
        let mut out = Vec::new();
        decoder.decode_interval(&mut reader, input.len() as u32, &mut out).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn round_trip_longer_pseudo_random_input() {
        let mut input = Vec::new();
        let mut state: u32 = 0x1234;
        for _ in 0..5000 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            input.push((state & 0xff) as u8);
        }

        let mut bits = Vec::new();
        encode_reset_interval(&input, &mut bits).unwrap();

        let mut reader = BitReader::new(&bits);
        let mut decoder = LzxDecoder::new(0x8000).unwrap();
        let mut out = Vec::new();
        decoder.decode_interval(&mut reader, input.len() as u32, &mut out).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn unknown_block_type_is_rejected() {
        // A block header with type 0 (invalid) and size 0, followed by padding so the reader
        // has enough bits to parse the 3+16+8 bit header. `interval_len` is 1 so
        // `decode_interval` actually calls into `decode_block` instead of returning immediately.
        let bytes = [0u8; 4];
        let mut reader = BitReader::new(&bytes);
        let mut decoder = LzxDecoder::new(0x8000).unwrap();
        let mut out = Vec::new();
        assert_eq!(
            decoder.decode_interval(&mut reader, 1, &mut out),
            Err(LzxError::UnknownBlockType(0))
        );
    }

    #[test]
    fn invalid_window_size_is_rejected() {
        assert_eq!(LzxDecoder::new(0x9000).err(), Some(LzxError::WindowTooSmall));
    }

    #[test]
    fn truncated_uncompressed_block_is_rejected() {
        // Block header for type 3 (uncompressed), declared size 100 (0b011 | size_hi=0 | 0x64),
        // with nothing following: none of the R0..R2 values or the payload are present.
        let bytes = [0x60, 0x00, 0x0C, 0x80];
        let mut reader = BitReader::new(&bytes);
        let mut decoder = LzxDecoder::new(0x8000).unwrap();
        let mut out = Vec::new();
        assert_eq!(decoder.decode_interval(&mut reader, 100, &mut out), Err(LzxError::TruncatedBlock));
    }
}
