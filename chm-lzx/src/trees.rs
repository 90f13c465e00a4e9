//! Shared tree-size constants and the pretree-based delta code-length protocol used by both the
//! decoder and the encoder.

use crate::bitreader::BitReader;
use crate::error::{LzxError, Result};
use crate::huffman::HuffmanTable;

/// Number of literal symbols in the main tree.
pub const NUM_CHARS: usize = 256;

/// Number of symbols in the length tree.
pub const LENGTH_TREE_SIZE: usize = 249;

/// Number of symbols in the pretree (used to delta-encode the main/length tree lengths).
pub const PRETREE_SIZE: usize = 20;

/// Number of symbols in the aligned-offset tree.
pub const ALIGNED_TREE_SIZE: usize = 8;

/// Size of the main tree for a given number of position slots.
pub fn main_tree_size(num_position_slots: usize) -> usize {
    NUM_CHARS + 8 * num_position_slots
}

/// Decodes one tree's code lengths using the pretree delta protocol described in the decoder
/// component (C6): each pretree symbol either supplies a new length for one position (codes
/// `0..=16`, delta-coded modulo 17 relative to that position's previous length), a run of
/// zero-length positions (codes 17/18), or a run of positions that all take the same new value,
/// again relative to each position's own previous length (code 19).
///
/// `lengths` holds the previous block's lengths on entry and is updated in place; on the first
/// block of a reset interval it must be all zeros.
pub fn decode_lengths(
    reader: &mut BitReader<'_>,
    pretree: &HuffmanTable,
    lengths: &mut [u8],
) -> Result<()> {
    let n = lengths.len();
    let mut i = 0usize;
    while i < n {
        let sym = pretree.decode(reader)?;
        match sym {
            0..=16 => {
                let delta = sym as u32;
                lengths[i] = ((lengths[i] as u32 + delta) % 17) as u8;
                i += 1;
            }
            17 => {
                let extra = reader.read_bits(4)?;
                let run = (4 + extra) as usize;
                let end = (i + run).min(n);
                for l in &mut lengths[i..end] {
                    *l = 0;
                }
                i = end;
            }
            18 => {
                let extra = reader.read_bits(5)?;
                let run = (20 + extra) as usize;
                let end = (i + run).min(n);
                for l in &mut lengths[i..end] {
                    *l = 0;
                }
                i = end;
            }
            19 => {
                let extra = reader.read_bits(1)?;
                let run = (4 + extra) as usize;
                let end = (i + run).min(n);
                let value_sym = pretree.decode(reader)?;
                if value_sym > 16 {
                    return Err(LzxError::InvalidHuffman);
                }
                for l in &mut lengths[i..end] {
                    *l = ((*l as u32 + value_sym as u32) % 17) as u8;
                }
                i = end;
            }
            _ => return Err(LzxError::InvalidHuffman),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::huffman::HuffmanTable;

    fn bits_to_bytes(bits: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in bits.chunks(8) {
            let mut b = 0u8;
            for (i, &bit) in chunk.iter().enumerate() {
                b |= bit << (7 - i);
            }
            out.push(b);
        }
        out
    }

    #[test]
    fn literal_delta_codes_set_lengths() {
        // Pretree alphabet of 20 symbols: the first 16 get a fixed-width length-4 code (a
        // complete tree, since 16 * 2^-4 == 1) so we can hand-encode bits for this test; the
        // remaining 4 symbols are absent (length 0), keeping the Kraft sum exact.
        let mut pretree_lengths = vec![0u8; PRETREE_SIZE];
        pretree_lengths[..16].fill(4);
        let pretree = HuffmanTable::build(&pretree_lengths).unwrap();

        // We want to set lengths[0] = 3 via a single delta code of value 3 (since prev is 0).
        let (code, len) = pretree.code_for(3);
        assert_eq!(len, 4);
        let mut bits = Vec::new();
        for i in (0..len).rev() {
            bits.push(((code >> i) & 1) as u8);
        }
        while bits.len() % 8 != 0 {
            bits.push(0);
        }
        let bytes = bits_to_bytes(&bits);
        let mut reader = BitReader::new(&bytes);

        let mut lengths = vec![0u8; 1];
        decode_lengths(&mut reader, &pretree, &mut lengths).unwrap();
        assert_eq!(lengths[0], 3);
    }
}
