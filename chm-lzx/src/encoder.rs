//! The LZX block encoder (C6, encode direction).
//!
//! Per the component design, this is a correctness-first implementation: it emits verbatim
//! blocks only (never aligned-offset or uncompressed blocks), uses a simple hash-chain LZ77
//! matcher (window = W, max match = 257, min match = 3), and builds canonical Huffman trees from
//! observed per-block symbol frequencies. Compression ratio is not part of the contract;
//! decodability by [`crate::decoder::LzxDecoder`] is, and is exercised by round-trip tests.

use crate::error::{LzxError, Result};
use crate::huffman::{lengths_from_frequencies, HuffmanTable};
use crate::position_slots::{build_position_slots, num_position_slots_for_window, PositionSlot};
use crate::trees::{main_tree_size, LENGTH_TREE_SIZE, NUM_CHARS, PRETREE_SIZE};
use tracing::trace;

const MAX_MATCH_LEN: u32 = 257;
const MIN_MATCH_LEN: u32 = 3;
const MAX_BLOCK_PAYLOAD: usize = 0x8000;
const MAX_CANDIDATES: usize = 32;

/// Appends bits MSB-first, matching [`crate::bitreader::BitReader`]'s convention.
struct BitWriter {
    bytes: Vec<u8>,
    cur: u8,
    cur_bits: u8,
}

impl BitWriter {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            cur: 0,
            cur_bits: 0,
        }
    }

    fn write_bits(&mut self, value: u32, n: u32) {
        for i in (0..n).rev() {
            let bit = ((value >> i) & 1) as u8;
            self.cur = (self.cur << 1) | bit;
            self.cur_bits += 1;
            if self.cur_bits == 8 {
                self.bytes.push(self.cur);
                self.cur = 0;
                self.cur_bits = 0;
            }
        }
    }

    fn align(&mut self) {
        if self.cur_bits > 0 {
            self.cur <<= 8 - self.cur_bits;
            self.bytes.push(self.cur);
            self.cur = 0;
            self.cur_bits = 0;
        }
    }

    fn finish(mut self) -> Vec<u8> {
        self.align();
        self.bytes
    }
}

struct Match {
    distance: u32,
    length: u32,
}

/// A position-slot lookup built for encoding: given a distance, find its slot and footer value.
struct DistanceEncoder {
    slots: Vec<PositionSlot>,
}

impl DistanceEncoder {
    fn new(num_slots: usize) -> Self {
        Self {
            slots: build_position_slots(num_slots),
        }
    }

    /// Returns `(position_slot, footer_value)` for a non-repeated distance (slot >= 3).
    fn encode(&self, distance: u32) -> (usize, u32, u8) {
        // Slots are ordered by increasing base; find the last slot whose base <= distance.
        let mut slot = 3usize;
        for (i, s) in self.slots.iter().enumerate().skip(3) {
            if s.base <= distance {
                slot = i;
            } else {
                break;
            }
        }
        let s = self.slots[slot];
        (slot, distance - s.base, s.footer_bits)
    }
}

fn find_match(data: &[u8], pos: usize, chain: &std::collections::HashMap<[u8; 3], Vec<usize>>, window_size: u32, r: &[u32; 3]) -> Option<Match> {
    if pos + MIN_MATCH_LEN as usize > data.len() {
        return None;
    }
    let key = [data[pos], data[pos + 1], data[pos + 2]];
    let candidates = chain.get(&key)?;

    let mut best: Option<Match> = None;
    for &cand in candidates.iter().rev().take(MAX_CANDIDATES) {
        if cand >= pos {
            continue;
        }
        let distance = (pos - cand) as u32;
        if distance > window_size {
            continue;
        }
        // Position slot 3, the lowest "regular" (non-repeat) slot, has base 3: a distance of 1
        // or 2 is only representable via the repeat-offset queue, never through the position-
        // slot/footer-bits path. Skip candidates that are neither.
        if distance < 3 && !r.contains(&distance) {
            continue;
        }
        let max_len = (data.len() - pos).min(MAX_MATCH_LEN as usize);
        let mut len = 0usize;
        while len < max_len && data[cand + len] == data[pos + len] {
            len += 1;
        }
        if len as u32 >= MIN_MATCH_LEN {
            if best.as_ref().map(|b| len as u32 > b.length).unwrap_or(true) {
                best = Some(Match {
                    distance,
                    length: len as u32,
                });
            }
        }
    }
    best
}

/// Encodes `input` as a sequence of LZX verbatim blocks covering exactly one reset interval,
/// writing the bitstream to `out_bits` (appended). `input.len()` must fit the reset interval.
pub fn encode_reset_interval(input: &[u8], out_bits: &mut Vec<u8>) -> Result<()> {
    encode_reset_interval_with_window(input, 0x8000, out_bits)
}

/// As [`encode_reset_interval`], but with an explicit window size (used to size the main tree
/// and cap match distances).
pub fn encode_reset_interval_with_window(input: &[u8], window_size: u32, out_bits: &mut Vec<u8>) -> Result<()> {
    let Some(num_slots) = num_position_slots_for_window(window_size) else {
        return Err(LzxError::WindowTooSmall);
    };
    let dist_enc = DistanceEncoder::new(num_slots);
    let main_len = main_tree_size(num_slots);

    let mut writer = BitWriter::new();
    let mut r = [1u32, 1, 1];
    // Carried across blocks within this interval, exactly as `LzxDecoder` carries
    // `main_lengths`/`length_lengths` across `decode_block` calls: the pretree deltas in each
    // block are relative to the previous block's tree, not to zero.
    let mut prev_main = vec![0u8; main_len];
    let mut prev_length = vec![0u8; LENGTH_TREE_SIZE];

    let mut pos = 0usize;
    while pos < input.len() {
        let payload_len = (input.len() - pos).min(MAX_BLOCK_PAYLOAD);
        let block = &input[pos..pos + payload_len];
        encode_block(
            block, pos, input, &dist_enc, main_len, window_size, &mut r, &mut prev_main, &mut prev_length, &mut writer,
        )?;
        pos += payload_len;
    }

    if input.is_empty() {
        // A zero-length interval still needs a terminating empty verbatim block so the decoder
        // sees well-formed block framing even when there is nothing to decode; the facade never
        // asks for a zero-length decode in practice, but this keeps the encoder total.
        encode_block(
            &[], 0, input, &dist_enc, main_len, window_size, &mut r, &mut prev_main, &mut prev_length, &mut writer,
        )?;
    }

    out_bits.extend_from_slice(&writer.finish());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn encode_block(
    block: &[u8],
    block_start: usize,
    full_input: &[u8],
    dist_enc: &DistanceEncoder,
    main_len: usize,
    window_size: u32,
    r: &mut [u32; 3],
    prev_main: &mut [u8],
    prev_length: &mut [u8],
    writer: &mut BitWriter,
) -> Result<()> {
    // Build a hash-chain over the whole interval so matches can reach back across block
    // boundaries (the window and LRU persist across blocks within one reset interval).
    let mut chain: std::collections::HashMap<[u8; 3], Vec<usize>> = std::collections::HashMap::new();
    for i in 0..block_start + block.len() {
        if i + 3 <= full_input.len() {
            let key = [full_input[i], full_input[i + 1], full_input[i + 2]];
            chain.entry(key).or_default().push(i);
        }
    }

    struct Emitted {
        literal: Option<u8>,
        main_symbol: Option<u16>,
        length_extra: Option<u16>,
        distance_slot: Option<usize>,
        distance_footer: Option<(u32, u8)>,
    }

    let mut events: Vec<Emitted> = Vec::new();
    let mut main_freq = vec![0u32; main_len];
    let mut length_freq = vec![0u32; LENGTH_TREE_SIZE];

    let mut i = block_start;
    let block_end = block_start + block.len();

    while i < block_end {
        let m = find_match(full_input, i, &chain, window_size, r);
        if let Some(m) = m {
            let repeat_slot = r.iter().position(|&rd| rd == m.distance);
            let (slot, footer_value, footer_bits) = if let Some(rs) = repeat_slot {
                (rs, 0u32, 0u8)
            } else {
                dist_enc.encode(m.distance)
            };

            let length_header = if m.length - 2 >= 7 { 7 } else { m.length - 2 };
            let main_symbol = (NUM_CHARS + slot * 8 + length_header as usize) as u16;
            main_freq[main_symbol as usize] += 1;

            let length_extra = if length_header == 7 {
                let extra = m.length - 9;
                length_freq[extra as usize] += 1;
                Some(extra as u16)
            } else {
                None
            };

            if slot >= 3 {
                r[2] = r[1];
                r[1] = r[0];
                r[0] = m.distance;
            } else {
                match slot {
                    1 => r.swap(0, 1),
                    2 => {
                        let d = r[2];
                        r[2] = r[1];
                        r[1] = r[0];
                        r[0] = d;
                    }
                    _ => {}
                }
            }

            events.push(Emitted {
                literal: None,
                main_symbol: Some(main_symbol),
                length_extra,
                distance_slot: if slot >= 3 { Some(slot) } else { None },
                distance_footer: if slot >= 3 { Some((footer_value, footer_bits)) } else { None },
            });
            i += m.length as usize;
        } else {
            let b = full_input[i];
            main_freq[b as usize] += 1;
            events.push(Emitted {
                literal: Some(b),
                main_symbol: Some(b as u16),
                length_extra: None,
                distance_slot: None,
                distance_footer: None,
            });
            i += 1;
        }
    }

    let main_lengths = lengths_from_frequencies(&main_freq, 16);
    let length_lengths = lengths_from_frequencies(&length_freq, 16);
    let main_table = HuffmanTable::build(&main_lengths)?;
    let length_table = HuffmanTable::build(&length_lengths)?;

    trace!(block_len = block.len(), events = events.len(), "encoding LZX block");

    writer.write_bits(1, 3); // block type: verbatim
    writer.write_bits((block.len() as u32) >> 8, 16);
    writer.write_bits(block.len() as u32 & 0xff, 8);

    write_pretree_and_lengths(writer, prev_main, &main_lengths);
    write_pretree_and_lengths(writer, prev_length, &length_lengths);

    for ev in &events {
        let sym = ev.main_symbol.unwrap();
        let (code, len) = main_table.code_for(sym);
        if len == 0 {
            return Err(LzxError::EncoderFailure(format!("symbol {sym} has no assigned code")));
        }
        writer.write_bits(code as u32, len as u32);

        if ev.literal.is_some() {
            continue;
        }

        if let Some(extra) = ev.length_extra {
            let (code, len) = length_table.code_for(extra);
            writer.write_bits(code as u32, len as u32);
        }

        if let (Some(_slot), Some((footer_value, footer_bits))) = (ev.distance_slot, ev.distance_footer) {
            if footer_bits > 0 {
                writer.write_bits(footer_value, footer_bits as u32);
            }
        }
    }

    Ok(())
}

/// Writes a tree's code lengths using only the literal delta codes (`0..=16`) of the pretree
/// protocol — this encoder never emits the run-length codes (17/18/19), which is a valid
/// (if less compact) subset of the general protocol the decoder fully supports.
///
/// `prev` holds each position's previous length on entry (zero at the start of a reset
/// interval) and is updated to `new_lengths` on return, mirroring how `LzxDecoder` carries
/// `main_lengths`/`length_lengths` across blocks within one interval.
fn write_pretree_and_lengths(writer: &mut BitWriter, prev: &mut [u8], new_lengths: &[u8]) {
    let mut freq = vec![0u32; PRETREE_SIZE];
    let mut deltas = Vec::with_capacity(new_lengths.len());
    for (&new_len, &prev_len) in new_lengths.iter().zip(prev.iter()) {
        let delta = ((new_len as i32 - prev_len as i32).rem_euclid(17)) as u8;
        deltas.push(delta);
        freq[delta as usize] += 1;
    }

    // The pretree's own lengths are length-limited to 15, since they are transmitted as raw
    // 4-bit fields (unlike the main/length trees, which allow up to 16).
    let pretree_lengths = lengths_from_frequencies(&freq, 15);
    for &l in &pretree_lengths {
        writer.write_bits(l as u32, 4);
    }

    let pretree = HuffmanTable::build(&pretree_lengths)
        .expect("a pretree over 20 symbols length-limited to 15 bits is always constructible");

    for &delta in &deltas {
        let (code, len) = pretree.code_for(delta as u16);
        writer.write_bits(code as u32, len as u32);
    }

    prev.copy_from_slice(new_lengths);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitreader::BitReader;
    use crate::decoder::LzxDecoder;

    #[test]
    fn bitwriter_matches_bitreader_convention() {
        let mut w = BitWriter::new();
        w.write_bits(0b101, 3);
        w.write_bits(0b1, 1);
        let bytes = w.finish();
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_bits(3).unwrap(), 0b101);
        assert_eq!(r.read_bits(1).unwrap(), 0b1);
    }

    #[test]
    fn encoder_output_decodes_back_to_input() {
        let input = b"the quick brown fox jumps over the lazy dog. the quick brown fox.".to_vec();
        let mut bits = Vec::new();
        encode_reset_interval(&input, &mut bits).unwrap();

        let mut reader = BitReader::new(&bits);
        let mut decoder = LzxDecoder::new(0x8000).unwrap();
        let mut out = Vec::new();
        decoder.decode_interval(&mut reader, input.len() as u32, &mut out).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn encoder_handles_empty_input() {
        let mut bits = Vec::new();
        encode_reset_interval(&[], &mut bits).unwrap();
        let mut reader = BitReader::new(&bits);
        let mut decoder = LzxDecoder::new(0x8000).unwrap();
        let mut out = Vec::new();
        decoder.decode_interval(&mut reader, 0, &mut out).unwrap();
        assert!(out.is_empty());
    }
}
