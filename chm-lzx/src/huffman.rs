//! Canonical Huffman code construction and decoding (C2).

use crate::bitreader::BitReader;
use crate::error::{LzxError, Result};
use std::collections::HashMap;

/// The maximum code length LZX's canonical Huffman trees may use.
pub const MAX_CODE_LENGTH: u8 = 16;

/// A decode table built from a vector of code lengths.
///
/// Construction follows the canonical Huffman rule: symbols are stably sorted first by code
/// length ascending, then by symbol index ascending; codes are assigned starting at 0 and
/// incrementing by one per symbol, left-shifting by the length delta whenever the length
/// increases.
pub struct HuffmanTable {
    /// `(code, length)` per symbol index; `length == 0` means the symbol is absent.
    codes: Vec<(u16, u8)>,
    decode_map: HashMap<(u8, u16), u16>,
    max_len: u8,
}

impl HuffmanTable {
    /// Builds a decode table from a code-length vector. Fails with [`LzxError::InvalidHuffman`]
    /// if the lengths do not form a complete binary tree.
    pub fn build(lengths: &[u8]) -> Result<Self> {
        let (codes, max_len) = canonical_codes(lengths)?;
        let mut decode_map = HashMap::new();
        for (symbol, &(code, len)) in codes.iter().enumerate() {
            if len > 0 {
                decode_map.insert((len, code), symbol as u16);
            }
        }
        Ok(Self {
            codes,
            decode_map,
            max_len,
        })
    }

    /// The `(code, length)` pair assigned to `symbol`. `length == 0` means unreachable.
    pub fn code_for(&self, symbol: u16) -> (u16, u8) {
        self.codes[symbol as usize]
    }

    /// Number of symbols this table was built over.
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Decodes one symbol from `reader`, reading one bit at a time until a complete code
    /// matches. Bounded to [`MAX_CODE_LENGTH`] bits.
    pub fn decode(&self, reader: &mut BitReader<'_>) -> Result<u16> {
        let mut code: u16 = 0;
        for len in 1..=self.max_len.max(1) {
            let bit = reader.read_bits(1)? as u16;
            code = (code << 1) | bit;
            if let Some(&symbol) = self.decode_map.get(&(len, code)) {
                return Ok(symbol);
            }
        }
        Err(LzxError::InvalidHuffmanCode)
    }
}

/// Assigns canonical codes to a code-length vector, returning `(codes, max_len)`.
///
/// A single non-zero-length symbol (an alphabet of one live symbol) is a conventional special
/// case: it is assigned length 1 and the completeness check is skipped, since there is nothing
/// to balance a one-symbol tree against.
fn canonical_codes(lengths: &[u8]) -> Result<(Vec<(u16, u8)>, u8)> {
    let mut order: Vec<usize> = (0..lengths.len()).filter(|&i| lengths[i] > 0).collect();

    if order.is_empty() {
        return Ok((vec![(0, 0); lengths.len()], 0));
    }

    if order.len() == 1 {
        let mut codes = vec![(0u16, 0u8); lengths.len()];
        codes[order[0]] = (0, 1);
        return Ok((codes, 1));
    }

    order.sort_by_key(|&i| (lengths[i], i));

    let max_len = *lengths.iter().max().unwrap();
    if max_len > MAX_CODE_LENGTH {
        return Err(LzxError::InvalidHuffman);
    }

    let mut codes = vec![(0u16, 0u8); lengths.len()];
    let mut code: u32 = 0;
    let mut prev_len: u8 = 0;
    for &i in &order {
        let len = lengths[i];
        code <<= (len - prev_len) as u32;
        if code > u16::MAX as u32 {
            return Err(LzxError::InvalidHuffman);
        }
        codes[i] = (code as u16, len);
        code += 1;
        prev_len = len;
    }

    let mut kraft: u64 = 0;
    for &i in &order {
        kraft += 1u64 << (max_len - lengths[i]);
    }
    if kraft != 1u64 << max_len {
        return Err(LzxError::InvalidHuffman);
    }

    Ok((codes, max_len))
}

/// Builds a length-limited canonical code-length vector from symbol frequencies, using the
/// package-merge (coin-collector) algorithm bounded to `max_length` bits.
///
/// Symbols with frequency 0 are assigned length 0 (absent), matching the "0 means absent"
/// convention used throughout this codec.
pub fn lengths_from_frequencies(freqs: &[u32], max_length: u8) -> Vec<u8> {
    let n_total = freqs.len();

    let mut items: Vec<(u64, Vec<u32>)> = freqs
        .iter()
        .enumerate()
        .filter(|&(_, &f)| f > 0)
        .map(|(i, &f)| (f as u64, vec![i as u32]))
        .collect();
    items.sort_by_key(|(w, _)| *w);

    let n = items.len();
    let mut lengths = vec![0u8; n_total];
    if n == 0 {
        return lengths;
    }
    if n == 1 {
        lengths[items[0].1[0] as usize] = 1;
        return lengths;
    }

    let mut level = items.clone();
    for _ in 2..=max_length {
        let mut packages: Vec<(u64, Vec<u32>)> = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks_exact(2) {
            let mut syms = pair[0].1.clone();
            syms.extend_from_slice(&pair[1].1);
            packages.push((pair[0].0 + pair[1].0, syms));
        }
        packages.extend(items.iter().cloned());
        packages.sort_by_key(|(w, _)| *w);
        level = packages;
    }

    let take = (2 * n - 2).min(level.len());
    for (_, syms) in level.iter().take(take) {
        for &s in syms {
            lengths[s as usize] += 1;
        }
    }
    lengths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitreader::BitReader;

    fn encode_symbol(bits: &mut Vec<u8>, code: u16, len: u8) {
        for i in (0..len).rev() {
            bits.push(((code >> i) & 1) as u8);
        }
    }

    fn pack_bits(bits: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for chunk in bits.chunks(8) {
            let mut b = 0u8;
            for (i, &bit) in chunk.iter().enumerate() {
                b |= bit << (7 - i);
            }
            bytes.push(b);
        }
        bytes
    }

    #[test]
    fn incomplete_tree_is_rejected() {
        // Three symbols of length 1: 3 * 2^(1-1) = 3 != 2^1 = 2.
        assert_eq!(HuffmanTable::build(&[1, 1, 1]), Err(LzxError::InvalidHuffman));
    }

    #[test]
    fn complete_tree_round_trips() {
        // Lengths [1, 2, 2]: symbol 0 -> code 0 (len 1), symbol 1 -> code 10 (len 2),
        // symbol 2 -> code 11 (len 2). Complete: 2^1 + 2^0 + 2^0 = 2+1+1=... wait check below.
        let lengths = vec![1u8, 2, 2];
        let table = HuffmanTable::build(&lengths).unwrap();

        let mut bits = Vec::new();
        encode_symbol(&mut bits, table.code_for(0).0, table.code_for(0).1);
        encode_symbol(&mut bits, table.code_for(1).0, table.code_for(1).1);
        encode_symbol(&mut bits, table.code_for(2).0, table.code_for(2).1);
        while bits.len() % 8 != 0 {
            bits.push(0);
        }
        let bytes = pack_bits(&bits);
        let mut reader = BitReader::new(&bytes);
        assert_eq!(table.decode(&mut reader).unwrap(), 0);
        assert_eq!(table.decode(&mut reader).unwrap(), 1);
        assert_eq!(table.decode(&mut reader).unwrap(), 2);
    }

    #[test]
    fn single_symbol_alphabet_is_accepted() {
        let table = HuffmanTable::build(&[0, 0, 3]).unwrap();
        assert_eq!(table.code_for(2), (0, 1));
    }

    #[test]
    fn length_limited_construction_respects_bound() {
        // A Fibonacci-like frequency skew that would otherwise build a very deep tree.
        let mut freqs = vec![1u32; 32];
        freqs[0] = 1_000_000;
        let lengths = lengths_from_frequencies(&freqs, 12);
        assert!(lengths.iter().all(|&l| l <= 12));
        assert!(HuffmanTable::build(&lengths).is_ok());
    }

    #[test]
    fn code_longer_than_bound_is_invalid_huffman() {
        let lengths = vec![17u8; 2];
        assert_eq!(HuffmanTable::build(&lengths), Err(LzxError::InvalidHuffman));
    }
}
