//! LZX sliding window: the LZ77 match history (C3).

use crate::error::{LzxError, Result};

/// A fixed-size circular byte buffer backing LZ77 back-references.
pub struct Window {
    buf: Vec<u8>,
    pos: usize,
    filled: usize,
}

impl Window {
    /// Creates a window of the given size. `size` must be a power of two (LZXC's window-size
    /// invariant); this is not re-validated here, it is the caller's responsibility (see
    /// `crate::decoder::is_valid_window_size`).
    pub fn new(size: u32) -> Self {
        Self {
            buf: vec![0u8; size as usize],
            pos: 0,
            filled: 0,
        }
    }

    /// The window capacity in bytes.
    pub fn capacity(&self) -> u32 {
        self.buf.len() as u32
    }

    /// Zeroes the buffer and resets the write cursor, as required at every reset-interval
    /// boundary.
    pub fn reset(&mut self) {
        self.buf.iter_mut().for_each(|b| *b = 0);
        self.pos = 0;
        self.filled = 0;
    }

    /// Writes one byte at the current cursor and appends it to `out`.
    pub fn write_byte(&mut self, b: u8, out: &mut Vec<u8>) {
        let cap = self.buf.len();
        self.buf[self.pos] = b;
        self.pos = (self.pos + 1) % cap;
        self.filled = (self.filled + 1).min(cap);
        out.push(b);
    }

    /// Copies `length` bytes from `distance` bytes behind the current cursor, one byte at a
    /// time so overlapping ranges self-extend (standard LZ77 semantics), appending the copied
    /// bytes to `out`.
    pub fn copy_match(&mut self, distance: u32, length: u32, out: &mut Vec<u8>) -> Result<()> {
        let cap = self.buf.len();
        if distance == 0 || distance as usize > cap || distance as usize > self.filled {
            return Err(LzxError::InvalidMatch {
                distance,
                length,
                window_filled: self.filled as u32,
            });
        }

        for _ in 0..length {
            let src_pos = (self.pos + cap - distance as usize) % cap;
            let b = self.buf[src_pos];
            self.write_byte(b, out);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_match_self_extends_when_length_exceeds_distance() {
        let mut w = Window::new(16);
        let mut out = Vec::new();
        for &b in b"AB" {
            w.write_byte(b, &mut out);
        }
        // distance 2, length 5 -> "ABABA"
        w.copy_match(2, 5, &mut out).unwrap();
        assert_eq!(out, b"ABABABA");
    }

    #[test]
    fn copy_match_matches_bytes_at_distance() {
        let mut w = Window::new(16);
        let mut out = Vec::new();
        for &b in b"hello world" {
            w.write_byte(b, &mut out);
        }
        let before = out.clone();
        w.copy_match(6, 5, &mut out).unwrap();
        assert_eq!(&out[before.len()..], &before[before.len() - 6..before.len() - 1]);
    }

    #[test]
    fn unwritten_distance_is_invalid_match() {
        let mut w = Window::new(16);
        let mut out = Vec::new();
        w.write_byte(b'A', &mut out);
        assert!(matches!(
            w.copy_match(5, 1, &mut out),
            Err(LzxError::InvalidMatch { .. })
        ));
    }

    #[test]
    fn reset_clears_buffer_and_cursor() {
        let mut w = Window::new(8);
        let mut out = Vec::new();
        for &b in b"abcdefgh" {
            w.write_byte(b, &mut out);
        }
        w.reset();
        assert_eq!(w.filled, 0);
        assert_eq!(w.pos, 0);
        assert!(w.buf.iter().all(|&b| b == 0));
    }
}
