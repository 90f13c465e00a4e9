//! LZX sliding-window compression as used by Microsoft Compiled HTML Help (CHM) archives.
//!
//! This crate implements only the LZX bitstream codec (bit/byte reading, canonical Huffman
//! coding, the sliding window, and the block decoder/encoder). It has no knowledge of the CHM
//! container format (headers, directory, reset tables) — that lives in the facade crate that
//! depends on this one.
#![forbid(unused_must_use)]
#![warn(missing_docs)]

pub mod bitreader;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod huffman;
pub mod position_slots;
pub mod trees;
pub mod window;

pub use decoder::{is_valid_window_size, LzxDecoder};
pub use encoder::{encode_reset_interval, encode_reset_interval_with_window};
pub use error::{LzxError, Result};

#[cfg(test)]
#[static_init::dynamic]
static INIT_TEST_LOGGER: () = {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .compact()
        .without_time()
        .try_init();
};
