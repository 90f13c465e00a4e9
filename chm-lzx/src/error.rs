//! Error type for the LZX bit reader, Huffman coder, sliding window, and decoder/encoder.

/// A failure in the LZX bitstream codec.
///
/// This is deliberately a plain enum with a hand-written `Display`/`Error` impl, not a
/// `thiserror`-derived type: the set of variants is small and stable, and callers higher in
/// the stack match on it directly (see [`crate::ChmError`] in the facade crate, which wraps
/// these into its own tag set).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LzxError {
    /// A byte-aligned read was attempted while the bit cursor was not at a byte boundary.
    Misaligned,
    /// Fewer bits/bytes remained in the buffer than the operation required.
    EndOfStream,
    /// A code-length vector does not form a complete binary tree.
    InvalidHuffman,
    /// No Huffman code matched within the 16-bit bound.
    InvalidHuffmanCode,
    /// A block's declared size could not be satisfied by the remaining bitstream.
    TruncatedBlock,
    /// A block header specified a 3-bit type outside `{1, 2, 3}`.
    UnknownBlockType(u8),
    /// A match referenced a distance or length that the window cannot satisfy.
    InvalidMatch {
        /// The requested back-reference distance.
        distance: u32,
        /// The requested match length.
        length: u32,
        /// The number of bytes written into the window so far.
        window_filled: u32,
    },
    /// A block declared more output bytes than remained in the current reset interval.
    OutputOverflow,
    /// The configured window size is not one of the LZXC-allowed power-of-two sizes.
    WindowTooSmall,
    /// The encoder was asked to produce output it cannot represent (e.g. a match longer than
    /// the format's maximum).
    EncoderFailure(String),
}

impl std::fmt::Display for LzxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Misaligned => write!(f, "bit reader is not byte-aligned"),
            Self::EndOfStream => write!(f, "unexpected end of LZX bitstream"),
            Self::InvalidHuffman => write!(f, "Huffman code-length vector is not a complete tree"),
            Self::InvalidHuffmanCode => write!(f, "no Huffman code matched within 16 bits"),
            Self::TruncatedBlock => write!(f, "LZX block was truncated"),
            Self::UnknownBlockType(t) => write!(f, "unknown LZX block type {t}"),
            Self::InvalidMatch {
                distance,
                length,
                window_filled,
            } => write!(
                f,
                "invalid LZX match: distance {distance}, length {length}, window has {window_filled} bytes"
            ),
            Self::OutputOverflow => write!(f, "LZX block declared more bytes than the reset interval has remaining"),
            Self::WindowTooSmall => write!(f, "window size is not a valid LZXC window size"),
            Self::EncoderFailure(msg) => write!(f, "LZX encoder failure: {msg}"),
        }
    }
}

impl std::error::Error for LzxError {}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, LzxError>;
