//! Error type for the CHM container: headers, directory, reset table, and facade operations.

use ms_chm_lzx::LzxError;

/// A failure reading or writing a CHM archive.
///
/// Like [`LzxError`] in the leaf crate, this is a hand-written enum with manual `Display`/`Error`
/// impls rather than a `thiserror` derive, carrying the stable tags callers match on. Facade-level
/// callers generally propagate this via `anyhow::Error` (see `Chm::open`/`Chm::extract`), but the
/// concrete tag survives through `anyhow::Error::downcast_ref`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChmError {
    /// A fixed header's ASCII signature did not match what was expected.
    BadSignature {
        /// The signature this crate requires.
        expected: &'static str,
        /// The signature actually found on disk.
        got: [u8; 4],
    },
    /// A fixed header's version field was not one this crate supports.
    UnsupportedVersion {
        /// The version this crate requires.
        expected: u32,
        /// The version actually found on disk.
        got: u32,
    },
    /// Fewer bytes remained than a fixed header declares itself to be.
    HeaderTruncated,
    /// A header field failed its range check.
    InvalidHeaderField {
        /// The field name.
        field: &'static str,
        /// The value that failed the check, rendered for display.
        value: String,
    },
    /// The directory's chunk structure could not be parsed (bad signature, entry past chunk end,
    /// malformed ENCINT, and similar).
    DirectoryCorrupt(String),
    /// A PMGL chunk's entries were not sorted ascending by name (strict mode only).
    DirectoryUnsorted,
    /// The reset table could not be located or parsed.
    ResetTableCorrupt(String),
    /// A requested entry name is not present in the directory.
    EntryNotFound,
    /// A numeric field overflowed during a checked computation (offset + length, etc).
    Overflow(&'static str),
    /// Wraps a failure from the LZX bitstream codec.
    Lzx(LzxError),
}

impl std::fmt::Display for ChmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadSignature { expected, got } => {
                write!(f, "bad signature: expected {expected:?}, got {:?}", String::from_utf8_lossy(got))
            }
            Self::UnsupportedVersion { expected, got } => {
                write!(f, "unsupported version: expected {expected}, got {got}")
            }
            Self::HeaderTruncated => write!(f, "header truncated"),
            Self::InvalidHeaderField { field, value } => write!(f, "invalid header field {field}: {value}"),
            Self::DirectoryCorrupt(msg) => write!(f, "directory corrupt: {msg}"),
            Self::DirectoryUnsorted => write!(f, "directory chunk entries are not sorted"),
            Self::ResetTableCorrupt(msg) => write!(f, "reset table corrupt: {msg}"),
            Self::EntryNotFound => write!(f, "entry not found"),
            Self::Overflow(what) => write!(f, "numeric overflow computing {what}"),
            Self::Lzx(e) => write!(f, "LZX error: {e}"),
        }
    }
}

impl std::error::Error for ChmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Lzx(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LzxError> for ChmError {
    fn from(e: LzxError) -> Self {
        Self::Lzx(e)
    }
}

/// Convenience alias used throughout this crate's lower layers; the facade surface uses
/// `anyhow::Result` instead (see the crate-level docs).
pub type Result<T> = std::result::Result<T, ChmError>;
