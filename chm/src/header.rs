//! ITSF / ITSP / LZXC fixed header records (C4).

use crate::error::{ChmError, Result};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned, LE, U32, U64};

/// Size in bytes of the on-disk [`ItsfHeader`] record.
pub const ITSF_HEADER_LEN: usize = 96;
/// Size in bytes of the on-disk [`ItspHeader`] record.
pub const ITSP_HEADER_LEN: usize = 84;
/// Size in bytes of the on-disk [`LzxcHeader`] record.
pub const LZXC_HEADER_LEN: usize = 40;

const ITSF_SIGNATURE: [u8; 4] = *b"ITSF";
const ITSP_SIGNATURE: [u8; 4] = *b"ITSP";
const LZXC_SIGNATURE: [u8; 4] = *b"LZXC";

const ITSF_VERSION: u32 = 3;
const ITSP_VERSION: u32 = 1;
const LZXC_VERSION: u32 = 2;

/// Window sizes the LZXC header's `window_size` field is allowed to take.
pub const ALLOWED_WINDOW_SIZES: [u32; 7] = [0x8000, 0x10000, 0x20000, 0x40000, 0x80000, 0x100000, 0x200000];

/// On-disk layout of the ITSF (file) header. 96 bytes, little-endian.
#[derive(AsBytes, FromBytes, FromZeroes, Unaligned, Clone, Copy)]
#[repr(C)]
struct ItsfHeaderRaw {
    signature: [u8; 4],
    version: U32<LE>,
    header_len: U32<LE>,
    unknown1: U32<LE>,
    timestamp: U32<LE>,
    language_id: U32<LE>,
    dir_uuid: [u8; 16],
    stream_uuid: [u8; 16],
    unknown_offset: U64<LE>,
    unknown_len: U64<LE>,
    directory_offset: U64<LE>,
    directory_length: U64<LE>,
}

const _: () = assert!(std::mem::size_of::<ItsfHeaderRaw>() == ITSF_HEADER_LEN);

/// Parsed and range-checked ITSF header.
#[derive(Debug, Clone, Copy)]
pub struct ItsfHeader {
    /// Declared header length, usually [`ITSF_HEADER_LEN`].
    pub header_len: u32,
    /// Build timestamp, seconds. No particular epoch is enforced by this crate.
    pub timestamp: u32,
    /// Windows language identifier.
    pub language_id: u32,
    /// Absolute file offset of the directory's first chunk.
    pub directory_offset: u64,
    /// Total byte length of the directory's chunk range.
    pub directory_length: u64,
}

impl ItsfHeader {
    /// Parses and range-checks an ITSF header from the first [`ITSF_HEADER_LEN`] bytes of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ITSF_HEADER_LEN {
            return Err(ChmError::HeaderTruncated);
        }
        let (raw, _) = ItsfHeaderRaw::ref_from_prefix(bytes).ok_or(ChmError::HeaderTruncated)?;

        if raw.signature != ITSF_SIGNATURE {
            return Err(ChmError::BadSignature {
                expected: "ITSF",
                got: raw.signature,
            });
        }
        if raw.version.get() != ITSF_VERSION {
            return Err(ChmError::UnsupportedVersion {
                expected: ITSF_VERSION,
                got: raw.version.get(),
            });
        }

        let header_len = raw.header_len.get();
        if (header_len as usize) < ITSF_HEADER_LEN {
            return Err(ChmError::InvalidHeaderField {
                field: "header_len",
                value: header_len.to_string(),
            });
        }

        let directory_offset = raw.directory_offset.get();
        let directory_length = raw.directory_length.get();
        if directory_offset <= ITSF_HEADER_LEN as u64 {
            return Err(ChmError::InvalidHeaderField {
                field: "directory_offset",
                value: directory_offset.to_string(),
            });
        }
        if directory_length == 0 {
            return Err(ChmError::InvalidHeaderField {
                field: "directory_length",
                value: directory_length.to_string(),
            });
        }

        Ok(Self {
            header_len,
            timestamp: raw.timestamp.get(),
            language_id: raw.language_id.get(),
            directory_offset,
            directory_length,
        })
    }

    /// Serializes this header to exactly [`ITSF_HEADER_LEN`] bytes.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let raw = ItsfHeaderRaw {
            signature: ITSF_SIGNATURE,
            version: U32::new(ITSF_VERSION),
            header_len: U32::new(ITSF_HEADER_LEN as u32),
            unknown1: U32::new(1),
            timestamp: U32::new(self.timestamp),
            language_id: U32::new(self.language_id),
            dir_uuid: [0u8; 16],
            stream_uuid: [0u8; 16],
            unknown_offset: U64::new(0),
            unknown_len: U64::new(0),
            directory_offset: U64::new(self.directory_offset),
            directory_length: U64::new(self.directory_length),
        };
        out.extend_from_slice(raw.as_bytes());
    }
}

/// On-disk layout of the ITSP (directory storage) header. 84 bytes, little-endian.
#[derive(AsBytes, FromBytes, FromZeroes, Unaligned, Clone, Copy)]
#[repr(C)]
struct ItspHeaderRaw {
    signature: [u8; 4],
    version: U32<LE>,
    header_len: U32<LE>,
    unknown1: U32<LE>,
    chunk_size: U32<LE>,
    density: U32<LE>,
    depth: U32<LE>,
    root_chunk_index: U32<LE>,
    first_pmgl: U32<LE>,
    last_pmgl: U32<LE>,
    unknown2: U32<LE>,
    num_chunks: U32<LE>,
    language_id: U32<LE>,
    system_uuid: [u8; 16],
    unknown3: [u8; 16],
}

const _: () = assert!(std::mem::size_of::<ItspHeaderRaw>() == ITSP_HEADER_LEN);

/// Parsed and range-checked ITSP header.
#[derive(Debug, Clone, Copy)]
pub struct ItspHeader {
    /// Size in bytes of each directory chunk; a positive power-of-two multiple of 8.
    pub chunk_size: u32,
    /// B-tree depth (1 if there is no PMGI layer above the leaves).
    pub depth: u32,
    /// Chunk index of the root of the directory B-tree.
    pub root_chunk_index: u32,
    /// Chunk index of the first PMGL (leaf) chunk.
    pub first_pmgl: u32,
    /// Chunk index of the last PMGL (leaf) chunk.
    pub last_pmgl: u32,
    /// Total number of chunks (PMGL + PMGI) in the directory.
    pub num_chunks: u32,
}

impl ItspHeader {
    /// Parses and range-checks an ITSP header from the first [`ITSP_HEADER_LEN`] bytes of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ITSP_HEADER_LEN {
            return Err(ChmError::HeaderTruncated);
        }
        let (raw, _) = ItspHeaderRaw::ref_from_prefix(bytes).ok_or(ChmError::HeaderTruncated)?;

        if raw.signature != ITSP_SIGNATURE {
            return Err(ChmError::BadSignature {
                expected: "ITSP",
                got: raw.signature,
            });
        }
        if raw.version.get() != ITSP_VERSION {
            return Err(ChmError::UnsupportedVersion {
                expected: ITSP_VERSION,
                got: raw.version.get(),
            });
        }

        let chunk_size = raw.chunk_size.get();
        if chunk_size == 0 || chunk_size % 8 != 0 || !chunk_size.is_power_of_two() {
            return Err(ChmError::InvalidHeaderField {
                field: "chunk_size",
                value: chunk_size.to_string(),
            });
        }

        let first_pmgl = raw.first_pmgl.get();
        let last_pmgl = raw.last_pmgl.get();
        if first_pmgl > last_pmgl {
            return Err(ChmError::InvalidHeaderField {
                field: "first_pmgl/last_pmgl",
                value: format!("{first_pmgl} > {last_pmgl}"),
            });
        }

        Ok(Self {
            chunk_size,
            depth: raw.depth.get(),
            root_chunk_index: raw.root_chunk_index.get(),
            first_pmgl,
            last_pmgl,
            num_chunks: raw.num_chunks.get(),
        })
    }

    /// Serializes this header to exactly [`ITSP_HEADER_LEN`] bytes.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let raw = ItspHeaderRaw {
            signature: ITSP_SIGNATURE,
            version: U32::new(ITSP_VERSION),
            header_len: U32::new(ITSP_HEADER_LEN as u32),
            unknown1: U32::new(10),
            chunk_size: U32::new(self.chunk_size),
            density: U32::new(2),
            depth: U32::new(self.depth),
            root_chunk_index: U32::new(self.root_chunk_index),
            first_pmgl: U32::new(self.first_pmgl),
            last_pmgl: U32::new(self.last_pmgl),
            unknown2: U32::new(0xffff_ffff),
            num_chunks: U32::new(self.num_chunks),
            language_id: U32::new(0x409),
            system_uuid: [0u8; 16],
            unknown3: [0u8; 16],
        };
        out.extend_from_slice(raw.as_bytes());
    }
}

/// On-disk layout of the LZXC (compression control) header. 40 bytes, little-endian.
#[derive(AsBytes, FromBytes, FromZeroes, Unaligned, Clone, Copy)]
#[repr(C)]
struct LzxcHeaderRaw {
    signature: [u8; 4],
    version: U32<LE>,
    reset_interval: U32<LE>,
    window_size: U32<LE>,
    cache_size: U32<LE>,
    unknown: [u8; 20],
}

const _: () = assert!(std::mem::size_of::<LzxcHeaderRaw>() == LZXC_HEADER_LEN);

/// Parsed and range-checked LZXC header.
#[derive(Debug, Clone, Copy)]
pub struct LzxcHeader {
    /// Uncompressed byte span between LZX state resets.
    pub reset_interval: u32,
    /// LZX sliding-window size; one of [`ALLOWED_WINDOW_SIZES`].
    pub window_size: u32,
    /// Cache size hint, carried through unmodified; this crate does not interpret it.
    pub cache_size: u32,
}

impl LzxcHeader {
    /// Parses and range-checks an LZXC header from the first [`LZXC_HEADER_LEN`] bytes of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < LZXC_HEADER_LEN {
            return Err(ChmError::HeaderTruncated);
        }
        let (raw, _) = LzxcHeaderRaw::ref_from_prefix(bytes).ok_or(ChmError::HeaderTruncated)?;

        if raw.signature != LZXC_SIGNATURE {
            return Err(ChmError::BadSignature {
                expected: "LZXC",
                got: raw.signature,
            });
        }
        if raw.version.get() != LZXC_VERSION {
            return Err(ChmError::UnsupportedVersion {
                expected: LZXC_VERSION,
                got: raw.version.get(),
            });
        }

        let window_size = raw.window_size.get();
        if !ALLOWED_WINDOW_SIZES.contains(&window_size) {
            return Err(ChmError::InvalidHeaderField {
                field: "window_size",
                value: window_size.to_string(),
            });
        }

        let reset_interval = raw.reset_interval.get();
        if reset_interval == 0 || reset_interval % 0x8000 != 0 {
            return Err(ChmError::InvalidHeaderField {
                field: "reset_interval",
                value: reset_interval.to_string(),
            });
        }

        Ok(Self {
            reset_interval,
            window_size,
            cache_size: raw.cache_size.get(),
        })
    }

    /// Serializes this header to exactly [`LZXC_HEADER_LEN`] bytes.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let raw = LzxcHeaderRaw {
            signature: LZXC_SIGNATURE,
            version: U32::new(LZXC_VERSION),
            reset_interval: U32::new(self.reset_interval),
            window_size: U32::new(self.window_size),
            cache_size: U32::new(self.cache_size),
            unknown: [0u8; 20],
        };
        out.extend_from_slice(raw.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn itsf_round_trips() {
        let h = ItsfHeader {
            header_len: ITSF_HEADER_LEN as u32,
            timestamp: 0x1234_5678,
            language_id: 0x409,
            directory_offset: 1000,
            directory_length: 500,
        };
        let mut bytes = Vec::new();
        h.write_to(&mut bytes);
        assert_eq!(bytes.len(), ITSF_HEADER_LEN);
        let parsed = ItsfHeader::parse(&bytes).unwrap();
        assert_eq!(parsed.timestamp, h.timestamp);
        assert_eq!(parsed.directory_offset, h.directory_offset);
        assert_eq!(parsed.directory_length, h.directory_length);
    }

    #[test]
    fn itsf_bad_signature_is_rejected() {
        let h = ItsfHeader {
            header_len: ITSF_HEADER_LEN as u32,
            timestamp: 0,
            language_id: 0,
            directory_offset: 1000,
            directory_length: 500,
        };
        let mut bytes = Vec::new();
        h.write_to(&mut bytes);
        bytes[0] = b'X';
        assert_eq!(
            ItsfHeader::parse(&bytes),
            Err(ChmError::BadSignature {
                expected: "ITSF",
                got: *b"XTSF",
            })
        );
    }

    #[test]
    fn itsf_truncated_is_rejected() {
        assert_eq!(ItsfHeader::parse(&[0u8; 10]), Err(ChmError::HeaderTruncated));
    }

    #[test]
    fn itsp_round_trips() {
        let h = ItspHeader {
            chunk_size: 4096,
            depth: 1,
            root_chunk_index: 0,
            first_pmgl: 0,
            last_pmgl: 0,
            num_chunks: 1,
        };
        let mut bytes = Vec::new();
        h.write_to(&mut bytes);
        assert_eq!(bytes.len(), ITSP_HEADER_LEN);
        let parsed = ItspHeader::parse(&bytes).unwrap();
        assert_eq!(parsed.chunk_size, 4096);
        assert_eq!(parsed.num_chunks, 1);
    }

    #[test]
    fn itsp_rejects_non_power_of_two_chunk_size() {
        let h = ItspHeader {
            chunk_size: 100,
            depth: 1,
            root_chunk_index: 0,
            first_pmgl: 0,
            last_pmgl: 0,
            num_chunks: 1,
        };
        let mut bytes = Vec::new();
        h.write_to(&mut bytes);
        assert!(matches!(
            ItspHeader::parse(&bytes),
            Err(ChmError::InvalidHeaderField { field: "chunk_size", .. })
        ));
    }

    #[test]
    fn lzxc_round_trips() {
        let h = LzxcHeader {
            reset_interval: 0x8000,
            window_size: 0x8000,
            cache_size: 0,
        };
        let mut bytes = Vec::new();
        h.write_to(&mut bytes);
        assert_eq!(bytes.len(), LZXC_HEADER_LEN);
        let parsed = LzxcHeader::parse(&bytes).unwrap();
        assert_eq!(parsed.window_size, 0x8000);
        assert_eq!(parsed.reset_interval, 0x8000);
    }

    #[test]
    fn lzxc_rejects_bad_window_size() {
        let h = LzxcHeader {
            reset_interval: 0x8000,
            window_size: 0x3000,
            cache_size: 0,
        };
        let mut bytes = Vec::new();
        h.write_to(&mut bytes);
        assert!(matches!(
            LzxcHeader::parse(&bytes),
            Err(ChmError::InvalidHeaderField { field: "window_size", .. })
        ));
    }
}
