//! LZX reset table parsing (part of C6's random-access support) and the named-entry paths used
//! to locate it, the compressed content section, and the LZXC control header.

use crate::directory::Directory;
use crate::error::{ChmError, Result};
use tracing::debug;
use uuid::Uuid;

/// The DataSpace transform GUID identifying the MSCompressed (LZX) transform, as stored in the
/// `InstanceData` path below. Matches the well-known CHM constant
/// `{7FC28940-9D31-11D0-9B27-00A0C91E9C7C}`.
pub const LZX_TRANSFORM_GUID: Uuid = Uuid::from_bytes([
    0x7f, 0xc2, 0x89, 0x40, 0x9d, 0x31, 0x11, 0xd0, 0x9b, 0x27, 0x00, 0xa0, 0xc9, 0x1e, 0x9c, 0x7c,
]);

/// Directory entry name of the LZXC control header (40 bytes, but stored as a directory entry
/// whose bytes are the same layout `LzxcHeader::parse` understands).
pub const CONTROL_DATA_NAME: &[u8] = b"::DataSpace/Storage/MSCompressed/ControlData";

/// Directory entry name of the LZX reset table.
pub const RESET_TABLE_NAME: &[u8] =
    b"::DataSpace/Storage/MSCompressed/Transform/{7FC28940-9D31-11D0-9B27-00A0C91E9C7C}/InstanceData/ResetTable";

/// Directory entry name of the compressed content section (section 1's byte range).
pub const CONTENT_NAME: &[u8] = b"::DataSpace/Storage/MSCompressed/Content";

const RESET_TABLE_VERSION: u32 = 2;
const RESET_TABLE_ENTRY_SIZE: u32 = 8;
/// Size of the reset table's fixed header, before the `(compressed, uncompressed)` entry pairs.
const RESET_TABLE_FIXED_HEADER_LEN: usize = 40;

/// A parsed LZX reset table: an index from uncompressed offsets to compressed offsets at
/// reset-interval boundaries, enabling random access into the compressed section.
#[derive(Debug, Clone)]
pub struct ResetTable {
    /// `(compressed_offset, uncompressed_offset)` pairs, cumulative from the section start,
    /// strictly increasing on both axes.
    pub entries: Vec<(u64, u64)>,
    /// Uncompressed byte span between resets (duplicated from the LZXC header at parse time for
    /// convenience; the two are required to agree).
    pub block_size: u64,
    /// Total uncompressed length of the compressed section.
    pub total_uncompressed_length: u64,
    /// Total compressed length of the compressed section.
    pub total_compressed_length: u64,
}

impl ResetTable {
    /// Parses a reset table from its raw directory-entry bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < RESET_TABLE_FIXED_HEADER_LEN {
            return Err(ChmError::ResetTableCorrupt("shorter than fixed header".into()));
        }
        let version = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let block_count = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let entry_size = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let table_offset = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        let total_uncompressed_length = u64::from_le_bytes(bytes[16..24].try_into().unwrap());
        let total_compressed_length = u64::from_le_bytes(bytes[24..32].try_into().unwrap());
        let block_size = u64::from_le_bytes(bytes[32..40].try_into().unwrap());

        if version != RESET_TABLE_VERSION {
            return Err(ChmError::ResetTableCorrupt(format!("unsupported version {version}")));
        }
        if entry_size != RESET_TABLE_ENTRY_SIZE {
            return Err(ChmError::ResetTableCorrupt(format!("unsupported entry size {entry_size}")));
        }

        let table_start = table_offset as usize;
        let mut entries = Vec::with_capacity(block_count as usize);
        let mut pos = table_start;
        let mut prev_compressed = 0u64;
        let mut prev_uncompressed = 0u64;
        for i in 0..block_count {
            let end = pos.checked_add(8).ok_or(ChmError::Overflow("reset table entry span"))?;
            let entry_bytes = bytes
                .get(pos..end)
                .ok_or_else(|| ChmError::ResetTableCorrupt(format!("entry {i} runs past table bytes")))?;
            let compressed_offset = u32::from_le_bytes(entry_bytes[0..4].try_into().unwrap()) as u64;
            let uncompressed_offset = u32::from_le_bytes(entry_bytes[4..8].try_into().unwrap()) as u64;

            if i > 0 && (compressed_offset <= prev_compressed || uncompressed_offset <= prev_uncompressed) {
                return Err(ChmError::ResetTableCorrupt(format!(
                    "entry {i} is not strictly increasing over entry {}",
                    i - 1
                )));
            }
            prev_compressed = compressed_offset;
            prev_uncompressed = uncompressed_offset;
            entries.push((compressed_offset, uncompressed_offset));
            pos = end;
        }

        debug!(block_count, block_size, total_uncompressed_length, "parsed LZX reset table");

        Ok(Self {
            entries,
            block_size,
            total_uncompressed_length,
            total_compressed_length,
        })
    }

    /// Serializes a reset table built from `block_size`-aligned `(compressed, uncompressed)`
    /// offset pairs.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&RESET_TABLE_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        out.extend_from_slice(&RESET_TABLE_ENTRY_SIZE.to_le_bytes());
        out.extend_from_slice(&(RESET_TABLE_FIXED_HEADER_LEN as u32).to_le_bytes());
        out.extend_from_slice(&self.total_uncompressed_length.to_le_bytes());
        out.extend_from_slice(&self.total_compressed_length.to_le_bytes());
        out.extend_from_slice(&self.block_size.to_le_bytes());
        for &(compressed, uncompressed) in &self.entries {
            out.extend_from_slice(&(compressed as u32).to_le_bytes());
            out.extend_from_slice(&(uncompressed as u32).to_le_bytes());
        }
    }

    /// Uncompressed byte length covered by reset interval `idx`: the span from that entry's
    /// `uncompressed_offset` up to the next entry's (or the section total, for the last one).
    pub fn interval_uncompressed_len(&self, idx: usize) -> u64 {
        let start = self.entries[idx].1;
        let end = self
            .entries
            .get(idx + 1)
            .map(|&(_, u)| u)
            .unwrap_or(self.total_uncompressed_length);
        end - start
    }

    /// Index of the reset-table entry whose `uncompressed_offset` equals `interval_start`.
    pub fn index_for_uncompressed_offset(&self, interval_start: u64) -> Option<usize> {
        self.entries.iter().position(|&(_, u)| u == interval_start)
    }

    /// Finds the reset-table entry with the greatest `uncompressed_offset <= target`, returning
    /// `(compressed_offset, uncompressed_offset)` to seek the decoder to before discarding the
    /// remainder up to `target`.
    pub fn locate(&self, target: u64) -> (u64, u64) {
        match self.entries.binary_search_by(|&(_, u)| u.cmp(&target)) {
            Ok(i) => self.entries[i],
            Err(0) => (0, 0),
            Err(i) => self.entries[i - 1],
        }
    }
}

/// Resolves the reset table, using its named directory entry — never trusting an incoming reader
/// position, per the facade's "locate everything through the directory" design.
///
/// `section0_bytes` is the uncompressed section's bytes (section 0), since `ResetTable`,
/// `ControlData`, and `Content` are themselves stored uncompressed, addressed relative to that
/// section's base, exactly like any other section-0 directory entry.
pub fn locate_reset_table(directory: &Directory, section0_bytes: &[u8]) -> Result<ResetTable> {
    let entry = directory
        .get(RESET_TABLE_NAME)
        .ok_or_else(|| ChmError::ResetTableCorrupt("no ResetTable directory entry".into()))?;
    let start = entry.offset as usize;
    let end = start
        .checked_add(entry.length as usize)
        .ok_or(ChmError::Overflow("reset table span"))?;
    let bytes = section0_bytes
        .get(start..end)
        .ok_or_else(|| ChmError::ResetTableCorrupt("ResetTable entry span exceeds section 0".into()))?;
    ResetTable::parse(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> ResetTable {
        ResetTable {
            entries: vec![(0, 0), (100, 0x8000), (210, 0x10000)],
            block_size: 0x8000,
            total_uncompressed_length: 0x18000,
            total_compressed_length: 300,
        }
    }

    #[test]
    fn reset_table_round_trips() {
        let table = sample_table();
        let mut bytes = Vec::new();
        table.write_to(&mut bytes);
        let parsed = ResetTable::parse(&bytes).unwrap();
        assert_eq!(parsed.entries, table.entries);
        assert_eq!(parsed.total_uncompressed_length, table.total_uncompressed_length);
    }

    #[test]
    fn locate_finds_greatest_entry_not_exceeding_target() {
        let table = sample_table();
        assert_eq!(table.locate(0), (0, 0));
        assert_eq!(table.locate(0x8000), (100, 0x8000));
        assert_eq!(table.locate(0x8001), (100, 0x8000));
        assert_eq!(table.locate(0x10050), (210, 0x10000));
    }

    #[test]
    fn non_monotonic_entries_are_rejected() {
        let mut table = sample_table();
        table.entries[2] = (50, 0x10000); // compressed_offset goes backward
        let mut bytes = Vec::new();
        table.write_to(&mut bytes);
        assert!(matches!(ResetTable::parse(&bytes), Err(ChmError::ResetTableCorrupt(_))));
    }

    #[test]
    fn transform_guid_matches_well_known_value() {
        assert_eq!(LZX_TRANSFORM_GUID.to_string(), "7fc28940-9d31-11d0-9b27-00a0c91e9c7c");
    }
}
