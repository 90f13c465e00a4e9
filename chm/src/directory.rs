//! PMGL/PMGI directory chunk parsing and serialization (C5).

use crate::error::{ChmError, Result};
use crate::header::{ItsfHeader, ItspHeader};
use std::collections::BTreeMap;
use tracing::{trace, warn};

const PMGL_SIGNATURE: [u8; 4] = *b"PMGL";
const PMGI_SIGNATURE: [u8; 4] = *b"PMGI";

/// Size of a PMGL chunk's fixed header: signature, free-space, unknown, prev/next links.
const PMGL_CHUNK_HEADER_LEN: usize = 20;

/// One parsed directory entry: a stored file's name, section, and span within that section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Stored name, exactly as it appears on disk (typically starting with `/`).
    pub name: Vec<u8>,
    /// `0` for the uncompressed section, `1` for the LZX-compressed section.
    pub section_id: u64,
    /// Offset of this entry's bytes within its section.
    pub offset: u64,
    /// Length of this entry's bytes within its section.
    pub length: u64,
}

/// Reads a big-endian base-128 varint (the directory's ENCINT format): each byte's low 7 bits
/// contribute to the value, high-order byte first; the high bit set means "more bytes follow".
pub fn read_encint(bytes: &[u8], pos: &mut usize) -> Result<u64> {
    let mut value: u64 = 0;
    loop {
        let Some(&b) = bytes.get(*pos) else {
            return Err(ChmError::DirectoryCorrupt("ENCINT ran past chunk end".into()));
        };
        *pos += 1;
        value = value
            .checked_shl(7)
            .ok_or(ChmError::Overflow("ENCINT"))?
            .checked_add((b & 0x7f) as u64)
            .ok_or(ChmError::Overflow("ENCINT"))?;
        if b & 0x80 == 0 {
            return Ok(value);
        }
    }
}

/// Writes `value` as a big-endian base-128 varint (ENCINT), appending to `out`.
pub fn write_encint(mut value: u64, out: &mut Vec<u8>) {
    let mut groups = vec![(value & 0x7f) as u8];
    value >>= 7;
    while value > 0 {
        groups.push((value & 0x7f) as u8);
        value >>= 7;
    }
    for (i, &g) in groups.iter().rev().enumerate() {
        let is_last = i == groups.len() - 1;
        out.push(if is_last { g } else { g | 0x80 });
    }
}

/// The parsed directory: every stored entry, keyed by its exact on-disk name, in a name-sorted
/// map (matching the PMGL on-disk sort order, so iteration order matches file order).
#[derive(Debug, Default, Clone)]
pub struct Directory {
    entries: BTreeMap<Vec<u8>, DirectoryEntry>,
}

impl Directory {
    /// Parses the directory starting at `itsf.directory_offset`, covering `itsf.directory_length`
    /// bytes, organized into `itsp.chunk_size`-byte chunks.
    ///
    /// `strict` enables the on-disk sort-order check (`DirectoryUnsorted`).
    pub fn parse(bytes: &[u8], itsf: &ItsfHeader, itsp: &ItspHeader, strict: bool) -> Result<Self> {
        let dir_start = itsf.directory_offset as usize;
        let dir_len = itsf.directory_length as usize;
        let dir_end = dir_start.checked_add(dir_len).ok_or(ChmError::Overflow("directory span"))?;
        if bytes.len() < dir_end {
            return Err(ChmError::DirectoryCorrupt(format!(
                "archive is {} bytes, directory needs {dir_end}",
                bytes.len()
            )));
        }

        let chunk_size = itsp.chunk_size as usize;
        let mut entries = BTreeMap::new();

        let num_chunks = dir_len / chunk_size;
        for chunk_index in 0..num_chunks {
            let chunk_start = dir_start + chunk_index * chunk_size;
            let chunk = &bytes[chunk_start..chunk_start + chunk_size];
            if chunk.len() < 4 {
                return Err(ChmError::DirectoryCorrupt("chunk shorter than signature".into()));
            }

            match chunk[0..4].try_into().unwrap() {
                PMGL_SIGNATURE => {
                    parse_pmgl_chunk(chunk, strict, &mut entries)?;
                }
                PMGI_SIGNATURE => {
                    trace!(chunk_index, "skipping PMGI index chunk");
                }
                other => {
                    return Err(ChmError::DirectoryCorrupt(format!(
                        "chunk {chunk_index} has unrecognized signature {:?}",
                        String::from_utf8_lossy(&other)
                    )));
                }
            }
        }

        Ok(Self { entries })
    }

    /// Looks up an entry by its exact on-disk name.
    pub fn get(&self, name: &[u8]) -> Option<&DirectoryEntry> {
        self.entries.get(name)
    }

    /// Iterates all entries in name-sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.entries.values()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the directory has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts an entry (used when building a directory to pack).
    pub fn insert(&mut self, entry: DirectoryEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }

    /// Serializes all entries into a sequence of `chunk_size`-byte PMGL chunks (no PMGI layer:
    /// sufficient for the entry counts this crate is expected to pack, per the component design).
    ///
    /// Returns the serialized chunk bytes and the resulting `(num_chunks, first_pmgl, last_pmgl)`.
    pub fn serialize(&self, chunk_size: usize) -> (Vec<u8>, u32, u32, u32) {
        let mut chunks_bytes = Vec::new();
        let mut current = Vec::new();
        let mut chunk_payloads: Vec<Vec<u8>> = Vec::new();

        for entry in self.entries.values() {
            let mut encoded = Vec::new();
            write_encint(entry.name.len() as u64, &mut encoded);
            encoded.extend_from_slice(&entry.name);
            write_encint(entry.section_id, &mut encoded);
            write_encint(entry.offset, &mut encoded);
            write_encint(entry.length, &mut encoded);

            if current.len() + encoded.len() > chunk_size - PMGL_CHUNK_HEADER_LEN {
                chunk_payloads.push(std::mem::take(&mut current));
            }
            current.extend_from_slice(&encoded);
        }
        chunk_payloads.push(current);

        let num_chunks = chunk_payloads.len() as u32;
        for (i, payload) in chunk_payloads.iter().enumerate() {
            let free_space = chunk_size - PMGL_CHUNK_HEADER_LEN - payload.len();
            let prev = if i == 0 { -1i32 } else { i as i32 - 1 };
            let next = if i + 1 == chunk_payloads.len() { -1i32 } else { i as i32 + 1 };

            chunks_bytes.extend_from_slice(&PMGL_SIGNATURE);
            chunks_bytes.extend_from_slice(&(free_space as u32).to_le_bytes());
            chunks_bytes.extend_from_slice(&0u32.to_le_bytes());
            chunks_bytes.extend_from_slice(&prev.to_le_bytes());
            chunks_bytes.extend_from_slice(&next.to_le_bytes());
            chunks_bytes.extend_from_slice(payload);
            chunks_bytes.resize(chunks_bytes.len() + free_space, 0);
        }

        (chunks_bytes, num_chunks, 0, num_chunks - 1)
    }
}

fn parse_pmgl_chunk(chunk: &[u8], strict: bool, entries: &mut BTreeMap<Vec<u8>, DirectoryEntry>) -> Result<()> {
    if chunk.len() < PMGL_CHUNK_HEADER_LEN {
        return Err(ChmError::DirectoryCorrupt("PMGL chunk shorter than its fixed header".into()));
    }
    let free_space_at_end = u32::from_le_bytes(chunk[4..8].try_into().unwrap()) as usize;
    let payload_end = chunk
        .len()
        .checked_sub(free_space_at_end)
        .ok_or(ChmError::DirectoryCorrupt("free_space_at_end exceeds chunk size".into()))?;

    let mut pos = PMGL_CHUNK_HEADER_LEN;
    let mut prev_name: Option<Vec<u8>> = None;

    while pos < payload_end {
        let name_len = read_encint(chunk, &mut pos)? as usize;
        let name_end = pos.checked_add(name_len).ok_or(ChmError::Overflow("entry name span"))?;
        if name_end > payload_end {
            return Err(ChmError::DirectoryCorrupt("entry name runs past chunk payload".into()));
        }
        let name = chunk[pos..name_end].to_vec();
        pos = name_end;

        let section_id = read_encint(chunk, &mut pos)?;
        let offset = read_encint(chunk, &mut pos)?;
        let length = read_encint(chunk, &mut pos)?;

        if let Some(prev) = &prev_name {
            if name.as_slice() <= prev.as_slice() {
                if strict {
                    return Err(ChmError::DirectoryUnsorted);
                }
                warn!("directory entries are not strictly sorted; continuing in non-strict mode");
            }
        }
        prev_name = Some(name.clone());

        entries.insert(
            name.clone(),
            DirectoryEntry {
                name,
                section_id,
                offset,
                length,
            },
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encint_round_trips_small_and_large_values() {
        for v in [0u64, 1, 127, 128, 300, 16384, u32::MAX as u64, u64::MAX >> 10] {
            let mut out = Vec::new();
            write_encint(v, &mut out);
            let mut pos = 0;
            assert_eq!(read_encint(&out, &mut pos).unwrap(), v);
            assert_eq!(pos, out.len());
        }
    }

    #[test]
    fn encint_truncated_is_rejected() {
        let mut pos = 0;
        assert!(read_encint(&[0x80], &mut pos).is_err());
    }

    #[test]
    fn directory_serialize_then_parse_round_trips() {
        let mut dir = Directory::default();
        dir.insert(DirectoryEntry {
            name: b"/a.txt".to_vec(),
            section_id: 1,
            offset: 0,
            length: 10,
        });
        dir.insert(DirectoryEntry {
            name: b"/b.txt".to_vec(),
            section_id: 0,
            offset: 10,
            length: 20,
        });

        let (chunk_bytes, num_chunks, first, last) = dir.serialize(4096);
        assert_eq!(num_chunks, 1);
        assert_eq!(first, 0);
        assert_eq!(last, 0);

        let mut full = vec![0u8; 96];
        full.extend_from_slice(&chunk_bytes);

        let itsf = ItsfHeader {
            header_len: 96,
            timestamp: 0,
            language_id: 0,
            directory_offset: 96,
            directory_length: chunk_bytes.len() as u64,
        };
        let itsp = ItspHeader {
            chunk_size: 4096,
            depth: 1,
            root_chunk_index: 0,
            first_pmgl: 0,
            last_pmgl: 0,
            num_chunks: 1,
        };

        let parsed = Directory::parse(&full, &itsf, &itsp, true).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.get(b"/a.txt").unwrap().length, 10);
        assert_eq!(parsed.get(b"/b.txt").unwrap().section_id, 0);
    }

    #[test]
    fn unsorted_chunk_is_rejected_in_strict_mode() {
        let mut chunk = Vec::new();
        chunk.extend_from_slice(&PMGL_SIGNATURE);
        chunk.extend_from_slice(&0u32.to_le_bytes()); // free_space filled in below
        chunk.extend_from_slice(&0u32.to_le_bytes());
        chunk.extend_from_slice(&(-1i32).to_le_bytes());
        chunk.extend_from_slice(&(-1i32).to_le_bytes());

        let mut payload = Vec::new();
        for name in [&b"/z"[..], &b"/a"[..]] {
            write_encint(name.len() as u64, &mut payload);
            payload.extend_from_slice(name);
            write_encint(1, &mut payload);
            write_encint(0, &mut payload);
            write_encint(1, &mut payload);
        }
        chunk.extend_from_slice(&payload);
        let free_space = 4096 - PMGL_CHUNK_HEADER_LEN - payload.len();
        chunk.resize(chunk.len() + free_space, 0);
        chunk[4..8].copy_from_slice(&(free_space as u32).to_le_bytes());

        let mut entries = BTreeMap::new();
        assert_eq!(parse_pmgl_chunk(&chunk, true, &mut entries), Err(ChmError::DirectoryUnsorted));
    }
}
