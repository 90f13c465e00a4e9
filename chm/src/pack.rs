//! Packing a set of named byte buffers into a new CHM archive (write side of C4/C5/C6/C7).

use crate::directory::{write_encint, Directory, DirectoryEntry};
use crate::header::{ItsfHeader, ItspHeader, LzxcHeader, ITSF_HEADER_LEN, ITSP_HEADER_LEN, LZXC_HEADER_LEN};
use crate::reset_table::{ResetTable, CONTENT_NAME, CONTROL_DATA_NAME, RESET_TABLE_NAME};
use crate::{ChmError, Options};
use anyhow::{ensure, Result};
use ms_chm_lzx::encode_reset_interval_with_window;
use std::io::Write;
use tracing::{debug, debug_span};

/// One caller-supplied file to pack.
pub struct PackEntry {
    /// Stored name (should start with `/`, e.g. `/index.html`).
    pub name: Vec<u8>,
    /// File contents.
    pub data: Vec<u8>,
    /// Whether to store this entry in the LZX-compressed section (`true`) or the uncompressed
    /// section (`false`).
    pub compress: bool,
}

/// Summary statistics returned by [`pack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackSummary {
    /// Number of entries written (user files only, not the internal DataSpace entries).
    pub file_count: usize,
    /// Total uncompressed byte length of all compressed-section entries.
    pub total_uncompressed: u64,
    /// Total on-disk byte length of the LZX-compressed section.
    pub total_compressed: u64,
}

/// Packs `entries` into a new CHM archive, writing the complete file bytes to `sink`.
///
/// Entries are stored in the order given; callers wanting a specific on-disk entry order
/// (typically sorted by name) should sort `entries` themselves beforehand.
pub fn pack<W: Write>(entries: &[PackEntry], sink: &mut W, options: &Options) -> Result<PackSummary> {
    let _span = debug_span!("chm::pack", num_entries = entries.len()).entered();

    let mut directory = Directory::default();

    // Section 0 (uncompressed): user entries with `compress: false`.
    let mut section0 = Vec::new();
    for entry in entries.iter().filter(|e| !e.compress) {
        let offset = section0.len() as u64;
        section0.extend_from_slice(&entry.data);
        directory.insert(DirectoryEntry {
            name: entry.name.clone(),
            section_id: 0,
            offset,
            length: entry.data.len() as u64,
        });
    }

    // Section 1 (LZX-compressed): user entries with `compress: true`, concatenated into one
    // uncompressed stream and compressed in `reset_interval`-sized chunks.
    let mut uncompressed_stream = Vec::new();
    for entry in entries.iter().filter(|e| e.compress) {
        let offset = uncompressed_stream.len() as u64;
        uncompressed_stream.extend_from_slice(&entry.data);
        directory.insert(DirectoryEntry {
            name: entry.name.clone(),
            section_id: 1,
            offset,
            length: entry.data.len() as u64,
        });
    }

    let (compressed, reset_table) = compress_stream(&uncompressed_stream, options)?;
    debug!(
        total_uncompressed = uncompressed_stream.len(),
        total_compressed = compressed.len(),
        "compressed LZX content section"
    );

    // The ResetTable/ControlData/Content entries are themselves section-0 (uncompressed)
    // entries, addressed relative to section 0's base, mirroring how real CHM archives store
    // their DataSpace metadata uncompressed alongside user content.
    let mut reset_table_bytes = Vec::new();
    reset_table.write_to(&mut reset_table_bytes);
    let reset_table_offset = section0.len() as u64;
    section0.extend_from_slice(&reset_table_bytes);

    let mut control_data = Vec::new();
    let lzxc = LzxcHeader {
        reset_interval: options.reset_interval,
        window_size: options.window_size,
        cache_size: 0,
    };
    lzxc.write_to(&mut control_data);
    let control_data_offset = section0.len() as u64;
    section0.extend_from_slice(&control_data);

    let content_offset_in_section0 = section0.len() as u64;
    // The `Content` entry's length is the compressed section's length; its bytes are not stored
    // in section 0 itself (they live in their own section, appended after section 0 below), so
    // this entry exists purely to carry the offset/length pair the facade resolves at open time.
    directory.insert(DirectoryEntry {
        name: RESET_TABLE_NAME.to_vec(),
        section_id: 0,
        offset: reset_table_offset,
        length: reset_table_bytes.len() as u64,
    });
    directory.insert(DirectoryEntry {
        name: CONTROL_DATA_NAME.to_vec(),
        section_id: 0,
        offset: control_data_offset,
        length: control_data.len() as u64,
    });
    directory.insert(DirectoryEntry {
        name: CONTENT_NAME.to_vec(),
        section_id: 0,
        offset: content_offset_in_section0,
        length: compressed.len() as u64,
    });

    let chunk_size = 4096u32;
    let (chunk_bytes, num_chunks, first_pmgl, last_pmgl) = directory.serialize(chunk_size as usize);

    let directory_offset = (ITSF_HEADER_LEN + ITSP_HEADER_LEN + LZXC_HEADER_LEN) as u64;
    let directory_length = chunk_bytes.len() as u64;

    let itsf = ItsfHeader {
        header_len: ITSF_HEADER_LEN as u32,
        timestamp: 0,
        language_id: 0x409,
        directory_offset,
        directory_length,
    };
    let itsp = ItspHeader {
        chunk_size,
        depth: 1,
        root_chunk_index: 0,
        first_pmgl,
        last_pmgl,
        num_chunks,
    };

    let mut out = Vec::new();
    itsf.write_to(&mut out);
    itsp.write_to(&mut out);
    lzxc.write_to(&mut out);
    out.extend_from_slice(&chunk_bytes);
    out.extend_from_slice(&section0);
    out.extend_from_slice(&compressed);

    let summary = PackSummary {
        file_count: entries.len(),
        total_uncompressed: uncompressed_stream.len() as u64,
        total_compressed: compressed.len() as u64,
    };
    sink.write_all(&out)?;
    Ok(summary)
}

/// Splits `stream` into `options.reset_interval`-sized chunks, compresses each independently
/// (fresh LZX state per chunk, per the reset-interval contract), and builds the corresponding
/// reset table.
fn compress_stream(stream: &[u8], options: &Options) -> Result<(Vec<u8>, ResetTable)> {
    ensure!(
        options.reset_interval > 0 && options.reset_interval % 0x8000 == 0,
        "reset_interval must be a positive multiple of 0x8000"
    );

    let mut compressed = Vec::new();
    let mut entries = Vec::new();
    let mut pos = 0usize;

    while pos < stream.len() {
        let interval_len = (stream.len() - pos).min(options.reset_interval as usize);
        entries.push((compressed.len() as u64, pos as u64));
        encode_reset_interval_with_window(&stream[pos..pos + interval_len], options.window_size, &mut compressed)
            .map_err(ChmError::from)?;
        pos += interval_len;
    }

    let reset_table = ResetTable {
        entries,
        block_size: options.reset_interval as u64,
        total_uncompressed_length: stream.len() as u64,
        total_compressed_length: compressed.len() as u64,
    };

    Ok((compressed, reset_table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Chm;

    fn write_encint_vec(values: &[u64]) -> Vec<u8> {
        let mut out = Vec::new();
        for &v in values {
            write_encint(v, &mut out);
        }
        out
    }

    #[test]
    fn encint_helper_is_reexported_and_usable() {
        // Smoke test that the directory module's ENCINT writer is reachable from here.
        let v = write_encint_vec(&[1, 2, 3]);
        assert!(!v.is_empty());
    }

    #[test]
    fn pack_then_open_round_trips_mixed_entries() {
        let entries = vec![
            PackEntry {
                name: b"/README".to_vec(),
                data: b"hello".to_vec(),
                compress: false,
            },
            PackEntry {
                name: b"/a.txt".to_vec(),
                data: b"AAAAAAAAAA".to_vec(),
                compress: true,
            },
        ];
        let options = Options::default();
        let mut bytes = Vec::new();
        let summary = pack(&entries, &mut bytes, &options).unwrap();
        assert_eq!(summary.file_count, 2);

        let chm = Chm::open(bytes, &options).unwrap();
        assert_eq!(chm.extract(b"/README").unwrap(), b"hello");
        assert_eq!(chm.extract(b"/a.txt").unwrap(), b"AAAAAAAAAA");
    }

    #[test]
    fn empty_pack_has_no_user_entries() {
        let options = Options::default();
        let mut bytes = Vec::new();
        let summary = pack(&[], &mut bytes, &options).unwrap();
        assert_eq!(summary.file_count, 0);
        let chm = Chm::open(bytes, &options).unwrap();
        assert_eq!(chm.list().count(), 0);
        assert!(matches!(chm.extract(b"/missing"), Err(_)));
    }

    #[test]
    fn cross_reset_interval_entry_round_trips() {
        let mut data = Vec::new();
        let mut state: u32 = 0x1234;
        for _ in 0..(3 * 0x8000) {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            data.push((state & 0xff) as u8);
        }

        let entries = vec![PackEntry {
            name: b"/big.bin".to_vec(),
            data: data.clone(),
            compress: true,
        }];
        let options = Options::default();
        let mut bytes = Vec::new();
        pack(&entries, &mut bytes, &options).unwrap();
        let chm = Chm::open(bytes, &options).unwrap();
        assert_eq!(chm.extract(b"/big.bin").unwrap(), data);
    }
}
