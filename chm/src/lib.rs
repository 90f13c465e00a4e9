//! Reads and writes Microsoft Compiled HTML Help (CHM) archives.
//!
//! A CHM archive is three fixed headers (ITSF, ITSP, LZXC), a PMGL/PMGI directory B-tree mapping
//! stored names to byte ranges, an uncompressed section (section 0), and an LZX-compressed
//! section (section 1) holding the bulk of the content. This crate's modules mirror that layout:
//! [`header`] parses the fixed headers, [`directory`] the B-tree, [`reset_table`] the random-access
//! index into the compressed section, and [`pack`] the write side. [`ms_chm_lzx`] is the dependency
//! that implements the LZX bitstream itself.

#![forbid(unused_must_use)]
#![warn(missing_docs)]

pub mod directory;
pub mod error;
pub mod header;
pub mod pack;
pub mod reset_table;

pub use error::ChmError;
pub use pack::{pack, PackEntry, PackSummary};

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

use anyhow::{bail, ensure, Context, Result};
use directory::Directory;
use header::{ItsfHeader, ItspHeader, LzxcHeader, ITSF_HEADER_LEN, ITSP_HEADER_LEN, LZXC_HEADER_LEN};
use ms_chm_lzx::bitreader::BitReader;
use ms_chm_lzx::LzxDecoder;
use reset_table::{locate_reset_table, ResetTable, CONTENT_NAME};
use sync_file::ReadAt;
use tracing::{debug, debug_span};

/// Options controlling how archives are read and written.
///
/// There is no global configuration in this crate; every entry point takes an explicit
/// `&Options`.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// LZX sliding-window size used when packing new archives. Must be one of
    /// [`header::ALLOWED_WINDOW_SIZES`]. Ignored when opening an existing archive, whose window
    /// size comes from its own LZXC header.
    pub window_size: u32,
    /// Uncompressed byte span between LZX state resets when packing. Must be a positive multiple
    /// of `0x8000`.
    pub reset_interval: u32,
    /// Whether to reject directories whose PMGL entries are not sorted ascending by name. Real
    /// CHM archives are always sorted; this exists for tolerating hand-crafted test fixtures and
    /// other tools' lenient output.
    pub strict_directory_order: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            window_size: 0x8000,
            reset_interval: 0x8000,
            strict_directory_order: true,
        }
    }
}

/// Summary information about an open archive, independent of any single entry.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveInfo {
    /// Number of user-visible entries in the directory.
    pub file_count: usize,
    /// Total uncompressed length of the LZX-compressed section, or 0 if the archive has none.
    pub total_uncompressed: u64,
    /// Total on-disk length of the LZX-compressed section, or 0 if the archive has none.
    pub total_compressed: u64,
    /// `total_compressed / total_uncompressed`, or 1.0 if the archive has no compressed section.
    pub ratio: f64,
    /// LZX sliding-window size used by the compressed section, or 0 if the archive has none.
    pub window_size: u32,
    /// Uncompressed byte span between LZX resets in the compressed section, or 0 if the archive
    /// has none.
    pub reset_interval: u32,
}

/// Metadata about a single stored entry, without its contents.
#[derive(Debug, Clone)]
pub struct EntryStat {
    /// Stored name, exactly as it appears on disk.
    pub name: Vec<u8>,
    /// Uncompressed byte length.
    pub len: u64,
    /// Whether this entry lives in the LZX-compressed section.
    pub compressed: bool,
}

/// Whether `name` is an internal DataSpace bookkeeping entry rather than user content.
fn is_internal_name(name: &[u8]) -> bool {
    name.starts_with(b"::")
}

/// An open CHM archive.
///
/// `F` is any random-access byte source implementing [`ReadAt`]; `sync_file::RandomAccessFile`
/// wraps a `std::fs::File`, and `Vec<u8>`/`&[u8]` work directly for in-memory archives.
pub struct Chm<F> {
    source: F,
    directory: Directory,
    lzxc: Option<LzxcHeader>,
    reset_table: Option<ResetTable>,
    /// Absolute file offset where section 0 (uncompressed) begins: immediately after the
    /// directory's chunk range.
    section0_base: u64,
    /// Absolute file offset where section 1 (LZX-compressed) begins.
    content_offset: u64,
}

impl<F: ReadAt> Chm<F> {
    /// Opens an archive from any [`ReadAt`] source, parsing and validating its headers and
    /// directory.
    pub fn open(source: F, options: &Options) -> Result<Self> {
        let _span = debug_span!("Chm::open").entered();

        let mut fixed = vec![0u8; ITSF_HEADER_LEN + ITSP_HEADER_LEN + LZXC_HEADER_LEN];
        source.read_exact_at(&mut fixed, 0).context("reading fixed headers")?;

        let itsf = ItsfHeader::parse(&fixed[..ITSF_HEADER_LEN])?;
        let itsp = ItspHeader::parse(&fixed[ITSF_HEADER_LEN..ITSF_HEADER_LEN + ITSP_HEADER_LEN])?;
        let lzxc_bytes = &fixed[ITSF_HEADER_LEN + ITSP_HEADER_LEN..];
        // Archives with no compressed section at all (everything stored uncompressed) would not
        // have a meaningful LZXC header; this crate always writes one when packing, so treat a
        // bad LZXC signature here as informational rather than fatal only if there is also no
        // Content directory entry. We still need the bytes to attempt the parse.
        let lzxc = LzxcHeader::parse(lzxc_bytes).ok();

        let dir_end = itsf
            .directory_offset
            .checked_add(itsf.directory_length)
            .ok_or(ChmError::Overflow("directory span"))?;
        let mut directory_bytes = vec![0u8; dir_end as usize];
        source
            .read_exact_at(&mut directory_bytes, 0)
            .context("reading directory bytes")?;
        let directory = Directory::parse(&directory_bytes, &itsf, &itsp, options.strict_directory_order)?;

        let section0_base = dir_end;
        debug!(entry_count = directory.len(), section0_base, "parsed CHM directory");

        let (reset_table, content_offset) = match directory.get(CONTENT_NAME) {
            Some(content_entry) => {
                // By construction (see `pack`), the Content entry's offset within section 0
                // equals section 0's total length: section 1 begins immediately after it.
                let section0_len = content_entry.offset;
                let mut section0_bytes = vec![0u8; section0_len as usize];
                source
                    .read_exact_at(&mut section0_bytes, section0_base)
                    .context("reading uncompressed section")?;
                let reset_table = locate_reset_table(&directory, &section0_bytes)?;
                let content_offset = section0_base
                    .checked_add(content_entry.offset)
                    .ok_or(ChmError::Overflow("content section offset"))?;
                (Some(reset_table), content_offset)
            }
            None => (None, section0_base),
        };

        Ok(Self {
            source,
            directory,
            lzxc,
            reset_table,
            section0_base,
            content_offset,
        })
    }

    /// Lists every user-stored entry's name and size, in on-disk (sorted) order.
    ///
    /// Internal DataSpace bookkeeping entries (`::DataSpace/...`, holding the reset table and
    /// compression control data) are not user content and are excluded.
    pub fn list(&self) -> impl Iterator<Item = EntryStat> + '_ {
        self.directory.iter().filter(|e| !is_internal_name(&e.name)).map(|e| EntryStat {
            name: e.name.clone(),
            len: e.length,
            compressed: e.section_id == 1,
        })
    }

    /// Looks up a single user entry's metadata without reading its contents.
    pub fn stat(&self, name: &[u8]) -> Option<EntryStat> {
        if is_internal_name(name) {
            return None;
        }
        self.directory.get(name).map(|e| EntryStat {
            name: e.name.clone(),
            len: e.length,
            compressed: e.section_id == 1,
        })
    }

    /// Archive-wide summary information.
    pub fn info(&self) -> ArchiveInfo {
        let total_uncompressed = self.reset_table.as_ref().map(|t| t.total_uncompressed_length).unwrap_or(0);
        let total_compressed = self.reset_table.as_ref().map(|t| t.total_compressed_length).unwrap_or(0);
        let ratio = if total_uncompressed == 0 {
            1.0
        } else {
            total_compressed as f64 / total_uncompressed as f64
        };
        ArchiveInfo {
            file_count: self.directory.iter().filter(|e| !is_internal_name(&e.name)).count(),
            total_uncompressed,
            total_compressed,
            ratio,
            window_size: self.lzxc.map(|h| h.window_size).unwrap_or(0),
            reset_interval: self.lzxc.map(|h| h.reset_interval).unwrap_or(0),
        }
    }

    /// Reads an entry's full contents.
    pub fn extract(&self, name: &[u8]) -> Result<Vec<u8>> {
        self.extract_range(name, 0, self.directory.get(name).ok_or(ChmError::EntryNotFound)?.length)
    }

    /// Reads `len` bytes of an entry's contents starting at uncompressed offset `start`.
    ///
    /// For entries in the uncompressed section this is a direct read; for compressed entries
    /// this seeks to the nearest reset-interval boundary at or before `start` via the reset
    /// table, decodes forward, and discards the bytes before `start`, matching how `CHITS`-style
    /// random access works over LZX content.
    pub fn extract_range(&self, name: &[u8], start: u64, len: u64) -> Result<Vec<u8>> {
        let entry = self.directory.get(name).ok_or(ChmError::EntryNotFound)?;
        ensure!(
            start.checked_add(len).map(|e| e <= entry.length).unwrap_or(false),
            "requested range exceeds entry length"
        );

        match entry.section_id {
            0 => {
                let mut buf = vec![0u8; len as usize];
                let offset = self
                    .section0_base
                    .checked_add(entry.offset)
                    .and_then(|o| o.checked_add(start))
                    .ok_or(ChmError::Overflow("section 0 entry offset"))?;
                self.source.read_exact_at(&mut buf, offset)?;
                Ok(buf)
            }
            1 => {
                let entry_start = entry.offset.checked_add(start).ok_or(ChmError::Overflow("entry start"))?;
                self.decode_compressed_range(entry_start, len)
            }
            other => bail!("directory entry {:?} has unknown section id {other}", String::from_utf8_lossy(name)),
        }
    }

    /// Decodes `[u_start, u_start + len)` of the LZX-compressed section, walking reset intervals
    /// forward from the one containing `u_start` and discarding bytes outside the requested
    /// window.
    fn decode_compressed_range(&self, u_start: u64, len: u64) -> Result<Vec<u8>> {
        let reset_table = self
            .reset_table
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("archive has compressed entries but no reset table"))?;
        let lzxc = self
            .lzxc
            .ok_or_else(|| anyhow::anyhow!("archive has compressed entries but no valid LZXC header"))?;

        let target_end = u_start.checked_add(len).ok_or(ChmError::Overflow("requested range end"))?;
        let (compressed_offset, interval_start) = reset_table.locate(u_start);
        let mut idx = reset_table
            .index_for_uncompressed_offset(interval_start)
            .expect("locate() always returns an entry's own uncompressed_offset");

        let remaining_compressed = reset_table
            .total_compressed_length
            .checked_sub(compressed_offset)
            .ok_or(ChmError::Overflow("remaining compressed length"))?;
        let mut compressed_bytes = vec![0u8; remaining_compressed as usize];
        let read_offset = self
            .content_offset
            .checked_add(compressed_offset)
            .ok_or(ChmError::Overflow("compressed read offset"))?;
        self.source.read_exact_at(&mut compressed_bytes, read_offset)?;

        let mut reader = BitReader::new(&compressed_bytes);
        let mut decoder = LzxDecoder::new(lzxc.window_size).map_err(ChmError::from)?;
        let mut cur_pos = interval_start;
        let mut out = Vec::with_capacity(len as usize);

        loop {
            let interval_len = reset_table.interval_uncompressed_len(idx);
            let mut interval_out = Vec::with_capacity(interval_len as usize);
            decoder
                .decode_interval(&mut reader, interval_len as u32, &mut interval_out)
                .map_err(ChmError::from)?;

            let interval_end = cur_pos + interval_out.len() as u64;
            let lo = u_start.max(cur_pos);
            let hi = target_end.min(interval_end);
            if lo < hi {
                let rel_lo = (lo - cur_pos) as usize;
                let rel_hi = (hi - cur_pos) as usize;
                out.extend_from_slice(&interval_out[rel_lo..rel_hi]);
            }

            cur_pos = interval_end;
            if cur_pos >= target_end || cur_pos >= reset_table.total_uncompressed_length {
                break;
            }
            decoder.reset();
            idx += 1;
        }

        ensure!(out.len() as u64 == len, "decoded range shorter than requested");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_access_read_matches_direct_slice() {
        let mut data = Vec::new();
        let mut state: u32 = 0xdead_beef;
        for _ in 0..(2 * 0x8000 + 1000) {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            data.push((state & 0xff) as u8);
        }

        let entries = vec![crate::PackEntry {
            name: b"/big.bin".to_vec(),
            data: data.clone(),
            compress: true,
        }];
        let options = Options::default();
        let mut bytes = Vec::new();
        crate::pack(&entries, &mut bytes, &options).unwrap();
        let chm = Chm::open(bytes, &options).unwrap();

        let start = 0x8000 - 50;
        let len = 200;
        let range = chm.extract_range(b"/big.bin", start as u64, len as u64).unwrap();
        assert_eq!(range, data[start..start + len]);
    }

    #[test]
    fn tampered_signature_is_rejected_without_panicking() {
        let options = Options::default();
        let mut bytes = Vec::new();
        crate::pack(
            &[crate::PackEntry {
                name: b"/a".to_vec(),
                data: b"hi".to_vec(),
                compress: false,
            }],
            &mut bytes,
            &options,
        )
        .unwrap();
        let mut tampered = bytes;
        tampered[0] = b'X';
        assert!(Chm::open(tampered, &options).is_err());
    }

    #[test]
    fn truncated_directory_is_rejected_without_panicking() {
        let options = Options::default();
        let mut bytes = Vec::new();
        crate::pack(
            &[crate::PackEntry {
                name: b"/a".to_vec(),
                data: b"hi".to_vec(),
                compress: false,
            }],
            &mut bytes,
            &options,
        )
        .unwrap();
        let truncated = bytes[..100].to_vec();
        assert!(Chm::open(truncated, &options).is_err());
    }

    #[test]
    fn archive_info_reports_window_and_reset_interval() {
        let options = Options::default();
        let mut bytes = Vec::new();
        crate::pack(
            &[crate::PackEntry {
                name: b"/a".to_vec(),
                data: b"hi".to_vec(),
                compress: true,
            }],
            &mut bytes,
            &options,
        )
        .unwrap();
        let chm = Chm::open(bytes, &options).unwrap();
        let info = chm.info();
        assert_eq!(info.window_size, options.window_size);
        assert_eq!(info.reset_interval, options.reset_interval);
    }
}
