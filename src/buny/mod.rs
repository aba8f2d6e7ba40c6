//! Buny asset archives: table of contents parsing, extraction, append-only redirects, and reset.

mod backup;
mod entry;
mod error;
pub mod reset;

pub use backup::{TocBackupItem, TocBackupStream};
pub use entry::{BlockInfo, CompressedHeader, FileEntry};
pub use error::{ArchiveError, ArchiveErrorKind};

use crate::window::{Access, ByteWindow, WindowError};
use entry::{BLOCK_INFO_SIZE, COMPRESSED_HEADER_SIZE, TOC_RECORD_SIZE};
use std::{
    collections::HashMap,
    fmt::{Display, Formatter, Result as FmtResult},
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// Signature at the start of every archive.
pub const BUNY_MAGIC: &str = "BunyArchTheForge";

/// Largest replacement accepted for an entry stored behind a compressed payload header.
pub const MAX_BLOCK_SIZE: u64 = 0x40000;

const MAGIC_LEN: usize = 16;
// payloads are buffered whole before decompression
const MAX_BUFFERED_PAYLOAD: u64 = 0x7FFF_FFFF;
const HEADER_FIELDS_OFFSET: u64 = 0x20;

/// Fixed fields at the start of an archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArchiveHeader {
    /// Absolute offset of the table of contents.
    pub toc_offset: u64,
    /// Size of the table of contents, in bytes.
    pub toc_size: u64,
    /// Absolute offset of the name table.
    pub name_table_offset: u64,
    /// Size of the name table, in bytes.
    pub name_table_size: u64,
    /// Absolute offset of the secondary table. Its contents are opaque.
    pub toc2_offset: u64,
    /// Size of the secondary table, in bytes.
    pub toc2_size: u64,
}

impl ArchiveHeader {
    fn parse(window: &mut ByteWindow) -> Result<Self, ArchiveError> {
        // check for file signature
        window
            .seek(0)
            .map_err(ArchiveError::factory(ArchiveErrorKind::Magic))?;
        match window.read_string(MAGIC_LEN) {
            Ok(magic) if magic == BUNY_MAGIC => Ok(()),
            Err(e) => Err(ArchiveError::new_with_source(ArchiveErrorKind::Magic, e)),
            _ => Err(ArchiveError::new(ArchiveErrorKind::Magic)),
        }?;

        // 0x10..0x20 is unused
        window
            .seek(HEADER_FIELDS_OFFSET)
            .map_err(ArchiveError::factory(ArchiveErrorKind::Header))?;

        let mut fields = [0; 6];
        for field in &mut fields {
            *field = window
                .read_u64()
                .map_err(ArchiveError::factory(ArchiveErrorKind::Header))?;
        }
        let [toc_offset, toc_size, name_table_offset, name_table_size, toc2_offset, toc2_size] =
            fields;

        Ok(Self {
            toc_offset,
            toc_size,
            name_table_offset,
            name_table_size,
            toc2_offset,
            toc2_size,
        })
    }

    /// Returns the number of entries in the table of contents.
    #[must_use]
    pub fn file_count(&self) -> u64 {
        self.toc_size / TOC_RECORD_SIZE
    }
}

impl Display for ArchiveHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&format!(
            "toc at {} ({} bytes), names at {} ({} bytes), toc2 at {} ({} bytes), {} files",
            self.toc_offset,
            self.toc_size,
            self.name_table_offset,
            self.name_table_size,
            self.toc2_offset,
            self.toc2_size,
            self.file_count()
        ))
    }
}

/// An open Buny archive.
///
/// Entries are parsed from the table of contents the first time they are accessed.
/// Every patch appends to the end of the archive and repoints a table of contents record;
/// bytes that were already in the archive are never overwritten except for those records.
#[derive(Debug)]
pub struct BunyArchive {
    window: ByteWindow,
    header: ArchiveHeader,
    entries: Vec<Option<FileEntry>>,
    names: HashMap<Box<str>, usize>,
}

impl BunyArchive {
    /// Opens an archive file for reading and patching.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or does not start with a valid archive header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        ByteWindow::open(path, Access::ReadWrite)
            .map_err(ArchiveError::factory(ArchiveErrorKind::Open))
            .and_then(Self::from_window)
    }

    /// Opens an archive file for reading only; every patch fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or does not start with a valid archive header.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        ByteWindow::open(path, Access::ReadOnly)
            .map_err(ArchiveError::factory(ArchiveErrorKind::Open))
            .and_then(Self::from_window)
    }

    /// Parses the archive header from an already opened window.
    ///
    /// # Errors
    ///
    /// Returns an error if the window does not start with a valid archive header,
    /// or if the table of contents it declares does not fit in the window.
    pub fn from_window(mut window: ByteWindow) -> Result<Self, ArchiveError> {
        let header = ArchiveHeader::parse(&mut window)?;

        let len = window
            .len()
            .map_err(ArchiveError::factory(ArchiveErrorKind::Length))?;
        let toc_error = || {
            ArchiveError::new(ArchiveErrorKind::TocSize {
                size: header.toc_size,
            })
        };

        // the table of contents must fit inside the archive
        if header
            .toc_offset
            .checked_add(header.toc_size)
            .map_or(true, |end| end > len)
        {
            return Err(toc_error());
        }
        let file_count = usize::try_from(header.file_count()).map_err(|_| toc_error())?;

        debug!("opened archive: {header}");

        Ok(Self {
            window,
            header,
            entries: vec![None; file_count],
            names: HashMap::new(),
        })
    }

    /// Returns the archive header.
    #[must_use]
    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    /// Returns the number of entries in the table of contents.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.entries.len()
    }

    /// Returns the current length of the archive, in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the length cannot be queried.
    pub fn length(&self) -> Result<u64, ArchiveError> {
        self.window
            .len()
            .map_err(ArchiveError::factory(ArchiveErrorKind::Length))
    }

    /// Extends or truncates the archive.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive is read-only or cannot be resized.
    pub fn set_length(&mut self, len: u64) -> Result<(), ArchiveError> {
        self.window
            .set_len(len)
            .map_err(ArchiveError::factory(ArchiveErrorKind::Length))
    }

    /// Returns the entry at `index`, parsing its record if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is out of range or the record cannot be parsed.
    pub fn entry(&mut self, index: usize) -> Result<&FileEntry, ArchiveError> {
        self.load(index)?;
        self.loaded(index)
    }

    /// Returns every entry in index order, parsing records as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if any record cannot be parsed.
    pub fn entries(&mut self) -> Result<Vec<&FileEntry>, ArchiveError> {
        self.load_all()?;
        Ok(self.entries.iter().flatten().collect())
    }

    /// Returns the index of the entry called `name`.
    ///
    /// Backslashes in `name` are treated as forward slashes.
    ///
    /// # Errors
    ///
    /// Returns an error if no entry has that name or the table of contents cannot be parsed.
    pub fn find(&mut self, name: &str) -> Result<usize, ArchiveError> {
        let name = name.replace('\\', "/");

        if let Some(&index) = self.names.get(name.as_str()) {
            return Ok(index);
        }

        self.load_all()?;
        self.names
            .get(name.as_str())
            .copied()
            .ok_or_else(|| ArchiveError::new(ArchiveErrorKind::EntryNotFound))
    }

    /// Returns the entry called `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if no entry has that name or the table of contents cannot be parsed.
    pub fn entry_by_name(&mut self, name: &str) -> Result<&FileEntry, ArchiveError> {
        let index = self.find(name)?;
        self.loaded(index)
    }

    /// Returns whether an entry called `name` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the table of contents cannot be parsed.
    pub fn contains(&mut self, name: &str) -> Result<bool, ArchiveError> {
        match self.find(name) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ArchiveErrorKind::EntryNotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Parses the compressed payload header of an entry, or returns `None` if the entry is not compressed.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be read.
    pub fn compressed_header(
        &mut self,
        index: usize,
    ) -> Result<Option<CompressedHeader>, ArchiveError> {
        self.load(index)?;
        let entry = self.loaded(index)?.clone();

        if entry.is_compressed() {
            CompressedHeader::parse(&mut self.window, &entry).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Writes the decompressed content of an entry at the cursor of `dest`.
    ///
    /// The cursor of `dest` is left after the written bytes. Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be read or decompressed, or `dest` cannot be written.
    pub fn extract(&mut self, index: usize, dest: &mut ByteWindow) -> Result<u64, ArchiveError> {
        self.load(index)?;
        let entry = self.loaded(index)?.clone();
        let error = ArchiveErrorKind::Extract { index };
        let start = dest.position();

        if !entry.is_actually_compressed() {
            let len = entry.payload_size();

            self.window
                .transfer_to(dest, entry.payload_offset(), len)
                .map_err(ArchiveError::factory(error))?;
            dest.seek(start + len).map_err(ArchiveError::factory(error))?;

            return Ok(len);
        }

        let zsize = entry.payload_size();
        if zsize > MAX_BUFFERED_PAYLOAD {
            return Err(ArchiveError::new(ArchiveErrorKind::PayloadTooLarge {
                index,
                size: zsize,
            }));
        }

        let raw_size = CompressedHeader::parse(&mut self.window, &entry)?.raw_size;

        self.window
            .seek(entry.payload_offset())
            .map_err(ArchiveError::factory(error))?;
        let compressed = self
            .window
            .read_vec(zsize as usize)
            .map_err(ArchiveError::factory(error))?;

        let mut decoder = zstd::Decoder::new(compressed.as_slice())
            .map_err(ArchiveError::io_factory(ArchiveErrorKind::Decompress { index }))?;
        let written = io::copy(&mut decoder, &mut dest.io())
            .map_err(ArchiveError::io_factory(ArchiveErrorKind::Decompress { index }))?;

        if written != raw_size {
            warn!("entry {index} decompressed to {written} bytes, header declares {raw_size}");
        }

        Ok(written)
    }

    /// Extracts an entry into `dir`, at the relative path given by its name.
    ///
    /// Missing parent directories are created. Returns the path of the written file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or the entry cannot be extracted.
    pub fn extract_to_path<P: AsRef<Path>>(
        &mut self,
        index: usize,
        dir: P,
    ) -> Result<PathBuf, ArchiveError> {
        let error = ArchiveErrorKind::Extract { index };
        let path = dir.as_ref().join(self.entry(index)?.name());

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ArchiveError::io_factory(error))?;
        }

        let mut dest = ByteWindow::create(&path).map_err(ArchiveError::factory(error))?;
        let _ = self.extract(index, &mut dest)?;
        dest.close();

        Ok(path)
    }

    /// Replaces the content of an entry with the bytes of `source` from its cursor to its end.
    ///
    /// The new content is appended to the archive and the entry's record is repointed to it.
    /// Entries stored behind a compressed payload header get a new single-block header holding the content literally.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is too large for a compressed entry, or on any read or write failure.
    pub fn redirect(&mut self, index: usize, source: &ByteWindow) -> Result<(), ArchiveError> {
        self.load(index)?;
        let error = ArchiveErrorKind::Append { index };

        let source_len = source.len().map_err(ArchiveError::factory(error))?;
        let len = source_len.saturating_sub(source.position());
        let append_point = self.length()?;

        if !self.loaded(index)?.is_compressed() {
            self.window
                .seek(append_point)
                .map_err(ArchiveError::factory(error))?;
            source
                .transfer_to(&mut self.window, source.position(), len)
                .map_err(ArchiveError::factory(error))?;

            debug!("redirected entry {index} to {len} raw bytes at {append_point}");
            return self.rewrite_toc(index, append_point, len, len);
        }

        if len > MAX_BLOCK_SIZE {
            return Err(ArchiveError::new(ArchiveErrorKind::ReplacementTooLarge {
                index,
                size: len,
            }));
        }

        let zsize = len + COMPRESSED_HEADER_SIZE + BLOCK_INFO_SIZE;

        self.window
            .seek(append_point)
            .map_err(ArchiveError::factory(error))?;
        self.write_literal_block_header(len, zsize)
            .map_err(ArchiveError::factory(error))?;
        source
            .transfer_to(&mut self.window, source.position(), len)
            .map_err(ArchiveError::factory(error))?;

        debug!("redirected entry {index} to {len} literal bytes at {append_point}");
        self.rewrite_toc(index, append_point, zsize, len)
    }

    fn write_literal_block_header(
        &mut self,
        len: u64,
        zsize: u64,
    ) -> Result<(), WindowError> {
        self.window.write_u64(MAX_BLOCK_SIZE)?;
        self.window.write_u64(len)?;
        self.window.write_u64(1)?;
        // flag 0: the block is stored literally
        self.window.write_i32(0)?;
        self.window.write_i32(literal_block_marker(zsize))
    }

    /// Replaces the content of an entry with the content of a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the redirect fails.
    pub fn redirect_from_path<P: AsRef<Path>>(
        &mut self,
        index: usize,
        path: P,
    ) -> Result<(), ArchiveError> {
        let source = ByteWindow::open(path, Access::ReadOnly)
            .map_err(ArchiveError::factory(ArchiveErrorKind::Append { index }))?;

        self.redirect(index, &source)
    }

    /// Lets `build` write new content for an entry directly at the end of the archive,
    /// then repoints the entry to it as uncompressed content.
    ///
    /// The window handed to `build` has its cursor at the append point. Returns the number of bytes appended.
    ///
    /// # Errors
    ///
    /// Returns the error of `build`, or an error if the entry cannot be repointed.
    pub fn append_with<F, E>(&mut self, index: usize, build: F) -> Result<u64, E>
    where
        F: FnOnce(&mut ByteWindow) -> Result<(), E>,
        E: From<ArchiveError>,
    {
        self.load(index)?;
        let append_point = self.length()?;

        self.window
            .seek(append_point)
            .map_err(ArchiveError::factory(ArchiveErrorKind::Append { index }))?;
        build(&mut self.window)?;

        let written = self.length()? - append_point;
        debug!("appended {written} bytes for entry {index} at {append_point}");

        self.rewrite_toc(index, append_point, written, written)?;
        Ok(written)
    }

    /// Overwrites the `size`, `offset` and `zsize` fields of an entry's record.
    ///
    /// The other fields of the record are left untouched. Nothing is written if the new location
    /// does not hold a valid compressed payload header when `zsize` and `size` differ.
    ///
    /// # Errors
    ///
    /// Returns an error if the new location is invalid or the record cannot be written.
    pub fn rewrite_toc(
        &mut self,
        index: usize,
        offset: u64,
        zsize: u64,
        size: u64,
    ) -> Result<(), ArchiveError> {
        self.load(index)?;
        let error = ArchiveErrorKind::TocWrite { index };

        let mut entry = self.loaded(index)?.clone();
        entry.set_location(offset, zsize, size);
        entry.refresh_block_num(&mut self.window)?;
        let toc_position = entry.toc_position();

        // record layout: type, size, name offset, name size, offset, zsize
        self.window
            .seek(toc_position + 8)
            .map_err(ArchiveError::factory(error))?;
        self.window
            .write_u64(size)
            .map_err(ArchiveError::factory(error))?;
        self.window
            .skip(8)
            .map_err(ArchiveError::factory(error))?;
        self.window
            .write_u64(offset)
            .map_err(ArchiveError::factory(error))?;
        self.window
            .write_u64(zsize)
            .map_err(ArchiveError::factory(error))?;

        self.entries[index] = Some(entry);
        Ok(())
    }

    /// Returns a read-only window over the on-disk bytes of an entry.
    ///
    /// The window does not keep the archive open; it fails once the archive is closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be parsed or its payload lies outside the archive.
    pub fn slice(&mut self, index: usize) -> Result<ByteWindow, ArchiveError> {
        self.load(index)?;
        let (offset, zsize) = {
            let entry = self.loaded(index)?;
            (entry.offset(), entry.zsize())
        };

        self.window
            .slice(offset, zsize, false)
            .map_err(ArchiveError::factory(ArchiveErrorKind::Extract { index }))
    }

    /// Closes the archive.
    pub fn close(self) {
        self.window.close();
    }

    fn load(&mut self, index: usize) -> Result<(), ArchiveError> {
        let count = self.entries.len();
        let slot = self
            .entries
            .get(index)
            .ok_or_else(|| ArchiveError::new(ArchiveErrorKind::IndexOutOfRange { index, count }))?;

        if slot.is_none() {
            let entry = FileEntry::parse(&mut self.window, &self.header, index)?;
            let _ = self.names.insert(entry.name().into(), index);
            self.entries[index] = Some(entry);
        }

        Ok(())
    }

    fn load_all(&mut self) -> Result<(), ArchiveError> {
        (0..self.entries.len()).try_for_each(|index| self.load(index))
    }

    fn loaded(&self, index: usize) -> Result<&FileEntry, ArchiveError> {
        self.entries
            .get(index)
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                ArchiveError::new(ArchiveErrorKind::IndexOutOfRange {
                    index,
                    count: self.entries.len(),
                })
            })
    }
}

// observed relation between the on-disk size of a single-block payload and its second block field
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn literal_block_marker(zsize: u64) -> i32 {
    (zsize as i32).wrapping_mul(512).wrapping_sub(16896)
}

#[cfg(test)]
pub(crate) mod fixture {
    use super::{BUNY_MAGIC, MAX_BLOCK_SIZE};

    pub(crate) enum Payload {
        Raw(Vec<u8>),
        Literal(Vec<u8>),
        Zstd(Vec<u8>),
    }

    pub(crate) struct FixtureEntry {
        pub(crate) name: &'static str,
        pub(crate) payload: Payload,
    }

    pub(crate) fn raw(name: &'static str, data: &[u8]) -> FixtureEntry {
        FixtureEntry {
            name,
            payload: Payload::Raw(data.to_vec()),
        }
    }

    pub(crate) fn literal(name: &'static str, data: &[u8]) -> FixtureEntry {
        FixtureEntry {
            name,
            payload: Payload::Literal(data.to_vec()),
        }
    }

    pub(crate) fn zstd(name: &'static str, data: &[u8]) -> FixtureEntry {
        FixtureEntry {
            name,
            payload: Payload::Zstd(data.to_vec()),
        }
    }

    fn block_payload(raw_size: usize, flag: i32, stored: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAX_BLOCK_SIZE.to_le_bytes());
        buf.extend_from_slice(&(raw_size as u64).to_le_bytes());
        buf.extend_from_slice(&1u64.to_le_bytes());
        buf.extend_from_slice(&flag.to_le_bytes());
        buf.extend_from_slice(&0i32.to_le_bytes());
        buf.extend_from_slice(stored);
        buf
    }

    /// Lays out header, table of contents, name table, then payloads in entry order.
    pub(crate) fn build(entries: &[FixtureEntry]) -> Vec<u8> {
        let toc_offset = 0x50u64;
        let toc_size = entries.len() as u64 * 0x28;
        let name_table_offset = toc_offset + toc_size;
        let names: Vec<u8> = entries.iter().flat_map(|e| e.name.bytes()).collect();
        let name_table_size = names.len() as u64;
        let toc2_offset = name_table_offset + name_table_size;

        let mut buf = vec![0; 0x50];
        buf[..16].copy_from_slice(BUNY_MAGIC.as_bytes());
        for (i, field) in [
            toc_offset,
            toc_size,
            name_table_offset,
            name_table_size,
            toc2_offset,
            0,
        ]
        .into_iter()
        .enumerate()
        {
            buf[0x20 + i * 8..0x28 + i * 8].copy_from_slice(&field.to_le_bytes());
        }

        let mut payloads = Vec::new();
        let mut toc = Vec::new();
        let mut name_offset = 0u32;

        for entry in entries {
            let (size, stored) = match &entry.payload {
                Payload::Raw(data) => (data.len(), data.clone()),
                Payload::Literal(data) => (data.len(), block_payload(data.len(), 0, data)),
                Payload::Zstd(data) => (
                    data.len(),
                    block_payload(data.len(), 1, &zstd::encode_all(data.as_slice(), 3).unwrap()),
                ),
            };
            let offset = toc2_offset + payloads.len() as u64;

            toc.extend_from_slice(&7u64.to_le_bytes());
            toc.extend_from_slice(&(size as u64).to_le_bytes());
            toc.extend_from_slice(&name_offset.to_le_bytes());
            toc.extend_from_slice(&(entry.name.len() as u32).to_le_bytes());
            toc.extend_from_slice(&offset.to_le_bytes());
            toc.extend_from_slice(&(stored.len() as u64).to_le_bytes());

            name_offset += entry.name.len() as u32;
            payloads.extend_from_slice(&stored);
        }

        buf.extend_from_slice(&toc);
        buf.extend_from_slice(&names);
        buf.extend_from_slice(&payloads);
        buf
    }
}
