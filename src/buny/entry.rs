use super::{
    error::{ArchiveError, ArchiveErrorKind},
    ArchiveHeader,
};
use crate::window::ByteWindow;
use std::fmt::{Display, Formatter, Result as FmtResult};
use tap::Pipe;
use tracing::trace;

pub(crate) const TOC_RECORD_SIZE: u64 = 0x28;
pub(crate) const COMPRESSED_HEADER_SIZE: u64 = 0x18;
pub(crate) const BLOCK_INFO_SIZE: u64 = 8;

// offset of `blockNum` inside a compressed payload header
const BLOCK_NUM_OFFSET: u64 = 0x10;

/// One file stored in a Buny archive, as described by its table of contents record.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileEntry {
    index: usize,
    toc_position: u64,
    kind: u64,
    size: u64,
    name_offset: u32,
    name_size: u32,
    offset: u64,
    zsize: u64,
    name: Box<str>,
    block_num: u64,
}

impl FileEntry {
    pub(crate) fn parse(
        window: &mut ByteWindow,
        header: &ArchiveHeader,
        index: usize,
    ) -> Result<Self, ArchiveError> {
        let toc_error = ArchiveErrorKind::TocRecord { index };
        let toc_position = header.toc_offset + index as u64 * TOC_RECORD_SIZE;

        window
            .seek(toc_position)
            .map_err(ArchiveError::factory(toc_error))?;

        let kind = window.read_u64().map_err(ArchiveError::factory(toc_error))?;
        let size = window.read_u64().map_err(ArchiveError::factory(toc_error))?;
        let name_offset = window.read_u32().map_err(ArchiveError::factory(toc_error))?;
        let name_size = window.read_u32().map_err(ArchiveError::factory(toc_error))?;
        let offset = window.read_u64().map_err(ArchiveError::factory(toc_error))?;
        let zsize = window.read_u64().map_err(ArchiveError::factory(toc_error))?;

        let name_error = ArchiveErrorKind::Name { index };
        window
            .seek(header.name_table_offset + u64::from(name_offset))
            .map_err(ArchiveError::factory(name_error))?;
        let name: Box<str> = window
            .read_vec(name_size as usize)
            .map_err(ArchiveError::factory(name_error))?
            .pipe(|bytes| String::from_utf8_lossy(&bytes).into());

        let mut entry = Self {
            index,
            toc_position,
            kind,
            size,
            name_offset,
            name_size,
            offset,
            zsize,
            name,
            block_num: 0,
        };
        entry.refresh_block_num(window)?;

        trace!("parsed table of contents record {index}: {entry}");
        Ok(entry)
    }

    // the block count lives in the payload header, so it changes whenever the entry is repointed
    pub(crate) fn refresh_block_num(&mut self, window: &mut ByteWindow) -> Result<(), ArchiveError> {
        if !self.is_compressed() {
            self.block_num = 0;
            return Ok(());
        }

        let error = ArchiveErrorKind::CompressedHeader { index: self.index };

        window
            .seek(self.offset + BLOCK_NUM_OFFSET)
            .map_err(ArchiveError::factory(error))?;
        let block_num = window.read_u64().map_err(ArchiveError::factory(error))?;

        // the header and block list must fit inside the on-disk payload
        let header_size = block_num
            .checked_mul(BLOCK_INFO_SIZE)
            .and_then(|n| n.checked_add(COMPRESSED_HEADER_SIZE))
            .filter(|&n| n <= self.zsize)
            .ok_or_else(|| ArchiveError::new(error))?;

        trace!("entry {} has {block_num} blocks ({header_size} header bytes)", self.index);
        self.block_num = block_num;
        Ok(())
    }

    pub(crate) fn set_location(&mut self, offset: u64, zsize: u64, size: u64) {
        self.offset = offset;
        self.zsize = zsize;
        self.size = size;
    }

    /// Returns the index of this entry in the table of contents.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the absolute archive offset of this entry's table of contents record.
    #[must_use]
    pub fn toc_position(&self) -> u64 {
        self.toc_position
    }

    /// Returns the type field of the record. Its meaning is opaque.
    #[must_use]
    pub fn kind(&self) -> u64 {
        self.kind
    }

    /// Returns the decompressed size of the file, in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the offset of the name relative to the start of the name table.
    #[must_use]
    pub fn name_offset(&self) -> u32 {
        self.name_offset
    }

    /// Returns the length of the name, in bytes.
    #[must_use]
    pub fn name_size(&self) -> u32 {
        self.name_size
    }

    /// Returns the absolute archive offset of the payload.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the number of bytes the payload occupies in the archive.
    #[must_use]
    pub fn zsize(&self) -> u64 {
        self.zsize
    }

    /// Returns the path-like name of the file.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of blocks listed in the compressed payload header, or 0 for uncompressed entries.
    #[must_use]
    pub fn block_num(&self) -> u64 {
        self.block_num
    }

    /// Returns whether the payload is wrapped in a compressed payload header.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.size != self.zsize
    }

    /// Returns whether the bytes behind the compressed payload header are zstd data.
    ///
    /// Small files of compressible types carry the header but store their content literally.
    #[must_use]
    pub fn is_actually_compressed(&self) -> bool {
        self.is_compressed() && self.size != self.payload_size()
    }

    /// Returns the absolute archive offset of the stored content, past any compressed payload header.
    #[must_use]
    pub fn payload_offset(&self) -> u64 {
        if self.is_compressed() {
            self.offset + self.payload_header_size()
        } else {
            self.offset
        }
    }

    /// Returns the number of stored content bytes, excluding any compressed payload header.
    #[must_use]
    pub fn payload_size(&self) -> u64 {
        if self.is_compressed() {
            self.zsize - self.payload_header_size()
        } else {
            self.size
        }
    }

    fn payload_header_size(&self) -> u64 {
        COMPRESSED_HEADER_SIZE + self.block_num * BLOCK_INFO_SIZE
    }
}

impl Display for FileEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&format!(
            "type={}, name={}, offset={}, compressed={}",
            self.kind,
            self.name,
            self.offset,
            self.is_compressed()
        ))?;

        if self.is_compressed() {
            f.write_str(&format!(
                ", zsize={}, size={}, block_num={}",
                self.zsize, self.size, self.block_num
            ))?;
        } else {
            f.write_str(&format!(", size={}", self.size))?;
        }

        f.write_str(&format!(
            ", name_offset={}, name_size={}",
            self.name_offset, self.name_size
        ))
    }
}

/// Per-block metadata pair from a compressed payload header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockInfo {
    /// 0 if the block is stored literally, 1 if it is zstd-compressed.
    pub flag: i32,
    /// Opaque value derived from the block size.
    pub unknown: i32,
}

/// Header in front of the content of a compressed entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CompressedHeader {
    /// Largest number of content bytes held by one block.
    pub max_block_size: u64,
    /// Decompressed size of the content.
    pub raw_size: u64,
    /// Metadata of every block, in order.
    pub blocks: Vec<BlockInfo>,
}

impl CompressedHeader {
    pub(crate) fn parse(window: &mut ByteWindow, entry: &FileEntry) -> Result<Self, ArchiveError> {
        let error = ArchiveErrorKind::CompressedHeader {
            index: entry.index(),
        };

        window
            .seek(entry.offset())
            .map_err(ArchiveError::factory(error))?;

        let max_block_size = window.read_u64().map_err(ArchiveError::factory(error))?;
        let raw_size = window.read_u64().map_err(ArchiveError::factory(error))?;
        let block_num = window.read_u64().map_err(ArchiveError::factory(error))?;

        if block_num != entry.block_num() {
            return Err(ArchiveError::new(error));
        }

        let mut blocks = Vec::new();
        for _ in 0..block_num {
            let flag = window.read_i32().map_err(ArchiveError::factory(error))?;
            let unknown = window.read_i32().map_err(ArchiveError::factory(error))?;
            blocks.push(BlockInfo { flag, unknown });
        }

        Ok(Self {
            max_block_size,
            raw_size,
            blocks,
        })
    }

    /// Returns the number of blocks.
    #[must_use]
    pub fn block_num(&self) -> usize {
        self.blocks.len()
    }
}

impl Display for CompressedHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&format!(
            "max_block_size={}, raw_size={}, block_num={}, blocks=[",
            self.max_block_size,
            self.raw_size,
            self.blocks.len()
        ))?;

        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&format!("({}, {})", block.flag, block.unknown))?;
        }

        f.write_str("]")
    }
}
