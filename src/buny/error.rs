use crate::{error::ErrorCategory, read::ReadError, window::WindowError};
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    io::Error as IoError,
};

/// Error raised while reading, patching or resetting a Buny archive.
#[derive(Debug)]
pub struct ArchiveError {
    kind: ArchiveErrorKind,
    source: Option<ArchiveErrorSource>,
}

/// Kinds of [`ArchiveError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ArchiveErrorKind {
    /// The archive could not be opened.
    Open,
    /// The archive signature was missing or wrong.
    Magic,
    /// The fixed header could not be read.
    Header,
    /// The table of contents extends past the end of the archive.
    TocSize {
        /// Size of the table of contents, in bytes.
        size: u64,
    },
    /// An entry index past the end of the table of contents was requested.
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of entries in the archive.
        count: usize,
    },
    /// A table of contents record could not be read.
    TocRecord {
        /// Index of the record.
        index: usize,
    },
    /// An entry name could not be read from the name table.
    Name {
        /// Index of the entry.
        index: usize,
    },
    /// No entry has the requested name.
    EntryNotFound,
    /// The compressed payload header of an entry was malformed or could not be read.
    CompressedHeader {
        /// Index of the entry.
        index: usize,
    },
    /// A compressed payload is too large to buffer for decompression.
    PayloadTooLarge {
        /// Index of the entry.
        index: usize,
        /// Size of the compressed payload, in bytes.
        size: u64,
    },
    /// The zstd decoder rejected a compressed payload.
    Decompress {
        /// Index of the entry.
        index: usize,
    },
    /// An entry payload could not be copied to its destination.
    Extract {
        /// Index of the entry.
        index: usize,
    },
    /// Replacement content for a compressed entry exceeds a single block.
    ReplacementTooLarge {
        /// Index of the entry.
        index: usize,
        /// Size of the replacement content, in bytes.
        size: u64,
    },
    /// Replacement content could not be appended to the archive.
    Append {
        /// Index of the entry.
        index: usize,
    },
    /// A table of contents record could not be rewritten.
    TocWrite {
        /// Index of the entry.
        index: usize,
    },
    /// The archive does not match any known pristine signature.
    UnknownArchive,
    /// The backup snapshot could not be opened.
    BackupOpen,
    /// The backup snapshot ended before the record for an entry.
    BackupExhausted {
        /// Index of the entry whose original record was missing.
        index: usize,
    },
    /// The backup snapshot could not be read.
    Backup {
        /// Index of the entry whose original record was being read.
        index: usize,
    },
    /// The archive length could not be read or changed.
    Length,
}

#[derive(Debug)]
enum ArchiveErrorSource {
    Window(WindowError),
    Read(ReadError),
    Io(IoError),
}

impl ArchiveError {
    pub(crate) fn new(kind: ArchiveErrorKind) -> Self {
        Self { kind, source: None }
    }

    pub(crate) fn new_with_source(kind: ArchiveErrorKind, source: WindowError) -> Self {
        Self {
            kind,
            source: Some(ArchiveErrorSource::Window(source)),
        }
    }

    pub(crate) fn factory(kind: ArchiveErrorKind) -> impl FnOnce(WindowError) -> Self {
        move |source| Self::new_with_source(kind, source)
    }

    pub(crate) fn read_factory(kind: ArchiveErrorKind) -> impl FnOnce(ReadError) -> Self {
        move |source| Self {
            kind,
            source: Some(ArchiveErrorSource::Read(source)),
        }
    }

    pub(crate) fn io_factory(kind: ArchiveErrorKind) -> impl FnOnce(IoError) -> Self {
        move |source| Self {
            kind,
            source: Some(ArchiveErrorSource::Io(source)),
        }
    }

    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ArchiveErrorKind {
        self.kind
    }

    /// Returns the broad category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        use ArchiveErrorKind::*;

        match self.kind {
            Magic | TocSize { .. } | CompressedHeader { .. } | Decompress { .. } => {
                ErrorCategory::Format
            }
            IndexOutOfRange { .. } => ErrorCategory::Bounds,
            PayloadTooLarge { .. } | ReplacementTooLarge { .. } => ErrorCategory::Unsupported,
            UnknownArchive => ErrorCategory::Usage,
            EntryNotFound | BackupExhausted { .. } => ErrorCategory::NotFound,
            _ => match &self.source {
                Some(ArchiveErrorSource::Window(e)) => e.category(),
                Some(ArchiveErrorSource::Read(e)) if e.is_incomplete() => ErrorCategory::Format,
                _ => ErrorCategory::Io,
            },
        }
    }
}

impl Display for ArchiveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        use ArchiveErrorKind::*;

        match self.kind {
            Open => f.write_str("failed to open archive"),
            Magic => f.write_str("no archive signature found"),
            Header => f.write_str("failed to read archive header"),
            TocSize { size } => f.write_str(&format!(
                "table of contents does not fit in the archive ({size} bytes)"
            )),
            IndexOutOfRange { index, count } => f.write_str(&format!(
                "entry index {index} is out of range (archive has {count} entries)"
            )),
            TocRecord { index } => {
                f.write_str(&format!("failed to read table of contents record {index}"))
            }
            Name { index } => f.write_str(&format!("failed to read name of entry {index}")),
            EntryNotFound => f.write_str("no entry with the requested name"),
            CompressedHeader { index } => f.write_str(&format!(
                "failed to read compressed payload header of entry {index}"
            )),
            PayloadTooLarge { index, size } => f.write_str(&format!(
                "compressed payload of entry {index} exceeds the decompression buffer limit ({size} bytes)"
            )),
            Decompress { index } => {
                f.write_str(&format!("failed to decompress payload of entry {index}"))
            }
            Extract { index } => f.write_str(&format!("failed to extract entry {index}")),
            ReplacementTooLarge { index, size } => f.write_str(&format!(
                "replacement for compressed entry {index} exceeds one block ({size} bytes)"
            )),
            Append { index } => f.write_str(&format!(
                "failed to append replacement content for entry {index}"
            )),
            TocWrite { index } => f.write_str(&format!(
                "failed to rewrite table of contents record {index}"
            )),
            UnknownArchive => f.write_str("archive does not match any known pristine signature"),
            BackupOpen => f.write_str("failed to open backup snapshot"),
            BackupExhausted { index } => {
                f.write_str(&format!("backup snapshot has no record for entry {index}"))
            }
            Backup { index } => f.write_str(&format!(
                "failed to read backup record for entry {index}"
            )),
            Length => f.write_str("failed to access archive length"),
        }
    }
}

impl Error for ArchiveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(source) => match source {
                ArchiveErrorSource::Window(e) => Some(e),
                ArchiveErrorSource::Read(e) => Some(e),
                ArchiveErrorSource::Io(e) => Some(e),
            },
            None => None,
        }
    }
}
