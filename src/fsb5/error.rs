use crate::{error::ErrorCategory, window::WindowError};
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Error raised while reading or building an FSB5 sound container.
#[derive(Debug)]
pub struct ContainerError {
    kind: ContainerErrorKind,
    source: Option<WindowError>,
}

/// Kinds of [`ContainerError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContainerErrorKind {
    /// The container file could not be opened.
    Open,
    /// No "FSB5" signature was found at the start of the container.
    Magic,
    /// No "FSB5" signature was found anywhere in a bank file.
    BankMagicNotFound,
    /// The fixed header could not be read.
    Header,
    /// The format version is not 1.
    UnsupportedVersion {
        /// Version found in the header.
        version: u32,
    },
    /// The name offset table or a name could not be read.
    NameTable {
        /// Index of the sound.
        index: u32,
    },
    /// A sample mode word could not be read.
    SampleMode {
        /// Index of the sound.
        index: u32,
    },
    /// A chunk could not be read.
    Chunk {
        /// Index of the sound.
        index: u32,
        /// Index of the chunk within the sound.
        chunk: u32,
    },
    /// A loop info chunk did not hold exactly two 32-bit values.
    LoopInfoSize {
        /// Index of the sound.
        index: u32,
        /// Declared chunk size.
        size: u32,
    },
    /// The sound table extends past its declared size.
    TableSize {
        /// Declared table size.
        expected: u32,
        /// Bytes actually occupied by the table.
        actual: u64,
    },
    /// A sound's data starts before the previous sound's data or past the end of the container.
    DataOffset {
        /// Index of the sound.
        index: u32,
    },
    /// A value does not fit into its packed field.
    FieldOutOfRange {
        /// Name of the field.
        field: &'static str,
        /// Rejected value.
        value: u64,
    },
    /// A sound index past the end of the sound list was requested.
    SoundIndex {
        /// Requested index.
        index: usize,
        /// Number of sounds.
        count: usize,
    },
    /// No sound has the requested name.
    SoundNotFound,
    /// A sound's data could not be copied.
    SoundData {
        /// Index of the sound.
        index: usize,
    },
    /// The container being built exceeds the limits of the header fields.
    TooLarge {
        /// Name of the overflowing header field.
        field: &'static str,
        /// Required value.
        value: u64,
    },
    /// The container could not be written.
    Write,
}

impl ContainerError {
    pub(crate) fn new(kind: ContainerErrorKind) -> Self {
        Self { kind, source: None }
    }

    pub(crate) fn new_with_source(kind: ContainerErrorKind, source: WindowError) -> Self {
        Self {
            kind,
            source: Some(source),
        }
    }

    pub(crate) fn factory(kind: ContainerErrorKind) -> impl FnOnce(WindowError) -> Self {
        move |source| Self::new_with_source(kind, source)
    }

    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ContainerErrorKind {
        self.kind
    }

    /// Returns the broad category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        use ContainerErrorKind::*;

        match self.kind {
            Magic | LoopInfoSize { .. } | TableSize { .. } | DataOffset { .. } => {
                ErrorCategory::Format
            }
            UnsupportedVersion { .. } | TooLarge { .. } => ErrorCategory::Unsupported,
            BankMagicNotFound | SoundNotFound => ErrorCategory::NotFound,
            SoundIndex { .. } => ErrorCategory::Bounds,
            FieldOutOfRange { .. } => ErrorCategory::Usage,
            _ => match &self.source {
                Some(e) => e.category(),
                None => ErrorCategory::Format,
            },
        }
    }
}

impl Display for ContainerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        use ContainerErrorKind::*;

        match self.kind {
            Open => f.write_str("failed to open sound container"),
            Magic => f.write_str("no file signature found"),
            BankMagicNotFound => f.write_str("no sound container signature found in bank file"),
            Header => f.write_str("failed to read container header"),
            UnsupportedVersion { version } => f.write_str(&format!(
                "file format version is not supported (0x{version:08x})"
            )),
            NameTable { index } => {
                f.write_str(&format!("failed to read name of sound at index {index}"))
            }
            SampleMode { index } => f.write_str(&format!(
                "failed to read sample mode of sound at index {index}"
            )),
            Chunk { index, chunk } => f.write_str(&format!(
                "failed to read chunk {chunk} of sound at index {index}"
            )),
            LoopInfoSize { index, size } => f.write_str(&format!(
                "loop info chunk of sound at index {index} has size {size} instead of 8"
            )),
            TableSize { expected, actual } => f.write_str(&format!(
                "sound table occupies {actual} bytes but declares {expected}"
            )),
            DataOffset { index } => f.write_str(&format!(
                "data offset of sound at index {index} is out of order or past the end"
            )),
            FieldOutOfRange { field, value } => {
                f.write_str(&format!("value {value} does not fit into field `{field}`"))
            }
            SoundIndex { index, count } => f.write_str(&format!(
                "sound index {index} is out of range (container has {count} sounds)"
            )),
            SoundNotFound => f.write_str("no sound with the requested name"),
            SoundData { index } => {
                f.write_str(&format!("failed to copy data of sound at index {index}"))
            }
            TooLarge { field, value } => f.write_str(&format!(
                "container is too large: `{field}` would be {value}"
            )),
            Write => f.write_str("failed to write sound container"),
        }
    }
}

impl Error for ContainerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(e) => Some(e),
            None => None,
        }
    }
}
