use crate::error::ErrorCategory;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    io::{Error as IoError, ErrorKind},
};

/// Error raised by [`ByteWindow`](super::ByteWindow) operations.
#[derive(Debug)]
pub struct WindowError {
    kind: WindowErrorKind,
    position: u64,
    source: Option<IoError>,
}

/// Kinds of [`WindowError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum WindowErrorKind {
    /// An access of `len` bytes at `offset` would leave the window, which ends at `bound`.
    OutOfBounds {
        /// Window-local offset of the access.
        offset: u64,
        /// Number of bytes accessed.
        len: u64,
        /// Length of the window.
        bound: u64,
    },
    /// A slice was requested that does not fit inside its parent.
    SliceOutOfBounds {
        /// Parent-local offset of the requested slice.
        offset: u64,
        /// Requested slice length.
        len: u64,
        /// Length of the parent window.
        bound: u64,
    },
    /// A write was attempted through a read-only window.
    ReadOnly,
    /// A length change was attempted on a slice.
    Resize,
    /// The storage shared with the parent window has already been closed.
    Closed,
    /// The backing storage reported an I/O error.
    Failure,
}

impl WindowError {
    pub(crate) fn new(kind: WindowErrorKind, position: u64) -> Self {
        Self {
            kind,
            position,
            source: None,
        }
    }

    pub(crate) fn io(position: u64, source: IoError) -> Self {
        Self {
            kind: WindowErrorKind::Failure,
            position,
            source: Some(source),
        }
    }

    pub(crate) fn io_factory(position: u64) -> impl FnOnce(IoError) -> Self {
        move |source| Self::io(position, source)
    }

    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> WindowErrorKind {
        self.kind
    }

    /// Returns the window cursor position at the time of the error.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Returns the broad category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self.kind {
            WindowErrorKind::Failure => ErrorCategory::Io,
            _ => ErrorCategory::Bounds,
        }
    }
}

impl Display for WindowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        use WindowErrorKind::*;

        match self.kind {
            OutOfBounds { offset, len, bound } => f.write_str(&format!(
                "access of {len} bytes at offset {offset} exceeds window length {bound}"
            )),
            SliceOutOfBounds { offset, len, bound } => f.write_str(&format!(
                "slice of {len} bytes at offset {offset} exceeds parent length {bound}"
            )),
            ReadOnly => f.write_str("window is read-only"),
            Resize => f.write_str("length of a slice cannot be changed"),
            Closed => f.write_str("underlying storage was already closed"),
            Failure => f.write_str("failed to access underlying storage due to I/O error"),
        }?;

        f.write_str(&format!(" - window position {}", self.position))
    }
}

impl Error for WindowError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(e) => Some(e),
            None => None,
        }
    }
}

impl From<WindowError> for IoError {
    fn from(value: WindowError) -> Self {
        let kind = match value.kind {
            WindowErrorKind::OutOfBounds { .. } => ErrorKind::UnexpectedEof,
            WindowErrorKind::ReadOnly => ErrorKind::PermissionDenied,
            WindowErrorKind::Failure => match &value.source {
                Some(e) => e.kind(),
                None => ErrorKind::Other,
            },
            _ => ErrorKind::InvalidInput,
        };

        IoError::new(kind, value)
    }
}
