use crate::{buny::ArchiveError, fsb5::ContainerError, window::WindowError};
use std::{
    error::Error as StdError,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Broad classes of failure shared by every subsystem of the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Input data is malformed.
    Format,
    /// An access or slice left the bounds of a window, or wrote through a read-only one.
    Bounds,
    /// The operation is valid but exceeds what this crate implements.
    Unsupported,
    /// The operation does not apply to the given input.
    Usage,
    /// A looked-up item does not exist.
    NotFound,
    /// The backing storage reported an I/O failure.
    Io,
}

/// Any error raised by this crate.
#[derive(Debug)]
pub struct Error {
    inner: ErrorInner,
}

#[derive(Debug)]
enum ErrorInner {
    Window(WindowError),
    Archive(ArchiveError),
    Container(ContainerError),
}

impl Error {
    /// Returns the broad category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match &self.inner {
            ErrorInner::Window(e) => e.category(),
            ErrorInner::Archive(e) => e.category(),
            ErrorInner::Container(e) => e.category(),
        }
    }

    /// Returns the underlying archive error, if this error was raised by a Buny archive.
    #[must_use]
    pub fn as_archive_error(&self) -> Option<&ArchiveError> {
        match &self.inner {
            ErrorInner::Archive(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the underlying container error, if this error was raised by an FSB5 container.
    #[must_use]
    pub fn as_container_error(&self) -> Option<&ContainerError> {
        match &self.inner {
            ErrorInner::Container(e) => Some(e),
            _ => None,
        }
    }
}

impl From<WindowError> for Error {
    fn from(value: WindowError) -> Self {
        Self {
            inner: ErrorInner::Window(value),
        }
    }
}

impl From<ArchiveError> for Error {
    fn from(value: ArchiveError) -> Self {
        Self {
            inner: ErrorInner::Archive(value),
        }
    }
}

impl From<ContainerError> for Error {
    fn from(value: ContainerError) -> Self {
        Self {
            inner: ErrorInner::Container(value),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.inner {
            ErrorInner::Window(e) => e.fmt(f),
            ErrorInner::Archive(e) => e.fmt(f),
            ErrorInner::Container(e) => e.fmt(f),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.inner {
            ErrorInner::Window(e) => e.source(),
            ErrorInner::Archive(e) => e.source(),
            ErrorInner::Container(e) => e.source(),
        }
    }
}
