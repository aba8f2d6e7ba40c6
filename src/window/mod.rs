//! Little-endian random-access windows over files and in-memory buffers.

mod backing;
mod error;

pub use backing::Backing;
pub use error::{WindowError, WindowErrorKind};
use std::{
    cell::RefCell,
    cmp::min,
    fmt::{Debug, Formatter, Result as FmtResult},
    fs::{File, OpenOptions},
    io::{Error as IoError, ErrorKind, Read, Result as IoResult, Seek, SeekFrom, Write},
    path::Path,
    rc::{Rc, Weak},
};
use tracing::trace;

type SharedBacking = Rc<RefCell<dyn Backing>>;

// chunk size for copies between windows; also bounds the memory used by a transfer
const TRANSFER_CHUNK: usize = 0x10000;

/// Whether a window may be written through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    /// Reads only; every write fails with [`WindowErrorKind::ReadOnly`].
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

enum Link {
    Owned(SharedBacking),
    Borrowed(Weak<RefCell<dyn Backing>>),
}

/// A bounded, cursor-addressed view of a byte range `[0, len)`.
///
/// All multi-byte values are read and written in little-endian order.
/// A window is either a root window, which owns its storage and may be resized,
/// or a slice of another window, which shares the parent's storage, enforces its own bounds, and is always read-only.
pub struct ByteWindow {
    link: Link,
    base: u64,
    bound: Option<u64>,
    position: u64,
    access: Access,
}

impl ByteWindow {
    /// Wraps `backing` in a root window.
    pub fn new<B: Backing + 'static>(backing: B, access: Access) -> Self {
        let shared: SharedBacking = Rc::new(RefCell::new(backing));

        Self {
            link: Link::Owned(shared),
            base: 0,
            bound: None,
            position: 0,
            access,
        }
    }

    /// Opens an existing file as a root window.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened with the requested access.
    pub fn open<P: AsRef<Path>>(path: P, access: Access) -> Result<Self, WindowError> {
        OpenOptions::new()
            .read(true)
            .write(access == Access::ReadWrite)
            .open(path)
            .map(|file| Self::new(file, access))
            .map_err(WindowError::io_factory(0))
    }

    /// Creates (or truncates) a file and opens it as a writable root window.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, WindowError> {
        File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map(|file| Self::new(file, Access::ReadWrite))
            .map_err(WindowError::io_factory(0))
    }

    /// Wraps an in-memory buffer in a root window.
    #[must_use]
    pub fn from_vec(bytes: Vec<u8>, access: Access) -> Self {
        Self::new(bytes, access)
    }

    /// Creates a read-only window over `len` bytes starting at `offset` of this window.
    ///
    /// The slice shares this window's storage. If `owns_parent` is true the slice keeps the storage open on its own;
    /// otherwise it only refers back to it, and fails with [`WindowErrorKind::Closed`] once every owner is gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the requested range does not fit inside this window.
    pub fn slice(&self, offset: u64, len: u64, owns_parent: bool) -> Result<Self, WindowError> {
        let bound = self.len()?;

        if offset.checked_add(len).map_or(true, |end| end > bound) {
            return Err(WindowError::new(
                WindowErrorKind::SliceOutOfBounds { offset, len, bound },
                self.position,
            ));
        }

        let shared = self.shared()?;
        let link = if owns_parent {
            Link::Owned(shared)
        } else {
            Link::Borrowed(Rc::downgrade(&shared))
        };

        trace!("sliced {len} bytes at offset {offset} (absolute {})", self.base + offset);

        Ok(Self {
            link,
            base: self.base + offset,
            bound: Some(len),
            position: 0,
            access: Access::ReadOnly,
        })
    }

    /// Returns whether this window may be written through.
    #[must_use]
    pub fn access(&self) -> Access {
        self.access
    }

    /// Returns whether this window is a slice of another window.
    #[must_use]
    pub fn is_slice(&self) -> bool {
        self.bound.is_some()
    }

    /// Returns the current cursor position.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Returns the length of this window, in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage was closed or its length cannot be queried.
    pub fn len(&self) -> Result<u64, WindowError> {
        match self.bound {
            Some(bound) => Ok(bound),
            None => self
                .shared()?
                .borrow_mut()
                .length()
                .map_err(WindowError::io_factory(self.position)),
        }
    }

    /// Returns whether this window is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the length of the window cannot be determined.
    pub fn is_empty(&self) -> Result<bool, WindowError> {
        self.len().map(|len| len == 0)
    }

    /// Extends (with zeros) or truncates this window to `len` bytes.
    ///
    /// The cursor is clamped to the new length.
    ///
    /// # Errors
    ///
    /// Returns an error if this window is a slice or read-only, or if the storage cannot be resized.
    pub fn set_len(&mut self, len: u64) -> Result<(), WindowError> {
        if self.is_slice() {
            return Err(WindowError::new(WindowErrorKind::Resize, self.position));
        }
        self.check_writable()?;

        self.shared()?
            .borrow_mut()
            .set_length(len)
            .map_err(WindowError::io_factory(self.position))?;

        self.position = min(self.position, len);
        Ok(())
    }

    /// Moves the cursor to `position`, which may be at most the window length.
    ///
    /// # Errors
    ///
    /// Returns an error if `position` lies past the end of the window.
    pub fn seek(&mut self, position: u64) -> Result<(), WindowError> {
        let bound = self.len()?;

        if position > bound {
            return Err(WindowError::new(
                WindowErrorKind::OutOfBounds {
                    offset: position,
                    len: 0,
                    bound,
                },
                self.position,
            ));
        }

        self.position = position;
        Ok(())
    }

    /// Moves the cursor forward by `amount` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the new position would lie past the end of the window.
    pub fn skip(&mut self, amount: u64) -> Result<(), WindowError> {
        self.seek(self.position.saturating_add(amount))
    }

    /// Fills `buf` from the cursor onwards.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than `buf.len()` bytes remain in the window.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), WindowError> {
        let start = self.position;
        self.check_range(start, buf.len() as u64)?;

        self.shared()?
            .borrow_mut()
            .read_at(self.base + start, buf)
            .map_err(WindowError::io_factory(start))?;

        self.position = start + buf.len() as u64;
        Ok(())
    }

    /// Reads `len` bytes from the cursor onwards.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than `len` bytes remain in the window.
    pub fn read_vec(&mut self, len: usize) -> Result<Vec<u8>, WindowError> {
        let mut buf = vec![0; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn take_const<const LEN: usize>(&mut self) -> Result<[u8; LEN], WindowError> {
        let mut buf = [0; LEN];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads one byte.
    ///
    /// # Errors
    ///
    /// Returns an error if the window has no bytes left.
    pub fn read_u8(&mut self) -> Result<u8, WindowError> {
        self.take_const::<1>().map(|buf| buf[0])
    }

    /// Reads a little-endian `u16`.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than 2 bytes remain.
    pub fn read_u16(&mut self) -> Result<u16, WindowError> {
        self.take_const().map(u16::from_le_bytes)
    }

    /// Reads a little-endian `u32`.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than 4 bytes remain.
    pub fn read_u32(&mut self) -> Result<u32, WindowError> {
        self.take_const().map(u32::from_le_bytes)
    }

    /// Reads a little-endian `i32`.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than 4 bytes remain.
    pub fn read_i32(&mut self) -> Result<i32, WindowError> {
        self.take_const().map(i32::from_le_bytes)
    }

    /// Reads a little-endian `u64`.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than 8 bytes remain.
    pub fn read_u64(&mut self) -> Result<u64, WindowError> {
        self.take_const().map(u64::from_le_bytes)
    }

    /// Reads a little-endian `i64`.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than 8 bytes remain.
    pub fn read_i64(&mut self) -> Result<i64, WindowError> {
        self.take_const().map(i64::from_le_bytes)
    }

    /// Reads a little-endian `f32`.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than 4 bytes remain.
    pub fn read_f32(&mut self) -> Result<f32, WindowError> {
        self.take_const().map(f32::from_le_bytes)
    }

    /// Reads a little-endian `f64`.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than 8 bytes remain.
    pub fn read_f64(&mut self) -> Result<f64, WindowError> {
        self.take_const().map(f64::from_le_bytes)
    }

    /// Reads bytes up to (and consuming) a NUL byte or the end of the window.
    ///
    /// The bytes are decoded as UTF-8 (invalid sequences are replaced) and trailing whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read.
    pub fn read_cstring(&mut self) -> Result<String, WindowError> {
        let bound = self.len()?;
        let mut bytes = Vec::new();

        while self.position < bound {
            match self.read_u8()? {
                0 => break,
                byte => bytes.push(byte),
            }
        }

        Ok(String::from_utf8_lossy(&bytes).trim_end().to_owned())
    }

    /// Reads a fixed-length string field of `len` bytes.
    ///
    /// Trailing NUL padding and whitespace are trimmed.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than `len` bytes remain.
    pub fn read_string(&mut self, len: usize) -> Result<String, WindowError> {
        let bytes = self.read_vec(len)?;

        Ok(String::from_utf8_lossy(&bytes)
            .trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
            .to_owned())
    }

    /// Writes all of `buf` at the cursor, growing a root window if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if this window is read-only or the storage cannot be written.
    pub fn write_all(&mut self, buf: &[u8]) -> Result<(), WindowError> {
        self.check_writable()?;
        let start = self.position;

        self.shared()?
            .borrow_mut()
            .write_at(self.base + start, buf)
            .map_err(WindowError::io_factory(start))?;

        self.position = start + buf.len() as u64;
        Ok(())
    }

    /// Writes one byte.
    ///
    /// # Errors
    ///
    /// Returns an error if this window is read-only or the storage cannot be written.
    pub fn write_u8(&mut self, value: u8) -> Result<(), WindowError> {
        self.write_all(&[value])
    }

    /// Writes a little-endian `u16`.
    ///
    /// # Errors
    ///
    /// Returns an error if this window is read-only or the storage cannot be written.
    pub fn write_u16(&mut self, value: u16) -> Result<(), WindowError> {
        self.write_all(&value.to_le_bytes())
    }

    /// Writes a little-endian `u32`.
    ///
    /// # Errors
    ///
    /// Returns an error if this window is read-only or the storage cannot be written.
    pub fn write_u32(&mut self, value: u32) -> Result<(), WindowError> {
        self.write_all(&value.to_le_bytes())
    }

    /// Writes a little-endian `i32`.
    ///
    /// # Errors
    ///
    /// Returns an error if this window is read-only or the storage cannot be written.
    pub fn write_i32(&mut self, value: i32) -> Result<(), WindowError> {
        self.write_all(&value.to_le_bytes())
    }

    /// Writes a little-endian `u64`.
    ///
    /// # Errors
    ///
    /// Returns an error if this window is read-only or the storage cannot be written.
    pub fn write_u64(&mut self, value: u64) -> Result<(), WindowError> {
        self.write_all(&value.to_le_bytes())
    }

    /// Writes a little-endian `f32`.
    ///
    /// # Errors
    ///
    /// Returns an error if this window is read-only or the storage cannot be written.
    pub fn write_f32(&mut self, value: f32) -> Result<(), WindowError> {
        self.write_all(&value.to_le_bytes())
    }

    /// Writes a little-endian `f64`.
    ///
    /// # Errors
    ///
    /// Returns an error if this window is read-only or the storage cannot be written.
    pub fn write_f64(&mut self, value: f64) -> Result<(), WindowError> {
        self.write_all(&value.to_le_bytes())
    }

    /// Writes `value` as a fixed-length field of `len` bytes, truncating or padding with zeros.
    ///
    /// # Errors
    ///
    /// Returns an error if this window is read-only or the storage cannot be written.
    pub fn write_string(&mut self, value: &str, len: usize) -> Result<(), WindowError> {
        let mut field = vec![0; len];
        let bytes = value.as_bytes();
        let copied = min(bytes.len(), len);
        field[..copied].copy_from_slice(&bytes[..copied]);

        self.write_all(&field)
    }

    /// Writes `count` zero bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if this window is read-only or the storage cannot be written.
    pub fn write_zeros(&mut self, count: usize) -> Result<(), WindowError> {
        self.write_all(&vec![0; count])
    }

    /// Copies `len` bytes starting at `src_offset` of this window to the cursor position of `dest`.
    ///
    /// The copy goes straight from one storage to the other in bounded chunks.
    /// Neither window's cursor is moved.
    ///
    /// # Errors
    ///
    /// Returns an error if the source range leaves this window, if `dest` is read-only, or on I/O failure.
    pub fn transfer_to(
        &self,
        dest: &mut ByteWindow,
        src_offset: u64,
        len: u64,
    ) -> Result<(), WindowError> {
        if len == 0 {
            return Ok(());
        }

        self.check_range(src_offset, len)?;
        dest.check_writable()?;

        let src = self.shared()?;
        let dst = dest.shared()?;
        let src_start = self.base + src_offset;
        let dst_start = dest.base + dest.position;

        let mut buf = vec![0; min(TRANSFER_CHUNK as u64, len) as usize];
        let mut transferred = 0;

        // both windows may share one storage, so each borrow is released before the next is taken
        while transferred < len {
            let count = min(buf.len() as u64, len - transferred) as usize;
            let chunk = &mut buf[..count];

            src.borrow_mut()
                .read_at(src_start + transferred, chunk)
                .map_err(WindowError::io_factory(src_offset + transferred))?;
            dst.borrow_mut()
                .write_at(dst_start + transferred, chunk)
                .map_err(WindowError::io_factory(dest.position + transferred))?;

            transferred += count as u64;
        }

        trace!("transferred {len} bytes from offset {src_start} to offset {dst_start}");
        Ok(())
    }

    /// Writes everything `source` yields at the cursor, returning the number of bytes copied.
    ///
    /// # Errors
    ///
    /// Returns an error if `source` fails, if this window is read-only, or if the storage cannot be written.
    pub fn copy_from_reader<R: Read>(&mut self, mut source: R) -> Result<u64, WindowError> {
        std::io::copy(&mut source, &mut self.io()).map_err(WindowError::io_factory(self.position))
    }

    /// Reads `len` bytes from the cursor into `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than `len` bytes remain or if `sink` fails.
    pub fn copy_to_writer<W: Write>(&mut self, len: u64, mut sink: W) -> Result<(), WindowError> {
        let start = self.position;
        self.check_range(start, len)?;

        let _ = std::io::copy(&mut self.io().take(len), &mut sink)
            .map_err(WindowError::io_factory(start))?;
        Ok(())
    }

    /// Borrows this window as a [`std::io`] reader, writer, and seeker.
    pub fn io(&mut self) -> WindowIo<'_> {
        WindowIo { window: self }
    }

    /// Releases this window.
    ///
    /// Storage is closed once its last owner is released; non-owning slices of it fail from then on.
    pub fn close(self) {
        trace!("closed window at base {}", self.base);
    }

    fn shared(&self) -> Result<SharedBacking, WindowError> {
        match &self.link {
            Link::Owned(shared) => Ok(Rc::clone(shared)),
            Link::Borrowed(weak) => weak
                .upgrade()
                .ok_or_else(|| WindowError::new(WindowErrorKind::Closed, self.position)),
        }
    }

    fn check_range(&self, offset: u64, len: u64) -> Result<(), WindowError> {
        let bound = self.len()?;

        if offset.checked_add(len).map_or(true, |end| end > bound) {
            Err(WindowError::new(
                WindowErrorKind::OutOfBounds { offset, len, bound },
                self.position,
            ))
        } else {
            Ok(())
        }
    }

    fn check_writable(&self) -> Result<(), WindowError> {
        match self.access {
            Access::ReadWrite => Ok(()),
            Access::ReadOnly => Err(WindowError::new(WindowErrorKind::ReadOnly, self.position)),
        }
    }
}

impl Debug for ByteWindow {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ByteWindow")
            .field("base", &self.base)
            .field("bound", &self.bound)
            .field("position", &self.position)
            .field("access", &self.access)
            .finish_non_exhaustive()
    }
}

/// Adapter exposing a [`ByteWindow`] through [`Read`], [`Write`], and [`Seek`].
#[derive(Debug)]
pub struct WindowIo<'window> {
    window: &'window mut ByteWindow,
}

impl Read for WindowIo<'_> {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        let remaining = self.window.len()?.saturating_sub(self.window.position);
        let count = min(buf.len() as u64, remaining) as usize;

        self.window.read_exact(&mut buf[..count])?;
        Ok(count)
    }
}

impl Write for WindowIo<'_> {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.window.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

impl Seek for WindowIo<'_> {
    fn seek(&mut self, pos: SeekFrom) -> IoResult<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.window.len()?.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.window.position.checked_add_signed(delta),
        }
        .ok_or_else(|| IoError::from(ErrorKind::InvalidInput))?;

        self.window.seek(target)?;
        Ok(target)
    }
}
