use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    io::{self, Error as IoError, ErrorKind, Read},
    num::NonZeroU64,
};

/// Forward-only decoder over a byte stream that keeps track of how far it has read.
pub(crate) struct Reader<R: Read> {
    inner: R,
    position: u64,
}

impl<R: Read> Reader<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            inner: reader,
            position: 0,
        }
    }

    fn fill(&mut self, buf: &mut [u8]) -> ReadResult<()> {
        let mut filled = 0;

        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    self.position += n as u64;
                }
                // this I/O error is non-fatal, so reading is retried
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Err(self.to_error(ReadErrorKind::Incomplete(Needed::Unknown)));
                }
                Err(e) => return Err(self.to_error_with_source(ReadErrorKind::Failure, e)),
            }
        }

        match NonZeroU64::new((buf.len() - filled) as u64) {
            None => Ok(()),
            Some(missing) => Err(self.to_error(ReadErrorKind::Incomplete(Needed::Size(missing)))),
        }
    }

    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn take_const<const LEN: usize>(&mut self) -> ReadResult<[u8; LEN]> {
        let mut buf = [0; LEN];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    pub(crate) fn skip(&mut self, amount: u64) -> ReadResult<()> {
        let copied = io::copy(&mut self.inner.by_ref().take(amount), &mut io::sink());
        let skipped = match copied {
            Ok(n) => n,
            Err(e) => return Err(self.to_error_with_source(ReadErrorKind::Failure, e)),
        };
        self.position += skipped;

        match NonZeroU64::new(amount - skipped) {
            None => Ok(()),
            Some(missing) => Err(self.to_error(ReadErrorKind::Incomplete(Needed::Size(missing)))),
        }
    }

    pub(crate) fn be_u64(&mut self) -> ReadResult<u64> {
        self.take_const().map(u64::from_be_bytes)
    }
}

pub(crate) type ReadResult<T> = Result<T, ReadError>;

/// Error raised while decoding a sequential byte stream.
#[derive(Debug)]
pub struct ReadError {
    position: u64,
    kind: ReadErrorKind,
    source: Option<IoError>,
}

/// Kinds of [`ReadError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadErrorKind {
    /// The underlying reader failed.
    Failure,
    /// The stream ended early.
    Incomplete(Needed),
}

/// Amount of data missing from an incomplete stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Needed {
    /// This many more bytes were required.
    Size(NonZeroU64),
    /// The reader signalled end-of-file without saying how much was missing.
    Unknown,
}

impl<R: Read> Reader<R> {
    fn to_error(&self, kind: ReadErrorKind) -> ReadError {
        ReadError {
            position: self.position,
            kind,
            source: None,
        }
    }

    fn to_error_with_source(&self, kind: ReadErrorKind, source: IoError) -> ReadError {
        ReadError {
            position: self.position,
            kind,
            source: Some(source),
        }
    }
}

impl ReadError {
    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ReadErrorKind {
        self.kind
    }

    /// Returns the stream position at which reading stopped.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn is_incomplete(&self) -> bool {
        matches!(self.kind, ReadErrorKind::Incomplete(_))
    }
}

impl Display for ReadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            ReadErrorKind::Failure => f.write_str("failed to read data due to I/O error"),
            ReadErrorKind::Incomplete(needed) => match needed {
                Needed::Size(size) => {
                    f.write_str(&format!("incomplete data: needed {size} more bytes to read"))
                }
                Needed::Unknown => f.write_str("incomplete data"),
            },
        }?;

        f.write_str(&format!(" - byte position {}", self.position))
    }
}

impl Error for ReadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(e) => Some(e),
            None => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Needed, ReadErrorKind, Reader};
    use std::{
        io::{Error as IoError, ErrorKind, Read, Result as IoResult},
        num::NonZeroU64,
    };

    fn missing(n: u64) -> ReadErrorKind {
        ReadErrorKind::Incomplete(Needed::Size(NonZeroU64::new(n).unwrap()))
    }

    #[test]
    fn take_bytes() {
        let data = b"abc123";
        let mut reader = Reader::new(data.as_slice());

        assert_eq!(reader.take_const().unwrap(), [97]);
        assert_eq!(reader.take_const().unwrap(), [98, 99]);
        assert_eq!(reader.take_const().unwrap(), [49, 50, 51]);
        assert_eq!(reader.take_const().unwrap(), []);
        assert!(reader
            .take_const::<1>()
            .is_err_and(|e| e.kind() == missing(1)));
    }

    #[test]
    fn skip_bytes() {
        let data = b"abc123";
        let mut reader = Reader::new(data.as_slice());

        assert!(reader.skip(1).is_ok());
        assert!(reader.skip(2).is_ok());
        assert_eq!(reader.position(), 3);
        assert!(reader.skip(0).is_ok());
        assert!(reader.skip(7).is_err_and(|e| e.kind() == missing(4)));
        assert_eq!(reader.position(), 6);
    }

    #[test]
    fn parse_big_endian_numbers() {
        let data = b"\x00\x00\x00\x00\x00\x00\x01\x02\xFF\xFF\xFF\xFF\xFF\xFF\xFF\xFF\x00";
        let mut reader = Reader::new(data.as_slice());

        assert_eq!(reader.be_u64().unwrap(), 0x0102);
        assert_eq!(reader.be_u64().unwrap(), u64::MAX);
        assert!(reader.be_u64().is_err_and(|e| e.kind() == missing(7)));
    }

    // yields at most one byte per call, interrupting every other call
    struct StutterReader<'data> {
        data: &'data [u8],
        interrupt: bool,
    }

    impl Read for StutterReader<'_> {
        fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(IoError::from(ErrorKind::Interrupted));
            }

            match (self.data.split_first(), buf.first_mut()) {
                (Some((&byte, rest)), Some(slot)) => {
                    *slot = byte;
                    self.data = rest;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }
    }

    #[test]
    fn handle_short_and_interrupted_reads() {
        let mut reader = Reader::new(StutterReader {
            data: b"\x00\x00\x00\x00\x00\x00\x00\x2A",
            interrupt: false,
        });

        assert_eq!(reader.be_u64().unwrap(), 42);
        assert_eq!(reader.position(), 8);
    }

    struct EofReader;

    impl Read for EofReader {
        fn read(&mut self, _buf: &mut [u8]) -> IoResult<usize> {
            Err(IoError::from(ErrorKind::UnexpectedEof))
        }
    }

    #[test]
    fn handle_unexpected_eof() {
        let mut reader = Reader::new(EofReader);

        assert!(reader
            .take_const::<1>()
            .is_err_and(|e| e.kind() == ReadErrorKind::Incomplete(Needed::Unknown)));
    }

    struct UnsupportedReader;

    impl Read for UnsupportedReader {
        fn read(&mut self, _buf: &mut [u8]) -> IoResult<usize> {
            Err(IoError::from(ErrorKind::Unsupported))
        }
    }

    #[test]
    fn handle_misc_io_error() {
        let mut reader = Reader::new(UnsupportedReader);

        assert!(reader
            .take_const::<1>()
            .is_err_and(|e| e.kind() == ReadErrorKind::Failure));
        assert!(reader
            .skip(1)
            .is_err_and(|e| e.kind() == ReadErrorKind::Failure));
    }
}
