use std::{
    fs::File,
    io::{Error as IoError, ErrorKind, Read, Result as IoResult, Seek, SeekFrom, Write},
};

/// Positional byte storage underneath a [`ByteWindow`](super::ByteWindow).
///
/// Implementations address bytes by absolute offset; cursors are tracked by the windows themselves.
pub trait Backing {
    /// Fills `buf` with the bytes starting at `offset`, failing if the storage ends first.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> IoResult<()>;

    /// Writes all of `buf` starting at `offset`, growing the storage if needed.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> IoResult<()>;

    /// Returns the current length of the storage, in bytes.
    fn length(&mut self) -> IoResult<u64>;

    /// Extends (with zeros) or truncates the storage to `len` bytes.
    fn set_length(&mut self, len: u64) -> IoResult<()>;
}

impl Backing for File {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> IoResult<()> {
        let _ = self.seek(SeekFrom::Start(offset))?;
        self.read_exact(buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> IoResult<()> {
        let _ = self.seek(SeekFrom::Start(offset))?;
        self.write_all(buf)
    }

    fn length(&mut self) -> IoResult<u64> {
        self.metadata().map(|metadata| metadata.len())
    }

    fn set_length(&mut self, len: u64) -> IoResult<()> {
        self.set_len(len)
    }
}

impl Backing for Vec<u8> {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> IoResult<()> {
        let start = to_index(offset)?;
        let end = start
            .checked_add(buf.len())
            .filter(|&end| end <= self.len())
            .ok_or_else(|| IoError::from(ErrorKind::UnexpectedEof))?;

        buf.copy_from_slice(&self[start..end]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> IoResult<()> {
        let start = to_index(offset)?;
        let end = start
            .checked_add(buf.len())
            .ok_or_else(|| IoError::from(ErrorKind::InvalidInput))?;

        if end > self.len() {
            self.resize(end, 0);
        }
        self[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn length(&mut self) -> IoResult<u64> {
        Ok(self.len() as u64)
    }

    fn set_length(&mut self, len: u64) -> IoResult<()> {
        self.resize(to_index(len)?, 0);
        Ok(())
    }
}

fn to_index(offset: u64) -> IoResult<usize> {
    usize::try_from(offset).map_err(|_| IoError::from(ErrorKind::InvalidInput))
}

#[cfg(test)]
mod test {
    use super::Backing;
    use std::io::ErrorKind;

    #[test]
    fn memory_backing_reads_in_range() {
        let mut data = b"abc123".to_vec();
        let mut buf = [0; 3];

        assert!(data.read_at(2, &mut buf).is_ok());
        assert_eq!(&buf, b"c12");

        assert!(data
            .read_at(4, &mut buf)
            .is_err_and(|e| e.kind() == ErrorKind::UnexpectedEof));
    }

    #[test]
    fn memory_backing_grows_on_write() {
        let mut data = b"ab".to_vec();

        assert!(data.write_at(4, b"xy").is_ok());
        assert_eq!(data, b"ab\x00\x00xy");

        assert!(data.set_length(3).is_ok());
        assert_eq!(data.length().unwrap(), 3);
    }
}
