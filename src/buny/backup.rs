use crate::read::{ReadError, Reader};
use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    fs::File,
    io::{BufReader, Read, Result as IoResult},
    path::Path,
};
use tracing::trace;

const RECORD_SIZE: u64 = 24;

/// Original placement of one table of contents record, as stored in a backup snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TocBackupItem {
    /// Absolute archive offset of the original payload.
    pub offset: u64,
    /// On-disk size of the original payload.
    pub zsize: u64,
    /// Decompressed size of the original payload.
    pub size: u64,
}

/// Sequential reader over a pristine snapshot of an archive's table of contents.
///
/// The snapshot is a headerless run of 24-byte big-endian `(offset, zsize, size)` records,
/// one per original entry in index order. It can only be read forward.
pub struct TocBackupStream<R: Read> {
    reader: Reader<R>,
    next_index: u64,
}

impl TocBackupStream<BufReader<File>> {
    /// Opens a snapshot file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> IoResult<Self> {
        File::open(path).map(BufReader::new).map(Self::new)
    }
}

impl<R: Read> TocBackupStream<R> {
    /// Wraps a snapshot byte stream.
    pub fn new(source: R) -> Self {
        Self {
            reader: Reader::new(source),
            next_index: 0,
        }
    }

    /// Returns the index of the record that the next call to [`next_item`](Self::next_item) yields.
    #[must_use]
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Skips exactly `count` records.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot ends first or cannot be read.
    pub fn skip(&mut self, count: u64) -> Result<(), ReadError> {
        if count == 0 {
            return Ok(());
        }

        self.reader.skip(count * RECORD_SIZE)?;
        trace!("skipped {count} backup records starting at {}", self.next_index);

        self.next_index += count;
        Ok(())
    }

    /// Consumes one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot ends first or cannot be read.
    pub fn next_item(&mut self) -> Result<TocBackupItem, ReadError> {
        let offset = self.reader.be_u64()?;
        let zsize = self.reader.be_u64()?;
        let size = self.reader.be_u64()?;

        self.next_index += 1;
        Ok(TocBackupItem {
            offset,
            zsize,
            size,
        })
    }
}

impl<R: Read> Debug for TocBackupStream<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("TocBackupStream")
            .field("next_index", &self.next_index)
            .field("position", &self.reader.position())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) fn encode_items(items: &[TocBackupItem]) -> Vec<u8> {
    items
        .iter()
        .flat_map(|item| {
            [item.offset, item.zsize, item.size]
                .into_iter()
                .flat_map(u64::to_be_bytes)
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::{encode_items, TocBackupItem, TocBackupStream};
    use crate::read::{Needed, ReadErrorKind};

    fn item(n: u64) -> TocBackupItem {
        TocBackupItem {
            offset: n * 100,
            zsize: n * 10,
            size: n,
        }
    }

    #[test]
    fn read_records_in_order() {
        let data = encode_items(&[item(1), item(2)]);
        let mut backup = TocBackupStream::new(data.as_slice());

        assert_eq!(backup.next_item().unwrap(), item(1));
        assert_eq!(backup.next_item().unwrap(), item(2));
        assert_eq!(backup.next_index(), 2);
    }

    #[test]
    fn records_are_big_endian() {
        let data = b"\x00\x00\x00\x00\x00\x00\x01\x00\x00\x00\x00\x00\x00\x00\x00\x02\x00\x00\x00\x00\x00\x00\x00\x03";
        let mut backup = TocBackupStream::new(data.as_slice());

        assert_eq!(
            backup.next_item().unwrap(),
            TocBackupItem {
                offset: 256,
                zsize: 2,
                size: 3
            }
        );
    }

    #[test]
    fn skip_records() {
        let data = encode_items(&[item(1), item(2), item(3), item(4)]);
        let mut backup = TocBackupStream::new(data.as_slice());

        assert!(backup.skip(0).is_ok());
        assert!(backup.skip(2).is_ok());
        assert_eq!(backup.next_item().unwrap(), item(3));
        assert!(backup.skip(1).is_ok());
        assert_eq!(backup.next_index(), 4);
    }

    #[test]
    fn exhausted_snapshot() {
        let data = encode_items(&[item(1)]);
        let mut backup = TocBackupStream::new(data.as_slice());

        assert!(backup.skip(2).is_err_and(|e| matches!(
            e.kind(),
            ReadErrorKind::Incomplete(Needed::Size(_))
        )));

        let mut backup = TocBackupStream::new(&data[..20]);
        assert!(backup.next_item().is_err());
    }
}
