//! Reverting every redirect of a known archive from a pristine table of contents snapshot.
//!
//! Redirects only ever append, so an entry whose payload offset lies at or past the pristine archive length
//! has been patched. Resetting restores the original record of each such entry from the snapshot and then
//! truncates the archive back to its pristine length.

use super::{
    backup::TocBackupStream,
    error::{ArchiveError, ArchiveErrorKind},
    BunyArchive,
};
use crate::read::ReadError;
use phf::phf_map;
use std::{
    io::{Read, Result as IoResult},
    path::Path,
};
use tracing::{debug, trace};

/// Signature of a pristine archive shipped with the game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KnownArchive {
    /// File name of the archive.
    pub name: &'static str,
    /// Table of contents offset of the pristine archive.
    pub toc_offset: u64,
    /// Table of contents size of the pristine archive.
    pub toc_size: u64,
    /// Length of the pristine archive, in bytes.
    pub original_length: u64,
    /// File name of the table of contents snapshot for this archive.
    pub backup_name: &'static str,
}

// keyed by table of contents size, which differs between the shipped archives
static KNOWN_ARCHIVES: phf::Map<u64, KnownArchive> = phf_map! {
    712_680_u64 => KnownArchive {
        name: "data.buny",
        toc_offset: 80,
        toc_size: 712_680,
        original_length: 6_980_514_369,
        backup_name: "dataTocBackup.dat",
    },
    9_800_u64 => KnownArchive {
        name: "data_1.buny",
        toc_offset: 80,
        toc_size: 9_800,
        original_length: 86_528_129,
        backup_name: "data1TocBackup.dat",
    },
};

/// Returns every known pristine archive signature.
pub fn known_archives() -> impl Iterator<Item = &'static KnownArchive> {
    KNOWN_ARCHIVES.values()
}

impl KnownArchive {
    /// Returns whether `archive` is this archive, in pristine or patched state.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive length cannot be queried.
    pub fn matches(&self, archive: &BunyArchive) -> Result<bool, ArchiveError> {
        let header = archive.header();

        Ok(header.toc_offset == self.toc_offset
            && header.toc_size == self.toc_size
            && archive.length()? >= self.original_length)
    }
}

/// Finds the known archive that `archive` was derived from, if any.
///
/// # Errors
///
/// Returns an error if the archive length cannot be queried.
pub fn identify(archive: &BunyArchive) -> Result<Option<&'static KnownArchive>, ArchiveError> {
    match KNOWN_ARCHIVES.get(&archive.header().toc_size) {
        Some(known) if known.matches(archive)? => Ok(Some(known)),
        _ => Ok(None),
    }
}

/// Returns the indices, in ascending order, of every entry whose payload was redirected past the pristine end.
///
/// # Errors
///
/// Returns an error if the table of contents cannot be parsed.
pub fn search_modified(
    archive: &mut BunyArchive,
    known: &KnownArchive,
) -> Result<Vec<usize>, ArchiveError> {
    Ok(archive
        .entries()?
        .into_iter()
        .filter(|entry| entry.offset() >= known.original_length)
        .map(|entry| entry.index())
        .collect())
}

/// Outcome of a successful reset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResetReport {
    /// Signature the archive was reset to.
    pub archive: KnownArchive,
    /// Indices of the entries whose original records were restored.
    pub restored: Vec<usize>,
}

/// Restores every redirected entry of `archive` from `backup`, then truncates it to the pristine length.
///
/// `backup` must be positioned at its first record. The caller is responsible for `known` describing `archive`.
///
/// # Errors
///
/// Returns an error if the snapshot ends early or cannot be read, or if the archive cannot be rewritten.
/// Entries restored before the failure stay restored.
pub fn reset_with<R: Read>(
    archive: &mut BunyArchive,
    known: &KnownArchive,
    backup: &mut TocBackupStream<R>,
) -> Result<ResetReport, ArchiveError> {
    let modified = search_modified(archive, known)?;
    debug!(
        "located {} modified entries to reset in {}",
        modified.len(),
        known.name
    );

    // the snapshot carries no indices, so unmodified records in between are skipped
    let mut previous = None;
    for &index in &modified {
        let gap = previous.map_or(index, |previous| index - previous - 1);

        backup
            .skip(gap as u64)
            .map_err(backup_error_factory(index))?;
        let item = backup.next_item().map_err(backup_error_factory(index))?;

        trace!(
            "restoring entry {index} to offset {}, zsize {}, size {}",
            item.offset,
            item.zsize,
            item.size
        );
        archive.rewrite_toc(index, item.offset, item.zsize, item.size)?;
        previous = Some(index);
    }

    archive.set_length(known.original_length)?;
    debug!("reset {} entries in {}", modified.len(), known.name);

    Ok(ResetReport {
        archive: *known,
        restored: modified,
    })
}

/// Identifies `archive`, opens its snapshot with `open_backup`, and resets it.
///
/// # Errors
///
/// Returns an error if the archive is not a known archive, if the snapshot cannot be opened, or if the reset fails.
pub fn reset<R, F>(archive: &mut BunyArchive, open_backup: F) -> Result<ResetReport, ArchiveError>
where
    R: Read,
    F: FnOnce(&KnownArchive) -> IoResult<R>,
{
    let known = identify(archive)?
        .ok_or_else(|| ArchiveError::new(ArchiveErrorKind::UnknownArchive))?;
    let source =
        open_backup(known).map_err(ArchiveError::io_factory(ArchiveErrorKind::BackupOpen))?;

    reset_with(archive, known, &mut TocBackupStream::new(source))
}

/// Resets `archive` using the snapshot file stored under its known backup name in `dir`.
///
/// # Errors
///
/// Returns an error if the archive is not a known archive, if the snapshot cannot be opened, or if the reset fails.
pub fn reset_from_dir<P: AsRef<Path>>(
    archive: &mut BunyArchive,
    dir: P,
) -> Result<ResetReport, ArchiveError> {
    let dir = dir.as_ref();

    reset(archive, |known| {
        std::fs::File::open(dir.join(known.backup_name)).map(std::io::BufReader::new)
    })
}

fn backup_error_factory(index: usize) -> impl FnOnce(ReadError) -> ArchiveError {
    move |e| {
        let kind = if e.is_incomplete() {
            ArchiveErrorKind::BackupExhausted { index }
        } else {
            ArchiveErrorKind::Backup { index }
        };

        ArchiveError::read_factory(kind)(e)
    }
}

#[cfg(test)]
mod test {
    use super::{identify, known_archives, reset, reset_with, search_modified, KnownArchive};
    use crate::{
        buny::{
            backup::encode_items,
            fixture::{build, literal, raw, zstd},
            ArchiveErrorKind, BunyArchive, TocBackupItem, TocBackupStream,
        },
        error::ErrorCategory,
        window::{Access, ByteWindow},
    };

    fn sample_bytes() -> Vec<u8> {
        build(&[
            raw("a.png", b"aaaa"),
            literal("b.txt", b"bbbbbb"),
            raw("c.png", b"cc"),
            zstd("d.txt", &b"dddd".repeat(50)),
            raw("e.png", b"eeeeeeee"),
        ])
    }

    fn known_for(bytes: &[u8]) -> KnownArchive {
        KnownArchive {
            name: "sample.buny",
            toc_offset: 0x50,
            toc_size: 5 * 0x28,
            original_length: bytes.len() as u64,
            backup_name: "sample.dat",
        }
    }

    fn snapshot(archive: &mut BunyArchive) -> Vec<TocBackupItem> {
        archive
            .entries()
            .unwrap()
            .into_iter()
            .map(|e| TocBackupItem {
                offset: e.offset(),
                zsize: e.zsize(),
                size: e.size(),
            })
            .collect()
    }

    fn redirect(archive: &mut BunyArchive, index: usize, content: &[u8]) {
        let source = ByteWindow::from_vec(content.to_vec(), Access::ReadOnly);
        archive.redirect(index, &source).unwrap();
    }

    #[test]
    fn known_signatures() {
        let names: Vec<&str> = known_archives().map(|k| k.name).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"data.buny"));
        assert!(names.contains(&"data_1.buny"));
    }

    #[test]
    fn identify_by_header_and_length() {
        let bytes = build(&[]);
        let mut header = bytes[..0x50].to_vec();
        header[0x28..0x30].copy_from_slice(&9_800u64.to_le_bytes());

        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), &header).unwrap();
        let archive = BunyArchive::open(file.path()).unwrap();
        assert!(identify(&archive).unwrap().is_none());

        // sparse extension up to the pristine length
        file.as_file().set_len(86_528_129).unwrap();
        let known = identify(&archive).unwrap().unwrap();
        assert_eq!(known.name, "data_1.buny");
        assert_eq!(known.backup_name, "data1TocBackup.dat");
    }

    #[test]
    fn reset_unknown_archive() {
        let mut archive =
            BunyArchive::from_window(ByteWindow::from_vec(sample_bytes(), Access::ReadWrite))
                .unwrap();

        assert!(reset(&mut archive, |_| Ok(std::io::empty())).is_err_and(|e| e.kind()
            == ArchiveErrorKind::UnknownArchive
            && e.category() == ErrorCategory::Usage));
    }

    #[test]
    fn reset_restores_records_and_length() {
        let bytes = sample_bytes();
        let known = known_for(&bytes);
        let mut archive =
            BunyArchive::from_window(ByteWindow::from_vec(bytes.clone(), Access::ReadWrite))
                .unwrap();
        let original = snapshot(&mut archive);

        redirect(&mut archive, 1, b"new text");
        redirect(&mut archive, 3, b"another text");
        redirect(&mut archive, 4, b"new png");
        redirect(&mut archive, 1, b"newer text");

        assert_eq!(search_modified(&mut archive, &known).unwrap(), [1, 3, 4]);

        let data = encode_items(&original);
        let mut backup = TocBackupStream::new(data.as_slice());
        let report = reset_with(&mut archive, &known, &mut backup).unwrap();

        assert_eq!(report.restored, [1, 3, 4]);
        assert_eq!(archive.length().unwrap(), bytes.len() as u64);
        assert_eq!(snapshot(&mut archive), original);
        assert_eq!(archive.entry(3).unwrap().block_num(), 1);
        assert!(search_modified(&mut archive, &known).unwrap().is_empty());

        // the archive is byte-identical to the pristine one
        archive.window.seek(0).unwrap();
        assert_eq!(archive.window.read_vec(bytes.len()).unwrap(), bytes);
    }

    #[test]
    fn reset_first_entry() {
        let bytes = sample_bytes();
        let known = known_for(&bytes);
        let mut archive =
            BunyArchive::from_window(ByteWindow::from_vec(bytes, Access::ReadWrite)).unwrap();
        let original = snapshot(&mut archive);

        redirect(&mut archive, 0, b"zzzz");

        let data = encode_items(&original);
        let report =
            reset_with(&mut archive, &known, &mut TocBackupStream::new(data.as_slice())).unwrap();
        assert_eq!(report.restored, [0]);
        assert_eq!(snapshot(&mut archive), original);
    }

    #[test]
    fn reset_with_short_snapshot() {
        let bytes = sample_bytes();
        let known = known_for(&bytes);
        let mut archive =
            BunyArchive::from_window(ByteWindow::from_vec(bytes, Access::ReadWrite)).unwrap();
        let original = snapshot(&mut archive);

        redirect(&mut archive, 4, b"new png");

        let data = encode_items(&original[..3]);
        let result = reset_with(&mut archive, &known, &mut TocBackupStream::new(data.as_slice()));
        assert!(result.is_err_and(|e| e.kind() == ArchiveErrorKind::BackupExhausted { index: 4 }
            && e.category() == ErrorCategory::NotFound));
    }
}
