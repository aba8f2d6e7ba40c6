use super::{
    chunk::Chunk,
    codec::Codec,
    error::{ContainerError, ContainerErrorKind},
    mode::SampleMode,
    sound::SoundFromFsb,
};
use crate::window::{Access, ByteWindow};
use std::{
    collections::HashMap,
    fmt::{Display, Formatter, Result as FmtResult},
    path::Path,
    rc::Rc,
};
use tap::Pipe;
use tracing::{debug, trace};

pub(crate) const FSB5_MAGIC: [u8; 4] = *b"FSB5";
pub(crate) const HEADER_SIZE: u64 = 0x3C;
pub(crate) const HEADER_EXTRA_SIZE: usize = 32;

// bank files only place containers on these boundaries
const BANK_SCAN_STEP: u64 = 0x20;

/// Fixed header of an FSB5 container.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fsb5Header {
    /// Format version.
    pub version: u32,
    /// Number of sounds.
    pub sound_count: u32,
    /// Size of the sound table, in bytes.
    pub table_size: u32,
    /// Size of the name table, in bytes. 0 if sounds are unnamed.
    pub name_table_size: u32,
    /// Size of the data section, in bytes.
    pub data_size: u32,
    /// Codec of every sound.
    pub codec: u32,
    /// Opaque trailing header bytes.
    pub extra: [u8; HEADER_EXTRA_SIZE],
}

impl Fsb5Header {
    fn parse(window: &mut ByteWindow) -> Result<Self, ContainerError> {
        let mut magic = [0; 4];
        match window.read_exact(&mut magic) {
            Ok(()) if magic == FSB5_MAGIC => Ok(()),
            Err(e) => Err(ContainerError::new_with_source(ContainerErrorKind::Magic, e)),
            _ => Err(ContainerError::new(ContainerErrorKind::Magic)),
        }?;

        let version = window
            .read_u32()
            .map_err(ContainerError::factory(ContainerErrorKind::Header))?;

        if version != 1 {
            return Err(ContainerError::new(
                ContainerErrorKind::UnsupportedVersion { version },
            ));
        }

        let mut fields = [0; 5];
        for field in &mut fields {
            *field = window
                .read_u32()
                .map_err(ContainerError::factory(ContainerErrorKind::Header))?;
        }
        let [sound_count, table_size, name_table_size, data_size, codec] = fields;

        let mut extra = [0; HEADER_EXTRA_SIZE];
        window
            .read_exact(&mut extra)
            .map_err(ContainerError::factory(ContainerErrorKind::Header))?;

        Ok(Self {
            version,
            sound_count,
            table_size,
            name_table_size,
            data_size,
            codec,
            extra,
        })
    }

    /// Returns the codec, if the codec field holds a known value.
    #[must_use]
    pub fn codec(&self) -> Option<Codec> {
        Codec::from_raw(self.codec)
    }

    /// Returns the offset of the name table relative to the start of the container.
    #[must_use]
    pub fn name_table_offset(&self) -> u64 {
        HEADER_SIZE + u64::from(self.table_size)
    }

    /// Returns the offset of the data section relative to the start of the container.
    #[must_use]
    pub fn data_part_offset(&self) -> u64 {
        self.name_table_offset() + u64::from(self.name_table_size)
    }
}

impl Display for Fsb5Header {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let codec = self
            .codec()
            .map_or_else(|| format!("unknown (0x{:x})", self.codec), |c| c.to_string());

        f.write_str(&format!(
            "version={}, sounds={}, table_size={}, name_table_size={}, data_size={}, codec={codec}",
            self.version, self.sound_count, self.table_size, self.name_table_size, self.data_size
        ))
    }
}

/// Finds the offset of the first FSB5 container inside a bank file.
///
/// Candidates are checked every 32 bytes from the start, then the last four bytes of the window.
///
/// # Errors
///
/// Returns an error if no candidate holds the "FSB5" signature or the window cannot be read.
pub fn find_fsb5_magic(window: &mut ByteWindow) -> Result<u64, ContainerError> {
    let magic = u32::from_le_bytes(FSB5_MAGIC);
    let len = window
        .len()
        .map_err(ContainerError::factory(ContainerErrorKind::BankMagicNotFound))?;

    let Some(last) = len.checked_sub(4) else {
        return Err(ContainerError::new(ContainerErrorKind::BankMagicNotFound));
    };

    let mut found = |position: u64| -> Result<bool, ContainerError> {
        let error = ContainerErrorKind::BankMagicNotFound;
        window.seek(position).map_err(ContainerError::factory(error))?;
        let word = window.read_u32().map_err(ContainerError::factory(error))?;

        Ok(word == magic)
    };

    let mut position = 0;
    while position <= last {
        if found(position)? {
            trace!("found container signature at offset {position}");
            return Ok(position);
        }
        position += BANK_SCAN_STEP;
    }

    if found(last)? {
        return Ok(last);
    }

    Err(ContainerError::new(ContainerErrorKind::BankMagicNotFound))
}

struct SoundRecord {
    mode: SampleMode,
    chunks: Vec<Chunk>,
}

/// Parsed FSB5 container. Sound data is read on demand.
#[derive(Debug)]
pub struct Fsb5Reader {
    window: Rc<ByteWindow>,
    header: Fsb5Header,
    sounds: Box<[SoundFromFsb]>,
    names: HashMap<Box<str>, usize>,
}

impl Fsb5Reader {
    /// Opens a container file. Files with a `.bank` extension are searched for the embedded container.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or is not a valid container.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ContainerError> {
        let path = path.as_ref();
        let is_bank = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("bank"));

        let window = ByteWindow::open(path, Access::ReadOnly)
            .map_err(ContainerError::factory(ContainerErrorKind::Open))?;

        Self::from_window(window, is_bank)
    }

    /// Parses a container held by `window`. If `is_bank` is true, the container is searched for first.
    ///
    /// # Errors
    ///
    /// Returns an error if the window does not hold a valid container.
    pub fn from_window(mut window: ByteWindow, is_bank: bool) -> Result<Self, ContainerError> {
        if is_bank {
            let start = find_fsb5_magic(&mut window)?;
            let len = window
                .len()
                .map_err(ContainerError::factory(ContainerErrorKind::Header))?;

            debug!("bank holds a container at offset {start}");
            window = window
                .slice(start, len - start, true)
                .map_err(ContainerError::factory(ContainerErrorKind::Header))?;
        }

        window
            .seek(0)
            .map_err(ContainerError::factory(ContainerErrorKind::Header))?;
        let header = Fsb5Header::parse(&mut window)?;
        debug!("parsed container header: {header}");

        let records = read_sound_table(&mut window, &header)?;
        let mut names = read_names(&mut window, &header)?;
        let sizes = data_sizes(&window, &header, &records)?;

        let window = Rc::new(window);
        let data_part = header.data_part_offset();

        let sounds: Box<[SoundFromFsb]> = records
            .into_iter()
            .zip(sizes)
            .zip(0..)
            .map(|((record, data_size), index)| SoundFromFsb {
                index,
                mode: record.mode,
                chunks: record.chunks.into_boxed_slice(),
                name: names.get_mut(index as usize).and_then(Option::take),
                data_start: data_part + record.mode.data_offset(),
                data_size,
                window: Rc::clone(&window),
            })
            .collect();

        let mut name_lookup = HashMap::new();
        for (index, sound) in sounds.iter().enumerate() {
            trace!("{sound}");

            if let Some(name) = sound.name.as_deref() {
                let _ = name_lookup.entry(name.into()).or_insert(index);
            }
        }

        Ok(Self {
            window,
            header,
            sounds,
            names: name_lookup,
        })
    }

    /// Returns the container header.
    #[must_use]
    pub fn header(&self) -> &Fsb5Header {
        &self.header
    }

    /// Returns the number of sounds.
    #[must_use]
    pub fn sound_count(&self) -> usize {
        self.sounds.len()
    }

    /// Returns whether the container carries a name table.
    #[must_use]
    pub fn has_names(&self) -> bool {
        self.header.name_table_size != 0
    }

    /// Returns every sound, in table order.
    #[must_use]
    pub fn sounds(&self) -> &[SoundFromFsb] {
        &self.sounds
    }

    /// Returns the sound at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is past the last sound.
    pub fn sound(&self, index: usize) -> Result<&SoundFromFsb, ContainerError> {
        self.sounds.get(index).ok_or_else(|| {
            ContainerError::new(ContainerErrorKind::SoundIndex {
                index,
                count: self.sounds.len(),
            })
        })
    }

    /// Returns the first sound named `name`, in table order. Later sounds sharing the name are only
    /// reachable by index.
    ///
    /// # Errors
    ///
    /// Returns an error if no sound has that name.
    pub fn sound_by_name(&self, name: &str) -> Result<&SoundFromFsb, ContainerError> {
        self.names
            .get(name)
            .map(|&index| &self.sounds[index])
            .ok_or_else(|| ContainerError::new(ContainerErrorKind::SoundNotFound))
    }

    /// Returns the window holding the container.
    #[must_use]
    pub fn window(&self) -> &ByteWindow {
        &self.window
    }

    /// Releases the container. Sounds still referring to it keep it open.
    pub fn close(self) {
        trace!("closed container with {} sounds", self.sounds.len());
    }
}

fn read_sound_table(
    window: &mut ByteWindow,
    header: &Fsb5Header,
) -> Result<Vec<SoundRecord>, ContainerError> {
    // every sound takes at least its mode word
    let min_size = u64::from(header.sound_count) * 8;
    if min_size > u64::from(header.table_size) {
        return Err(ContainerError::new(ContainerErrorKind::TableSize {
            expected: header.table_size,
            actual: min_size,
        }));
    }

    let remaining = window
        .len()
        .map_or(0, |len| len.saturating_sub(window.position()));
    let capacity = u64::from(header.sound_count).min(remaining / 8);
    let mut records = Vec::with_capacity(capacity as usize);

    for index in 0..header.sound_count {
        let mode = window
            .read_u64()
            .map_err(ContainerError::factory(ContainerErrorKind::SampleMode { index }))?
            .pipe(SampleMode::from_raw);

        let mut chunks = Vec::new();
        if mode.has_chunks() {
            for chunk in 0.. {
                let chunk = Chunk::parse(window, index, chunk)?;
                let last = chunk.mode().is_last();
                chunks.push(chunk);

                if last {
                    break;
                }
            }
        }

        records.push(SoundRecord { mode, chunks });
    }

    let actual = window.position() - HEADER_SIZE;
    if actual > u64::from(header.table_size) {
        return Err(ContainerError::new(ContainerErrorKind::TableSize {
            expected: header.table_size,
            actual,
        }));
    }

    Ok(records)
}

// the name table starts with one offset per sound, relative to the table, each pointing at a C string
fn read_names(
    window: &mut ByteWindow,
    header: &Fsb5Header,
) -> Result<Vec<Option<Box<str>>>, ContainerError> {
    let count = header.sound_count as usize;
    if header.name_table_size == 0 {
        return Ok(vec![None; count]);
    }

    let start = header.name_table_offset();
    window
        .seek(start)
        .map_err(ContainerError::factory(ContainerErrorKind::NameTable { index: 0 }))?;

    let mut offsets = Vec::with_capacity(count);
    for index in 0..header.sound_count {
        offsets.push(
            window
                .read_u32()
                .map_err(ContainerError::factory(ContainerErrorKind::NameTable { index }))?,
        );
    }

    let mut names = Vec::with_capacity(count);
    for (offset, index) in offsets.into_iter().zip(0..) {
        let error = ContainerErrorKind::NameTable { index };
        window
            .seek(start + u64::from(offset))
            .map_err(ContainerError::factory(error))?;
        let name = window
            .read_cstring()
            .map_err(ContainerError::factory(error))?;

        names.push(Some(name.into_boxed_str()));
    }

    Ok(names)
}

// a sound's data runs up to the next sound's data, and the last one up to the end of the window
fn data_sizes(
    window: &ByteWindow,
    header: &Fsb5Header,
    records: &[SoundRecord],
) -> Result<Vec<u64>, ContainerError> {
    let len = window
        .len()
        .map_err(ContainerError::factory(ContainerErrorKind::Header))?;
    let end = len.saturating_sub(header.data_part_offset());

    let mut sizes = Vec::with_capacity(records.len());
    for (index, record) in (0..).zip(records) {
        let next = records
            .get(index as usize + 1)
            .map_or(end, |next| next.mode.data_offset().min(end));

        let size = next
            .checked_sub(record.mode.data_offset())
            .ok_or_else(|| ContainerError::new(ContainerErrorKind::DataOffset { index }))?;
        sizes.push(size);
    }

    Ok(sizes)
}
