use super::{
    codec::Codec,
    error::{ContainerError, ContainerErrorKind},
    mode::DATA_ALIGNMENT,
    reader::{Fsb5Reader, FSB5_MAGIC, HEADER_EXTRA_SIZE, HEADER_SIZE},
    sound::Sound,
};
use crate::window::ByteWindow;
use std::path::Path;
use tracing::{debug, trace};

// offsets of the size fields patched once the container is laid out
const TABLE_SIZE_OFFSET: u64 = 12;
const DATA_SIZE_OFFSET: u64 = 20;

/// Header fields written by [`Fsb5Builder`] that are not derived from its sounds.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BuilderOptions {
    /// Format version.
    pub version: u32,
    /// Codec field.
    pub codec: u32,
    /// Opaque trailing header bytes.
    pub header_extra: [u8; HEADER_EXTRA_SIZE],
}

impl Default for BuilderOptions {
    fn default() -> Self {
        let mut header_extra = [0; HEADER_EXTRA_SIZE];
        header_extra[0] = 1;

        Self {
            version: 1,
            codec: Codec::Vorbis.raw(),
            header_extra,
        }
    }
}

fn padding(offset: u64) -> u64 {
    (DATA_ALIGNMENT - offset % DATA_ALIGNMENT) % DATA_ALIGNMENT
}

/// Lays out a new FSB5 container from a list of sounds.
///
/// Built containers carry no name table. Every sound's data starts on a 32-byte boundary.
#[derive(Debug, Default)]
pub struct Fsb5Builder {
    options: BuilderOptions,
    sounds: Vec<Box<dyn Sound>>,
}

impl Fsb5Builder {
    /// Creates a builder without sounds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder holding every sound of `reader`, with the version, codec and trailing header
    /// bytes of its header.
    #[must_use]
    pub fn from_reader(reader: &Fsb5Reader) -> Self {
        let header = reader.header();
        let mut builder = Self {
            options: BuilderOptions {
                version: header.version,
                codec: header.codec,
                header_extra: header.extra,
            },
            sounds: Vec::with_capacity(reader.sound_count()),
        };

        for sound in reader.sounds() {
            builder.add_sound(sound.clone());
        }

        builder
    }

    /// Returns the header options.
    #[must_use]
    pub fn options(&self) -> &BuilderOptions {
        &self.options
    }

    /// Returns the header options for modification.
    pub fn options_mut(&mut self) -> &mut BuilderOptions {
        &mut self.options
    }

    /// Returns the number of sounds.
    #[must_use]
    pub fn sound_count(&self) -> usize {
        self.sounds.len()
    }

    /// Returns the sound at `index`, if present.
    #[must_use]
    pub fn sound(&self, index: usize) -> Option<&dyn Sound> {
        self.sounds.get(index).map(AsRef::as_ref)
    }

    /// Appends a sound.
    pub fn add_sound<S: Sound + 'static>(&mut self, sound: S) {
        self.sounds.push(Box::new(sound));
    }

    /// Replaces the sound at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is past the last sound.
    pub fn set_sound<S: Sound + 'static>(
        &mut self,
        index: usize,
        sound: S,
    ) -> Result<(), ContainerError> {
        let count = self.sounds.len();
        let slot = self.sounds.get_mut(index).ok_or_else(|| {
            ContainerError::new(ContainerErrorKind::SoundIndex { index, count })
        })?;

        *slot = Box::new(sound);
        Ok(())
    }

    /// Writes the container at the cursor of `dest`, leaving the cursor at its end.
    ///
    /// # Errors
    ///
    /// Returns an error if a sound does not fit into the format or if `dest` cannot be written.
    pub fn build_to(&self, dest: &mut ByteWindow) -> Result<(), ContainerError> {
        let base = dest.position();
        let sound_count = u32::try_from(self.sounds.len()).map_err(|_| {
            ContainerError::new(ContainerErrorKind::TooLarge {
                field: "sound_count",
                value: self.sounds.len() as u64,
            })
        })?;

        let write_error = || ContainerError::factory(ContainerErrorKind::Write);

        dest.write_all(&FSB5_MAGIC).map_err(write_error())?;
        for field in [self.options.version, sound_count, 0, 0, 0, self.options.codec] {
            dest.write_u32(field).map_err(write_error())?;
        }
        dest.write_all(&self.options.header_extra)
            .map_err(write_error())?;

        // sound table
        let mut data_offset = 0;
        for sound in &self.sounds {
            let chunks = sound.chunks();
            let mode = sound
                .sample_mode()
                .with_data_offset(data_offset)?
                .with_has_chunks(!chunks.is_empty());

            dest.write_u64(mode.raw()).map_err(write_error())?;
            for (i, chunk) in chunks.iter().enumerate() {
                chunk.write(dest, i + 1 == chunks.len())?;
            }

            data_offset += sound.data_size();
            data_offset += padding(data_offset);
        }

        let table_size = size_field("table_size", dest.position() - base - HEADER_SIZE)?;
        trace!("wrote sound table of {table_size} bytes");

        // data section
        let data_start = dest.position();
        for (index, sound) in self.sounds.iter().enumerate() {
            sound
                .write_data(dest)
                .map_err(ContainerError::factory(ContainerErrorKind::SoundData { index }))?;

            let written = dest.position() - data_start;
            dest.write_zeros(padding(written) as usize)
                .map_err(write_error())?;
        }

        let end = dest.position();
        let data_size = size_field("data_size", end - data_start)?;

        for (offset, value) in [(TABLE_SIZE_OFFSET, table_size), (DATA_SIZE_OFFSET, data_size)] {
            dest.seek(base + offset).map_err(write_error())?;
            dest.write_u32(value).map_err(write_error())?;
        }
        dest.seek(end).map_err(write_error())?;

        debug!(
            "built container with {sound_count} sounds ({} bytes) at offset {base}",
            end - base
        );
        Ok(())
    }

    /// Writes the container to a new file at `path`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or the container cannot be built.
    pub fn build_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), ContainerError> {
        let mut dest = ByteWindow::create(path)
            .map_err(ContainerError::factory(ContainerErrorKind::Write))?;

        self.build_to(&mut dest)?;
        dest.close();
        Ok(())
    }
}

fn size_field(field: &'static str, value: u64) -> Result<u32, ContainerError> {
    u32::try_from(value)
        .map_err(|_| ContainerError::new(ContainerErrorKind::TooLarge { field, value }))
}

#[cfg(test)]
mod test {
    use super::{padding, BuilderOptions, Fsb5Builder};
    use crate::{
        buny::{fixture, BunyArchive},
        error::ErrorCategory,
        fsb5::{
            find_fsb5_magic, Chunk, Codec, ContainerErrorKind, Fsb5Reader, OwnedSound,
            SampleMode, Sound,
        },
        window::{Access, ByteWindow},
    };

    fn mode(rate: u32, channels: u8, samples: u32) -> SampleMode {
        SampleMode::default()
            .with_sample_rate(rate)
            .unwrap()
            .with_channels(channels)
            .unwrap()
            .with_sample_count(samples)
            .unwrap()
    }

    fn sample_builder() -> Fsb5Builder {
        let mut builder = Fsb5Builder::new();
        builder.add_sound(
            OwnedSound::new(mode(44100, 2, 88200), vec![0xaa; 45].into_boxed_slice())
                .with_chunk(Chunk::loop_info(0, 88199)),
        );
        builder.add_sound(OwnedSound::new(
            mode(22050, 1, 500),
            vec![0xbb; 64].into_boxed_slice(),
        ));
        builder.add_sound(
            OwnedSound::new(mode(48000, 6, 1), vec![0xcc; 3].into_boxed_slice())
                .with_chunk(Chunk::extra_data(vec![1, 2, 3, 4, 5].into_boxed_slice()))
                .with_chunk(Chunk::loop_info(1, 1)),
        );
        builder
    }

    fn build(builder: &Fsb5Builder) -> ByteWindow {
        let mut window = ByteWindow::from_vec(Vec::new(), Access::ReadWrite);
        builder.build_to(&mut window).unwrap();
        window
    }

    #[test]
    fn padding_to_alignment() {
        assert_eq!(padding(0), 0);
        assert_eq!(padding(1), 31);
        assert_eq!(padding(31), 1);
        assert_eq!(padding(32), 0);
        assert_eq!(padding(45), 19);
    }

    #[test]
    fn default_options() {
        let options = BuilderOptions::default();
        assert_eq!(options.version, 1);
        assert_eq!(options.codec, 0x0f);
        assert_eq!(options.header_extra[0], 1);
        assert!(options.header_extra[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn build_then_read() {
        let window = build(&sample_builder());
        let reader = Fsb5Reader::from_window(window, false).unwrap();

        let header = reader.header();
        assert_eq!(header.version, 1);
        assert_eq!(header.sound_count, 3);
        assert_eq!(header.name_table_size, 0);
        assert_eq!(header.codec(), Some(Codec::Vorbis));
        assert_eq!(header.data_size, 64 + 64 + 3 + 29);
        assert!(!reader.has_names());

        let sounds = reader.sounds();
        let offsets: Vec<u64> = sounds.iter().map(|s| s.sample_mode().data_offset()).collect();
        assert_eq!(offsets, [0, 64, 128]);
        assert!(offsets.iter().all(|offset| offset % 32 == 0));

        // the last sound runs to the end of the container, padding included
        let sizes: Vec<u64> = sounds.iter().map(Sound::data_size).collect();
        assert_eq!(sizes, [64, 64, 32]);

        assert_eq!(sounds[0].sample_rate(), Some(44100));
        assert_eq!(sounds[0].channels(), 2);
        assert_eq!(sounds[0].loop_range(), Some((0, 88199)));
        assert_eq!(sounds[1].chunks(), []);
        assert!(!sounds[1].sample_mode().has_chunks());
        assert_eq!(sounds[2].channels(), 6);
        assert_eq!(sounds[2].chunks().len(), 2);
        assert!(!sounds[2].chunks()[0].mode().is_last());
        assert!(sounds[2].chunks()[1].mode().is_last());

        assert_eq!(&sounds[0].data().unwrap()[..45], [0xaa; 45]);
        assert_eq!(&sounds[0].data().unwrap()[45..], [0; 19]);
        assert_eq!(sounds[1].data().unwrap(), [0xbb; 64]);
        assert_eq!(&sounds[2].data().unwrap()[..3], [0xcc; 3]);
    }

    #[test]
    fn rebuild_is_identical() {
        let first = build(&sample_builder());
        let len = first.len().unwrap();
        let reader = Fsb5Reader::from_window(first, false).unwrap();

        let mut second = build(&Fsb5Builder::from_reader(&reader));
        assert_eq!(second.len().unwrap(), len);

        let mut first = reader.window().slice(0, len, false).unwrap();
        second.seek(0).unwrap();
        assert_eq!(
            first.read_vec(len as usize).unwrap(),
            second.read_vec(len as usize).unwrap()
        );
    }

    #[test]
    fn replace_sound() {
        let reader = Fsb5Reader::from_window(build(&sample_builder()), false).unwrap();
        let mut builder = Fsb5Builder::from_reader(&reader);

        let replacement = OwnedSound::copy_of(reader.sound(1).unwrap())
            .unwrap()
            .with_data(vec![0xdd; 100].into_boxed_slice());
        builder.set_sound(1, replacement).unwrap();

        assert!(builder
            .set_sound(3, OwnedSound::new(SampleMode::default(), Box::default()))
            .is_err_and(|e| e.kind() == ContainerErrorKind::SoundIndex { index: 3, count: 3 }
                && e.category() == ErrorCategory::Bounds));

        let rebuilt = Fsb5Reader::from_window(build(&builder), false).unwrap();
        let offsets: Vec<u64> = rebuilt
            .sounds()
            .iter()
            .map(|s| s.sample_mode().data_offset())
            .collect();
        assert_eq!(offsets, [0, 64, 192]);
        assert_eq!(&rebuilt.sound(1).unwrap().data().unwrap()[..100], [0xdd; 100]);
        assert_eq!(rebuilt.sound(2).unwrap().loop_range(), Some((1, 1)));
    }

    #[test]
    fn build_at_cursor() {
        let mut window = ByteWindow::from_vec(vec![0xee; 7], Access::ReadWrite);
        window.seek(7).unwrap();
        sample_builder().build_to(&mut window).unwrap();

        let end = window.position();
        assert_eq!(end, window.len().unwrap());

        let container = window.slice(7, end - 7, false).unwrap();
        let reader = Fsb5Reader::from_window(container, false).unwrap();
        assert_eq!(reader.sound_count(), 3);
    }

    #[test]
    fn bank_scan() {
        for prefix in [0, 1, 40, 95, 96] {
            let mut bytes = vec![0x11; prefix];
            bytes.resize(prefix.next_multiple_of(32), 0);
            let start = bytes.len() as u64;

            let mut container = build(&sample_builder());
            let len = container.len().unwrap();
            container.seek(0).unwrap();
            bytes.extend(container.read_vec(len as usize).unwrap());

            let mut window = ByteWindow::from_vec(bytes, Access::ReadOnly);
            assert_eq!(find_fsb5_magic(&mut window).unwrap(), start);

            let reader = Fsb5Reader::from_window(window, true).unwrap();
            assert_eq!(reader.sound_count(), 3);
            assert_eq!(reader.sound(1).unwrap().data().unwrap(), [0xbb; 64]);
        }
    }

    #[test]
    fn bank_scan_checks_last_word() {
        let mut bytes = vec![0; 37];
        bytes.extend(b"FSB5");

        let mut window = ByteWindow::from_vec(bytes, Access::ReadOnly);
        assert_eq!(find_fsb5_magic(&mut window).unwrap(), 37);
    }

    #[test]
    fn bank_without_container() {
        let mut window = ByteWindow::from_vec(vec![0; 100], Access::ReadOnly);
        assert!(find_fsb5_magic(&mut window).is_err_and(|e| e.kind()
            == ContainerErrorKind::BankMagicNotFound
            && e.category() == ErrorCategory::NotFound));

        let mut window = ByteWindow::from_vec(vec![0; 3], Access::ReadOnly);
        assert!(find_fsb5_magic(&mut window).is_err());
    }

    #[test]
    fn build_into_archive() {
        let bytes = fixture::build(&[fixture::raw("sound/music.bank", b"old bank")]);
        let mut archive =
            BunyArchive::from_window(ByteWindow::from_vec(bytes, Access::ReadWrite)).unwrap();
        let builder = sample_builder();

        let written = archive
            .append_with(0, |window| builder.build_to(window).map_err(crate::Error::from))
            .unwrap();

        let mut extracted = ByteWindow::from_vec(Vec::new(), Access::ReadWrite);
        assert_eq!(archive.extract(0, &mut extracted).unwrap(), written);

        let reader = Fsb5Reader::from_window(extracted, true).unwrap();
        assert_eq!(reader.sound_count(), 3);
        assert_eq!(reader.sound(2).unwrap().channels(), 6);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sfx.bank");
        sample_builder().build_to_path(&path).unwrap();

        let reader = Fsb5Reader::open(&path).unwrap();
        assert_eq!(reader.sound_count(), 3);
        assert_eq!(reader.sound(0).unwrap().loop_range(), Some((0, 88199)));
    }
}
