use super::{chunk::Chunk, mode::SampleMode};
use crate::window::{Access, ByteWindow, WindowError};
use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    rc::Rc,
};

/// A sound that can be placed into an FSB5 container.
///
/// The data offset and chunk flag of [`Sound::sample_mode`] are recomputed when a container is built.
pub trait Sound: Debug {
    /// Returns the sample mode word of this sound.
    fn sample_mode(&self) -> SampleMode;

    /// Returns the chunks attached to this sound.
    fn chunks(&self) -> &[Chunk];

    /// Returns the size of the encoded data, in bytes.
    fn data_size(&self) -> u64;

    /// Returns the name of this sound, if it has one.
    fn name(&self) -> Option<&str>;

    /// Writes exactly [`Sound::data_size`] bytes of encoded data at the cursor of `dest`, advancing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be read or `dest` cannot be written.
    fn write_data(&self, dest: &mut ByteWindow) -> Result<(), WindowError>;

    /// Returns the number of samples.
    fn sample_count(&self) -> u32 {
        self.sample_mode().sample_count()
    }

    /// Returns the sample rate in Hz, if the rate index is known.
    fn sample_rate(&self) -> Option<u32> {
        self.sample_mode().sample_rate()
    }

    /// Returns the number of channels.
    fn channels(&self) -> u8 {
        self.sample_mode().channels()
    }

    /// Returns the playback length in seconds, if the sample rate is known.
    fn duration(&self) -> Option<f64> {
        self.sample_rate()
            .map(|hz| f64::from(self.sample_count()) / f64::from(hz))
    }

    /// Returns the first and last sample of the first loop info chunk.
    fn loop_range(&self) -> Option<(u32, u32)> {
        self.chunks().iter().find_map(|chunk| match chunk {
            Chunk::LoopInfo { start, end, .. } => Some((*start, *end)),
            _ => None,
        })
    }
}

fn describe<S: Sound + ?Sized>(sound: &S, f: &mut Formatter<'_>) -> FmtResult {
    f.write_str(&format!(
        "{}: {{sample_count={}, data_offset={}, data_size={}, channels={}, sample_rate={}, duration={:.2}s}}",
        sound.name().unwrap_or("-"),
        sound.sample_count(),
        sound.sample_mode().data_offset(),
        sound.data_size(),
        sound.channels(),
        sound.sample_rate().unwrap_or_default(),
        sound.duration().unwrap_or_default(),
    ))
}

/// A sound read from an existing container. Its data stays in the container until it is copied.
#[derive(Clone, Debug)]
pub struct SoundFromFsb {
    pub(crate) index: u32,
    pub(crate) mode: SampleMode,
    pub(crate) chunks: Box<[Chunk]>,
    pub(crate) name: Option<Box<str>>,
    pub(crate) data_start: u64,
    pub(crate) data_size: u64,
    pub(crate) window: Rc<ByteWindow>,
}

impl SoundFromFsb {
    /// Returns the index of this sound in its container.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Returns the offset of the data relative to the start of the container.
    #[must_use]
    pub fn data_start(&self) -> u64 {
        self.data_start
    }

    /// Reads the encoded data of this sound.
    ///
    /// # Errors
    ///
    /// Returns an error if the container has been closed or cannot be read.
    pub fn data(&self) -> Result<Vec<u8>, WindowError> {
        let mut data = self.window.slice(self.data_start, self.data_size, false)?;
        data.read_vec(self.data_size as usize)
    }
}

impl Sound for SoundFromFsb {
    fn sample_mode(&self) -> SampleMode {
        self.mode
    }

    fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    fn data_size(&self) -> u64 {
        self.data_size
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn write_data(&self, dest: &mut ByteWindow) -> Result<(), WindowError> {
        self.window.transfer_to(dest, self.data_start, self.data_size)?;
        dest.skip(self.data_size)
    }
}

impl Display for SoundFromFsb {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&format!("[{}] ", self.index))?;
        describe(self, f)
    }
}

/// A sound whose data is held in memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnedSound {
    mode: SampleMode,
    chunks: Vec<Chunk>,
    data: Box<[u8]>,
    name: Option<Box<str>>,
}

impl OwnedSound {
    /// Creates an unnamed sound without chunks.
    #[must_use]
    pub fn new(mode: SampleMode, data: Box<[u8]>) -> Self {
        Self {
            mode,
            chunks: Vec::new(),
            data,
            name: None,
        }
    }

    /// Copies the metadata and data of another sound.
    ///
    /// # Errors
    ///
    /// Returns an error if the data of `sound` cannot be read.
    pub fn copy_of<S: Sound + ?Sized>(sound: &S) -> Result<Self, WindowError> {
        let mut buffer = ByteWindow::from_vec(Vec::new(), Access::ReadWrite);
        sound.write_data(&mut buffer)?;
        buffer.seek(0)?;

        Ok(Self {
            mode: sound.sample_mode(),
            chunks: sound.chunks().to_vec(),
            data: buffer.read_vec(sound.data_size() as usize)?.into_boxed_slice(),
            name: sound.name().map(Into::into),
        })
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Appends a chunk.
    #[must_use]
    pub fn with_chunk(mut self, chunk: Chunk) -> Self {
        self.chunks.push(chunk);
        self
    }

    /// Replaces the sample mode word.
    #[must_use]
    pub fn with_sample_mode(mut self, mode: SampleMode) -> Self {
        self.mode = mode;
        self
    }

    /// Replaces the encoded data.
    #[must_use]
    pub fn with_data(mut self, data: Box<[u8]>) -> Self {
        self.data = data;
        self
    }

    /// Returns the encoded data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Sound for OwnedSound {
    fn sample_mode(&self) -> SampleMode {
        self.mode
    }

    fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    fn data_size(&self) -> u64 {
        self.data.len() as u64
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn write_data(&self, dest: &mut ByteWindow) -> Result<(), WindowError> {
        dest.write_all(&self.data)
    }
}

impl Display for OwnedSound {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        describe(self, f)
    }
}

#[cfg(test)]
mod test {
    use super::{OwnedSound, Sound};
    use crate::fsb5::{Chunk, SampleMode};

    fn sample() -> OwnedSound {
        let mode = SampleMode::default()
            .with_sample_rate(8000)
            .unwrap()
            .with_channels(2)
            .unwrap()
            .with_sample_count(12000)
            .unwrap();

        OwnedSound::new(mode, vec![1; 40].into_boxed_slice()).with_name("hit")
    }

    #[test]
    fn derived_properties() {
        let sound = sample().with_chunk(Chunk::loop_info(5, 11999));

        assert_eq!(sound.sample_rate(), Some(8000));
        assert_eq!(sound.channels(), 2);
        assert_eq!(sound.duration(), Some(1.5));
        assert_eq!(sound.loop_range(), Some((5, 11999)));
        assert_eq!(sound.data_size(), 40);
    }

    #[test]
    fn display() {
        assert_eq!(
            sample().to_string(),
            "hit: {sample_count=12000, data_offset=0, data_size=40, channels=2, sample_rate=8000, duration=1.50s}"
        );
    }

    #[test]
    fn copy_of_owned() {
        let sound = sample().with_chunk(Chunk::extra_data(vec![9; 3].into_boxed_slice()));
        assert_eq!(OwnedSound::copy_of(&sound).unwrap(), sound);
    }
}
