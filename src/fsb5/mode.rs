use super::error::{ContainerError, ContainerErrorKind};
use bilge::prelude::*;
use phf::phf_map;
use std::fmt::{Debug, Formatter, Result as FmtResult};

/// Sample rates, in Hz, addressed by the rate index of a [`SampleMode`].
pub const SAMPLE_RATES: [u32; 11] = [
    4000, 8000, 11000, 11025, 16000, 22050, 24000, 32000, 44100, 48000, 96000,
];

/// Channel counts addressed by the channel index of a [`SampleMode`].
pub const CHANNEL_COUNTS: [u8; 4] = [1, 2, 6, 8];

static SAMPLE_RATE_INDICES: phf::Map<u32, u8> = phf_map! {
    4000_u32 => 0,
    8000_u32 => 1,
    11000_u32 => 2,
    11025_u32 => 3,
    16000_u32 => 4,
    22050_u32 => 5,
    24000_u32 => 6,
    32000_u32 => 7,
    44100_u32 => 8,
    48000_u32 => 9,
    96000_u32 => 10,
};

static CHANNEL_INDICES: phf::Map<u8, u8> = phf_map! {
    1_u8 => 0,
    2_u8 => 1,
    6_u8 => 2,
    8_u8 => 3,
};

// data offsets are stored in units of this many bytes
pub(crate) const DATA_ALIGNMENT: u64 = 32;

#[bitsize(64)]
#[derive(FromBits)]
struct RawSampleMode {
    has_chunks: bool,
    sample_rate: u4,
    channels: u2,
    data_offset: u27,
    num_samples: u30,
}

#[bitsize(32)]
#[derive(FromBits)]
struct RawChunkMode {
    more_chunks: bool,
    size: u24,
    kind: u7,
}

fn check_width(field: &'static str, value: u64, bits: u32) -> Result<(), ContainerError> {
    if value >> bits == 0 {
        Ok(())
    } else {
        Err(ContainerError::new(ContainerErrorKind::FieldOutOfRange {
            field,
            value,
        }))
    }
}

/// Packed 64-bit word describing one sound in an FSB5 container.
///
/// Setters return a modified copy and reject values that do not fit their field.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SampleMode(u64);

impl SampleMode {
    /// Wraps a raw sample mode word.
    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw sample mode word.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }

    fn unpack(self) -> RawSampleMode {
        RawSampleMode::from(self.0)
    }

    fn update(self, f: impl FnOnce(&mut RawSampleMode)) -> Self {
        let mut raw = self.unpack();
        f(&mut raw);
        Self(raw.into())
    }

    /// Returns whether chunks follow this word in the sound table.
    #[must_use]
    pub fn has_chunks(self) -> bool {
        self.unpack().has_chunks()
    }

    /// Sets whether chunks follow this word in the sound table.
    #[must_use]
    pub fn with_has_chunks(self, has_chunks: bool) -> Self {
        self.update(|raw| raw.set_has_chunks(has_chunks))
    }

    /// Returns the 4-bit sample rate index.
    #[must_use]
    pub fn sample_rate_index(self) -> u8 {
        self.unpack().sample_rate().value()
    }

    /// Sets the 4-bit sample rate index.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` does not fit into 4 bits.
    pub fn with_sample_rate_index(self, index: u8) -> Result<Self, ContainerError> {
        check_width("sample_rate", index.into(), 4)?;
        Ok(self.update(|raw| raw.set_sample_rate(u4::new(index))))
    }

    /// Returns the sample rate in Hz, or `None` if the index does not address a known rate.
    #[must_use]
    pub fn sample_rate(self) -> Option<u32> {
        SAMPLE_RATES
            .get(usize::from(self.sample_rate_index()))
            .copied()
    }

    /// Sets the sample rate from a value in Hz.
    ///
    /// # Errors
    ///
    /// Returns an error if `hz` is not one of [`SAMPLE_RATES`].
    pub fn with_sample_rate(self, hz: u32) -> Result<Self, ContainerError> {
        match SAMPLE_RATE_INDICES.get(&hz) {
            Some(&index) => self.with_sample_rate_index(index),
            None => Err(ContainerError::new(ContainerErrorKind::FieldOutOfRange {
                field: "sample_rate",
                value: hz.into(),
            })),
        }
    }

    /// Returns the 2-bit channel count index.
    #[must_use]
    pub fn channels_index(self) -> u8 {
        self.unpack().channels().value()
    }

    /// Sets the 2-bit channel count index.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` does not fit into 2 bits.
    pub fn with_channels_index(self, index: u8) -> Result<Self, ContainerError> {
        check_width("channels", index.into(), 2)?;
        Ok(self.update(|raw| raw.set_channels(u2::new(index))))
    }

    /// Returns the number of channels.
    #[must_use]
    pub fn channels(self) -> u8 {
        CHANNEL_COUNTS[usize::from(self.channels_index())]
    }

    /// Sets the number of channels.
    ///
    /// # Errors
    ///
    /// Returns an error if `count` is not one of [`CHANNEL_COUNTS`].
    pub fn with_channels(self, count: u8) -> Result<Self, ContainerError> {
        match CHANNEL_INDICES.get(&count) {
            Some(&index) => self.with_channels_index(index),
            None => Err(ContainerError::new(ContainerErrorKind::FieldOutOfRange {
                field: "channels",
                value: count.into(),
            })),
        }
    }

    /// Returns the data offset in its stored unit of 32 bytes.
    #[must_use]
    pub fn data_offset_units(self) -> u32 {
        self.unpack().data_offset().value()
    }

    /// Returns the offset of the sound's data relative to the data section, in bytes.
    #[must_use]
    pub fn data_offset(self) -> u64 {
        u64::from(self.data_offset_units()) * DATA_ALIGNMENT
    }

    /// Sets the offset of the sound's data relative to the data section, in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `offset` is not a multiple of 32 or does not fit into the 27-bit field.
    pub fn with_data_offset(self, offset: u64) -> Result<Self, ContainerError> {
        let units = Some(offset)
            .filter(|offset| offset % DATA_ALIGNMENT == 0)
            .and_then(|offset| u32::try_from(offset / DATA_ALIGNMENT).ok())
            .filter(|units| units >> 27 == 0)
            .ok_or_else(|| {
                ContainerError::new(ContainerErrorKind::FieldOutOfRange {
                    field: "data_offset",
                    value: offset,
                })
            })?;

        Ok(self.update(|raw| raw.set_data_offset(u27::new(units))))
    }

    /// Returns the number of samples.
    #[must_use]
    pub fn sample_count(self) -> u32 {
        self.unpack().num_samples().value()
    }

    /// Sets the number of samples.
    ///
    /// # Errors
    ///
    /// Returns an error if `count` does not fit into 30 bits.
    pub fn with_sample_count(self, count: u32) -> Result<Self, ContainerError> {
        check_width("sample_count", count.into(), 30)?;
        Ok(self.update(|raw| raw.set_num_samples(u30::new(count))))
    }
}

impl Debug for SampleMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("SampleMode")
            .field("has_chunks", &self.has_chunks())
            .field("sample_rate_index", &self.sample_rate_index())
            .field("channels_index", &self.channels_index())
            .field("data_offset", &self.data_offset())
            .field("sample_count", &self.sample_count())
            .finish()
    }
}

/// Packed 32-bit word in front of every chunk of a sound.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ChunkMode(u32);

impl ChunkMode {
    /// Chunk type of a loop info chunk.
    pub const LOOP_INFO: u8 = 3;
    /// Chunk type of an extra data chunk.
    pub const EXTRA_DATA: u8 = 0xb;

    /// Wraps a raw chunk mode word.
    #[must_use]
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw chunk mode word.
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }

    fn unpack(self) -> RawChunkMode {
        RawChunkMode::from(self.0)
    }

    fn update(self, f: impl FnOnce(&mut RawChunkMode)) -> Self {
        let mut raw = self.unpack();
        f(&mut raw);
        Self(raw.into())
    }

    /// Returns whether this is the last chunk of its sound.
    #[must_use]
    pub fn is_last(self) -> bool {
        !self.unpack().more_chunks()
    }

    /// Sets whether this is the last chunk of its sound.
    #[must_use]
    pub fn with_last(self, last: bool) -> Self {
        self.update(|raw| raw.set_more_chunks(!last))
    }

    /// Returns the size of the chunk payload, in bytes.
    #[must_use]
    pub fn size(self) -> u32 {
        self.unpack().size().value()
    }

    /// Sets the size of the chunk payload, in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `size` does not fit into 24 bits.
    pub fn with_size(self, size: u32) -> Result<Self, ContainerError> {
        check_width("chunk_size", size.into(), 24)?;
        Ok(self.update(|raw| raw.set_size(u24::new(size))))
    }

    /// Returns the 7-bit chunk type.
    #[must_use]
    pub fn kind(self) -> u8 {
        self.unpack().kind().value()
    }

    /// Sets the 7-bit chunk type.
    ///
    /// # Errors
    ///
    /// Returns an error if `kind` does not fit into 7 bits.
    pub fn with_kind(self, kind: u8) -> Result<Self, ContainerError> {
        check_width("chunk_type", kind.into(), 7)?;
        Ok(self.update(|raw| raw.set_kind(u7::new(kind))))
    }
}

impl Debug for ChunkMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ChunkMode")
            .field("is_last", &self.is_last())
            .field("size", &self.size())
            .field("kind", &self.kind())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::{ChunkMode, SampleMode, SAMPLE_RATES};
    use crate::fsb5::ContainerErrorKind;

    #[test]
    fn sample_mode_layout() {
        let raw = 1 | 8 << 1 | 1 << 5 | 3 << 7 | 1000 << 34;
        let mode = SampleMode::from_raw(raw);

        assert!(mode.has_chunks());
        assert_eq!(mode.sample_rate(), Some(44100));
        assert_eq!(mode.channels(), 2);
        assert_eq!(mode.data_offset(), 96);
        assert_eq!(mode.sample_count(), 1000);
    }

    #[test]
    fn odd_sixteen_byte_offset() {
        // a 16-unit offset of 1 lands in the high channel bit
        let mode = SampleMode::from_raw(1 << 6);

        assert_eq!(mode.channels_index(), 2);
        assert_eq!(mode.channels(), 6);
        assert_eq!(mode.data_offset(), 0);
    }

    #[test]
    fn sample_mode_fields_are_independent() {
        let mode = SampleMode::default()
            .with_has_chunks(true)
            .with_sample_rate_index(15)
            .unwrap()
            .with_channels_index(3)
            .unwrap()
            .with_data_offset(((1 << 27) - 1) * 32)
            .unwrap()
            .with_sample_count((1 << 30) - 1)
            .unwrap();

        assert_eq!(mode.raw(), u64::MAX);

        let mode = mode.with_sample_rate_index(5).unwrap();
        assert!(mode.has_chunks());
        assert_eq!(mode.sample_rate_index(), 5);
        assert_eq!(mode.channels_index(), 3);
        assert_eq!(mode.data_offset_units(), (1 << 27) - 1);
        assert_eq!(mode.sample_count(), (1 << 30) - 1);

        let mode = mode.with_has_chunks(false).with_sample_count(7).unwrap();
        assert!(!mode.has_chunks());
        assert_eq!(mode.sample_rate_index(), 5);
        assert_eq!(mode.sample_count(), 7);
    }

    #[test]
    fn sample_mode_set_get() {
        for (index, &hz) in SAMPLE_RATES.iter().enumerate() {
            let mode = SampleMode::default().with_sample_rate(hz).unwrap();
            assert_eq!(usize::from(mode.sample_rate_index()), index);
            assert_eq!(mode.sample_rate(), Some(hz));
        }

        for count in [1, 2, 6, 8] {
            let mode = SampleMode::default().with_channels(count).unwrap();
            assert_eq!(mode.channels(), count);
        }

        for offset in [0, 32, 4096, 32 * 12345] {
            let mode = SampleMode::default().with_data_offset(offset).unwrap();
            assert_eq!(mode.data_offset(), offset);
        }
    }

    #[test]
    fn unknown_sample_rate_index() {
        let mode = SampleMode::default().with_sample_rate_index(11).unwrap();
        assert_eq!(mode.sample_rate(), None);
    }

    #[test]
    fn sample_mode_rejects_out_of_range() {
        let mode = SampleMode::default();

        assert!(mode
            .with_sample_rate(12345)
            .is_err_and(|e| e.kind()
                == ContainerErrorKind::FieldOutOfRange {
                    field: "sample_rate",
                    value: 12345
                }));
        assert!(mode.with_sample_rate_index(16).is_err());
        assert!(mode.with_channels(3).is_err());
        assert!(mode.with_channels_index(4).is_err());
        assert!(mode.with_data_offset(33).is_err());
        assert!(mode.with_data_offset((1 << 27) * 32).is_err());
        assert!(mode.with_sample_count(1 << 30).is_err());
    }

    #[test]
    fn chunk_mode_layout() {
        let mode = ChunkMode::from_raw(1 | 8 << 1 | u32::from(ChunkMode::LOOP_INFO) << 25);

        assert!(!mode.is_last());
        assert_eq!(mode.size(), 8);
        assert_eq!(mode.kind(), ChunkMode::LOOP_INFO);

        let mode = mode.with_last(true);
        assert!(mode.is_last());
        assert_eq!(mode.size(), 8);
    }

    #[test]
    fn chunk_mode_set_get() {
        let mode = ChunkMode::default()
            .with_kind(0x7f)
            .unwrap()
            .with_size((1 << 24) - 1)
            .unwrap()
            .with_last(false);

        assert_eq!(mode.raw(), u32::MAX);
        assert_eq!(mode.kind(), 0x7f);
        assert_eq!(mode.size(), (1 << 24) - 1);

        assert!(ChunkMode::default().with_kind(0x80).is_err());
        assert!(ChunkMode::default().with_size(1 << 24).is_err());
    }
}
