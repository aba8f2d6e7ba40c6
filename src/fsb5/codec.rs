use std::fmt::{Display, Formatter, Result as FmtResult};

/// Known codecs of the sounds in an FSB5 container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Codec {
    /// PCM with 8-bit integer samples.
    Pcm8,
    /// PCM with 16-bit integer samples.
    Pcm16,
    /// PCM with 24-bit integer samples.
    Pcm24,
    /// PCM with 32-bit integer samples.
    Pcm32,
    /// PCM with 32-bit float samples.
    PcmFloat,
    /// GC ADPCM.
    GcAdpcm,
    /// IMA ADPCM.
    ImaAdpcm,
    /// VAG.
    Vag,
    /// HEVAG.
    HeVag,
    /// XMA.
    Xma,
    /// MPEG.
    Mpeg,
    /// CELT.
    Celt,
    /// ATRAC9.
    Atrac9,
    /// xWMA.
    Xwma,
    /// Vorbis, the codec of every container shipped with the game.
    Vorbis,
    /// FADPCM.
    FAdpcm,
    /// Opus.
    Opus,
}

impl Codec {
    /// Maps the codec field of a container header, or returns `None` for an unknown value.
    #[must_use]
    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Pcm8),
            2 => Some(Self::Pcm16),
            3 => Some(Self::Pcm24),
            4 => Some(Self::Pcm32),
            5 => Some(Self::PcmFloat),
            6 => Some(Self::GcAdpcm),
            7 => Some(Self::ImaAdpcm),
            8 => Some(Self::Vag),
            9 => Some(Self::HeVag),
            10 => Some(Self::Xma),
            11 => Some(Self::Mpeg),
            12 => Some(Self::Celt),
            13 => Some(Self::Atrac9),
            14 => Some(Self::Xwma),
            15 => Some(Self::Vorbis),
            16 => Some(Self::FAdpcm),
            17 => Some(Self::Opus),
            _ => None,
        }
    }

    /// Returns the value of the codec field for this codec.
    #[must_use]
    pub fn raw(self) -> u32 {
        self as u32 + 1
    }
}

impl Display for Codec {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::Pcm8 => "PCM (8-bit, integer)",
            Self::Pcm16 => "PCM (16-bit, integer)",
            Self::Pcm24 => "PCM (24-bit, integer)",
            Self::Pcm32 => "PCM (32-bit, integer)",
            Self::PcmFloat => "PCM (32-bit, float)",
            Self::GcAdpcm => "GC ADPCM",
            Self::ImaAdpcm => "IMA ADPCM",
            Self::Vag => "VAG",
            Self::HeVag => "HEVAG",
            Self::Xma => "XMA",
            Self::Mpeg => "MPEG",
            Self::Celt => "CELT",
            Self::Atrac9 => "ATRAC9",
            Self::Xwma => "xWMA",
            Self::Vorbis => "Vorbis",
            Self::FAdpcm => "FADPCM",
            Self::Opus => "Opus",
        })
    }
}
