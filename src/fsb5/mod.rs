//! Reading and rebuilding FSB5 sound containers, including those embedded in FMOD bank files.
//!
//! A container starts with a fixed 60-byte header, followed by the sound table (one packed [`SampleMode`] word
//! per sound, each optionally followed by [`Chunk`]s), an optional name table, and the data section.
//! Sound data offsets are relative to the data section and always multiples of 32.
//! Containers written with 16-byte aligned offsets that are not 32-byte aligned read back with the
//! odd 16 bytes as the high channel bit.

mod builder;
mod chunk;
mod codec;
mod error;
mod mode;
mod reader;
mod sound;

pub use builder::{BuilderOptions, Fsb5Builder};
pub use chunk::Chunk;
pub use codec::Codec;
pub use error::{ContainerError, ContainerErrorKind};
pub use mode::{ChunkMode, SampleMode, CHANNEL_COUNTS, SAMPLE_RATES};
pub use reader::{find_fsb5_magic, Fsb5Header, Fsb5Reader};
pub use sound::{OwnedSound, Sound, SoundFromFsb};
