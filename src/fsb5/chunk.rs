use super::{
    error::{ContainerError, ContainerErrorKind},
    mode::ChunkMode,
};
use crate::window::ByteWindow;
use std::fmt::{Display, Formatter, Result as FmtResult};
use tap::Pipe;

const LOOP_INFO_SIZE: u32 = 8;

/// Metadata block attached to a sound in the sound table.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Chunk {
    /// Playback loop, with an inclusive end sample.
    LoopInfo {
        /// Mode word the chunk was read with.
        mode: ChunkMode,
        /// First sample of the loop.
        start: u32,
        /// Last sample of the loop.
        end: u32,
    },
    /// Codec-specific configuration.
    ExtraData {
        /// Mode word the chunk was read with.
        mode: ChunkMode,
        /// Raw payload.
        data: Box<[u8]>,
    },
    /// Any other chunk type, kept opaque.
    Unknown {
        /// Mode word the chunk was read with.
        mode: ChunkMode,
        /// Raw payload.
        data: Box<[u8]>,
    },
}

impl Chunk {
    /// Creates a loop info chunk. `end` is the last sample of the loop.
    #[must_use]
    pub fn loop_info(start: u32, end: u32) -> Self {
        let mode =
            ChunkMode::from_raw(u32::from(ChunkMode::LOOP_INFO) << 25 | LOOP_INFO_SIZE << 1);

        Self::LoopInfo { mode, start, end }
    }

    /// Creates an extra data chunk.
    #[must_use]
    pub fn extra_data(data: Box<[u8]>) -> Self {
        let mode = ChunkMode::from_raw(u32::from(ChunkMode::EXTRA_DATA) << 25);

        Self::ExtraData { mode, data }
    }

    /// Returns the mode word of this chunk.
    #[must_use]
    pub fn mode(&self) -> ChunkMode {
        match self {
            Self::LoopInfo { mode, .. }
            | Self::ExtraData { mode, .. }
            | Self::Unknown { mode, .. } => *mode,
        }
    }

    /// Returns the chunk type.
    #[must_use]
    pub fn kind(&self) -> u8 {
        match self {
            Self::LoopInfo { .. } => ChunkMode::LOOP_INFO,
            Self::ExtraData { .. } => ChunkMode::EXTRA_DATA,
            Self::Unknown { mode, .. } => mode.kind(),
        }
    }

    /// Returns the size of the payload, in bytes.
    #[must_use]
    pub fn payload_size(&self) -> u64 {
        match self {
            Self::LoopInfo { .. } => LOOP_INFO_SIZE.into(),
            Self::ExtraData { data, .. } | Self::Unknown { data, .. } => data.len() as u64,
        }
    }

    pub(crate) fn parse(
        window: &mut ByteWindow,
        sound: u32,
        chunk: u32,
    ) -> Result<Self, ContainerError> {
        let error = ContainerErrorKind::Chunk {
            index: sound,
            chunk,
        };

        let mode = window
            .read_u32()
            .map_err(ContainerError::factory(error))?
            .pipe(ChunkMode::from_raw);

        match mode.kind() {
            ChunkMode::LOOP_INFO => {
                if mode.size() != LOOP_INFO_SIZE {
                    return Err(ContainerError::new(ContainerErrorKind::LoopInfoSize {
                        index: sound,
                        size: mode.size(),
                    }));
                }

                let start = window.read_u32().map_err(ContainerError::factory(error))?;
                // stored exclusive of the final sample
                let end = window
                    .read_u32()
                    .map_err(ContainerError::factory(error))?
                    .wrapping_add(1);

                Ok(Self::LoopInfo { mode, start, end })
            }
            kind => {
                let data = window
                    .read_vec(mode.size() as usize)
                    .map_err(ContainerError::factory(error))?
                    .into_boxed_slice();

                if kind == ChunkMode::EXTRA_DATA {
                    Ok(Self::ExtraData { mode, data })
                } else {
                    Ok(Self::Unknown { mode, data })
                }
            }
        }
    }

    // the continuation flag and size are derived from the chunk's position and payload
    pub(crate) fn write(&self, dest: &mut ByteWindow, last: bool) -> Result<(), ContainerError> {
        let size = u32::try_from(self.payload_size()).map_err(|_| {
            ContainerError::new(ContainerErrorKind::FieldOutOfRange {
                field: "chunk_size",
                value: self.payload_size(),
            })
        })?;
        let mode = self
            .mode()
            .with_kind(self.kind())?
            .with_size(size)?
            .with_last(last);

        dest.write_u32(mode.raw())
            .map_err(ContainerError::factory(ContainerErrorKind::Write))?;

        match self {
            Self::LoopInfo { start, end, .. } => {
                dest.write_u32(*start)
                    .map_err(ContainerError::factory(ContainerErrorKind::Write))?;
                dest.write_u32(end.wrapping_sub(1))
                    .map_err(ContainerError::factory(ContainerErrorKind::Write))
            }
            Self::ExtraData { data, .. } | Self::Unknown { data, .. } => dest
                .write_all(data)
                .map_err(ContainerError::factory(ContainerErrorKind::Write)),
        }
    }
}

impl Display for Chunk {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::LoopInfo { start, end, .. } => {
                f.write_str(&format!("loop_info: [start = {start}, end = {end}]"))
            }
            Self::ExtraData { data, .. } => write_words(f, "extra_data", self.kind(), data),
            Self::Unknown { data, .. } => write_words(f, "unknown", self.kind(), data),
        }
    }
}

// payloads are shown as big-endian 32-bit words, with a short final word left-aligned
fn write_words(f: &mut Formatter<'_>, label: &str, kind: u8, data: &[u8]) -> FmtResult {
    f.write_str(&format!("{label}(0x{kind:x}, {} bytes): [", data.len()))?;

    for (i, word) in data.chunks(4).enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }

        let mut bytes = [0; 4];
        bytes[..word.len()].copy_from_slice(word);
        f.write_str(&format!("0x{:08X}", u32::from_be_bytes(bytes)))?;
    }

    f.write_str("]")
}

#[cfg(test)]
mod test {
    use super::Chunk;
    use crate::{
        fsb5::{ChunkMode, ContainerErrorKind},
        window::{Access, ByteWindow},
    };

    fn parse(bytes: &[u8]) -> Result<Chunk, crate::fsb5::ContainerError> {
        let mut window = ByteWindow::from_vec(bytes.to_vec(), Access::ReadOnly);
        Chunk::parse(&mut window, 0, 0)
    }

    #[test]
    fn loop_info_end_is_inclusive() {
        let mut bytes = (u32::from(ChunkMode::LOOP_INFO) << 25 | 8 << 1)
            .to_le_bytes()
            .to_vec();
        bytes.extend(10_u32.to_le_bytes());
        bytes.extend(99_u32.to_le_bytes());

        let chunk = parse(&bytes).unwrap();
        assert!(matches!(chunk, Chunk::LoopInfo { start: 10, end: 100, .. }));
        assert!(chunk.mode().is_last());
        assert_eq!(chunk.to_string(), "loop_info: [start = 10, end = 100]");

        let mut window = ByteWindow::from_vec(Vec::new(), Access::ReadWrite);
        chunk.write(&mut window, true).unwrap();
        window.seek(0).unwrap();
        assert_eq!(window.read_vec(12).unwrap(), bytes);
    }

    #[test]
    fn loop_info_with_wrong_size() {
        let mut bytes = (u32::from(ChunkMode::LOOP_INFO) << 25 | 12 << 1)
            .to_le_bytes()
            .to_vec();
        bytes.extend([0; 12]);

        assert!(parse(&bytes)
            .is_err_and(|e| e.kind() == ContainerErrorKind::LoopInfoSize { index: 0, size: 12 }));
    }

    #[test]
    fn extra_data_and_unknown() {
        let mut bytes = (u32::from(ChunkMode::EXTRA_DATA) << 25 | 6 << 1 | 1)
            .to_le_bytes()
            .to_vec();
        bytes.extend([0xde, 0xad, 0xbe, 0xef, 0x12, 0x34]);

        let chunk = parse(&bytes).unwrap();
        assert!(!chunk.mode().is_last());
        assert_eq!(chunk.payload_size(), 6);
        assert_eq!(
            chunk.to_string(),
            "extra_data(0xb, 6 bytes): [0xDEADBEEF, 0x12340000]"
        );

        let mut bytes = (7_u32 << 25 | 2 << 1).to_le_bytes().to_vec();
        bytes.extend([1, 2]);

        let chunk = parse(&bytes).unwrap();
        assert_eq!(chunk.kind(), 7);
        assert_eq!(chunk.to_string(), "unknown(0x7, 2 bytes): [0x01020000]");
    }

    #[test]
    fn write_sets_size_and_continuation() {
        let chunk = Chunk::extra_data(vec![1, 2, 3].into_boxed_slice());

        let mut window = ByteWindow::from_vec(Vec::new(), Access::ReadWrite);
        chunk.write(&mut window, false).unwrap();
        window.seek(0).unwrap();

        let mode = ChunkMode::from_raw(window.read_u32().unwrap());
        assert!(!mode.is_last());
        assert_eq!(mode.size(), 3);
        assert_eq!(mode.kind(), ChunkMode::EXTRA_DATA);
        assert_eq!(window.read_vec(3).unwrap(), [1, 2, 3]);
    }

    #[test]
    fn truncated_chunk() {
        let bytes = (u32::from(ChunkMode::EXTRA_DATA) << 25 | 16 << 1)
            .to_le_bytes()
            .to_vec();

        assert!(parse(&bytes)
            .is_err_and(|e| e.kind() == ContainerErrorKind::Chunk { index: 0, chunk: 0 }));
    }
}
