//! Capabilities of the decoding engine that opens sound banks and hands out their streams.
//!
//! The extraction pipeline only talks to these traits. [`FsbEngine`](fsb::FsbEngine) is the
//! native implementation for FSB5 banks.

pub mod fsb;

use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    path::Path,
};

/// Oldest engine version the extraction pipeline works with.
pub const REQUIRED_ENGINE_VERSION: Version = Version::new(5, 0);

/// Version of a decoding engine, ordered by `major` then `minor`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// Major version.
    pub major: u16,
    /// Minor version.
    pub minor: u16,
}

impl Version {
    /// Creates a version from its parts.
    #[must_use]
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Opens containers. One engine is created per run.
pub trait Engine {
    /// Streams of one opened container.
    type Collection: StreamCollection;

    /// Version of this engine, checked against [`REQUIRED_ENGINE_VERSION`].
    fn version(&self) -> Version;

    /// Opens the container at `path`.
    ///
    /// # Errors
    /// Returns an [`UnreadableContainer`](EngineErrorKind::UnreadableContainer) error if the file
    /// cannot be opened or is not a well-formed container.
    fn load(&mut self, path: &Path) -> Result<Self::Collection, EngineError>;
}

/// Streams embedded in an opened container. The container is released when this value is dropped.
pub trait StreamCollection {
    /// Handle to one stream, borrowing the collection.
    type Stream<'a>: StreamHandle
    where
        Self: 'a;

    /// Number of embedded streams. Zero is valid.
    fn stream_count(&self) -> u32;

    /// Acquires the stream at `index`.
    ///
    /// # Errors
    /// Returns a [`StreamUnavailable`](EngineErrorKind::StreamUnavailable) error if the stream
    /// cannot be acquired.
    fn stream(&mut self, index: u32) -> Result<Self::Stream<'_>, EngineError>;
}

/// Metadata queries and sequential sample reads for one stream.
///
/// # Errors
/// Every method reports failures as an [`EngineError`].
pub trait StreamHandle {
    /// Sample format, channel count and bits per sample.
    fn format(&self) -> Result<StreamFormat, EngineError>;

    /// Default playback parameters.
    fn defaults(&self) -> Result<Defaults, EngineError>;

    /// Length of the stream in the given unit.
    fn length(&self, unit: TimeUnit) -> Result<u64, EngineError>;

    /// Name of the stream, or `None` if it has none.
    fn name(&self) -> Result<Option<String>, EngineError>;

    /// Moves the read cursor back to the first sample byte.
    fn seek_to_start(&mut self) -> Result<(), EngineError>;

    /// Reads sample bytes into `buf`, returning how many were read.
    /// Fewer than `buf.len()` bytes are returned only at the end of the stream.
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, EngineError>;
}

/// Representation of the sample bytes a stream delivers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// 8-bit integer PCM.
    Pcm8,
    /// 16-bit integer PCM.
    Pcm16,
    /// 24-bit integer PCM, packed 3 bytes per sample.
    Pcm24,
    /// 32-bit integer PCM.
    Pcm32,
    /// 32-bit IEEE float PCM.
    PcmFloat,
    /// Compressed payload the engine does not decode.
    Bitstream,
    /// Anything else.
    Unknown,
}

impl Display for SampleFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::Pcm8 => "PCM8",
            Self::Pcm16 => "PCM16",
            Self::Pcm24 => "PCM24",
            Self::Pcm32 => "PCM32",
            Self::PcmFloat => "PCMFLOAT",
            Self::Bitstream => "BITSTREAM",
            Self::Unknown => "UNKNOWN",
        })
    }
}

/// Result of [`StreamHandle::format`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamFormat {
    /// How samples are represented.
    pub sample_format: SampleFormat,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Bits per sample as reported by the engine.
    pub bits_per_sample: u16,
}

/// Result of [`StreamHandle::defaults`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Defaults {
    /// Default playback frequency in Hz. May be fractional, zero or negative.
    pub frequency: f64,
    /// Default playback priority.
    pub priority: i32,
}

/// Unit for [`StreamHandle::length`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeUnit {
    /// Bytes of sample data as delivered by [`StreamHandle::read_chunk`].
    PcmBytes,
    /// Milliseconds of playback.
    Ms,
}

/// Error reported by an engine.
#[derive(Debug)]
pub struct EngineError {
    kind: EngineErrorKind,
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

/// What an engine failed to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// The engine is older than the pipeline supports.
    Unavailable {
        /// Version of the engine.
        found: Version,
        /// Oldest supported version.
        required: Version,
    },
    /// A container could not be opened or recognized.
    UnreadableContainer,
    /// A stream could not be acquired.
    StreamUnavailable {
        /// Index of the stream.
        index: u32,
    },
    /// The sample format could not be queried.
    Format,
    /// Default playback parameters could not be queried.
    Defaults,
    /// A stream length could not be queried.
    Length,
    /// The stream carries no name tag.
    NameTagNotFound,
    /// The stream name could not be queried.
    Name,
    /// Sample data could not be read.
    Read,
    /// The read cursor could not be moved.
    Seek,
}

impl EngineError {
    /// Creates an error without an underlying cause.
    #[must_use]
    pub fn new(kind: EngineErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// Creates an error caused by `source`.
    pub fn new_with_source<E>(kind: EngineErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self {
            kind,
            source: Some(source.into()),
        }
    }

    pub(crate) fn factory<E>(kind: EngineErrorKind) -> impl FnOnce(E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        move |source| Self::new_with_source(kind, source)
    }

    /// Returns what went wrong.
    #[must_use]
    pub fn kind(&self) -> EngineErrorKind {
        self.kind
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        #[allow(clippy::enum_glob_use)]
        use EngineErrorKind::*;

        match self.kind {
            Unavailable { found, required } => f.write_str(&format!(
                "decoding engine version {found} is older than the required version {required}"
            )),
            UnreadableContainer => f.write_str("failed to open container"),
            StreamUnavailable { index } => {
                f.write_str(&format!("failed to acquire stream at index {index}"))
            }
            Format => f.write_str("failed to read sample format"),
            Defaults => f.write_str("failed to read default playback parameters"),
            Length => f.write_str("failed to read stream length"),
            NameTagNotFound => f.write_str("stream has no name tag"),
            Name => f.write_str("failed to read stream name"),
            Read => f.write_str("failed to read sample data"),
            Seek => f.write_str("failed to seek to start of sample data"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(e) => Some(e.as_ref()),
            None => None,
        }
    }
}
