//! Streaming copy of sample data from an engine stream into an output file.

use crate::diag::DiagnosticLog;
use crate::engine::{EngineError, SampleFormat, StreamHandle};
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    io::{Error as IoError, Write},
};

/// Largest number of bytes moved per read/write cycle.
pub const CHUNK_SIZE: usize = 4096;

/// Packing rules for the sample bytes of one stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleLayout {
    /// Integer PCM copied unchanged. `width` is the size of one sample in bytes.
    Passthrough {
        /// Bytes per sample (1, 2 or 4).
        width: u16,
    },
    /// Data in a format without a dedicated layout, copied unchanged and labelled as 16-bit PCM.
    ///
    /// This is lossy for anything that is not actually 16-bit PCM (e.g. a compressed payload).
    Fallback16,
    /// 24-bit integer PCM packed in 3 bytes per sample. Incomplete trailing samples are dropped.
    Packed24,
    /// 32-bit float PCM, clamped to [-1.0, 1.0].
    Float32,
}

impl SampleLayout {
    /// Picks the layout for a sample format.
    #[must_use]
    pub fn for_format(format: SampleFormat) -> Self {
        match format {
            SampleFormat::Pcm8 => Self::Passthrough { width: 1 },
            SampleFormat::Pcm16 => Self::Passthrough { width: 2 },
            SampleFormat::Pcm24 => Self::Packed24,
            SampleFormat::Pcm32 => Self::Passthrough { width: 4 },
            SampleFormat::PcmFloat => Self::Float32,
            SampleFormat::Bitstream | SampleFormat::Unknown => Self::Fallback16,
        }
    }

    /// Bits per sample written to the output header.
    #[must_use]
    pub fn bits_per_sample(self) -> u16 {
        match self {
            Self::Passthrough { width } => width * 8,
            Self::Fallback16 => 16,
            Self::Packed24 => 24,
            Self::Float32 => 32,
        }
    }

    /// Whether samples are IEEE floats rather than integers.
    #[must_use]
    pub fn is_float(self) -> bool {
        self == Self::Float32
    }

    /// Number of bytes written for a stream of `byte_len` bytes.
    #[must_use]
    pub fn data_size(self, byte_len: u64) -> u64 {
        match self {
            Self::Packed24 => byte_len / 3 * 3,
            Self::Passthrough { .. } | Self::Fallback16 | Self::Float32 => byte_len,
        }
    }

    // Read sizes are a whole number of samples, so only the final chunk can end mid-sample.
    fn chunk_len(self) -> usize {
        match self {
            Self::Packed24 => CHUNK_SIZE / 3 * 3,
            Self::Passthrough { .. } | Self::Fallback16 | Self::Float32 => CHUNK_SIZE,
        }
    }

    // Rewrites `chunk` in place and returns how many of its bytes are written out.
    fn pack(self, chunk: &mut [u8]) -> usize {
        match self {
            Self::Passthrough { .. } | Self::Fallback16 => chunk.len(),
            Self::Packed24 => chunk.len() / 3 * 3,
            Self::Float32 => {
                for sample in chunk.chunks_exact_mut(4) {
                    let mut bytes = [0; 4];
                    bytes.copy_from_slice(sample);
                    sample.copy_from_slice(&clamp_sample(f32::from_le_bytes(bytes)).to_le_bytes());
                }
                chunk.len()
            }
        }
    }
}

impl Display for SampleLayout {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Passthrough { width } => write!(f, "{}-bit PCM", width * 8),
            Self::Fallback16 => f.write_str("16-bit PCM (fallback)"),
            Self::Packed24 => f.write_str("24-bit packed PCM"),
            Self::Float32 => f.write_str("32-bit float PCM"),
        }
    }
}

fn clamp_sample(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

/// Outcome of a completed transcription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transcribed {
    /// Number of read/write cycles.
    pub chunks: u64,
    /// Number of sample bytes written to the sink.
    pub bytes_written: u64,
}

/// Copies `layout.data_size(byte_len)` bytes of sample data from `stream` into `sink`.
///
/// The stream is rewound first. Data is moved in chunks of at most [`CHUNK_SIZE`] bytes, so memory
/// use does not depend on the stream length.
///
/// # Errors
/// Returns an error if the stream cannot be rewound or read, ends before the expected number of
/// bytes, or if the sink cannot be written to. Bytes already written stay in the sink.
pub fn transcribe<S, W>(
    stream: &mut S,
    layout: SampleLayout,
    byte_len: u64,
    sink: &mut W,
    log: &mut DiagnosticLog,
    scope: &str,
) -> Result<Transcribed, TranscribeError>
where
    S: StreamHandle + ?Sized,
    W: Write + ?Sized,
{
    stream
        .seek_to_start()
        .map_err(TranscribeError::engine_factory(TranscribeErrorKind::Seek))?;

    let target = layout.data_size(byte_len);
    let mut buf = vec![0; layout.chunk_len()];
    let mut progress = Transcribed {
        chunks: 0,
        bytes_written: 0,
    };

    while progress.bytes_written < target {
        let remaining = target - progress.bytes_written;
        let wanted = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));

        progress.chunks += 1;
        log::trace!("{scope}: reading chunk {} ({wanted} bytes)", progress.chunks);

        let read = match stream.read_chunk(&mut buf[..wanted]) {
            Ok(0) => Err(TranscribeError::new(TranscribeErrorKind::UnexpectedEnd {
                expected: target,
                written: progress.bytes_written,
            })),
            Ok(n) => Ok(n.min(wanted)),
            Err(e) => Err(TranscribeError::new_with_engine_source(
                TranscribeErrorKind::Read {
                    chunk: progress.chunks,
                },
                e,
            )),
        }
        .map_err(|e| {
            log.error(scope, format_args!("chunk {}: {e}", progress.chunks));
            e
        })?;

        let usable = layout.pack(&mut buf[..read]);

        sink.write_all(&buf[..usable]).map_err(|e| {
            log.error(
                scope,
                format_args!("failed to write chunk {}: {e}", progress.chunks),
            );
            TranscribeError::new_with_io_source(
                TranscribeErrorKind::Write {
                    chunk: progress.chunks,
                },
                e,
            )
        })?;

        progress.bytes_written += usable as u64;

        if usable < read {
            log.info(
                scope,
                format_args!(
                    "dropped {} trailing bytes of an incomplete sample",
                    read - usable
                ),
            );
        }
    }

    log.info(
        scope,
        format_args!(
            "wrote {} bytes of {layout} in {} chunks",
            progress.bytes_written, progress.chunks
        ),
    );

    Ok(progress)
}

/// Error raised while copying sample data.
#[derive(Debug)]
pub struct TranscribeError {
    kind: TranscribeErrorKind,
    source: Option<TranscribeErrorSource>,
}

/// What went wrong while copying sample data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranscribeErrorKind {
    /// The stream could not be rewound.
    Seek,
    /// The engine failed to deliver a chunk.
    Read {
        /// 1-based index of the chunk.
        chunk: u64,
    },
    /// The stream ended before all expected bytes were read.
    UnexpectedEnd {
        /// Number of bytes that should have been written.
        expected: u64,
        /// Number of bytes written before the stream ended.
        written: u64,
    },
    /// A chunk could not be written to the sink.
    Write {
        /// 1-based index of the chunk.
        chunk: u64,
    },
}

#[derive(Debug)]
enum TranscribeErrorSource {
    Engine(EngineError),
    Io(IoError),
}

impl TranscribeError {
    fn new(kind: TranscribeErrorKind) -> Self {
        Self { kind, source: None }
    }

    fn new_with_engine_source(kind: TranscribeErrorKind, source: EngineError) -> Self {
        Self {
            kind,
            source: Some(TranscribeErrorSource::Engine(source)),
        }
    }

    fn new_with_io_source(kind: TranscribeErrorKind, source: IoError) -> Self {
        Self {
            kind,
            source: Some(TranscribeErrorSource::Io(source)),
        }
    }

    fn engine_factory(kind: TranscribeErrorKind) -> impl FnOnce(EngineError) -> Self {
        move |source| Self::new_with_engine_source(kind, source)
    }

    /// Returns what went wrong.
    #[must_use]
    pub fn kind(&self) -> TranscribeErrorKind {
        self.kind
    }
}

impl Display for TranscribeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        #[allow(clippy::enum_glob_use)]
        use TranscribeErrorKind::*;

        match self.kind {
            Seek => f.write_str("failed to seek to start of sample data"),
            Read { chunk } => f.write_str(&format!("failed to read chunk {chunk} of sample data")),
            UnexpectedEnd { expected, written } => f.write_str(&format!(
                "sample data ended after {written} of {expected} bytes"
            )),
            Write { chunk } => {
                f.write_str(&format!("failed to write chunk {chunk} of sample data"))
            }
        }
    }
}

impl Error for TranscribeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(TranscribeErrorSource::Engine(e)) => Some(e),
            Some(TranscribeErrorSource::Io(e)) => Some(e),
            None => None,
        }
    }
}
