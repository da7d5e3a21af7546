use crate::bank::BankError;
use crate::engine::{EngineError, Version};
use crate::transcribe::TranscribeError;
use crate::wav::WavError;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    io::Error as IoError,
    path::PathBuf,
};

/// Error that aborts a whole extraction run.
#[derive(Debug)]
pub struct ExtractError {
    kind: ExtractErrorKind,
    source: Option<BankError>,
}

/// What aborted an extraction run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtractErrorKind {
    /// The decoding engine is older than the pipeline supports.
    EngineUnavailable {
        /// Version of the engine that was provided.
        found: Version,
        /// Oldest supported version.
        required: Version,
    },
    /// The input file does not exist.
    MissingInput {
        /// Path of the input file.
        path: PathBuf,
    },
    /// The `.bank` file could not be opened.
    Bank,
}

impl ExtractError {
    pub(crate) fn new(kind: ExtractErrorKind) -> Self {
        Self { kind, source: None }
    }

    pub(crate) fn new_with_source(kind: ExtractErrorKind, source: BankError) -> Self {
        Self {
            kind,
            source: Some(source),
        }
    }

    /// Returns what went wrong.
    #[must_use]
    pub fn kind(&self) -> &ExtractErrorKind {
        &self.kind
    }
}

impl Display for ExtractError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            ExtractErrorKind::EngineUnavailable { found, required } => f.write_str(&format!(
                "decoding engine version {found} is older than the required version {required}"
            )),
            ExtractErrorKind::MissingInput { path } => {
                f.write_str(&format!("input file does not exist: {}", path.display()))
            }
            ExtractErrorKind::Bank => f.write_str("failed to process bank file"),
        }
    }
}

impl Error for ExtractError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(e) => Some(e),
            None => None,
        }
    }
}

/// Error that aborted the extraction of one stream. Other streams are not affected.
#[derive(Debug)]
pub struct StreamFailure {
    index: u32,
    kind: StreamFailureKind,
    source: Option<StreamFailureSource>,
}

/// Step at which a stream failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamFailureKind {
    /// The engine did not hand out the stream.
    Unavailable,
    /// The format, default frequency or length of the stream could not be read.
    Metadata,
    /// No valid WAV header could be built or written for the stream.
    Header,
    /// The output file could not be created.
    CreateOutput,
    /// Copying the sample data failed. The partial output file is left on disk.
    Transcribe,
    /// Buffered output could not be written to disk.
    Flush,
}

#[derive(Debug)]
enum StreamFailureSource {
    Engine(EngineError),
    Wav(WavError),
    Transcribe(TranscribeError),
    Io(IoError),
}

impl StreamFailure {
    pub(crate) fn engine_factory(
        index: u32,
        kind: StreamFailureKind,
    ) -> impl FnOnce(EngineError) -> Self {
        move |source| Self {
            index,
            kind,
            source: Some(StreamFailureSource::Engine(source)),
        }
    }

    pub(crate) fn wav_factory(index: u32) -> impl FnOnce(WavError) -> Self {
        move |source| Self {
            index,
            kind: StreamFailureKind::Header,
            source: Some(StreamFailureSource::Wav(source)),
        }
    }

    pub(crate) fn transcribe_factory(index: u32) -> impl FnOnce(TranscribeError) -> Self {
        move |source| Self {
            index,
            kind: StreamFailureKind::Transcribe,
            source: Some(StreamFailureSource::Transcribe(source)),
        }
    }

    pub(crate) fn io_factory(index: u32, kind: StreamFailureKind) -> impl FnOnce(IoError) -> Self {
        move |source| Self {
            index,
            kind,
            source: Some(StreamFailureSource::Io(source)),
        }
    }

    /// Index of the stream within its container.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Returns the step at which the stream failed.
    #[must_use]
    pub fn kind(&self) -> StreamFailureKind {
        self.kind
    }
}

impl Display for StreamFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        #[allow(clippy::enum_glob_use)]
        use StreamFailureKind::*;

        let index = self.index;
        match self.kind {
            Unavailable => f.write_str(&format!("failed to acquire stream {index}")),
            Metadata => f.write_str(&format!("failed to read metadata of stream {index}")),
            Header => f.write_str(&format!("failed to write WAV header for stream {index}")),
            CreateOutput => f.write_str(&format!("failed to create output file for stream {index}")),
            Transcribe => f.write_str(&format!("failed to copy sample data of stream {index}")),
            Flush => f.write_str(&format!("failed to finish output file for stream {index}")),
        }
    }
}

impl Error for StreamFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(StreamFailureSource::Engine(e)) => Some(e),
            Some(StreamFailureSource::Wav(e)) => Some(e),
            Some(StreamFailureSource::Transcribe(e)) => Some(e),
            Some(StreamFailureSource::Io(e)) => Some(e),
            None => None,
        }
    }
}
