use crate::read::ReadError;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// A malformed or truncated FSB5 header.
#[derive(Debug)]
pub(crate) struct HeaderError {
    kind: HeaderErrorKind,
    source: Option<ReadError>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HeaderErrorKind {
    Magic,
    BaseHeader,
    UnknownVersion { version: u32 },
    StreamMode { stream: u32 },
    UnknownSampleRate { stream: u32, index: u8 },
    ChunkTag { stream: u32, chunk: u32 },
    ChunkBody { stream: u32, chunk: u32 },
    ZeroChannels { stream: u32 },
    ZeroSampleRate { stream: u32 },
    StreamHeadersSize { declared: u32 },
    NameTable,
}

impl HeaderError {
    pub(super) fn new(kind: HeaderErrorKind) -> Self {
        Self { kind, source: None }
    }

    pub(super) fn factory(kind: HeaderErrorKind) -> impl FnOnce(ReadError) -> Self {
        move |source| Self {
            kind,
            source: Some(source),
        }
    }

    #[cfg(test)]
    pub(super) fn kind(&self) -> HeaderErrorKind {
        self.kind
    }
}

impl Display for HeaderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        use HeaderErrorKind::*;

        match self.kind {
            Magic => f.write_str("no FSB5 signature found"),
            BaseHeader => f.write_str("base header is truncated"),
            UnknownVersion { version } => write!(f, "unknown format version {version}"),
            StreamMode { stream } => write!(f, "failed to read mode of stream {stream}"),
            UnknownSampleRate { stream, index } => {
                write!(f, "stream {stream} uses unknown sample rate index {index}")
            }
            ChunkTag { stream, chunk } => {
                write!(f, "failed to read tag of chunk {chunk} of stream {stream}")
            }
            ChunkBody { stream, chunk } => write!(
                f,
                "chunk {chunk} of stream {stream} does not match its declared size"
            ),
            ZeroChannels { stream } => write!(f, "stream {stream} declares zero channels"),
            ZeroSampleRate { stream } => write!(f, "stream {stream} declares a zero sample rate"),
            StreamHeadersSize { declared } => write!(
                f,
                "stream headers do not fit in their declared size of {declared} bytes"
            ),
            NameTable => f.write_str("name table is truncated"),
        }
    }
}

impl Error for HeaderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(e) => Some(e),
            None => None,
        }
    }
}
