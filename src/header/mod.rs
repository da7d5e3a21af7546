//! FSB5 header parsing.
//!
//! A header is a fixed base header, one packed mode word per stream (each optionally followed by
//! chunks that override its fields), and an optional table of stream names. Stream sizes are not
//! stored; they follow from the offsets of neighbouring streams.
//!
//! A stream without samples or without data does not fail the header. It is kept so that stream
//! indices stay stable, and [`StreamInfo::defect`] reports why it cannot be read.

mod error;

pub(crate) use error::HeaderError;

use crate::read::Reader;
use bilge::prelude::*;
use error::HeaderErrorKind;
use std::{
    ffi::CStr,
    fmt::{Display, Formatter, Result as FmtResult},
    io::Read,
    num::{NonZeroU32, NonZeroU8},
};
use tap::Pipe;

pub(crate) const FSB5_MAGIC: [u8; 4] = *b"FSB5";

// stream counts come from the file, so they are only trusted up to this many
const MAX_PREALLOCATED_STREAMS: usize = 4096;

const SAMPLE_RATES: [u32; 11] = [
    4000, 8000, 11000, 11025, 16000, 22050, 24000, 32000, 44100, 48000, 96000,
];

const CHANNEL_COUNTS: [u8; 4] = [1, 2, 6, 8];

const CHUNK_CHANNELS: u8 = 1;
const CHUNK_SAMPLE_RATE: u8 = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Header {
    pub(crate) format: AudioFormat,
    pub(crate) flags: u32,
    /// Absolute offset of the sample data block.
    pub(crate) data_offset: u64,
    pub(crate) streams: Box<[StreamInfo]>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct StreamInfo {
    pub(crate) sample_rate: NonZeroU32,
    pub(crate) channels: NonZeroU8,
    pub(crate) samples: u32,
    /// Offset of the payload within the sample data block.
    pub(crate) offset: u32,
    /// Size of the payload, padding included.
    pub(crate) size: u32,
    pub(crate) name: Option<Box<str>>,
}

impl StreamInfo {
    /// Why the stream cannot be read, if it cannot.
    pub(crate) fn defect(&self) -> Option<&'static str> {
        if self.samples == 0 {
            Some("it has no samples")
        } else if self.size == 0 {
            Some("it has no data")
        } else {
            None
        }
    }
}

impl Header {
    pub(crate) fn parse<R: Read>(reader: &mut Reader<R>) -> Result<Self, HeaderError> {
        let base = BaseHeader::parse(reader)?;

        let mut layouts =
            Vec::with_capacity((base.stream_count as usize).min(MAX_PREALLOCATED_STREAMS));
        for stream in 0..base.stream_count {
            layouts.push(read_stream_layout(reader, stream)?);
        }

        let names_start = base.size + u64::from(base.stream_headers_size);
        reader
            .seek_forward(names_start)
            .map_err(HeaderError::factory(HeaderErrorKind::StreamHeadersSize {
                declared: base.stream_headers_size,
            }))?;

        let names = match base.name_table_size {
            0 => Vec::new(),
            len => reader
                .bytes(u64::from(len))
                .map_err(HeaderError::factory(HeaderErrorKind::NameTable))?
                .pipe(|table| read_names(&table, layouts.len())),
        };

        let streams = size_streams(layouts, names, base.data_size);
        for (stream, info) in streams.iter().enumerate() {
            if let Some(defect) = info.defect() {
                log::warn!("stream {stream} cannot be read: {defect}");
            }
        }

        Ok(Self {
            format: base.format,
            flags: base.flags,
            data_offset: names_start + u64::from(base.name_table_size),
            streams,
        })
    }
}

struct BaseHeader {
    format: AudioFormat,
    flags: u32,
    size: u64,
    stream_count: u32,
    stream_headers_size: u32,
    name_table_size: u32,
    data_size: u32,
}

impl BaseHeader {
    fn parse<R: Read>(reader: &mut Reader<R>) -> Result<Self, HeaderError> {
        match reader.array::<4>() {
            Ok(magic) if magic == FSB5_MAGIC => {}
            Ok(_) => return Err(HeaderError::new(HeaderErrorKind::Magic)),
            Err(e) => return Err(HeaderError::factory(HeaderErrorKind::Magic)(e)),
        }

        let mut field = || {
            reader
                .le_u32()
                .map_err(HeaderError::factory(HeaderErrorKind::BaseHeader))
        };

        let version = field()?;
        let stream_count = field()?;
        let stream_headers_size = field()?;
        let name_table_size = field()?;
        let data_size = field()?;
        let format = field()?.pipe(AudioFormat::from_raw);

        // version 1 keeps its encoding flags after a reserved word; version 0 has none
        let (flags, size) = match version {
            0 => (0, 64),
            1 => {
                reader
                    .skip(4)
                    .map_err(HeaderError::factory(HeaderErrorKind::BaseHeader))?;
                let flags = reader
                    .le_u32()
                    .map_err(HeaderError::factory(HeaderErrorKind::BaseHeader))?;
                (flags, 60)
            }
            version => return Err(HeaderError::new(HeaderErrorKind::UnknownVersion { version })),
        };

        reader
            .seek_forward(size)
            .map_err(HeaderError::factory(HeaderErrorKind::BaseHeader))?;

        Ok(Self {
            format,
            flags,
            size,
            stream_count,
            stream_headers_size,
            name_table_size,
            data_size,
        })
    }
}

/// Codec shared by every stream of a bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum AudioFormat {
    Pcm8,
    Pcm16,
    Pcm24,
    Pcm32,
    PcmFloat,
    GcAdpcm,
    ImaAdpcm,
    Vag,
    HeVag,
    Xma,
    Mpeg,
    Celt,
    Atrac9,
    Xwma,
    Vorbis,
    FAdpcm,
    Opus,
    /// A codec number this parser does not know, kept as stored.
    Unknown(u32),
}

impl AudioFormat {
    // numbered from 1 on disk
    const NUMBERED: [Self; 17] = [
        Self::Pcm8,
        Self::Pcm16,
        Self::Pcm24,
        Self::Pcm32,
        Self::PcmFloat,
        Self::GcAdpcm,
        Self::ImaAdpcm,
        Self::Vag,
        Self::HeVag,
        Self::Xma,
        Self::Mpeg,
        Self::Celt,
        Self::Atrac9,
        Self::Xwma,
        Self::Vorbis,
        Self::FAdpcm,
        Self::Opus,
    ];

    fn from_raw(value: u32) -> Self {
        value
            .checked_sub(1)
            .and_then(|index| usize::try_from(index).ok())
            .and_then(|index| Self::NUMBERED.get(index).copied())
            .unwrap_or(Self::Unknown(value))
    }
}

impl Display for AudioFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Pcm8 => "8-bit PCM",
            Self::Pcm16 => "16-bit PCM",
            Self::Pcm24 => "24-bit PCM",
            Self::Pcm32 => "32-bit PCM",
            Self::PcmFloat => "float PCM",
            Self::GcAdpcm => "GameCube ADPCM",
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
            Self::Unknown(value) => return write!(f, "unknown codec {value}"),
        };
        f.write_str(name)
    }
}

#[bitsize(64)]
#[derive(FromBits)]
struct PackedMode {
    has_chunks: bool,
    rate_index: u4,
    channel_index: u2,
    data_block: u27,
    samples: u30,
}

#[bitsize(32)]
#[derive(FromBits)]
struct PackedChunkTag {
    more: bool,
    size: u24,
    kind: u7,
}

// a stream before its size and name are known
struct StreamLayout {
    sample_rate: NonZeroU32,
    channels: NonZeroU8,
    samples: u32,
    offset: u32,
}

fn read_stream_layout<R: Read>(
    reader: &mut Reader<R>,
    stream: u32,
) -> Result<StreamLayout, HeaderError> {
    let mode = reader
        .le_u64()
        .map_err(HeaderError::factory(HeaderErrorKind::StreamMode { stream }))?
        .pipe(PackedMode::from);

    let index = mode.rate_index().value();
    let sample_rate = SAMPLE_RATES
        .get(usize::from(index))
        .copied()
        .and_then(NonZeroU32::new)
        .ok_or_else(|| HeaderError::new(HeaderErrorKind::UnknownSampleRate { stream, index }))?;

    let channels = CHANNEL_COUNTS[usize::from(mode.channel_index().value())]
        .pipe(NonZeroU8::new)
        .expect("channel counts in the table are non-zero");

    let mut layout = StreamLayout {
        sample_rate,
        channels,
        samples: mode.samples().value(),
        offset: mode.data_block().value() * 32,
    };

    if mode.has_chunks() {
        apply_chunks(reader, stream, &mut layout)?;
    }

    Ok(layout)
}

// Only channel and sample rate chunks change the layout. Every other chunk is skipped by its
// declared size, including kinds that are not known at all.
fn apply_chunks<R: Read>(
    reader: &mut Reader<R>,
    stream: u32,
    layout: &mut StreamLayout,
) -> Result<(), HeaderError> {
    for chunk in 0.. {
        let tag = reader
            .le_u32()
            .map_err(HeaderError::factory(HeaderErrorKind::ChunkTag { stream, chunk }))?
            .pipe(PackedChunkTag::from);

        let body = HeaderErrorKind::ChunkBody { stream, chunk };
        let end = reader.position() + u64::from(tag.size().value());

        match tag.kind().value() {
            CHUNK_CHANNELS => {
                layout.channels = reader
                    .u8()
                    .map_err(HeaderError::factory(body))?
                    .pipe(NonZeroU8::new)
                    .ok_or_else(|| HeaderError::new(HeaderErrorKind::ZeroChannels { stream }))?;
            }
            CHUNK_SAMPLE_RATE => {
                layout.sample_rate = reader
                    .le_u32()
                    .map_err(HeaderError::factory(body))?
                    .pipe(NonZeroU32::new)
                    .ok_or_else(|| HeaderError::new(HeaderErrorKind::ZeroSampleRate { stream }))?;
            }
            kind => log::trace!("stream {stream}: skipping chunk of kind {kind}"),
        }

        reader
            .seek_forward(end)
            .map_err(HeaderError::factory(body))?;

        if !tag.more() {
            break;
        }
    }

    Ok(())
}

// The table starts with one offset per stream, relative to the table itself, followed by
// NUL-terminated names. A name that cannot be read is dropped rather than failing the bank.
fn read_names(table: &[u8], count: usize) -> Vec<Option<Box<str>>> {
    (0..count)
        .map(|stream| match name_at(table, stream) {
            Ok(name) => Some(name),
            Err(reason) => {
                log::warn!("stream {stream} has no usable name: {reason}");
                None
            }
        })
        .collect()
}

fn name_at(table: &[u8], stream: usize) -> Result<Box<str>, &'static str> {
    let entry: [u8; 4] = table
        .get(stream * 4..stream * 4 + 4)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or("the name table has no offset for it")?;

    let start = usize::try_from(u32::from_le_bytes(entry)).map_err(|_| "offset is out of range")?;

    table
        .get(start..)
        .ok_or("offset points past the name table")?
        .pipe(CStr::from_bytes_until_nul)
        .map_err(|_| "name is not NUL-terminated")?
        .to_str()
        .map_err(|_| "name is not valid UTF-8")?
        .pipe(Box::<str>::from)
        .pipe(Ok)
}

// A stream ends where the next one starts; the last one ends with the data block. Offsets that
// run backwards leave a stream with no data.
fn size_streams(
    layouts: Vec<StreamLayout>,
    names: Vec<Option<Box<str>>>,
    data_size: u32,
) -> Box<[StreamInfo]> {
    let ends: Vec<u32> = layouts
        .iter()
        .skip(1)
        .map(|layout| layout.offset)
        .chain([data_size])
        .collect();

    let mut names = names.into_iter();

    layouts
        .into_iter()
        .zip(ends)
        .map(|(layout, end)| StreamInfo {
            sample_rate: layout.sample_rate,
            channels: layout.channels,
            samples: layout.samples,
            offset: layout.offset,
            size: end.saturating_sub(layout.offset),
            name: names.next().flatten(),
        })
        .collect()
}
