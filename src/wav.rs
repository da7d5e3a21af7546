//! Canonical 44-byte RIFF/WAVE header.

use crate::transcribe::SampleLayout;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    io::{Error as IoError, Write},
};

/// Size of the header in bytes.
pub const HEADER_SIZE: usize = 44;

const FORMAT_PCM: u16 = 1;
const FORMAT_IEEE_FLOAT: u16 = 3;

/// Header fields of a WAV file holding linear PCM or IEEE float samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WavHeader {
    format_code: u16,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    byte_rate: u32,
    block_align: u16,
    data_size: u32,
}

impl WavHeader {
    /// Builds the header for `data_size` bytes of samples packed according to `layout`.
    ///
    /// # Errors
    /// Returns an error if a derived field (byte rate, block alignment or file size) does not fit
    /// in its field.
    pub fn new(
        layout: SampleLayout,
        channels: u16,
        sample_rate: u32,
        data_size: u64,
    ) -> Result<Self, WavError> {
        let bits_per_sample = layout.bits_per_sample();
        let frame_bits = u64::from(channels) * u64::from(bits_per_sample);

        let byte_rate = u32::try_from(u64::from(sample_rate) * frame_bits / 8)
            .map_err(|_| WavError::new(WavErrorKind::ByteRate))?;

        let block_align = u16::try_from(frame_bits / 8)
            .map_err(|_| WavError::new(WavErrorKind::BlockAlign))?;

        // the RIFF chunk size (36 + data size) has to fit as well
        let data_size = u32::try_from(data_size)
            .ok()
            .filter(|size| size.checked_add(36).is_some())
            .ok_or_else(|| WavError::new(WavErrorKind::DataSize { size: data_size }))?;

        Ok(Self {
            format_code: if layout.is_float() {
                FORMAT_IEEE_FLOAT
            } else {
                FORMAT_PCM
            },
            channels,
            sample_rate,
            bits_per_sample,
            byte_rate,
            block_align,
            data_size,
        })
    }

    /// Format code: 3 for IEEE float, 1 for integer PCM.
    #[must_use]
    pub fn format_code(&self) -> u16 {
        self.format_code
    }

    /// Bytes per second of playback.
    #[must_use]
    pub fn byte_rate(&self) -> u32 {
        self.byte_rate
    }

    /// Bytes per frame (one sample for every channel).
    #[must_use]
    pub fn block_align(&self) -> u16 {
        self.block_align
    }

    /// Size of the data chunk in bytes.
    #[must_use]
    pub fn data_size(&self) -> u32 {
        self.data_size
    }

    /// Serializes the header.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0; HEADER_SIZE];

        bytes[0..4].copy_from_slice(b"RIFF");
        bytes[4..8].copy_from_slice(&(36 + self.data_size).to_le_bytes());
        bytes[8..12].copy_from_slice(b"WAVE");
        bytes[12..16].copy_from_slice(b"fmt ");
        bytes[16..20].copy_from_slice(&16u32.to_le_bytes());
        bytes[20..22].copy_from_slice(&self.format_code.to_le_bytes());
        bytes[22..24].copy_from_slice(&self.channels.to_le_bytes());
        bytes[24..28].copy_from_slice(&self.sample_rate.to_le_bytes());
        bytes[28..32].copy_from_slice(&self.byte_rate.to_le_bytes());
        bytes[32..34].copy_from_slice(&self.block_align.to_le_bytes());
        bytes[34..36].copy_from_slice(&self.bits_per_sample.to_le_bytes());
        bytes[36..40].copy_from_slice(b"data");
        bytes[40..44].copy_from_slice(&self.data_size.to_le_bytes());

        bytes
    }

    /// Writes the header to `sink`.
    ///
    /// # Errors
    /// Returns an error if `sink` cannot be written to.
    pub fn write<W: Write + ?Sized>(&self, sink: &mut W) -> Result<(), WavError> {
        sink.write_all(&self.to_bytes())
            .map_err(|e| WavError::new_with_source(WavErrorKind::Write, e))
    }
}

/// Error raised while building or writing a header.
#[derive(Debug)]
pub struct WavError {
    kind: WavErrorKind,
    source: Option<IoError>,
}

/// What went wrong while building or writing a header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WavErrorKind {
    /// The byte rate does not fit in 32 bits.
    ByteRate,
    /// The block alignment does not fit in 16 bits.
    BlockAlign,
    /// The data is too large for a RIFF file.
    DataSize {
        /// Size of the sample data in bytes.
        size: u64,
    },
    /// The header could not be written.
    Write,
}

impl WavError {
    fn new(kind: WavErrorKind) -> Self {
        Self { kind, source: None }
    }

    fn new_with_source(kind: WavErrorKind, source: IoError) -> Self {
        Self {
            kind,
            source: Some(source),
        }
    }

    /// Returns what went wrong.
    #[must_use]
    pub fn kind(&self) -> WavErrorKind {
        self.kind
    }
}

impl Display for WavError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.kind {
            WavErrorKind::ByteRate => f.write_str("byte rate does not fit in a WAV header"),
            WavErrorKind::BlockAlign => f.write_str("block alignment does not fit in a WAV header"),
            WavErrorKind::DataSize { size } => f.write_str(&format!(
                "sample data ({size} bytes) is too large for a WAV file"
            )),
            WavErrorKind::Write => f.write_str("failed to write WAV header"),
        }
    }
}

impl Error for WavError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(e) => Some(e),
            None => None,
        }
    }
}
