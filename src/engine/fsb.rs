//! Native engine for FSB5 sound banks.
//!
//! PCM streams are exposed with their own sample format. Streams encoded with any other codec are
//! exposed as [`Bitstream`](SampleFormat::Bitstream) and deliver their payload undecoded. A codec
//! number that is not known at all is exposed as [`Unknown`](SampleFormat::Unknown), also with the
//! undecoded payload.

use super::{
    Defaults, Engine, EngineError, EngineErrorKind, SampleFormat, StreamCollection, StreamFormat,
    StreamHandle, TimeUnit, Version,
};
use crate::header::{AudioFormat, Header, StreamInfo};
use crate::read::Reader;
use std::{
    fs::File,
    io::{BufReader, ErrorKind, Read, Seek, SeekFrom},
    path::Path,
};

const DEFAULT_PRIORITY: i32 = 128;

/// Opens FSB5 files directly from disk.
#[derive(Debug, Default)]
pub struct FsbEngine {
    loaded: u64,
}

impl FsbEngine {
    /// Version reported by [`Engine::version`].
    pub const VERSION: Version = Version::new(5, 0);

    /// Creates an engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Engine for FsbEngine {
    type Collection = FsbCollection;

    fn version(&self) -> Version {
        Self::VERSION
    }

    fn load(&mut self, path: &Path) -> Result<Self::Collection, EngineError> {
        let file =
            File::open(path).map_err(EngineError::factory(EngineErrorKind::UnreadableContainer))?;

        let mut reader = Reader::new(BufReader::new(file));
        let header = Header::parse(&mut reader)
            .map_err(EngineError::factory(EngineErrorKind::UnreadableContainer))?;

        self.loaded += 1;
        log::debug!(
            "loaded {} ({} streams, {}, flags 0x{:08x}, container #{})",
            path.display(),
            header.streams.len(),
            header.format,
            header.flags,
            self.loaded
        );

        Ok(FsbCollection {
            file: reader.into_inner().into_inner(),
            format: header.format,
            data_offset: header.data_offset,
            streams: header.streams,
        })
    }
}

/// Streams of one opened FSB5 file. The file is closed when this value is dropped.
#[derive(Debug)]
pub struct FsbCollection {
    file: File,
    format: AudioFormat,
    data_offset: u64,
    streams: Box<[StreamInfo]>,
}

impl StreamCollection for FsbCollection {
    type Stream<'a> = FsbStream<'a>;

    fn stream_count(&self) -> u32 {
        // the header parser counts streams with a u32
        u32::try_from(self.streams.len()).unwrap_or(u32::MAX)
    }

    fn stream(&mut self, index: u32) -> Result<Self::Stream<'_>, EngineError> {
        let info = self
            .streams
            .get(index as usize)
            .ok_or_else(|| EngineError::new(EngineErrorKind::StreamUnavailable { index }))?;

        if let Some(defect) = info.defect() {
            log::debug!("stream {index} is unavailable: {defect}");
            return Err(EngineError::new(EngineErrorKind::StreamUnavailable { index }));
        }

        let mut stream = FsbStream {
            file: &mut self.file,
            format: self.format,
            info,
            start: self.data_offset + u64::from(info.offset),
            position: 0,
        };

        stream
            .seek_to_start()
            .map_err(EngineError::factory(EngineErrorKind::StreamUnavailable { index }))?;

        Ok(stream)
    }
}

/// One stream of an [`FsbCollection`].
#[derive(Debug)]
pub struct FsbStream<'a> {
    file: &'a mut File,
    format: AudioFormat,
    info: &'a StreamInfo,
    start: u64,
    position: u64,
}

impl FsbStream<'_> {
    fn payload_size(&self) -> u64 {
        u64::from(self.info.size)
    }

    // Payloads are padded inside the bank, so PCM streams end after their last sample rather than
    // at the end of the payload.
    fn data_len(&self) -> u64 {
        match native_format(self.format) {
            (SampleFormat::Bitstream | SampleFormat::Unknown, _) => self.payload_size(),
            (_, bits) => {
                let samples = u64::from(self.info.samples);
                let bytes = samples * u64::from(self.info.channels.get()) * u64::from(bits / 8);
                // sample counts in damaged banks can point past the stored payload
                bytes.min(self.payload_size())
            }
        }
    }
}

fn native_format(format: AudioFormat) -> (SampleFormat, u16) {
    match format {
        AudioFormat::Pcm8 => (SampleFormat::Pcm8, 8),
        AudioFormat::Pcm16 => (SampleFormat::Pcm16, 16),
        AudioFormat::Pcm24 => (SampleFormat::Pcm24, 24),
        AudioFormat::Pcm32 => (SampleFormat::Pcm32, 32),
        AudioFormat::PcmFloat => (SampleFormat::PcmFloat, 32),
        AudioFormat::GcAdpcm
        | AudioFormat::ImaAdpcm
        | AudioFormat::Vag
        | AudioFormat::HeVag
        | AudioFormat::Xma
        | AudioFormat::Mpeg
        | AudioFormat::Celt
        | AudioFormat::Atrac9
        | AudioFormat::Xwma
        | AudioFormat::Vorbis
        | AudioFormat::FAdpcm
        | AudioFormat::Opus => (SampleFormat::Bitstream, 16),
        AudioFormat::Unknown(_) => (SampleFormat::Unknown, 16),
    }
}

impl StreamHandle for FsbStream<'_> {
    fn format(&self) -> Result<StreamFormat, EngineError> {
        let (sample_format, bits_per_sample) = native_format(self.format);

        Ok(StreamFormat {
            sample_format,
            channels: u16::from(self.info.channels.get()),
            bits_per_sample,
        })
    }

    fn defaults(&self) -> Result<Defaults, EngineError> {
        Ok(Defaults {
            frequency: f64::from(self.info.sample_rate.get()),
            priority: DEFAULT_PRIORITY,
        })
    }

    fn length(&self, unit: TimeUnit) -> Result<u64, EngineError> {
        match unit {
            TimeUnit::PcmBytes => Ok(self.data_len()),
            TimeUnit::Ms => Ok(u64::from(self.info.samples) * 1000
                / u64::from(self.info.sample_rate.get())),
        }
    }

    fn name(&self) -> Result<Option<String>, EngineError> {
        Ok(self.info.name.as_deref().map(str::to_owned))
    }

    fn seek_to_start(&mut self) -> Result<(), EngineError> {
        let _ = self
            .file
            .seek(SeekFrom::Start(self.start))
            .map_err(EngineError::factory(EngineErrorKind::Seek))?;
        self.position = 0;
        Ok(())
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, EngineError> {
        let remaining = self.data_len().saturating_sub(self.position);
        let wanted = buf
            .len()
            .min(usize::try_from(remaining).unwrap_or(usize::MAX));

        let mut filled = 0;

        while filled < wanted {
            match self.file.read(&mut buf[filled..wanted]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(EngineError::new_with_source(EngineErrorKind::Read, e)),
            }
        }

        self.position += filled as u64;
        Ok(filled)
    }
}

#[cfg(test)]
mod test {
    use super::FsbEngine;
    use crate::engine::{
        Engine, EngineErrorKind, SampleFormat, StreamCollection, StreamHandle, TimeUnit,
        REQUIRED_ENGINE_VERSION,
    };
    use std::io::Write;
    use tempfile::NamedTempFile;

    // version 1 bank with one 44.1 kHz stereo stream per payload, named after its position
    fn bank(format: u32, payloads: &[&[u8]], bytes_per_sample: u64) -> Vec<u8> {
        let mut headers = Vec::new();
        let mut names = Vec::new();
        let mut data = Vec::new();

        let names_start = payloads.len() * 4;
        let mut name_bytes = Vec::new();

        for (index, payload) in payloads.iter().enumerate() {
            let samples = payload.len() as u64 / (2 * bytes_per_sample);
            let mode = (samples << 34) | ((data.len() as u64 / 32) << 7) | (1 << 5) | (8 << 1);
            headers.extend_from_slice(&mode.to_le_bytes());

            names.extend_from_slice(&((names_start + name_bytes.len()) as u32).to_le_bytes());
            name_bytes.extend_from_slice(format!("track {index}\0").as_bytes());

            data.extend_from_slice(payload);
            data.resize((data.len() + 31) / 32 * 32, 0);
        }
        names.extend_from_slice(&name_bytes);

        let mut bank = Vec::new();
        bank.extend_from_slice(b"FSB5");
        bank.extend_from_slice(&1u32.to_le_bytes());
        bank.extend_from_slice(&(payloads.len() as u32).to_le_bytes());
        bank.extend_from_slice(&(headers.len() as u32).to_le_bytes());
        bank.extend_from_slice(&(names.len() as u32).to_le_bytes());
        bank.extend_from_slice(&(data.len() as u32).to_le_bytes());
        bank.extend_from_slice(&format.to_le_bytes());
        bank.resize(60, 0);
        bank.extend_from_slice(&headers);
        bank.extend_from_slice(&names);
        bank.extend_from_slice(&data);
        bank
    }

    // zeroes the sample count in the mode word of a stream made by `bank`
    fn clear_samples(bank: &mut [u8], stream: usize) {
        let at = 60 + stream * 8;
        let mode = u64::from_le_bytes(bank[at..at + 8].try_into().unwrap());
        bank[at..at + 8].copy_from_slice(&(mode & ((1 << 34) - 1)).to_le_bytes());
    }

    fn write_temp(data: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn report_supported_version() {
        assert!(FsbEngine::new().version() >= REQUIRED_ENGINE_VERSION);
    }

    #[test]
    fn read_pcm16_streams() {
        let first: Vec<u8> = (0..40).collect();
        let second: Vec<u8> = (100..108).collect();
        let file = write_temp(&bank(2, &[&first, &second], 2));

        let mut engine = FsbEngine::new();
        let mut collection = engine.load(file.path()).unwrap();
        assert_eq!(collection.stream_count(), 2);

        let mut stream = collection.stream(1).unwrap();
        let format = stream.format().unwrap();
        assert_eq!(format.sample_format, SampleFormat::Pcm16);
        assert_eq!(format.channels, 2);
        assert_eq!(format.bits_per_sample, 16);
        assert_eq!(stream.defaults().unwrap().frequency, 44100.0);
        assert_eq!(stream.length(TimeUnit::PcmBytes).unwrap(), 8);
        assert_eq!(stream.length(TimeUnit::Ms).unwrap(), 0);
        assert_eq!(stream.name().unwrap().as_deref(), Some("track 1"));

        let mut buf = [0; 16];
        assert_eq!(stream.read_chunk(&mut buf).unwrap(), 8);
        assert_eq!(&buf[..8], second.as_slice());
        assert_eq!(stream.read_chunk(&mut buf).unwrap(), 0);

        drop(stream);

        let mut stream = collection.stream(0).unwrap();
        let mut buf = [0; 16];
        assert_eq!(stream.read_chunk(&mut buf).unwrap(), 16);
        assert_eq!(buf.as_slice(), &first[..16]);

        stream.seek_to_start().unwrap();
        assert_eq!(stream.read_chunk(&mut buf[..4]).unwrap(), 4);
        assert_eq!(&buf[..4], &first[..4]);
    }

    #[test]
    fn expose_compressed_streams_as_bitstream() {
        let payload = [0x4F; 50];
        let file = write_temp(&bank(15, &[&payload], 2));

        let mut collection = FsbEngine::new().load(file.path()).unwrap();
        let mut stream = collection.stream(0).unwrap();

        let format = stream.format().unwrap();
        assert_eq!(format.sample_format, SampleFormat::Bitstream);
        assert_eq!(format.bits_per_sample, 16);

        // payloads are padded to 32 bytes inside the bank
        assert_eq!(stream.length(TimeUnit::PcmBytes).unwrap(), 64);

        let mut buf = vec![0; 4096];
        assert_eq!(stream.read_chunk(&mut buf).unwrap(), 64);
        assert_eq!(&buf[..50], payload.as_slice());
    }

    #[test]
    fn refuse_streams_without_samples() {
        let first: Vec<u8> = (0..32).collect();
        let second: Vec<u8> = (32..64).collect();
        let mut data = bank(2, &[&first, &second], 2);
        clear_samples(&mut data, 1);
        let file = write_temp(&data);

        let mut collection = FsbEngine::new().load(file.path()).unwrap();
        assert_eq!(collection.stream_count(), 2);
        assert!(collection
            .stream(1)
            .is_err_and(|e| e.kind() == EngineErrorKind::StreamUnavailable { index: 1 }));

        let mut stream = collection.stream(0).unwrap();
        let mut buf = [0; 64];
        assert_eq!(stream.read_chunk(&mut buf).unwrap(), 32);
        assert_eq!(&buf[..32], first.as_slice());
    }

    #[test]
    fn expose_unknown_codecs_undecoded() {
        let payload = [0x5A; 40];
        let file = write_temp(&bank(18, &[&payload], 2));

        let mut collection = FsbEngine::new().load(file.path()).unwrap();
        let mut stream = collection.stream(0).unwrap();

        let format = stream.format().unwrap();
        assert_eq!(format.sample_format, SampleFormat::Unknown);
        assert_eq!(format.bits_per_sample, 16);
        assert_eq!(stream.length(TimeUnit::PcmBytes).unwrap(), 64);

        let mut buf = vec![0; 4096];
        assert_eq!(stream.read_chunk(&mut buf).unwrap(), 64);
        assert_eq!(&buf[..40], payload.as_slice());
    }

    #[test]
    fn accept_bank_without_streams() {
        let file = write_temp(&bank(2, &[], 2));
        let mut collection = FsbEngine::new().load(file.path()).unwrap();

        assert_eq!(collection.stream_count(), 0);
        assert!(collection
            .stream(0)
            .is_err_and(|e| e.kind() == EngineErrorKind::StreamUnavailable { index: 0 }));
    }

    #[test]
    fn reject_unreadable_containers() {
        let file = write_temp(b"RIFF\x00\x00\x00\x00WAVE");
        assert!(FsbEngine::new()
            .load(file.path())
            .is_err_and(|e| e.kind() == EngineErrorKind::UnreadableContainer));

        let dir = tempfile::tempdir().unwrap();
        assert!(FsbEngine::new()
            .load(&dir.path().join("missing.fsb"))
            .is_err_and(|e| e.kind() == EngineErrorKind::UnreadableContainer));
    }
}
