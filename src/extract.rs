//! The extraction pipeline: containers in, one WAV file per stream out.

use crate::bank::{extract_sub_containers, RegionFailure};
use crate::config::{file_stem, Config};
use crate::descriptor::{read_descriptor, StreamDescriptor};
use crate::diag::DiagnosticLog;
use crate::engine::{Engine, EngineError, StreamCollection, REQUIRED_ENGINE_VERSION};
use crate::error::{ExtractError, ExtractErrorKind, StreamFailure, StreamFailureKind};
use crate::sanitize::sanitize_file_name;
use crate::transcribe::{transcribe, SampleLayout};
use crate::wav::WavHeader;
use std::{
    collections::HashSet,
    fs::{self, File},
    io::{BufWriter, Error as IoError, ErrorKind},
    path::{Path, PathBuf},
};

const CONTAINER_SCOPE: &str = "container";

/// Progress notification emitted while a run is in progress.
#[derive(Clone, Copy, Debug)]
pub enum Event<'a> {
    /// An embedded bank was found but could not be copied out.
    RegionSkipped(&'a RegionFailure),
    /// A `.bank` file contained no embedded banks.
    NoEmbeddedBanks {
        /// Path of the `.bank` file.
        bank: &'a Path,
    },
    /// Processing of a container started.
    ContainerStart {
        /// File name of the container.
        name: &'a str,
    },
    /// A container could not be opened. None of its streams are extracted.
    ContainerUnreadable {
        /// File name of the container.
        name: &'a str,
        /// Why the container could not be opened.
        error: &'a EngineError,
    },
    /// A container has no streams.
    NoStreams {
        /// File name of the container.
        name: &'a str,
    },
    /// An output directory was created.
    DirectoryCreated {
        /// Path of the new directory.
        path: &'a Path,
    },
    /// An output directory could not be created, so files are written to `fallback` instead.
    DirectoryFallback {
        /// Directory that could not be created.
        path: &'a Path,
        /// Directory used instead.
        fallback: &'a Path,
        /// Why the directory could not be created.
        error: &'a IoError,
    },
    /// A diagnostic log file was opened.
    LogFile {
        /// Path of the log file.
        path: &'a Path,
    },
    /// A diagnostic log file could not be opened. The container is processed without one.
    LogFileFailed {
        /// Path of the log file.
        path: &'a Path,
        /// Why the file could not be opened.
        error: &'a IoError,
    },
    /// Extraction of a stream started.
    StreamStart {
        /// Metadata of the stream.
        descriptor: &'a StreamDescriptor,
        /// Number of streams in the container.
        stream_count: u32,
    },
    /// A stream was written out completely.
    StreamWritten {
        /// Index of the stream within its container.
        index: u32,
        /// Path of the output file.
        path: &'a Path,
        /// Number of sample bytes written after the header.
        data_size: u64,
    },
    /// A stream could not be written out.
    StreamFailed(&'a StreamFailure),
    /// Processing of a container finished.
    ContainerEnd(&'a ContainerReport),
    /// A temporary copy of an embedded bank could not be deleted.
    TempCleanupFailed {
        /// Path of the temporary file.
        path: &'a Path,
        /// Why the file could not be deleted.
        error: &'a IoError,
    },
}

/// Outcome of processing one container.
#[derive(Debug)]
pub struct ContainerReport {
    /// File name of the container.
    pub name: String,
    /// Directory the container's streams were written to, if it had any.
    pub output_dir: Option<PathBuf>,
    /// Diagnostic log written for the container, in verbose runs.
    pub log_file: Option<PathBuf>,
    /// Number of streams in the container.
    pub stream_count: u32,
    /// Number of streams written out completely.
    pub streams_written: u32,
    /// Streams that could not be written out.
    pub failures: Vec<StreamFailure>,
    /// Why the container could not be opened, if it could not.
    pub error: Option<EngineError>,
}

impl ContainerReport {
    fn new(name: String) -> Self {
        Self {
            name,
            output_dir: None,
            log_file: None,
            stream_count: 0,
            streams_written: 0,
            failures: Vec::new(),
            error: None,
        }
    }

    /// Whether the container was opened and all of its streams were written out.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.failures.is_empty()
    }
}

/// Outcome of a whole run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// One report per processed container, in processing order.
    pub containers: Vec<ContainerReport>,
    /// Number of embedded banks that were found but could not be copied out.
    pub skipped_regions: usize,
}

impl RunSummary {
    /// Total number of streams written out.
    #[must_use]
    pub fn streams_written(&self) -> u64 {
        self.containers
            .iter()
            .map(|report| u64::from(report.streams_written))
            .sum()
    }

    /// Total number of streams that could not be written out.
    #[must_use]
    pub fn streams_failed(&self) -> usize {
        self.containers
            .iter()
            .map(|report| report.failures.len())
            .sum()
    }

    /// Whether there were containers but none of them could be opened.
    #[must_use]
    pub fn is_total_failure(&self) -> bool {
        !self.containers.is_empty() && self.containers.iter().all(|report| report.error.is_some())
    }
}

/// Drives an [`Engine`] over the containers named by a [`Config`].
#[derive(Debug)]
pub struct Extractor<E> {
    engine: E,
}

impl<E: Engine> Extractor<E> {
    /// Wraps `engine`, checking that it is recent enough.
    ///
    /// # Errors
    /// Returns an [`EngineUnavailable`](ExtractErrorKind::EngineUnavailable) error if the engine
    /// is older than [`REQUIRED_ENGINE_VERSION`].
    pub fn new(engine: E) -> Result<Self, ExtractError> {
        let found = engine.version();

        if found < REQUIRED_ENGINE_VERSION {
            return Err(ExtractError::new(ExtractErrorKind::EngineUnavailable {
                found,
                required: REQUIRED_ENGINE_VERSION,
            }));
        }

        log::debug!("using decoding engine version {found}");
        Ok(Self { engine })
    }

    /// Extracts every stream of the input into WAV files, reporting progress to `observer`.
    ///
    /// Failures of single streams or containers are recorded in the returned summary and do not
    /// stop the run. Temporary copies of embedded banks are deleted before returning.
    ///
    /// # Errors
    /// Returns an error if the input file is missing or a `.bank` input cannot be opened.
    pub fn run<F>(&mut self, config: &Config, mut observer: F) -> Result<RunSummary, ExtractError>
    where
        F: FnMut(Event<'_>),
    {
        let input = config.input();
        if !input.is_file() {
            return Err(ExtractError::new(ExtractErrorKind::MissingInput {
                path: input.to_owned(),
            }));
        }

        let mut summary = RunSummary::default();

        if !config.is_bank() {
            let report = self.process_container(input, config, &mut observer);
            summary.containers.push(report);
            return Ok(summary);
        }

        let extraction = extract_sub_containers(input, config.temp_dir())
            .map_err(|e| ExtractError::new_with_source(ExtractErrorKind::Bank, e))?;

        for failure in &extraction.failures {
            observer(Event::RegionSkipped(failure));
        }
        summary.skipped_regions = extraction.failures.len();

        if extraction.containers.is_empty() {
            observer(Event::NoEmbeddedBanks { bank: input });
        }

        for container in &extraction.containers {
            let header = container.header();
            log::debug!(
                "embedded bank at byte {} of {}: version {}, {} streams, {} bytes",
                container.offset(),
                input.display(),
                header.version,
                header.stream_count,
                header.total_len()
            );

            let report = self.process_container(container.path(), config, &mut observer);
            summary.containers.push(report);
        }

        for container in extraction.containers {
            let path = container.path().to_owned();

            if let Err(error) = container.remove() {
                observer(Event::TempCleanupFailed {
                    path: &path,
                    error: &error,
                });
            }
        }

        Ok(summary)
    }

    fn process_container(
        &mut self,
        path: &Path,
        config: &Config,
        observer: &mut dyn FnMut(Event<'_>),
    ) -> ContainerReport {
        let name = path.file_name().map_or_else(
            || path.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        );
        let stem = file_stem(path);
        let mut report = ContainerReport::new(name);

        observer(Event::ContainerStart { name: &report.name });

        let mut collection = match self.engine.load(path) {
            Ok(collection) => collection,
            Err(error) => {
                log::error!("failed to open {}: {error}", path.display());
                observer(Event::ContainerUnreadable {
                    name: &report.name,
                    error: &error,
                });
                report.error = Some(error);
                observer(Event::ContainerEnd(&report));
                return report;
            }
        };

        report.stream_count = collection.stream_count();

        if report.stream_count == 0 {
            observer(Event::NoStreams { name: &report.name });
            observer(Event::ContainerEnd(&report));
            return report;
        }

        let output_dir = prepare_output_dir(config.output_root(), &stem, observer);
        let mut log = open_log(&output_dir, &stem, config.verbose(), observer);

        log.info(
            CONTAINER_SCOPE,
            format_args!(
                "processing {} ({} streams)",
                path.display(),
                report.stream_count
            ),
        );

        let mut names = OutputNames::new(&output_dir, &stem);

        for index in 0..report.stream_count {
            let outcome = write_stream(
                &mut collection,
                index,
                report.stream_count,
                &mut names,
                &mut log,
                observer,
            );

            match outcome {
                Ok((path, data_size)) => {
                    report.streams_written += 1;
                    observer(Event::StreamWritten {
                        index,
                        path: &path,
                        data_size,
                    });
                }
                Err(failure) => {
                    log.error(&format!("stream {index}"), &failure);
                    observer(Event::StreamFailed(&failure));
                    report.failures.push(failure);
                }
            }

            log.separator();
        }

        log.info(
            CONTAINER_SCOPE,
            format_args!(
                "finished: {} of {} streams written",
                report.streams_written, report.stream_count
            ),
        );

        report.output_dir = Some(output_dir);
        report.log_file = log.path().map(Path::to_owned);
        observer(Event::ContainerEnd(&report));
        report
    }
}

// Falls back to `root` if the directory cannot be created. An existing directory is reused.
fn prepare_output_dir(root: &Path, stem: &str, observer: &mut dyn FnMut(Event<'_>)) -> PathBuf {
    let dir = root.join(stem);

    match fs::create_dir_all(root).and_then(|()| fs::create_dir(&dir)) {
        Ok(()) => {
            observer(Event::DirectoryCreated { path: &dir });
            dir
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists && dir.is_dir() => dir,
        Err(error) => {
            log::warn!("failed to create {}: {error}", dir.display());
            observer(Event::DirectoryFallback {
                path: &dir,
                fallback: root,
                error: &error,
            });
            root.to_owned()
        }
    }
}

fn open_log(
    dir: &Path,
    stem: &str,
    verbose: bool,
    observer: &mut dyn FnMut(Event<'_>),
) -> DiagnosticLog {
    if !verbose {
        return DiagnosticLog::disabled();
    }

    let path = dir.join(format!("_{stem}.log"));

    match DiagnosticLog::create(&path) {
        Ok(log) => {
            observer(Event::LogFile { path: &path });
            log
        }
        Err(error) => {
            observer(Event::LogFileFailed {
                path: &path,
                error: &error,
            });
            DiagnosticLog::disabled()
        }
    }
}

/// File name for a stream: its name if it has one, otherwise `<stem>_<index>`.
#[must_use]
pub fn output_file_name(name: Option<&str>, stem: &str, index: u32) -> String {
    let base = match name {
        Some(name) if !name.is_empty() => sanitize_file_name(name),
        _ => sanitize_file_name(&format!("{stem}_{index}")),
    };

    format!("{base}.wav")
}

// Output paths handed out within one container. Streams sharing a name would overwrite each other,
// so a repeated name gets the stream index appended. Names are compared ignoring case since the
// output may land on a case-insensitive file system.
struct OutputNames<'a> {
    dir: &'a Path,
    stem: &'a str,
    claimed: HashSet<String>,
}

impl<'a> OutputNames<'a> {
    fn new(dir: &'a Path, stem: &'a str) -> Self {
        Self {
            dir,
            stem,
            claimed: HashSet::new(),
        }
    }

    fn claim(&mut self, name: Option<&str>, index: u32) -> (PathBuf, Option<String>) {
        let wanted = output_file_name(name, self.stem, index);
        let base = wanted.strip_suffix(".wav").unwrap_or(&wanted);

        let mut file_name = wanted.clone();
        let mut attempt = 1;
        while !self.claimed.insert(file_name.to_lowercase()) {
            file_name = match attempt {
                1 => format!("{base}_{index}.wav"),
                n => format!("{base}_{index}_{n}.wav"),
            };
            attempt += 1;
        }

        let renamed_from = (file_name != wanted).then_some(wanted);
        (self.dir.join(file_name), renamed_from)
    }
}

// Returns the output path and the number of sample bytes written.
fn write_stream<C: StreamCollection>(
    collection: &mut C,
    index: u32,
    stream_count: u32,
    names: &mut OutputNames<'_>,
    log: &mut DiagnosticLog,
    observer: &mut dyn FnMut(Event<'_>),
) -> Result<(PathBuf, u64), StreamFailure> {
    let scope = format!("stream {index}");

    log.info(&scope, format_args!("acquiring stream {} of {stream_count}", index + 1));
    let mut stream = collection
        .stream(index)
        .map_err(StreamFailure::engine_factory(index, StreamFailureKind::Unavailable))?;

    let descriptor = read_descriptor(&stream, index, log)
        .map_err(StreamFailure::engine_factory(index, StreamFailureKind::Metadata))?;

    observer(Event::StreamStart {
        descriptor: &descriptor,
        stream_count,
    });

    let layout = SampleLayout::for_format(descriptor.format.sample_format);
    if layout == SampleLayout::Fallback16 {
        log.warning(
            &scope,
            format_args!(
                "{} data has no dedicated layout, writing it unchanged as 16-bit PCM",
                descriptor.format.sample_format
            ),
        );
    }

    let data_size = layout.data_size(descriptor.byte_len);
    let header = WavHeader::new(
        layout,
        descriptor.format.channels,
        descriptor.sample_rate,
        data_size,
    )
    .map_err(StreamFailure::wav_factory(index))?;

    let (path, renamed_from) = names.claim(descriptor.name.as_deref(), index);
    if let Some(wanted) = renamed_from {
        log.warning(
            &scope,
            format_args!("{wanted} is taken by an earlier stream, renamed to avoid overwriting it"),
        );
    }
    log.info(&scope, format_args!("writing {}", path.display()));

    let mut sink = File::create(&path)
        .map(BufWriter::new)
        .map_err(StreamFailure::io_factory(index, StreamFailureKind::CreateOutput))?;

    header
        .write(&mut sink)
        .map_err(StreamFailure::wav_factory(index))?;

    let transcribed = transcribe(&mut stream, layout, descriptor.byte_len, &mut sink, log, &scope)
        .map_err(StreamFailure::transcribe_factory(index))?;

    let _file = sink.into_inner().map_err(|e| {
        StreamFailure::io_factory(index, StreamFailureKind::Flush)(e.into_error())
    })?;

    Ok((path, transcribed.bytes_written))
}

#[cfg(test)]
mod test {
    use super::{output_file_name, Event, Extractor, OutputNames, RunSummary};
    use crate::config::{Config, OutputLocation};
    use crate::engine::{
        Defaults, Engine, EngineError, EngineErrorKind, SampleFormat, StreamCollection,
        StreamFormat, StreamHandle, TimeUnit, Version,
    };
    use crate::error::{ExtractErrorKind, StreamFailureKind};
    use std::{fs, path::Path};

    #[derive(Clone)]
    struct FakeTrack {
        name: Option<&'static str>,
        format: SampleFormat,
        data: Vec<u8>,
        available: bool,
    }

    struct FakeEngine {
        version: Version,
        tracks: Vec<FakeTrack>,
        readable: bool,
    }

    struct FakeCollection {
        tracks: Vec<FakeTrack>,
    }

    struct FakeStream<'a> {
        track: &'a FakeTrack,
        position: usize,
    }

    impl Engine for FakeEngine {
        type Collection = FakeCollection;

        fn version(&self) -> Version {
            self.version
        }

        fn load(&mut self, _path: &Path) -> Result<FakeCollection, EngineError> {
            if self.readable {
                Ok(FakeCollection {
                    tracks: self.tracks.clone(),
                })
            } else {
                Err(EngineError::new(EngineErrorKind::UnreadableContainer))
            }
        }
    }

    impl StreamCollection for FakeCollection {
        type Stream<'a> = FakeStream<'a>;

        fn stream_count(&self) -> u32 {
            self.tracks.len() as u32
        }

        fn stream(&mut self, index: u32) -> Result<FakeStream<'_>, EngineError> {
            match self.tracks.get(index as usize) {
                Some(track) if track.available => Ok(FakeStream { track, position: 0 }),
                _ => Err(EngineError::new(EngineErrorKind::StreamUnavailable { index })),
            }
        }
    }

    impl StreamHandle for FakeStream<'_> {
        fn format(&self) -> Result<StreamFormat, EngineError> {
            Ok(StreamFormat {
                sample_format: self.track.format,
                channels: 1,
                bits_per_sample: 16,
            })
        }

        fn defaults(&self) -> Result<Defaults, EngineError> {
            Ok(Defaults {
                frequency: 22050.0,
                priority: 128,
            })
        }

        fn length(&self, unit: TimeUnit) -> Result<u64, EngineError> {
            Ok(match unit {
                TimeUnit::PcmBytes => self.track.data.len() as u64,
                TimeUnit::Ms => 1,
            })
        }

        fn name(&self) -> Result<Option<String>, EngineError> {
            Ok(self.track.name.map(str::to_owned))
        }

        fn seek_to_start(&mut self) -> Result<(), EngineError> {
            self.position = 0;
            Ok(())
        }

        fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, EngineError> {
            let rest = &self.track.data[self.position..];
            let n = rest.len().min(buf.len());
            buf[..n].copy_from_slice(&rest[..n]);
            self.position += n;
            Ok(n)
        }
    }

    fn track(name: Option<&'static str>, data: Vec<u8>) -> FakeTrack {
        FakeTrack {
            name,
            format: SampleFormat::Pcm16,
            data,
            available: true,
        }
    }

    fn engine(tracks: Vec<FakeTrack>) -> FakeEngine {
        FakeEngine {
            version: Version::new(5, 0),
            tracks,
            readable: true,
        }
    }

    fn run(engine: FakeEngine, input: &Path, out: &Path) -> (RunSummary, Vec<String>) {
        let config = Config::builder(input)
            .output(OutputLocation::Custom(out.to_owned()))
            .build()
            .unwrap();

        let mut events = Vec::new();
        let summary = Extractor::new(engine)
            .unwrap()
            .run(&config, |event| {
                events.push(match event {
                    Event::ContainerStart { .. } => "start".to_owned(),
                    Event::ContainerEnd(_) => "end".to_owned(),
                    Event::StreamWritten { index, .. } => format!("written {index}"),
                    Event::StreamFailed(failure) => format!("failed {}", failure.index()),
                    Event::NoStreams { .. } => "no streams".to_owned(),
                    Event::ContainerUnreadable { .. } => "unreadable".to_owned(),
                    other => format!("{other:?}").split([' ', '(']).next().unwrap().to_owned(),
                });
            })
            .unwrap();

        (summary, events)
    }

    #[test]
    fn name_output_files() {
        assert_eq!(output_file_name(Some("boss theme"), "music", 0), "boss theme.wav");
        assert_eq!(output_file_name(Some("a:b"), "music", 0), "a：b.wav");
        assert_eq!(output_file_name(None, "music", 4), "music_4.wav");
        assert_eq!(output_file_name(Some(""), "music", 2), "music_2.wav");
    }

    #[test]
    fn keep_repeated_names_apart() {
        let dir = Path::new("out");
        let mut names = OutputNames::new(dir, "music");

        assert_eq!(names.claim(Some("same"), 0), (dir.join("same.wav"), None));
        assert_eq!(
            names.claim(Some("same"), 1),
            (dir.join("same_1.wav"), Some("same.wav".to_owned()))
        );
        assert_eq!(
            names.claim(Some("SAME"), 2),
            (dir.join("SAME_2.wav"), Some("SAME.wav".to_owned()))
        );
        // an unnamed stream whose fallback name is already taken
        assert_eq!(names.claim(Some("music_3"), 3), (dir.join("music_3.wav"), None));
        assert_eq!(
            names.claim(None, 3),
            (dir.join("music_3_3.wav"), Some("music_3.wav".to_owned()))
        );
        assert_eq!(
            names.claim(None, 3),
            (dir.join("music_3_3_2.wav"), Some("music_3.wav".to_owned()))
        );
    }

    #[test]
    fn write_streams_with_repeated_names_to_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("voice.fsb");
        fs::write(&input, b"").unwrap();

        let engine = engine(vec![
            track(Some("same"), vec![1, 0]),
            track(Some("same"), vec![2, 0]),
        ]);
        let (summary, _) = run(engine, &input, dir.path());

        assert_eq!(summary.streams_written(), 2);

        let out = dir.path().join("voice");
        assert_eq!(&fs::read(out.join("same.wav")).unwrap()[44..], [1, 0]);
        assert_eq!(&fs::read(out.join("same_1.wav")).unwrap()[44..], [2, 0]);
    }

    #[test]
    fn reject_old_engines() {
        let mut old = engine(Vec::new());
        old.version = Version::new(4, 44);

        assert!(Extractor::new(old).is_err_and(|e| matches!(
            e.kind(),
            ExtractErrorKind::EngineUnavailable { found, .. } if *found == Version::new(4, 44)
        )));
    }

    #[test]
    fn write_one_file_per_stream() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("music.fsb");
        fs::write(&input, b"").unwrap();

        let engine = engine(vec![
            track(Some("intro"), vec![1, 0, 2, 0]),
            track(None, vec![3, 0]),
        ]);
        let (summary, events) = run(engine, &input, dir.path());

        assert_eq!(summary.containers.len(), 1);
        assert_eq!(summary.streams_written(), 2);
        assert!(summary.containers[0].is_complete());
        assert_eq!(
            summary.containers[0].output_dir.as_deref(),
            Some(dir.path().join("music").as_path())
        );
        assert_eq!(
            events,
            ["start", "DirectoryCreated", "StreamStart", "written 0", "StreamStart", "written 1", "end"]
        );

        let intro = fs::read(dir.path().join("music").join("intro.wav")).unwrap();
        assert_eq!(intro.len(), 44 + 4);
        assert_eq!(&intro[44..], [1, 0, 2, 0]);
        assert!(dir.path().join("music").join("music_1.wav").is_file());
    }

    #[test]
    fn continue_after_stream_failures() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("sfx.fsb");
        fs::write(&input, b"").unwrap();

        let mut broken = track(Some("broken"), vec![0; 8]);
        broken.available = false;
        let engine = engine(vec![broken, track(Some("ok"), vec![0; 8])]);
        let (summary, events) = run(engine, &input, dir.path());

        let report = &summary.containers[0];
        assert!(!report.is_complete());
        assert_eq!(report.streams_written, 1);
        assert_eq!(report.failures[0].kind(), StreamFailureKind::Unavailable);
        assert!(events.contains(&"failed 0".to_owned()));
        assert!(events.contains(&"written 1".to_owned()));
        assert!(!summary.is_total_failure());
    }

    #[test]
    fn report_empty_and_unreadable_containers() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("empty.fsb");
        fs::write(&input, b"").unwrap();

        let (summary, events) = run(engine(Vec::new()), &input, dir.path());
        assert_eq!(events, ["start", "no streams", "end"]);
        assert_eq!(summary.streams_written(), 0);
        assert!(!dir.path().join("empty").exists());

        let mut unreadable = engine(Vec::new());
        unreadable.readable = false;
        let (summary, events) = run(unreadable, &input, dir.path());
        assert_eq!(events, ["start", "unreadable", "end"]);
        assert!(summary.is_total_failure());
    }

    #[test]
    fn reuse_existing_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("music.fsb");
        fs::write(&input, b"").unwrap();
        fs::create_dir(dir.path().join("music")).unwrap();

        let (summary, events) = run(engine(vec![track(None, vec![0; 2])]), &input, dir.path());

        assert_eq!(summary.streams_written(), 1);
        assert!(!events.contains(&"DirectoryCreated".to_owned()));
        assert!(dir.path().join("music").join("music_0.wav").is_file());
    }
}
