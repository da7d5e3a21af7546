//! Metadata of one stream, gathered from the engine before its samples are copied.

use crate::diag::DiagnosticLog;
use crate::engine::{EngineError, EngineErrorKind, StreamFormat, StreamHandle, TimeUnit};

/// Sample rate used when the engine reports no usable default frequency.
pub const FALLBACK_SAMPLE_RATE: u32 = 44100;

/// Everything the pipeline needs to know about a stream to write it out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamDescriptor {
    /// Position of the stream in its container.
    pub index: u32,
    /// Sample format, channels and bits per sample.
    pub format: StreamFormat,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Length of the sample data in bytes.
    pub byte_len: u64,
    /// Length of the stream in milliseconds.
    pub duration_ms: u64,
    /// Name of the stream, if it has a non-empty one.
    pub name: Option<String>,
}

/// Queries the engine for the metadata of `stream`.
///
/// Failing to read the name is not an error: it is recorded in `log` and the descriptor has no name.
///
/// # Errors
/// Returns an error if the format, default frequency or lengths cannot be read.
pub fn read_descriptor<S: StreamHandle + ?Sized>(
    stream: &S,
    index: u32,
    log: &mut DiagnosticLog,
) -> Result<StreamDescriptor, EngineError> {
    let scope = format!("stream {index}");

    log.info(&scope, "reading sample format");
    let format = stream.format().map_err(|e| {
        log.error(&scope, &e);
        e
    })?;
    log.info(
        &scope,
        format_args!(
            "format {}, {} channels, {} bits per sample",
            format.sample_format, format.channels, format.bits_per_sample
        ),
    );

    let defaults = stream.defaults().map_err(|e| {
        log.error(&scope, &e);
        e
    })?;
    let sample_rate = resolve_sample_rate(defaults.frequency);
    log.info(
        &scope,
        format_args!(
            "default frequency {} Hz (priority {}), using {sample_rate} Hz",
            defaults.frequency, defaults.priority
        ),
    );

    let byte_len = stream.length(TimeUnit::PcmBytes).map_err(|e| {
        log.error(&scope, format_args!("length in bytes: {e}"));
        e
    })?;
    log.info(&scope, format_args!("length {byte_len} bytes"));

    let duration_ms = stream.length(TimeUnit::Ms).map_err(|e| {
        log.error(&scope, format_args!("length in milliseconds: {e}"));
        e
    })?;
    log.info(&scope, format_args!("length {duration_ms} ms"));

    let name = match stream.name() {
        Ok(name) => name.filter(|name| !name.is_empty()),
        Err(e) if e.kind() == EngineErrorKind::NameTagNotFound => {
            log.info(&scope, "stream has no name tag");
            None
        }
        Err(e) => {
            log.warning(&scope, format_args!("{e}, continuing without a name"));
            None
        }
    };

    if let Some(name) = &name {
        log.info(&scope, format_args!("name \"{name}\""));
    }

    Ok(StreamDescriptor {
        index,
        format,
        sample_rate,
        byte_len,
        duration_ms,
        name,
    })
}

/// Rounds a default frequency to whole Hz, falling back to [`FALLBACK_SAMPLE_RATE`] if it is not
/// positive. Frequencies beyond `u32::MAX` saturate.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn resolve_sample_rate(frequency: f64) -> u32 {
    let rounded = frequency.round();

    if rounded >= 1.0 {
        rounded as u32
    } else {
        FALLBACK_SAMPLE_RATE
    }
}
