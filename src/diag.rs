//! Per-container diagnostic log file.

use chrono::Local;
use log::Level;
use std::{
    fmt::Display,
    fs::File,
    io::{BufWriter, Error as IoError, Write},
    path::{Path, PathBuf},
};

/// Timestamped, leveled trace of the extraction of one container.
///
/// Every record is also forwarded to the [`log`] facade. A disabled log only does the latter.
#[derive(Debug)]
pub struct DiagnosticLog {
    sink: Option<Sink>,
}

#[derive(Debug)]
struct Sink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl DiagnosticLog {
    /// Creates a log that writes nothing to disk.
    #[must_use]
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Creates (or truncates) the log file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create(path: &Path) -> Result<Self, IoError> {
        let writer = BufWriter::new(File::create(path)?);

        Ok(Self {
            sink: Some(Sink {
                path: path.to_owned(),
                writer,
            }),
        })
    }

    /// Path of the log file, if enabled.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.sink.as_ref().map(|sink| sink.path.as_path())
    }

    /// Writes one record.
    pub fn record(&mut self, level: Level, scope: &str, message: impl Display) {
        let message = message.to_string();
        log::log!(level, "[{scope}] {message}");

        if let Some(sink) = &mut self.sink {
            let line = format_line(
                &Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                level,
                scope,
                &message,
            );

            if let Err(e) = writeln!(sink.writer, "{line}") {
                log::warn!(
                    "failed to write to {}, disabling diagnostic log: {e}",
                    sink.path.display()
                );
                self.sink = None;
            }
        }
    }

    /// Writes an `INFO` record.
    pub fn info(&mut self, scope: &str, message: impl Display) {
        self.record(Level::Info, scope, message);
    }

    /// Writes a `WARNING` record.
    pub fn warning(&mut self, scope: &str, message: impl Display) {
        self.record(Level::Warn, scope, message);
    }

    /// Writes an `ERROR` record.
    pub fn error(&mut self, scope: &str, message: impl Display) {
        self.record(Level::Error, scope, message);
    }

    /// Writes an empty separator line.
    pub fn separator(&mut self) {
        if let Some(sink) = &mut self.sink {
            if let Err(e) = writeln!(sink.writer) {
                log::warn!("failed to write to {}: {e}", sink.path.display());
            }
        }
    }

    /// Flushes buffered records to disk.
    ///
    /// # Errors
    /// Returns an error if buffered records cannot be written.
    pub fn flush(&mut self) -> Result<(), IoError> {
        match &mut self.sink {
            Some(sink) => sink.writer.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for DiagnosticLog {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::warn!("failed to flush diagnostic log: {e}");
        }
    }
}

fn level_name(level: Level) -> &'static str {
    match level {
        Level::Warn => "WARNING",
        level => level.as_str(),
    }
}

fn format_line(timestamp: &impl Display, level: Level, scope: &str, message: &str) -> String {
    format!("[{timestamp}] [{}] [{scope}] {message}", level_name(level))
}
