//! Run configuration: which file to read, where to write, and how much to log.

use std::{
    env,
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    io::Error as IoError,
    path::{Path, PathBuf},
};

/// Where output directories are created.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputLocation {
    /// Next to the input file.
    #[default]
    Resource,
    /// Next to the running executable.
    Executable,
    /// In the given directory.
    Custom(PathBuf),
}

/// Settings for one extraction run. Created with [`Config::builder`].
#[derive(Clone, Debug)]
pub struct Config {
    input: PathBuf,
    output_root: PathBuf,
    temp_dir: PathBuf,
    verbose: bool,
}

impl Config {
    /// Starts configuring a run over the file at `input`.
    pub fn builder(input: impl Into<PathBuf>) -> ConfigBuilder {
        ConfigBuilder {
            input: input.into(),
            output: OutputLocation::default(),
            temp_dir: None,
            verbose: false,
        }
    }

    /// The file to extract from.
    #[must_use]
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// Directory under which one output directory per container is created.
    #[must_use]
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Directory for the temporary copies of embedded banks.
    #[must_use]
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Whether a diagnostic log file is written for every container.
    #[must_use]
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Whether the input is a Studio `.bank` file rather than a plain FSB5 bank.
    #[must_use]
    pub fn is_bank(&self) -> bool {
        is_bank(&self.input)
    }
}

/// Builder for [`Config`].
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    input: PathBuf,
    output: OutputLocation,
    temp_dir: Option<PathBuf>,
    verbose: bool,
}

impl ConfigBuilder {
    /// Sets where output directories are created. Defaults to [`OutputLocation::Resource`].
    #[must_use]
    pub fn output(mut self, output: OutputLocation) -> Self {
        self.output = output;
        self
    }

    /// Sets the directory for temporary files. Defaults to the system's temporary directory.
    #[must_use]
    pub fn temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(temp_dir.into());
        self
    }

    /// Enables or disables the diagnostic log files.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Checks the input and resolves the output root.
    ///
    /// # Errors
    /// Returns an error if the input is not an existing file, or if the executable's directory is
    /// requested but cannot be determined.
    pub fn build(self) -> Result<Config, ConfigError> {
        if !self.input.is_file() {
            return Err(ConfigError::new(ConfigErrorKind::MissingInput {
                path: self.input,
            }));
        }

        let output_root = match self.output {
            OutputLocation::Resource => resource_dir(&self.input),
            OutputLocation::Executable => env::current_exe()
                .map_err(|e| ConfigError::new_with_source(ConfigErrorKind::Executable, e))?
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| ConfigError::new(ConfigErrorKind::Executable))?,
            OutputLocation::Custom(path) => path,
        };

        Ok(Config {
            input: self.input,
            output_root,
            temp_dir: self.temp_dir.unwrap_or_else(env::temp_dir),
            verbose: self.verbose,
        })
    }
}

// a bare file name has an empty parent
fn resource_dir(input: &Path) -> PathBuf {
    match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Whether `path` has a `.bank` extension, ignoring case.
#[must_use]
pub fn is_bank(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("bank"))
}

/// File name of `path` without its extension, used to name everything derived from it.
pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "bank".to_owned())
}

/// Error raised while building a [`Config`].
#[derive(Debug)]
pub struct ConfigError {
    kind: ConfigErrorKind,
    source: Option<IoError>,
}

/// What went wrong while building a [`Config`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// The input is not an existing file.
    MissingInput {
        /// Path that was given.
        path: PathBuf,
    },
    /// The directory of the running executable could not be determined.
    Executable,
}

impl ConfigError {
    fn new(kind: ConfigErrorKind) -> Self {
        Self { kind, source: None }
    }

    fn new_with_source(kind: ConfigErrorKind, source: IoError) -> Self {
        Self {
            kind,
            source: Some(source),
        }
    }

    /// Returns what went wrong.
    #[must_use]
    pub fn kind(&self) -> &ConfigErrorKind {
        &self.kind
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            ConfigErrorKind::MissingInput { path } => {
                write!(f, "input file does not exist: {}", path.display())
            }
            ConfigErrorKind::Executable => {
                f.write_str("failed to determine the directory of the executable")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(e) => Some(e),
            None => None,
        }
    }
}
