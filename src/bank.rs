//! Extraction of the FSB5 banks embedded in FMOD Studio `.bank` files.
//!
//! Embedded banks can start at any byte offset. Each one is copied into its own temporary file so
//! that it can be opened like a standalone bank.

use crate::config::file_stem;
use crate::header::FSB5_MAGIC;
use crate::read::{ReadError, Reader};
use crate::scan::find_signature;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{self, File},
    io::{self, BufReader, BufWriter, Error as IoError, ErrorKind, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

/// Size of the fixed part of an FSB5 header, in bytes.
pub const SUB_CONTAINER_HEADER_SIZE: u64 = 0x3C;

/// Size fields of an embedded bank's header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubContainerHeader {
    /// Format version of the bank.
    pub version: u32,
    /// Number of streams in the bank.
    pub stream_count: u32,
    /// Total size of the stream headers in bytes.
    pub stream_header_size: u32,
    /// Size of the name table in bytes.
    pub name_table_size: u32,
    /// Total size of the sample data in bytes.
    pub data_size: u32,
}

impl SubContainerHeader {
    pub(crate) fn parse<R: Read>(reader: &mut Reader<R>) -> Result<Self, ReadError> {
        // the signature has already been matched by the scanner
        reader.skip(FSB5_MAGIC.len() as u64)?;

        let header = Self {
            version: reader.le_u32()?,
            stream_count: reader.le_u32()?,
            stream_header_size: reader.le_u32()?,
            name_table_size: reader.le_u32()?,
            data_size: reader.le_u32()?,
        };

        reader.seek_forward(SUB_CONTAINER_HEADER_SIZE)?;

        Ok(header)
    }

    /// Length of the whole embedded bank in bytes, header included.
    #[must_use]
    pub fn total_len(&self) -> u64 {
        SUB_CONTAINER_HEADER_SIZE
            + u64::from(self.stream_header_size)
            + u64::from(self.name_table_size)
            + u64::from(self.data_size)
    }
}

/// An embedded bank copied into a temporary file. The file is deleted when this value is dropped.
#[derive(Debug)]
pub struct SubContainer {
    path: PathBuf,
    offset: u64,
    header: SubContainerHeader,
    removed: bool,
}

impl SubContainer {
    /// Location of the temporary file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset of the embedded bank within the outer file.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Header of the embedded bank.
    #[must_use]
    pub fn header(&self) -> &SubContainerHeader {
        &self.header
    }

    /// Deletes the temporary file now, reporting failure instead of logging it.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be deleted.
    pub fn remove(mut self) -> Result<(), IoError> {
        self.removed = true;
        remove_if_exists(&self.path)
    }
}

impl Drop for SubContainer {
    fn drop(&mut self) {
        if !self.removed {
            if let Err(e) = remove_if_exists(&self.path) {
                log::warn!(
                    "failed to delete temporary file {}: {e}",
                    self.path.display()
                );
            }
        }
    }
}

fn remove_if_exists(path: &Path) -> Result<(), IoError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Result of scanning one `.bank` file.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Embedded banks that were copied out, in the order they appear.
    pub containers: Vec<SubContainer>,
    /// Embedded banks that could not be copied out.
    pub failures: Vec<RegionFailure>,
}

/// An embedded bank that was found but not copied out.
#[derive(Debug)]
pub struct RegionFailure {
    /// Offset of the signature within the outer file.
    pub offset: u64,
    /// Name the temporary file would have had.
    pub name: String,
    /// What went wrong.
    pub error: BankError,
}

/// Name of the temporary file for the `occurrence`-th (1-based) embedded bank.
#[must_use]
pub fn sub_container_name(stem: &str, occurrence: u32) -> String {
    if occurrence > 1 {
        format!("{stem}_{occurrence}.fsb")
    } else {
        format!("{stem}.fsb")
    }
}

/// Copies every FSB5 bank embedded in the file at `bank_path` into `temp_dir`.
///
/// Embedded banks that cannot be copied out are listed in [`Extraction::failures`] and do not stop
/// the scan. Finding no embedded banks is not an error.
///
/// # Errors
/// Returns an error if the file at `bank_path` cannot be opened.
pub fn extract_sub_containers(bank_path: &Path, temp_dir: &Path) -> Result<Extraction, BankError> {
    let file = File::open(bank_path).map_err(BankError::io_factory(BankErrorKind::Open))?;
    let mut reader = BufReader::new(file);

    let stem = file_stem(bank_path);
    let mut extraction = Extraction::default();
    let mut occurrence = 0;

    loop {
        let offset = match find_signature(&mut reader, FSB5_MAGIC) {
            Ok(Some(offset)) => offset,
            Ok(None) => break,
            Err(e) => {
                extraction.failures.push(RegionFailure {
                    offset: reader.stream_position().unwrap_or_default(),
                    name: String::new(),
                    error: BankError::new_with_io_source(BankErrorKind::Scan, e),
                });
                break;
            }
        };

        occurrence += 1;
        let name = sub_container_name(&stem, occurrence);
        let path = temp_dir.join(&name);

        match copy_region(&mut reader, offset, path) {
            Ok(container) => {
                log::debug!(
                    "copied {} bytes at offset {offset} into {}",
                    container.header.total_len(),
                    container.path.display()
                );
                extraction.containers.push(container);
            }
            Err(error) => {
                log::warn!("skipping embedded bank at offset {offset}: {error}");
                extraction.failures.push(RegionFailure {
                    offset,
                    name,
                    error,
                });

                // the next scan has to start past this signature
                let resume = reader
                    .stream_position()
                    .unwrap_or_default()
                    .max(offset + FSB5_MAGIC.len() as u64);

                if let Err(e) = reader.seek(SeekFrom::Start(resume)) {
                    extraction.failures.push(RegionFailure {
                        offset: resume,
                        name: String::new(),
                        error: BankError::new_with_io_source(BankErrorKind::Seek, e),
                    });
                    break;
                }
            }
        }
    }

    Ok(extraction)
}

fn copy_region<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    path: PathBuf,
) -> Result<SubContainer, BankError> {
    let header = SubContainerHeader::parse(&mut Reader::new(&mut *reader))
        .map_err(|e| BankError::new_with_read_source(BankErrorKind::Header, e))?;

    let _ = reader
        .seek(SeekFrom::Start(offset))
        .map_err(BankError::io_factory(BankErrorKind::Seek))?;

    // from here on, the partial file is deleted on failure
    let container = SubContainer {
        path,
        offset,
        header,
        removed: false,
    };

    let mut sink = File::create(&container.path)
        .map(BufWriter::new)
        .map_err(BankError::io_factory(BankErrorKind::CreateTemp))?;

    let expected = header.total_len();
    let copied = io::copy(&mut reader.by_ref().take(expected), &mut sink)
        .map_err(BankError::io_factory(BankErrorKind::Copy))?;

    if copied < expected {
        return Err(BankError::new(BankErrorKind::ShortRegion { expected, copied }));
    }

    let _file = sink
        .into_inner()
        .map_err(|e| BankError::new_with_io_source(BankErrorKind::Copy, e.into_error()))?;

    Ok(container)
}

/// Error raised while extracting embedded banks.
#[derive(Debug)]
pub struct BankError {
    kind: BankErrorKind,
    source: Option<BankErrorSource>,
}

/// What went wrong while extracting embedded banks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BankErrorKind {
    /// The `.bank` file could not be opened.
    Open,
    /// The `.bank` file could not be scanned for signatures.
    Scan,
    /// The header of an embedded bank could not be read.
    Header,
    /// The read cursor could not be moved.
    Seek,
    /// The temporary file could not be created.
    CreateTemp,
    /// Copying into the temporary file failed.
    Copy,
    /// The embedded bank extends past the end of the file.
    ShortRegion {
        /// Length declared by the embedded bank's header.
        expected: u64,
        /// Number of bytes available.
        copied: u64,
    },
}

#[derive(Debug)]
enum BankErrorSource {
    Io(IoError),
    Read(ReadError),
}

impl BankError {
    fn new(kind: BankErrorKind) -> Self {
        Self { kind, source: None }
    }

    fn new_with_io_source(kind: BankErrorKind, source: IoError) -> Self {
        Self {
            kind,
            source: Some(BankErrorSource::Io(source)),
        }
    }

    fn new_with_read_source(kind: BankErrorKind, source: ReadError) -> Self {
        Self {
            kind,
            source: Some(BankErrorSource::Read(source)),
        }
    }

    fn io_factory(kind: BankErrorKind) -> impl FnOnce(IoError) -> Self {
        move |source| Self::new_with_io_source(kind, source)
    }

    /// Returns what went wrong.
    #[must_use]
    pub fn kind(&self) -> BankErrorKind {
        self.kind
    }
}

impl Display for BankError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        #[allow(clippy::enum_glob_use)]
        use BankErrorKind::*;

        match self.kind {
            Open => f.write_str("failed to open bank file"),
            Scan => f.write_str("failed to scan bank file for embedded banks"),
            Header => f.write_str("failed to read header of embedded bank"),
            Seek => f.write_str("failed to seek within bank file"),
            CreateTemp => f.write_str("failed to create temporary file"),
            Copy => f.write_str("failed to copy embedded bank into temporary file"),
            ShortRegion { expected, copied } => f.write_str(&format!(
                "embedded bank is truncated ({copied} of {expected} bytes present)"
            )),
        }
    }
}

impl Error for BankError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(BankErrorSource::Io(e)) => Some(e),
            Some(BankErrorSource::Read(e)) => Some(e),
            None => None,
        }
    }
}
