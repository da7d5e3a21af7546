use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    io::{self, Error as IoError, ErrorKind, Read},
};

/// Sequential little-endian reader that tracks its absolute byte offset.
///
/// Offsets are counted from where the reader was created, which is the start of the bank.
pub(crate) struct Reader<R: Read> {
    inner: R,
    position: u64,
}

impl<R: Read> Reader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn into_inner(self) -> R {
        self.inner
    }

    // Short reads are retried until `buf` is full or the source runs dry.
    fn fill(&mut self, buf: &mut [u8]) -> Result<(), ReadError> {
        let mut filled = 0;

        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    self.position += n as u64;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(self.error_with_source(ReadErrorKind::Io, e)),
            }
        }

        match buf.len() - filled {
            0 => Ok(()),
            missing => Err(self.error(ReadErrorKind::Eof {
                missing: missing as u64,
            })),
        }
    }

    pub(crate) fn array<const LEN: usize>(&mut self) -> Result<[u8; LEN], ReadError> {
        let mut buf = [0; LEN];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    /// Reads `len` bytes. Memory grows with the data actually present, not with `len`.
    pub(crate) fn bytes(&mut self, len: u64) -> Result<Vec<u8>, ReadError> {
        let mut buf = Vec::new();

        let read = (&mut self.inner)
            .take(len)
            .read_to_end(&mut buf)
            .map_err(|e| self.error_with_source(ReadErrorKind::Io, e))?;
        self.position += read as u64;

        match len - read as u64 {
            0 => Ok(buf),
            missing => Err(self.error(ReadErrorKind::Eof { missing })),
        }
    }

    pub(crate) fn skip(&mut self, len: u64) -> Result<(), ReadError> {
        let skipped = io::copy(&mut (&mut self.inner).take(len), &mut io::sink())
            .map_err(|e| self.error_with_source(ReadErrorKind::Io, e))?;
        self.position += skipped;

        match len - skipped {
            0 => Ok(()),
            missing => Err(self.error(ReadErrorKind::Eof { missing })),
        }
    }

    /// Skips forward to the absolute offset `target`.
    pub(crate) fn seek_forward(&mut self, target: u64) -> Result<(), ReadError> {
        match target.checked_sub(self.position) {
            Some(len) => self.skip(len),
            None => Err(self.error(ReadErrorKind::Backwards { target })),
        }
    }

    pub(crate) fn u8(&mut self) -> Result<u8, ReadError> {
        self.array().map(u8::from_le_bytes)
    }

    pub(crate) fn le_u32(&mut self) -> Result<u32, ReadError> {
        self.array().map(u32::from_le_bytes)
    }

    pub(crate) fn le_u64(&mut self) -> Result<u64, ReadError> {
        self.array().map(u64::from_le_bytes)
    }

    fn error(&self, kind: ReadErrorKind) -> ReadError {
        ReadError {
            position: self.position,
            kind,
            source: None,
        }
    }

    fn error_with_source(&self, kind: ReadErrorKind, source: IoError) -> ReadError {
        ReadError {
            position: self.position,
            kind,
            source: Some(source),
        }
    }
}

#[derive(Debug)]
pub(crate) struct ReadError {
    position: u64,
    kind: ReadErrorKind,
    source: Option<IoError>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ReadErrorKind {
    Io,
    Eof { missing: u64 },
    Backwards { target: u64 },
}

#[cfg(test)]
impl ReadError {
    pub(crate) fn kind(&self) -> ReadErrorKind {
        self.kind
    }
}

impl Display for ReadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let position = self.position;

        match self.kind {
            ReadErrorKind::Io => f.write_str(&format!("I/O error at byte {position}")),
            ReadErrorKind::Eof { missing } => f.write_str(&format!(
                "data ends at byte {position}, {missing} more bytes were expected"
            )),
            ReadErrorKind::Backwards { target } => f.write_str(&format!(
                "byte {target} has already been read (now at byte {position})"
            )),
        }
    }
}

impl Error for ReadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(e) => Some(e),
            None => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{ReadErrorKind, Reader};
    use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult};

    #[test]
    fn read_numbers() {
        let data = b"\x2A\x78\x56\x34\x12\x01\x00\x00\x00\x00\x00\x00\x80";
        let mut reader = Reader::new(data.as_slice());

        assert_eq!(reader.u8().unwrap(), 42);
        assert_eq!(reader.le_u32().unwrap(), 0x1234_5678);
        assert_eq!(reader.le_u64().unwrap(), 0x8000_0000_0000_0001);
        assert_eq!(reader.position(), 13);
        assert!(reader
            .u8()
            .is_err_and(|e| e.kind() == ReadErrorKind::Eof { missing: 1 }));
    }

    #[test]
    fn read_byte_runs() {
        let mut reader = Reader::new(b"FSB5name\0".as_slice());

        assert_eq!(reader.array::<4>().unwrap(), *b"FSB5");
        assert_eq!(reader.bytes(5).unwrap(), b"name\0");
        assert_eq!(reader.bytes(0).unwrap(), b"");
        assert!(reader
            .bytes(u64::MAX)
            .is_err_and(|e| e.kind() == ReadErrorKind::Eof { missing: u64::MAX }));
    }

    #[test]
    fn skip_forward() {
        let mut reader = Reader::new([0u8; 10].as_slice());

        assert!(reader.skip(3).is_ok());
        assert!(reader.seek_forward(3).is_ok());
        assert!(reader.seek_forward(8).is_ok());
        assert_eq!(reader.position(), 8);

        assert!(reader
            .seek_forward(2)
            .is_err_and(|e| e.kind() == ReadErrorKind::Backwards { target: 2 }));
        assert!(reader
            .seek_forward(64)
            .is_err_and(|e| e.kind() == ReadErrorKind::Eof { missing: 54 }));
        assert_eq!(reader.position(), 10);
    }

    #[test]
    fn report_partial_numbers() {
        let mut reader = Reader::new(b"\x01\x02\x03".as_slice());

        assert!(reader
            .le_u32()
            .is_err_and(|e| e.kind() == ReadErrorKind::Eof { missing: 1 }));
    }

    // one byte per call, with an interruption before each
    struct Stutter<'a> {
        data: &'a [u8],
        interrupt: bool,
    }

    impl Read for Stutter<'_> {
        fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(IoError::from(ErrorKind::Interrupted));
            }

            match (self.data.split_first(), buf.first_mut()) {
                (Some((byte, rest)), Some(slot)) => {
                    *slot = *byte;
                    self.data = rest;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }
    }

    #[test]
    fn retry_short_and_interrupted_reads() {
        let mut reader = Reader::new(Stutter {
            data: b"\x44\x33\x22\x11",
            interrupt: false,
        });

        assert_eq!(reader.le_u32().unwrap(), 0x1122_3344);
        assert_eq!(reader.position(), 4);
    }

    struct Broken(ErrorKind);

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> IoResult<usize> {
            Err(IoError::from(self.0))
        }
    }

    #[test]
    fn classify_io_errors() {
        let mut reader = Reader::new(Broken(ErrorKind::UnexpectedEof));
        assert!(reader
            .le_u32()
            .is_err_and(|e| e.kind() == ReadErrorKind::Eof { missing: 4 }));

        let mut reader = Reader::new(Broken(ErrorKind::PermissionDenied));
        assert!(reader.u8().is_err_and(|e| e.kind() == ReadErrorKind::Io));
        assert!(reader.skip(1).is_err_and(|e| e.kind() == ReadErrorKind::Io));
    }
}
