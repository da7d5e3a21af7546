//! Byte-granular signature search over seekable streams.

use std::io::{Error as IoError, ErrorKind, Read, Seek, SeekFrom};

/// Searches forward from the current position of `reader` for `signature`.
///
/// The search advances one byte at a time, so a signature is found regardless of its alignment.
/// On a match, `reader` is left positioned at the first byte of the signature and the offset of
/// that byte is returned. If the end of the stream is reached without a match, `reader` is moved
/// back to where the search started and `Ok(None)` is returned.
///
/// For file-backed sources, `reader` should be buffered (e.g. a [`BufReader`](std::io::BufReader)),
/// since bytes are pulled from it one at a time.
///
/// # Errors
/// Returns any I/O error raised while reading or seeking. The original position is restored
/// (on a best-effort basis) before a read error is returned.
pub fn find_signature<R: Read + Seek>(
    reader: &mut R,
    signature: [u8; 4],
) -> Result<Option<u64>, IoError> {
    let start = reader.stream_position()?;

    let mut window = [0; 4];
    let mut consumed: u64 = 0;

    let mut byte = [0; 1];

    loop {
        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                // the read error takes priority over a failure to rewind
                if reader.seek(SeekFrom::Start(start)).is_err() {
                    log::debug!("failed to rewind to byte {start} after read error");
                }
                return Err(e);
            }
        }

        window.rotate_left(1);
        window[3] = byte[0];
        consumed += 1;

        if consumed >= 4 && window == signature {
            let offset = start + consumed - 4;
            let _ = reader.seek(SeekFrom::Start(offset))?;
            return Ok(Some(offset));
        }
    }

    let _ = reader.seek(SeekFrom::Start(start))?;
    Ok(None)
}
