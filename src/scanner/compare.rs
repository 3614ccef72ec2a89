//! Byte-for-byte file comparison.
//!
//! Fingerprints are probabilistic; every identity claim made by the matcher
//! is confirmed here when both files are readable.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const COMPARE_BUFFER_SIZE: usize = 64 * 1024;

/// Returns `true` when both files have identical content.
///
/// Sizes are compared first, so files of different length are rejected
/// without reading them.
///
/// # Errors
///
/// Returns the I/O error of whichever file could not be opened or read.
pub fn files_identical(a: &Path, b: &Path) -> io::Result<bool> {
    let mut file_a = File::open(a)?;
    let mut file_b = File::open(b)?;

    if file_a.metadata()?.len() != file_b.metadata()?.len() {
        return Ok(false);
    }

    let mut buf_a = vec![0u8; COMPARE_BUFFER_SIZE];
    let mut buf_b = vec![0u8; COMPARE_BUFFER_SIZE];

    loop {
        let read_a = read_full(&mut file_a, &mut buf_a)?;
        let read_b = read_full(&mut file_b, &mut buf_b)?;

        if read_a != read_b || buf_a[..read_a] != buf_b[..read_b] {
            return Ok(false);
        }
        if read_a == 0 {
            return Ok(true);
        }
    }
}

/// Fill `buf` as far as the reader allows; short only at end of file.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
