//! JPEG signature sniffing.
//!
//! A file is treated as a JPEG only when both its SOI/APP marker prefix and
//! the APP segment identifier match one of the known combinations. The
//! extension is never consulted.

use std::io::{self, Read};

/// Number of header bytes inspected by [`is_jpeg`].
pub const HEADER_LEN: usize = 11;

/// Accepted values for bytes 0..4 (SOI followed by a DQT/APP0/APP1/APP14 marker).
const SIGNATURES: [[u8; 4]; 4] = [
    [0xFF, 0xD8, 0xFF, 0xDB],
    [0xFF, 0xD8, 0xFF, 0xE0],
    [0xFF, 0xD8, 0xFF, 0xE1],
    [0xFF, 0xD8, 0xFF, 0xEE],
];

/// Accepted values for bytes 6..11 (APP segment identifier).
const FORMAT_MARKERS: [&[u8; 5]; 2] = [b"JFIF\0", b"Exif\0"];

/// Check whether `reader` starts with a JPEG header.
///
/// Reads at most [`HEADER_LEN`] bytes and leaves the cursor wherever the read
/// stopped; callers that go on to decode the stream must seek back to the
/// start first. A stream shorter than the header is simply not a JPEG.
pub fn is_jpeg<R: Read>(reader: &mut R) -> io::Result<bool> {
    let mut header = [0u8; HEADER_LEN];
    let read = read_header(reader, &mut header)?;
    if read < HEADER_LEN {
        log::debug!("Header too short for a JPEG ({read} bytes)");
        return Ok(false);
    }

    let signature = &header[..4];
    let format = &header[6..];
    log::debug!("File signature: {signature:02X?}, format marker: {format:?}");

    let valid_signature = SIGNATURES.iter().any(|s| s.as_slice() == signature);
    let valid_format = FORMAT_MARKERS.iter().any(|f| f.as_slice() == format);

    Ok(valid_signature && valid_format)
}

/// Fill `buf` as far as the stream allows, returning the number of bytes read.
fn read_header<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
