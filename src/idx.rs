//! Reader for the big-endian IDX container the MNIST files are distributed in.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Magic number of an IDX file holding unsigned bytes in three dimensions.
pub const IMAGES_MAGIC: u32 = 0x0000_0803;
/// Magic number of an IDX file holding unsigned bytes in one dimension.
pub const LABELS_MAGIC: u32 = 0x0000_0801;

const IMAGES_HEADER_LEN: usize = 16;
const LABELS_HEADER_LEN: usize = 8;

/// Error raised while reading an IDX file.
#[derive(Debug, Error)]
pub enum IdxError {
    /// The file could not be read.
    #[error("could not read '{}': {source}", .path.display())]
    Io {
        /// Path of the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file does not start with the expected magic number.
    #[error("unexpected magic number {found:#010x} (expected {expected:#010x})")]
    Magic {
        /// Magic number for the requested content.
        expected: u32,
        /// Magic number present in the file.
        found: u32,
    },

    /// The file ends before its header is complete.
    #[error("header truncated: {found} bytes, need {expected}")]
    TruncatedHeader {
        /// Header length.
        expected: usize,
        /// Bytes available.
        found: usize,
    },

    /// The file ends before the payload announced in its header.
    #[error("payload truncated: header announces {expected} bytes, found {found}")]
    TruncatedPayload {
        /// Payload length derived from the header.
        expected: usize,
        /// Bytes available after the header.
        found: usize,
    },

    /// The dimensions in the header describe more bytes than can be addressed.
    #[error("header dimensions {dims:?} overflow the addressable size")]
    HeaderOverflow {
        /// `[count, rows, cols]` as read from the header.
        dims: [usize; 3],
    },
}

/// Images decoded from an IDX file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdxImages {
    /// Number of images.
    pub count: usize,
    /// Rows per image.
    pub rows: usize,
    /// Columns per image.
    pub cols: usize,
    /// Row-major pixel intensities, `count * rows * cols` bytes.
    pub pixels: Vec<u8>,
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_be_bytes(buf)
}

fn check_header(bytes: &[u8], header_len: usize, magic: u32) -> Result<(), IdxError> {
    if bytes.len() < header_len {
        return Err(IdxError::TruncatedHeader {
            expected: header_len,
            found: bytes.len(),
        });
    }

    let found = read_u32(bytes, 0);
    if found != magic {
        return Err(IdxError::Magic {
            expected: magic,
            found,
        });
    }

    Ok(())
}

fn payload(bytes: &[u8], header_len: usize, expected: usize) -> Result<&[u8], IdxError> {
    let body = &bytes[header_len..];
    if body.len() < expected {
        return Err(IdxError::TruncatedPayload {
            expected,
            found: body.len(),
        });
    }

    // Anything after the announced payload is ignored.
    Ok(&body[..expected])
}

/// Decode an image file held in memory.
pub fn parse_images(bytes: &[u8]) -> Result<IdxImages, IdxError> {
    check_header(bytes, IMAGES_HEADER_LEN, IMAGES_MAGIC)?;

    let count = read_u32(bytes, 4) as usize;
    let rows = read_u32(bytes, 8) as usize;
    let cols = read_u32(bytes, 12) as usize;
    let len = count
        .checked_mul(rows)
        .and_then(|n| n.checked_mul(cols))
        .ok_or(IdxError::HeaderOverflow {
            dims: [count, rows, cols],
        })?;
    let pixels = payload(bytes, IMAGES_HEADER_LEN, len)?;

    Ok(IdxImages {
        count,
        rows,
        cols,
        pixels: pixels.to_vec(),
    })
}

/// Decode a label file held in memory.
pub fn parse_labels(bytes: &[u8]) -> Result<Vec<u8>, IdxError> {
    check_header(bytes, LABELS_HEADER_LEN, LABELS_MAGIC)?;

    let count = read_u32(bytes, 4) as usize;
    let labels = payload(bytes, LABELS_HEADER_LEN, count)?;

    Ok(labels.to_vec())
}

fn read_file(path: &Path) -> Result<Vec<u8>, IdxError> {
    std::fs::read(path).map_err(|source| IdxError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read and decode an image file.
pub fn read_images<P: AsRef<Path>>(path: P) -> Result<IdxImages, IdxError> {
    let path = path.as_ref();
    log::debug!("Reading IDX images from {}", path.display());
    parse_images(&read_file(path)?)
}

/// Read and decode a label file.
pub fn read_labels<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, IdxError> {
    let path = path.as_ref();
    log::debug!("Reading IDX labels from {}", path.display());
    parse_labels(&read_file(path)?)
}

/// Encode images as an IDX file. Used to build fixtures.
#[cfg(test)]
pub(crate) fn encode_images(count: u32, rows: u32, cols: u32, pixels: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(IMAGES_HEADER_LEN + pixels.len());
    for word in [IMAGES_MAGIC, count, rows, cols] {
        bytes.extend_from_slice(&word.to_be_bytes());
    }
    bytes.extend_from_slice(pixels);
    bytes
}

/// Encode labels as an IDX file. Used to build fixtures.
#[cfg(test)]
pub(crate) fn encode_labels(labels: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(LABELS_HEADER_LEN + labels.len());
    bytes.extend_from_slice(&LABELS_MAGIC.to_be_bytes());
    bytes.extend_from_slice(&(labels.len() as u32).to_be_bytes());
    bytes.extend_from_slice(labels);
    bytes
}
