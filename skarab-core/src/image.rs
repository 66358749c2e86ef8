//! Firmware image provider: a stable, read-only byte range sliced into
//! fixed-size chunks.

use crate::error::ConfigError;

pub const MIN_CHUNK_SIZE: usize = 65;
pub const MAX_CHUNK_SIZE: usize = 9000;
pub const DEFAULT_CHUNK_SIZE: usize = 1988;

/// Validates `chunk_size` against the `(64, 9000]` range required by the
/// wire format (a 16-bit `total` field and a per-send scratch buffer).
pub fn validate_chunk_size(chunk_size: usize) -> Result<(), ConfigError> {
    if chunk_size <= MIN_CHUNK_SIZE - 1 || chunk_size > MAX_CHUNK_SIZE {
        return Err(ConfigError::ChunkSizeOutOfRange(chunk_size));
    }
    Ok(())
}

/// An immutable firmware image, chunked at a fixed `chunk_size`.
pub struct FirmwareImage {
    bytes: Vec<u8>,
    chunk_size: usize,
    chunk_count: usize,
}

impl FirmwareImage {
    pub fn new(bytes: Vec<u8>, chunk_size: usize) -> Result<Self, ConfigError> {
        validate_chunk_size(chunk_size)?;
        let chunk_count = bytes.len().div_ceil(chunk_size);
        Ok(FirmwareImage {
            bytes,
            chunk_size,
            chunk_count,
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// The real image bytes for chunk `i` (short for the tail chunk).
    /// Panics if `i >= chunk_count()`.
    pub fn chunk_slice(&self, i: usize) -> &[u8] {
        assert!(i < self.chunk_count, "chunk {i} out of range");
        let start = i * self.chunk_size;
        let end = (start + self.chunk_size).min(self.bytes.len());
        &self.bytes[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_count_rounds_up() {
        let img = FirmwareImage::new(vec![0u8; 3976], 1988).unwrap();
        assert_eq!(img.chunk_count(), 2);
        let img = FirmwareImage::new(vec![0u8; 2000], 1988).unwrap();
        assert_eq!(img.chunk_count(), 2);
        assert_eq!(img.chunk_slice(1).len(), 12);
    }

    #[test]
    fn zero_length_image_has_no_chunks() {
        let img = FirmwareImage::new(Vec::new(), 1988).unwrap();
        assert_eq!(img.chunk_count(), 0);
        assert!(img.is_empty());
    }

    #[test]
    fn tail_chunk_matches_image_bytes() {
        let mut data = vec![0u8; 2000];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i % 256) as u8;
        }
        let img = FirmwareImage::new(data.clone(), 1988).unwrap();
        let tail = img.chunk_slice(1);
        assert_eq!(tail, &data[1988..2000]);
    }

    #[test]
    fn chunk_size_out_of_range_rejected() {
        assert!(matches!(
            FirmwareImage::new(vec![0u8; 10], 64),
            Err(ConfigError::ChunkSizeOutOfRange(64))
        ));
        assert!(matches!(
            FirmwareImage::new(vec![0u8; 10], 9001),
            Err(ConfigError::ChunkSizeOutOfRange(9001))
        ));
        assert!(FirmwareImage::new(vec![0u8; 10], 65).is_ok());
        assert!(FirmwareImage::new(vec![0u8; 10], 9000).is_ok());
    }
}
