//! Raw firmware image loading and word chunking.

use crate::error::{Error, Result};
use crate::protocol::crc::crc32;
use std::fs;
use std::path::Path;

/// Bytes programmed per Write-Data command.
pub const WORD_SIZE: usize = 4;

/// Erased-flash content, also used to pad the final short word.
pub const FILL_BYTE: u8 = 0xFF;

/// An immutable application image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    data: Vec<u8>,
}

impl FirmwareImage {
    /// Read an image from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)
            .map_err(|e| Error::InvalidInput(format!("File not found: {} ({e})", path.display())))?;

        if data.is_empty() {
            return Err(Error::InvalidInput(format!(
                "File is empty: {}",
                path.display()
            )));
        }

        Ok(Self { data })
    }

    /// Wrap bytes already in memory.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::InvalidInput("Image is empty".into()));
        }
        Ok(Self { data })
    }

    /// Image size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false; empty images are rejected on construction.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw image bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Number of Write-Data commands needed for this image.
    pub fn word_count(&self) -> usize {
        self.data.len().div_ceil(WORD_SIZE)
    }

    /// CRC-32 over the unpadded image.
    pub fn checksum(&self) -> u32 {
        crc32(&self.data)
    }

    /// Iterate over the image in ascending 4-byte words, file byte order,
    /// with the last word padded with [`FILL_BYTE`].
    pub fn words(&self) -> impl ExactSizeIterator<Item = [u8; WORD_SIZE]> + '_ {
        self.data
            .chunks(WORD_SIZE)
            .map(|chunk| {
                let mut word = [FILL_BYTE; WORD_SIZE];
                word[..chunk.len()].copy_from_slice(chunk);
                word
            })
    }
}
