//! Error types for canboot.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for canboot operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for canboot operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (CAN socket, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The transport refused or failed to put a frame on the bus.
    #[error("Transport error: {0}")]
    Transport(String),

    /// No matching response arrived before the deadline.
    #[error("Timeout waiting for {what} after {}ms", after.as_millis())]
    Timeout {
        /// What was being waited for.
        what: &'static str,
        /// How long the wait lasted.
        after: Duration,
    },

    /// The device acknowledged with a non-success status byte.
    #[error("Device rejected command, status: 0x{status:02X}")]
    DeviceRejected {
        /// Raw status byte from the acknowledgement.
        status: u8,
    },

    /// Device checksum differs from the checksum of the local image.
    #[error("CRC mismatch: expected 0x{expected:08X}, got 0x{actual:08X}")]
    ChecksumMismatch {
        /// Checksum of the local image.
        expected: u32,
        /// Checksum reported by the device.
        actual: u32,
    },

    /// Command identifier does not fit the 7-bit command field.
    #[error("Command 0x{0:02X} > 0x7F not allowed for an 11-bit CAN ID")]
    InvalidCommand(u8),

    /// Payload longer than a classic CAN frame can carry.
    #[error("Payload of {0} bytes exceeds the 8-byte frame limit")]
    PayloadTooLong(usize),

    /// Malformed or out-of-range target identifier.
    #[error("Invalid target ID: {0}")]
    InvalidTarget(String),

    /// Input rejected before any bus traffic (missing file, empty image, ...).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation cancelled by the embedding application.
    #[error("Operation interrupted")]
    Interrupted,
}

impl Error {
    /// Whether the device answered but refused (as opposed to never answering).
    pub fn is_device_rejection(&self) -> bool {
        matches!(self, Self::DeviceRejected { .. } | Self::ChecksumMismatch { .. })
    }
}
