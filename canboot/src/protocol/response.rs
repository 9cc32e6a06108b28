//! Classification of inbound frames into protocol responses.

use crate::protocol::frame::{Command, Frame, TargetId};
use byteorder::{BigEndian, ByteOrder};

/// Acknowledgement status byte signalling success.
pub const ACK_SUCCESS: u8 = 0xFF;

/// Kind of response a pending command waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitKind {
    /// A one-byte acknowledgement (0x11).
    Confirmation,
    /// A four-byte checksum report (0x12).
    Checksum,
}

impl WaitKind {
    /// Short name used in log and error messages.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Confirmation => "confirmation",
            Self::Checksum => "CRC",
        }
    }
}

/// A classified inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Acknowledgement closing out a command.
    Acknowledgement {
        /// Raw status byte, 0xFF on success.
        status: u8,
    },
    /// CRC of the application region as computed by the device.
    ChecksumReport {
        /// Big-endian decoded checksum.
        value: u32,
    },
    /// Anything else seen on the bus (including our own commands looped back).
    Unrecognized {
        /// Node identifier of the sender.
        target: TargetId,
        /// Command identifier.
        command: u8,
        /// Payload length.
        len: usize,
    },
}

impl Response {
    /// Classify a frame by its command identifier.
    ///
    /// Checksum reports need at least four payload bytes and
    /// acknowledgements at least one; shorter frames are unrecognized.
    pub fn classify(frame: &Frame) -> Self {
        let (target, command, payload) = frame.decode();

        match Command::try_from(command) {
            Ok(Command::ChecksumReport) if payload.len() >= 4 => Self::ChecksumReport {
                value: BigEndian::read_u32(&payload[..4]),
            },
            Ok(Command::Acknowledgement) if !payload.is_empty() => Self::Acknowledgement {
                status: payload[0],
            },
            _ => Self::Unrecognized {
                target,
                command,
                len: payload.len(),
            },
        }
    }

    /// The wait this response can satisfy, if any.
    pub fn wait_kind(&self) -> Option<WaitKind> {
        match self {
            Self::Acknowledgement { .. } => Some(WaitKind::Confirmation),
            Self::ChecksumReport { .. } => Some(WaitKind::Checksum),
            Self::Unrecognized { .. } => None,
        }
    }

    /// Whether this is an acknowledgement with the success status.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Acknowledgement { status } if *status == ACK_SUCCESS)
    }
}
