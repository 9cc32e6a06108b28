//! Bootloader frame codec.
//!
//! Every command and response travels as a single classic CAN frame. The
//! address field carries both the bootloader instance and the command:
//!
//! ```text
//! +------------------------+---------------------+
//! |   Target identifier    | Command identifier  |
//! +------------------------+---------------------+
//! |     bits [11:7]        |     bits [6:0]      |
//! +------------------------+---------------------+
//! | 0x00 - 0x1F            | 0x00 - 0x7F         |
//! +------------------------+---------------------+
//! ```
//!
//! Payloads are 0 to 8 bytes. Responses are broadcast with the responding
//! node's identifier in the target field and carry no correlation id.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Maximum payload length of a classic CAN frame.
pub const MAX_PAYLOAD: usize = 8;

/// Highest command identifier that fits the command field.
pub const MAX_COMMAND: u8 = 0x7F;

/// Highest configurable target identifier.
pub const MAX_TARGET: u8 = 0x1F;

/// Highest target whose addresses fit an 11-bit standard CAN identifier.
pub const MAX_STANDARD_TARGET: u8 = 0x0F;

/// Width of the command field in the address.
const COMMAND_BITS: u16 = 7;

/// Mask of the command field.
const COMMAND_MASK: u16 = 0x7F;

/// Mask of all meaningful address bits (target + command).
const ADDRESS_MASK: u16 = ((MAX_TARGET as u16) << COMMAND_BITS) | COMMAND_MASK;

/// Bootloader command identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Erase the application flash region (0x01).
    Erase = 0x01,

    /// Prepare the write pointer for a new image (0x02).
    BeginWrite = 0x02,

    /// Program one 4-byte word (0x03).
    WriteData = 0x03,

    /// Finish writing the image (0x04).
    EndWrite = 0x04,

    /// Ask the device for the CRC of its application region (0x05).
    RequestChecksum = 0x05,

    /// Acknowledgement from the device (0x11).
    Acknowledgement = 0x11,

    /// Checksum report from the device (0x12).
    ChecksumReport = 0x12,
}

impl Command {
    /// Human-readable description used in log lines.
    pub fn description(self) -> &'static str {
        match self {
            Self::Erase => "Erase flash",
            Self::BeginWrite => "Start write",
            Self::WriteData => "Write data",
            Self::EndWrite => "End write",
            Self::RequestChecksum => "Request CRC",
            Self::Acknowledgement => "Acknowledgement",
            Self::ChecksumReport => "CRC report",
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        match value {
            0x01 => Ok(Self::Erase),
            0x02 => Ok(Self::BeginWrite),
            0x03 => Ok(Self::WriteData),
            0x04 => Ok(Self::EndWrite),
            0x05 => Ok(Self::RequestChecksum),
            0x11 => Ok(Self::Acknowledgement),
            0x12 => Ok(Self::ChecksumReport),
            other => Err(other),
        }
    }
}

/// Address of one bootloader instance on the shared bus (0x00 - 0x1F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub struct TargetId(u8);

impl TargetId {
    /// Target addressed when nothing else is configured.
    pub const DEFAULT: Self = Self(0x01);

    /// Create a target identifier, rejecting values above 0x1F.
    pub fn new(id: u8) -> Result<Self> {
        if id > MAX_TARGET {
            return Err(Error::InvalidTarget(format!(
                "0x{id:02X} (must be between 0 and 0x{MAX_TARGET:02X})"
            )));
        }
        Ok(Self(id))
    }

    /// Raw identifier value.
    pub fn get(self) -> u8 {
        self.0
    }

    /// Whether every address of this target fits an 11-bit standard CAN ID.
    ///
    /// Targets 0x10 - 0x1F need extended identifiers, which SocketCAN
    /// transports refuse to send.
    pub fn fits_standard_id(self) -> bool {
        self.0 <= MAX_STANDARD_TARGET
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// Parses `0x`-prefixed hexadecimal or plain decimal.
impl FromStr for TargetId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let parsed = match s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
        {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => s.parse::<u32>(),
        };

        let value = parsed.map_err(|_| Error::InvalidTarget(format!("invalid format: {s}")))?;
        let id = u8::try_from(value).map_err(|_| {
            Error::InvalidTarget(format!(
                "{s} (must be between 0 and 0x{MAX_TARGET:02X})"
            ))
        })?;
        Self::new(id)
    }
}

impl TryFrom<u8> for TargetId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TargetId> for u8 {
    fn from(id: TargetId) -> Self {
        id.0
    }
}

/// A single bootloader frame: address field plus up to 8 payload bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    address: u16,
    len: u8,
    data: [u8; MAX_PAYLOAD],
}

impl Frame {
    /// Encode a frame for `target` carrying `command` and `payload`.
    #[allow(clippy::cast_possible_truncation)] // payload length checked against MAX_PAYLOAD
    pub fn encode(target: TargetId, command: u8, payload: &[u8]) -> Result<Self> {
        if command > MAX_COMMAND {
            return Err(Error::InvalidCommand(command));
        }
        if payload.len() > MAX_PAYLOAD {
            return Err(Error::PayloadTooLong(payload.len()));
        }

        let mut data = [0u8; MAX_PAYLOAD];
        data[..payload.len()].copy_from_slice(payload);

        Ok(Self {
            address: (u16::from(target.get()) << COMMAND_BITS) | u16::from(command),
            len: payload.len() as u8,
            data,
        })
    }

    /// Encode a frame for one of the known bootloader commands.
    pub fn command(target: TargetId, command: Command, payload: &[u8]) -> Result<Self> {
        Self::encode(target, command as u8, payload)
    }

    /// Build a frame from a raw address and payload as received from the bus.
    ///
    /// Address bits beyond the target and command fields are ignored, and
    /// payload bytes past the eighth are dropped.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_raw(address: u16, payload: &[u8]) -> Self {
        let len = payload.len().min(MAX_PAYLOAD);
        let mut data = [0u8; MAX_PAYLOAD];
        data[..len].copy_from_slice(&payload[..len]);

        Self {
            address: address & ADDRESS_MASK,
            len: len as u8,
            data,
        }
    }

    /// Split the frame into target identifier, command identifier and payload.
    pub fn decode(&self) -> (TargetId, u8, &[u8]) {
        (self.target(), self.command_id(), self.payload())
    }

    /// Raw address field.
    pub fn address(&self) -> u16 {
        self.address
    }

    /// Target identifier carried in the address field.
    #[allow(clippy::cast_possible_truncation)] // ADDRESS_MASK keeps this within 5 bits
    pub fn target(&self) -> TargetId {
        TargetId((self.address >> COMMAND_BITS) as u8)
    }

    /// Command identifier carried in the address field.
    #[allow(clippy::cast_possible_truncation)]
    pub fn command_id(&self) -> u8 {
        (self.address & COMMAND_MASK) as u8
    }

    /// Payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data[..usize::from(self.len)]
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("address", &format_args!("0x{:03X}", self.address))
            .field("target", &self.target())
            .field("command", &format_args!("0x{:02X}", self.command_id()))
            .field("payload", &self.payload())
            .finish()
    }
}
