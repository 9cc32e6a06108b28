//! Static layout of the bootloader target and its application state.

use crate::protocol::TargetId;
use std::fmt;

/// First address of the application region.
pub const APPLICATION_START: u32 = 0x0800_8000;

/// End of the application region.
pub const APPLICATION_END: u32 = 0x080C_0000;

/// Total flash size in bytes.
pub const FLASH_SIZE: u32 = 1024 * 1024;

/// Total RAM size in bytes.
pub const RAM_SIZE: u32 = 256 * 1024;

/// CRC the bootloader reports for a fully erased application region.
pub const BLANK_CHECKSUM: u32 = 0xFFFF_FFFF;

/// Programming state of the application region, derived from its CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ApplicationState {
    /// A checksum other than the blank value was reported.
    Valid,
    /// The region reads as erased or was never programmed.
    Blank,
    /// The device did not report a checksum.
    Unknown,
}

impl fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => write!(f, "VALID"),
            Self::Blank => write!(f, "INVALID or not programmed"),
            Self::Unknown => write!(f, "UNKNOWN (no response)"),
        }
    }
}

/// Device information shown by the `info` command.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeviceInfo {
    /// Bootloader the information was queried from.
    pub target: TargetId,
    /// First address of the application region.
    pub application_start: u32,
    /// End of the application region.
    pub application_end: u32,
    /// Flash size in bytes.
    pub flash_size: u32,
    /// RAM size in bytes.
    pub ram_size: u32,
    /// CRC of the application region, if the device answered.
    pub application_checksum: Option<u32>,
}

impl DeviceInfo {
    /// Layout for `target` with the given checksum query result.
    pub fn new(target: TargetId, application_checksum: Option<u32>) -> Self {
        Self {
            target,
            application_start: APPLICATION_START,
            application_end: APPLICATION_END,
            flash_size: FLASH_SIZE,
            ram_size: RAM_SIZE,
            application_checksum,
        }
    }

    /// Whether the application region holds a programmed image.
    pub fn application_state(&self) -> ApplicationState {
        match self.application_checksum {
            Some(BLANK_CHECKSUM) => ApplicationState::Blank,
            Some(_) => ApplicationState::Valid,
            None => ApplicationState::Unknown,
        }
    }

    /// Size of the application region in bytes.
    pub fn application_size(&self) -> u32 {
        self.application_end
            .saturating_sub(self.application_start)
    }
}
