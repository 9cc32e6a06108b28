//! # canboot
//!
//! A library for uploading firmware to bootloaders on a shared CAN bus.
//!
//! This crate provides the protocol engine that talks to the bootloader:
//!
//! - Frame codec for the target/command address layout
//! - Receive-side dispatcher turning broadcast frames into responses
//! - Blocking command synchronizer with per-command deadlines
//! - Upload orchestration: erase, write, verify
//! - CRC-32 image verification
//!
//! ## Supported Platforms
//!
//! - **Linux** (default): SocketCAN via the `socketcan` crate
//! - Anything else through a custom [`Transport`] implementation
//!
//! ## Features
//!
//! - `socketcan` (default): SocketCAN transport (Linux only)
//! - `serde`: Serialization support for reports and device information
//!
//! ## Example
//!
//! ```rust,no_run
//! use canboot::{FirmwareImage, TargetId};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = FirmwareImage::from_file("app.bin")?;
//!     println!("{} words, CRC 0x{:08X}", image.word_count(), image.checksum());
//!
//!     #[cfg(all(feature = "socketcan", target_os = "linux"))]
//!     {
//!         let transport = canboot::SocketCanTransport::open("can0")?;
//!         let mut uploader = canboot::Uploader::new(transport)?;
//!         uploader.set_target("0x02".parse::<TargetId>()?);
//!
//!         uploader.upload(&image, |current, total| {
//!             println!("Uploading: {current}/{total}");
//!         })?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod device;
pub mod dispatcher;
pub mod error;
pub mod image;
pub mod protocol;
pub mod state;
pub mod synchronizer;
pub mod transport;
pub mod uploader;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications).
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

// Re-exports for convenience
#[cfg(all(feature = "socketcan", target_os = "linux"))]
pub use transport::SocketCanTransport;
pub use {
    device::{ApplicationState, DeviceInfo},
    dispatcher::Dispatcher,
    error::{Error, Result},
    image::{FILL_BYTE, FirmwareImage, WORD_SIZE},
    protocol::{Command, Frame, Response, TargetId, WaitKind, crc::crc32},
    state::{Delivery, SessionState},
    synchronizer::{ACK_TIMEOUT, CHECKSUM_TIMEOUT, CommandSynchronizer},
    transport::{FrameHandler, Transport},
    uploader::{UploadReport, UploadStage, Uploader},
};
