//! Firmware upload orchestration.
//!
//! An upload is a strictly linear sequence with no retries and no rollback:
//!
//! ```text
//! Idle -> Erasing -> BeginWrite -> Writing(1..N) -> EndWrite -> Verifying -> Verified
//!                                                                        \-> Rejected
//! (any step) -> Failed
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! # #[cfg(all(feature = "socketcan", target_os = "linux"))]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use canboot::{FirmwareImage, SocketCanTransport, Uploader};
//!
//! let transport = SocketCanTransport::open("can0")?;
//! let mut uploader = Uploader::new(transport)?;
//!
//! let image = FirmwareImage::from_file("app.bin")?;
//! let report = uploader.upload(&image, |current, total| {
//!     println!("{current}/{total} bytes");
//! })?;
//! println!("Device CRC: {:?}", report.device_checksum);
//! # Ok(())
//! # }
//! # #[cfg(not(all(feature = "socketcan", target_os = "linux")))]
//! # fn main() {}
//! ```

use crate::device::DeviceInfo;
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::image::{FirmwareImage, WORD_SIZE};
use crate::protocol::{Command, TargetId};
use crate::state::SessionState;
use crate::synchronizer::{ACK_TIMEOUT, CHECKSUM_TIMEOUT, CommandSynchronizer};
use crate::transport::Transport;
use log::{error, info, warn};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Progress is reported every time this many source bytes have been written.
pub const PROGRESS_INTERVAL: usize = 1024;

/// Where the most recent upload is (or stopped).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadStage {
    /// No upload started yet.
    #[default]
    Idle,
    /// Waiting for the erase acknowledgement.
    Erasing,
    /// Waiting for the start-write acknowledgement.
    BeginWrite,
    /// Streaming words.
    Writing {
        /// 1-based index of the word in flight.
        chunk: usize,
        /// Total number of words.
        total: usize,
    },
    /// Waiting for the end-write acknowledgement.
    EndWrite,
    /// Waiting for the device checksum.
    Verifying,
    /// Device checksum matched.
    Verified,
    /// Device checksum differed.
    Rejected,
    /// Send error, negative acknowledgement, timeout or interruption.
    Failed,
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Erasing => write!(f, "erasing"),
            Self::BeginWrite => write!(f, "begin write"),
            Self::Writing { chunk, total } => write!(f, "writing word {chunk}/{total}"),
            Self::EndWrite => write!(f, "end write"),
            Self::Verifying => write!(f, "verifying"),
            Self::Verified => write!(f, "verified"),
            Self::Rejected => write!(f, "rejected"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Summary of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct UploadReport {
    /// Image size in bytes.
    pub bytes: usize,
    /// Words acknowledged by the device.
    pub words_written: usize,
    /// Words the device failed to acknowledge (0 or 1; the upload stops at the first).
    pub words_failed: usize,
    /// CRC-32 of the local image.
    pub local_checksum: u32,
    /// CRC-32 reported by the device after writing.
    pub device_checksum: Option<u32>,
}

/// Drives the bootloader command sequence over a [`Transport`].
pub struct Uploader<T: Transport> {
    sync: CommandSynchronizer<T>,
    stage: UploadStage,
    ack_timeout: Duration,
    checksum_timeout: Duration,
}

impl<T: Transport> Uploader<T> {
    /// Create an uploader with fresh session state and start receiving.
    pub fn new(transport: T) -> Result<Self> {
        Self::with_state(transport, Arc::new(SessionState::new()))
    }

    /// Create an uploader sharing `state`, hook up the dispatcher and start receiving.
    pub fn with_state(mut transport: T, state: Arc<SessionState>) -> Result<Self> {
        transport.on_receive(Dispatcher::new(Arc::clone(&state)).into_handler());
        transport.start_receiving()?;

        Ok(Self {
            sync: CommandSynchronizer::new(transport, state),
            stage: UploadStage::Idle,
            ack_timeout: ACK_TIMEOUT,
            checksum_timeout: CHECKSUM_TIMEOUT,
        })
    }

    /// Override the acknowledgement and checksum deadlines.
    #[must_use]
    pub fn with_timeouts(mut self, ack_timeout: Duration, checksum_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self.checksum_timeout = checksum_timeout;
        self
    }

    /// Shared session state.
    pub fn state(&self) -> &Arc<SessionState> {
        self.sync.state()
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        self.sync.transport()
    }

    /// Stage reached by the most recent upload.
    pub fn stage(&self) -> UploadStage {
        self.stage
    }

    /// Currently addressed bootloader.
    pub fn target(&self) -> TargetId {
        self.state().target()
    }

    /// Address another bootloader for subsequent commands.
    pub fn set_target(&self, target: TargetId) {
        self.state().set_target(target);
        info!("Node ID set to: {target}");
        warn_if_extended(target);
    }

    /// Enable or disable per-frame logging.
    pub fn set_verbose(&self, enabled: bool) {
        self.state().set_verbose(enabled);
    }

    /// Erase the application region.
    pub fn try_erase(&mut self) -> Result<()> {
        self.sync
            .await_acknowledgement(Command::Erase, &[], self.ack_timeout)
    }

    /// Erase the application region, logging the outcome.
    pub fn erase(&mut self) -> bool {
        info!("Erasing application flash...");
        match self.try_erase() {
            Ok(()) => {
                info!("Erase completed successfully!");
                true
            },
            Err(e) => {
                error!("Erase failed: {e}");
                false
            },
        }
    }

    /// Ask the device for the CRC of its application region.
    pub fn try_query_checksum(&mut self) -> Result<u32> {
        self.sync
            .await_checksum(self.checksum_timeout)
    }

    /// Ask the device for its application CRC, logging the outcome.
    pub fn query_checksum(&mut self) -> Option<u32> {
        info!("Requesting application CRC...");
        match self.try_query_checksum() {
            Ok(crc) => {
                info!("Application CRC: 0x{crc:08X}");
                Some(crc)
            },
            Err(e) => {
                error!("Failed to get CRC: {e}");
                None
            },
        }
    }

    /// Static device layout plus the current application CRC.
    pub fn device_info(&mut self) -> DeviceInfo {
        info!("Querying device status...");
        let checksum = self.try_query_checksum().ok();
        DeviceInfo::new(self.target(), checksum)
    }

    /// Load `path` and upload it, resolving every failure into `false` plus a log line.
    pub fn upload_image<F>(&mut self, path: &Path, progress: F) -> bool
    where
        F: FnMut(usize, usize),
    {
        let image = match FirmwareImage::from_file(path) {
            Ok(image) => image,
            Err(e) => {
                error!("{e}");
                return false;
            },
        };

        log_image_summary(path, &image);

        match self.upload(&image, progress) {
            Ok(_) => {
                info!("Firmware upload completed successfully!");
                true
            },
            Err(e) => {
                error!("Firmware upload failed: {e}");
                false
            },
        }
    }

    /// Upload `image`: erase, begin, write every word, end, verify.
    ///
    /// `progress(written, total)` is called every [`PROGRESS_INTERVAL`]
    /// bytes and once at the end of the data phase.
    pub fn upload<F>(&mut self, image: &FirmwareImage, mut progress: F) -> Result<UploadReport>
    where
        F: FnMut(usize, usize),
    {
        self.stage = UploadStage::Idle;
        let result = self.run_upload(image, &mut progress);
        if result.is_err() && self.stage != UploadStage::Rejected {
            self.stage = UploadStage::Failed;
        }
        result
    }

    fn run_upload<F>(&mut self, image: &FirmwareImage, progress: &mut F) -> Result<UploadReport>
    where
        F: FnMut(usize, usize),
    {
        let local_checksum = image.checksum();
        info!("Local file CRC: 0x{local_checksum:08X}");

        let mut report = UploadReport {
            bytes: image.len(),
            words_written: 0,
            words_failed: 0,
            local_checksum,
            device_checksum: None,
        };

        self.stage = UploadStage::Erasing;
        info!("Sending erase command...");
        self.sync
            .await_acknowledgement(Command::Erase, &[], self.ack_timeout)
            .inspect_err(|_| error!("Erase failed!"))?;

        self.stage = UploadStage::BeginWrite;
        info!("Sending start write command...");
        self.sync
            .await_acknowledgement(Command::BeginWrite, &[], self.ack_timeout)
            .inspect_err(|_| error!("Begin write failed!"))?;

        info!("Writing data...");
        let verbose = self.state().verbose();
        self.state().set_verbose(false);
        let written = self.write_words(image, &mut report, progress);
        self.state().set_verbose(verbose);
        written?;

        info!(
            "Download completed! Successful writes: {}",
            report.words_written
        );

        self.stage = UploadStage::EndWrite;
        info!("Sending end write command...");
        self.sync
            .await_acknowledgement(Command::EndWrite, &[], self.ack_timeout)
            .inspect_err(|_| error!("End write failed!"))?;

        self.stage = UploadStage::Verifying;
        info!("Write completed, verifying CRC...");
        let device_checksum = self
            .sync
            .await_checksum(self.checksum_timeout)
            .inspect_err(|_| error!("Failed to get device CRC"))?;
        report.device_checksum = Some(device_checksum);

        info!("Device CRC: 0x{device_checksum:08X}");
        info!("Local CRC:  0x{local_checksum:08X}");

        if device_checksum != local_checksum {
            self.stage = UploadStage::Rejected;
            error!("CRC verification failed!");
            return Err(Error::ChecksumMismatch {
                expected: local_checksum,
                actual: device_checksum,
            });
        }

        self.stage = UploadStage::Verified;
        info!("CRC verification passed!");
        Ok(report)
    }

    fn write_words<F>(
        &mut self,
        image: &FirmwareImage,
        report: &mut UploadReport,
        progress: &mut F,
    ) -> Result<()>
    where
        F: FnMut(usize, usize),
    {
        let total_bytes = image.len();
        let total_words = image.word_count();

        for (index, word) in image.words().enumerate() {
            let offset = index * WORD_SIZE;
            if crate::is_interrupted_requested() {
                error!("Upload interrupted at idx={offset}");
                return Err(Error::Interrupted);
            }

            self.stage = UploadStage::Writing {
                chunk: index + 1,
                total: total_words,
            };

            if let Err(e) = self
                .sync
                .await_acknowledgement(Command::WriteData, &word, self.ack_timeout)
            {
                report.words_failed += 1;
                error!("Write word failed at idx={offset}");
                info!(
                    "Successful writes: {}, Failed writes: {}",
                    report.words_written, report.words_failed
                );
                return Err(e);
            }
            report.words_written += 1;

            let consumed = (offset + WORD_SIZE).min(total_bytes);
            if consumed % PROGRESS_INTERVAL == 0 || consumed == total_bytes {
                progress(consumed, total_bytes);
            }
        }

        Ok(())
    }
}

/// Image size as bytes and KB, e.g. `2050 bytes (2.00 KB)`.
#[allow(clippy::cast_precision_loss)]
pub fn format_image_size(len: usize) -> String {
    format!("{len} bytes ({:.2} KB)", len as f64 / 1024.0)
}

/// Log the source file and size of an image about to be uploaded.
pub fn log_image_summary(path: &Path, image: &FirmwareImage) {
    info!("Firmware file: {}", path.display());
    info!("File size: {}", format_image_size(image.len()));
}

fn warn_if_extended(target: TargetId) {
    if !target.fits_standard_id() {
        warn!(
            "Node ID {target} needs extended CAN identifiers; SocketCAN interfaces cannot address it"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_image_size() {
        assert_eq!(format_image_size(2050), "2050 bytes (2.00 KB)");
        assert_eq!(format_image_size(512), "512 bytes (0.50 KB)");
        assert_eq!(format_image_size(1), "1 bytes (0.00 KB)");
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(UploadStage::Idle.to_string(), "idle");
        assert_eq!(
            UploadStage::Writing { chunk: 3, total: 513 }.to_string(),
            "writing word 3/513"
        );
        assert_eq!(UploadStage::Rejected.to_string(), "rejected");
    }

    #[test]
    fn test_stage_default_is_idle() {
        assert_eq!(UploadStage::default(), UploadStage::Idle);
    }
}
