//! Erase, write, and CRC command implementations.

use anyhow::Result;
use canboot::uploader::log_image_summary;
use canboot::{Error as CanbootError, FirmwareImage, UploadReport, Uploader};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::path::Path;

use crate::{Bus, CliError, Settings, open_uploader, use_fancy_output};

/// Progress bar for an upload of `total` bytes, hidden when output is not a terminal.
fn progress_bar(settings: &Settings, total: usize) -> ProgressBar {
    if settings.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total as u64);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    pb
}

/// Load a firmware file, rejecting missing and empty files.
pub(crate) fn load_image(path: &Path) -> Result<FirmwareImage> {
    FirmwareImage::from_file(path).map_err(|e| CliError::Failed(e.to_string()).into())
}

/// Upload `image` with a progress bar and map library errors to CLI errors.
pub(crate) fn upload_with_progress(
    uploader: &mut Uploader<Bus>,
    image: &FirmwareImage,
    path: &Path,
    settings: &Settings,
) -> Result<UploadReport> {
    log_image_summary(path, image);

    let pb = progress_bar(settings, image.len());
    pb.set_message(format!("node {}", uploader.target()));

    let result = uploader.upload(image, |current, _total| {
        pb.set_position(current as u64);
    });

    match result {
        Ok(report) => {
            pb.finish_with_message("verified");
            info!("Firmware upload completed successfully!");
            Ok(report)
        },
        Err(CanbootError::Interrupted) => {
            pb.abandon_with_message("interrupted");
            Err(CliError::Cancelled("Upload interrupted".to_string()).into())
        },
        Err(e) => {
            pb.abandon_with_message(uploader.stage().to_string());
            Err(CliError::Failed(format!("Firmware upload failed: {e}")).into())
        },
    }
}

/// Erase command implementation.
pub(crate) fn cmd_erase(settings: &Settings) -> Result<()> {
    let mut uploader = open_uploader(settings)?;
    if uploader.erase() {
        Ok(())
    } else {
        Err(CliError::Failed("Erase failed".to_string()).into())
    }
}

/// Write command implementation.
pub(crate) fn cmd_write(settings: &Settings, file: &Path) -> Result<()> {
    // Validate before touching the bus.
    let image = load_image(file)?;

    let mut uploader = open_uploader(settings)?;
    let report = upload_with_progress(&mut uploader, &image, file, settings)?;

    if !settings.quiet {
        eprintln!(
            "{} Uploaded {} bytes ({} words) to node {}, CRC 0x{:08X}",
            style("✓").green(),
            report.bytes,
            report.words_written,
            uploader.target(),
            report.local_checksum
        );
    }
    Ok(())
}

/// CRC command implementation.
pub(crate) fn cmd_crc(settings: &Settings, json: bool) -> Result<()> {
    let mut uploader = open_uploader(settings)?;
    let crc = uploader
        .query_checksum()
        .ok_or_else(|| CliError::Failed("Failed to get CRC".to_string()))?;

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "target": uploader.target().get(),
                "crc": crc,
                "crc_hex": format!("0x{crc:08X}"),
            }
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output)?
        );
    } else {
        println!("0x{crc:08X}");
    }
    Ok(())
}
