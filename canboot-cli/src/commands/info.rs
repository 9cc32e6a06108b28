//! Device info command implementation.

use anyhow::Result;
use canboot::{ApplicationState, DeviceInfo};
use console::style;

use crate::{Settings, open_uploader};

/// Info command implementation.
pub(crate) fn cmd_info(settings: &Settings, json: bool) -> Result<()> {
    let mut uploader = open_uploader(settings)?;
    let info = uploader.device_info();

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "device": info,
                "application_state": info.application_state(),
            }
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output)?
        );
    } else {
        print_device_info(&info);
    }
    Ok(())
}

/// Print device information to stderr.
pub(crate) fn print_device_info(info: &DeviceInfo) {
    eprintln!(
        "{}",
        style("Device Information:")
            .bold()
            .underlined()
    );
    eprintln!("  - Current Node ID: {}", info.target);
    eprintln!("  - Application Start: 0x{:08X}", info.application_start);
    eprintln!("  - Application End: 0x{:08X}", info.application_end);
    eprintln!("  - Flash Size: {}KB", info.flash_size / 1024);
    eprintln!("  - RAM Size: {}KB", info.ram_size / 1024);

    if let Some(crc) = info.application_checksum {
        eprintln!("  - Application CRC: 0x{crc:08X}");
    }

    let state = info.application_state();
    let styled = match state {
        ApplicationState::Valid => style(state.to_string()).green(),
        ApplicationState::Blank => style(state.to_string()).yellow(),
        ApplicationState::Unknown => style(state.to_string()).red(),
    };
    eprintln!("  - Application: {styled}");
}
