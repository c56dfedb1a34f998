//! Firmware info command implementation.

use anyhow::{Context, Result};
use console::style;
use fcflash::{FirmwareImage, device};
use std::path::Path;

/// Info command implementation.
pub(crate) fn cmd_info(firmware: &Path, json: bool) -> Result<()> {
    let image = FirmwareImage::from_file(firmware)
        .with_context(|| format!("Failed to load firmware from {}", firmware.display()))?;

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "board_id": image.board_id,
                "board_name": device::board_name(u32::from(image.board_id)),
                "version": image.version,
                "git_hash": image.build_hash,
                "image_size": image.size(),
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    eprintln!("\n{}", style("Firmware Information").bold().underlined());
    eprintln!("  File:       {}", firmware.display());
    eprintln!(
        "  Version:    {}",
        image.version.as_deref().unwrap_or("unknown")
    );
    eprintln!(
        "  Board:      {} (id {})",
        device::board_name(u32::from(image.board_id)),
        image.board_id
    );
    if let Some(hash) = &image.build_hash {
        eprintln!("  Git hash:   {hash}");
    }
    eprintln!(
        "  Image size: {} bytes ({:.1} KiB)",
        image.size(),
        image.size_kib()
    );

    Ok(())
}
