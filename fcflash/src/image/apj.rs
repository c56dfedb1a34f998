//! APJ firmware container format.
//!
//! APJ is the ArduPilot firmware container: a JSON envelope carrying the
//! board id the image was built for and the application binary itself,
//! base64-encoded. Optional metadata (version summary, git hash) rides
//! along for display purposes.
//!
//! ```text
//! {
//!   "board_id": 12,
//!   "image": "<base64 binary>",
//!   "summary": "ArduCopter V4.5.1",   (optional)
//!   "git_hash": "3f1a9c2"             (optional)
//! }
//! ```
//!
//! Loading is a pure, synchronous pre-flight step: no retries, and every
//! failure here is fatal before a serial port is ever opened.

use crate::error::{Error, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::debug;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Raw JSON envelope as stored on disk.
#[derive(Debug, Deserialize)]
struct ApjEnvelope {
    board_id: u16,
    image: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    git_hash: Option<String>,
}

/// A decoded firmware image ready to be programmed.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    /// Board id the firmware was built for.
    pub board_id: u16,
    /// Decoded application binary. Never empty.
    pub image: Vec<u8>,
    /// Human-readable version summary, if the container carried one.
    pub version: Option<String>,
    /// Git hash of the firmware build, if the container carried one.
    pub build_hash: Option<String>,
}

impl FirmwareImage {
    /// Load and decode a firmware container from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading firmware container from: {}", path.display());

        if !path.exists() {
            return Err(Error::ImageNotFound(path.to_path_buf()));
        }

        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse a firmware container from its JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let envelope: ApjEnvelope = serde_json::from_str(text)
            .map_err(|e| Error::ImageDecode(format!("malformed envelope: {e}")))?;

        let image = BASE64
            .decode(envelope.image.trim())
            .map_err(|e| Error::ImageDecode(format!("image payload is not valid base64: {e}")))?;

        if image.is_empty() {
            return Err(Error::ImageDecode("image payload is empty".into()));
        }

        debug!(
            "Firmware decoded: board_id=0x{:04X}, {} bytes, version={}",
            envelope.board_id,
            image.len(),
            envelope.summary.as_deref().unwrap_or("N/A")
        );

        Ok(Self {
            board_id: envelope.board_id,
            image,
            version: envelope.summary,
            build_hash: envelope.git_hash,
        })
    }

    /// Image size in bytes.
    pub fn size(&self) -> usize {
        self.image.len()
    }

    /// Image size in KiB, for status text.
    #[allow(clippy::cast_precision_loss)]
    pub fn size_kib(&self) -> f64 {
        self.image.len() as f64 / 1024.0
    }
}
