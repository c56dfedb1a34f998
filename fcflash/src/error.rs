//! Error types for fcflash.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for fcflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for fcflash operations.
///
/// Recoverable, stage-local conditions (unknown board identity, verification
/// unsupported by the bootloader, a failed best-effort bootloader-entry
/// request) are deliberately not represented here. They are absorbed where
/// they occur and surfaced as status events instead.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Firmware container file does not exist.
    #[error("Firmware file not found: {0}")]
    ImageNotFound(PathBuf),

    /// Firmware container is malformed or its payload is not valid base64.
    #[error("Invalid firmware container: {0}")]
    ImageDecode(String),

    /// The bootloader never answered the sync handshake.
    #[error("Failed to connect to bootloader (timeout)")]
    ConnectionTimeout,

    /// Full-chip erase did not complete in time.
    #[error("Flash erase timeout after {0} seconds")]
    EraseTimeout(u64),

    /// A program chunk was not acknowledged. No retry is attempted so a
    /// misbehaving link cannot silently duplicate writes.
    #[error("Programming failed at byte {offset}")]
    ProgramFailure {
        /// Byte offset of the first byte of the rejected chunk.
        offset: usize,
    },

    /// Device-reported CRC does not match the locally computed one.
    #[error("CRC mismatch: device reported {actual:#010X}, expected {expected:#010X}")]
    VerifyMismatch {
        /// CRC-32 computed locally over the firmware image.
        expected: u32,
        /// CRC-32 reported by the bootloader.
        actual: u32,
    },

    /// Another flash operation is already running.
    #[error("A flash operation is already in progress")]
    FlashInProgress,

    /// The operation was cancelled by the caller. Terminal, not a fault.
    #[error("Cancelled")]
    Cancelled,
}

impl Error {
    /// Whether this error represents caller-requested cancellation rather
    /// than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_timeout_message() {
        let err = Error::ConnectionTimeout;
        assert_eq!(err.to_string(), "Failed to connect to bootloader (timeout)");
    }

    #[test]
    fn test_program_failure_message_contains_offset() {
        let err = Error::ProgramFailure { offset: 5000 };
        assert!(err.to_string().contains("5000"));
    }

    #[test]
    fn test_cancelled_classification() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::ConnectionTimeout.is_cancelled());
    }
}
