//! Board identity lookup.
//!
//! The bootloader reports a 32-bit board id in response to `GET_DEVICE`.
//! The mapping from id to human-readable name is pure static data.

use std::fmt;

/// Known board ids and their marketing names.
///
/// Ids come from the ArduPilot/PX4 board manifest; only the boards this tool
/// is deployed against are listed. Anything else renders as `Unknown`.
pub const BOARD_NAMES: &[(u32, &str)] = &[
    (0x0009, "Cube Black"),
    (0x000C, "Cube Orange"),
    (0x0011, "Cube Orange+"),
    (0x0032, "Pixhawk 1"),
    (0x0042, "Pixhawk 4"),
];

/// Look up the name for a board id.
///
/// An unmapped id is reported as `Unknown (0xNNNN)` and is never treated as
/// an error; flashing proceeds with the unknown identity.
pub fn board_name(board_id: u32) -> String {
    BOARD_NAMES
        .iter()
        .find(|(id, _)| *id == board_id)
        .map_or_else(
            || format!("Unknown (0x{board_id:04X})"),
            |(_, name)| (*name).to_string(),
        )
}

/// Board identity decoded from a `GET_DEVICE` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Raw 32-bit board id.
    pub board_id: u32,
    /// Resolved board name, or `Unknown (0xNNNN)`.
    pub board_name: String,
}

impl DeviceInfo {
    /// Create a device info from a raw board id.
    pub fn from_board_id(board_id: u32) -> Self {
        Self {
            board_id,
            board_name: board_name(board_id),
        }
    }

    /// Whether the board id mapped to a known name.
    pub fn is_known(&self) -> bool {
        BOARD_NAMES.iter().any(|(id, _)| *id == self.board_id)
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "{} (0x{:04X})", self.board_name, self.board_id)
        } else {
            // The unknown name already carries the hex id.
            write!(f, "{}", self.board_name)
        }
    }
}
