//! Firmware container parsing.

pub mod apj;

pub use apj::FirmwareImage;
