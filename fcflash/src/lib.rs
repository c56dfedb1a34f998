//! # fcflash
//!
//! A library for flashing flight-controller firmware over a serial
//! bootloader.
//!
//! This crate provides the core functionality for updating ArduPilot-style
//! flight controllers, including:
//!
//! - `.apj` firmware container parsing (JSON envelope, base64 image)
//! - Serial bootloader protocol (sync, identify, erase, program, verify,
//!   reboot)
//! - A threaded flash orchestrator with push-based progress events and
//!   cooperative cancellation
//!
//! ## Supported Platforms
//!
//! - **Native** (default): Linux, macOS, Windows via the `serialport` crate
//!
//! ## Features
//!
//! - `native` (default): Native serial port support
//!
//! ## Example
//!
//! ```rust,no_run
//! use fcflash::{FlashEngine, FlashEvent, FlashRequest, NativePort, SerialConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = FlashEngine::new();
//!     let request = FlashRequest::new("firmware.apj");
//!     let config = SerialConfig::new("/dev/ttyACM0", 115200);
//!
//!     let handle = engine.start(request, move || NativePort::open_with_retry(&config))?;
//!     for event in handle.events().iter() {
//!         match event {
//!             FlashEvent::Progress { stage, percent } => {
//!                 println!("[{percent:3}%] {stage}");
//!             }
//!             FlashEvent::Status(msg) => println!("{msg}"),
//!             FlashEvent::Complete(outcome) => {
//!                 println!("{outcome:?}");
//!                 break;
//!             }
//!         }
//!     }
//!     handle.join();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod device;
pub mod error;
pub mod flasher;
pub mod image;
pub mod orchestrator;
pub mod port;
pub mod protocol;

pub use cancel::CancelToken;
pub use device::DeviceInfo;
pub use error::{Error, Result};
pub use flasher::{BootloaderClient, FlashTimings, VerifyOutcome};
pub use image::FirmwareImage;
pub use orchestrator::{
    BootloaderEntry, FlashEngine, FlashEvent, FlashHandle, FlashOutcome, FlashRequest, FlashStage,
};
pub use port::{Port, SerialConfig};

#[cfg(feature = "native")]
pub use port::NativePort;
