//! Flash operation orchestration.
//!
//! [`FlashEngine`] runs the end-to-end update sequence on a worker thread:
//! load firmware, enter the bootloader, sync, identify, erase, program,
//! verify, reboot. Observers consume a channel of [`FlashEvent`]s; the
//! engine guarantees exactly one terminal [`FlashEvent::Complete`] per run
//! and that the serial port is closed before it is sent, whatever path the
//! run took.
//!
//! At most one flash operation runs at a time. A second
//! [`FlashEngine::start`] while a run is active fails with
//! [`Error::FlashInProgress`] without touching any port.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::flasher::{BootloaderClient, FlashTimings, VerifyOutcome};
use crate::image::FirmwareImage;
use crate::port::Port;
use log::{info, warn};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Phase of an in-flight flash operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashStage {
    /// No operation running.
    Idle,
    /// Reading and decoding the firmware container.
    Loading,
    /// Asking the application firmware to drop into its bootloader.
    EnteringBootloader,
    /// Establishing protocol synchronization.
    Syncing,
    /// Querying the board identity.
    Identifying,
    /// Full-chip erase in progress.
    Erasing,
    /// Writing firmware chunks.
    Programming,
    /// Comparing device and local CRCs.
    Verifying,
    /// Booting the new firmware.
    Rebooting,
    /// Terminal: the update succeeded.
    Completed,
    /// Terminal: the update failed.
    Failed,
    /// Terminal: the update was cancelled.
    Cancelled,
}

impl FlashStage {
    /// Whether this stage ends the operation.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for FlashStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "Idle",
            Self::Loading => "Loading firmware",
            Self::EnteringBootloader => "Entering bootloader",
            Self::Syncing => "Connecting",
            Self::Identifying => "Identifying board",
            Self::Erasing => "Erasing",
            Self::Programming => "Programming",
            Self::Verifying => "Verifying",
            Self::Rebooting => "Rebooting",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        };
        write!(f, "{label}")
    }
}

/// Terminal result of a flash operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashOutcome {
    /// The full sequence ran to completion.
    Success {
        /// Human-readable completion summary.
        message: String,
    },
    /// The operation failed; the message is the rendered error.
    Failed {
        /// Human-readable failure description.
        message: String,
    },
    /// The operation was cancelled by request.
    Cancelled,
}

/// Push notification emitted by the flash worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashEvent {
    /// The operation advanced. Percent is monotone non-decreasing within
    /// a run, 0 through 100.
    Progress { stage: FlashStage, percent: u8 },
    /// Human-readable status line.
    Status(String),
    /// Exactly one per run, always last, sent after the port is closed.
    Complete(FlashOutcome),
}

/// Best-effort hook that coaxes a running application into its bootloader
/// (for example by sending a reboot-to-bootloader command over a telemetry
/// link) before the serial port is opened.
///
/// Failures are logged and ignored: firmware may already be absent or the
/// device may already sit in its bootloader, in which case sync succeeds
/// without any help.
pub trait BootloaderEntry: Send {
    /// Attempt to put the device into its bootloader.
    fn enter_bootloader(&mut self) -> Result<()>;
}

/// Parameters for one flash operation.
pub struct FlashRequest {
    /// Path to the `.apj` firmware file.
    pub firmware_path: PathBuf,
    /// Protocol timings. Defaults suit real hardware.
    pub timings: FlashTimings,
    /// Optional hook run before the port is opened.
    pub entry: Option<Box<dyn BootloaderEntry>>,
}

impl FlashRequest {
    /// Request for `firmware_path` with default timings and no entry hook.
    pub fn new(firmware_path: impl Into<PathBuf>) -> Self {
        Self {
            firmware_path: firmware_path.into(),
            timings: FlashTimings::default(),
            entry: None,
        }
    }

    /// Override the protocol timings.
    pub fn with_timings(mut self, timings: FlashTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Install a bootloader-entry hook, run before the port is opened.
    pub fn with_entry(mut self, entry: Box<dyn BootloaderEntry>) -> Self {
        self.entry = Some(entry);
        self
    }
}

/// Handle to a running flash operation.
#[derive(Debug)]
pub struct FlashHandle {
    events: Receiver<FlashEvent>,
    cancel: CancelToken,
    thread: JoinHandle<()>,
}

impl FlashHandle {
    /// Event stream for this run. Ends after [`FlashEvent::Complete`].
    pub fn events(&self) -> &Receiver<FlashEvent> {
        &self.events
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Clone of the cancellation token, e.g. for a signal handler.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the worker thread to finish.
    pub fn join(self) {
        if self.thread.join().is_err() {
            warn!("Flash worker thread panicked");
        }
    }
}

/// Emits progress events with a monotone percent clamp.
struct ProgressSink {
    tx: Sender<FlashEvent>,
    last_percent: u8,
}

impl ProgressSink {
    fn new(tx: Sender<FlashEvent>) -> Self {
        Self {
            tx,
            last_percent: 0,
        }
    }

    fn progress(&mut self, stage: FlashStage, percent: u8) {
        let percent = percent.clamp(self.last_percent, 100);
        self.last_percent = percent;
        let _ = self.tx.send(FlashEvent::Progress { stage, percent });
    }

    fn status(&self, message: impl Into<String>) {
        let _ = self.tx.send(FlashEvent::Status(message.into()));
    }

    fn complete(&self, outcome: FlashOutcome) {
        let _ = self.tx.send(FlashEvent::Complete(outcome));
    }
}

/// Resets the busy flag when the worker exits, panic included.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Single-operation flash engine.
///
/// Cheap to clone; clones share the busy flag, so the one-operation rule
/// holds across every handle to the same engine.
#[derive(Clone, Default)]
pub struct FlashEngine {
    busy: Arc<AtomicBool>,
}

impl FlashEngine {
    /// Engine with no operation running.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a flash operation is currently running.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Start a flash operation on a worker thread.
    ///
    /// `opener` opens the serial port; it runs on the worker, after the
    /// bootloader-entry hook, so a slow open never blocks the caller. A
    /// device that is mid re-enumeration after rebooting into its
    /// bootloader makes the open itself fail for a few seconds, so open
    /// errors are retried until the connect timeout elapses.
    /// Fails fast with [`Error::FlashInProgress`] if a run is active.
    pub fn start<P, O>(&self, request: FlashRequest, opener: O) -> Result<FlashHandle>
    where
        P: Port + 'static,
        O: FnMut() -> Result<P> + Send + 'static,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::FlashInProgress);
        }
        let guard = BusyGuard(Arc::clone(&self.busy));

        let (tx, rx) = channel();
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();

        let thread = thread::Builder::new()
            .name("fcflash-worker".into())
            .spawn(move || {
                let _guard = guard;
                run_operation(request, opener, &worker_cancel, tx);
            })
            .map_err(Error::Io)?;

        Ok(FlashHandle { events: rx, cancel, thread })
    }
}

/// Worker body. Owns the port lifecycle and the terminal-event contract.
fn run_operation<P, O>(
    request: FlashRequest,
    opener: O,
    cancel: &CancelToken,
    tx: Sender<FlashEvent>,
) where
    P: Port,
    O: FnMut() -> Result<P>,
{
    let mut sink = ProgressSink::new(tx);
    let mut client: Option<BootloaderClient<P>> = None;

    let result = flash_sequence(request, opener, cancel, &mut sink, &mut client);

    // Port closed on every terminal path, before the Complete event.
    if let Some(client) = client.as_mut() {
        client.close();
    }

    match result {
        Ok(message) => {
            sink.progress(FlashStage::Completed, 100);
            sink.status(&message);
            sink.complete(FlashOutcome::Success { message });
        },
        Err(Error::Cancelled) => {
            info!("Flash operation cancelled");
            let percent = sink.last_percent;
            sink.progress(FlashStage::Cancelled, percent);
            sink.complete(FlashOutcome::Cancelled);
        },
        Err(e) => {
            warn!("Flash operation failed: {e}");
            let percent = sink.last_percent;
            sink.progress(FlashStage::Failed, percent);
            sink.complete(FlashOutcome::Failed {
                message: e.to_string(),
            });
        },
    }
}

/// Percent reached when the erase completes.
const PERCENT_ERASED: u8 = 20;
/// Percent reached when programming completes.
const PERCENT_PROGRAMMED: u8 = 80;
/// Percent reached when verification completes.
const PERCENT_VERIFIED: u8 = 90;
/// Status line cadence during programming, in chunks.
const STATUS_CHUNK_INTERVAL: usize = 50;

fn flash_sequence<P, O>(
    mut request: FlashRequest,
    mut opener: O,
    cancel: &CancelToken,
    sink: &mut ProgressSink,
    client_slot: &mut Option<BootloaderClient<P>>,
) -> Result<String>
where
    P: Port,
    O: FnMut() -> Result<P>,
{
    sink.progress(FlashStage::Loading, 0);
    sink.status(format!(
        "Loading firmware from {}",
        request.firmware_path.display()
    ));
    let image = FirmwareImage::from_file(&request.firmware_path)?;
    let version = image
        .version
        .clone()
        .unwrap_or_else(|| "unknown version".to_string());
    sink.status(format!(
        "Loaded {version} ({:.1} KiB, board id {})",
        image.size_kib(),
        image.board_id
    ));

    sink.progress(FlashStage::EnteringBootloader, 2);
    if let Some(entry) = request.entry.as_mut() {
        sink.status("Requesting reboot into bootloader".to_string());
        if let Err(e) = entry.enter_bootloader() {
            // Non-fatal: the device may already be in its bootloader.
            warn!("Bootloader entry request failed: {e}");
        }
    }

    sink.progress(FlashStage::Syncing, 5);
    sink.status("Connecting to bootloader".to_string());

    // Opening and syncing share one connection budget: the device drops
    // off the bus for several seconds while it re-enumerates as a
    // bootloader, so open errors are retried like failed sync probes.
    let deadline = Instant::now() + request.timings.connect_timeout;
    let client = loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match opener() {
            Ok(port) => {
                break client_slot
                    .insert(BootloaderClient::with_timings(port, request.timings.clone()));
            },
            Err(e) => {
                warn!("Port open failed, retrying: {e}");
                if Instant::now() >= deadline {
                    return Err(Error::ConnectionTimeout);
                }
                thread::sleep(request.timings.connect_retry_delay);
            },
        }
    };
    client.sync_until(cancel, deadline)?;
    sink.progress(FlashStage::Identifying, 10);

    if let Some(device) = client.identify()? {
        sink.status(format!("Detected board: {device}"));
        if u32::from(image.board_id) != device.board_id {
            sink.status(format!(
                "Warning: firmware targets board id {} but device reports {}",
                image.board_id, device.board_id
            ));
        }
    } else {
        sink.status("Could not identify board, continuing".to_string());
    }

    sink.progress(FlashStage::Erasing, 15);
    sink.status("Erasing flash (this can take 10-30 seconds)".to_string());
    client.erase(cancel)?;
    sink.progress(FlashStage::Erasing, PERCENT_ERASED);

    sink.progress(FlashStage::Programming, PERCENT_ERASED);
    sink.status(format!("Programming {:.1} KiB", image.size_kib()));
    let span = u64::from(PERCENT_PROGRAMMED - PERCENT_ERASED);
    let mut chunk_index = 0usize;
    {
        // Split borrows so the progress closure can use the sink while the
        // client drives the port.
        let sink = &mut *sink;
        client.program(&image.image, cancel, |written, total| {
            chunk_index += 1;
            let percent =
                u64::from(PERCENT_ERASED) + (written as u64 * span) / total.max(1) as u64;
            sink.progress(FlashStage::Programming, percent as u8);
            let is_last = written >= total;
            if chunk_index % STATUS_CHUNK_INTERVAL == 0 || is_last {
                sink.status(format!(
                    "Programmed {:.0}/{:.0} KiB",
                    written as f64 / 1024.0,
                    total as f64 / 1024.0
                ));
            }
        })?;
    }
    sink.progress(FlashStage::Programming, PERCENT_PROGRAMMED);

    sink.progress(FlashStage::Verifying, PERCENT_PROGRAMMED);
    sink.status("Verifying firmware".to_string());
    match client.verify(&image.image, cancel)? {
        VerifyOutcome::Verified { .. } => {
            sink.status("Verification successful, CRC match".to_string());
        },
        VerifyOutcome::Unsupported => {
            sink.status("CRC verification not supported, skipping".to_string());
        },
    }
    sink.progress(FlashStage::Verifying, PERCENT_VERIFIED);

    sink.progress(FlashStage::Rebooting, PERCENT_VERIFIED);
    sink.status("Rebooting device".to_string());
    if let Err(e) = client.reboot() {
        // The firmware is already written; a failed boot command just
        // means the user power-cycles the board instead.
        warn!("Boot command failed: {e}");
        sink.status("Could not send boot command; power-cycle the board".to_string());
    }

    Ok(format!("Firmware update complete ({version})"))
}
