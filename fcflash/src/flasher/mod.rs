//! Bootloader protocol client.
//!
//! [`BootloaderClient`] drives one flash operation's wire exchanges against
//! a generic [`Port`]: sync handshake, device identification, chip erase,
//! chunked programming, CRC verification, and the final reboot command.
//!
//! The client is deliberately free of any notion of threads or events; the
//! orchestrator layers staging, progress reporting, and the single-operation
//! guard on top. Everything time-related is captured in [`FlashTimings`] so
//! tests can run against mock ports without real delays.
//!
//! ## Response reads under fragmentation
//!
//! Serial links are free to deliver a 2-byte acknowledgment as two 1-byte
//! reads. Responses are therefore accumulated across bounded reads up to a
//! deadline; a still-short buffer after the deadline is handed back to the
//! caller, which interprets it contextually ("no response yet", "device
//! does not support this command").

use crate::cancel::CancelToken;
use crate::device::DeviceInfo;
use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::bootloader::{
    ACK_LEN, CRC_RESPONSE_LEN, Command, DEFAULT_CHUNK_SIZE, DEVICE_RESPONSE_LEN, ProgramChunks,
    decode_crc_response, decode_device_response, is_ack, local_crc32, prog_multi_frame, request,
};
use log::{debug, info, trace, warn};
use std::io;
use std::thread;
use std::time::{Duration, Instant};

/// Timeouts, intervals, and transfer parameters for one flash operation.
#[derive(Debug, Clone)]
pub struct FlashTimings {
    /// Overall budget for establishing bootloader sync.
    pub connect_timeout: Duration,
    /// Sync probes per connection attempt before backing off.
    pub sync_retries: u32,
    /// Delay between connection attempts.
    pub connect_retry_delay: Duration,
    /// Overall budget for the full-chip erase.
    pub erase_timeout: Duration,
    /// Poll interval while waiting for the erase acknowledgment.
    pub erase_poll_interval: Duration,
    /// Per-response read budget. Upper-bounds cancellation latency.
    pub read_timeout: Duration,
    /// Program chunk size in bytes. Must be a multiple of 4 and fit in a
    /// single length byte; 252 is what the deployed bootloaders accept.
    pub chunk_size: usize,
}

impl Default for FlashTimings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            sync_retries: 5,
            connect_retry_delay: Duration::from_millis(500),
            erase_timeout: Duration::from_secs(60),
            erase_poll_interval: Duration::from_millis(100),
            read_timeout: Duration::from_millis(1000),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Outcome of the verification stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Device-reported CRC matched the locally computed one.
    Verified {
        /// The matching CRC-32 value.
        crc: u32,
    },
    /// The bootloader did not answer `GET_CRC` usefully. Non-fatal; the
    /// run continues to reboot.
    Unsupported,
}

/// Bootloader protocol client.
///
/// Generic over the port type `P` so the same protocol logic runs against
/// real serial hardware and in-memory test ports.
pub struct BootloaderClient<P: Port> {
    port: P,
    timings: FlashTimings,
}

impl<P: Port> BootloaderClient<P> {
    /// Create a client over an already-open port with default timings.
    pub fn new(port: P) -> Self {
        Self::with_timings(port, FlashTimings::default())
    }

    /// Create a client with explicit timings.
    pub fn with_timings(port: P, timings: FlashTimings) -> Self {
        Self { port, timings }
    }

    /// Get the active timings.
    pub fn timings(&self) -> &FlashTimings {
        &self.timings
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Get a mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Close the underlying port. Idempotent.
    pub fn close(&mut self) {
        if let Err(e) = self.port.close() {
            warn!("Error closing port: {e}");
        }
    }

    /// Accumulate up to `expected` response bytes across bounded reads.
    ///
    /// Returns whatever arrived before the deadline; the result may be
    /// short and callers must interpret that contextually.
    fn read_response(&mut self, expected: usize, timeout: Duration) -> Result<Vec<u8>> {
        let start = Instant::now();
        let mut resp = Vec::with_capacity(expected);
        let mut buf = [0u8; DEVICE_RESPONSE_LEN];

        while resp.len() < expected && start.elapsed() < timeout {
            match self.port.read(&mut buf[..expected - resp.len()]) {
                Ok(n) if n > 0 => resp.extend_from_slice(&buf[..n]),
                Ok(_) => {},
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {},
                Err(e) => return Err(Error::Io(e)),
            }
        }

        trace!("Response: {} of {expected} bytes", resp.len());
        Ok(resp)
    }

    /// Establish protocol synchronization.
    ///
    /// Probes `GET_SYNC` up to `sync_retries` times per attempt, backing
    /// off `connect_retry_delay` between attempts, until `connect_timeout`
    /// elapses. Cancellation is checked once per attempt.
    pub fn sync(&mut self, cancel: &CancelToken) -> Result<()> {
        let deadline = Instant::now() + self.timings.connect_timeout;
        self.sync_until(cancel, deadline)
    }

    /// Like [`Self::sync`], but against an externally supplied deadline.
    ///
    /// Lets the caller charge port opening and the handshake to one shared
    /// connection budget.
    pub fn sync_until(&mut self, cancel: &CancelToken, deadline: Instant) -> Result<()> {
        info!("Connecting to bootloader on {}...", self.port.name());
        let mut attempt = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            attempt += 1;
            trace!("Connection attempt {attempt}");
            self.port.clear_buffers()?;

            for _ in 0..self.timings.sync_retries {
                self.port.write_all_bytes(&request(Command::GetSync))?;
                let resp = self.read_response(ACK_LEN, self.timings.read_timeout)?;
                if is_ack(&resp) {
                    info!("Bootloader sync successful");
                    return Ok(());
                }
            }

            if Instant::now() >= deadline {
                warn!(
                    "No bootloader response after {} attempts",
                    attempt
                );
                return Err(Error::ConnectionTimeout);
            }
            thread::sleep(self.timings.connect_retry_delay);
        }
    }

    /// Query board identity.
    ///
    /// `None` means the bootloader answered with something other than a
    /// well-formed device response. That is informational, never fatal:
    /// the caller proceeds with an unknown board identity.
    pub fn identify(&mut self) -> Result<Option<DeviceInfo>> {
        debug!("Querying device info");
        self.port.write_all_bytes(&request(Command::GetDevice))?;

        let resp = self.read_response(DEVICE_RESPONSE_LEN, self.timings.read_timeout)?;
        match decode_device_response(&resp) {
            Some(board_id) => {
                let info = DeviceInfo::from_board_id(board_id);
                info!("Detected board: {info}");
                Ok(Some(info))
            },
            None => {
                warn!("Could not read device info ({} bytes)", resp.len());
                Ok(None)
            },
        }
    }

    /// Issue a full-chip erase and poll for completion.
    ///
    /// The erase can take tens of seconds; the acknowledgment is polled at
    /// `erase_poll_interval` so cancellation stays responsive.
    pub fn erase(&mut self, cancel: &CancelToken) -> Result<()> {
        info!("Erasing flash (this can take 10-30 seconds)...");
        self.port.write_all_bytes(&request(Command::ChipErase))?;

        let start = Instant::now();
        let saved_timeout = self.port.timeout();
        self.port.set_timeout(self.timings.erase_poll_interval)?;

        let mut resp: Vec<u8> = Vec::with_capacity(ACK_LEN);
        let result = loop {
            if cancel.is_cancelled() {
                break Err(Error::Cancelled);
            }
            if start.elapsed() >= self.timings.erase_timeout {
                break Err(Error::EraseTimeout(self.timings.erase_timeout.as_secs()));
            }

            let mut buf = [0u8; ACK_LEN];
            match self.port.read(&mut buf[..ACK_LEN - resp.len()]) {
                Ok(n) if n > 0 => {
                    resp.extend_from_slice(&buf[..n]);
                    if resp.len() == ACK_LEN {
                        if is_ack(&resp) {
                            break Ok(());
                        }
                        // Line noise; discard and keep waiting.
                        trace!("Discarding unexpected bytes: {resp:02X?}");
                        resp.clear();
                    }
                },
                Ok(_) => {},
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {},
                Err(e) => break Err(Error::Io(e)),
            }
        };

        self.port.set_timeout(saved_timeout)?;
        result?;

        info!("Flash erased in {:.1}s", start.elapsed().as_secs_f64());
        Ok(())
    }

    /// Program the image in acknowledged chunks.
    ///
    /// `progress(bytes_written, total_bytes)` fires after each acknowledged
    /// chunk. A chunk that is not acknowledged aborts immediately with
    /// [`Error::ProgramFailure`]; no chunk is ever resent, so a misbehaving
    /// link cannot silently duplicate writes. Cancellation is checked once
    /// per chunk.
    pub fn program<F>(&mut self, image: &[u8], cancel: &CancelToken, mut progress: F) -> Result<()>
    where
        F: FnMut(usize, usize),
    {
        let total = image.len();
        let chunks = ProgramChunks::new(image, self.timings.chunk_size);
        let total_chunks = chunks.total_chunks();
        info!(
            "Programming {total} bytes ({:.1} KiB) in {total_chunks} chunks",
            total as f64 / 1024.0
        );

        for chunk in chunks {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            self.port.write_all_bytes(&prog_multi_frame(&chunk.payload))?;

            let resp = self.read_response(ACK_LEN, self.timings.read_timeout)?;
            if !is_ack(&resp) {
                return Err(Error::ProgramFailure {
                    offset: chunk.offset,
                });
            }

            let written = (chunk.offset + self.timings.chunk_size).min(total);
            progress(written, total);
        }

        info!("Programming complete");
        Ok(())
    }

    /// Retrieve the device-computed CRC and compare against the local one.
    ///
    /// A short or malformed response means the bootloader does not support
    /// verification; that is reported as [`VerifyOutcome::Unsupported`] and
    /// the run continues. A well-formed but different CRC is fatal.
    /// Cancellation is checked on entry and again after the exchange, so a
    /// cancel landing during verification never turns into a success.
    pub fn verify(&mut self, image: &[u8], cancel: &CancelToken) -> Result<VerifyOutcome> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        debug!("Requesting device CRC");
        self.port.write_all_bytes(&request(Command::GetCrc))?;

        let resp = self.read_response(CRC_RESPONSE_LEN, self.timings.read_timeout)?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let Some(device_crc) = decode_crc_response(&resp) else {
            warn!("CRC verification not supported by this bootloader");
            return Ok(VerifyOutcome::Unsupported);
        };

        let expected = local_crc32(image);
        debug!("Device CRC {device_crc:#010X}, local CRC {expected:#010X}");

        if device_crc == expected {
            info!("Verification successful, CRC match");
            Ok(VerifyOutcome::Verified { crc: device_crc })
        } else {
            Err(Error::VerifyMismatch {
                expected,
                actual: device_crc,
            })
        }
    }

    /// Send the boot command. The device resets immediately, so no
    /// response is expected or read.
    pub fn reboot(&mut self) -> Result<()> {
        info!("Rebooting device into application firmware");
        self.port.write_all_bytes(&request(Command::Boot))?;
        Ok(())
    }
}

// Native-specific convenience constructors
#[cfg(feature = "native")]
mod native_impl {
    use super::{BootloaderClient, FlashTimings, Result};
    use crate::port::{NativePort, SerialConfig};

    impl BootloaderClient<NativePort> {
        /// Open a serial port and create a client over it.
        ///
        /// A busy port is retried a few times before the open fails; an
        /// open failure counts as a failed connection attempt, not a
        /// crash.
        pub fn open(port_name: &str, baud_rate: u32, timings: FlashTimings) -> Result<Self> {
            let config =
                SerialConfig::new(port_name, baud_rate).with_timeout(timings.read_timeout);
            let port = NativePort::open_with_retry(&config)?;
            Ok(Self::with_timings(port, timings))
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory scripted port for protocol tests.

    use crate::error::Result;
    use crate::port::Port;
    use std::collections::VecDeque;
    use std::io::{Read, Write};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Shared state so tests can inspect writes after the port moved into
    /// a client (or another thread).
    #[derive(Debug, Default)]
    pub struct MockState {
        pub read_buf: VecDeque<u8>,
        pub write_buf: Vec<u8>,
        pub closed: bool,
    }

    /// Mock serial port replaying a scripted response stream.
    ///
    /// Reads drain the script; an empty script reads as `TimedOut`, the
    /// same signal a real port gives for "no response yet".
    #[derive(Debug, Clone)]
    pub struct MockPort {
        pub state: Arc<Mutex<MockState>>,
        timeout: Duration,
        /// Cap on bytes returned per read, to simulate fragmentation.
        pub max_per_read: usize,
    }

    impl MockPort {
        pub fn new(script: &[u8]) -> Self {
            Self {
                state: Arc::new(Mutex::new(MockState {
                    read_buf: script.iter().copied().collect(),
                    write_buf: Vec::new(),
                    closed: false,
                })),
                timeout: Duration::from_millis(5),
                max_per_read: usize::MAX,
            }
        }

        pub fn fragmented(script: &[u8], max_per_read: usize) -> Self {
            let mut port = Self::new(script);
            port.max_per_read = max_per_read;
            port
        }

        pub fn written(&self) -> Vec<u8> {
            self.state.lock().unwrap().write_buf.clone()
        }

        pub fn is_closed(&self) -> bool {
            self.state.lock().unwrap().closed
        }
    }

    impl Read for MockPort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let mut state = self.state.lock().unwrap();
            if state.read_buf.is_empty() {
                return Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "no data"));
            }
            let n = buf.len().min(state.read_buf.len()).min(self.max_per_read);
            for b in buf.iter_mut().take(n) {
                *b = state.read_buf.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for MockPort {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.state.lock().unwrap().write_buf.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Port for MockPort {
        fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
            self.timeout = timeout;
            Ok(())
        }
        fn timeout(&self) -> Duration {
            self.timeout
        }
        fn baud_rate(&self) -> u32 {
            115200
        }
        fn clear_buffers(&mut self) -> Result<()> {
            Ok(())
        }
        fn name(&self) -> &str {
            "mock"
        }
        fn close(&mut self) -> Result<()> {
            self.state.lock().unwrap().closed = true;
            Ok(())
        }
    }

    /// Timings small enough that failure-path tests finish quickly.
    pub fn fast_timings() -> super::FlashTimings {
        super::FlashTimings {
            connect_timeout: Duration::from_millis(50),
            sync_retries: 2,
            connect_retry_delay: Duration::from_millis(5),
            erase_timeout: Duration::from_millis(50),
            erase_poll_interval: Duration::from_millis(5),
            read_timeout: Duration::from_millis(10),
            chunk_size: super::DEFAULT_CHUNK_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockPort, fast_timings};
    use super::*;
    use crate::protocol::bootloader::{EOC, INSYNC, PAD_BYTE};

    const ACK: [u8; 2] = [INSYNC, EOC];

    #[test]
    fn test_sync_succeeds_on_ack() {
        let port = MockPort::new(&ACK);
        let mut client = BootloaderClient::with_timings(port, fast_timings());
        assert!(client.sync(&CancelToken::new()).is_ok());
        // Probe is GET_SYNC + EOC
        assert!(client.port().written().starts_with(&[0x21, 0x20]));
    }

    #[test]
    fn test_sync_succeeds_on_fragmented_ack() {
        let port = MockPort::fragmented(&ACK, 1);
        let mut client = BootloaderClient::with_timings(port, fast_timings());
        assert!(client.sync(&CancelToken::new()).is_ok());
    }

    #[test]
    fn test_sync_mute_device_times_out() {
        let port = MockPort::new(&[]);
        let mut client = BootloaderClient::with_timings(port, fast_timings());
        let err = client.sync(&CancelToken::new()).unwrap_err();
        assert!(matches!(err, Error::ConnectionTimeout));
        assert_eq!(
            err.to_string(),
            "Failed to connect to bootloader (timeout)"
        );
    }

    #[test]
    fn test_sync_cancelled_before_first_attempt() {
        let port = MockPort::new(&ACK);
        let mut client = BootloaderClient::with_timings(port, fast_timings());
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(client.sync(&cancel), Err(Error::Cancelled)));
    }

    #[test]
    fn test_identify_decodes_board_id() {
        // INSYNC + board id 0x000C (LE) + filler + EOC
        let script = [INSYNC, 0x0C, 0x00, 0x00, 0x00, 0x00, 0x00, EOC];
        let port = MockPort::new(&script);
        let mut client = BootloaderClient::with_timings(port, fast_timings());

        let info = client.identify().unwrap().unwrap();
        assert_eq!(info.board_id, 0x000C);
        assert_eq!(info.board_name, "Cube Orange");
    }

    #[test]
    fn test_identify_fragmented_response() {
        let script = [INSYNC, 0x42, 0x00, 0x00, 0x00, 0x00, 0x00, EOC];
        let port = MockPort::fragmented(&script, 3);
        let mut client = BootloaderClient::with_timings(port, fast_timings());

        let info = client.identify().unwrap().unwrap();
        assert_eq!(info.board_id, 0x0042);
    }

    #[test]
    fn test_identify_garbage_is_non_fatal() {
        let port = MockPort::new(&[0xFF, 0xFF]);
        let mut client = BootloaderClient::with_timings(port, fast_timings());
        assert!(client.identify().unwrap().is_none());
    }

    #[test]
    fn test_erase_completes_on_ack() {
        let port = MockPort::new(&ACK);
        let mut client = BootloaderClient::with_timings(port, fast_timings());
        assert!(client.erase(&CancelToken::new()).is_ok());
        assert!(client.port().written().starts_with(&[0x23, 0x20]));
    }

    #[test]
    fn test_erase_times_out() {
        let port = MockPort::new(&[]);
        let mut client = BootloaderClient::with_timings(port, fast_timings());
        let err = client.erase(&CancelToken::new()).unwrap_err();
        assert!(matches!(err, Error::EraseTimeout(_)));
    }

    #[test]
    fn test_erase_cancelled() {
        let port = MockPort::new(&[]);
        let mut client = BootloaderClient::with_timings(port, fast_timings());
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(client.erase(&cancel), Err(Error::Cancelled)));
    }

    #[test]
    fn test_program_sends_all_chunks_and_reconstructs_image() {
        // Scenario A: 10,000 bytes -> 40 chunks (39 full + 1 padded).
        let image: Vec<u8> = (0u32..10_000).map(|i| (i % 251) as u8).collect();
        let chunks = 40;
        let script: Vec<u8> = ACK.repeat(chunks);

        let port = MockPort::new(&script);
        let mut client = BootloaderClient::with_timings(port, fast_timings());

        let mut last = 0usize;
        client
            .program(&image, &CancelToken::new(), |written, total| {
                assert_eq!(total, 10_000);
                assert!(written >= last, "progress must be non-decreasing");
                last = written;
            })
            .unwrap();
        assert_eq!(last, 10_000);

        // Each frame: PROG_MULTI + len + 252 bytes + EOC = 255 bytes.
        let written = client.port().written();
        assert_eq!(written.len(), chunks * 255);

        // Reconstruct payloads and compare with the original image.
        let mut rebuilt = Vec::new();
        for frame in written.chunks(255) {
            assert_eq!(frame[0], 0x27);
            assert_eq!(frame[1], 252);
            assert_eq!(frame[254], EOC);
            rebuilt.extend_from_slice(&frame[2..254]);
        }
        assert!(rebuilt[10_000..].iter().all(|&b| b == PAD_BYTE));
        rebuilt.truncate(image.len());
        assert_eq!(rebuilt, image);
    }

    #[test]
    fn test_program_nack_aborts_with_offset() {
        // Scenario C: the chunk covering byte 5000 starts at offset 4788
        // (chunk index 19). Ack 19 chunks, then answer garbage.
        let image = vec![0xA5u8; 10_000];
        let mut script: Vec<u8> = ACK.repeat(19);
        script.extend_from_slice(&[0x00, 0x00]);

        let port = MockPort::new(&script);
        let mut client = BootloaderClient::with_timings(port, fast_timings());

        let err = client
            .program(&image, &CancelToken::new(), |_, _| {})
            .unwrap_err();
        match err {
            Error::ProgramFailure { offset } => {
                assert_eq!(offset, 19 * 252);
                assert!((offset..offset + 252).contains(&5000));
            },
            other => panic!("expected ProgramFailure, got {other:?}"),
        }
        assert!(err.to_string().contains(&(19 * 252).to_string()));
    }

    #[test]
    fn test_program_cancelled_mid_transfer() {
        let image = vec![0x11u8; 1000];
        let script: Vec<u8> = ACK.repeat(4);
        let port = MockPort::new(&script);
        let mut client = BootloaderClient::with_timings(port, fast_timings());

        let cancel = CancelToken::new();
        let mut chunks_seen = 0;
        let err = client
            .program(&image, &cancel, |_, _| {
                chunks_seen += 1;
                if chunks_seen == 2 {
                    cancel.cancel();
                }
            })
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(chunks_seen, 2);
    }

    #[test]
    fn test_verify_crc_match() {
        let image = b"firmware image bytes".to_vec();
        let crc = local_crc32(&image);
        let mut script = vec![INSYNC];
        script.extend_from_slice(&crc.to_le_bytes());
        script.push(EOC);

        let port = MockPort::new(&script);
        let mut client = BootloaderClient::with_timings(port, fast_timings());
        assert_eq!(
            client.verify(&image, &CancelToken::new()).unwrap(),
            VerifyOutcome::Verified { crc }
        );
    }

    #[test]
    fn test_verify_crc_mismatch_is_fatal() {
        let image = b"firmware image bytes".to_vec();
        let wrong = local_crc32(&image) ^ 0xDEAD_BEEF;
        let mut script = vec![INSYNC];
        script.extend_from_slice(&wrong.to_le_bytes());
        script.push(EOC);

        let port = MockPort::new(&script);
        let mut client = BootloaderClient::with_timings(port, fast_timings());
        let err = client.verify(&image, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, Error::VerifyMismatch { .. }));
    }

    #[test]
    fn test_verify_short_response_is_unsupported() {
        let port = MockPort::new(&[INSYNC, 0x01]);
        let mut client = BootloaderClient::with_timings(port, fast_timings());
        let image = vec![0u8; 16];
        assert_eq!(
            client.verify(&image, &CancelToken::new()).unwrap(),
            VerifyOutcome::Unsupported
        );
    }

    #[test]
    fn test_verify_cancelled_before_request() {
        let image = vec![0x33u8; 64];
        let crc = local_crc32(&image);
        let mut script = vec![INSYNC];
        script.extend_from_slice(&crc.to_le_bytes());
        script.push(EOC);

        let port = MockPort::new(&script);
        let mut client = BootloaderClient::with_timings(port, fast_timings());
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = client.verify(&image, &cancel).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        // The CRC request was never sent.
        assert!(client.port().written().is_empty());
    }

    #[test]
    fn test_verify_fragmented_crc_response() {
        let image = vec![0x5Au8; 512];
        let crc = local_crc32(&image);
        let mut script = vec![INSYNC];
        script.extend_from_slice(&crc.to_le_bytes());
        script.push(EOC);

        let port = MockPort::fragmented(&script, 1);
        let mut client = BootloaderClient::with_timings(port, fast_timings());
        assert_eq!(
            client.verify(&image, &CancelToken::new()).unwrap(),
            VerifyOutcome::Verified { crc }
        );
    }

    #[test]
    fn test_reboot_sends_boot_command() {
        let port = MockPort::new(&[]);
        let mut client = BootloaderClient::with_timings(port, fast_timings());
        client.reboot().unwrap();
        assert_eq!(client.port().written(), vec![0x30, 0x20]);
    }
}
