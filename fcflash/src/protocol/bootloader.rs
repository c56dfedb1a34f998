//! Flight-controller bootloader wire protocol.
//!
//! The bootloader speaks a minimal byte-oriented command protocol. Every
//! request is a command byte (plus optional payload) terminated by `EOC`;
//! the device acknowledges with `INSYNC + EOC`.
//!
//! ## Request Format
//!
//! ```text
//! +---------+-------------------+-----+
//! | Command |  Payload          | EOC |
//! +---------+-------------------+-----+
//! | 1 byte  |  0..=253 bytes    | 1   |
//! +---------+-------------------+-----+
//! ```
//!
//! `PROG_MULTI` carries a one-byte chunk length followed by the chunk
//! itself, which is why the chunk size must fit in a byte and, per the
//! bootloader's flash-word constraint, be a multiple of 4.

use byteorder::{ByteOrder, LittleEndian};

/// Marker byte leading every well-formed device response.
pub const INSYNC: u8 = 0x12;

/// End-of-command marker terminating every request.
pub const EOC: u8 = 0x20;

/// Fill byte for the tail of the final program chunk.
pub const PAD_BYTE: u8 = 0xFF;

/// Default program chunk size in bytes.
///
/// The length rides in a single byte and must be a multiple of 4; 252 is
/// the largest such value the deployed bootloaders accept. Override via
/// [`ProgramChunks::new`] for bootloader variants with smaller buffers.
pub const DEFAULT_CHUNK_SIZE: usize = 252;

/// Expected length of a plain `INSYNC + EOC` acknowledgment.
pub const ACK_LEN: usize = 2;

/// Expected length of a `GET_DEVICE` response.
pub const DEVICE_RESPONSE_LEN: usize = 8;

/// Expected length of a `GET_CRC` response.
pub const CRC_RESPONSE_LEN: usize = 6;

/// Bootloader command bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Sync handshake probe (0x21).
    GetSync = 0x21,
    /// Query board identity (0x22).
    GetDevice = 0x22,
    /// Full-chip erase (0x23).
    ChipErase = 0x23,
    /// Program one chunk (0x27).
    ProgMulti = 0x27,
    /// Read back the device-computed image CRC (0x29).
    GetCrc = 0x29,
    /// Leave the bootloader and boot the application (0x30).
    Boot = 0x30,
}

/// Build a bare `command + EOC` request.
pub fn request(cmd: Command) -> [u8; 2] {
    [cmd as u8, EOC]
}

/// Build a `PROG_MULTI` frame for one chunk.
///
/// The chunk must already be padded to the negotiated chunk size; its
/// length must fit in one byte and be a multiple of 4.
#[allow(clippy::cast_possible_truncation)]
pub fn prog_multi_frame(chunk: &[u8]) -> Vec<u8> {
    debug_assert!(!chunk.is_empty() && chunk.len() <= u8::MAX as usize);
    debug_assert!(chunk.len() % 4 == 0);

    let mut frame = Vec::with_capacity(chunk.len() + 3);
    frame.push(Command::ProgMulti as u8);
    frame.push(chunk.len() as u8);
    frame.extend_from_slice(chunk);
    frame.push(EOC);
    frame
}

/// Whether a response is a positive `INSYNC + EOC` acknowledgment.
pub fn is_ack(response: &[u8]) -> bool {
    response == [INSYNC, EOC]
}

/// Decode a `GET_DEVICE` response into a board id.
///
/// Requires at least 6 bytes led by `INSYNC`; the board id is a
/// little-endian u32 in bytes 1..5. Anything else is "could not read
/// device info", which callers treat as non-fatal.
pub fn decode_device_response(response: &[u8]) -> Option<u32> {
    if response.len() >= 6 && response[0] == INSYNC {
        Some(LittleEndian::read_u32(&response[1..5]))
    } else {
        None
    }
}

/// Decode a `GET_CRC` response into the device-computed CRC-32.
///
/// Requires exactly 6 bytes led by `INSYNC`. A short read or wrong leading
/// byte means the bootloader does not support verification.
pub fn decode_crc_response(response: &[u8]) -> Option<u32> {
    if response.len() == CRC_RESPONSE_LEN && response[0] == INSYNC {
        Some(LittleEndian::read_u32(&response[1..5]))
    } else {
        None
    }
}

/// CRC-32 (ISO-HDLC) over the original, unpadded image.
///
/// This must match what the bootloader computes over the bytes it received,
/// truncated to the original length.
pub fn local_crc32(image: &[u8]) -> u32 {
    crc32fast::hash(image)
}

/// One padded program chunk and the image offset it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramChunk {
    /// Byte offset of this chunk within the original image.
    pub offset: usize,
    /// Chunk payload, padded with `PAD_BYTE` to exactly the chunk size.
    pub payload: Vec<u8>,
}

/// Iterator over an image's padded program chunks.
///
/// Yields `ceil(len / chunk_size)` chunks; the final chunk is padded with
/// `PAD_BYTE` so every `PROG_MULTI` frame carries the same length.
#[derive(Debug)]
pub struct ProgramChunks<'a> {
    data: &'a [u8],
    chunk_size: usize,
    offset: usize,
}

impl<'a> ProgramChunks<'a> {
    /// Create a chunk iterator over `data`.
    ///
    /// `chunk_size` must be non-zero, fit in one byte, and be a multiple
    /// of 4 (the bootloader writes flash words).
    pub fn new(data: &'a [u8], chunk_size: usize) -> Self {
        debug_assert!(chunk_size > 0 && chunk_size <= u8::MAX as usize);
        debug_assert!(chunk_size % 4 == 0);

        Self {
            data,
            chunk_size,
            offset: 0,
        }
    }

    /// Number of chunks this iterator will yield.
    pub fn count_for(len: usize, chunk_size: usize) -> usize {
        len.div_ceil(chunk_size)
    }

    /// Total number of chunks for this image.
    pub fn total_chunks(&self) -> usize {
        Self::count_for(self.data.len(), self.chunk_size)
    }
}

impl Iterator for ProgramChunks<'_> {
    type Item = ProgramChunk;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }

        let end = (self.offset + self.chunk_size).min(self.data.len());
        let mut payload = self.data[self.offset..end].to_vec();
        payload.resize(self.chunk_size, PAD_BYTE);

        let chunk = ProgramChunk {
            offset: self.offset,
            payload,
        };
        self.offset = end;
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_bytes() {
        assert_eq!(request(Command::GetSync), [0x21, 0x20]);
        assert_eq!(request(Command::GetDevice), [0x22, 0x20]);
        assert_eq!(request(Command::ChipErase), [0x23, 0x20]);
        assert_eq!(request(Command::GetCrc), [0x29, 0x20]);
        assert_eq!(request(Command::Boot), [0x30, 0x20]);
    }

    #[test]
    fn test_prog_multi_frame_layout() {
        let chunk = vec![0xAB; DEFAULT_CHUNK_SIZE];
        let frame = prog_multi_frame(&chunk);

        assert_eq!(frame.len(), DEFAULT_CHUNK_SIZE + 3);
        assert_eq!(frame[0], 0x27);
        assert_eq!(frame[1], 252);
        assert_eq!(&frame[2..2 + DEFAULT_CHUNK_SIZE], chunk.as_slice());
        assert_eq!(*frame.last().unwrap(), EOC);
    }

    #[test]
    fn test_is_ack() {
        assert!(is_ack(&[INSYNC, EOC]));
        assert!(!is_ack(&[INSYNC]));
        assert!(!is_ack(&[EOC, INSYNC]));
        assert!(!is_ack(&[]));
        assert!(!is_ack(&[INSYNC, EOC, 0x00]));
    }

    #[test]
    fn test_decode_device_response() {
        // 8-byte response: INSYNC + board id (LE) + extra + EOC
        let resp = [INSYNC, 0x0C, 0x00, 0x00, 0x00, 0x01, 0x02, EOC];
        assert_eq!(decode_device_response(&resp), Some(0x000C));

        // 6 bytes is enough
        let resp = [INSYNC, 0x42, 0x00, 0x00, 0x00, EOC];
        assert_eq!(decode_device_response(&resp), Some(0x0042));

        // Wrong leading byte
        let resp = [0x00, 0x0C, 0x00, 0x00, 0x00, EOC];
        assert_eq!(decode_device_response(&resp), None);

        // Too short
        assert_eq!(decode_device_response(&[INSYNC, 0x0C, 0x00]), None);
    }

    #[test]
    fn test_decode_crc_response() {
        let resp = [INSYNC, 0x78, 0x56, 0x34, 0x12, EOC];
        assert_eq!(decode_crc_response(&resp), Some(0x12345678));

        // Short read means verification unsupported
        assert_eq!(decode_crc_response(&resp[..4]), None);
        assert_eq!(decode_crc_response(&[0x00, 0x78, 0x56, 0x34, 0x12, EOC]), None);
    }

    #[test]
    fn test_chunk_count() {
        assert_eq!(ProgramChunks::count_for(0, 252), 0);
        assert_eq!(ProgramChunks::count_for(1, 252), 1);
        assert_eq!(ProgramChunks::count_for(252, 252), 1);
        assert_eq!(ProgramChunks::count_for(253, 252), 2);
        // Scenario A: 10,000 bytes -> 40 chunks
        assert_eq!(ProgramChunks::count_for(10_000, 252), 40);
    }

    #[test]
    fn test_chunks_pad_final_with_ff() {
        let data: Vec<u8> = (0..300).map(|i| (i % 256) as u8).collect();
        let chunks: Vec<_> = ProgramChunks::new(&data, 252).collect();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].offset, 0);
        assert_eq!(chunks[0].payload.len(), 252);
        assert_eq!(chunks[0].payload, data[..252].to_vec());

        assert_eq!(chunks[1].offset, 252);
        assert_eq!(chunks[1].payload.len(), 252);
        assert_eq!(&chunks[1].payload[..48], &data[252..]);
        assert!(chunks[1].payload[48..].iter().all(|&b| b == PAD_BYTE));
    }

    #[test]
    fn test_chunks_reconstruct_original() {
        let data: Vec<u8> = (0u32..10_000).map(|i| (i * 7 % 256) as u8).collect();
        let mut rebuilt = Vec::new();
        for chunk in ProgramChunks::new(&data, 252) {
            rebuilt.extend_from_slice(&chunk.payload);
        }
        rebuilt.truncate(data.len());
        assert_eq!(rebuilt, data);
    }

    #[test]
    fn test_chunks_exact_multiple_not_padded() {
        let data = vec![0x55u8; 504];
        let chunks: Vec<_> = ProgramChunks::new(&data, 252).collect();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].payload.iter().all(|&b| b == 0x55));
    }

    #[test]
    fn test_local_crc32_known_vector() {
        // ISO-HDLC CRC-32 of "123456789"
        assert_eq!(local_crc32(b"123456789"), 0xCBF43926);
    }
}
