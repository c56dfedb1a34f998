//! Protocol implementations.

pub mod bootloader;

// Re-export common types
pub use bootloader::{
    Command, DEFAULT_CHUNK_SIZE, EOC, INSYNC, ProgramChunk, ProgramChunks, decode_crc_response,
    decode_device_response, is_ack, local_crc32, prog_multi_frame, request,
};
