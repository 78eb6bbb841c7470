//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding or decoding wire frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("corrupt header: checksum mismatch (expected {expected:#010x}, got {actual:#010x})")]
    CorruptHeader { expected: u32, actual: u32 },

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("unknown compression codec: {0}")]
    UnknownCompression(u8),

    #[error("corrupt body: payload checksum mismatch (expected {expected:#x}, got {actual:#x})")]
    CorruptBody { expected: u64, actual: u64 },

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: u32, max: u32 },

    #[error("compression failed: {0}")]
    Compression(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
