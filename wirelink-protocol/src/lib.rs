//! # wirelink-protocol
//!
//! Wire protocol implementation for wirelink.
//!
//! This crate provides:
//! - Fixed-width binary frame headers with CRC32C validation
//! - Optional zstd payload compression with a size threshold
//! - JSON payload serialization/deserialization
//! - Response status codes and protocol constants

pub mod error;
pub mod header;
pub mod netbuf;
pub mod parse;

pub use error::ProtocolError;
pub use header::{Compression, Header, Status, HEADER_SIZE};
pub use netbuf::{Netbuf, WireFrame};
pub use parse::{parse_body, read_header, read_payload};

/// Protocol version supported by this implementation.
pub const PROTOCOL_VERSION: u8 = 0;

/// Maximum on-wire payload size accepted by the decoder (16 MiB).
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Default compression threshold: payloads below this are never compressed.
pub const DEFAULT_MIN_COMPRESSION_BYTES: usize = 1024;
