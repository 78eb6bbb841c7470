//! Fixed-width frame header codec.
//!
//! Header layout (26 bytes, little-endian):
//!
//! ```text
//! +---------+-----------------+-------------+--------------+----------+
//! | version | header_checksum | compression | payload_size |   meta   |
//! | 1 byte  |     4 bytes     |   1 byte    |   4 bytes    | 4 bytes  |
//! +---------+-----------------+-------------+--------------+----------+
//! | correlation_id | payload_checksum | payload                       |
//! |    4 bytes     |     8 bytes      | payload_size bytes            |
//! +----------------+------------------+-------------------------------+
//! ```
//!
//! `header_checksum` is a CRC32C over the version byte followed by bytes
//! [5..26) of the header. `payload_checksum` is a CRC32C of the on-wire
//! payload (post-compression), zero-extended into the 64-bit field. `meta`
//! carries the method id on requests and the status code on responses.

use crate::error::ProtocolError;
use crate::{MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};
use bytes::{Buf, BufMut};

/// Size of the frame header in bytes.
pub const HEADER_SIZE: usize = 26;

/// Payload compression codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    None,
    Zstd,
}

impl Compression {
    pub fn to_wire(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Zstd => 1,
        }
    }

    pub fn from_wire(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Zstd),
            other => Err(ProtocolError::UnknownCompression(other)),
        }
    }
}

/// Response status codes carried in the `meta` field.
///
/// These codes are part of the protocol contract and must remain stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    MethodNotFound,
    RequestTimeout,
    ServerError,
    /// Reserved code; treated as a server error by clients.
    Unknown(u32),
}

impl Status {
    pub fn from_wire(meta: u32) -> Self {
        match meta {
            0 => Status::Success,
            1 => Status::MethodNotFound,
            2 => Status::RequestTimeout,
            3 => Status::ServerError,
            other => Status::Unknown(other),
        }
    }

    pub fn to_wire(self) -> u32 {
        match self {
            Status::Success => 0,
            Status::MethodNotFound => 1,
            Status::RequestTimeout => 2,
            Status::ServerError => 3,
            Status::Unknown(code) => code,
        }
    }
}

/// A parsed frame header.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub version: u8,
    pub compression: Compression,
    pub payload_size: u32,
    pub meta: u32,
    pub correlation_id: u32,
    pub payload_checksum: u64,
}

impl Header {
    /// Encodes the header, computing the header checksum.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.version;
        // bytes [1..5) are the checksum, filled last
        let mut rest = &mut buf[5..];
        rest.put_u8(self.compression.to_wire());
        rest.put_u32_le(self.payload_size);
        rest.put_u32_le(self.meta);
        rest.put_u32_le(self.correlation_id);
        rest.put_u64_le(self.payload_checksum);

        let checksum = header_checksum(&buf);
        buf[1..5].copy_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// Decodes and validates a header from exactly [`HEADER_SIZE`] bytes.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self, ProtocolError> {
        let expected = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]);
        let actual = header_checksum(buf);
        if expected != actual {
            return Err(ProtocolError::CorruptHeader { expected, actual });
        }

        let version = buf[0];
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }

        let mut rest = &buf[5..];
        let compression = Compression::from_wire(rest.get_u8())?;
        let payload_size = rest.get_u32_le();
        let meta = rest.get_u32_le();
        let correlation_id = rest.get_u32_le();
        let payload_checksum = rest.get_u64_le();

        if payload_size > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        Ok(Self {
            version,
            compression,
            payload_size,
            meta,
            correlation_id,
            payload_checksum,
        })
    }

    /// Interprets the `meta` field as a response status.
    pub fn status(&self) -> Status {
        Status::from_wire(self.meta)
    }
}

/// CRC32C over the version byte and bytes [5..26) of the header.
fn header_checksum(buf: &[u8; HEADER_SIZE]) -> u32 {
    let crc = crc32c::crc32c(&buf[..1]);
    crc32c::crc32c_append(crc, &buf[5..])
}

/// CRC32C of the payload, zero-extended into the 64-bit wire field.
pub(crate) fn payload_checksum(payload: &[u8]) -> u64 {
    crc32c::crc32c(payload) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Header {
        Header {
            version: PROTOCOL_VERSION,
            compression: Compression::None,
            payload_size: 128,
            meta: 42,
            correlation_id: 7,
            payload_checksum: 0xDEAD_BEEF,
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let encoded = sample().encode();
        let decoded = Header::decode(&encoded).unwrap();

        assert_eq!(decoded.version, PROTOCOL_VERSION);
        assert_eq!(decoded.compression, Compression::None);
        assert_eq!(decoded.payload_size, 128);
        assert_eq!(decoded.meta, 42);
        assert_eq!(decoded.correlation_id, 7);
        assert_eq!(decoded.payload_checksum, 0xDEAD_BEEF);
    }

    #[test]
    fn test_any_flipped_bit_is_detected() {
        let encoded = sample().encode();

        for byte in 0..HEADER_SIZE {
            let mut corrupted = encoded;
            corrupted[byte] ^= 0x01;
            let result = Header::decode(&corrupted);
            assert!(
                matches!(result, Err(ProtocolError::CorruptHeader { .. })),
                "flip at byte {} went undetected",
                byte
            );
        }
    }

    #[test]
    fn test_unsupported_version() {
        let mut header = sample();
        header.version = 9;
        let encoded = header.encode();
        // Checksum is valid (it covers the version byte), so the version
        // check itself must reject the frame.
        let result = Header::decode(&encoded);
        assert!(matches!(result, Err(ProtocolError::UnsupportedVersion(9))));
    }

    #[test]
    fn test_unknown_compression() {
        let mut encoded = sample().encode();
        encoded[5] = 9;
        // Re-seal the checksum so only the codec byte is at fault.
        let crc = crc32c::crc32c(&encoded[..1]);
        let crc = crc32c::crc32c_append(crc, &encoded[5..]);
        encoded[1..5].copy_from_slice(&crc.to_le_bytes());

        let result = Header::decode(&encoded);
        assert!(matches!(result, Err(ProtocolError::UnknownCompression(9))));
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let mut header = sample();
        header.payload_size = MAX_PAYLOAD_SIZE + 1;
        let encoded = header.encode();
        let result = Header::decode(&encoded);
        assert!(matches!(result, Err(ProtocolError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::from_wire(0), Status::Success);
        assert_eq!(Status::from_wire(1), Status::MethodNotFound);
        assert_eq!(Status::from_wire(2), Status::RequestTimeout);
        assert_eq!(Status::from_wire(3), Status::ServerError);
        assert_eq!(Status::from_wire(77), Status::Unknown(77));

        for code in [0u32, 1, 2, 3, 77] {
            assert_eq!(Status::from_wire(code).to_wire(), code);
        }
    }

    #[test]
    fn test_compression_codes() {
        assert_eq!(Compression::from_wire(0).unwrap(), Compression::None);
        assert_eq!(Compression::from_wire(1).unwrap(), Compression::Zstd);
        assert!(matches!(
            Compression::from_wire(2),
            Err(ProtocolError::UnknownCompression(2))
        ));
    }
}
