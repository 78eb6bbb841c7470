//! Owned outbound message buffer.

use crate::error::ProtocolError;
use crate::header::{payload_checksum, Compression, Header};
use crate::{DEFAULT_MIN_COMPRESSION_BYTES, PROTOCOL_VERSION};
use bytes::Bytes;

/// zstd level used for outbound payloads.
const ZSTD_LEVEL: i32 = 3;

/// An owned outbound message: header fields mutable until encoding, plus a
/// growable payload buffer.
#[derive(Debug)]
pub struct Netbuf {
    meta: u32,
    compression: Compression,
    min_compression_bytes: usize,
    payload: Vec<u8>,
}

impl Netbuf {
    pub fn new() -> Self {
        Self {
            meta: 0,
            compression: Compression::None,
            min_compression_bytes: DEFAULT_MIN_COMPRESSION_BYTES,
            payload: Vec::new(),
        }
    }

    /// Sets the service/method id carried in the `meta` field.
    pub fn set_service_method_id(&mut self, method_id: u32) {
        self.meta = method_id;
    }

    pub fn set_compression(&mut self, compression: Compression) {
        self.compression = compression;
    }

    /// Payloads shorter than this are sent uncompressed regardless of codec.
    pub fn set_min_compression_bytes(&mut self, bytes: usize) {
        self.min_compression_bytes = bytes;
    }

    /// Direct access to the payload buffer for serialization.
    pub fn buffer(&mut self) -> &mut Vec<u8> {
        &mut self.payload
    }

    /// Serializes `value` as JSON into the payload buffer.
    pub fn serialize_json<T: serde::Serialize>(&mut self, value: &T) -> Result<(), ProtocolError> {
        serde_json::to_writer(&mut self.payload, value)?;
        Ok(())
    }

    /// Encodes the message into its on-wire form, applying compression and
    /// computing both checksums. Header and payload are returned as separate
    /// spans so callers can coalesce them into a single flush group.
    pub fn into_wire(self, correlation_id: u32) -> Result<WireFrame, ProtocolError> {
        let (compression, payload) = if self.compression == Compression::Zstd
            && self.payload.len() >= self.min_compression_bytes
        {
            let compressed = zstd::bulk::compress(&self.payload, ZSTD_LEVEL)
                .map_err(|e| ProtocolError::Compression(e.to_string()))?;
            (Compression::Zstd, compressed)
        } else {
            (Compression::None, self.payload)
        };

        let header = Header {
            version: PROTOCOL_VERSION,
            compression,
            payload_size: payload.len() as u32,
            meta: self.meta,
            correlation_id,
            payload_checksum: payload_checksum(&payload),
        };

        Ok(WireFrame {
            header: Bytes::copy_from_slice(&header.encode()),
            payload: Bytes::from(payload),
            correlation_id,
        })
    }
}

impl Default for Netbuf {
    fn default() -> Self {
        Self::new()
    }
}

/// A fully encoded outbound frame, ready for the output stream.
#[derive(Debug, Clone)]
pub struct WireFrame {
    pub header: Bytes,
    pub payload: Bytes,
    pub correlation_id: u32,
}

impl WireFrame {
    /// On-wire payload size in bytes (post-compression).
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HEADER_SIZE;
    use crate::parse::parse_body;

    #[test]
    fn test_method_id_in_meta() {
        let mut buf = Netbuf::new();
        buf.set_service_method_id(0x1234);
        buf.serialize_json(&serde_json::json!({"op": "ping"})).unwrap();

        let frame = buf.into_wire(99).unwrap();
        let header = Header::decode(frame.header.as_ref().try_into().unwrap()).unwrap();
        assert_eq!(header.meta, 0x1234);
        assert_eq!(header.correlation_id, 99);
        assert_eq!(header.payload_size as usize, frame.payload.len());
    }

    #[test]
    fn test_below_threshold_stays_uncompressed() {
        let mut buf = Netbuf::new();
        buf.set_compression(Compression::Zstd);
        buf.set_min_compression_bytes(1024);
        buf.serialize_json(&serde_json::json!({"small": true})).unwrap();

        let frame = buf.into_wire(1).unwrap();
        let header = Header::decode(frame.header.as_ref().try_into().unwrap()).unwrap();
        assert_eq!(header.compression, Compression::None);
    }

    #[test]
    fn test_large_payload_compresses_and_roundtrips() {
        // A 1 MiB repetitive payload must shrink on the wire.
        let text = "wirelink ".repeat(128 * 1024);
        let original = serde_json::json!({ "blob": text });

        let mut buf = Netbuf::new();
        buf.set_compression(Compression::Zstd);
        buf.set_min_compression_bytes(1024);
        buf.serialize_json(&original).unwrap();
        let uncompressed_len = buf.payload.len();
        assert!(uncompressed_len >= 1024 * 1024);

        let frame = buf.into_wire(5).unwrap();
        let header = Header::decode(frame.header.as_ref().try_into().unwrap()).unwrap();
        assert_eq!(header.compression, Compression::Zstd);
        assert!((header.payload_size as usize) < uncompressed_len);

        let decoded: serde_json::Value = parse_body(&header, frame.payload).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_no_codec_never_compresses() {
        let mut buf = Netbuf::new();
        buf.set_min_compression_bytes(0);
        buf.buffer().extend_from_slice(br#"{"k":"v"}"#);

        let frame = buf.into_wire(1).unwrap();
        let header = Header::decode(frame.header.as_ref().try_into().unwrap()).unwrap();
        assert_eq!(header.compression, Compression::None);
        assert_eq!(frame.payload.as_ref(), br#"{"k":"v"}"#);
    }

    #[test]
    fn test_header_span_is_header_sized() {
        let mut buf = Netbuf::new();
        buf.serialize_json(&serde_json::json!({})).unwrap();
        let frame = buf.into_wire(1).unwrap();
        assert_eq!(frame.header.len(), HEADER_SIZE);
    }
}
