//! Inbound frame parsing.

use crate::error::ProtocolError;
use crate::header::{payload_checksum, Compression, Header, HEADER_SIZE};
use crate::MAX_PAYLOAD_SIZE;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Reads and validates one frame header from the stream.
pub async fn read_header<R>(reader: &mut R) -> Result<Header, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; HEADER_SIZE];
    reader.read_exact(&mut buf).await?;
    Header::decode(&buf)
}

/// Reads exactly `payload_size` bytes of payload for `header`.
pub async fn read_payload<R>(reader: &mut R, header: &Header) -> Result<Bytes, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; header.payload_size as usize];
    reader.read_exact(&mut buf).await?;
    Ok(Bytes::from(buf))
}

/// Validates the payload checksum, decompresses per the header's codec, and
/// deserializes the body as `T`.
///
/// A checksum mismatch, a decompression failure, or a decoder disagreement
/// all surface as a corrupt body.
pub fn parse_body<T: DeserializeOwned>(header: &Header, payload: Bytes) -> Result<T, ProtocolError> {
    let actual = payload_checksum(&payload);
    if actual != header.payload_checksum {
        return Err(ProtocolError::CorruptBody {
            expected: header.payload_checksum,
            actual,
        });
    }

    let decoded = match header.compression {
        Compression::None => payload,
        Compression::Zstd => {
            let raw = zstd::bulk::decompress(&payload, MAX_PAYLOAD_SIZE as usize)
                .map_err(|e| ProtocolError::Compression(e.to_string()))?;
            Bytes::from(raw)
        }
    };

    Ok(serde_json::from_slice(&decoded)?)
}
