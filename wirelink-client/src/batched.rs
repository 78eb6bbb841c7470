//! Batched socket output.

use crate::stream::TransportStream;
use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncWriteExt, WriteHalf};

/// Coalesces byte spans into flush groups emitted as single socket writes.
///
/// Spans appended between two flushes form one group and reach the socket as
/// one contiguous write, so a frame's header and payload never interleave
/// with another frame's bytes. Groups are emitted in submission order.
pub(crate) struct BatchedOutputStream {
    writer: WriteHalf<TransportStream>,
    group: BytesMut,
}

impl BatchedOutputStream {
    pub(crate) fn new(writer: WriteHalf<TransportStream>) -> Self {
        Self {
            writer,
            group: BytesMut::with_capacity(8 * 1024),
        }
    }

    /// Adds a span to the current flush group.
    pub(crate) fn append(&mut self, bytes: &[u8]) {
        self.group.extend_from_slice(bytes);
    }

    /// Emits the current group as a single write followed by a flush.
    pub(crate) async fn flush_group(&mut self) -> io::Result<()> {
        if self.group.is_empty() {
            return Ok(());
        }
        let group = self.group.split();
        self.writer.write_all(&group).await?;
        self.writer.flush().await
    }

    /// Discards any unflushed group and shuts the write side down.
    pub(crate) async fn shutdown(&mut self) -> io::Result<()> {
        self.group.clear();
        self.writer.shutdown().await
    }
}
