//! Correlation table and response delivery types.

use crate::error::Errc;
use crate::gate::GateGuard;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;
use wirelink_protocol::{parse_body, Header, Status};

/// A response handed to its waiter: the validated header, the raw body, and
/// the read-side accounting hook.
#[derive(Debug)]
pub struct StreamingContext {
    header: Header,
    body: Bytes,
    /// Keeps the transport's drain barrier held until the body is parsed.
    guard: Option<GateGuard>,
}

impl StreamingContext {
    pub(crate) fn new(header: Header, body: Bytes, guard: Option<GateGuard>) -> Self {
        Self {
            header,
            body,
            guard,
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn status(&self) -> Status {
        self.header.status()
    }

    /// Validates and deserializes the response body, then signals that body
    /// parsing is done.
    pub fn parse_body<T: DeserializeOwned>(mut self) -> Result<T, Errc> {
        let result = parse_body(&self.header, std::mem::take(&mut self.body));
        self.signal_body_parse();
        result.map_err(|e| {
            tracing::debug!("body parse failed: {}", e);
            Errc::CorruptBody
        })
    }

    /// Marks body handling as finished, releasing the read-side drain hold.
    /// Called implicitly by [`StreamingContext::parse_body`].
    pub fn signal_body_parse(&mut self) {
        self.guard.take();
    }
}

impl Drop for StreamingContext {
    fn drop(&mut self) {
        // A context dropped without parsing still releases the drain hold.
        self.guard.take();
    }
}

/// A successfully delivered typed response.
#[derive(Debug)]
pub struct ClientContext<T> {
    pub header: Header,
    pub data: T,
}

type Slot = oneshot::Sender<Result<StreamingContext, Errc>>;

/// Maps in-flight correlation ids to their completion slots.
///
/// Every slot resolves exactly once: the sender is removed from the table
/// before resolution, and a table that has been failed permanently rejects
/// new registrations with the errc it was failed with.
pub(crate) struct ResponseTable {
    state: Mutex<TableState>,
}

struct TableState {
    slots: HashMap<u32, Slot>,
    failed: Option<Errc>,
}

impl ResponseTable {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(TableState {
                slots: HashMap::new(),
                failed: None,
            }),
        }
    }

    /// Inserts a slot for `correlation_id` and returns its completion future.
    pub(crate) fn register(
        &self,
        correlation_id: u32,
    ) -> Result<oneshot::Receiver<Result<StreamingContext, Errc>>, Errc> {
        let mut state = self.state.lock().unwrap();
        if let Some(errc) = state.failed {
            return Err(errc);
        }
        let (tx, rx) = oneshot::channel();
        state.slots.insert(correlation_id, tx);
        Ok(rx)
    }

    /// Resolves a slot with a response. Returns false when no waiter took
    /// delivery (slot absent or waiter already gone) — a stale response.
    pub(crate) fn complete(&self, correlation_id: u32, ctx: StreamingContext) -> bool {
        let slot = self.state.lock().unwrap().slots.remove(&correlation_id);
        match slot {
            Some(tx) => tx.send(Ok(ctx)).is_ok(),
            None => false,
        }
    }

    /// Resolves a slot with an error; no-op if absent.
    pub(crate) fn fail(&self, correlation_id: u32, errc: Errc) {
        let slot = self.state.lock().unwrap().slots.remove(&correlation_id);
        if let Some(tx) = slot {
            let _ = tx.send(Err(errc));
        }
    }

    /// Resolves every outstanding slot with `errc`, clears the table, and
    /// rejects all future registrations.
    pub(crate) fn fail_all(&self, errc: Errc) {
        let slots = {
            let mut state = self.state.lock().unwrap();
            state.failed.get_or_insert(errc);
            std::mem::take(&mut state.slots)
        };
        for (_, tx) in slots {
            let _ = tx.send(Err(errc));
        }
    }

    /// Withdraws a slot without resolving it (per-call timer fired on the
    /// waiter side). Returns whether the slot was still present.
    pub(crate) fn remove(&self, correlation_id: u32) -> bool {
        self.state.lock().unwrap().slots.remove(&correlation_id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().unwrap().slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirelink_protocol::{Compression, PROTOCOL_VERSION};

    fn ctx(correlation_id: u32) -> StreamingContext {
        let header = Header {
            version: PROTOCOL_VERSION,
            compression: Compression::None,
            payload_size: 0,
            meta: 0,
            correlation_id,
            payload_checksum: 0,
        };
        StreamingContext::new(header, Bytes::new(), None)
    }

    #[tokio::test]
    async fn test_register_complete_roundtrip() {
        let table = ResponseTable::new();
        let rx = table.register(1).unwrap();
        assert_eq!(table.len(), 1);

        assert!(table.complete(1, ctx(1)));
        assert_eq!(table.len(), 0);

        let delivered = rx.await.unwrap().unwrap();
        assert_eq!(delivered.header().correlation_id, 1);
    }

    #[tokio::test]
    async fn test_complete_is_exactly_once() {
        let table = ResponseTable::new();
        let _rx = table.register(1).unwrap();

        assert!(table.complete(1, ctx(1)));
        // Second resolution finds no slot.
        assert!(!table.complete(1, ctx(1)));
        table.fail(1, Errc::Disconnected); // no-op, no panic
    }

    #[tokio::test]
    async fn test_stale_completion_without_slot() {
        let table = ResponseTable::new();
        assert!(!table.complete(99, ctx(99)));
    }

    #[tokio::test]
    async fn test_dropped_waiter_counts_as_stale() {
        let table = ResponseTable::new();
        let rx = table.register(2).unwrap();
        drop(rx);
        assert!(!table.complete(2, ctx(2)));
    }

    #[tokio::test]
    async fn test_fail_all_resolves_and_seals() {
        let table = ResponseTable::new();
        let rx1 = table.register(1).unwrap();
        let rx2 = table.register(2).unwrap();

        table.fail_all(Errc::Disconnected);
        assert_eq!(rx1.await.unwrap().unwrap_err(), Errc::Disconnected);
        assert_eq!(rx2.await.unwrap().unwrap_err(), Errc::Disconnected);

        // The first failure wins for future registrations.
        table.fail_all(Errc::ShuttingDown);
        assert_eq!(table.register(3).unwrap_err(), Errc::Disconnected);
    }

    #[tokio::test]
    async fn test_remove_discards_slot() {
        let table = ResponseTable::new();
        let _rx = table.register(5).unwrap();
        assert!(table.remove(5));
        assert!(!table.remove(5));
        assert!(!table.complete(5, ctx(5)));
    }
}
