//! The multiplexed RPC transport.
//!
//! One transport owns one connection. Concurrent callers submit typed calls;
//! the transport writes frames in call order, reads responses as they arrive,
//! and resolves each caller's completion exactly once — by response, by the
//! per-call deadline, or by teardown.

use crate::batched::BatchedOutputStream;
use crate::config::{ClientOpts, TransportConfiguration};
use crate::error::{ClientError, Errc};
use crate::gate::DispatchGate;
use crate::probe::ClientProbe;
use crate::queue::{PopOutcome, SendQueue};
use crate::response::{ClientContext, ResponseTable, StreamingContext};
use crate::stream::TransportStream;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::io::{AsyncReadExt, ReadHalf};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use wirelink_protocol::{Header, Netbuf, Status, HEADER_SIZE};

/// Connection lifecycle states. Transitions are monotonic: a closed or
/// failed transport is never reconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransportState {
    Created,
    Connecting,
    Ready,
    Closing,
    Closed,
    Failed,
}

/// Handle to a transport instance. Cheap to clone; all clones drive the same
/// connection.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    config: TransportConfiguration,
    probe: ClientProbe,
    memory: Arc<Semaphore>,
    correlations: ResponseTable,
    queue: SendQueue,
    out: tokio::sync::Mutex<Option<BatchedOutputStream>>,
    gate: Arc<DispatchGate>,
    state: Mutex<TransportState>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    /// Highest correlation id delivered so far, for out-of-order accounting.
    highest_delivered: AtomicU32,
}

impl Transport {
    pub fn new(config: TransportConfiguration) -> Result<Self, ClientError> {
        let registry = if config.disable_metrics {
            None
        } else {
            config.metrics_registry.clone()
        };
        let probe = ClientProbe::new(registry.as_ref())?;
        let memory = Arc::new(Semaphore::new(config.memory_budget_bytes));

        Ok(Self {
            inner: Arc::new(TransportInner {
                config,
                probe,
                memory,
                correlations: ResponseTable::new(),
                queue: SendQueue::new(),
                out: tokio::sync::Mutex::new(None),
                gate: DispatchGate::new(),
                state: Mutex::new(TransportState::Created),
                reader_task: Mutex::new(None),
                highest_delivered: AtomicU32::new(0),
            }),
        })
    }

    /// Establishes the connection and spawns the read loop.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.inner.connect(&self.inner).await
    }

    /// Submits an already-built outbound message. Performs admission,
    /// correlation assignment, ordered enqueue and the response wait.
    pub async fn send(&self, netbuf: Netbuf, opts: ClientOpts) -> Result<StreamingContext, Errc> {
        self.inner.send(&self.inner, netbuf, opts).await
    }

    /// Serializes `msg`, submits it under `method_id`, and parses the typed
    /// response according to the server's status code.
    pub async fn send_typed<In, Out>(
        &self,
        msg: &In,
        method_id: u32,
        opts: ClientOpts,
    ) -> Result<ClientContext<Out>, Errc>
    where
        In: Serialize,
        Out: DeserializeOwned,
    {
        let mut netbuf = Netbuf::new();
        netbuf.set_compression(opts.compression);
        netbuf.set_min_compression_bytes(opts.min_compression_bytes);
        netbuf.set_service_method_id(method_id);
        if let Err(e) = netbuf.serialize_json(msg) {
            tracing::debug!("request serialization failed: {}", e);
            return Err(Errc::ServiceError);
        }

        let ctx = self.send(netbuf, opts).await?;
        let header = *ctx.header();
        match map_status(ctx.status()) {
            Ok(()) => match ctx.parse_body::<Out>() {
                Ok(data) => {
                    self.inner.probe.request_completed();
                    Ok(ClientContext { header, data })
                }
                Err(errc) => {
                    self.inner.probe.request_error();
                    Err(errc)
                }
            },
            Err(errc) => {
                let mut ctx = ctx;
                ctx.signal_body_parse();
                self.inner.probe.request_error();
                Err(errc)
            }
        }
    }

    /// Rejects new work, fails outstanding calls with shutting_down, drains
    /// in-flight operations, and releases the socket.
    pub async fn stop(&self) {
        tracing::debug!("stopping transport to {}", self.inner.config.server_addr);
        self.inner.transition_to(TransportState::Closing);
        self.inner.fail_outstanding(Errc::ShuttingDown);
        self.inner.gate.close().await;

        if let Some(handle) = self.inner.reader_task.lock().unwrap().take() {
            handle.abort();
        }
        if let Some(mut out) = self.inner.out.lock().await.take() {
            let _ = out.shutdown().await;
        }
        self.inner.transition_to(TransportState::Closed);
    }

    /// Forcibly aborts the socket. Outstanding calls fail with disconnected;
    /// no draining.
    pub fn shutdown(&self) {
        tracing::debug!("shutting down transport to {}", self.inner.config.server_addr);
        self.inner.transition_to(TransportState::Closing);
        if let Some(handle) = self.inner.reader_task.lock().unwrap().take() {
            handle.abort();
        }
        if let Ok(mut out) = self.inner.out.try_lock() {
            out.take();
        }
        self.inner.fail_outstanding(Errc::Disconnected);
        self.inner.probe.disconnect();
    }

    pub fn is_valid(&self) -> bool {
        self.state() == TransportState::Ready
    }

    pub fn state(&self) -> TransportState {
        *self.inner.state.lock().unwrap()
    }

    pub fn server_address(&self) -> SocketAddr {
        self.inner.config.server_addr
    }

    pub fn probe(&self) -> &ClientProbe {
        &self.inner.probe
    }

    /// Number of calls currently awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.correlations.len()
    }
}

impl TransportInner {
    async fn connect(&self, this: &Arc<Self>) -> Result<(), ClientError> {
        {
            let mut state = self.state.lock().unwrap();
            if *state != TransportState::Created {
                return Err(ClientError::InvalidState);
            }
            *state = TransportState::Connecting;
        }

        match self.do_connect(this).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::debug!("connect to {} failed: {}", self.config.server_addr, e);
                self.transition_to(TransportState::Failed);
                Err(e)
            }
        }
    }

    async fn do_connect(&self, this: &Arc<Self>) -> Result<(), ClientError> {
        tracing::debug!("connecting to {}", self.config.server_addr);
        let stream = TransportStream::establish(&self.config).await?;

        let (read_half, write_half) = tokio::io::split(stream);
        *self.out.lock().await = Some(BatchedOutputStream::new(write_half));
        self.transition_to(TransportState::Ready);

        let weak = Arc::downgrade(this);
        let handle = tokio::spawn(run_read_loop(weak, read_half));
        *self.reader_task.lock().unwrap() = Some(handle);

        tracing::debug!("connected to {}", self.config.server_addr);
        Ok(())
    }

    async fn send(
        &self,
        this: &Arc<Self>,
        netbuf: Netbuf,
        opts: ClientOpts,
    ) -> Result<StreamingContext, Errc> {
        let _guard = self.gate.enter()?;
        self.probe.request();

        let deadline = tokio::time::Instant::now() + opts.timeout;
        let (seq, correlation) = self.queue.allocate();

        let result = self.do_send(this, seq, correlation, netbuf, deadline).await;
        if result.is_err() {
            self.probe.request_error();
        }
        result
    }

    async fn do_send(
        &self,
        this: &Arc<Self>,
        seq: u64,
        correlation: u32,
        netbuf: Netbuf,
        deadline: tokio::time::Instant,
    ) -> Result<StreamingContext, Errc> {
        let frame = match netbuf.into_wire(correlation) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("encoding outbound frame failed: {}", e);
                self.abandon(this, seq);
                return Err(Errc::ServiceError);
            }
        };

        // Admission: bounded by the construction-time budget so a single
        // oversized payload degrades to exclusive use rather than deadlock.
        let units = frame
            .payload_len()
            .min(self.config.memory_budget_bytes)
            .max(1) as u32;
        let _permit = match tokio::time::timeout_at(
            deadline,
            Arc::clone(&self.memory).acquire_many_owned(units),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_closed)) => {
                self.abandon(this, seq);
                return Err(Errc::ShuttingDown);
            }
            Err(_elapsed) => {
                self.abandon(this, seq);
                self.probe.request_timeout();
                return Err(Errc::RequestTimeout);
            }
        };

        let rx = match self.correlations.register(correlation) {
            Ok(rx) => rx,
            Err(errc) => {
                self.abandon(this, seq);
                return Err(errc);
            }
        };

        // A teardown between register and insert has already failed the
        // slot, so the await below resolves either way.
        self.queue.insert(seq, frame);
        self.dispatch_send(this);

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_sender_dropped)) => Err(Errc::Disconnected),
            Err(_elapsed) => {
                // Withdraw the slot first so a late response is discarded as
                // stale instead of resolving a timed-out call.
                self.correlations.remove(correlation);
                self.probe.request_timeout();
                Err(Errc::RequestTimeout)
            }
        }
    }

    /// Marks a claimed sequence as never-to-arrive and keeps the dispatcher
    /// moving past the gap.
    fn abandon(&self, this: &Arc<Self>, seq: u64) {
        self.queue.abandon(seq);
        self.dispatch_send(this);
    }

    /// Starts the single-flight dispatcher if it is not already running.
    fn dispatch_send(&self, this: &Arc<Self>) {
        if !self.queue.try_begin_dispatch() {
            return;
        }
        let Ok(guard) = self.gate.enter() else {
            // Teardown already closed the queue; nothing left to write.
            return;
        };
        let inner = Arc::clone(this);
        tokio::spawn(async move {
            let _guard = guard;
            inner.run_dispatch().await;
        });
    }

    /// Writes contiguous sequences, one flush group per frame, recording
    /// completion of each write before examining the next entry.
    async fn run_dispatch(&self) {
        loop {
            match self.queue.pop_next() {
                PopOutcome::Idle => return,
                PopOutcome::Skip => continue,
                PopOutcome::Frame(frame) => {
                    let mut out = self.out.lock().await;
                    let Some(stream) = out.as_mut() else {
                        drop(out);
                        self.correlations.fail(frame.correlation_id, Errc::Disconnected);
                        continue;
                    };
                    stream.append(&frame.header);
                    stream.append(&frame.payload);
                    if let Err(e) = stream.flush_group().await {
                        drop(out);
                        tracing::debug!("socket write failed: {}", e);
                        self.on_connection_failure(Errc::Disconnected);
                        return;
                    }
                }
            }
        }
    }

    /// Delivers one response frame to its waiter.
    fn dispatch_response(&self, header: Header, body: Bytes) {
        let correlation = header.correlation_id;

        let highest = self.highest_delivered.load(Ordering::Relaxed);
        if correlation < highest {
            self.probe.out_of_order_reply();
        } else {
            self.highest_delivered.store(correlation, Ordering::Relaxed);
        }

        let guard = self.gate.enter().ok();
        let ctx = StreamingContext::new(header, body, guard);
        if !self.correlations.complete(correlation, ctx) {
            tracing::debug!(correlation, "dropping stale response");
            self.probe.stale_response();
        }
    }

    /// Fails every outstanding slot, clears the ordered queue, and unblocks
    /// admission waiters.
    fn fail_outstanding(&self, errc: Errc) {
        self.memory.close();
        self.correlations.fail_all(errc);
        self.queue.close();
    }

    fn on_connection_failure(&self, errc: Errc) {
        self.fail_outstanding(errc);
        self.transition_to(TransportState::Closing);
        self.probe.disconnect();
    }

    fn transition_to(&self, next: TransportState) {
        let mut state = self.state.lock().unwrap();
        let current = *state;
        if matches!(current, TransportState::Closed | TransportState::Failed) {
            return;
        }
        if next > current {
            *state = next;
        }
    }
}

impl Drop for TransportInner {
    fn drop(&mut self) {
        if let Some(handle) = self.reader_task.lock().unwrap().take() {
            handle.abort();
        }
    }
}

/// Maps a response status code to the caller's outcome.
pub(crate) fn map_status(status: Status) -> Result<(), Errc> {
    match status {
        Status::Success => Ok(()),
        Status::RequestTimeout => Err(Errc::RequestTimeout),
        Status::ServerError => Err(Errc::ServiceError),
        Status::MethodNotFound => Err(Errc::MethodNotFound),
        Status::Unknown(_) => Err(Errc::ServiceError),
    }
}

/// Reads frames until EOF, error, or a corrupt header; holds only a weak
/// reference so an abandoned transport can be dropped.
async fn run_read_loop(inner: Weak<TransportInner>, mut reader: ReadHalf<TransportStream>) {
    let mut header_buf = [0u8; HEADER_SIZE];
    loop {
        if let Err(e) = reader.read_exact(&mut header_buf).await {
            if let Some(t) = inner.upgrade() {
                tracing::debug!("read loop terminated: {}", e);
                t.on_connection_failure(Errc::Disconnected);
            }
            return;
        }

        let header = match Header::decode(&header_buf) {
            Ok(header) => header,
            Err(e) => {
                if let Some(t) = inner.upgrade() {
                    tracing::warn!("corrupt response header: {}", e);
                    t.probe.header_corrupted();
                    t.on_connection_failure(Errc::Disconnected);
                }
                return;
            }
        };

        let mut body = vec![0u8; header.payload_size as usize];
        if let Err(e) = reader.read_exact(&mut body).await {
            if let Some(t) = inner.upgrade() {
                tracing::debug!("read loop lost connection mid-frame: {}", e);
                t.on_connection_failure(Errc::Disconnected);
            }
            return;
        }

        let Some(t) = inner.upgrade() else { return };
        t.dispatch_response(header, Bytes::from(body));
    }
}
