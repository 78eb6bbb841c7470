//! Client-side transport counters.
//!
//! The probe publishes through a host-supplied Prometheus registry; with
//! metrics disabled (or no registry) the counters still accumulate locally,
//! which keeps them observable in tests.

use prometheus::{IntCounter, Opts, Registry};
use std::sync::Arc;

#[derive(Clone)]
pub struct ClientProbe {
    inner: Arc<ProbeInner>,
}

struct ProbeInner {
    requests: IntCounter,
    requests_completed: IntCounter,
    request_errors: IntCounter,
    request_timeouts: IntCounter,
    corrupt_headers: IntCounter,
    stale_responses: IntCounter,
    out_of_order_replies: IntCounter,
    disconnects: IntCounter,
}

impl ClientProbe {
    /// Creates the probe, registering its counters unless disabled.
    pub fn new(registry: Option<&Registry>) -> Result<Self, prometheus::Error> {
        let make = |name: &str, help: &str| {
            IntCounter::with_opts(Opts::new(format!("wirelink_client_{}", name), help))
        };

        let inner = ProbeInner {
            requests: make("requests_total", "Total requests submitted")?,
            requests_completed: make("requests_completed_total", "Requests completed with a response")?,
            request_errors: make("request_errors_total", "Requests failed with an error")?,
            request_timeouts: make("request_timeouts_total", "Requests failed by the per-call timer")?,
            corrupt_headers: make("corrupt_headers_total", "Response headers that failed validation")?,
            stale_responses: make(
                "stale_responses_total",
                "Responses with no matching in-flight request",
            )?,
            out_of_order_replies: make(
                "out_of_order_replies_total",
                "Responses delivered out of submission order",
            )?,
            disconnects: make("disconnects_total", "Connections lost or torn down")?,
        };

        if let Some(registry) = registry {
            registry.register(Box::new(inner.requests.clone()))?;
            registry.register(Box::new(inner.requests_completed.clone()))?;
            registry.register(Box::new(inner.request_errors.clone()))?;
            registry.register(Box::new(inner.request_timeouts.clone()))?;
            registry.register(Box::new(inner.corrupt_headers.clone()))?;
            registry.register(Box::new(inner.stale_responses.clone()))?;
            registry.register(Box::new(inner.out_of_order_replies.clone()))?;
            registry.register(Box::new(inner.disconnects.clone()))?;
        }

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub(crate) fn request(&self) {
        self.inner.requests.inc();
    }

    pub(crate) fn request_completed(&self) {
        self.inner.requests_completed.inc();
    }

    pub(crate) fn request_error(&self) {
        self.inner.request_errors.inc();
    }

    pub(crate) fn request_timeout(&self) {
        self.inner.request_timeouts.inc();
    }

    pub(crate) fn header_corrupted(&self) {
        self.inner.corrupt_headers.inc();
    }

    pub(crate) fn stale_response(&self) {
        self.inner.stale_responses.inc();
    }

    pub(crate) fn out_of_order_reply(&self) {
        self.inner.out_of_order_replies.inc();
    }

    pub(crate) fn disconnect(&self) {
        self.inner.disconnects.inc();
    }

    pub fn requests(&self) -> u64 {
        self.inner.requests.get()
    }

    pub fn requests_completed(&self) -> u64 {
        self.inner.requests_completed.get()
    }

    pub fn request_errors(&self) -> u64 {
        self.inner.request_errors.get()
    }

    pub fn request_timeouts(&self) -> u64 {
        self.inner.request_timeouts.get()
    }

    pub fn corrupt_headers(&self) -> u64 {
        self.inner.corrupt_headers.get()
    }

    pub fn stale_responses(&self) -> u64 {
        self.inner.stale_responses.get()
    }

    pub fn out_of_order_replies(&self) -> u64 {
        self.inner.out_of_order_replies.get()
    }

    pub fn disconnects(&self) -> u64 {
        self.inner.disconnects.get()
    }
}
