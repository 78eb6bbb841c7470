//! Client error types.

use thiserror::Error;

/// Per-call error codes delivered to RPC waiters.
///
/// These are the only outcomes a call can fail with once submitted; they are
/// deliberately small and copyable so teardown can fan one out to every
/// outstanding slot. Header corruption has no entry here on purpose: a frame
/// whose header fails parity cannot be attributed to any single call, so the
/// read loop counts it through the probe and fails everything outstanding
/// with [`Errc::Disconnected`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Errc {
    #[error("disconnected")]
    Disconnected,

    #[error("corrupt body")]
    CorruptBody,

    #[error("client request timeout")]
    RequestTimeout,

    #[error("method not found")]
    MethodNotFound,

    #[error("service error")]
    ServiceError,

    #[error("shutting down")]
    ShuttingDown,
}

/// Connection lifecycle errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connect timeout")]
    ConnectTimeout,

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),

    #[error("transport is not in a connectable state")]
    InvalidState,

    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error(transparent)]
    Rpc(#[from] Errc),
}
