//! # wirelink-client
//!
//! Asynchronous multiplexed RPC client transport.
//!
//! This crate provides:
//! - A single-connection, multiplexed request/response transport over TCP
//!   with optional TLS (including SNI override and mTLS)
//! - Ordered outbound dispatch with memory-bounded admission control
//! - Per-call deadlines with exactly-once completion delivery
//! - A composition rule for sharing one transport across protocol facades
//! - Sequential and parallel async transform helpers

mod batched;
pub mod client;
pub mod config;
pub mod error;
pub mod future_util;
mod gate;
pub mod probe;
mod queue;
pub mod response;
pub mod stream;
pub mod tls;
pub mod transport;

pub use client::{Client, ProtocolClient};
pub use config::{ClientOpts, TlsClientConfig, TransportConfiguration};
pub use error::{ClientError, Errc};
pub use future_util::{async_transform, parallel_transform};
pub use probe::ClientProbe;
pub use response::{ClientContext, StreamingContext};
pub use transport::{Transport, TransportState};
