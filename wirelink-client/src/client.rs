//! Client composition over protocol facades.

use crate::config::TransportConfiguration;
use crate::error::ClientError;
use crate::transport::Transport;
use std::net::SocketAddr;

/// A typed protocol surface bound to a borrowed transport.
///
/// Facades never own the transport: they are constructed after it, borrow it
/// for their lifetime, and cannot outlive the [`Client`] that owns it. Many
/// facades may share one transport.
pub trait ProtocolClient<'t>: Sized {
    fn attach(transport: &'t Transport) -> Self;
}

/// Owns one transport and hands out protocol facades over it.
///
/// The client itself exposes only lifecycle operations; all typed methods
/// live on the facades.
pub struct Client {
    transport: Transport,
}

impl Client {
    pub fn new(config: TransportConfiguration) -> Result<Self, ClientError> {
        Ok(Self {
            transport: Transport::new(config)?,
        })
    }

    /// Constructs a facade borrowing this client's transport.
    pub fn protocol<'t, P: ProtocolClient<'t>>(&'t self) -> P {
        P::attach(&self.transport)
    }

    pub async fn connect(&self) -> Result<(), ClientError> {
        self.transport.connect().await
    }

    pub async fn stop(&self) {
        self.transport.stop().await
    }

    pub fn shutdown(&self) {
        self.transport.shutdown()
    }

    pub fn is_valid(&self) -> bool {
        self.transport.is_valid()
    }

    pub fn server_address(&self) -> SocketAddr {
        self.transport.server_address()
    }
}
