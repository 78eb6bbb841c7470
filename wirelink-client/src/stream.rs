//! Connection establishment and the resulting socket stream.

use crate::config::TransportConfiguration;
use crate::error::ClientError;
use crate::tls::create_tls_connector;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

/// Object-safe view over the two stream backends.
trait AsyncIo: AsyncRead + AsyncWrite + Unpin {}
impl<T: AsyncRead + AsyncWrite + Unpin> AsyncIo for T {}

/// The transport's established socket, in plaintext or under TLS.
///
/// Dialing, TCP tuning, and the optional TLS handshake (with SNI override)
/// all happen in [`TransportStream::establish`]; past that point the
/// transport sees one bidirectional byte stream and never asks which kind.
#[derive(Debug)]
pub enum TransportStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl TransportStream {
    /// Dials the configured endpoint within the connect timeout and, when
    /// credentials are present, runs the TLS handshake before returning.
    pub(crate) async fn establish(
        config: &TransportConfiguration,
    ) -> Result<Self, ClientError> {
        let tcp = tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect(config.server_addr),
        )
        .await
        .map_err(|_| ClientError::ConnectTimeout)?
        .map_err(ClientError::Io)?;

        tcp.set_nodelay(true).ok();

        let Some(credentials) = &config.credentials else {
            return Ok(TransportStream::Plain(tcp));
        };

        let host = config.server_addr.ip().to_string();
        let (connector, server_name) =
            create_tls_connector(credentials, &host, config.tls_sni_hostname.as_deref())?;
        tracing::debug!("performing TLS handshake with {}", config.server_addr);
        let tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| ClientError::TlsHandshake(e.to_string()))?;

        Ok(TransportStream::Tls(Box::new(tls)))
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, TransportStream::Tls(_))
    }

    /// Both backends are `Unpin`, so polling delegates through a plain
    /// mutable reference instead of structural pin projection.
    fn io_mut(&mut self) -> &mut dyn AsyncIo {
        match self {
            TransportStream::Plain(tcp) => tcp,
            TransportStream::Tls(tls) => tls.as_mut(),
        }
    }
}

impl AsyncRead for TransportStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(self.get_mut().io_mut()).poll_read(cx, buf)
    }
}

impl AsyncWrite for TransportStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(self.get_mut().io_mut()).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(self.get_mut().io_mut()).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(self.get_mut().io_mut()).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_establish_plaintext() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = TransportConfiguration::new(listener.local_addr().unwrap());

        let (stream, accepted) = tokio::join!(TransportStream::establish(&config), listener.accept());
        accepted.unwrap();
        assert!(!stream.unwrap().is_tls());
    }

    #[tokio::test]
    async fn test_establish_against_closed_port() {
        // Bind then drop, so the port is known-free.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = TransportStream::establish(&TransportConfiguration::new(addr))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Io(_)));
    }
}
