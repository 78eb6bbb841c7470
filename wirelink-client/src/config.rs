//! Transport and per-call configuration.

use prometheus::Registry;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use wirelink_protocol::{Compression, DEFAULT_MIN_COMPRESSION_BYTES};

/// Default admission budget for in-flight payload bytes (32 MiB).
pub const DEFAULT_MEMORY_BUDGET_BYTES: usize = 32 * 1024 * 1024;

/// TLS credentials for the connection.
#[derive(Debug, Clone, Default)]
pub struct TlsClientConfig {
    /// Path to PEM-encoded CA certificate(s) for server verification.
    /// If None, the bundled web PKI roots are used.
    pub ca_cert_path: Option<PathBuf>,
    /// Path to PEM-encoded client certificate (for mTLS).
    pub client_cert_path: Option<PathBuf>,
    /// Path to PEM-encoded client private key (for mTLS).
    pub client_key_path: Option<PathBuf>,
    /// Skip server certificate verification (INSECURE - development only).
    pub insecure: bool,
}

impl TlsClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    pub fn with_client_cert(
        mut self,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        self.client_cert_path = Some(cert_path.into());
        self.client_key_path = Some(key_path.into());
        self
    }

    pub fn with_insecure(mut self) -> Self {
        self.insecure = true;
        self
    }
}

/// Transport construction parameters.
#[derive(Clone)]
pub struct TransportConfiguration {
    /// Server endpoint.
    pub server_addr: SocketAddr,
    /// TLS credentials; absence means plaintext TCP.
    pub credentials: Option<TlsClientConfig>,
    /// Optional server name indication (SNI) override for the TLS handshake.
    /// Used only when credentials are present.
    pub tls_sni_hostname: Option<String>,
    /// Suppress probe registration with the metrics registry.
    pub disable_metrics: bool,
    /// Host-supplied registry the probe publishes into.
    pub metrics_registry: Option<Registry>,
    /// Admission ceiling for in-flight payload bytes.
    pub memory_budget_bytes: usize,
    /// Connection establishment timeout.
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for TransportConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConfiguration")
            .field("server_addr", &self.server_addr)
            .field("tls", &self.credentials.is_some())
            .field("tls_sni_hostname", &self.tls_sni_hostname)
            .field("disable_metrics", &self.disable_metrics)
            .field("memory_budget_bytes", &self.memory_budget_bytes)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl TransportConfiguration {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            credentials: None,
            tls_sni_hostname: None,
            disable_metrics: false,
            metrics_registry: None,
            memory_budget_bytes: DEFAULT_MEMORY_BUDGET_BYTES,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_credentials(mut self, credentials: TlsClientConfig) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_tls_sni_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.tls_sni_hostname = Some(hostname.into());
        self
    }

    pub fn with_disabled_metrics(mut self) -> Self {
        self.disable_metrics = true;
        self
    }

    pub fn with_metrics_registry(mut self, registry: Registry) -> Self {
        self.metrics_registry = Some(registry);
        self
    }

    pub fn with_memory_budget_bytes(mut self, bytes: usize) -> Self {
        self.memory_budget_bytes = bytes.max(1);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Per-call options.
#[derive(Debug, Clone, Copy)]
pub struct ClientOpts {
    /// Deadline covering admission and the response wait.
    pub timeout: Duration,
    /// Payload compression codec.
    pub compression: Compression,
    /// Payloads shorter than this are sent uncompressed.
    pub min_compression_bytes: usize,
}

impl Default for ClientOpts {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            compression: Compression::None,
            min_compression_bytes: DEFAULT_MIN_COMPRESSION_BYTES,
        }
    }
}

impl ClientOpts {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_min_compression_bytes(mut self, bytes: usize) -> Self {
        self.min_compression_bytes = bytes;
        self
    }
}
