//! TLS connector construction for the transport.

use crate::config::TlsClientConfig;
use crate::error::ClientError;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::RootCertStore;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsConnector;

/// Builds a TLS connector and SNI server name from credentials.
///
/// `sni_hostname` overrides the name presented during the handshake; when
/// absent, the server's host string is used.
pub fn create_tls_connector(
    credentials: &TlsClientConfig,
    server_host: &str,
    sni_hostname: Option<&str>,
) -> Result<(TlsConnector, ServerName<'static>), ClientError> {
    if credentials.insecure {
        return create_insecure_tls_connector(server_host, sni_hostname);
    }

    let root_store = if let Some(ref ca_path) = credentials.ca_cert_path {
        let certs = load_certs(ca_path)?;
        let mut store = RootCertStore::empty();
        for cert in certs {
            store
                .add(cert)
                .map_err(|e| ClientError::TlsConfig(format!("invalid CA cert: {}", e)))?;
        }
        store
    } else {
        let mut store = RootCertStore::empty();
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        store
    };

    let builder = rustls::ClientConfig::builder().with_root_certificates(root_store);

    let client_config = if let (Some(cert_path), Some(key_path)) = (
        &credentials.client_cert_path,
        &credentials.client_key_path,
    ) {
        let certs = load_certs(cert_path)?;
        let key = load_private_key(key_path)?;
        builder
            .with_client_auth_cert(certs, key)
            .map_err(|e| ClientError::TlsConfig(format!("invalid client cert/key: {}", e)))?
    } else {
        builder.with_no_client_auth()
    };

    let connector = TlsConnector::from(Arc::new(client_config));
    let server_name = resolve_server_name(server_host, sni_hostname)?;

    Ok((connector, server_name))
}

/// Signature schemes the no-verification mode claims to understand. The
/// verifier never checks a signature, so this list only has to be broad
/// enough for servers to pick something.
const ACCEPT_ANY_SCHEMES: &[rustls::SignatureScheme] = &[
    rustls::SignatureScheme::ED25519,
    rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
    rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
    rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
    rustls::SignatureScheme::RSA_PSS_SHA256,
    rustls::SignatureScheme::RSA_PSS_SHA384,
    rustls::SignatureScheme::RSA_PSS_SHA512,
    rustls::SignatureScheme::RSA_PKCS1_SHA256,
    rustls::SignatureScheme::RSA_PKCS1_SHA384,
    rustls::SignatureScheme::RSA_PKCS1_SHA512,
];

/// Trusts whatever certificate the server presents. Exists solely for the
/// development-only insecure mode.
#[derive(Debug)]
struct AcceptAnyServerCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        ACCEPT_ANY_SCHEMES.to_vec()
    }
}

/// Connector that skips server certificate verification.
/// WARNING: development/testing only.
fn create_insecure_tls_connector(
    server_host: &str,
    sni_hostname: Option<&str>,
) -> Result<(TlsConnector, ServerName<'static>), ClientError> {
    let client_config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
        .with_no_client_auth();

    let connector = TlsConnector::from(Arc::new(client_config));
    let server_name = resolve_server_name(server_host, sni_hostname)?;

    Ok((connector, server_name))
}

fn resolve_server_name(
    server_host: &str,
    sni_hostname: Option<&str>,
) -> Result<ServerName<'static>, ClientError> {
    let name = sni_hostname.unwrap_or(server_host);
    ServerName::try_from(name.to_string())
        .map_err(|_| ClientError::TlsConfig(format!("invalid server name: {}", name)))
}

fn open_pem(path: &Path) -> Result<BufReader<File>, ClientError> {
    let file = File::open(path).map_err(|e| {
        ClientError::TlsConfig(format!("unable to read {}: {}", path.display(), e))
    })?;
    Ok(BufReader::new(file))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ClientError> {
    let mut reader = open_pem(path)?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<_, _>>()
        .map_err(|e| {
            ClientError::TlsConfig(format!("bad certificate in {}: {}", path.display(), e))
        })?;
    if certs.is_empty() {
        return Err(ClientError::TlsConfig(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ClientError> {
    let mut reader = open_pem(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| {
            ClientError::TlsConfig(format!("bad private key in {}: {}", path.display(), e))
        })?
        .ok_or_else(|| {
            ClientError::TlsConfig(format!("no private key found in {}", path.display()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_pem(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_missing_pem_is_a_config_error() {
        let err = load_certs(Path::new("/no/such/bundle.pem")).unwrap_err();
        assert!(matches!(err, ClientError::TlsConfig(_)));
    }

    #[test]
    fn test_cert_bundle_without_certificates() {
        let path = scratch_pem("wirelink-test-empty-bundle.pem", "not pem at all\n");
        let err = load_certs(&path).unwrap_err();
        assert!(err.to_string().contains("no certificates"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_key_file_without_key_material() {
        // A certificate block is valid PEM but yields no key.
        let path = scratch_pem(
            "wirelink-test-cert-not-key.pem",
            "-----BEGIN CERTIFICATE-----\nAA==\n-----END CERTIFICATE-----\n",
        );
        let err = load_private_key(&path).unwrap_err();
        assert!(err.to_string().contains("no private key"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_sni_override_wins() {
        let name = resolve_server_name("10.0.0.1", Some("broker.internal")).unwrap();
        assert!(matches!(name, ServerName::DnsName(_)));
    }

    #[test]
    fn test_invalid_sni_rejected() {
        let result = resolve_server_name("10.0.0.1", Some("not a hostname"));
        assert!(matches!(result, Err(ClientError::TlsConfig(_))));
    }
}
