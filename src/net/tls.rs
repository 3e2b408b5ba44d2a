//! TLS material: parsing, trust store derivation and rustls configs.
//!
//! # Responsibilities
//! - Parse the PEM certificate chain and private key handed to the gateway
//! - Reject mismatched key/certificate pairs at startup
//! - Derive a trust store from the same certificate, used by loopback dials
//! - Build the server config (ALPN `h2`, `http/1.1`) and the client dial options
//!
//! # Design Decisions
//! - Loaded once, immutable afterwards; shared via `Arc`
//! - A fixed crypto provider (ring) so configs never depend on process defaults

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::sign::CertifiedKey;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use std::io::Cursor;
use std::sync::Arc;
use tokio_rustls::{TlsAcceptor, TlsConnector};

pub const ALPN_H2: &[u8] = b"h2";
pub const ALPN_HTTP11: &[u8] = b"http/1.1";

/// Reasons the supplied certificate material is unusable.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("no certificate found in PEM input")]
    NoCertificate,

    #[error("no private key found in PEM input")]
    NoPrivateKey,

    #[error("malformed PEM: {0}")]
    Pem(#[source] std::io::Error),

    #[error("certificate cannot be used as a trust anchor: {0}")]
    TrustStore(#[source] rustls::Error),

    #[error("{0}")]
    Rustls(#[from] rustls::Error),

    #[error("invalid TLS server name {0:?}")]
    ServerName(String),
}

/// Key pair plus the trust store derived from its certificate chain.
#[derive(Clone)]
pub struct TlsMaterial {
    chain: Vec<CertificateDer<'static>>,
    key: Arc<PrivateKeyDer<'static>>,
    roots: Arc<RootCertStore>,
    provider: Arc<CryptoProvider>,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("certificates", &self.chain.len())
            .field("trust_anchors", &self.roots.len())
            .finish_non_exhaustive()
    }
}

impl TlsMaterial {
    /// Parse PEM-encoded certificate chain and private key.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, TlsError> {
        let chain = rustls_pemfile::certs(&mut Cursor::new(cert_pem))
            .collect::<Result<Vec<_>, _>>()
            .map_err(TlsError::Pem)?;
        if chain.is_empty() {
            return Err(TlsError::NoCertificate);
        }

        let key = rustls_pemfile::private_key(&mut Cursor::new(key_pem))
            .map_err(TlsError::Pem)?
            .ok_or(TlsError::NoPrivateKey)?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let signing_key = provider.key_provider.load_private_key(key.clone_key())?;
        CertifiedKey::new(chain.clone(), signing_key).keys_match()?;

        let mut roots = RootCertStore::empty();
        for cert in &chain {
            roots.add(cert.clone()).map_err(TlsError::TrustStore)?;
        }

        tracing::debug!(
            certificates = chain.len(),
            trust_anchors = roots.len(),
            "TLS material loaded"
        );

        Ok(Self {
            chain,
            key: Arc::new(key),
            roots: Arc::new(roots),
            provider,
        })
    }

    /// Server config offering both HTTP/2 and HTTP/1.1 over ALPN.
    pub fn server_config(&self) -> Result<Arc<ServerConfig>, TlsError> {
        let mut config = ServerConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(self.chain.clone(), self.key.clone_key())?;
        config.alpn_protocols = vec![ALPN_H2.to_vec(), ALPN_HTTP11.to_vec()];
        Ok(Arc::new(config))
    }

    pub fn acceptor(&self) -> Result<TlsAcceptor, TlsError> {
        Ok(TlsAcceptor::from(self.server_config()?))
    }

    /// Client options for dialing `hostname:port` with this material's identity as the trust root.
    pub fn dial_options(&self, hostname: &str, port: u16) -> Result<DialOptions, TlsError> {
        DialOptions::new(Arc::clone(&self.provider), Arc::clone(&self.roots), hostname, port)
    }

    pub fn trust_anchors(&self) -> usize {
        self.roots.len()
    }
}

/// Everything needed to open a TLS connection back to the gateway.
///
/// Computed once at configuration time and reused by every loopback call.
#[derive(Debug, Clone)]
pub struct DialOptions {
    pub address: String,
    pub server_name: ServerName<'static>,
    config: Arc<ClientConfig>,
}

impl DialOptions {
    /// Options for a client that only holds the server's certificate.
    pub fn trusting_pem(ca_pem: &[u8], hostname: &str, port: u16) -> Result<Self, TlsError> {
        let mut roots = RootCertStore::empty();
        for cert in rustls_pemfile::certs(&mut Cursor::new(ca_pem)) {
            roots.add(cert.map_err(TlsError::Pem)?).map_err(TlsError::TrustStore)?;
        }
        if roots.is_empty() {
            return Err(TlsError::NoCertificate);
        }
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        Self::new(provider, Arc::new(roots), hostname, port)
    }

    fn new(
        provider: Arc<CryptoProvider>,
        roots: Arc<RootCertStore>,
        hostname: &str,
        port: u16,
    ) -> Result<Self, TlsError> {
        let mut config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();
        config.alpn_protocols = vec![ALPN_H2.to_vec()];

        let server_name = ServerName::try_from(hostname.to_string())
            .map_err(|_| TlsError::ServerName(hostname.to_string()))?;

        Ok(Self {
            address: format!("{}:{}", hostname, port),
            server_name,
            config: Arc::new(config),
        })
    }

    pub fn connector(&self) -> TlsConnector {
        TlsConnector::from(Arc::clone(&self.config))
    }

    pub fn authority(&self) -> &str {
        &self.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CERT: &[u8] = include_bytes!("../../tests/fixtures/cert_localhost.pem");
    const KEY: &[u8] = include_bytes!("../../tests/fixtures/key_localhost.pem");
    const OTHER_KEY: &[u8] = include_bytes!("../../tests/fixtures/key_other.pem");

    #[test]
    fn matching_pair_loads_and_derives_trust_store() {
        let material = TlsMaterial::from_pem(CERT, KEY).unwrap();
        assert_eq!(material.trust_anchors(), 1);

        let config = material.server_config().unwrap();
        assert_eq!(config.alpn_protocols, vec![b"h2".to_vec(), b"http/1.1".to_vec()]);

        let dial = material.dial_options("localhost", 5000).unwrap();
        assert_eq!(dial.authority(), "localhost:5000");
    }

    #[test]
    fn clients_can_trust_the_certificate_alone() {
        let dial = DialOptions::trusting_pem(CERT, "localhost", 5000).unwrap();
        assert_eq!(dial.authority(), "localhost:5000");
        assert!(matches!(
            DialOptions::trusting_pem(b"", "localhost", 5000),
            Err(TlsError::NoCertificate)
        ));
    }

    #[test]
    fn mismatched_key_is_rejected() {
        let err = TlsMaterial::from_pem(CERT, OTHER_KEY).unwrap_err();
        assert!(matches!(err, TlsError::Rustls(_)), "{err:?}");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            TlsMaterial::from_pem(b"not a pem", KEY),
            Err(TlsError::NoCertificate)
        ));
        assert!(matches!(
            TlsMaterial::from_pem(CERT, b"not a pem"),
            Err(TlsError::NoPrivateKey)
        ));
        // key and certificate swapped
        assert!(TlsMaterial::from_pem(KEY, CERT).is_err());
    }
}
