use crate::error::ConfigError;
use anyhow::{Context, Result};
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

/// Server certificate chain and private key used to answer a STARTTLS upgrade.
///
/// Built once from PEM input; clones share the underlying rustls configuration.
#[derive(Debug, Clone)]
pub struct TlsIdentity {
    config: Arc<ServerConfig>,
}

impl TlsIdentity {
    /// Builds an identity from an in-memory PEM certificate chain and private key.
    ///
    /// The key may be PKCS#1, PKCS#8 or SEC1 encoded.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, ConfigError> {
        let certs = load_certs(cert_pem)?;
        let key = load_key(key_pem)?;

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| ConfigError::InvalidCertificate(e.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Reads the certificate chain and key from PEM files on disk.
    pub fn from_pem_files(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self> {
        let cert_path = cert_path.as_ref();
        let key_path = key_path.as_ref();
        let cert_pem = std::fs::read(cert_path)
            .with_context(|| format!("Failed to open certificate: {:?}", cert_path))?;
        let key_pem = std::fs::read(key_path)
            .with_context(|| format!("Failed to open private key: {:?}", key_path))?;

        Self::from_pem(&cert_pem, &key_pem)
            .with_context(|| format!("Failed to build TLS identity from {:?}", cert_path))
    }

    pub(crate) fn acceptor(&self) -> TlsAcceptor {
        TlsAcceptor::from(self.config.clone())
    }
}

fn load_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, ConfigError> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(pem))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| ConfigError::InvalidCertificate(e.to_string()))?;

    if certs.is_empty() {
        return Err(ConfigError::InvalidCertificate(
            "no certificate found in PEM input".to_string(),
        ));
    }
    Ok(certs)
}

fn load_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, ConfigError> {
    rustls_pemfile::private_key(&mut BufReader::new(pem))
        .map_err(|e| ConfigError::InvalidPrivateKey(e.to_string()))?
        .ok_or_else(|| {
            ConfigError::InvalidPrivateKey(
                "no PKCS1, PKCS8 or SEC1 key found in PEM input".to_string(),
            )
        })
}
