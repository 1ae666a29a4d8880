// TLS for the HTTPS listener
//
// Loads the certificate pair into a rustls acceptor and, for local
// development, generates a self-signed pair when none exists.

pub mod selfsigned;

pub use selfsigned::{CertificateInfo, SelfSignedCertificate};

use anyhow::{Context, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use tracing::info;

use crate::config::TlsSettings;

pub const CERT_FILE_NAME: &str = "certificate.crt";
pub const KEY_FILE_NAME: &str = "private.key";

/// Acceptor for incoming TLS connections
#[derive(Clone)]
pub struct TlsConfig {
    pub acceptor: TlsAcceptor,
}

impl TlsConfig {
    /// Create TLS config from certificate and key files
    pub fn from_files(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let cert_pem = std::fs::read_to_string(cert_path)
            .with_context(|| format!("Failed to open certificate file: {}", cert_path.display()))?;
        let key_pem = std::fs::read_to_string(key_path)
            .with_context(|| format!("Failed to open private key file: {}", key_path.display()))?;

        let config = Self::from_pem(&cert_pem, &key_pem)?;

        info!(
            cert = %cert_path.display(),
            key = %key_path.display(),
            "Loaded TLS certificate"
        );

        Ok(config)
    }

    /// Create TLS config from PEM strings
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let certs = load_certs(cert_pem)?;
        let key = load_private_key(key_pem)?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .context("Failed to select TLS protocol versions")?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .context("Failed to create TLS server config")?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(config)),
        })
    }
}

fn load_certs(pem: &str) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(pem.as_bytes());

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to parse certificates")?;

    if certs.is_empty() {
        anyhow::bail!("No certificates found in PEM data");
    }

    Ok(certs)
}

fn load_private_key(pem: &str) -> Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(pem.as_bytes());

    loop {
        match rustls_pemfile::read_one(&mut reader)? {
            Some(rustls_pemfile::Item::Pkcs1Key(key)) => return Ok(PrivateKeyDer::Pkcs1(key)),
            Some(rustls_pemfile::Item::Pkcs8Key(key)) => return Ok(PrivateKeyDer::Pkcs8(key)),
            Some(rustls_pemfile::Item::Sec1Key(key)) => return Ok(PrivateKeyDer::Sec1(key)),
            Some(_) => continue,
            None => break,
        }
    }

    anyhow::bail!("No private key found in PEM data")
}

/// Make sure the configured pair exists, generating one if allowed
pub fn ensure_certificate(settings: &TlsSettings) -> Result<()> {
    let cert_path = settings.cert_path();
    let key_path = settings.key_path();

    if cert_path.exists() && key_path.exists() {
        return Ok(());
    }
    if !settings.auto_generate {
        anyhow::bail!(
            "TLS is enabled but {} or {} is missing; run `keystone gen-cert` or set tls.auto_generate",
            cert_path.display(),
            key_path.display()
        );
    }

    info!("No TLS certificate found, generating a self-signed one");
    SelfSignedCertificate::generate(&settings.organization, settings.days_valid)?
        .write(&cert_path, &key_path, false)?;
    Ok(())
}

/// Load the configured pair, generating it first when needed
pub fn load(settings: &TlsSettings) -> Result<TlsConfig> {
    ensure_certificate(settings)?;
    TlsConfig::from_files(&settings.cert_path(), &settings.key_path())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(dir: &Path, auto_generate: bool) -> TlsSettings {
        TlsSettings {
            cert_dir: dir.to_path_buf(),
            auto_generate,
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_pair_without_auto_generate_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ensure_certificate(&settings(dir.path(), false)).is_err());
    }

    #[test]
    fn test_load_generates_and_builds_acceptor() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), true);

        assert!(load(&settings).is_ok());
        assert!(dir.path().join(CERT_FILE_NAME).exists());
        assert!(dir.path().join(KEY_FILE_NAME).exists());
    }

    #[test]
    fn test_garbage_pem_is_rejected() {
        assert!(TlsConfig::from_pem("not a cert", "not a key").is_err());
    }

    #[test]
    fn test_pem_without_key_is_rejected() {
        let pair = SelfSignedCertificate::generate("Test", 1).unwrap();
        assert!(TlsConfig::from_pem(&pair.cert_pem, &pair.cert_pem).is_err());
        assert!(TlsConfig::from_pem(&pair.cert_pem, &pair.key_pem).is_ok());
    }
}
