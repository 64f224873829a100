use crate::config::ConfigError;
use rustls::RootCertStore;
use rustls_pemfile::certs;
use std::sync::OnceLock;

static CRYPTO_PROVIDER_INIT: OnceLock<()> = OnceLock::new();

/// Ensure the rustls crypto provider is initialized
///
/// This should be called before any TLS operations. It's safe to call
/// multiple times as initialization only happens once. A provider installed
/// earlier by someone else is left in place.
pub fn ensure_crypto_provider() {
    CRYPTO_PROVIDER_INIT.get_or_init(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            tracing::debug!("rustls crypto provider already installed");
        }
    });
}

/// Parse PEM encoded CA certificates into a root store
///
/// # Errors
///
/// Returns an error if the PEM cannot be decoded, contains no certificates,
/// or contains a certificate rustls refuses as a trust anchor
pub fn root_store_from_pem(pem: &str) -> Result<RootCertStore, ConfigError> {
    let mut store = RootCertStore::empty();
    let mut reader = pem.as_bytes();

    for cert in certs(&mut reader) {
        let cert = cert.map_err(|e| ConfigError::InvalidCa(e.to_string()))?;
        store
            .add(cert)
            .map_err(|e| ConfigError::InvalidCa(e.to_string()))?;
    }

    if store.is_empty() {
        return Err(ConfigError::InvalidCa(
            "no certificates found in PEM".to_string(),
        ));
    }

    Ok(store)
}
