//! TLS configuration for cluster connections
//!
//! # Module Organization
//!
//! - `config` - TLS modes and the CA certificate source
//! - `roots` - crypto provider setup and CA certificate validation
//!
//! Verification is on by default (`verify-full`). `require` encrypts the
//! connection without checking the server certificate and only exists for
//! test clusters.

pub mod config;
pub mod roots;

// Re-export commonly used types
pub use config::{TlsConfig, TlsMode};
pub use roots::{ensure_crypto_provider, root_store_from_pem};
