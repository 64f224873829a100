use super::roots::root_store_from_pem;
use crate::config::ConfigError;
use std::{fmt, path::Path, str::FromStr};

/// TLS configuration for cluster connections
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub mode: TlsMode,
    /// PEM encoded CA certificate(s) used to verify the cluster nodes
    pub ca_pem: Option<String>,
}

/// TLS/SSL mode for cluster connections
///
/// There is no plaintext mode: every connection is encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// TLS required, but no certificate verification (test environments only)
    Require,
    /// Verify server certificate against CA
    VerifyCA,
    /// Verify certificate and hostname
    #[default]
    VerifyFull,
}

impl FromStr for TlsMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "require" => Ok(Self::Require),
            "verify-ca" => Ok(Self::VerifyCA),
            "verify-full" => Ok(Self::VerifyFull),
            _ => Err(format!("Invalid TLS mode: {s}")),
        }
    }
}

impl fmt::Display for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TlsMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Require => "require",
            Self::VerifyCA => "verify-ca",
            Self::VerifyFull => "verify-full",
        }
    }

    /// Check if the server certificate is verified
    #[must_use]
    pub const fn verifies(&self) -> bool {
        !matches!(self, Self::Require)
    }
}

impl TlsConfig {
    /// Read the CA certificate from a PEM file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read
    pub fn read_ca(path: &Path) -> Result<String, ConfigError> {
        std::fs::read_to_string(path).map_err(|source| ConfigError::ReadCa {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check that a verifying mode has a usable CA certificate
    ///
    /// # Errors
    ///
    /// Returns an error if the CA is missing in a verifying mode or cannot be parsed
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.ca_pem {
            Some(pem) => root_store_from_pem(pem).map(|_| ()),
            None if self.mode.verifies() => Err(ConfigError::MissingCa(self.mode)),
            None => Ok(()),
        }
    }
}
