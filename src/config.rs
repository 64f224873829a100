use crate::tls::{TlsConfig, TlsMode};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgConnectOptions;
use std::{net::IpAddr, path::PathBuf, str::FromStr, time::Duration};

pub const DEFAULT_PORT: u16 = 3002;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

/// Configuration problems detected before the server starts listening
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DSN is empty")]
    EmptyDsn,

    #[error("invalid DSN: {0}")]
    InvalidDsn(String),

    #[error("DSN credentials contain an unescaped '@', percent-encode it as %40")]
    UnescapedAt,

    #[error("TLS mode {0} requires a CA certificate (--tls-ca or --tls-ca-pem)")]
    MissingCa(TlsMode),

    #[error("failed to read CA certificate {}", path.display())]
    ReadCa {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid CA certificate: {0}")]
    InvalidCa(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Everything needed to open connections to the cluster
///
/// The DSN carries credentials, so it is kept in a [`SecretString`] and never
/// shows up in `Debug` output or logs.
#[derive(Debug)]
pub struct ConnectionConfig {
    pub dsn: SecretString,
    pub max_connections: u32,
    pub idle_timeout: Duration,
    /// `None` waits for a free connection indefinitely
    pub acquire_timeout: Option<Duration>,
    pub tls: TlsConfig,
}

impl ConnectionConfig {
    /// Create a configuration with default pool limits and `verify-full` TLS
    #[must_use]
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: SecretString::from(dsn.into()),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            idle_timeout: Duration::from_millis(DEFAULT_IDLE_TIMEOUT_MS),
            acquire_timeout: Some(Duration::from_millis(DEFAULT_ACQUIRE_TIMEOUT_MS)),
            tls: TlsConfig::default(),
        }
    }

    /// Check the whole configuration
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.connect_options()?;

        if self.max_connections == 0 {
            return Err(ConfigError::Zero("max-connections"));
        }

        if self.idle_timeout.is_zero() {
            return Err(ConfigError::Zero("idle-timeout-ms"));
        }

        self.tls.validate()
    }

    /// Parse the DSN into connection options, without TLS applied
    ///
    /// # Errors
    ///
    /// Returns an error if the DSN is empty or not a valid PostgreSQL URL
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        let dsn = self.dsn.expose_secret();
        if dsn.trim().is_empty() {
            return Err(ConfigError::EmptyDsn);
        }

        // the descriptor cuts at the first '@', which must end the user info
        if authority(dsn).matches('@').count() > 1 {
            return Err(ConfigError::UnescapedAt);
        }

        PgConnectOptions::from_str(dsn).map_err(|e| ConfigError::InvalidDsn(e.to_string()))
    }

    /// Credential-free part of the DSN, safe to show to operators
    #[must_use]
    pub fn descriptor(&self) -> String {
        crate::report::connection_descriptor(self.dsn.expose_secret())
    }
}

/// Host part of a URL style DSN, user info included
fn authority(dsn: &str) -> &str {
    let dsn = dsn.trim();
    let rest = dsn.split_once("://").map_or(dsn, |(_, rest)| rest);
    rest.split(['/', '?', '#']).next().unwrap_or(rest)
}

/// Configuration for the `serve` action
#[derive(Debug)]
pub struct ServeConfig {
    pub connection: ConnectionConfig,
    pub listen: Option<IpAddr>,
    pub port: u16,
}

impl ServeConfig {
    /// Origin used for request URLs when no `X-Forwarded-Host` is present
    #[must_use]
    pub fn default_origin(&self) -> String {
        format!("http://localhost:{}", self.port)
    }
}
