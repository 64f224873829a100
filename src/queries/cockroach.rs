use super::{ClusterSetting, QueryError, SettingsSource};
use crate::{
    config::{ConfigError, ConnectionConfig},
    pool::PoolOptions,
    tls::TlsMode,
};
use futures::future::BoxFuture;
use sqlx::{
    Executor, FromRow, PgConnection, PgPool, Postgres, Row,
    pool::PoolConnection,
    postgres::{PgConnectOptions, PgRow, PgSslMode},
};
use std::{fmt, time::Instant};
use tracing::debug;

const APPLICATION_NAME: &str = "cluster-settings";

/// Settings introspection; sent over the simple query protocol
pub const SHOW_CLUSTER_SETTINGS: &str = "SHOW CLUSTER SETTINGS";

/// Opens TLS encrypted connections to a `CockroachDB` cluster
#[derive(Clone)]
pub struct ClusterConnector {
    options: PgConnectOptions,
    mode: TlsMode,
}

impl ClusterConnector {
    /// Build connect options from the DSN and TLS configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the DSN cannot be parsed
    pub fn new(config: &ConnectionConfig) -> Result<Self, ConfigError> {
        let mut options = config
            .connect_options()?
            .application_name(APPLICATION_NAME);

        // Apply TLS configuration
        options = match config.tls.mode {
            TlsMode::Require => options.ssl_mode(PgSslMode::Require),
            TlsMode::VerifyCA => options.ssl_mode(PgSslMode::VerifyCa),
            TlsMode::VerifyFull => options.ssl_mode(PgSslMode::VerifyFull),
        };

        if let Some(pem) = &config.tls.ca_pem {
            options = options.ssl_root_cert_from_pem(pem.as_bytes().to_vec());
        }

        Ok(Self {
            options,
            mode: config.tls.mode,
        })
    }

    #[must_use]
    pub const fn options(&self) -> &PgConnectOptions {
        &self.options
    }

    #[must_use]
    pub const fn tls_mode(&self) -> TlsMode {
        self.mode
    }

    /// Pool of connections to the cluster, opened on first use
    #[must_use]
    pub fn connect_lazy(&self, options: &PoolOptions) -> PgPool {
        options.connect_lazy(self.options.clone())
    }
}

// `PgConnectOptions` prints the password in its `Debug` output
impl fmt::Debug for ClusterConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConnector")
            .field("host", &self.options.get_host())
            .field("port", &self.options.get_port())
            .field("tls_mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl<'r> FromRow<'r, PgRow> for ClusterSetting {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let name: String = row.try_get("variable")?;
        let value: Option<String> = row.try_get("value")?;
        let description: Option<String> = row.try_get("description")?;

        Ok(Self {
            name,
            value: value.unwrap_or_default(),
            description: description.unwrap_or_default(),
        })
    }
}

/// Run `SHOW CLUSTER SETTINGS` once, rows in the order the cluster sent them
async fn show_cluster_settings(
    conn: &mut PgConnection,
) -> Result<Vec<ClusterSetting>, QueryError> {
    let timer = Instant::now();
    let rows = conn.fetch_all(sqlx::raw_sql(SHOW_CLUSTER_SETTINGS)).await?;

    let settings = rows
        .iter()
        .map(ClusterSetting::from_row)
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        rows = settings.len(),
        elapsed_ms = timer.elapsed().as_millis(),
        "fetched cluster settings"
    );

    Ok(settings)
}

impl SettingsSource for PgConnection {
    fn fetch_settings(&mut self) -> BoxFuture<'_, Result<Vec<ClusterSetting>, QueryError>> {
        Box::pin(show_cluster_settings(self))
    }
}

impl SettingsSource for PoolConnection<Postgres> {
    fn fetch_settings(&mut self) -> BoxFuture<'_, Result<Vec<ClusterSetting>, QueryError>> {
        Box::pin(show_cluster_settings(&mut **self))
    }
}
