//! Bounded connection pool
//!
//! Production code checks connections out of a `sqlx` [`PgPool`], which bounds
//! live connections to `max_connections`, reuses idle ones and closes those
//! idle for longer than `idle_timeout`. Request handling only sees the
//! [`ConnectionPool`] trait, so tests can inject a recording double.
//!
//! A checked out connection goes back to the pool when it is dropped, on every
//! exit path of the caller.

use crate::queries::SettingsSource;
use sqlx::{
    PgPool, Postgres,
    pool::PoolConnection,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use std::{future::Future, time::Duration};
use tracing::debug;

/// Acquire timeout used when the configuration asks to wait indefinitely
pub const UNBOUNDED_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24 * 365);

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("no connection available after {0:?}")]
    Exhausted(Duration),

    #[error("failed to connect to the cluster")]
    Connection(#[source] sqlx::Error),

    #[error("connection pool is closed")]
    Closed,
}

impl PoolError {
    /// Classify an error returned by `sqlx` while acquiring a connection
    #[must_use]
    pub fn from_acquire(err: sqlx::Error, acquire_timeout: Duration) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => Self::Exhausted(acquire_timeout),
            sqlx::Error::PoolClosed => Self::Closed,
            other => Self::Connection(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    pub max_connections: u32,
    pub idle_timeout: Duration,
    /// `None` waits for a free connection indefinitely
    pub acquire_timeout: Option<Duration>,
}

impl PoolOptions {
    /// Effective acquire timeout handed to the pool
    #[must_use]
    pub fn acquire_limit(&self) -> Duration {
        self.acquire_timeout.unwrap_or(UNBOUNDED_ACQUIRE_TIMEOUT)
    }

    /// Create a [`PgPool`]; no connection is opened until the first acquire
    ///
    /// Must be called inside a tokio runtime, `sqlx` spawns its idle reaper
    /// right away.
    #[must_use]
    pub fn connect_lazy(&self, options: PgConnectOptions) -> PgPool {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(0)
            .idle_timeout(Some(self.idle_timeout))
            .acquire_timeout(self.acquire_limit())
            .after_connect(|_conn, _meta| {
                Box::pin(async {
                    debug!("opened cluster connection");
                    Ok(())
                })
            })
            .connect_lazy_with(options)
    }
}

impl From<&crate::config::ConnectionConfig> for PoolOptions {
    fn from(config: &crate::config::ConnectionConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            idle_timeout: config.idle_timeout,
            acquire_timeout: config.acquire_timeout,
        }
    }
}

/// Point-in-time view of the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub max: usize,
    /// Connections parked in the idle set
    pub idle: usize,
    /// Connections currently checked out
    pub in_use: usize,
}

/// Checkout and return of connections that can list cluster settings
///
/// Dropping a checked out connection returns it to the idle set.
pub trait ConnectionPool: Clone + Send + Sync + 'static {
    type Connection: SettingsSource + 'static;

    /// Check out a connection, waiting for a free slot if necessary
    ///
    /// Fails with [`PoolError::Exhausted`] if no slot frees up within the
    /// acquire timeout, [`PoolError::Connection`] if a new connection cannot
    /// be established and [`PoolError::Closed`] after [`ConnectionPool::close`].
    fn acquire(&self) -> impl Future<Output = Result<Self::Connection, PoolError>> + Send;

    /// Return a connection to the idle set, same as dropping it
    fn release(conn: Self::Connection) {
        drop(conn);
    }

    /// Close a connection instead of returning it to the idle set
    fn discard(conn: Self::Connection);

    fn status(&self) -> PoolStatus;

    /// Stop handing out connections and close every idle one
    fn close(&self) -> impl Future<Output = ()> + Send;
}

impl ConnectionPool for PgPool {
    type Connection = PoolConnection<Postgres>;

    async fn acquire(&self) -> Result<PoolConnection<Postgres>, PoolError> {
        sqlx::Pool::acquire(self)
            .await
            .map_err(|err| PoolError::from_acquire(err, self.options().get_acquire_timeout()))
    }

    fn discard(mut conn: PoolConnection<Postgres>) {
        debug!("discarding pooled connection");
        conn.close_on_drop();
    }

    fn status(&self) -> PoolStatus {
        let max = usize::try_from(self.options().get_max_connections()).unwrap_or(usize::MAX);
        let size = usize::try_from(self.size()).unwrap_or(usize::MAX);
        let idle = self.num_idle();
        PoolStatus {
            max,
            idle,
            in_use: size.saturating_sub(idle),
        }
    }

    async fn close(&self) {
        sqlx::Pool::close(self).await;
    }
}
