pub mod cockroach;

use futures::future::BoxFuture;

/// One row of `SHOW CLUSTER SETTINGS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSetting {
    pub name: String,
    pub value: String,
    pub description: String,
}

impl ClusterSetting {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            description: description.into(),
        }
    }
}

/// Failure while retrieving the settings over an acquired connection
#[derive(Debug, thiserror::Error)]
#[error("failed to query cluster settings")]
pub struct QueryError(#[from] sqlx::Error);

impl QueryError {
    /// Whether the connection is unusable after this error and must not be pooled
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self.0,
            sqlx::Error::Io(_)
                | sqlx::Error::Tls(_)
                | sqlx::Error::Protocol(_)
                | sqlx::Error::WorkerCrashed
        )
    }
}

/// A connection that can list the cluster's settings
///
/// Implementations issue the query once, do not retry, and leave releasing
/// the connection to the caller. Rows come back in the order the cluster
/// returned them.
pub trait SettingsSource: Send {
    fn fetch_settings(&mut self) -> BoxFuture<'_, Result<Vec<ClusterSetting>, QueryError>>;
}
