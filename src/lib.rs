//! Operator-facing report of a `CockroachDB` cluster's settings.
//!
//! Every HTTP request checks a connection out of a bounded [`pool::ConnectionPool`],
//! runs `SHOW CLUSTER SETTINGS`, and renders the rows as an HTML table with
//! license values redacted.

pub mod cli;
pub mod config;
pub mod pool;
pub mod queries;
pub mod report;
pub mod server;
pub mod tls;
