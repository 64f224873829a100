use crate::{
    cli::actions::Action,
    config::{ConnectionConfig, ServeConfig},
    tls::{TlsConfig, TlsMode},
};
use anyhow::{Context, Result};
use clap::ArgMatches;
use std::{net::IpAddr, path::Path, time::Duration};

/// Build the TLS configuration, loading the CA from a file or inline PEM
fn extract_tls_config(matches: &ArgMatches) -> Result<TlsConfig> {
    let mode = matches
        .get_one::<String>("tls-mode")
        .map(|m| m.parse::<TlsMode>())
        .transpose()
        .map_err(anyhow::Error::msg)?
        .unwrap_or_default();

    let ca_pem = match (
        matches.get_one::<String>("tls-ca"),
        matches.get_one::<String>("tls-ca-pem"),
    ) {
        (Some(path), _) => Some(TlsConfig::read_ca(Path::new(path))?),
        (None, Some(pem)) => Some(pem.clone()),
        (None, None) => None,
    };

    Ok(TlsConfig { mode, ca_pem })
}

/// Convert `ArgMatches` into typed Action enum with validation
///
/// # Errors
///
/// Returns an error if the DSN is invalid, the CA cannot be loaded or a
/// pool limit is zero
pub fn dispatch(matches: &ArgMatches) -> Result<Action> {
    // Extract DSN
    let dsn = matches
        .get_one::<String>("dsn")
        .context("DSN is required")?;

    // Extract and validate listen address
    let listen = matches
        .get_one::<String>("listen")
        .map(|addr| {
            addr.parse::<IpAddr>()
                .with_context(|| format!("Invalid IP address: {addr}"))
        })
        .transpose()?;

    let port = matches
        .get_one::<u16>("port")
        .copied()
        .unwrap_or(crate::config::DEFAULT_PORT);

    let mut connection = ConnectionConfig::new(dsn.as_str());

    if let Some(max) = matches.get_one::<u32>("max-connections") {
        connection.max_connections = *max;
    }

    if let Some(ms) = matches.get_one::<u64>("idle-timeout-ms") {
        connection.idle_timeout = Duration::from_millis(*ms);
    }

    // 0 waits for a free connection indefinitely
    if let Some(ms) = matches.get_one::<u64>("acquire-timeout-ms") {
        connection.acquire_timeout = (*ms > 0).then_some(Duration::from_millis(*ms));
    }

    connection.tls = extract_tls_config(matches).context("Invalid TLS configuration")?;

    connection
        .validate()
        .context("Invalid connection configuration")?;

    Ok(Action::Serve(ServeConfig {
        connection,
        listen,
        port,
    }))
}
