//! HTTP surface
//!
//! Every path answers `GET` with the cluster settings report. The acquire and
//! fetch stages run in their own task, so a client hanging up mid-request
//! cannot strand a checked out connection.

use crate::{
    config::ServeConfig,
    pool::{ConnectionPool, PoolError, PoolOptions},
    queries::{ClusterSetting, QueryError, SettingsSource, cockroach::ClusterConnector},
    report::{RenderError, ReportRenderer},
    tls::ensure_crypto_provider,
};
use anyhow::Context;
use axum::{
    Router,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header, uri::PathAndQuery},
    response::{Html, IntoResponse, Response},
};
use std::{
    error::Error,
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Arc,
};
use tokio::{net::TcpListener, signal, task};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Shared by every request handler
pub struct AppState<P: ConnectionPool> {
    pool: P,
    renderer: Arc<ReportRenderer>,
    descriptor: Arc<str>,
    default_origin: Arc<str>,
}

impl<P: ConnectionPool> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            renderer: Arc::clone(&self.renderer),
            descriptor: Arc::clone(&self.descriptor),
            default_origin: Arc::clone(&self.default_origin),
        }
    }
}

impl<P: ConnectionPool> AppState<P> {
    #[must_use]
    pub fn new(
        pool: P,
        renderer: ReportRenderer,
        descriptor: impl Into<Arc<str>>,
        default_origin: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            pool,
            renderer: Arc::new(renderer),
            descriptor: descriptor.into(),
            default_origin: default_origin.into(),
        }
    }
}

/// Where a request failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Acquiring,
    Fetching,
    Rendering,
}

impl Stage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Acquiring => "acquiring",
            Self::Fetching => "fetching",
            Self::Rendering => "rendering",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("settings task aborted: {0}")]
    Aborted(String),
}

impl ReportError {
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Pool(_) => Stage::Acquiring,
            // the aborted task covers acquiring and fetching
            Self::Query(_) | Self::Aborted(_) => Stage::Fetching,
            Self::Render(_) => Stage::Rendering,
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Pool(PoolError::Exhausted(_) | PoolError::Closed) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Pool(PoolError::Connection(_)) | Self::Query(_) => StatusCode::BAD_GATEWAY,
            Self::Render(_) | Self::Aborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        let status = self.status();
        // never echo error details, they may name hosts or users
        let body = status.canonical_reason().unwrap_or("Error");
        (status, body).into_response()
    }
}

/// Router serving the report on every path
pub fn router<P: ConnectionPool>(state: AppState<P>) -> Router {
    Router::new()
        .fallback(report_handler::<P>)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn report_handler<P: ConnectionPool>(
    State(state): State<AppState<P>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let url = request_url(&headers, &uri, &state.default_origin);

    if method != Method::GET {
        debug!(%method, %url, "rejected request method");
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "GET")],
            "Method Not Allowed",
        )
            .into_response();
    }

    match build_report(&state).await {
        Ok(page) => Html(page).into_response(),
        Err(err) => {
            error!(
                %url,
                stage = %err.stage(),
                status = err.status().as_u16(),
                error = %error_chain(&err),
                "failed to serve cluster settings"
            );
            err.into_response()
        }
    }
}

async fn build_report<P: ConnectionPool>(state: &AppState<P>) -> Result<String, ReportError> {
    // Detached so that the connection is released even if this future is dropped
    let pool = state.pool.clone();
    let settings = task::spawn(fetch_settings(pool))
        .await
        .map_err(|err| ReportError::Aborted(err.to_string()))??;

    Ok(state.renderer.render(&state.descriptor, &settings)?)
}

/// Acquire a connection, fetch the settings and hand the connection back
///
/// A connection whose error leaves it unusable is discarded instead.
async fn fetch_settings<P: ConnectionPool>(pool: P) -> Result<Vec<ClusterSetting>, ReportError> {
    let mut conn = pool.acquire().await?;

    match SettingsSource::fetch_settings(&mut conn).await {
        Ok(settings) => {
            P::release(conn);
            Ok(settings)
        }
        Err(err) => {
            if err.is_connection_lost() {
                P::discard(conn);
            } else {
                P::release(conn);
            }
            Err(err.into())
        }
    }
}

/// `outer: inner: root` rendering of an error and its sources
fn error_chain(err: &dyn Error) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

/// Absolute URL of the request, for logging only
///
/// Uses the first `X-Forwarded-Host` entry when a proxy set one; the edge in
/// front of such a proxy terminates TLS, so the scheme defaults to `https`.
fn request_url(headers: &HeaderMap, uri: &Uri, default_origin: &str) -> String {
    let path = uri.path_and_query().map_or("/", PathAndQuery::as_str);

    let forwarded = headers
        .get("x-forwarded-host")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|host| !host.is_empty());

    match forwarded {
        Some(host) => {
            let scheme = headers
                .get("x-forwarded-proto")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map_or("https", str::trim);
            format!("{scheme}://{host}{path}")
        }
        None => format!("{default_origin}{path}"),
    }
}

/// Start the server, returns after a graceful shutdown
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the socket cannot be bound
pub async fn start(config: ServeConfig) -> anyhow::Result<()> {
    ensure_crypto_provider();

    let connector =
        ClusterConnector::new(&config.connection).context("invalid connection configuration")?;
    let tls_mode = connector.tls_mode();
    if !tls_mode.verifies() {
        warn!(
            %tls_mode,
            "server certificate is NOT verified, use this mode for testing only"
        );
    }

    let options = PoolOptions::from(&config.connection);
    let pool = connector.connect_lazy(&options);
    let renderer = ReportRenderer::new().context("failed to compile report template")?;
    let state = AppState::new(
        pool.clone(),
        renderer,
        config.connection.descriptor(),
        config.default_origin(),
    );

    let (listener, bind_addr) = bind(config.listen, config.port).await?;

    info!(
        address = %bind_addr,
        max_connections = options.max_connections,
        idle_timeout_ms = options.idle_timeout.as_millis(),
        %tls_mode,
        "listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    pool.close().await;
    info!("connection pool closed, bye");

    Ok(())
}

async fn bind(listen: Option<IpAddr>, port: u16) -> anyhow::Result<(TcpListener, SocketAddr)> {
    match listen {
        Some(addr) => {
            // Explicit address specified - bind to it
            let socket_addr = SocketAddr::new(addr, port);
            let listener = TcpListener::bind(socket_addr)
                .await
                .with_context(|| format!("failed to bind {socket_addr}"))?;
            Ok((listener, socket_addr))
        }
        None => {
            // Auto mode: try IPv6 first, fallback to IPv4
            let v6 = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port);
            if let Ok(listener) = TcpListener::bind(v6).await {
                return Ok((listener, v6));
            }

            let v4 = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
            let listener = TcpListener::bind(v4)
                .await
                .with_context(|| format!("failed to bind {v4}"))?;
            Ok((listener, v4))
        }
    }
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => info!("received SIGINT, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
