#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use cluster_settings::{
    pool::{ConnectionPool, PoolError, PoolOptions, PoolStatus},
    queries::{ClusterSetting, QueryError, SettingsSource},
    report::ReportRenderer,
    server::{AppState, router},
};
use futures::future::BoxFuture;
use std::{
    io,
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::{OwnedSemaphorePermit, Semaphore},
    time::{self, Duration, Instant, sleep},
};

pub const DESCRIPTOR: &str = "crdb.example.com:26257/defaultdb";
pub const DEFAULT_ORIGIN: &str = "http://localhost:3002";

/// What the next fetch on any fake connection does
#[derive(Debug, Clone)]
pub enum Script {
    Settings(Vec<ClusterSetting>),
    /// The query fails but the connection stays usable
    QueryFails,
    /// The connection breaks mid-query
    ConnectionLost,
    Panic,
}

#[derive(Debug, Default)]
pub struct FakeStats {
    pub connects: AtomicUsize,
    pub acquires: AtomicUsize,
    pub releases: AtomicUsize,
    pub closes: AtomicUsize,
    pub fetches: AtomicUsize,
    fetching: AtomicUsize,
    pub peak_fetching: AtomicUsize,
}

impl FakeStats {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn peak_fetching(&self) -> usize {
        self.peak_fetching.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct Shared {
    script: Mutex<Script>,
    stats: FakeStats,
    connect_fails: AtomicBool,
    fetch_delay: Duration,
    options: PoolOptions,
    slots: Arc<Semaphore>,
    idle: Mutex<Vec<usize>>,
}

/// In-memory stand-in for a pool of `CockroachDB` connections
///
/// Records every acquire, release and close so tests can check that each
/// request hands its connection back exactly once.
#[derive(Debug, Clone)]
pub struct FakePool {
    shared: Arc<Shared>,
}

impl FakePool {
    pub fn new(script: Script, options: PoolOptions) -> Self {
        Self::build(script, options, Duration::ZERO, false)
    }

    pub fn with_delay(script: Script, options: PoolOptions, delay: Duration) -> Self {
        Self::build(script, options, delay, false)
    }

    pub fn failing(options: PoolOptions) -> Self {
        Self::build(Script::Settings(sample_settings()), options, Duration::ZERO, true)
    }

    fn build(script: Script, options: PoolOptions, fetch_delay: Duration, fails: bool) -> Self {
        let max = usize::try_from(options.max_connections).unwrap();
        Self {
            shared: Arc::new(Shared {
                script: Mutex::new(script),
                stats: FakeStats::default(),
                connect_fails: AtomicBool::new(fails),
                fetch_delay,
                options,
                slots: Arc::new(Semaphore::new(max)),
                idle: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn stats(&self) -> &FakeStats {
        &self.shared.stats
    }

    pub fn set_script(&self, script: Script) {
        *self.shared.script.lock().unwrap() = script;
    }
}

/// Checked out fake connection, handed back to the idle set on drop
#[derive(Debug)]
pub struct FakeConnection {
    pub id: usize,
    shared: Arc<Shared>,
    discarded: bool,
    // freed after `drop` has parked the connection
    _permit: OwnedSemaphorePermit,
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        if self.discarded || self.shared.slots.is_closed() {
            self.shared.stats.closes.fetch_add(1, Ordering::SeqCst);
            return;
        }
        self.shared.stats.releases.fetch_add(1, Ordering::SeqCst);
        self.shared.idle.lock().unwrap().push(self.id);
    }
}

impl ConnectionPool for FakePool {
    type Connection = FakeConnection;

    async fn acquire(&self) -> Result<FakeConnection, PoolError> {
        let slot = Arc::clone(&self.shared.slots).acquire_owned();
        let permit = match self.shared.options.acquire_timeout {
            Some(limit) => time::timeout(limit, slot)
                .await
                .map_err(|_| PoolError::Exhausted(limit))?,
            None => slot.await,
        }
        .map_err(|_| PoolError::Closed)?;

        if self.shared.connect_fails.load(Ordering::SeqCst) {
            return Err(PoolError::Connection(sqlx::Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused by crdb.example.com",
            ))));
        }

        let reused = self.shared.idle.lock().unwrap().pop();
        let id = reused
            .unwrap_or_else(|| self.shared.stats.connects.fetch_add(1, Ordering::SeqCst) + 1);
        self.shared.stats.acquires.fetch_add(1, Ordering::SeqCst);

        Ok(FakeConnection {
            id,
            shared: Arc::clone(&self.shared),
            discarded: false,
            _permit: permit,
        })
    }

    fn discard(mut conn: FakeConnection) {
        conn.discarded = true;
    }

    fn status(&self) -> PoolStatus {
        let max = usize::try_from(self.shared.options.max_connections).unwrap();
        PoolStatus {
            max,
            idle: self.shared.idle.lock().unwrap().len(),
            in_use: max.saturating_sub(self.shared.slots.available_permits()),
        }
    }

    async fn close(&self) {
        self.shared.slots.close();
        let drained = self.shared.idle.lock().unwrap().drain(..).count();
        self.shared.stats.closes.fetch_add(drained, Ordering::SeqCst);
    }
}

impl SettingsSource for FakeConnection {
    fn fetch_settings(&mut self) -> BoxFuture<'_, Result<Vec<ClusterSetting>, QueryError>> {
        Box::pin(async move {
            let stats = &self.shared.stats;
            stats.fetches.fetch_add(1, Ordering::SeqCst);
            let now = stats.fetching.fetch_add(1, Ordering::SeqCst) + 1;
            stats.peak_fetching.fetch_max(now, Ordering::SeqCst);

            sleep(self.shared.fetch_delay).await;
            stats.fetching.fetch_sub(1, Ordering::SeqCst);

            let script = self.shared.script.lock().unwrap().clone();
            match script {
                Script::Settings(settings) => Ok(settings),
                Script::QueryFails => Err(QueryError::from(sqlx::Error::ColumnNotFound(
                    "variable".to_string(),
                ))),
                Script::ConnectionLost => Err(QueryError::from(sqlx::Error::Io(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )))),
                Script::Panic => panic!("scripted fetch panic"),
            }
        })
    }
}

pub fn sample_settings() -> Vec<ClusterSetting> {
    vec![
        ClusterSetting::new("sql.defaults.foo", "on", "d1"),
        ClusterSetting::new("enterprise.license", "SECRET-123", "d2"),
    ]
}

pub fn pool_options(max_connections: u32, acquire_timeout: Option<Duration>) -> PoolOptions {
    PoolOptions {
        max_connections,
        idle_timeout: Duration::from_secs(60),
        acquire_timeout,
    }
}

/// Serve the report from `pool` on a random local port
pub async fn spawn_server<P: ConnectionPool>(pool: P) -> SocketAddr {
    let state = AppState::new(pool, ReportRenderer::new().unwrap(), DESCRIPTOR, DEFAULT_ORIGIN);

    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    addr
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

fn raw_request(addr: SocketAddr, method: &str, path: &str, headers: &[(&str, &str)]) -> String {
    let extra: String = headers
        .iter()
        .map(|(name, value)| format!("{name}: {value}\r\n"))
        .collect();
    format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\n{extra}Content-Length: 0\r\nConnection: close\r\n\r\n"
    )
}

pub async fn request(
    addr: SocketAddr,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
) -> HttpResponse {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(raw_request(addr, method, path, headers).as_bytes())
        .await
        .unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8(response).unwrap();

    let (head, body) = response.split_once("\r\n\r\n").unwrap();
    let mut lines = head.lines();
    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .unwrap();
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect();

    HttpResponse {
        status,
        headers,
        body: body.to_string(),
    }
}

pub async fn get(addr: SocketAddr, path: &str) -> HttpResponse {
    request(addr, "GET", path, &[]).await
}

/// Send a request and hang up before the response arrives
pub async fn get_and_disconnect(addr: SocketAddr, path: &str, after: Duration) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(raw_request(addr, "GET", path, &[]).as_bytes())
        .await
        .unwrap();
    sleep(after).await;
    drop(stream);
}

/// Poll `check` until it holds or `timeout` expires
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
}
