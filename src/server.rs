//! TCP server for handling lookup connections.
//!
//! Owns a multi-threaded tokio runtime sized by the configured worker count.
//! `start()` binds the listener and spawns the accept loop; `stop()` closes
//! the listener, gives in-flight responses a grace period, then aborts what
//! is left. Both are idempotent and the server can be started again after a
//! stop.

use crate::config::Config;
use crate::connection::{shutdown_requested, Connection, ConnectionConfig};
use crate::dispatch::Dispatcher;
use crate::lookup::{GeoLookup, PhoneLookup};
use crate::metrics::{LookupMetrics, MetricsSnapshot};
use std::io;
use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, debug_span, error, info, warn, Instrument};

/// Maximum number of concurrent connections
const MAX_CONNECTIONS: usize = 10000;

/// Pending connection queue length
const DEFAULT_BACKLOG: u32 = 1024;

const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Pause after an accept error that is likely to repeat
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Errors starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid listen address '{addr}': {source}")]
    Address {
        addr: String,
        #[source]
        source: AddrParseError,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to build runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Everything the server needs besides its capabilities.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub threads: usize,
    pub backlog: u32,
    pub max_connections: usize,
    pub shutdown_grace: Duration,
    pub connection: ConnectionConfig,
    /// How often to log a metrics snapshot. `None` disables periodic stats.
    pub stats_interval: Option<Duration>,
}

impl ServerSettings {
    /// Settings listening on all interfaces with the given port and worker count.
    pub fn new(port: u16, threads: usize) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port,
            threads,
            backlog: DEFAULT_BACKLOG,
            max_connections: MAX_CONNECTIONS,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            connection: ConnectionConfig::default(),
            stats_interval: None,
        }
    }

    fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        let ip: IpAddr = self.host.parse().map_err(|source| ServerError::Address {
            addr: self.host.clone(),
            source,
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl From<&Config> for ServerSettings {
    fn from(config: &Config) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            threads: config.threads,
            backlog: config.backlog,
            max_connections: config.max_connections,
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
            connection: ConnectionConfig {
                max_frame_size: config.max_frame_size,
                lookup_timeout: config.lookup_timeout_ms.map(Duration::from_millis),
            },
            stats_interval: match config.stats_interval_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

/// State that only exists between `start()` and `stop()`.
struct Running {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    acceptor: JoinHandle<()>,
    stats: Option<JoinHandle<()>>,
}

/// Shared by the accept loop and every connection it spawns.
struct AcceptContext {
    dispatcher: Arc<Dispatcher>,
    connection: ConnectionConfig,
    connection_limit: Arc<Semaphore>,
    shutdown_grace: Duration,
}

/// Server instance
pub struct Server {
    settings: ServerSettings,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<LookupMetrics>,
    /// Only taken on drop.
    runtime: Option<Runtime>,
    running: Option<Running>,
}

impl Server {
    /// Create a server around the two lookup capabilities.
    ///
    /// Builds the worker runtime but does not bind anything yet.
    pub fn new(
        settings: ServerSettings,
        geo: Arc<dyn GeoLookup>,
        phone: Arc<dyn PhoneLookup>,
    ) -> Result<Self, ServerError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(settings.threads.max(1))
            .thread_name("lookup-worker")
            .enable_all()
            .build()
            .map_err(ServerError::Runtime)?;

        let metrics = Arc::new(LookupMetrics::new());
        let dispatcher = Arc::new(Dispatcher::new(geo, phone).with_metrics(metrics.clone()));

        Ok(Server {
            settings,
            dispatcher,
            metrics,
            runtime: Some(runtime),
            running: None,
        })
    }

    /// Bind the listener and begin accepting connections.
    ///
    /// Returns the bound address. Calling this while already running logs a
    /// warning and returns the existing address.
    pub fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if let Some(running) = &self.running {
            warn!(address = %running.local_addr, "Server already running");
            return Ok(running.local_addr);
        }

        let addr = self.settings.socket_addr()?;
        let std_listener = bind_listener(addr, self.settings.backlog)
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = std_listener.local_addr()?;

        let listener = {
            let _guard = self.runtime().enter();
            TcpListener::from_std(std_listener)?
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let context = AcceptContext {
            dispatcher: Arc::clone(&self.dispatcher),
            connection: self.settings.connection.clone(),
            connection_limit: Arc::new(Semaphore::new(self.settings.max_connections)),
            shutdown_grace: self.settings.shutdown_grace,
        };
        let acceptor = self
            .runtime()
            .spawn(accept_loop(listener, context, shutdown_rx.clone()));

        // Start the periodic metrics task
        let stats = self.settings.stats_interval.map(|interval| {
            let metrics = Arc::clone(&self.metrics);
            self.runtime()
                .spawn(stats_task(metrics, interval, shutdown_rx))
        });

        info!(
            address = %local_addr,
            threads = self.settings.threads,
            max_connections = self.settings.max_connections,
            max_frame_size = self.settings.connection.max_frame_size,
            "Server listening"
        );

        self.running = Some(Running {
            local_addr,
            shutdown: shutdown_tx,
            acceptor,
            stats,
        });
        Ok(local_addr)
    }

    /// Stop accepting, drain in-flight responses, and abort the rest.
    ///
    /// Blocks until the accept loop has finished. Does nothing when the
    /// server is not running.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        info!(address = %running.local_addr, "Stopping server");
        running.shutdown.send_replace(true);

        if let Err(e) = self.runtime().block_on(running.acceptor) {
            error!(error = %e, "Accept loop failed");
        }
        if let Some(stats) = running.stats {
            let _ = self.runtime().block_on(stats);
        }

        log_snapshot(&self.metrics.snapshot(), true);
        info!("Server shut down");
    }

    /// Block the calling thread until Ctrl-C is received.
    pub fn wait_for_ctrl_c(&self) -> Result<(), ServerError> {
        self.runtime().block_on(tokio::signal::ctrl_c())?;
        info!("Received Ctrl-C");
        Ok(())
    }

    /// Address the listener is bound to, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn metrics(&self) -> &Arc<LookupMetrics> {
        &self.metrics
    }

    fn runtime(&self) -> &Runtime {
        match &self.runtime {
            Some(runtime) => runtime,
            None => unreachable!("runtime is only taken on drop"),
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
        // Lookups stuck on the blocking pool outlive the grace period;
        // dropping the runtime normally would wait for them.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Create a non-blocking listening socket with an explicit backlog.
fn bind_listener(addr: SocketAddr, backlog: u32) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(i32::try_from(backlog).unwrap_or(i32::MAX))?;

    Ok(socket.into())
}

async fn accept_loop(
    listener: TcpListener,
    context: AcceptContext,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        while connections.try_join_next().is_some() {}

        // Wait for a connection slot
        let permit = tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            permit = context.connection_limit.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let accepted = tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                debug!(peer = %peer, "New connection");
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                }

                let connection = Connection::new(
                    stream,
                    Arc::clone(&context.dispatcher),
                    &context.connection,
                    shutdown.clone(),
                );
                connections.spawn(
                    async move {
                        // Errors are logged inside run()
                        let _ = connection.run().await;
                        debug!("Connection closed");
                        drop(permit);
                    }
                    .instrument(debug_span!("connection", peer = %peer)),
                );
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
                let delay = accept_retry_delay(&e);
                if !delay.is_zero() {
                    tokio::select! {
                        _ = shutdown_requested(&mut shutdown) => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    drop(listener);
    debug!(active = connections.len(), "Listener closed, draining connections");

    let drained = tokio::time::timeout(context.shutdown_grace, async {
        while connections.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        warn!(
            remaining = connections.len(),
            grace_ms = context.shutdown_grace.as_millis() as u64,
            "Shutdown grace period elapsed, aborting connections"
        );
        connections.abort_all();
        while connections.join_next().await.is_some() {}
    }
}

/// Pause before accepting again after `error`.
///
/// Errors tied to a single aborted handshake are retried at once. Anything
/// else (typically running out of file descriptors) will fail again
/// immediately, so back off instead of spinning.
fn accept_retry_delay(error: &io::Error) -> Duration {
    match error.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::Interrupted => Duration::ZERO,
        _ => ACCEPT_ERROR_BACKOFF,
    }
}

/// Background task that periodically logs lookup metrics
async fn stats_task(
    metrics: Arc<LookupMetrics>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => log_snapshot(&metrics.snapshot(), false),
            _ = shutdown_requested(&mut shutdown) => break,
        }
    }
}

fn log_snapshot(snapshot: &MetricsSnapshot, last: bool) {
    let ip = &snapshot.ip;
    let phone = &snapshot.phone;
    if last {
        info!(
            ip_ok = ip.ok,
            ip_bad = ip.bad,
            ip_mean_us = ip.mean_latency.as_micros() as u64,
            phone_ok = phone.ok,
            phone_bad = phone.bad,
            phone_mean_us = phone.mean_latency.as_micros() as u64,
            "Final lookup metrics"
        );
    } else {
        info!(
            ip_ok = ip.ok,
            ip_bad = ip.bad,
            ip_mean_us = ip.mean_latency.as_micros() as u64,
            ip_max_us = ip.max_latency.as_micros() as u64,
            phone_ok = phone.ok,
            phone_bad = phone.bad,
            phone_mean_us = phone.mean_latency.as_micros() as u64,
            phone_max_us = phone.max_latency.as_micros() as u64,
            "Lookup metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::lookup::{LookupError, OfflinePhoneLookup, ResolvingGeoLookup};
    use crate::protocol::codec;
    use crate::protocol::{Location, Request};
    use bytes::BytesMut;
    use std::net::TcpStream;
    use std::time::Instant;

    struct StalledPhone(Duration);

    impl PhoneLookup for StalledPhone {
        fn lookup(&self, _number: &str) -> Result<Location, LookupError> {
            std::thread::sleep(self.0);
            Ok(Location::default())
        }
    }

    fn local_settings() -> ServerSettings {
        ServerSettings {
            host: "127.0.0.1".to_string(),
            shutdown_grace: Duration::from_millis(200),
            ..ServerSettings::new(0, 2)
        }
    }

    fn server(settings: ServerSettings) -> Server {
        Server::new(
            settings,
            Arc::new(ResolvingGeoLookup::default()),
            Arc::new(OfflinePhoneLookup::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_settings_from_config() {
        let config = Config::merge(Default::default(), Default::default()).unwrap();
        let settings = ServerSettings::from(&config);
        assert_eq!(settings.port, 8001);
        assert_eq!(settings.backlog, 1024);
        assert_eq!(settings.shutdown_grace, Duration::from_secs(10));
        assert_eq!(settings.connection.max_frame_size, 32 * 1024);
        assert_eq!(settings.connection.lookup_timeout, None);
        assert_eq!(settings.stats_interval, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_start_and_stop() {
        let mut server = server(local_settings());
        assert!(!server.is_running());

        let addr = server.start().unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.local_addr(), Some(addr));
        TcpStream::connect(addr).unwrap();

        server.stop();
        assert!(!server.is_running());
        assert_eq!(server.local_addr(), None);

        // Second stop is a no-op
        server.stop();
    }

    #[test]
    fn test_double_start_is_noop() {
        let mut server = server(local_settings());
        let first = server.start().unwrap();
        let second = server.start().unwrap();
        assert_eq!(first, second);
        server.stop();
    }

    #[test]
    fn test_restart_after_stop() {
        let mut server = server(local_settings());
        server.start().unwrap();
        server.stop();

        let addr = server.start().unwrap();
        TcpStream::connect(addr).unwrap();
        server.stop();
    }

    #[test]
    fn test_bind_error_when_port_in_use() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let mut server = server(ServerSettings {
            port,
            ..local_settings()
        });
        match server.start() {
            Err(ServerError::Bind { addr, .. }) => assert_eq!(addr.port(), port),
            other => panic!("unexpected: {:?}", other.map(|a| a.to_string())),
        }
        assert!(!server.is_running());
    }

    #[test]
    fn test_invalid_host() {
        let mut server = server(ServerSettings {
            host: "not-an-address".to_string(),
            ..local_settings()
        });
        assert!(matches!(server.start(), Err(ServerError::Address { .. })));
    }

    #[test]
    fn test_stop_with_open_connection() {
        let mut server = server(local_settings());
        let addr = server.start().unwrap();
        let _idle = TcpStream::connect(addr).unwrap();
        // Give the accept loop a moment to hand the socket to a task
        std::thread::sleep(Duration::from_millis(50));
        server.stop();
    }

    #[test]
    fn test_drop_does_not_wait_for_stalled_lookup() {
        let mut server = Server::new(
            ServerSettings {
                shutdown_grace: Duration::from_millis(300),
                ..local_settings()
            },
            Arc::new(ResolvingGeoLookup::default()),
            Arc::new(StalledPhone(Duration::from_secs(8))),
        )
        .unwrap();
        let addr = server.start().unwrap();

        let mut client = Client::connect(addr).unwrap();
        let mut frame = BytesMut::new();
        codec::encode_request(&Request::phone(1, "+16504556864"), &mut frame);
        client.send_raw(&frame).unwrap();
        // Let the lookup reach the blocking pool
        std::thread::sleep(Duration::from_millis(100));

        let started = Instant::now();
        server.stop();
        drop(server);
        let elapsed = started.elapsed();
        assert!(elapsed < Duration::from_secs(3), "shutdown took {elapsed:?}");
    }

    #[test]
    fn test_accept_retry_delay() {
        let aborted = io::Error::from(io::ErrorKind::ConnectionAborted);
        assert_eq!(accept_retry_delay(&aborted), Duration::ZERO);

        let exhausted = io::Error::new(io::ErrorKind::Other, "too many open files");
        assert_eq!(accept_retry_delay(&exhausted), ACCEPT_ERROR_BACKOFF);
    }
}
