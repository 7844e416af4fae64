//! TCP dispatcher: one listening socket, one task per accepted connection.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{error, info, warn};

use crate::config::ConnectionConfig;
use crate::connection::HttpConnection;
use crate::handler::Handler;

const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub struct ServerBuilder {
    address: Option<io::Result<Vec<SocketAddr>>>,
    config: ConnectionConfig,
    grace_period: Duration,
}

impl ServerBuilder {
    fn new() -> Self {
        Self { address: None, config: ConnectionConfig::default(), grace_period: DEFAULT_GRACE_PERIOD }
    }

    pub fn address<A: ToSocketAddrs>(mut self, address: A) -> Self {
        self.address = Some(address.to_socket_addrs().map(|addrs| addrs.collect()));
        self
    }

    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// How long [`Server::run`] waits for in-flight connections after a
    /// shutdown request before aborting them.
    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn build(self) -> Result<Server, ServerBuildError> {
        let address = match self.address {
            Some(Ok(address)) if !address.is_empty() => address,
            Some(Ok(_)) | None => return Err(ServerBuildError::MissingAddress),
            Some(Err(source)) => return Err(ServerBuildError::AddressResolve { source }),
        };

        let (shutdown, _) = broadcast::channel(1);
        Ok(Server { address, config: self.config, grace_period: self.grace_period, shutdown })
    }
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("address must be set")]
    MissingAddress,

    #[error("address did not resolve: {source}")]
    AddressResolve { source: io::Error },
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("bind server error: {source}")]
    Bind { source: io::Error },
}

/// Cloneable handle for requesting a graceful stop of a running [`Server`].
#[derive(Debug, Clone)]
pub struct ServerHandle {
    shutdown: broadcast::Sender<()>,
}

impl ServerHandle {
    /// Signals the server to stop accepting and drain in-flight connections.
    /// Safe to call more than once; later calls have no further effect.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }
}

/// Accepts connections and serves each one with a shared [`Handler`].
///
/// Connections run on their own tasks, so a slow exchange never blocks the
/// accept loop. On shutdown the listener closes first, then in-flight
/// connections get the configured grace period before being aborted.
#[derive(Debug)]
pub struct Server {
    address: Vec<SocketAddr>,
    config: ConnectionConfig,
    grace_period: Duration,
    shutdown: broadcast::Sender<()>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// A handle that can stop this server from another task.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle { shutdown: self.shutdown.clone() }
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn run<H>(self, handler: Arc<H>) -> Result<(), ServerError>
    where
        H: Handler + 'static,
    {
        info!("start listening at {:?}", self.address);
        let listener = match TcpListener::bind(self.address.as_slice()).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(cause = %e, "bind server error");
                return Err(ServerError::Bind { source: e });
            }
        };

        self.serve(listener, handler).await
    }

    /// Serves an already-bound listener until shutdown.
    pub async fn serve<H>(self, listener: TcpListener, handler: Arc<H>) -> Result<(), ServerError>
    where
        H: Handler + 'static,
    {
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("shutdown requested, no longer accepting");
                    break;
                }

                // reap finished connection tasks as they complete
                Some(_) = connections.join_next(), if !connections.is_empty() => {}

                accepted = listener.accept() => {
                    let (tcp_stream, remote_addr) = match accepted {
                        Ok(stream_and_addr) => stream_and_addr,
                        Err(e) => {
                            warn!(cause = %e, "failed to accept");
                            continue;
                        }
                    };

                    let handler = handler.clone();
                    let config = self.config;
                    connections.spawn(async move {
                        let (reader, writer) = tcp_stream.into_split();
                        let connection = HttpConnection::with_config(reader, writer, config);
                        match connection.process(handler).await {
                            Ok(()) => info!(%remote_addr, "connection finished"),
                            Err(e) => error!(%remote_addr, "connection failed: {e}"),
                        }
                    });
                }
            }
        }

        drop(listener);

        let deadline = Instant::now() + self.grace_period;
        while !connections.is_empty() {
            match timeout_at(deadline, connections.join_next()).await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_elapsed) => {
                    warn!(remaining = connections.len(), "grace period elapsed, aborting connections");
                    connections.shutdown().await;
                    break;
                }
            }
        }

        info!("server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use crate::handler::make_handler;

    fn echo_status_handler() -> impl Handler + 'static {
        make_handler(|_request, mut response| async move {
            response.write(Bytes::from_static(b"served")).await?;
            response.end().await?;
            Ok(())
        })
    }

    async fn request_over_tcp(addr: SocketAddr) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\nHost: a\r\nConnection: close\r\n\r\n").await.unwrap();
        let mut wire = Vec::new();
        stream.read_to_end(&mut wire).await.unwrap();
        String::from_utf8(wire).unwrap()
    }

    #[tokio::test]
    async fn serves_connections_until_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = Server::builder().address("127.0.0.1:0").build().unwrap();
        let handle = server.handle();
        let task = tokio::spawn(server.serve(listener, Arc::new(echo_status_handler())));

        let first = request_over_tcp(addr).await;
        let second = request_over_tcp(addr).await;
        assert!(first.starts_with("HTTP/1.1 200 OK\r\n") && first.contains("served"));
        assert!(second.starts_with("HTTP/1.1 200 OK\r\n"));

        handle.shutdown();
        task.await.unwrap().unwrap();

        // the listener is gone after shutdown
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn shutdown_deadline_aborts_stuck_connections() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // handler reports that it started, then never finishes
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let started_tx = std::sync::Mutex::new(Some(started_tx));
        let handler = make_handler(move |_request, _response| {
            let started = started_tx.lock().unwrap().take();
            async move {
                if let Some(started) = started {
                    let _ = started.send(());
                }
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        });

        let server =
            Server::builder().address("127.0.0.1:0").grace_period(Duration::from_millis(50)).build().unwrap();
        let handle = server.handle();
        let task = tokio::spawn(server.serve(listener, Arc::new(handler)));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET /slow HTTP/1.1\r\nHost: a\r\n\r\n").await.unwrap();
        started_rx.await.unwrap();

        // the stuck connection must not hold the server past the deadline
        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap().unwrap();

        // the aborted exchange never produced a response
        let mut wire = Vec::new();
        let _ = stream.read_to_end(&mut wire).await;
        assert!(wire.is_empty());
    }

    #[tokio::test]
    async fn shutdown_with_no_connections_returns_promptly() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Server::builder().address("127.0.0.1:0").build().unwrap();
        let handle = server.handle();

        let task = tokio::spawn(server.serve(listener, Arc::new(echo_status_handler())));
        handle.shutdown();
        task.await.unwrap().unwrap();
    }

    #[test]
    fn build_requires_an_address() {
        assert!(matches!(Server::builder().build(), Err(ServerBuildError::MissingAddress)));
    }
}
