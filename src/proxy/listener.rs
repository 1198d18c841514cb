//! TCP listener and per-connection orchestration.
//!
//! This module accepts connections, reads the handshake frame, resolves the
//! virtual host through the directory service, connects to the backend,
//! prepends the PROXY v1 header, replays the raw handshake bytes, and then
//! relays bidirectionally until either side closes.
//!
//! Each accepted connection runs on its own task; sessions share nothing
//! but the resolver. A failure anywhere before the relay closes the session
//! with nothing written back to the client.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, Instrument};

use super::handshake::{read_handshake_frame, HandshakeError};
use super::proxy_protocol::ProxyProtocolV1;
use super::resolver::{DirectoryResolver, ResolveError};

/// Default idle timeout: bounds each relay read so a dead peer is noticed,
/// but an idle-yet-open connection is kept alive.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Default backend connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default bound on how long a client may take to send its handshake frame.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Relay copy buffer size per direction.
const RELAY_BUFFER_SIZE: usize = 1024;

/// Configuration for a listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Idle timeout applied to each relay read.
    pub idle_timeout: Duration,
    /// Timeout for the outbound backend connect.
    pub connect_timeout: Duration,
    /// Timeout for reading the client's handshake frame.
    pub handshake_timeout: Duration,
}

impl ListenerConfig {
    /// Create a listener configuration with default timeouts.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

/// Errors that abort a single session.
///
/// None of these are surfaced to the client over the wire; the client simply
/// sees its connection drop. None are fatal to the listener.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Handshake frame could not be read or parsed.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// Client did not complete the handshake frame in time.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// Virtual host resolution failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Outbound connection to the resolved backend failed.
    #[error("backend {addr} unreachable: {source}")]
    BackendUnreachable {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// I/O failure writing the header or handshake replay to the backend.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// TCP listener routing Minecraft connections to directory-resolved backends.
pub struct Listener {
    config: ListenerConfig,
    listener: TcpListener,
    resolver: Arc<DirectoryResolver>,
}

impl Listener {
    /// Bind a new listener.
    pub async fn bind(config: ListenerConfig, resolver: Arc<DirectoryResolver>) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        info!(bind_addr = %local_addr, "Listener bound");

        Ok(Self {
            config,
            listener,
            resolver,
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the listener, accepting and handling connections.
    ///
    /// Each connection gets its own task; there is no cap on concurrent
    /// sessions.
    pub async fn run(self: Arc<Self>) -> io::Result<()> {
        let local_addr = self.listener.local_addr()?;
        info!(bind_addr = %local_addr, "Listener started");

        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let listener = Arc::clone(&self);

                    tokio::spawn(
                        async move {
                            if let Err(e) = listener.handle_connection(stream, peer_addr).await {
                                debug!(
                                    peer_addr = %peer_addr,
                                    error = %e,
                                    "Session closed with error"
                                );
                            }
                        }
                        .instrument(tracing::info_span!("connection", peer = %peer_addr)),
                    );
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                    // Brief sleep to avoid a tight loop on persistent errors
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Handle a single connection: handshake, resolve, connect, replay, relay.
    async fn handle_connection(
        &self,
        mut client: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), SessionError> {
        debug!(peer_addr = %peer_addr, "Handling connection");

        let (frame, raw_frame) =
            match timeout(self.config.handshake_timeout, read_handshake_frame(&mut client)).await {
                Ok(result) => result?,
                Err(_) => return Err(SessionError::HandshakeTimeout),
            };

        debug!(
            server_address = %frame.server_address,
            port = frame.port,
            protocol_version = frame.protocol_version,
            "Handshake frame read"
        );

        let backend_addr = self
            .resolver
            .resolve(&frame.server_address, frame.port)
            .await?;

        debug!(backend = %backend_addr, "Virtual host resolved");

        let mut backend = match timeout(
            self.config.connect_timeout,
            TcpStream::connect((backend_addr.host.as_str(), backend_addr.port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(SessionError::BackendUnreachable {
                    addr: backend_addr.to_string(),
                    source: e,
                })
            }
            Err(_) => {
                return Err(SessionError::BackendUnreachable {
                    addr: backend_addr.to_string(),
                    source: io::Error::new(io::ErrorKind::TimedOut, "connect timeout"),
                })
            }
        };

        // The backend must see the real client address, then the handshake
        // exactly as the client sent it.
        let header = ProxyProtocolV1::new(peer_addr, &backend_addr);
        backend.write_all(&header.encode()?).await?;
        backend.write_all(&raw_frame).await?;

        let (bytes_to_backend, bytes_from_backend) =
            relay_bidirectional(&mut client, &mut backend, self.config.idle_timeout).await;

        debug!(
            bytes_to_backend = bytes_to_backend,
            bytes_from_backend = bytes_from_backend,
            "Connection closed"
        );

        Ok(())
    }
}

/// Relay bytes between client and backend until either side closes.
///
/// Runs one copy loop per direction and races them: the first direction to
/// terminate (zero-length read, reset, or write failure) tears down both,
/// with no half-close support. An idle-timeout expiry on a read is not a
/// termination condition; the read is simply retried.
///
/// Returns (bytes client->backend, bytes backend->client).
async fn relay_bidirectional(
    client: &mut TcpStream,
    backend: &mut TcpStream,
    idle_timeout: Duration,
) -> (u64, u64) {
    let (mut client_read, mut client_write) = client.split();
    let (mut backend_read, mut backend_write) = backend.split();

    let to_backend = AtomicU64::new(0);
    let to_client = AtomicU64::new(0);

    tokio::select! {
        _ = copy_until_closed(&mut client_read, &mut backend_write, idle_timeout, &to_backend) => {
            debug!("Client side terminated relay");
        }
        _ = copy_until_closed(&mut backend_read, &mut client_write, idle_timeout, &to_client) => {
            debug!("Backend side terminated relay");
        }
    }

    (
        to_backend.load(Ordering::Relaxed),
        to_client.load(Ordering::Relaxed),
    )
}

/// Copy one direction until the peer closes, resets, or a write fails.
///
/// Abrupt resets are normal termination here, not errors to escalate.
async fn copy_until_closed<R, W>(
    reader: &mut R,
    writer: &mut W,
    idle_timeout: Duration,
    copied: &AtomicU64,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; RELAY_BUFFER_SIZE];

    loop {
        let n = match timeout(idle_timeout, reader.read(&mut buf)).await {
            // Idle: nothing readable within the interval, poll again.
            Err(_) => continue,
            Ok(Ok(0)) => return,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                debug!(error = %e, "Relay read ended");
                return;
            }
        };

        if let Err(e) = writer.write_all(&buf[..n]).await {
            debug!(error = %e, "Relay write ended");
            return;
        }

        copied.fetch_add(n as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_config_defaults() {
        let config = ListenerConfig::new("0.0.0.0:25565".parse().unwrap());
        assert_eq!(config.idle_timeout, DEFAULT_IDLE_TIMEOUT);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.handshake_timeout, DEFAULT_HANDSHAKE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_copy_loop_survives_idle_timeout_and_stops_on_close() {
        // Relay reads from `relay_in` (fed by `test_in`) and writes into
        // `relay_out` (drained via `test_out`).
        let (mut relay_in, mut test_in) = tokio::io::duplex(64);
        let (mut relay_out, mut test_out) = tokio::io::duplex(64);

        let copied = AtomicU64::new(0);
        let relay = copy_until_closed(
            &mut relay_in,
            &mut relay_out,
            Duration::from_millis(50),
            &copied,
        );

        let drive = async {
            test_in.write_all(b"hello").await.unwrap();
            // Stay idle for longer than the timeout: the loop must retry,
            // not terminate.
            tokio::time::sleep(Duration::from_millis(120)).await;
            test_in.write_all(b" world").await.unwrap();

            let mut out = [0u8; 11];
            test_out.read_exact(&mut out).await.unwrap();

            // Closing the source ends the loop.
            drop(test_in);
            out
        };

        let (_, out) = tokio::join!(relay, drive);
        assert_eq!(&out, b"hello world");
        assert_eq!(copied.load(Ordering::Relaxed), 11);
    }
}
