//! Connection management and the request/reply exchange.

use crate::database::Database;
use crate::error::ClientError;
use docdb_protocol::{encode_message, Message, Reply, HEADER_SIZE, MAX_MESSAGE_SIZE};
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Anything the connection can speak over: a full-duplex byte stream with
/// read-exact and write-all semantics. Blanket-implemented, so TCP
/// streams and in-memory test transports qualify alike.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server hostname or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Dial timeout.
    pub connect_timeout: Duration,
    /// Disable Nagle's algorithm on the socket.
    pub tcp_nodelay: bool,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Duration::from_secs(10),
            tcp_nodelay: true,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }
}

const STATE_LIVE: u8 = 0;
const STATE_POISONED: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// A connection to a docdb server. Cheap to clone; all clones share the
/// underlying stream and serialize their exchanges through it.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    /// The transport, held across each write[+read] exchange so replies
    /// pair with the request that is actually on the wire.
    stream: Mutex<Option<Box<dyn Transport>>>,
    /// Monotonic per-connection request ids.
    next_request_id: AtomicI32,
    state: AtomicU8,
    /// Dial configuration; absent for caller-supplied streams.
    config: Option<ConnectionConfig>,
}

impl Connection {
    /// Dials the configured server.
    pub async fn connect(config: ConnectionConfig) -> Result<Connection, ClientError> {
        let addr = format!("{}:{}", config.host, config.port);
        tracing::debug!("connecting to {addr}");

        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ClientError::ConnectTimeout)??;
        if config.tcp_nodelay {
            stream.set_nodelay(true).ok();
        }

        tracing::debug!("connected to {addr}");
        Ok(Connection::build(Box::new(stream), Some(config)))
    }

    /// Wraps an established transport. Used for non-TCP streams and by
    /// tests driving a mock server.
    pub fn over(stream: impl Transport + 'static) -> Connection {
        Connection::build(Box::new(stream), None)
    }

    fn build(stream: Box<dyn Transport>, config: Option<ConnectionConfig>) -> Connection {
        Connection {
            inner: Arc::new(Inner {
                stream: Mutex::new(Some(stream)),
                next_request_id: AtomicI32::new(1),
                state: AtomicU8::new(STATE_LIVE),
                config,
            }),
        }
    }

    /// Dials a fresh connection to the same address. The original
    /// connection is left as-is; poisoned connections stay poisoned.
    pub async fn reconnect(&self) -> Result<Connection, ClientError> {
        match &self.inner.config {
            Some(config) => Connection::connect(config.clone()).await,
            None => Err(ClientError::NoDialAddress),
        }
    }

    /// Opens a handle onto a named database.
    pub fn database(&self, name: impl Into<String>) -> Database {
        Database::new(self.clone(), name.into())
    }

    pub fn is_live(&self) -> bool {
        self.inner.state.load(Ordering::SeqCst) == STATE_LIVE
    }

    /// Shuts the transport down and moves the connection to its terminal
    /// state. In-flight operations fail with the transport's error.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.inner.state.store(STATE_CLOSED, Ordering::SeqCst);
        if let Some(mut stream) = self.inner.stream.lock().await.take() {
            tracing::debug!("closing connection");
            let _ = stream.shutdown().await;
        }
        Ok(())
    }

    fn check_live(&self) -> Result<(), ClientError> {
        match self.inner.state.load(Ordering::SeqCst) {
            STATE_LIVE => Ok(()),
            STATE_POISONED => Err(ClientError::ConnectionPoisoned),
            _ => Err(ClientError::ConnectionClosed),
        }
    }

    fn poison(&self) {
        // Never resurrect a closed connection.
        let _ = self.inner.state.compare_exchange(
            STATE_LIVE,
            STATE_POISONED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        tracing::warn!("connection poisoned");
    }

    fn next_request_id(&self) -> i32 {
        self.inner.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Sends a fire-and-forget operation (insert, update, delete,
    /// kill-cursors). Either the whole message reaches the transport or
    /// the operation fails and the connection is poisoned.
    pub(crate) async fn send<M: Message>(&self, message: &M) -> Result<(), ClientError> {
        self.check_live()?;
        let request_id = self.next_request_id();
        let bytes = encode_message(message, request_id)?;

        let mut guard = self.inner.stream.lock().await;
        let stream = guard.as_mut().ok_or(ClientError::ConnectionClosed)?;
        tracing::trace!(request_id, len = bytes.len(), "writing operation");
        self.write_all(stream, &bytes).await
    }

    /// Sends a request and reads its reply as one exchange, verifying the
    /// reply correlates to the request id. A mismatch means this client
    /// and the server disagree about the stream position, which nothing
    /// can repair: the connection is poisoned.
    pub(crate) async fn round_trip<M: Message>(&self, message: &M) -> Result<Reply, ClientError> {
        self.check_live()?;
        let request_id = self.next_request_id();
        let bytes = encode_message(message, request_id)?;

        let mut guard = self.inner.stream.lock().await;
        let stream = guard.as_mut().ok_or(ClientError::ConnectionClosed)?;
        tracing::trace!(request_id, len = bytes.len(), "writing request");
        self.write_all(stream, &bytes).await?;

        let reply = self.read_reply(stream).await?;
        if reply.response_to != request_id {
            self.poison();
            return Err(ClientError::Desynchronized {
                expected: request_id,
                got: reply.response_to,
            });
        }
        tracing::trace!(request_id, docs = reply.documents.len(), "reply received");
        Ok(reply)
    }

    async fn write_all(
        &self,
        stream: &mut Box<dyn Transport>,
        bytes: &[u8],
    ) -> Result<(), ClientError> {
        if let Err(err) = stream.write_all(bytes).await {
            self.poison();
            return Err(err.into());
        }
        if let Err(err) = stream.flush().await {
            self.poison();
            return Err(err.into());
        }
        Ok(())
    }

    /// Reads exactly one framed reply: 4 length bytes, then the rest.
    async fn read_reply(&self, stream: &mut Box<dyn Transport>) -> Result<Reply, ClientError> {
        let mut len_bytes = [0u8; 4];
        if let Err(err) = stream.read_exact(&mut len_bytes).await {
            self.poison();
            return Err(err.into());
        }
        let total = i32::from_le_bytes(len_bytes);
        if (total as usize) < HEADER_SIZE || total as usize > MAX_MESSAGE_SIZE {
            self.poison();
            return Err(docdb_protocol::ProtocolError::Truncated("reply length").into());
        }

        let mut body = vec![0u8; total as usize - 4];
        if let Err(err) = stream.read_exact(&mut body).await {
            self.poison();
            return Err(err.into());
        }

        match Reply::parse(&body) {
            Ok(reply) => Ok(reply),
            Err(err) => {
                // The stream position is unknown after a bad envelope.
                self.poison();
                Err(err.into())
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field(
                "state",
                &match self.inner.state.load(Ordering::SeqCst) {
                    STATE_LIVE => "live",
                    STATE_POISONED => "poisoned",
                    _ => "closed",
                },
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ConnectionConfig::new("127.0.0.1", 27017);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 27017);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_config_builders() {
        let config = ConnectionConfig::new("db.internal", 11000)
            .with_connect_timeout(Duration::from_millis(250))
            .with_tcp_nodelay(false);
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert!(!config.tcp_nodelay);
    }

    #[tokio::test]
    async fn test_over_stream_is_live_until_closed() {
        let (client, _server) = tokio::io::duplex(1024);
        let conn = Connection::over(client);
        assert!(conn.is_live());
        conn.close().await.unwrap();
        assert!(!conn.is_live());
        // Closed is terminal.
        let err = conn.check_live().unwrap_err();
        assert!(matches!(err, ClientError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_reconnect_needs_a_dial_address() {
        let (client, _server) = tokio::io::duplex(1024);
        let conn = Connection::over(client);
        let err = conn.reconnect().await.unwrap_err();
        assert!(matches!(err, ClientError::NoDialAddress));
    }

    #[tokio::test]
    async fn test_poison_does_not_resurrect_closed() {
        let (client, _server) = tokio::io::duplex(1024);
        let conn = Connection::over(client);
        conn.close().await.unwrap();
        conn.poison();
        assert!(matches!(
            conn.check_live().unwrap_err(),
            ClientError::ConnectionClosed
        ));
    }
}
