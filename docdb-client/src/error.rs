//! Client error types.

use docdb_protocol::ProtocolError;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure, surfaced unchanged.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("document error: {0}")]
    Bson(#[from] docdb_bson::Error),

    #[error("connect timeout")]
    ConnectTimeout,

    /// The reply on the wire answers a different request. Fatal: the
    /// connection is poisoned.
    #[error("reply answers request {got}, expected {expected}")]
    Desynchronized { expected: i32, got: i32 },

    /// An earlier transport or correlation failure already poisoned this
    /// connection.
    #[error("connection poisoned by an earlier failure")]
    ConnectionPoisoned,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("cursor closed")]
    CursorClosed,

    #[error("cursor exhausted")]
    CursorExhausted,

    /// A command produced no reply document.
    #[error("server returned an empty reply")]
    EmptyReply,

    /// The connection was built over a caller-supplied stream, so there
    /// is no address to redial.
    #[error("connection has no dial address")]
    NoDialAddress,
}

impl ClientError {
    /// Whether retrying on a fresh connection could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::ConnectTimeout
                | ClientError::ConnectionPoisoned
                | ClientError::ConnectionClosed
                | ClientError::Desynchronized { .. }
        )
    }
}
