//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding requests or parsing reply envelopes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("truncated message: {0}")]
    Truncated(&'static str),

    #[error("unexpected opcode {0}")]
    UnexpectedOpCode(i32),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("collection name contains a NUL byte")]
    InvalidCollectionName,

    #[error("negative document count in reply")]
    NegativeDocumentCount,

    #[error(transparent)]
    Bson(#[from] docdb_bson::Error),
}
