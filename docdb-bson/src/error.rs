//! Codec error types.

use crate::value::Kind;
use std::fmt;
use thiserror::Error;

/// Result alias for codec operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by the document codec and the serde mapping layer.
#[derive(Debug, Error)]
pub enum Error {
    /// Structurally invalid on-wire bytes: bad lengths, missing NUL
    /// terminators, boolean bytes other than 0 or 1, truncation.
    #[error("malformed document: {0}")]
    Malformed(&'static str),

    /// The decoder met an element tag it does not implement.
    #[error("unsupported element tag {0:#04x}")]
    UnsupportedTag(u8),

    /// The serde serializer cannot map a native value onto an element kind.
    #[error("cannot map {0} into a document value")]
    UnsupportedKind(&'static str),

    /// Map keys must serialize as strings.
    #[error("map keys must be strings, got {0}")]
    InvalidKeyKind(&'static str),

    /// An integer does not fit the width it is declared to have.
    #[error("integer out of range for its target width")]
    NumericOverflow,

    /// A decode target slot is incompatible with the incoming element kind.
    #[error("cannot read {found} element into {expected}")]
    TypeMismatch {
        expected: &'static str,
        found: Kind,
    },

    /// Nesting deeper than [`crate::MAX_DEPTH`] levels.
    #[error("document nesting exceeds {} levels", crate::MAX_DEPTH)]
    DepthExceeded,

    /// An ObjectId that is not 12 bytes (24 hex digits).
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    /// Passthrough for errors raised by `Serialize`/`Deserialize` impls.
    #[error("{0}")]
    Message(String),
}

impl Error {
    pub(crate) fn mismatch(expected: &'static str, found: Kind) -> Self {
        Error::TypeMismatch { expected, found }
    }
}

impl serde::ser::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::Message(msg.to_string())
    }
}

impl serde::de::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::Message(msg.to_string())
    }
}
