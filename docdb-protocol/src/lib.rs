//! # docdb-protocol
//!
//! Wire protocol implementation for docdb.
//!
//! This crate provides:
//! - The fixed 16-byte message header and opcode set
//! - Request payload encodings (insert, update, delete, query, get-more,
//!   kill-cursors) and their flag bitfields
//! - Reply envelope parsing, including the returned document batch
//!
//! Everything here is sans-IO: the client crate owns the transport and
//! feeds complete messages through these types. All integers on the wire
//! are little-endian.

pub mod error;
pub mod header;
pub mod message;
pub mod reply;

pub use error::ProtocolError;
pub use header::{MsgHeader, OpCode, HEADER_SIZE};
pub use message::{
    encode_message, Delete, DeleteFlags, GetMore, Insert, KillCursors, Message, Query, QueryFlags,
    Update, UpdateFlags,
};
pub use reply::{encode_reply, Reply};

/// Default server port.
pub const DEFAULT_PORT: u16 = 27017;

/// Upper bound on a single wire message, requests and replies alike.
/// Protects the reader from absurd allocations on a desynchronized or
/// hostile stream.
pub const MAX_MESSAGE_SIZE: usize = 48 * 1024 * 1024;
