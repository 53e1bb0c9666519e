//! # docdb-bson
//!
//! Binary document format for docdb.
//!
//! This crate provides:
//! - A tagged value tree (`Value`, `Document`) for dynamic-schema documents
//! - A byte-exact little-endian encoder and a builder-driven decoder
//! - serde integration mapping documents to and from user-defined types
//! - `ObjectId` and millisecond-precision `DateTime` element types
//!
//! Documents are length-prefixed, NUL-terminated element sequences; every
//! multi-byte field is little-endian. See [`Kind`] for the element tags.

pub mod builder;
pub mod datetime;
pub mod de;
pub mod decode;
pub mod document;
pub mod encode;
pub mod error;
pub mod oid;
pub mod ser;
pub mod value;

mod macros;

pub use builder::{Builder, NoopBuilder, TreeBuilder};
pub use datetime::DateTime;
pub use de::{from_document, from_value, unmarshal};
pub use decode::{decode_document, validate};
pub use document::Document;
pub use encode::encode_document;
pub use error::{Error, Result};
pub use oid::ObjectId;
pub use ser::{marshal, to_document, to_vec};
pub use value::{Kind, Value};

/// Maximum document nesting depth accepted by the encoder, the decoder and
/// the serde layer. Deeper trees (including cyclic reference graphs, which
/// would otherwise recurse forever) fail with [`Error::DepthExceeded`].
pub const MAX_DEPTH: usize = 128;

/// Field name used when a bare scalar is marshalled: the value is wrapped
/// in a single-field document under this key.
pub const SCALAR_FIELD: &str = "val";
