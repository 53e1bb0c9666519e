//! # docdb-client
//!
//! Client library for docdb.
//!
//! This crate provides:
//! - An async TCP connection speaking the framed request/reply protocol
//! - `Database` and `Collection` handles for the typed operations
//! - Batched result iteration through `Cursor`
//!
//! A connection serializes its callers: one request/reply exchange runs at
//! a time, and replies are correlated against their request ids. Any
//! transport failure or correlation mismatch poisons the connection; every
//! later operation fails until the caller reconnects.
//!
//! ```no_run
//! use docdb_bson::doc;
//!
//! # async fn example() -> Result<(), docdb_client::ClientError> {
//! let conn = docdb_client::connect("127.0.0.1", 27017).await?;
//! let coll = conn.database("inventory").collection("widgets");
//! coll.insert(&doc! {"name": "sprocket", "qty": 12}).await?;
//! let mut cursor = coll.find_all(&doc! {}).await?;
//! while cursor.has_more().await? {
//!     println!("{:?}", cursor.next().await?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod collection;
pub mod connection;
pub mod cursor;
pub mod database;
pub mod error;

pub use collection::Collection;
pub use connection::{Connection, ConnectionConfig, Transport};
pub use cursor::Cursor;
pub use database::Database;
pub use error::ClientError;

/// Dials `host:port` with the default configuration.
pub async fn connect(host: &str, port: u16) -> Result<Connection, ClientError> {
    Connection::connect(ConnectionConfig::new(host, port)).await
}
