//! Cursors over batched query results.

use crate::collection::Collection;
use crate::error::ClientError;
use docdb_bson::Document;
use docdb_protocol::{GetMore, KillCursors, Reply};
use std::collections::VecDeque;

/// A cursor: a server-side iterator id plus the client-side buffer of
/// documents already returned.
///
/// A cursor is open while the server holds an id for it (`id != 0`),
/// exhausted once the server reports id 0, and closed after
/// [`close`](Cursor::close). Reads on a closed cursor fail with
/// [`ClientError::CursorClosed`].
pub struct Cursor {
    collection: Collection,
    id: i64,
    buffer: VecDeque<Document>,
    closed: bool,
}

impl Cursor {
    pub(crate) fn new(collection: Collection, reply: Reply) -> Cursor {
        Cursor {
            collection,
            id: reply.cursor_id,
            buffer: reply.documents.into(),
            closed: false,
        }
    }

    /// The server-side cursor id; 0 once the result set is exhausted.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Whether another document is available, fetching the next batch
    /// from the server when the buffer is drained and the cursor is
    /// still open.
    pub async fn has_more(&mut self) -> Result<bool, ClientError> {
        if self.closed {
            return Err(ClientError::CursorClosed);
        }
        if !self.buffer.is_empty() {
            return Ok(true);
        }
        if self.id == 0 {
            return Ok(false);
        }
        self.get_more().await?;
        Ok(!self.buffer.is_empty())
    }

    /// Yields the next document.
    pub async fn next(&mut self) -> Result<Document, ClientError> {
        if self.has_more().await? {
            self.buffer.pop_front().ok_or(ClientError::CursorExhausted)
        } else {
            Err(ClientError::CursorExhausted)
        }
    }

    /// Requests the next batch from the server.
    pub async fn get_more(&mut self) -> Result<(), ClientError> {
        if self.closed {
            return Err(ClientError::CursorClosed);
        }
        if self.id == 0 {
            return Err(ClientError::CursorExhausted);
        }
        let full_name = self.collection.full_name();
        tracing::debug!(cursor_id = self.id, collection = %full_name, "get more");
        let reply = self
            .collection
            .database()
            .connection()
            .round_trip(&GetMore {
                full_name: &full_name,
                number_to_return: 0,
                cursor_id: self.id,
            })
            .await?;
        if reply.cursor_not_found() {
            self.id = 0;
            return Err(ClientError::CursorExhausted);
        }
        self.id = reply.cursor_id;
        self.buffer = reply.documents.into();
        Ok(())
    }

    /// Closes the cursor. An open server-side cursor is killed with a
    /// fire-and-forget message; an exhausted one needs none. Idempotent.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        if self.closed {
            return Ok(());
        }
        if self.id != 0 {
            tracing::debug!(cursor_id = self.id, "kill cursor");
            self.collection
                .database()
                .connection()
                .send(&KillCursors {
                    cursor_ids: &[self.id],
                })
                .await?;
            self.id = 0;
        }
        self.closed = true;
        self.buffer.clear();
        Ok(())
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("id", &self.id)
            .field("buffered", &self.buffer.len())
            .field("closed", &self.closed)
            .finish()
    }
}
