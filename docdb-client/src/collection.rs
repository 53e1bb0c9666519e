//! Collection handles and the typed operations.

use crate::cursor::Cursor;
use crate::database::Database;
use crate::error::ClientError;
use docdb_bson::{doc, Document};
use docdb_protocol::{Delete, DeleteFlags, Insert, Query, QueryFlags, Update, UpdateFlags};
use serde::Serialize;

/// A named collection on one database handle.
#[derive(Debug, Clone)]
pub struct Collection {
    db: Database,
    name: String,
}

/// Index descriptor inserted into `system.indexes`.
#[derive(Serialize)]
struct IndexDesc<'a> {
    name: &'a str,
    ns: &'a str,
    key: &'a Document,
}

impl Collection {
    pub(crate) fn new(db: Database, name: String) -> Collection {
        Collection { db, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn database(&self) -> &Database {
        &self.db
    }

    /// The dotted `database.collection` identifier used on the wire.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.db.name(), self.name)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts one document.
    pub async fn insert(&self, document: &Document) -> Result<(), ClientError> {
        let full_name = self.full_name();
        tracing::debug!(collection = %full_name, "insert");
        self.db
            .connection()
            .send(&Insert {
                full_name: &full_name,
                document,
            })
            .await
    }

    async fn update_with_flags(
        &self,
        selector: &Document,
        update: &Document,
        flags: UpdateFlags,
    ) -> Result<(), ClientError> {
        let full_name = self.full_name();
        tracing::debug!(collection = %full_name, flags = flags.bits(), "update");
        self.db
            .connection()
            .send(&Update {
                full_name: &full_name,
                flags,
                selector,
                update,
            })
            .await
    }

    /// Replaces the first document matching `selector`.
    pub async fn update(&self, selector: &Document, update: &Document) -> Result<(), ClientError> {
        self.update_with_flags(selector, update, UpdateFlags::new())
            .await
    }

    /// Like [`update`](Collection::update), inserting when nothing matches.
    pub async fn upsert(&self, selector: &Document, update: &Document) -> Result<(), ClientError> {
        self.update_with_flags(selector, update, UpdateFlags::new().with_upsert())
            .await
    }

    /// Applies `update` to every document matching `selector`.
    pub async fn update_all(
        &self,
        selector: &Document,
        update: &Document,
    ) -> Result<(), ClientError> {
        self.update_with_flags(selector, update, UpdateFlags::new().with_multi_update())
            .await
    }

    /// [`update_all`](Collection::update_all) plus insert-when-absent.
    pub async fn upsert_all(
        &self,
        selector: &Document,
        update: &Document,
    ) -> Result<(), ClientError> {
        self.update_with_flags(
            selector,
            update,
            UpdateFlags::new().with_upsert().with_multi_update(),
        )
        .await
    }

    async fn remove_with_flags(
        &self,
        selector: &Document,
        flags: DeleteFlags,
    ) -> Result<(), ClientError> {
        let full_name = self.full_name();
        tracing::debug!(collection = %full_name, flags = flags.bits(), "remove");
        self.db
            .connection()
            .send(&Delete {
                full_name: &full_name,
                flags,
                selector,
            })
            .await
    }

    /// Removes every document matching `selector`.
    pub async fn remove(&self, selector: &Document) -> Result<(), ClientError> {
        self.remove_with_flags(selector, DeleteFlags::new()).await
    }

    /// Removes the first document matching `selector`.
    pub async fn remove_one(&self, selector: &Document) -> Result<(), ClientError> {
        self.remove_with_flags(selector, DeleteFlags::new().with_single_remove())
            .await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Issues a query and returns a cursor over the result set. `limit`
    /// of 0 lets the server choose batch sizes.
    pub async fn query(
        &self,
        query: &Document,
        skip: i32,
        limit: i32,
    ) -> Result<Cursor, ClientError> {
        let full_name = self.full_name();
        tracing::debug!(collection = %full_name, skip, limit, "query");
        let reply = self
            .db
            .connection()
            .round_trip(&Query {
                flags: QueryFlags::new(),
                full_name: &full_name,
                number_to_skip: skip,
                number_to_return: limit,
                query,
            })
            .await?;
        Ok(Cursor::new(self.clone(), reply))
    }

    /// Queries with no skip and no limit.
    pub async fn find_all(&self, query: &Document) -> Result<Cursor, ClientError> {
        self.query(query, 0, 0).await
    }

    /// Returns the first match, or `None` when nothing matches.
    pub async fn find_one(&self, query: &Document) -> Result<Option<Document>, ClientError> {
        let mut cursor = self.query(query, 0, 1).await?;
        if cursor.has_more().await? {
            Ok(Some(cursor.next().await?))
        } else {
            Ok(None)
        }
    }

    /// Counts the documents matching `query` server-side.
    pub async fn count(&self, query: &Document) -> Result<i64, ClientError> {
        let reply = self
            .db
            .command(&doc! {"count": self.name.as_str(), "query": query.clone()})
            .await?;
        Ok(reply.get("n").number() as i64)
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Registers an index by inserting its descriptor into
    /// `system.indexes`.
    pub async fn ensure_index(&self, name: &str, keys: &Document) -> Result<(), ClientError> {
        let full_name = self.full_name();
        let desc = docdb_bson::to_document(&IndexDesc {
            name,
            ns: &full_name,
            key: keys,
        })?;
        self.db.collection("system.indexes").insert(&desc).await
    }

    /// Deletes a single named index.
    pub async fn drop_index(&self, name: &str) -> Result<(), ClientError> {
        self.db
            .command(&doc! {"deleteIndexes": self.full_name(), "index": name})
            .await?;
        Ok(())
    }

    /// Deletes every index on this collection.
    pub async fn drop_indexes(&self) -> Result<(), ClientError> {
        self.drop_index("*").await
    }

    /// Drops the collection.
    pub async fn drop(&self) -> Result<(), ClientError> {
        self.db.command(&doc! {"drop": self.full_name()}).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;

    #[tokio::test]
    async fn test_full_name_is_dotted() {
        let (client, _server) = tokio::io::duplex(64);
        let conn = Connection::over(client);
        let coll = conn.database("db").collection("coll");
        assert_eq!(coll.full_name(), "db.coll");
        let nested = conn.database("db").collection("system.indexes");
        assert_eq!(nested.full_name(), "db.system.indexes");
    }

    #[test]
    fn test_index_descriptor_shape() {
        let keys = doc! {"first": 1};
        let desc = docdb_bson::to_document(&IndexDesc {
            name: "first_1",
            ns: "db.coll",
            key: &keys,
        })
        .unwrap();
        assert_eq!(desc.get("name").as_str(), "first_1");
        assert_eq!(desc.get("ns").as_str(), "db.coll");
        assert_eq!(desc.get("key").get("first").int32(), 1);
    }
}
