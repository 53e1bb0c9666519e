//! Database handles.

use crate::collection::Collection;
use crate::connection::Connection;
use crate::error::ClientError;
use docdb_bson::{doc, Document};

/// A named database on one connection.
#[derive(Debug, Clone)]
pub struct Database {
    conn: Connection,
    name: String,
}

impl Database {
    pub(crate) fn new(conn: Connection, name: String) -> Database {
        Database { conn, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Opens a handle onto a named collection.
    pub fn collection(&self, name: impl Into<String>) -> Collection {
        Collection::new(self.clone(), name.into())
    }

    /// Runs a server command: a find-one against the `$cmd` pseudo
    /// collection. The command document's first key names the command.
    pub async fn command(&self, cmd: &Document) -> Result<Document, ClientError> {
        self.collection("$cmd")
            .find_one(cmd)
            .await?
            .ok_or(ClientError::EmptyReply)
    }

    /// Drops the whole database.
    pub async fn drop(&self) -> Result<(), ClientError> {
        self.command(&doc! {"dropDatabase": 1}).await?;
        Ok(())
    }

    /// Rebuilds and compacts the database files.
    pub async fn repair(
        &self,
        preserve_cloned_files_on_failure: bool,
        backup_original_files: bool,
    ) -> Result<(), ClientError> {
        self.command(&doc! {
            "repairDatabase": 1.0,
            "preserveClonedFilesOnFailure": preserve_cloned_files_on_failure,
            "backupOriginalFiles": backup_original_files,
        })
        .await?;
        Ok(())
    }
}
