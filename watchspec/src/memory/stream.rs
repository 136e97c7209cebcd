use std::{fmt, sync::Arc};

use serde_json::{Value, json};
use tokio_stream::{
    StreamExt,
    wrappers::{BroadcastStream, errors::BroadcastStreamRecvError},
};

use super::{Change, ChangeKind, client::Connection, filter::Stage, resume_token};
use crate::{ChangeStream, Document, StoreError, StoreResult, Topology, WatchScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    /// No command sent yet.
    Pending,
    Open(i64),
    /// The watched namespace went away; the next read yields `invalidate`.
    Invalidating(i64),
    /// `invalidate` was delivered; the cursor is dead.
    Invalidated(i64),
}

/// A change stream on a [`MemoryClient`](super::MemoryClient).
///
/// The stream listens for changes from the moment it is created, but sends
/// its `aggregate` command (and any resulting error) only on the first read.
/// Later reads send `getMore`; closing an opened stream sends `killCursors`.
pub struct MemoryChangeStream {
    connection: Arc<Connection>,
    scope: WatchScope,
    pipeline: Vec<Document>,
    options: Document,
    changes: BroadcastStream<Change>,
    cursor: Cursor,
    stages: Vec<Stage>,
}

impl fmt::Debug for MemoryChangeStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryChangeStream")
            .field("scope", &self.scope)
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

impl MemoryChangeStream {
    pub(crate) fn new(
        connection: Arc<Connection>,
        scope: WatchScope,
        pipeline: Vec<Document>,
        options: Document,
    ) -> Self {
        let changes = BroadcastStream::new(connection.shared().subscribe());
        Self {
            connection,
            scope,
            pipeline,
            options,
            changes,
            cursor: Cursor::Pending,
            stages: Vec::new(),
        }
    }

    /// Database the stream's commands are sent to.
    fn database(&self) -> &str {
        match &self.scope {
            WatchScope::Client => "admin",
            WatchScope::Database(db) | WatchScope::Collection { database: db, .. } => db.as_str(),
        }
    }

    /// Value of the `aggregate` field: the collection name, or 1.
    fn aggregate_target(&self) -> Value {
        match &self.scope {
            WatchScope::Collection { collection, .. } => json!(collection),
            _ => json!(1),
        }
    }

    fn aggregate_command(&self) -> Document {
        let mut change_stream = Document::new();
        change_stream.insert("fullDocument".into(), json!("default"));
        change_stream.extend(self.options.clone());
        if self.scope == WatchScope::Client {
            change_stream.insert("allChangesForCluster".into(), json!(true));
        }

        let mut pipeline = vec![json!({ "$changeStream": change_stream })];
        pipeline.extend(self.pipeline.iter().cloned().map(Value::Object));

        let mut command = Document::new();
        command.insert("aggregate".into(), self.aggregate_target());
        command.insert("pipeline".into(), Value::Array(pipeline));
        command.insert("cursor".into(), json!({}));
        command
    }

    /// Send `aggregate` and validate the stream as the server would.
    async fn open(&mut self) -> StoreResult<i64> {
        self.connection
            .start_command("aggregate", self.database(), self.aggregate_command())
            .await?;
        self.stages = self.validate()?;
        let id = self.connection.shared().cursor_id();
        tracing::trace!(cursor_id = id, scope = ?self.scope, "change stream opened");
        Ok(id)
    }

    fn validate(&self) -> StoreResult<Vec<Stage>> {
        if self.connection.shared().topology() == Topology::Single {
            return Err(StoreError::server(
                40573,
                "Location40573",
                "The $changeStream stage is only supported on replica sets",
            ));
        }
        self.pipeline.iter().map(Stage::parse).collect()
    }

    async fn get_more(&self, cursor_id: i64) -> StoreResult<()> {
        let collection = match &self.scope {
            WatchScope::Collection { collection, .. } => collection.as_str(),
            _ => "$cmd.aggregate",
        };
        let mut command = Document::new();
        command.insert("getMore".into(), json!(cursor_id));
        command.insert("collection".into(), json!(collection));
        self.connection
            .start_command("getMore", self.database(), command)
            .await
    }

    fn invalidates(&self, change: &Change) -> bool {
        match (&self.scope, change.kind) {
            (WatchScope::Collection { database, collection }, ChangeKind::Drop) => {
                *database == change.database && Some(collection) == change.collection.as_ref()
            }
            (WatchScope::Database(database), ChangeKind::DropDatabase) => {
                *database == change.database
            }
            _ => false,
        }
    }

    fn covers(&self, change: &Change) -> bool {
        match &change.collection {
            Some(collection) => self.scope.covers(&change.database, collection),
            None => match &self.scope {
                WatchScope::Client => true,
                WatchScope::Database(db) => *db == change.database,
                WatchScope::Collection { .. } => false,
            },
        }
    }

    /// Wait for the next change visible through scope and pipeline.
    async fn next_change(&mut self, cursor_id: i64) -> StoreResult<Value> {
        loop {
            let change = match self.changes.next().await {
                Some(Ok(change)) => change,
                Some(Err(BroadcastStreamRecvError::Lagged(missed))) => {
                    return Err(StoreError::server(
                        286,
                        "ChangeStreamHistoryLost",
                        format!("change stream fell behind by {missed} events"),
                    ));
                }
                None => return Err(StoreError::new("server shut down")),
            };
            if !self.covers(&change) {
                continue;
            }
            if self.invalidates(&change) {
                self.cursor = Cursor::Invalidating(cursor_id);
            }
            let document = self
                .stages
                .iter()
                .try_fold(change.to_document(), |doc, stage| stage.apply(doc));
            if let Some(document) = document {
                return Ok(Value::Object(document));
            }
        }
    }
}

impl ChangeStream for MemoryChangeStream {
    async fn read_next(&mut self) -> StoreResult<Value> {
        let cursor_id = match self.cursor {
            Cursor::Pending => {
                let id = self.open().await?;
                self.cursor = Cursor::Open(id);
                id
            }
            Cursor::Open(id) => {
                self.get_more(id).await?;
                id
            }
            Cursor::Invalidating(id) => {
                self.get_more(id).await?;
                self.cursor = Cursor::Invalidated(id);
                let token = resume_token(self.connection.shared().next_token());
                return Ok(json!({ "_id": token, "operationType": "invalidate" }));
            }
            Cursor::Invalidated(id) => {
                return Err(StoreError::server(
                    43,
                    "CursorNotFound",
                    format!("cursor id {id} not found"),
                ));
            }
        };
        self.next_change(cursor_id).await
    }

    async fn close(self) -> StoreResult<()> {
        let cursor_id = match self.cursor {
            Cursor::Pending => return Ok(()),
            Cursor::Open(id) | Cursor::Invalidating(id) => id,
            // The server already closed an invalidated cursor.
            Cursor::Invalidated(_) => return Ok(()),
        };
        let collection = match &self.scope {
            WatchScope::Collection { collection, .. } => json!(collection),
            _ => json!("$cmd.aggregate"),
        };
        let mut command = Document::new();
        command.insert("killCursors".into(), collection);
        command.insert("cursors".into(), json!([cursor_id]));
        self.connection
            .start_command("killCursors", self.database(), command)
            .await
    }
}
