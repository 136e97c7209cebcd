use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use serde_json::{Value, json};
use tokio::sync::RwLock;

use super::{ChangeKind, MemoryChangeStream, Shared, filter::matches_filter};
use crate::{
    Collection, Document, ServerInfo, StoreClient, StoreError, StoreResult, WatchScope,
    monitoring::{CommandMonitor, CommandStartedEvent},
};

/// Per-client state shared by the client, its collections and its streams.
pub(crate) struct Connection {
    shared: Arc<Shared>,
    connection_id: String,
    monitors: RwLock<Vec<Box<dyn CommandMonitor>>>,
    closed: AtomicBool,
}

impl Connection {
    #[inline]
    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    /// Announce a command to this client's monitors.
    ///
    /// Fails without announcing anything once the client is closed.
    pub(crate) async fn start_command(
        &self,
        command_name: &str,
        database: &str,
        command: Document,
    ) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::new("client is closed"));
        }
        let event = CommandStartedEvent::new(command_name, database, command)
            .with_request_id(self.shared.request_id())
            .with_connection_id(self.connection_id.clone());
        let monitors = self.monitors.read().await;
        for monitor in monitors.iter() {
            monitor.on_command_started(&event);
        }
        Ok(())
    }
}

/// A client connected to a [`MemoryServer`](super::MemoryServer).
///
/// Commands sent through this client, its collections and its change streams
/// are reported to the monitors registered on this client only.
#[derive(Clone)]
pub struct MemoryClient {
    connection: Arc<Connection>,
}

impl MemoryClient {
    pub(crate) fn new(shared: Arc<Shared>, connection_id: String) -> Self {
        Self {
            connection: Arc::new(Connection {
                shared,
                connection_id,
                monitors: RwLock::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    #[inline]
    pub fn connection_id(&self) -> &str {
        &self.connection.connection_id
    }

    pub fn is_closed(&self) -> bool {
        self.connection.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for MemoryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryClient")
            .field("connection_id", &self.connection.connection_id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl StoreClient for MemoryClient {
    type Collection = MemoryCollection;
    type ChangeStream = MemoryChangeStream;

    fn collection(&self, database: &str, collection: &str) -> MemoryCollection {
        MemoryCollection {
            connection: self.connection.clone(),
            database: database.to_owned(),
            collection: collection.to_owned(),
        }
    }

    fn watch(
        &self,
        scope: &WatchScope,
        pipeline: &[Document],
        options: &Document,
    ) -> MemoryChangeStream {
        MemoryChangeStream::new(
            self.connection.clone(),
            scope.clone(),
            pipeline.to_vec(),
            options.clone(),
        )
    }

    async fn add_command_monitor(&self, monitor: Box<dyn CommandMonitor>) {
        self.connection.monitors.write().await.push(monitor);
    }

    async fn drop_database(&self, name: &str) -> StoreResult<()> {
        self.connection
            .start_command("dropDatabase", name, doc(json!({ "dropDatabase": 1 })))
            .await?;
        let shared = self.connection.shared();
        let dropped = shared.databases().lock().await.remove(name);
        if let Some(collections) = dropped {
            for collection in collections.keys() {
                shared.publish(ChangeKind::Drop, name, Some(collection), None, None);
            }
            shared.publish(ChangeKind::DropDatabase, name, None, None, None);
        }
        Ok(())
    }

    async fn create_collection(&self, database: &str, collection: &str) -> StoreResult<()> {
        self.connection
            .start_command("create", database, doc(json!({ "create": collection })))
            .await?;
        let mut databases = self.connection.shared().databases().lock().await;
        let collections = databases.entry(database.to_owned()).or_default();
        if collections.contains_key(collection) {
            return Err(StoreError::server(
                48,
                "NamespaceExists",
                format!("Collection {database}.{collection} already exists."),
            ));
        }
        collections.insert(collection.to_owned(), Vec::new());
        Ok(())
    }

    async fn server_info(&self) -> StoreResult<ServerInfo> {
        self.connection
            .start_command("buildInfo", "admin", doc(json!({ "buildInfo": 1 })))
            .await?;
        let shared = self.connection.shared();
        Ok(ServerInfo {
            version: shared.version().clone(),
            topology: shared.topology(),
        })
    }

    async fn close(&self) -> StoreResult<()> {
        if self.connection.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let monitors = self.connection.monitors.read().await;
        for monitor in monitors.iter() {
            monitor.on_client_closed();
        }
        tracing::debug!(connection_id = %self.connection.connection_id, "client closed");
        Ok(())
    }
}

/// A collection handle on a [`MemoryClient`].
///
/// Writes create the collection on demand, like the server does.
pub struct MemoryCollection {
    connection: Arc<Connection>,
    database: String,
    collection: String,
}

impl fmt::Debug for MemoryCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCollection")
            .field("database", &self.database)
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl MemoryCollection {
    async fn delete(&self, filter: Document, limit: usize) -> StoreResult<Value> {
        self.connection
            .start_command(
                "delete",
                &self.database,
                doc(json!({
                    "delete": self.collection,
                    "deletes": [{ "q": filter, "limit": limit }],
                    "ordered": true
                })),
            )
            .await?;

        let shared = self.connection.shared();
        let mut databases = shared.databases().lock().await;
        let Some(documents) = databases
            .get_mut(&self.database)
            .and_then(|colls| colls.get_mut(&self.collection))
        else {
            return Ok(json!({ "acknowledged": true, "deletedCount": 0 }));
        };

        let mut removed = Vec::new();
        let mut idx = 0;
        while idx < documents.len() {
            if (limit == 0 || removed.len() < limit) && matches_filter(&documents[idx], &filter) {
                removed.push(documents.remove(idx));
            } else {
                idx += 1;
            }
        }
        for document in &removed {
            shared.publish(
                ChangeKind::Delete,
                &self.database,
                Some(&self.collection),
                document.get("_id").cloned(),
                None,
            );
        }
        Ok(json!({ "acknowledged": true, "deletedCount": removed.len() }))
    }

    async fn matching(&self, filter: &Document) -> Vec<Document> {
        let databases = self.connection.shared().databases().lock().await;
        databases
            .get(&self.database)
            .and_then(|colls| colls.get(&self.collection))
            .map(|documents| {
                documents
                    .iter()
                    .filter(|d| matches_filter(d, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Collection for MemoryCollection {
    async fn insert_one(&self, mut document: Document) -> StoreResult<Value> {
        if !document.contains_key("_id") {
            document.insert("_id".into(), json!(uuid::Uuid::new_v4().to_string()));
        }
        self.connection
            .start_command(
                "insert",
                &self.database,
                doc(json!({
                    "insert": self.collection,
                    "documents": [document],
                    "ordered": true
                })),
            )
            .await?;

        let id = document.get("_id").cloned().unwrap_or(Value::Null);
        let shared = self.connection.shared();
        let mut databases = shared.databases().lock().await;
        let documents = databases
            .entry(self.database.clone())
            .or_default()
            .entry(self.collection.clone())
            .or_default();
        if documents.iter().any(|d| d.get("_id") == Some(&id)) {
            return Err(StoreError::server(
                11000,
                "DuplicateKey",
                format!(
                    "E11000 duplicate key error collection: {}.{} index: _id_ dup key: {{ _id: {id} }}",
                    self.database, self.collection
                ),
            ));
        }
        documents.push(document.clone());
        shared.publish(
            ChangeKind::Insert,
            &self.database,
            Some(&self.collection),
            Some(id.clone()),
            Some(document),
        );
        Ok(json!({ "acknowledged": true, "insertedId": id }))
    }

    async fn delete_one(&self, filter: Document) -> StoreResult<Value> {
        self.delete(filter, 1).await
    }

    async fn delete_many(&self, filter: Document) -> StoreResult<Value> {
        self.delete(filter, 0).await
    }

    async fn find_one(&self, filter: Option<Document>) -> StoreResult<Value> {
        let filter = filter.unwrap_or_default();
        self.connection
            .start_command(
                "find",
                &self.database,
                doc(json!({ "find": self.collection, "filter": filter, "limit": 1 })),
            )
            .await?;
        Ok(self
            .matching(&filter)
            .await
            .into_iter()
            .next()
            .map_or(Value::Null, Value::Object))
    }

    async fn count_documents(&self, filter: Option<Document>) -> StoreResult<Value> {
        let filter = filter.unwrap_or_default();
        self.connection
            .start_command(
                "count",
                &self.database,
                doc(json!({ "count": self.collection, "query": filter })),
            )
            .await?;
        Ok(json!(self.matching(&filter).await.len()))
    }

    async fn drop_collection(&self) -> StoreResult<Value> {
        self.connection
            .start_command("drop", &self.database, doc(json!({ "drop": self.collection })))
            .await?;
        let shared = self.connection.shared();
        let removed = shared
            .databases()
            .lock()
            .await
            .get_mut(&self.database)
            .and_then(|colls| colls.remove(&self.collection));
        if removed.is_none() {
            return Err(StoreError::server(26, "NamespaceNotFound", "ns not found"));
        }
        shared.publish(
            ChangeKind::Drop,
            &self.database,
            Some(&self.collection),
            None,
            None,
        );
        Ok(Value::Bool(true))
    }
}

fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{memory::MemoryServer, monitoring::EventLog};

    #[tokio::test]
    async fn insert_generates_missing_ids() {
        let server = MemoryServer::new();
        let coll = server.client().collection("db", "c");

        let reply = coll.insert_one(doc(json!({ "x": 1 }))).await.unwrap();
        assert!(reply["insertedId"].is_string());
        assert_eq!(reply["acknowledged"], json!(true));
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let server = MemoryServer::new();
        let coll = server.client().collection("db", "c");

        coll.insert_one(doc(json!({ "_id": 1 }))).await.unwrap();
        let err = coll.insert_one(doc(json!({ "_id": 1 }))).await.unwrap_err();
        assert_eq!(err.code(), Some(11000));
        assert_eq!(err.code_name(), Some("DuplicateKey"));
        assert_eq!(server.document_count("db", "c").await, 1);
    }

    #[tokio::test]
    async fn delete_one_and_many() {
        let server = MemoryServer::new();
        let coll = server.client().collection("db", "c");
        for id in 0..4 {
            coll.insert_one(doc(json!({ "_id": id, "even": id % 2 == 0 })))
                .await
                .unwrap();
        }

        let reply = coll.delete_one(doc(json!({ "even": true }))).await.unwrap();
        assert_eq!(reply["deletedCount"], json!(1));
        let reply = coll.delete_many(doc(json!({ "even": false }))).await.unwrap();
        assert_eq!(reply["deletedCount"], json!(2));
        assert_eq!(coll.count_documents(None).await.unwrap(), json!(1));
        assert_eq!(
            coll.find_one(Some(doc(json!({ "_id": 0 })))).await.unwrap(),
            Value::Null
        );
    }

    #[tokio::test]
    async fn drop_requires_an_existing_collection() {
        let server = MemoryServer::new();
        let client = server.client();
        client.create_collection("db", "c").await.unwrap();

        assert_eq!(
            client.collection("db", "c").drop_collection().await.unwrap(),
            json!(true)
        );
        let err = client.collection("db", "c").drop_collection().await.unwrap_err();
        assert_eq!(err.code(), Some(26));
    }

    #[tokio::test]
    async fn create_collection_twice_fails() {
        let client = MemoryServer::new().client();
        client.create_collection("db", "c").await.unwrap();
        let err = client.create_collection("db", "c").await.unwrap_err();
        assert_eq!(err.code(), Some(48));

        client.drop_database("db").await.unwrap();
        client.create_collection("db", "c").await.unwrap();
    }

    #[tokio::test]
    async fn commands_reach_only_this_clients_monitors() {
        let server = MemoryServer::new();
        let watched = server.client();
        let other = server.client();
        let (mut log, collector) = EventLog::new();
        watched.add_command_monitor(Box::new(collector)).await;

        watched
            .collection("db", "c")
            .insert_one(doc(json!({ "_id": 1 })))
            .await
            .unwrap();
        other
            .collection("db", "c")
            .insert_one(doc(json!({ "_id": 2 })))
            .await
            .unwrap();

        assert_eq!(log.collect(), 1);
        let event = &log.events()[0];
        assert_eq!(event.command_name, "insert");
        assert_eq!(event.database_name, "db");
        assert_eq!(event.command["insert"], json!("c"));
        assert_eq!(event.connection_id, watched.connection_id());
    }

    #[tokio::test]
    async fn closed_clients_reject_commands() {
        let client = MemoryServer::new().client();
        client.close().await.unwrap();
        assert!(client.is_closed());
        assert!(client.collection("db", "c").find_one(None).await.is_err());
        // Closing twice is harmless.
        client.close().await.unwrap();
    }
}
