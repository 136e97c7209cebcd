//! In-memory reference store.
//!
//! [`MemoryServer`] implements the client traits without a network: it keeps
//! collections in memory, publishes every write as a change event, emits a
//! [`CommandStartedEvent`](crate::monitoring::CommandStartedEvent) for each
//! command a client sends, and reports the server errors the conformance
//! fixtures rely on (change streams on a single server, unknown pipeline
//! stages, duplicate keys).
//!
//! ```rust
//! use watchspec::{StoreClient, Topology, memory::MemoryServer};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let server = MemoryServer::new().with_topology(Topology::ReplicaSet);
//! let client = server.client();
//! client.create_collection("db", "test").await.unwrap();
//! assert_eq!(server.document_count("db", "test").await, 0);
//! # }
//! ```

mod client;
mod filter;
mod stream;

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicI64, AtomicU64, Ordering},
    },
};

pub use client::{MemoryClient, MemoryCollection};
use semver::Version;
use serde_json::{Value, json};
pub use stream::MemoryChangeStream;
use tokio::sync::{Mutex, broadcast};

use crate::{Document, StoreConnector, StoreResult, Topology};

/// Changes buffered per stream before a slow reader loses history.
const CHANGE_BUFFER: usize = 1024;

type Databases = BTreeMap<String, BTreeMap<String, Vec<Document>>>;

// ==== Changes ====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChangeKind {
    Insert,
    Delete,
    Drop,
    DropDatabase,
}

impl ChangeKind {
    fn name(self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Delete => "delete",
            ChangeKind::Drop => "drop",
            ChangeKind::DropDatabase => "dropDatabase",
        }
    }
}

/// One committed write, as published to every open stream.
#[derive(Debug, Clone)]
pub(crate) struct Change {
    pub(crate) token: u64,
    pub(crate) kind: ChangeKind,
    pub(crate) database: String,
    /// `None` for database-level changes.
    pub(crate) collection: Option<String>,
    pub(crate) document_key: Option<Value>,
    pub(crate) full_document: Option<Document>,
}

impl Change {
    /// The change document a stream yields for this write.
    pub(crate) fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert("_id".into(), resume_token(self.token));
        doc.insert("operationType".into(), json!(self.kind.name()));
        let ns = match &self.collection {
            Some(coll) => json!({ "db": self.database, "coll": coll }),
            None => json!({ "db": self.database }),
        };
        doc.insert("ns".into(), ns);
        if let Some(id) = &self.document_key {
            doc.insert("documentKey".into(), json!({ "_id": id }));
        }
        if let Some(full) = &self.full_document {
            doc.insert("fullDocument".into(), Value::Object(full.clone()));
        }
        doc
    }
}

pub(crate) fn resume_token(token: u64) -> Value {
    json!({ "_data": format!("{token:016X}") })
}

// ==== Shared server state ====

pub(crate) struct Shared {
    databases: Mutex<Databases>,
    changes: broadcast::Sender<Change>,
    version: Version,
    topology: Topology,
    next_request_id: AtomicI64,
    next_connection_id: AtomicU64,
    next_token: AtomicU64,
    next_cursor_id: AtomicI64,
}

impl Shared {
    fn new(topology: Topology, version: Version) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            databases: Mutex::new(BTreeMap::new()),
            changes,
            version,
            topology,
            next_request_id: AtomicI64::new(1),
            next_connection_id: AtomicU64::new(1),
            next_token: AtomicU64::new(1),
            next_cursor_id: AtomicI64::new(1),
        }
    }

    pub(crate) fn request_id(&self) -> i64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn next_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn cursor_id(&self) -> i64 {
        self.next_cursor_id.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn topology(&self) -> Topology {
        self.topology
    }

    #[inline]
    pub(crate) fn version(&self) -> &Version {
        &self.version
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }

    /// Publish a committed write. Streams opened later never see it.
    pub(crate) fn publish(
        &self,
        kind: ChangeKind,
        database: &str,
        collection: Option<&str>,
        document_key: Option<Value>,
        full_document: Option<Document>,
    ) {
        let change = Change {
            token: self.next_token(),
            kind,
            database: database.to_owned(),
            collection: collection.map(str::to_owned),
            document_key,
            full_document,
        };
        tracing::trace!(kind = kind.name(), database, collection, "change published");
        // No open stream is not an error.
        let _ = self.changes.send(change);
    }

    #[inline]
    pub(crate) fn databases(&self) -> &Mutex<Databases> {
        &self.databases
    }
}

// ==== Server ====

/// An in-memory deployment. Cloning shares the same data.
#[derive(Clone)]
pub struct MemoryServer {
    shared: Arc<Shared>,
}

impl MemoryServer {
    /// A replica set reporting server version 4.0.0.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::new(Topology::ReplicaSet, Version::new(4, 0, 0))),
        }
    }

    /// Change the reported topology. Starts from an empty server, so call before creating clients.
    pub fn with_topology(self, topology: Topology) -> Self {
        Self {
            shared: Arc::new(Shared::new(topology, self.shared.version.clone())),
        }
    }

    /// Change the reported version. Starts from an empty server, so call before creating clients.
    pub fn with_version(self, version: Version) -> Self {
        Self {
            shared: Arc::new(Shared::new(self.shared.topology, version)),
        }
    }

    /// Open a new client with its own connection id and monitors.
    pub fn client(&self) -> MemoryClient {
        let id = self.shared.next_connection_id.fetch_add(1, Ordering::Relaxed);
        MemoryClient::new(self.shared.clone(), format!("memory-{id}"))
    }

    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            server: self.clone(),
        }
    }

    #[inline]
    pub fn topology(&self) -> Topology {
        self.shared.topology
    }

    /// Number of documents in `database.collection`; zero if it does not exist.
    pub async fn document_count(&self, database: &str, collection: &str) -> usize {
        let databases = self.shared.databases.lock().await;
        databases
            .get(database)
            .and_then(|colls| colls.get(collection))
            .map_or(0, Vec::len)
    }

    /// Names of the collections in `database`.
    pub async fn collection_names(&self, database: &str) -> Vec<String> {
        let databases = self.shared.databases.lock().await;
        databases
            .get(database)
            .map(|colls| colls.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryServer")
            .field("topology", &self.shared.topology)
            .field("version", &self.shared.version.to_string())
            .finish_non_exhaustive()
    }
}

/// Connects fresh [`MemoryClient`]s to a [`MemoryServer`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    server: MemoryServer,
}

impl StoreConnector for MemoryConnector {
    type Client = MemoryClient;

    async fn connect(&self) -> StoreResult<MemoryClient> {
        Ok(self.server.client())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Collection, StoreClient};

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn change_documents_have_the_server_shape() {
        let change = Change {
            token: 255,
            kind: ChangeKind::Insert,
            database: "db".into(),
            collection: Some("test".into()),
            document_key: Some(json!(1)),
            full_document: Some(doc(json!({ "_id": 1, "x": 1 }))),
        };
        assert_eq!(
            Value::Object(change.to_document()),
            json!({
                "_id": { "_data": "00000000000000FF" },
                "operationType": "insert",
                "ns": { "db": "db", "coll": "test" },
                "documentKey": { "_id": 1 },
                "fullDocument": { "_id": 1, "x": 1 }
            })
        );
    }

    #[tokio::test]
    async fn clients_share_data() {
        let server = MemoryServer::new();
        let a = server.client();
        let b = server.connector().connect().await.unwrap();

        a.collection("db", "c")
            .insert_one(doc(json!({ "_id": 1 })))
            .await
            .unwrap();
        let found = b.collection("db", "c").find_one(None).await.unwrap();
        assert_eq!(found, json!({ "_id": 1 }));
        assert_eq!(server.collection_names("db").await, vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn server_info_reflects_builder() {
        let server = MemoryServer::new()
            .with_topology(Topology::Single)
            .with_version(Version::new(3, 4, 0));
        let info = server.client().server_info().await.unwrap();
        assert_eq!(info.topology, Topology::Single);
        assert_eq!(info.version, Version::new(3, 4, 0));
    }
}
