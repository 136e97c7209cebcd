use std::{fmt, future::Future, str::FromStr};

use serde_json::Value;

use crate::{Document, StoreResult, monitoring::CommandMonitor};

/// What a change stream watches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WatchScope {
    /// Every database on the deployment.
    Client,
    Database(String),
    Collection {
        database: String,
        collection: String,
    },
}

impl WatchScope {
    /// Returns true if a change on `database.collection` is visible in this scope.
    pub fn covers(&self, database: &str, collection: &str) -> bool {
        match self {
            WatchScope::Client => true,
            WatchScope::Database(db) => db == database,
            WatchScope::Collection {
                database: db,
                collection: coll,
            } => db == database && coll == collection,
        }
    }
}

/// Deployment shape of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    Single,
    ReplicaSet,
    Sharded,
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Topology::Single => "single",
            Topology::ReplicaSet => "replicaset",
            Topology::Sharded => "sharded",
        })
    }
}

impl FromStr for Topology {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" | "standalone" => Ok(Topology::Single),
            "replicaset" | "replica_set" => Ok(Topology::ReplicaSet),
            "sharded" | "sharded_cluster" => Ok(Topology::Sharded),
            other => Err(format!("unknown topology '{other}'")),
        }
    }
}

/// What a store reports about itself; used to evaluate run requirements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub version: semver::Version,
    pub topology: Topology,
}

/// A live, sequential feed of change documents.
///
/// Opening a stream performs no I/O; the first [`read_next`](Self::read_next)
/// does. Closing consumes the stream, so it happens at most once.
pub trait ChangeStream: Send {
    /// Wait for the next change document.
    fn read_next(&mut self) -> impl Future<Output = StoreResult<Value>> + Send;

    /// Release the stream and any server-side cursor.
    fn close(self) -> impl Future<Output = StoreResult<()>> + Send;
}

/// A handle to one collection.
///
/// Each method corresponds to one [`OperationKind`](crate::OperationKind) and
/// resolves to the store's reply.
pub trait Collection: Send + Sync + 'static {
    fn insert_one(&self, document: Document) -> impl Future<Output = StoreResult<Value>> + Send;

    fn delete_one(&self, filter: Document) -> impl Future<Output = StoreResult<Value>> + Send;

    fn delete_many(&self, filter: Document) -> impl Future<Output = StoreResult<Value>> + Send;

    fn find_one(
        &self,
        filter: Option<Document>,
    ) -> impl Future<Output = StoreResult<Value>> + Send;

    fn count_documents(
        &self,
        filter: Option<Document>,
    ) -> impl Future<Output = StoreResult<Value>> + Send;

    fn drop_collection(&self) -> impl Future<Output = StoreResult<Value>> + Send;
}

/// A connected store client.
///
/// Scenario clients are created fresh per scenario; the administrative
/// client is shared by the suite.
pub trait StoreClient: Send + Sync + 'static {
    type Collection: Collection;
    type ChangeStream: ChangeStream;

    /// Resolve a collection handle. Performs no I/O.
    fn collection(&self, database: &str, collection: &str) -> Self::Collection;

    /// Open a change stream. Performs no I/O until the first read.
    fn watch(
        &self,
        scope: &WatchScope,
        pipeline: &[Document],
        options: &Document,
    ) -> Self::ChangeStream;

    /// Register a monitor invoked for every command this client sends.
    fn add_command_monitor(
        &self,
        monitor: Box<dyn CommandMonitor>,
    ) -> impl Future<Output = ()> + Send;

    fn drop_database(&self, name: &str) -> impl Future<Output = StoreResult<()>> + Send;

    fn create_collection(
        &self,
        database: &str,
        collection: &str,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    fn server_info(&self) -> impl Future<Output = StoreResult<ServerInfo>> + Send;

    /// Close the client. Monitors receive no further events.
    fn close(&self) -> impl Future<Output = StoreResult<()>> + Send;
}

/// Creates clients.
pub trait StoreConnector: Send + Sync {
    type Client: StoreClient;

    fn connect(&self) -> impl Future<Output = StoreResult<Self::Client>> + Send;
}
