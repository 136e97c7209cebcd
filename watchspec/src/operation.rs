//! Scripted collection operations.
//!
//! Operation names from spec files are resolved against a closed registry
//! ([`OperationKind`]) when the file is loaded. Executing an [`Operation`]
//! yields a deferred action so callers control when it runs.

use std::{fmt, str::FromStr, time::Duration};

use futures_util::{FutureExt, future::BoxFuture};
use serde_json::Value;

use crate::{Collection, Document, Error, Result, StoreClient, StoreResult};

/// How an operation treats its document argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Argument {
    Required,
    Optional,
    None,
}

/// The operations a scenario may script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    InsertOne,
    DeleteOne,
    DeleteMany,
    FindOne,
    CountDocuments,
    Drop,
}

impl OperationKind {
    pub const ALL: [OperationKind; 6] = [
        OperationKind::InsertOne,
        OperationKind::DeleteOne,
        OperationKind::DeleteMany,
        OperationKind::FindOne,
        OperationKind::CountDocuments,
        OperationKind::Drop,
    ];

    /// Name used in spec files.
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::InsertOne => "insertOne",
            OperationKind::DeleteOne => "deleteOne",
            OperationKind::DeleteMany => "deleteMany",
            OperationKind::FindOne => "findOne",
            OperationKind::CountDocuments => "countDocuments",
            OperationKind::Drop => "drop",
        }
    }

    pub fn argument(&self) -> Argument {
        match self {
            OperationKind::InsertOne | OperationKind::DeleteOne | OperationKind::DeleteMany => {
                Argument::Required
            }
            OperationKind::FindOne | OperationKind::CountDocuments => Argument::Optional,
            OperationKind::Drop => Argument::None,
        }
    }

    fn invoke<C: Collection>(
        self,
        collection: C,
        document: Option<Document>,
    ) -> BoxFuture<'static, StoreResult<Value>> {
        async move {
            match (self, document) {
                (OperationKind::InsertOne, Some(doc)) => collection.insert_one(doc).await,
                (OperationKind::DeleteOne, Some(filter)) => collection.delete_one(filter).await,
                (OperationKind::DeleteMany, Some(filter)) => collection.delete_many(filter).await,
                (OperationKind::FindOne, filter) => collection.find_one(filter).await,
                (OperationKind::CountDocuments, filter) => {
                    collection.count_documents(filter).await
                }
                (OperationKind::Drop, _) => collection.drop_collection().await,
                // Operation::new rejects these
                (kind, None) => {
                    Err(crate::StoreError::new(format!(
                        "{} requires a document argument",
                        kind.name()
                    )))
                }
            }
        }
        .boxed()
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| Error::config(format!("unknown operation '{s}'")))
    }
}

/// One scripted operation against `database.collection`.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    database: String,
    collection: String,
    kind: OperationKind,
    document: Option<Document>,
}

impl Operation {
    /// Build an operation, checking the document argument against the kind.
    pub fn new(
        database: impl Into<String>,
        collection: impl Into<String>,
        kind: OperationKind,
        document: Option<Document>,
    ) -> Result<Self> {
        match (kind.argument(), &document) {
            (Argument::Required, None) => {
                return Err(Error::config(format!(
                    "{kind} requires a document argument"
                )));
            }
            (Argument::None, Some(_)) => {
                return Err(Error::config(format!("{kind} takes no document argument")));
            }
            _ => {}
        }
        Ok(Self {
            database: database.into(),
            collection: collection.into(),
            kind,
            document,
        })
    }

    #[inline]
    pub fn database(&self) -> &str {
        &self.database
    }

    #[inline]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[inline]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    #[inline]
    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }
}

/// Turn an operation into a deferred action on `client`.
///
/// The collection handle is resolved now; nothing is sent to the store until
/// the returned closure is called. Errors from the store pass through
/// unchanged.
pub fn execute<C: StoreClient>(
    client: &C,
    operation: &Operation,
) -> impl FnOnce() -> BoxFuture<'static, StoreResult<Value>> + Send + 'static {
    let collection = client.collection(&operation.database, &operation.collection);
    let kind = operation.kind;
    let document = operation.document.clone();
    move || kind.invoke(collection, document)
}

/// Wait `settle_delay`, then run `operations` strictly in order.
///
/// Each operation starts only after the previous one resolved. The first
/// error stops the sequence and is returned.
pub async fn run_operations<C: StoreClient>(
    client: &C,
    operations: &[Operation],
    settle_delay: Duration,
) -> StoreResult<()> {
    let actions: Vec<_> = operations.iter().map(|op| execute(client, op)).collect();

    tokio::time::sleep(settle_delay).await;

    for (idx, (action, op)) in actions.into_iter().zip(operations).enumerate() {
        tracing::debug!(
            index = idx,
            operation = %op.kind,
            database = %op.database,
            collection = %op.collection,
            "running operation"
        );
        if let Err(e) = action().await {
            tracing::debug!(index = idx, operation = %op.kind, error = %e, "operation failed");
            return Err(e);
        }
    }
    Ok(())
}
