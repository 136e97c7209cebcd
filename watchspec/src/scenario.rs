use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};

use serde_json::Value;

use crate::{
    Config, StoreClient, StoreResult, TestCase, WatchScope,
    drain::drain,
    monitoring::{CommandStartedEvent, EventLog},
    operation::run_operations,
    spec_file::Target,
};

/// Result of running one scenario: the drained change documents, or the
/// first store error raised by either branch.
pub type Outcome = StoreResult<Vec<Value>>;

/// Per-scenario state: a dedicated client, the fixture names it targets, and
/// the log of every command it sends.
///
/// Created fresh for each scenario and never shared between scenarios.
pub struct RunContext<C: StoreClient> {
    client: C,
    database: String,
    collection: String,
    events: EventLog,
}

impl<C: StoreClient> fmt::Debug for RunContext<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl<C: StoreClient> RunContext<C> {
    /// Attach an event log to `client` and wrap it.
    ///
    /// Must be called before the client sends any command, otherwise those
    /// commands are missing from the log.
    pub async fn new(client: C, database: impl Into<String>, collection: impl Into<String>) -> Self {
        let (events, collector) = EventLog::new();
        client.add_command_monitor(Box::new(collector)).await;
        Self {
            client,
            database: database.into(),
            collection: collection.into(),
            events,
        }
    }

    #[inline]
    pub fn client(&self) -> &C {
        &self.client
    }

    /// The change stream scope a scenario target resolves to.
    pub fn scope(&self, target: Target) -> WatchScope {
        match target {
            Target::Client => WatchScope::Client,
            Target::Database => WatchScope::Database(self.database.clone()),
            Target::Collection => WatchScope::Collection {
                database: self.database.clone(),
                collection: self.collection.clone(),
            },
        }
    }

    /// Every command the client has sent so far, oldest first.
    pub fn recorded_events(&mut self) -> &[CommandStartedEvent] {
        self.events.collect();
        self.events.events()
    }

    /// Close the client.
    pub async fn close(self) -> StoreResult<()> {
        self.client.close().await
    }
}

/// Run one scenario: drain its change stream while its operations execute.
///
/// The stream is opened on `ctx`'s client; the operations run on
/// `operations_client` after the configured settle delay. Both branches run
/// to completion on the current task. When both fail, the error of the
/// branch that failed first is returned.
pub async fn run_scenario<C: StoreClient>(
    ctx: &RunContext<C>,
    operations_client: &C,
    case: &TestCase,
    config: &Config,
) -> Outcome {
    let scope = ctx.scope(case.target());
    let stream = ctx.client.watch(&scope, case.pipeline(), case.options());
    let expected_count = case.expected_change_count();

    tracing::debug!(
        scenario = %case.description(),
        scope = ?scope,
        expected_changes = expected_count,
        operations = case.operations().len(),
        "scenario running"
    );

    let finished = AtomicUsize::new(0);
    let changes = async {
        let result = drain(stream, expected_count).await;
        (result, finished.fetch_add(1, Ordering::SeqCst))
    };
    let operations = async {
        let result = run_operations(operations_client, case.operations(), config.settle_delay()).await;
        (result, finished.fetch_add(1, Ordering::SeqCst))
    };

    let ((changes, changes_rank), (operations, operations_rank)) =
        tokio::join!(changes, operations);

    match (changes, operations) {
        (Ok(changes), Ok(())) => Ok(changes),
        (Err(e), Ok(())) | (Ok(_), Err(e)) => Err(e),
        (Err(read_err), Err(op_err)) => {
            if operations_rank < changes_rank {
                Err(op_err)
            } else {
                Err(read_err)
            }
        }
    }
}
