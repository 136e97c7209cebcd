//! Running whole spec files.
//!
//! [`SpecRunner`] connects an administrative client, then for every case
//! decides whether it runs, provisions the fixture databases, connects a fresh
//! scenario client, runs the scenario, verifies it and closes the client.
//! Cases never share a client, so one failure does not affect the next case.

use std::fmt;

use crate::{
    Config, Error, Result, StoreClient, StoreConnector, StoreResult,
    monitors::CommandTracer,
    scenario::{RunContext, run_scenario},
    spec_file::{SpecFile, TestCase},
    verify::verify,
};

// ==== Suite context ====

/// The administrative client and fixture names shared by every case of a file.
///
/// Only used between scenarios for setup, and as the client the scripted
/// operations run on.
pub struct SuiteContext<C: StoreClient> {
    admin: C,
    databases: Vec<String>,
    database_name: String,
    collection_name: String,
}

impl<C: StoreClient> SuiteContext<C> {
    pub fn new(admin: C, file: &SpecFile) -> Self {
        Self {
            admin,
            databases: file.databases().into_iter().map(str::to_owned).collect(),
            database_name: file.database_name().to_owned(),
            collection_name: file.collection_name().to_owned(),
        }
    }

    #[inline]
    pub fn admin(&self) -> &C {
        &self.admin
    }

    #[inline]
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    #[inline]
    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// Drop every fixture database, then recreate the target collection.
    pub async fn reset(&self) -> StoreResult<()> {
        for database in &self.databases {
            self.admin.drop_database(database).await?;
        }
        self.admin
            .create_collection(&self.database_name, &self.collection_name)
            .await
    }
}

impl<C: StoreClient> fmt::Debug for SuiteContext<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuiteContext")
            .field("databases", &self.databases)
            .field("collection_name", &self.collection_name)
            .finish_non_exhaustive()
    }
}

// ==== Reports ====

/// How one case ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseResult {
    Passed,
    Failed(Error),
    /// The case did not run; the reason is human readable.
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseReport {
    pub description: String,
    pub result: CaseResult,
}

/// Per-case results of one spec file, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuiteReport {
    cases: Vec<CaseReport>,
}

impl SuiteReport {
    #[inline]
    pub fn cases(&self) -> &[CaseReport] {
        &self.cases
    }

    pub fn passed(&self) -> usize {
        self.count(|r| matches!(r, CaseResult::Passed))
    }

    pub fn failed(&self) -> usize {
        self.count(|r| matches!(r, CaseResult::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|r| matches!(r, CaseResult::Skipped(_)))
    }

    /// Returns true if no case failed.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Failed cases with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.cases.iter().filter_map(|case| match &case.result {
            CaseResult::Failed(e) => Some((case.description.as_str(), e)),
            _ => None,
        })
    }

    /// Look up a case by description.
    pub fn get(&self, description: &str) -> Option<&CaseResult> {
        self.cases
            .iter()
            .find(|case| case.description == description)
            .map(|case| &case.result)
    }

    fn count(&self, pred: impl Fn(&CaseResult) -> bool) -> usize {
        self.cases.iter().filter(|case| pred(&case.result)).count()
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} skipped",
            self.passed(),
            self.failed(),
            self.skipped()
        )
    }
}

// ==== Runner ====

/// Runs spec files against clients from a [`StoreConnector`].
pub struct SpecRunner<K: StoreConnector> {
    connector: K,
    config: Config,
}

impl<K: StoreConnector> SpecRunner<K> {
    pub fn new(connector: K) -> Self {
        Self {
            connector,
            config: Config::default(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every case of `file` and report each one.
    ///
    /// Only failures to reach the store before any case runs are returned as
    /// errors; everything after that is recorded in the report.
    pub async fn run_file(&self, file: &SpecFile) -> Result<SuiteReport> {
        let admin = self.connector.connect().await?;
        admin.add_command_monitor(Box::new(CommandTracer)).await;
        let server = match admin.server_info().await {
            Ok(server) => server,
            Err(e) => {
                if let Err(close_err) = admin.close().await {
                    tracing::warn!(error = %close_err, "failed to close administrative client");
                }
                return Err(e.into());
            }
        };
        tracing::info!(
            version = %server.version,
            topology = %server.topology,
            cases = file.cases().len(),
            "running spec file"
        );

        let suite = SuiteContext::new(admin, file);
        let only = file.cases().iter().any(TestCase::is_only);
        let mut report = SuiteReport::default();

        for case in file.cases() {
            let result = if only && !case.is_only() {
                CaseResult::Skipped("not selected by only".into())
            } else if case.is_skipped() {
                CaseResult::Skipped("marked skip".into())
            } else if let Some(unmet) = case.requirements().unmet(&server) {
                CaseResult::Skipped(unmet.to_string())
            } else {
                match self.run_case(&suite, case).await {
                    Ok(()) => CaseResult::Passed,
                    Err(e) => CaseResult::Failed(e),
                }
            };

            match &result {
                CaseResult::Passed => tracing::info!(case = %case.description(), "passed"),
                CaseResult::Failed(e) => {
                    tracing::warn!(case = %case.description(), error = %e, "failed")
                }
                CaseResult::Skipped(reason) => {
                    tracing::info!(case = %case.description(), %reason, "skipped")
                }
            }
            report.cases.push(CaseReport {
                description: case.description().to_owned(),
                result,
            });
        }

        suite.admin.close().await?;
        tracing::info!(%report, "spec file finished");
        Ok(report)
    }

    /// Provision, run, verify and tear down a single case.
    ///
    /// The scenario client is closed whatever the outcome; a verification
    /// failure is reported in preference to a failure to close.
    pub async fn run_case(&self, suite: &SuiteContext<K::Client>, case: &TestCase) -> Result {
        tracing::info!(case = %case.description(), target = %case.target(), "running");
        suite.reset().await?;

        let client = self.connector.connect().await?;
        let mut ctx = RunContext::new(client, suite.database_name(), suite.collection_name()).await;
        ctx.client().add_command_monitor(Box::new(CommandTracer)).await;

        let outcome = run_scenario(&ctx, suite.admin(), case, &self.config).await;
        let verdict = verify(
            &outcome,
            ctx.recorded_events(),
            case.expected_outcome(),
            case.expected_events(),
            &self.config,
        );
        let closed = ctx.close().await;

        verdict?;
        closed.map_err(Error::from)
    }
}

impl<K: StoreConnector> fmt::Debug for SpecRunner<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecRunner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, feature = "memory-store"))]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use serde_json::json;

    use super::*;
    use crate::{
        Document, ServerInfo, StoreError, Topology, WatchScope, memory::MemoryServer,
        monitoring::CommandMonitor,
    };

    const FIXTURE: &str = include_str!("../fixtures/change-streams.json");

    fn runner(server: &MemoryServer) -> SpecRunner<crate::memory::MemoryConnector> {
        SpecRunner::new(server.connector())
            .with_config(Config::default().with_settle_delay(Duration::from_millis(10)))
    }

    fn fixture() -> SpecFile {
        FIXTURE.parse().unwrap()
    }

    fn file_with(tests: serde_json::Value) -> SpecFile {
        SpecFile::from_value(json!({
            "database_name": "change-stream-tests",
            "database_name_2": "change-stream-tests-2",
            "collection_name": "test",
            "tests": tests
        }))
        .unwrap()
    }

    fn insert_test(description: &str) -> serde_json::Value {
        json!({
            "description": description,
            "target": "collection",
            "changeStreamPipeline": [],
            "changeStreamOptions": {},
            "operations": [
                { "database": "change-stream-tests", "collection": "test",
                  "name": "insertOne", "arguments": { "document": { "x": 1 } } }
            ],
            "expectations": [],
            "result": { "success": [{ "operationType": "insert" }] }
        })
    }

    #[tokio::test]
    async fn fixture_passes_on_a_replica_set() {
        let server = MemoryServer::new();
        let report = runner(&server).run_file(&fixture()).await.unwrap();

        let failures: Vec<_> = report.failures().collect();
        assert!(failures.is_empty(), "{failures:?}");
        assert!(report.passed() > 0);
        // The single-server and sharded cases do not apply to a replica set.
        assert_eq!(report.skipped(), 2);
    }

    #[tokio::test]
    async fn fixture_passes_on_a_single_server() {
        let server = MemoryServer::new().with_topology(Topology::Single);
        let report = runner(&server).run_file(&fixture()).await.unwrap();

        assert!(report.is_success(), "{report}");
        assert_eq!(report.passed(), 1);
        assert_eq!(
            report.get(
                "The watch helper must not throw a custom exception when executed against a \
                 single server topology, but instead depend on a server error"
            ),
            Some(&CaseResult::Passed)
        );
    }

    #[tokio::test]
    async fn old_servers_skip_version_gated_cases() {
        let server = MemoryServer::new().with_version(semver::Version::new(3, 6, 0));
        let report = runner(&server).run_file(&fixture()).await.unwrap();

        assert!(report.is_success(), "{report}");
        let database_case = report
            .get(
                "Executing a watch helper on a Database results in notifications for changes \
                 to all collections in the specified database.",
            )
            .unwrap();
        assert!(
            matches!(database_case, CaseResult::Skipped(reason) if reason.contains(">= 3.8.0"))
        );
    }

    #[tokio::test]
    async fn only_restricts_the_file() {
        let mut selected = insert_test("selected");
        selected["only"] = json!(true);
        let file = file_with(json!([insert_test("first"), selected, insert_test("last")]));

        let report = runner(&MemoryServer::new()).run_file(&file).await.unwrap();
        assert_eq!(report.get("selected"), Some(&CaseResult::Passed));
        assert_eq!(
            report.get("first"),
            Some(&CaseResult::Skipped("not selected by only".into()))
        );
        assert_eq!(report.skipped(), 2);
    }

    #[tokio::test]
    async fn skip_flag_is_honoured() {
        let mut skipped = insert_test("skipped");
        skipped["skip"] = json!(true);
        let file = file_with(json!([skipped]));

        let report = runner(&MemoryServer::new()).run_file(&file).await.unwrap();
        assert_eq!(
            report.get("skipped"),
            Some(&CaseResult::Skipped("marked skip".into()))
        );
    }

    #[tokio::test]
    async fn a_failing_case_does_not_affect_the_next() {
        let mut wrong = insert_test("wrong");
        wrong["result"] = json!({ "success": [{ "operationType": "delete" }] });
        let file = file_with(json!([wrong, insert_test("right")]));

        let report = runner(&MemoryServer::new()).run_file(&file).await.unwrap();
        assert!(matches!(
            report.get("wrong"),
            Some(CaseResult::Failed(Error::Mismatch(_)))
        ));
        assert_eq!(report.get("right"), Some(&CaseResult::Passed));
        assert_eq!(report.to_string(), "1 passed, 1 failed, 0 skipped");
    }

    #[tokio::test]
    async fn each_case_starts_from_clean_databases() {
        let server = MemoryServer::new();
        let mut test = insert_test("fixed id");
        test["operations"][0]["arguments"]["document"] = json!({ "_id": 1 });
        let file = file_with(json!([test.clone(), test]));

        let report = runner(&server).run_file(&file).await.unwrap();
        assert_eq!(report.passed(), 2, "{report}");
    }

    #[tokio::test]
    async fn unexpected_errors_fail_with_the_store_error() {
        let mut test = insert_test("duplicate");
        test["operations"] = json!([
            { "database": "change-stream-tests", "collection": "test",
              "name": "insertOne", "arguments": { "document": { "_id": 1 } } },
            { "database": "change-stream-tests", "collection": "test",
              "name": "insertOne", "arguments": { "document": { "_id": 1 } } }
        ]);
        let file = file_with(json!([test]));

        let report = runner(&MemoryServer::new()).run_file(&file).await.unwrap();
        let Some(CaseResult::Failed(err)) = report.get("duplicate") else {
            panic!("expected failure: {report:?}");
        };
        assert_eq!(err.as_store_error().and_then(|e| e.code()), Some(11000));
    }

    /// Delegates to a memory client but cannot report server info.
    struct NoInfoClient {
        inner: crate::memory::MemoryClient,
        closes: Arc<AtomicUsize>,
    }

    impl StoreClient for NoInfoClient {
        type Collection = crate::memory::MemoryCollection;
        type ChangeStream = crate::memory::MemoryChangeStream;

        fn collection(&self, database: &str, collection: &str) -> Self::Collection {
            self.inner.collection(database, collection)
        }

        fn watch(
            &self,
            scope: &WatchScope,
            pipeline: &[Document],
            options: &Document,
        ) -> Self::ChangeStream {
            self.inner.watch(scope, pipeline, options)
        }

        async fn add_command_monitor(&self, monitor: Box<dyn CommandMonitor>) {
            self.inner.add_command_monitor(monitor).await
        }

        async fn drop_database(&self, name: &str) -> StoreResult<()> {
            self.inner.drop_database(name).await
        }

        async fn create_collection(&self, database: &str, collection: &str) -> StoreResult<()> {
            self.inner.create_collection(database, collection).await
        }

        async fn server_info(&self) -> StoreResult<ServerInfo> {
            Err(StoreError::new("handshake failed"))
        }

        async fn close(&self) -> StoreResult<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.inner.close().await
        }
    }

    struct NoInfoConnector {
        server: MemoryServer,
        closes: Arc<AtomicUsize>,
    }

    impl StoreConnector for NoInfoConnector {
        type Client = NoInfoClient;

        async fn connect(&self) -> StoreResult<NoInfoClient> {
            Ok(NoInfoClient {
                inner: self.server.client(),
                closes: self.closes.clone(),
            })
        }
    }

    #[tokio::test]
    async fn admin_client_is_closed_when_server_info_fails() {
        let closes = Arc::new(AtomicUsize::new(0));
        let connector = NoInfoConnector {
            server: MemoryServer::new(),
            closes: closes.clone(),
        };

        let err = SpecRunner::new(connector).run_file(&fixture()).await.unwrap_err();
        assert_eq!(err.to_string(), "handshake failed");
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
