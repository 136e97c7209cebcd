//! Loading change stream spec files.
//!
//! Files are deserialized into raw serde structs first, then validated into
//! [`TestCase`]s: operation names are resolved, document arguments checked,
//! result variants and run requirements parsed. Any violation is an
//! [`Error::Config`] naming the offending test.

use std::{fmt, path::Path, str::FromStr};

use serde::Deserialize;
use serde_json::Value;

use crate::{Document, Error, Operation, OperationKind, Result, requirements::Requirements};

/// What a scenario's change stream watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Collection,
    Database,
    Client,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Target::Collection => "collection",
            Target::Database => "database",
            Target::Client => "client",
        })
    }
}

/// The declared result of a scenario.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpectedOutcome {
    /// The stream yields documents matching these shapes, in order. The
    /// number of shapes is the number of changes read.
    Success(Vec<Value>),
    /// The run fails with an error matching this shape.
    Failure(Value),
}

// ==== Raw file model ====

#[derive(Debug, Deserialize)]
struct RawSpecFile {
    database_name: String,
    #[serde(default)]
    database_name_2: Option<String>,
    collection_name: String,
    #[serde(default)]
    collection_name_2: Option<String>,
    tests: Vec<RawTest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTest {
    description: String,
    #[serde(default)]
    skip: bool,
    #[serde(default)]
    only: bool,
    #[serde(default)]
    min_server_version: Option<String>,
    #[serde(default)]
    topology: Vec<String>,
    target: Target,
    #[serde(default)]
    change_stream_pipeline: Vec<Document>,
    #[serde(default)]
    change_stream_options: Document,
    #[serde(default)]
    operations: Vec<RawOperation>,
    #[serde(default)]
    expectations: Vec<RawExpectation>,
    result: RawResult,
}

#[derive(Debug, Deserialize)]
struct RawOperation {
    database: String,
    collection: String,
    name: String,
    #[serde(default)]
    arguments: Option<RawArguments>,
}

#[derive(Debug, Deserialize)]
struct RawArguments {
    #[serde(default)]
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
struct RawExpectation {
    command_started_event: Document,
}

#[derive(Debug, Deserialize)]
struct RawResult {
    #[serde(default)]
    success: Option<Vec<Value>>,
    #[serde(default)]
    error: Option<Value>,
}

// ==== Validated model ====

/// One validated scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    description: String,
    skip: bool,
    only: bool,
    requirements: Requirements,
    target: Target,
    pipeline: Vec<Document>,
    options: Document,
    operations: Vec<Operation>,
    expected: ExpectedOutcome,
    expected_events: Vec<Document>,
}

impl TestCase {
    fn from_raw(raw: RawTest) -> Result<Self> {
        let description = raw.description;
        let in_test = |e: Error| match e {
            Error::Config(msg) => Error::Config(format!("test '{description}': {msg}")),
            other => other,
        };

        let requirements =
            Requirements::parse(raw.min_server_version.as_deref(), &raw.topology).map_err(in_test)?;

        let operations = raw
            .operations
            .into_iter()
            .map(|op| {
                let kind = op.name.parse::<OperationKind>()?;
                let document = op.arguments.and_then(|args| args.document);
                Operation::new(op.database, op.collection, kind, document)
            })
            .collect::<Result<Vec<_>>>()
            .map_err(in_test)?;

        let expected = match (raw.result.success, raw.result.error) {
            (Some(success), None) => ExpectedOutcome::Success(success),
            (None, Some(error)) => ExpectedOutcome::Failure(error),
            (Some(_), Some(_)) => {
                return Err(in_test(Error::config(
                    "result declares both success and error",
                )));
            }
            (None, None) => {
                return Err(in_test(Error::config(
                    "result declares neither success nor error",
                )));
            }
        };

        let expected_events = raw
            .expectations
            .into_iter()
            .map(|e| e.command_started_event)
            .collect();

        Ok(Self {
            description,
            skip: raw.skip,
            only: raw.only,
            requirements,
            target: raw.target,
            pipeline: raw.change_stream_pipeline,
            options: raw.change_stream_options,
            operations,
            expected,
            expected_events,
        })
    }

    #[inline]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns true if the file marks this case as skipped.
    #[inline]
    pub fn is_skipped(&self) -> bool {
        self.skip
    }

    /// Returns true if the file restricts runs to this case (and any other
    /// case flagged the same way).
    #[inline]
    pub fn is_only(&self) -> bool {
        self.only
    }

    #[inline]
    pub fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    #[inline]
    pub fn target(&self) -> Target {
        self.target
    }

    #[inline]
    pub fn pipeline(&self) -> &[Document] {
        &self.pipeline
    }

    #[inline]
    pub fn options(&self) -> &Document {
        &self.options
    }

    #[inline]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    #[inline]
    pub fn expected_outcome(&self) -> &ExpectedOutcome {
        &self.expected
    }

    #[inline]
    pub fn expected_events(&self) -> &[Document] {
        &self.expected_events
    }

    /// Number of change documents to read: the length of the success list,
    /// or one when an error is expected so the store gets to reject a read.
    pub fn expected_change_count(&self) -> usize {
        match &self.expected {
            ExpectedOutcome::Success(shapes) => shapes.len(),
            ExpectedOutcome::Failure(_) => 1,
        }
    }
}

/// A loaded spec file: fixture names plus validated scenarios.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecFile {
    database_name: String,
    database_name_2: Option<String>,
    collection_name: String,
    collection_name_2: Option<String>,
    cases: Vec<TestCase>,
}

impl SpecFile {
    /// Validate an already parsed JSON document.
    pub fn from_value(value: Value) -> Result<Self> {
        let raw: RawSpecFile = serde_json::from_value(value)?;
        Self::from_raw(raw)
    }

    /// Read and validate a spec file from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        text.parse()
    }

    fn from_raw(raw: RawSpecFile) -> Result<Self> {
        let cases = raw
            .tests
            .into_iter()
            .map(TestCase::from_raw)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            database_name: raw.database_name,
            database_name_2: raw.database_name_2,
            collection_name: raw.collection_name,
            collection_name_2: raw.collection_name_2,
            cases,
        })
    }

    #[inline]
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    #[inline]
    pub fn database_name_2(&self) -> Option<&str> {
        self.database_name_2.as_deref()
    }

    #[inline]
    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    #[inline]
    pub fn collection_name_2(&self) -> Option<&str> {
        self.collection_name_2.as_deref()
    }

    /// Databases dropped before every scenario.
    pub fn databases(&self) -> Vec<&str> {
        std::iter::once(self.database_name.as_str())
            .chain(self.database_name_2.as_deref())
            .collect()
    }

    #[inline]
    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn into_cases(self) -> Vec<TestCase> {
        self.cases
    }
}

impl FromStr for SpecFile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw: RawSpecFile = serde_json::from_str(s)?;
        Self::from_raw(raw)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::Topology;

    fn file_with(test: Value) -> Value {
        json!({
            "database_name": "change-stream-tests",
            "database_name_2": "change-stream-tests-2",
            "collection_name": "test",
            "collection_name_2": "test2",
            "tests": [test]
        })
    }

    fn minimal_test() -> Value {
        json!({
            "description": "minimal",
            "target": "collection",
            "changeStreamPipeline": [],
            "changeStreamOptions": {},
            "operations": [],
            "expectations": [],
            "result": { "success": [] }
        })
    }

    fn load_err(test: Value) -> String {
        match SpecFile::from_value(file_with(test)) {
            Err(Error::Config(msg)) => msg,
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn loads_fixture_names_and_defaults() {
        let file = SpecFile::from_value(file_with(minimal_test())).unwrap();
        assert_eq!(file.database_name(), "change-stream-tests");
        assert_eq!(file.database_name_2(), Some("change-stream-tests-2"));
        assert_eq!(file.collection_name(), "test");
        assert_eq!(file.collection_name_2(), Some("test2"));
        assert_eq!(
            file.databases(),
            vec!["change-stream-tests", "change-stream-tests-2"]
        );

        let case = &file.cases()[0];
        assert!(!case.is_skipped());
        assert!(!case.is_only());
        assert_eq!(case.target(), Target::Collection);
        assert_eq!(case.requirements(), &Requirements::default());
        assert_eq!(case.expected_change_count(), 0);
    }

    #[test]
    fn loads_operations_and_expectations() {
        let file = SpecFile::from_value(file_with(json!({
            "description": "full",
            "minServerVersion": "3.6",
            "topology": ["replicaset"],
            "target": "database",
            "changeStreamPipeline": [{ "$match": { "fullDocument.z": 3 } }],
            "changeStreamOptions": { "batchSize": 1 },
            "operations": [
                { "database": "change-stream-tests", "collection": "test",
                  "name": "insertOne", "arguments": { "document": { "z": 3 } } },
                { "database": "change-stream-tests", "collection": "test", "name": "drop" }
            ],
            "expectations": [
                { "command_started_event": { "command_name": "aggregate" } }
            ],
            "result": { "success": [{ "operationType": "insert" }] }
        })))
        .unwrap();

        let case = &file.cases()[0];
        assert_eq!(case.target(), Target::Database);
        assert_eq!(case.pipeline().len(), 1);
        assert_eq!(case.options()["batchSize"], json!(1));
        assert_eq!(case.operations().len(), 2);
        assert_eq!(case.operations()[0].kind(), OperationKind::InsertOne);
        assert_eq!(case.operations()[1].document(), None);
        assert_eq!(case.expected_events()[0]["command_name"], json!("aggregate"));
        assert_eq!(case.expected_change_count(), 1);
        assert!(case.requirements().topologies().contains(&Topology::ReplicaSet));
    }

    #[test]
    fn error_results_read_one_change() {
        let mut test = minimal_test();
        test["result"] = json!({ "error": { "code": 40573 } });
        let file = SpecFile::from_value(file_with(test)).unwrap();

        let case = &file.cases()[0];
        assert_eq!(case.expected_change_count(), 1);
        assert_eq!(
            case.expected_outcome(),
            &ExpectedOutcome::Failure(json!({ "code": 40573 }))
        );
    }

    #[test]
    fn unknown_operation_fails_at_load_time() {
        let mut test = minimal_test();
        test["operations"] = json!([
            { "database": "db", "collection": "c", "name": "renameCollection" }
        ]);
        assert_eq!(
            load_err(test),
            "test 'minimal': unknown operation 'renameCollection'"
        );
    }

    #[test]
    fn missing_document_argument_fails_at_load_time() {
        let mut test = minimal_test();
        test["operations"] = json!([
            { "database": "db", "collection": "c", "name": "insertOne", "arguments": {} }
        ]);
        assert_eq!(
            load_err(test),
            "test 'minimal': insertOne requires a document argument"
        );
    }

    #[test]
    fn result_must_declare_exactly_one_variant() {
        let mut both = minimal_test();
        both["result"] = json!({ "success": [], "error": { "code": 1 } });
        assert!(load_err(both).contains("both success and error"));

        let mut neither = minimal_test();
        neither["result"] = json!({});
        assert!(load_err(neither).contains("neither success nor error"));
    }

    #[test]
    fn unknown_target_is_a_json_error() {
        let mut test = minimal_test();
        test["target"] = json!("cluster");
        assert!(matches!(
            SpecFile::from_value(file_with(test)),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn parses_from_text() {
        let text = file_with(minimal_test()).to_string();
        let file: SpecFile = text.parse().unwrap();
        assert_eq!(file.cases().len(), 1);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            SpecFile::from_path("/nonexistent/change-streams.json"),
            Err(Error::IoError(_))
        ));
    }
}
