use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Document;

/// A `commandStarted` monitoring record, emitted by a client immediately
/// before a command is sent to the store.
///
/// Field names follow the client's snake_case convention; fixtures use
/// camelCase, see [`normalize`](crate::monitoring::normalize).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandStartedEvent {
    pub command_name: String,
    pub database_name: String,
    pub command: Document,
    pub request_id: i64,
    pub connection_id: String,
}

impl CommandStartedEvent {
    pub fn new(
        command_name: impl Into<String>,
        database_name: impl Into<String>,
        command: Document,
    ) -> Self {
        Self {
            command_name: command_name.into(),
            database_name: database_name.into(),
            command,
            request_id: 0,
            connection_id: String::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: i64) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_connection_id(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = connection_id.into();
        self
    }

    /// The raw record as a document, keyed as the client names its fields.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert("command_name".into(), Value::from(self.command_name.as_str()));
        doc.insert(
            "database_name".into(),
            Value::from(self.database_name.as_str()),
        );
        doc.insert("command".into(), Value::Object(self.command.clone()));
        doc.insert("request_id".into(), Value::from(self.request_id));
        doc.insert(
            "connection_id".into(),
            Value::from(self.connection_id.as_str()),
        );
        doc
    }
}
