use std::fmt;

use serde_json::{Value, json};

use crate::Document;

/// An error reported by the store client.
///
/// The interpreter never interprets these beyond matching them against a
/// declared error shape, so the fields mirror what a server reply carries:
/// a numeric code, its symbolic name, a message and error labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    code: Option<i32>,
    code_name: Option<String>,
    message: String,
    labels: Vec<String>,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            code_name: None,
            message: message.into(),
            labels: Vec::new(),
        }
    }

    /// Build a server error with a code and its symbolic name.
    pub fn server(code: i32, code_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            code_name: Some(code_name.into()),
            message: message.into(),
            labels: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    #[inline]
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    #[inline]
    pub fn code_name(&self) -> Option<&str> {
        self.code_name.as_deref()
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[inline]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// The document an expected error shape is matched against.
    ///
    /// Carries both `message` and `errmsg` so fixtures written against either
    /// reply style match. Absent code and code name are omitted rather than
    /// set to null.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert("ok".into(), json!(0));
        if let Some(code) = self.code {
            doc.insert("code".into(), json!(code));
        }
        if let Some(code_name) = &self.code_name {
            doc.insert("codeName".into(), json!(code_name));
        }
        doc.insert("message".into(), json!(self.message));
        doc.insert("errmsg".into(), json!(self.message));
        if !self.labels.is_empty() {
            doc.insert("errorLabels".into(), json!(self.labels));
        }
        doc
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.to_document())
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, &self.code_name) {
            (Some(code), Some(name)) => write!(f, "{} ({name}, code {code})", self.message),
            (Some(code), None) => write!(f, "{} (code {code})", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for StoreError {}

/// Convenience alias for store client results.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
