use std::sync::Arc;

use crate::{StoreError, matcher::MismatchError};

/// The single error type for all watchspec operations.
///
/// Every fallible API returns `watchspec::Result<T>` (alias for
/// `Result<T, watchspec::Error>`). Verification failures, store errors and
/// loading errors all map into variants of this enum.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Mismatch(#[from] MismatchError),

    #[error("expected event at index {0} but none recorded")]
    MissingEvent(usize),

    #[error("expected error but got success")]
    UnexpectedSuccess,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid spec: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[source] Arc<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(#[source] Arc<serde_json::Error>),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Returns the store error when this error passed through from the client.
    pub fn as_store_error(&self) -> Option<&StoreError> {
        match self {
            Error::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Mismatch(a), Self::Mismatch(b)) => a == b,
            (Self::MissingEvent(a), Self::MissingEvent(b)) => a == b,
            (Self::UnexpectedSuccess, Self::UnexpectedSuccess) => true,
            (Self::Store(a), Self::Store(b)) => a == b,
            (Self::Config(a), Self::Config(b)) => a == b,
            (Self::IoError(a), Self::IoError(b)) => Arc::ptr_eq(a, b),
            (Self::Json(a), Self::Json(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(Arc::new(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(Arc::new(e))
    }
}
