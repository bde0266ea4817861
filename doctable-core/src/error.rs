//! Error types and result types for table operations.
//!
//! Every fallible operation in this crate returns [`TableResult<T>`]. The variants of
//! [`TableError`] follow three rules:
//!
//! - [`TableError::Precondition`] is raised before any call reaches the backend.
//! - [`TableError::CollectionAlreadyExists`] is the only failure the provisioner recovers from.
//! - Everything the store reports is passed through without retries.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a table.
#[derive(Error, Debug)]
pub enum TableError {
    /// A required argument was missing or out of range. No I/O was issued.
    #[error("Precondition failed: {0}")]
    Precondition(String),
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during backend initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The collection being created already exists.
    #[error("Collection already exists: {0}")]
    CollectionAlreadyExists(String),
    /// A document with the given identifier already exists in the collection.
    /// The first argument is the identifier, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// The store rejected the shape of a document or update.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for table operations.
pub type TableResult<T> = Result<T, TableError>;

impl TableError {
    /// Shorthand for building a [`TableError::Precondition`].
    pub fn precondition(message: impl Into<String>) -> Self {
        TableError::Precondition(message.into())
    }

    /// Returns `true` if this error reports a duplicate identifier.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, TableError::DocumentAlreadyExists(..))
    }

    /// Returns `true` if this error was raised before any I/O was issued.
    pub fn is_precondition(&self) -> bool {
        matches!(self, TableError::Precondition(_))
    }
}

impl From<BsonError> for TableError {
    fn from(err: BsonError) -> Self {
        TableError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for TableError {
    fn from(err: SerdeJsonError) -> Self {
        TableError::Serialization(err.to_string())
    }
}
