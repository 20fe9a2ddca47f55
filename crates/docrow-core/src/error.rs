//! Core error types.

use crate::store::StoreError;
use thiserror::Error;

/// Errors raised by the schema, command and migration layers.
#[derive(Debug, Error)]
pub enum Error {
    /// Two incompatible registrations of the same column.
    #[error("schema conflict on {table}.{column}: existing `{existing}`, attempted `{attempted}`")]
    SchemaConflict {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Definition already registered.
        existing: String,
        /// Definition that was rejected.
        attempted: String,
    },

    /// A planned operation would destroy data and was not authorized.
    #[error("unsafe migration rejected: {operation} (enable allow_unsafe to run it)")]
    UnsafeMigrationRejected {
        /// Description of the rejected operation.
        operation: String,
    },

    /// A statement affected a different number of rows than it declared.
    #[error(
        "concurrency conflict in statement {index}: expected {expected} affected rows, got {actual}"
    )]
    ConcurrencyConflict {
        /// Position of the statement in its batch.
        index: usize,
        /// Declared row count.
        expected: u64,
        /// Actual row count.
        actual: u64,
    },

    /// A batch binds too many parameters.
    #[error("batch binds {count} parameters, the limit is {limit}; split it into smaller batches")]
    ParameterLimitExceeded {
        /// Parameters in the batch.
        count: usize,
        /// Ceiling.
        limit: usize,
    },

    /// A row does not satisfy a document migration's precondition.
    #[error(
        "version gap in {table}/{id}: found version {found}, migration expects {expected}; a prerequisite migration was skipped"
    )]
    VersionGap {
        /// Table name.
        table: String,
        /// Row identifier.
        id: String,
        /// Stored version.
        found: i64,
        /// Version the migration requires.
        expected: i64,
    },

    /// Backing-store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O failure outside the store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No design is registered under the given name or discriminator.
    #[error("unknown document design: {0}")]
    UnknownDesign(String),

    /// No live row with the given identifier.
    #[error("document not found: {table}/{id}")]
    NotFound {
        /// Table name.
        table: String,
        /// Row identifier.
        id: String,
    },

    /// A document migration transform failed.
    #[error("document transform failed: {0}")]
    Transform(String),
}

impl Error {
    /// Check if this is an optimistic-concurrency conflict.
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Error::ConcurrencyConflict { .. })
    }

    /// Check if retrying the same work may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Store(e) if e.is_transient())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ConcurrencyConflict {
            index: 2,
            expected: 1,
            actual: 0,
        };
        assert!(err.to_string().contains("expected 1 affected rows, got 0"));
        assert!(err.is_concurrency_conflict());
        assert!(!err.is_transient());

        let err = Error::VersionGap {
            table: "Cars".into(),
            id: "c1".into(),
            found: 0,
            expected: 1,
        };
        assert!(err.to_string().contains("Cars/c1"));
    }
}
