//! Backing store abstraction.
//!
//! The document layer talks to the relational store only through
//! [`BackingStore`] and the [`StoreTransaction`] handles it opens. Every
//! statement binds named parameters (`@Name`) so the same command text can be
//! reused with different values.

mod sqlite;

pub use sqlite::{SqliteStore, DEFAULT_BUSY_TIMEOUT};

use crate::schema::{SqlType, Value};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite failure.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A statement references a parameter that was not bound, or binds one it
    /// does not reference.
    #[error("unknown statement parameter @{0}")]
    UnknownParameter(String),

    /// Any other store failure.
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Check if the failure is a lock or busy condition worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Sqlite(e) => matches!(
                e.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }
}

/// Transaction isolation requested from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    /// Statements see committed data; writers take locks lazily.
    ReadCommitted,
    /// The transaction is serialized against every other writer.
    Serializable,
}

/// A named statement parameter. The name excludes the `@` prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Parameter name.
    pub name: String,
    /// Bound value.
    pub value: Value,
}

impl Parameter {
    /// Create a parameter.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A statement ready to execute, with the row count it must affect.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedCommand {
    /// Statement text.
    pub sql: String,
    /// Bound parameters.
    pub parameters: Vec<Parameter>,
    /// Rows the statement must affect, if checked.
    pub expected_rows: Option<u64>,
}

/// A result row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    /// Column names.
    pub columns: Vec<String>,
    /// Values, aligned with `columns`.
    pub values: Vec<Value>,
}

impl Row {
    /// Look up a value by column name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    /// Read a text column.
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    /// Read an integer column.
    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    /// Read a binary column.
    pub fn get_bytes(&self, column: &str) -> Option<&[u8]> {
        self.get(column).and_then(Value::as_bytes)
    }
}

/// One column as reported by the live catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogColumn {
    /// Table name.
    pub table: String,
    /// Column name.
    pub name: String,
    /// Declared type.
    pub sql_type: SqlType,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Default expression, verbatim.
    pub default: Option<String>,
    /// Whether the column is part of the primary key.
    pub primary_key: bool,
}

/// An open transaction. Dropping it without committing rolls it back.
pub trait StoreTransaction {
    /// Execute one statement and return the affected row count.
    fn execute(&mut self, sql: &str, parameters: &[Parameter]) -> Result<u64, StoreError>;

    /// Execute statements in order, returning each statement's affected row
    /// count. Stops at the first failing statement.
    fn execute_batch(&mut self, commands: &[PreparedCommand]) -> Result<Vec<u64>, StoreError> {
        commands
            .iter()
            .map(|c| self.execute(&c.sql, &c.parameters))
            .collect()
    }

    /// Run a query.
    fn query(&mut self, sql: &str, parameters: &[Parameter]) -> Result<Vec<Row>, StoreError>;

    /// Read the live catalog: every user table with its columns.
    fn introspect(&mut self) -> Result<Vec<CatalogColumn>, StoreError>;

    /// Bound how long a single statement may wait on locks.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), StoreError>;

    /// Commit.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Roll back.
    fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// A relational store that hands out transactions.
pub trait BackingStore: Send + Sync {
    /// Open a transaction.
    fn begin(&self, isolation: Isolation) -> Result<Box<dyn StoreTransaction + '_>, StoreError>;

    /// Run a query in its own read-committed transaction.
    fn query(&self, sql: &str, parameters: &[Parameter]) -> Result<Vec<Row>, StoreError> {
        let mut tx = self.begin(Isolation::ReadCommitted)?;
        let rows = tx.query(sql, parameters)?;
        tx.commit()?;
        Ok(rows)
    }

    /// Read the live catalog in its own transaction.
    fn introspect(&self) -> Result<Vec<CatalogColumn>, StoreError> {
        let mut tx = self.begin(Isolation::ReadCommitted)?;
        let columns = tx.introspect()?;
        tx.commit()?;
        Ok(columns)
    }
}
