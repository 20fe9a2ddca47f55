//! Column definitions and the built-in system columns.

use super::types::{SqlType, Value};
use std::fmt;

/// Names of the built-in columns.
pub mod system {
    /// Primary-key row identifier.
    pub const ID: &str = "Id";
    /// Version token regenerated on every committed write.
    pub const ETAG: &str = "Etag";
    /// Creation timestamp.
    pub const CREATED_AT: &str = "CreatedAt";
    /// Last modification timestamp.
    pub const MODIFIED_AT: &str = "ModifiedAt";
    /// Serialized document payload.
    pub const DOCUMENT: &str = "Document";
    /// Concrete document type tag.
    pub const DISCRIMINATOR: &str = "Discriminator";
    /// Document schema version.
    pub const VERSION: &str = "Version";
    /// Last write operation applied to the row.
    pub const LAST_OPERATION: &str = "LastOperation";
    /// Set when projected columns are stale and must be recomputed.
    pub const AWAITS_REPROJECTION: &str = "AwaitsReprojection";

    /// Parameter names used by commands besides column names.
    pub const RESERVED_PARAMETERS: &[&str] = &["NewId", "ExpectedEtag", "UpdateOperation"];
}

/// Kind of the last write applied to a document row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum Operation {
    /// Row was inserted.
    Inserted = 1,
    /// Row was updated.
    Updated = 2,
    /// Row was deleted and renamed to a tombstone.
    Deleted = 3,
}

impl Operation {
    /// Stored representation.
    pub fn code(self) -> i64 {
        self as i64
    }

    /// Decode a stored operation code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Operation::Inserted),
            2 => Some(Operation::Updated),
            3 => Some(Operation::Deleted),
            _ => None,
        }
    }
}

impl From<Operation> for Value {
    fn from(op: Operation) -> Self {
        Value::Integer(op.code())
    }
}

/// A column definition: name plus its physical mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Physical type.
    pub sql_type: SqlType,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Default value applied by the store when none is given.
    pub default: Option<Value>,
    /// Whether the column is the primary key.
    pub primary_key: bool,
}

impl Column {
    /// Create a nullable column without a default.
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: true,
            default: None,
            primary_key: false,
        }
    }

    /// Disallow NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Mark as primary key (implies NOT NULL).
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Render the column clause used by CREATE TABLE and ADD COLUMN.
    pub fn definition(&self) -> String {
        let mut sql = format!("\"{}\" {}", self.name, self.sql_type);

        if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default.to_sql_literal());
        }
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        }

        sql
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.definition())
    }
}

/// Columns every table carries.
pub(crate) fn table_system_columns() -> Vec<Column> {
    vec![
        Column::new(system::ID, SqlType::VarChar(255)).primary_key(),
        Column::new(system::ETAG, SqlType::Uuid).not_null(),
        Column::new(system::CREATED_AT, SqlType::DateTime).not_null(),
        Column::new(system::MODIFIED_AT, SqlType::DateTime).not_null(),
    ]
}

/// Columns document tables carry in addition to the table system columns.
pub(crate) fn document_system_columns() -> Vec<Column> {
    vec![
        Column::new(system::DOCUMENT, SqlType::Blob),
        Column::new(system::DISCRIMINATOR, SqlType::VarChar(255)),
        Column::new(system::VERSION, SqlType::Integer)
            .not_null()
            .with_default(0i64),
        Column::new(system::LAST_OPERATION, SqlType::Integer)
            .not_null()
            .with_default(Operation::Inserted),
        Column::new(system::AWAITS_REPROJECTION, SqlType::Boolean)
            .not_null()
            .with_default(false),
    ]
}

/// Check whether a name is one of the built-in columns.
pub fn is_system_column(name: &str) -> bool {
    table_system_columns()
        .iter()
        .chain(document_system_columns().iter())
        .any(|c| c.name == name)
}

/// Check that a column name is a plain identifier safe to quote and to use in
/// parameter names.
pub(crate) fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
