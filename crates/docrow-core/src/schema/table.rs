//! Table definitions.

use super::column::{document_system_columns, table_system_columns, Column};
use crate::error::{Error, Result};

/// Whether a table stores documents or plain rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Only the table system columns.
    Plain,
    /// Document payload, discriminator, version and projections.
    Document,
}

/// A table definition with an ordered set of columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    kind: TableKind,
    columns: Vec<Column>,
}

impl Table {
    /// Create a plain table carrying the built-in system columns.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TableKind::Plain,
            columns: table_system_columns(),
        }
    }

    /// Create a document table.
    pub fn document(name: impl Into<String>) -> Self {
        let mut columns = table_system_columns();
        columns.extend(document_system_columns());

        Self {
            name: name.into(),
            kind: TableKind::Document,
            columns,
        }
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table kind.
    pub fn kind(&self) -> TableKind {
        self.kind
    }

    /// Check if this is a document table.
    pub fn is_document(&self) -> bool {
        self.kind == TableKind::Document
    }

    /// Columns in registration order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Register a column.
    ///
    /// Registering a column identical to an existing one is a no-op. A
    /// different definition under the same name is a schema conflict.
    pub fn register(&mut self, column: Column) -> Result<()> {
        match self.column(&column.name) {
            Some(existing) if *existing == column => Ok(()),
            Some(existing) => Err(Error::SchemaConflict {
                table: self.name.clone(),
                column: column.name.clone(),
                existing: existing.definition(),
                attempted: column.definition(),
            }),
            None => {
                self.columns.push(column);
                Ok(())
            }
        }
    }

    /// Builder form of [`Table::register`].
    pub fn with_column(mut self, column: Column) -> Result<Self> {
        self.register(column)?;
        Ok(self)
    }
}
