//! Structural schema changes and their safety classification.

use crate::schema::{Column, Table};
use std::fmt;

/// One structural change to the live schema.
#[derive(Debug, Clone, PartialEq)]
pub enum DdlOperation {
    /// Create a table with its full column set.
    CreateTable(Table),
    /// Add a column to an existing table.
    AddColumn {
        /// Table name.
        table: String,
        /// Column to add.
        column: Column,
        /// Existing rows must be re-projected to populate the column.
        requires_reprojection: bool,
    },
    /// Rename a table.
    RenameTable {
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Rename a column.
    RenameColumn {
        /// Table name.
        table: String,
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Drop a table and all its rows.
    RemoveTable {
        /// Table name.
        table: String,
    },
    /// Drop a column and its data.
    RemoveColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// Hand-written SQL.
    Sql {
        /// Statement text.
        sql: String,
        /// Whether the statement can destroy data.
        is_unsafe: bool,
    },
}

impl DdlOperation {
    /// Add a column that needs existing rows re-projected.
    pub fn add_column(table: impl Into<String>, column: Column) -> Self {
        DdlOperation::AddColumn {
            table: table.into(),
            column,
            requires_reprojection: true,
        }
    }

    /// Rename a table.
    pub fn rename_table(from: impl Into<String>, to: impl Into<String>) -> Self {
        DdlOperation::RenameTable {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Rename a column.
    pub fn rename_column(
        table: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        DdlOperation::RenameColumn {
            table: table.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    /// Drop a table.
    pub fn remove_table(table: impl Into<String>) -> Self {
        DdlOperation::RemoveTable {
            table: table.into(),
        }
    }

    /// Drop a column.
    pub fn remove_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        DdlOperation::RemoveColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Hand-written SQL that only adds structure.
    pub fn sql(sql: impl Into<String>) -> Self {
        DdlOperation::Sql {
            sql: sql.into(),
            is_unsafe: false,
        }
    }

    /// Hand-written SQL that may destroy data.
    pub fn unsafe_sql(sql: impl Into<String>) -> Self {
        DdlOperation::Sql {
            sql: sql.into(),
            is_unsafe: true,
        }
    }

    /// The table this operation targets, if it targets one.
    pub fn table(&self) -> Option<&str> {
        match self {
            DdlOperation::CreateTable(table) => Some(table.name()),
            DdlOperation::AddColumn { table, .. }
            | DdlOperation::RenameColumn { table, .. }
            | DdlOperation::RemoveTable { table }
            | DdlOperation::RemoveColumn { table, .. } => Some(table),
            DdlOperation::RenameTable { from, .. } => Some(from),
            DdlOperation::Sql { .. } => None,
        }
    }

    /// Check whether the operation can destroy data.
    pub fn is_unsafe(&self) -> bool {
        match self {
            DdlOperation::RemoveTable { .. } | DdlOperation::RemoveColumn { .. } => true,
            DdlOperation::Sql { is_unsafe, .. } => *is_unsafe,
            _ => false,
        }
    }

    /// The table whose rows must be re-projected after this operation.
    pub fn requires_reprojection(&self) -> Option<&str> {
        match self {
            DdlOperation::AddColumn {
                table,
                requires_reprojection: true,
                ..
            } => Some(table),
            _ => None,
        }
    }

    /// SQL statements implementing the operation, in execution order.
    pub fn statements(&self) -> Vec<String> {
        match self {
            DdlOperation::CreateTable(table) => {
                let columns = table
                    .columns()
                    .iter()
                    .map(Column::definition)
                    .collect::<Vec<_>>()
                    .join(", ");
                vec![format!(
                    "CREATE TABLE IF NOT EXISTS \"{}\" ({columns})",
                    table.name()
                )]
            }
            DdlOperation::AddColumn { table, column, .. } => vec![format!(
                "ALTER TABLE \"{table}\" ADD COLUMN {}",
                column.definition()
            )],
            DdlOperation::RenameTable { from, to } => {
                vec![format!("ALTER TABLE \"{from}\" RENAME TO \"{to}\"")]
            }
            DdlOperation::RenameColumn { table, from, to } => vec![format!(
                "ALTER TABLE \"{table}\" RENAME COLUMN \"{from}\" TO \"{to}\""
            )],
            DdlOperation::RemoveTable { table } => {
                vec![format!("DROP TABLE IF EXISTS \"{table}\"")]
            }
            DdlOperation::RemoveColumn { table, column } => {
                vec![format!("ALTER TABLE \"{table}\" DROP COLUMN \"{column}\"")]
            }
            DdlOperation::Sql { sql, .. } => vec![sql.clone()],
        }
    }
}

impl fmt::Display for DdlOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DdlOperation::CreateTable(table) => write!(f, "create table '{}'", table.name()),
            DdlOperation::AddColumn { table, column, .. } => {
                write!(f, "add column '{}.{}' ({})", table, column.name, column.sql_type)
            }
            DdlOperation::RenameTable { from, to } => {
                write!(f, "rename table '{from}' to '{to}'")
            }
            DdlOperation::RenameColumn { table, from, to } => {
                write!(f, "rename column '{table}.{from}' to '{to}'")
            }
            DdlOperation::RemoveTable { table } => write!(f, "remove table '{table}'"),
            DdlOperation::RemoveColumn { table, column } => {
                write!(f, "remove column '{table}.{column}'")
            }
            DdlOperation::Sql { sql, .. } => write!(f, "sql `{sql}`"),
        }
    }
}

/// An ordered set of hand-authored operations run once, before the automatic
/// pass, when the database is below `version`.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaMigration {
    /// Schema version reached once applied.
    pub version: u32,
    /// Operations in execution order.
    pub operations: Vec<DdlOperation>,
}

impl SchemaMigration {
    /// Create an empty migration.
    pub fn new(version: u32) -> Self {
        Self {
            version,
            operations: Vec::new(),
        }
    }

    /// Append an operation.
    pub fn with(mut self, operation: DdlOperation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Check whether any operation can destroy data.
    pub fn is_unsafe(&self) -> bool {
        self.operations.iter().any(DdlOperation::is_unsafe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SqlType;

    #[test]
    fn test_safety_flags() {
        let create = DdlOperation::CreateTable(Table::document("Cars"));
        assert!(!create.is_unsafe());
        assert_eq!(create.requires_reprojection(), None);

        let add = DdlOperation::add_column("Cars", Column::new("Wheels", SqlType::Integer));
        assert!(!add.is_unsafe());
        assert_eq!(add.requires_reprojection(), Some("Cars"));

        assert!(!DdlOperation::rename_table("Cars", "Autos").is_unsafe());
        assert!(!DdlOperation::rename_column("Cars", "A", "B").is_unsafe());
        assert!(DdlOperation::remove_table("Cars").is_unsafe());
        assert!(DdlOperation::remove_column("Cars", "Wheels").is_unsafe());
        assert!(DdlOperation::unsafe_sql("DELETE FROM Cars").is_unsafe());
        assert!(!DdlOperation::sql("CREATE INDEX i ON Cars(Wheels)").is_unsafe());
    }

    #[test]
    fn test_create_table_is_idempotent_sql() {
        let statements = DdlOperation::CreateTable(Table::new("Audit")).statements();

        assert_eq!(statements.len(), 1);
        assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS \"Audit\" ("));
        assert!(statements[0].contains("\"Id\" VARCHAR(255) NOT NULL PRIMARY KEY"));
    }

    #[test]
    fn test_add_column_sql() {
        let op = DdlOperation::add_column("Cars", Column::new("Wheels", SqlType::Integer));
        assert_eq!(
            op.statements(),
            vec!["ALTER TABLE \"Cars\" ADD COLUMN \"Wheels\" INTEGER".to_string()]
        );
        assert_eq!(op.to_string(), "add column 'Cars.Wheels' (INTEGER)");
    }

    #[test]
    fn test_schema_migration_safety() {
        let migration = SchemaMigration::new(1)
            .with(DdlOperation::rename_table("Car", "Cars"))
            .with(DdlOperation::remove_column("Cars", "Legacy"));

        assert!(migration.is_unsafe());
        assert!(!SchemaMigration::new(2)
            .with(DdlOperation::rename_table("A", "B"))
            .is_unsafe());
    }
}
