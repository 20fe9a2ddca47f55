//! Live catalog snapshot.

use super::METADATA_TABLE;
use crate::error::Result;
use crate::store::{CatalogColumn, StoreTransaction};
use std::collections::BTreeMap;

/// The live schema: table name to its columns in catalog order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveSchema {
    tables: BTreeMap<String, Vec<CatalogColumn>>,
}

impl LiveSchema {
    /// Group catalog rows by table. Internal bookkeeping tables are left out.
    pub fn from_catalog(columns: impl IntoIterator<Item = CatalogColumn>) -> Self {
        let mut tables: BTreeMap<String, Vec<CatalogColumn>> = BTreeMap::new();
        for column in columns {
            if column.table == METADATA_TABLE {
                continue;
            }
            tables.entry(column.table.clone()).or_default().push(column);
        }
        Self { tables }
    }

    /// Check whether a table exists.
    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Columns of a table.
    pub fn columns(&self, table: &str) -> Option<&[CatalogColumn]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    /// Look up one column.
    pub fn column(&self, table: &str, column: &str) -> Option<&CatalogColumn> {
        self.columns(table)?.iter().find(|c| c.name == column)
    }

    /// Table names, sorted.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Check whether there are no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Reads the live catalog inside the caller's transaction.
pub struct SchemaInspector;

impl SchemaInspector {
    /// Snapshot the live schema.
    pub fn inspect(tx: &mut dyn StoreTransaction) -> Result<LiveSchema> {
        Ok(LiveSchema::from_catalog(tx.introspect()?))
    }
}
