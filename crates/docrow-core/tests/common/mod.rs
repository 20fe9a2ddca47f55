//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use docrow_core::schema::{Column, SqlType, Value};
use docrow_core::store::Row;
use docrow_core::{BackingStore, Configuration, DocumentStore, SqliteStore, StoreConfig};
use std::sync::Arc;

/// A `Vehicles` table holding `Vehicle` documents and their `Car` subtype.
pub fn vehicles() -> Configuration {
    let mut config = Configuration::new();
    config
        .document("Vehicle")
        .table("Vehicles")
        .project(Column::new("Wheels", SqlType::Integer), |doc| {
            Value::from(doc["wheels"].as_i64())
        });
    config
        .document("Car")
        .extends("Vehicle")
        .project(Column::new("Brand", SqlType::VarChar(64)), |doc| {
            Value::from(doc["brand"].as_str())
        });
    config
}

/// One in-memory database shared by any number of document stores.
pub struct TestContext {
    pub backing: Arc<SqliteStore>,
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            backing: Arc::new(SqliteStore::open_in_memory().unwrap()),
        }
    }

    /// A store over the shared database. Not initialized.
    pub fn store(&self, config: Configuration) -> DocumentStore {
        self.store_with(config, StoreConfig::default())
    }

    pub fn store_with(&self, config: Configuration, store_config: StoreConfig) -> DocumentStore {
        DocumentStore::new(self.backing.clone(), config.build().unwrap(), store_config)
    }

    /// An initialized store over the shared database.
    pub fn initialized(&self, config: Configuration) -> DocumentStore {
        let store = self.store(config);
        store.initialize().unwrap();
        store
    }

    /// Read a row with every column, tombstones included.
    pub fn raw_row(&self, table: &str, id: &str) -> Option<Row> {
        self.backing
            .query(
                &format!("SELECT * FROM \"{table}\" WHERE \"Id\" = @Id"),
                &[docrow_core::store::Parameter::new("Id", id)],
            )
            .unwrap()
            .into_iter()
            .next()
    }

    /// Run a statement outside any document store.
    pub fn exec(&self, sql: &str) {
        let mut tx = self
            .backing
            .begin(docrow_core::Isolation::ReadCommitted)
            .unwrap();
        tx.execute(sql, &[]).unwrap();
        tx.commit().unwrap();
    }

    pub fn column_names(&self, table: &str) -> Vec<String> {
        self.backing
            .introspect()
            .unwrap()
            .into_iter()
            .filter(|c| c.table == table)
            .map(|c| c.name)
            .collect()
    }
}
