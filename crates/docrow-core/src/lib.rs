//! Docrow Core - document persistence on a relational store.
//!
//! Documents are stored as opaque payloads next to indexed projection columns
//! computed from them. This crate reconciles the declared schema with the
//! live database at startup, executes write batches atomically with
//! etag-based optimistic concurrency, and migrates stored documents to newer
//! versions in the background while the store is live.
//!
//! # Example
//!
//! ```ignore
//! use docrow_core::{Configuration, DocumentStore, SqliteStore, StoreConfig};
//! use docrow_core::schema::{Column, SqlType, Value};
//!
//! let mut config = Configuration::new();
//! config
//!     .document("Car")
//!     .table("Cars")
//!     .project(Column::new("Wheels", SqlType::Integer), |doc| {
//!         Value::from(doc["wheels"].as_i64())
//!     });
//!
//! let store = DocumentStore::new(
//!     Arc::new(SqliteStore::open("cars.db")?),
//!     config.build()?,
//!     StoreConfig::default(),
//! );
//! store.initialize()?;
//!
//! let etag = store.insert("Car", "c1", &json!({"wheels": 4}))?;
//! let update = store.update_command("Car", "c1", etag, &json!({"wheels": 6}))?;
//! store.execute(&[update.into()])?;
//! ```

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod command;
pub mod config;
pub mod document_store;
pub mod error;
pub mod migration;
pub mod schema;
pub mod serializer;
pub mod stats;
pub mod store;

pub use command::{
    Command, CommandPipeline, DeleteCommand, InsertCommand, SqlCommand, UpdateCommand,
    UpsertCommand, MAX_PARAMETERS,
};
pub use config::{MigrationConfig, RunnerConfig, StoreConfig};
pub use document_store::{DocumentStore, StoredDocument};
pub use error::{Error, Result};
pub use migration::{
    BackgroundMigrations, DdlOperation, DocumentTransform, MigrationOutcome, MigrationReport,
    SchemaMigration,
};
pub use schema::{Configuration, Schema, SchemaFile};
pub use serializer::{JsonSerializer, Serializer};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::{BackingStore, Isolation, SqliteStore, StoreError};
