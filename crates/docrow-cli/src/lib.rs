//! Docrow CLI - plan and apply migrations against a SQLite database.
//!
//! The schema is read from a JSON [`SchemaFile`]; projections declared there
//! are JSON pointers into the document.

pub mod config;
pub mod formatter;

pub use config::{Action, Args, CliConfig};
pub use formatter::{create_formatter, Formatter, OutputFormat};

use docrow_core::{DocumentStore, Result, SchemaFile, SqliteStore};
use std::sync::Arc;

/// Open the database and build a store for the configured schema file.
pub fn open_store(config: &CliConfig) -> Result<DocumentStore> {
    let schema = SchemaFile::load(&config.schema)?
        .into_configuration()?
        .build()?;
    let backing = SqliteStore::open(&config.database)?;

    Ok(DocumentStore::new(
        Arc::new(backing),
        schema,
        config.store.clone(),
    ))
}
