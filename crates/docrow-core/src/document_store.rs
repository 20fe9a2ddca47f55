//! The document store facade.

use crate::command::{
    Command, CommandPipeline, DeleteCommand, InsertCommand, UpdateCommand, UpsertCommand,
};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::migration::{
    BackgroundMigrations, MigrationOutcome, MigrationReport, MigrationRunner, SchemaMigrator,
};
use crate::schema::{system, DocumentDesign, Operation, Projections, Schema, Value};
use crate::serializer::{JsonSerializer, Serializer};
use crate::stats::{StatsSnapshot, StoreStats};
use crate::store::{BackingStore, Parameter};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

/// A live document row.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    /// Row identifier.
    pub id: String,
    /// Etag of the last committed write.
    pub etag: Uuid,
    /// Document version.
    pub version: u32,
    /// Concrete design name.
    pub design: String,
    /// Discriminator tag.
    pub discriminator: String,
    /// Creation time.
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification time.
    pub modified_at: Option<DateTime<Utc>>,
    /// Decoded payload.
    pub document: JsonValue,
}

impl StoredDocument {
    /// Decode the payload into a typed value.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.document.clone())?)
    }
}

/// Documents on top of a relational backing store.
///
/// Owns the frozen [`Schema`], runs the startup migration pass, builds write
/// commands from documents, executes batches and drives document migrations.
pub struct DocumentStore {
    schema: Arc<Schema>,
    store: Arc<dyn BackingStore>,
    serializer: Arc<dyn Serializer>,
    pipeline: Arc<CommandPipeline>,
    runner: MigrationRunner,
    stats: Arc<StoreStats>,
    config: StoreConfig,
}

impl DocumentStore {
    /// Create a store with JSON payloads.
    pub fn new(store: Arc<dyn BackingStore>, schema: Schema, config: StoreConfig) -> Self {
        Self::with_serializer(store, schema, config, Arc::new(JsonSerializer))
    }

    /// Create a store with a custom payload serializer.
    pub fn with_serializer(
        store: Arc<dyn BackingStore>,
        schema: Schema,
        config: StoreConfig,
        serializer: Arc<dyn Serializer>,
    ) -> Self {
        let schema = Arc::new(schema);
        let stats = Arc::new(StoreStats::new());
        let pipeline = Arc::new(CommandPipeline::new(Arc::clone(&store), Arc::clone(&stats)));
        let runner = MigrationRunner::new(
            Arc::clone(&schema),
            Arc::clone(&store),
            Arc::clone(&pipeline),
            Arc::clone(&serializer),
            Arc::clone(&stats),
            config.runner.clone(),
        );

        Self {
            schema,
            store,
            serializer,
            pipeline,
            runner,
            stats,
            config,
        }
    }

    /// Bring the database schema up to date. Safe to call from several
    /// processes at once.
    pub fn initialize(&self) -> Result<MigrationOutcome> {
        SchemaMigrator::new(&self.schema, &self.config.migration).run(self.store.as_ref())
    }

    /// Compute what [`initialize`](Self::initialize) would do without
    /// applying it.
    pub fn plan(&self) -> Result<MigrationOutcome> {
        SchemaMigrator::new(&self.schema, &self.config.migration).dry_run(self.store.as_ref())
    }

    /// Execute a batch atomically and return its etag.
    pub fn execute(&self, commands: &[Command]) -> Result<Uuid> {
        self.pipeline.execute(commands)
    }

    fn project(&self, design: &DocumentDesign, document: &JsonValue) -> Result<Projections> {
        design.project(document, self.serializer.as_ref(), self.schema.current_version())
    }

    /// Build an insert for a document of `design`.
    pub fn insert_command(
        &self,
        design: &str,
        id: impl Into<String>,
        document: &JsonValue,
    ) -> Result<InsertCommand> {
        let design = self.schema.design(design)?;
        Ok(InsertCommand::new(
            design.table(),
            id,
            self.project(design, document)?,
        ))
    }

    /// Build an etag-guarded update.
    pub fn update_command(
        &self,
        design: &str,
        id: impl Into<String>,
        expected_etag: Uuid,
        document: &JsonValue,
    ) -> Result<UpdateCommand> {
        let design = self.schema.design(design)?;
        Ok(UpdateCommand::new(
            design.table(),
            id,
            expected_etag,
            self.project(design, document)?,
        ))
    }

    /// Build an etag-guarded delete.
    pub fn delete_command(
        &self,
        design: &str,
        id: impl Into<String>,
        expected_etag: Uuid,
    ) -> Result<DeleteCommand> {
        let design = self.schema.design(design)?;
        Ok(DeleteCommand::new(design.table(), id, expected_etag))
    }

    /// Build an upsert.
    pub fn upsert_command(
        &self,
        design: &str,
        id: impl Into<String>,
        document: &JsonValue,
    ) -> Result<UpsertCommand> {
        let design = self.schema.design(design)?;
        Ok(UpsertCommand::new(
            design.table(),
            id,
            self.project(design, document)?,
        ))
    }

    /// Insert one document in its own batch.
    pub fn insert(&self, design: &str, id: impl Into<String>, document: &JsonValue) -> Result<Uuid> {
        let command = self.insert_command(design, id, document)?;
        self.execute(&[command.into()])
    }

    /// Load the live document `id`, if it exists and is a `design`.
    pub fn get(&self, design: &str, id: &str) -> Result<Option<StoredDocument>> {
        let requested = self.schema.design(design)?;
        let sql = format!(
            "SELECT \"{id_col}\", \"{etag}\", \"{version}\", \"{discriminator}\", \"{created}\", \
             \"{modified}\", \"{document}\" FROM \"{table}\" \
             WHERE \"{id_col}\" = @Id AND \"{last_op}\" <> @Deleted",
            id_col = system::ID,
            etag = system::ETAG,
            version = system::VERSION,
            discriminator = system::DISCRIMINATOR,
            created = system::CREATED_AT,
            modified = system::MODIFIED_AT,
            document = system::DOCUMENT,
            table = requested.table(),
            last_op = system::LAST_OPERATION,
        );

        let rows = self.store.query(
            &sql,
            &[
                Parameter::new("Id", id),
                Parameter::new("Deleted", Operation::Deleted),
            ],
        )?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };

        let discriminator = row.get_str(system::DISCRIMINATOR).unwrap_or_default();
        let actual = self.schema.design_for(requested.table(), discriminator)?;
        if !actual.is_a(requested.name()) {
            return Ok(None);
        }

        let payload = row.get_bytes(system::DOCUMENT).ok_or_else(|| {
            Error::Serialization(format!("{}/{id}: missing document", requested.table()))
        })?;
        let etag = row
            .get(system::ETAG)
            .and_then(Value::as_uuid)
            .ok_or_else(|| Error::Serialization(format!("{}/{id}: invalid etag", requested.table())))?;
        let version = row.get_i64(system::VERSION).unwrap_or(0);

        Ok(Some(StoredDocument {
            id: id.to_string(),
            etag,
            version: u32::try_from(version).unwrap_or_default(),
            design: actual.name().to_string(),
            discriminator: discriminator.to_string(),
            created_at: row.get(system::CREATED_AT).and_then(Value::as_timestamp),
            modified_at: row.get(system::MODIFIED_AT).and_then(Value::as_timestamp),
            document: self.serializer.deserialize(payload, actual)?,
        }))
    }

    /// Load the live document `id`, failing with [`Error::NotFound`].
    pub fn load(&self, design: &str, id: &str) -> Result<StoredDocument> {
        self.get(design, id)?.ok_or_else(|| Error::NotFound {
            table: self
                .schema
                .design(design)
                .map(|d| d.table().to_string())
                .unwrap_or_default(),
            id: id.to_string(),
        })
    }

    /// Drain every pending document migration once.
    pub fn run_background_migrations(&self) -> Result<MigrationReport> {
        self.runner.run_once()
    }

    /// Keep draining document migrations on a background thread.
    pub fn start_background_migrations(&self) -> Result<BackgroundMigrations> {
        self.runner.start()
    }

    /// The frozen schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Etag of the most recent batch committed through this store.
    pub fn last_written_etag(&self) -> Option<Uuid> {
        self.pipeline.last_written()
    }

    /// Current counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}
