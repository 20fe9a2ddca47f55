//! The startup schema migration pass.

use super::ddl::DdlExecutor;
use super::inspector::SchemaInspector;
use super::operation::DdlOperation;
use super::planner::MigrationPlanner;
use super::METADATA_TABLE;
use crate::config::MigrationConfig;
use crate::error::{Error, Result};
use crate::schema::{system, Operation, Schema};
use crate::store::{BackingStore, Isolation, Parameter, StoreTransaction};
use std::collections::BTreeSet;
use std::thread;
use tracing::{info, warn};

const SCHEMA_VERSION: &str = "SchemaVersion";

/// What a startup pass did, or would do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationOutcome {
    /// Hand-authored schema version before the pass.
    pub from_version: u32,
    /// Hand-authored schema version after the pass.
    pub to_version: u32,
    /// Hand-authored operations applied, in order.
    pub authored: Vec<DdlOperation>,
    /// Operations planned by diffing, in order.
    pub planned: Vec<DdlOperation>,
    /// Document tables whose rows were marked for reprojection.
    pub reprojected_tables: Vec<String>,
    /// The pass was rolled back.
    pub dry_run: bool,
}

impl MigrationOutcome {
    /// Check if the pass changed nothing.
    pub fn is_empty(&self) -> bool {
        self.authored.is_empty() && self.planned.is_empty() && self.from_version == self.to_version
    }
}

/// Runs hand-authored schema migrations followed by the automatic diff, all
/// in one serializable transaction.
pub struct SchemaMigrator<'a> {
    schema: &'a Schema,
    config: &'a MigrationConfig,
    executor: DdlExecutor,
}

impl<'a> SchemaMigrator<'a> {
    /// Create a migrator.
    pub fn new(schema: &'a Schema, config: &'a MigrationConfig) -> Self {
        Self {
            schema,
            config,
            executor: DdlExecutor::new(config),
        }
    }

    /// Apply the pass, retrying it whole on transient lock failures.
    pub fn run(&self, store: &dyn BackingStore) -> Result<MigrationOutcome> {
        let mut attempt = 0;
        loop {
            match self.attempt(store, true) {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_transient() && attempt < self.config.startup_retries => {
                    attempt += 1;
                    let delay = self.config.retry_backoff * attempt;
                    warn!(
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "schema migration hit a lock conflict; retrying"
                    );
                    thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run the pass and roll it back.
    pub fn dry_run(&self, store: &dyn BackingStore) -> Result<MigrationOutcome> {
        self.attempt(store, false)
    }

    fn attempt(&self, store: &dyn BackingStore, commit: bool) -> Result<MigrationOutcome> {
        let mut tx = store.begin(Isolation::Serializable)?;
        let mut outcome = self.apply(tx.as_mut())?;

        if commit {
            tx.commit()?;
            if outcome.is_empty() {
                info!(schema_version = outcome.to_version, "schema is up to date");
            } else {
                info!(
                    from_version = outcome.from_version,
                    to_version = outcome.to_version,
                    authored = outcome.authored.len(),
                    planned = outcome.planned.len(),
                    reprojected = ?outcome.reprojected_tables,
                    "schema migrated"
                );
            }
        } else {
            tx.rollback()?;
            outcome.dry_run = true;
        }

        Ok(outcome)
    }

    fn apply(&self, tx: &mut dyn StoreTransaction) -> Result<MigrationOutcome> {
        let fresh = SchemaInspector::inspect(tx)?.is_empty();
        let from_version = read_schema_version(tx)?;
        let mut outcome = MigrationOutcome {
            from_version,
            to_version: from_version,
            ..Default::default()
        };

        if fresh {
            // The automatic pass builds the current shape directly.
            outcome.to_version = self.schema.schema_version();
        } else {
            let pending: Vec<_> = self
                .schema
                .schema_migrations()
                .iter()
                .filter(|m| m.version > from_version)
                .collect();

            let all: Vec<_> = pending
                .iter()
                .flat_map(|m| m.operations.iter().cloned())
                .collect();
            self.executor.check(&all)?;

            for migration in pending {
                info!(version = migration.version, "running schema migration");
                self.executor.execute(tx, &migration.operations)?;
                outcome.authored.extend(migration.operations.iter().cloned());
                outcome.to_version = migration.version;
            }
        }

        let live = SchemaInspector::inspect(tx)?;
        let planned = MigrationPlanner::plan(self.schema, &live);
        self.executor.execute(tx, &planned)?;

        let tables: BTreeSet<&str> = outcome
            .authored
            .iter()
            .chain(&planned)
            .filter_map(DdlOperation::requires_reprojection)
            .filter(|table| self.schema.table(table).is_some_and(|t| t.is_document()))
            .collect();
        for table in &tables {
            let marked = tx.execute(
                &format!(
                    "UPDATE \"{table}\" SET \"{}\" = 1 WHERE \"{}\" <> @Deleted",
                    system::AWAITS_REPROJECTION,
                    system::LAST_OPERATION
                ),
                &[Parameter::new("Deleted", Operation::Deleted)],
            )?;
            info!(table = *table, rows = marked, "marked rows for reprojection");
        }
        outcome.reprojected_tables = tables.into_iter().map(String::from).collect();
        outcome.planned = planned;

        if outcome.to_version != from_version {
            write_schema_version(tx, outcome.to_version)?;
        }

        Ok(outcome)
    }
}

fn read_schema_version(tx: &mut dyn StoreTransaction) -> Result<u32> {
    tx.execute(
        &format!("CREATE TABLE IF NOT EXISTS \"{METADATA_TABLE}\" (\"{SCHEMA_VERSION}\" INTEGER NOT NULL)"),
        &[],
    )?;

    let rows = tx.query(
        &format!("SELECT \"{SCHEMA_VERSION}\" FROM \"{METADATA_TABLE}\""),
        &[],
    )?;

    match rows.first() {
        Some(row) => {
            let version = row.get_i64(SCHEMA_VERSION).unwrap_or(0);
            u32::try_from(version).map_err(|_| {
                Error::Configuration(format!("stored schema version {version} is out of range"))
            })
        }
        None => {
            tx.execute(
                &format!("INSERT INTO \"{METADATA_TABLE}\" (\"{SCHEMA_VERSION}\") VALUES (0)"),
                &[],
            )?;
            Ok(0)
        }
    }
}

fn write_schema_version(tx: &mut dyn StoreTransaction, version: u32) -> Result<()> {
    tx.execute(
        &format!("UPDATE \"{METADATA_TABLE}\" SET \"{SCHEMA_VERSION}\" = @Version"),
        &[Parameter::new("Version", version)],
    )?;
    Ok(())
}
