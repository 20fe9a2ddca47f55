//! Background document migration runner.
//!
//! Pages through document rows whose version lags a registered migration,
//! rewrites them and writes them back with an etag-guarded update. A row
//! that a live writer touched in the meantime fails the etag check and is
//! skipped: the writer already stamped it with the current version. Several
//! runners may work on the same database without coordinating.

use super::document::DocumentMigration;
use crate::command::{CommandPipeline, UpdateCommand};
use crate::config::RunnerConfig;
use crate::error::{Error, Result};
use crate::schema::{system, DocumentDesign, Operation, Schema, Value};
use crate::serializer::Serializer;
use crate::stats::StoreStats;
use crate::store::{BackingStore, Parameter, Row};
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Rows handled by one runner pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Rows advanced to a newer version.
    pub migrated: u64,
    /// Rows skipped on a concurrency conflict.
    pub skipped: u64,
    /// Rows re-projected after a column was added.
    pub reprojected: u64,
}

impl MigrationReport {
    /// Check if the pass touched nothing.
    pub fn is_empty(&self) -> bool {
        self.migrated == 0 && self.skipped == 0 && self.reprojected == 0
    }
}

enum RowOutcome {
    Written,
    Skipped,
}

/// Drives document migrations and reprojection through the command pipeline.
#[derive(Clone)]
pub struct MigrationRunner {
    schema: Arc<Schema>,
    store: Arc<dyn BackingStore>,
    pipeline: Arc<CommandPipeline>,
    serializer: Arc<dyn Serializer>,
    stats: Arc<StoreStats>,
    config: RunnerConfig,
    cancel: Arc<AtomicBool>,
}

impl MigrationRunner {
    /// Create a runner.
    pub fn new(
        schema: Arc<Schema>,
        store: Arc<dyn BackingStore>,
        pipeline: Arc<CommandPipeline>,
        serializer: Arc<dyn Serializer>,
        stats: Arc<StoreStats>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            schema,
            store,
            pipeline,
            serializer,
            stats,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Drain every pending migration once, then re-project stale rows.
    ///
    /// Migrations run in version order per table; a table whose rows for one
    /// version could not all be advanced waits for the next pass before later
    /// migrations touch it. Stops early, between pages, once the runner is
    /// cancelled.
    pub fn run_once(&self) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();

        for table in self.schema.document_tables() {
            for migration in self.schema.document_migrations() {
                if self.cancelled() {
                    return Ok(report);
                }
                if !self.migrate_table(table.name(), migration, &mut report)? {
                    if self.cancelled() {
                        return Ok(report);
                    }
                    info!(
                        table = table.name(),
                        to_version = migration.to_version,
                        "rows left behind; deferring later migrations to the next pass"
                    );
                    break;
                }
            }
        }

        for table in self.schema.document_tables() {
            if self.cancelled() {
                return Ok(report);
            }
            self.reproject_table(table.name(), &mut report)?;
        }

        Ok(report)
    }

    /// Fetch the next page after `after`, ordered by id.
    fn fetch_page(
        &self,
        table: &str,
        filter: &str,
        parameters: &[Parameter],
        after: Option<&str>,
    ) -> Result<Vec<Row>> {
        let keyset = match after {
            Some(_) => format!(" AND \"{}\" > @After", system::ID),
            None => String::new(),
        };
        let sql = format!(
            "SELECT \"{id}\", \"{etag}\", \"{version}\", \"{discriminator}\", \"{document}\" \
             FROM \"{table}\" WHERE {filter}{keyset} AND \"{last_op}\" <> @Deleted \
             ORDER BY \"{id}\" LIMIT @Limit",
            id = system::ID,
            etag = system::ETAG,
            version = system::VERSION,
            discriminator = system::DISCRIMINATOR,
            document = system::DOCUMENT,
            last_op = system::LAST_OPERATION,
        );

        let mut bound = parameters.to_vec();
        if let Some(after) = after {
            bound.push(Parameter::new("After", after));
        }
        bound.push(Parameter::new("Deleted", Operation::Deleted));
        bound.push(Parameter::new("Limit", self.config.page_size as i64));

        Ok(self.store.query(&sql, &bound)?)
    }

    /// Advance every row of `table` below the migration's target version.
    ///
    /// Sweeps the table in id order until a sweep finds nothing left. Returns
    /// `false` when rows are still below the target after a sweep that wrote
    /// nothing.
    fn migrate_table(
        &self,
        table: &str,
        migration: &DocumentMigration,
        report: &mut MigrationReport,
    ) -> Result<bool> {
        let target = migration.to_version;
        let filter = format!("\"{}\" < @Target", system::VERSION);
        let parameters = [Parameter::new("Target", target)];

        let mut after: Option<String> = None;
        let mut progressed = false;

        loop {
            if self.cancelled() {
                return Ok(false);
            }

            let rows = self.fetch_page(table, &filter, &parameters, after.as_deref())?;
            if rows.is_empty() {
                if after.is_none() {
                    return Ok(true);
                }
                if !progressed {
                    // Nothing written this sweep; whatever is still behind
                    // waits for the next pass.
                    let behind = self.fetch_page(table, &filter, &parameters, None)?;
                    return Ok(behind.is_empty());
                }
                // Rescan from the start for rows skipped on conflict.
                after = None;
                progressed = false;
                continue;
            }

            for row in &rows {
                let stored = StoredRow::read(table, row)?;
                after = Some(stored.id.clone());

                match self.migrate_row(table, stored, migration)? {
                    RowOutcome::Written => {
                        report.migrated += 1;
                        self.stats.record_migrated();
                        progressed = true;
                    }
                    RowOutcome::Skipped => {
                        report.skipped += 1;
                        self.stats.record_skipped();
                    }
                }
            }

            debug!(table, to_version = target, rows = rows.len(), "migrated page");
        }
    }

    fn migrate_row(
        &self,
        table: &str,
        stored: StoredRow,
        migration: &DocumentMigration,
    ) -> Result<RowOutcome> {
        let expected = i64::from(migration.from_version());

        if stored.version != expected {
            error!(
                table,
                id = %stored.id,
                found = stored.version,
                expected,
                "document version gap; a prerequisite migration is missing"
            );
            return Err(Error::VersionGap {
                table: table.to_string(),
                id: stored.id,
                found: stored.version,
                expected,
            });
        }

        let design = self.schema.design_for(table, &stored.discriminator)?;
        let mut document = self.serializer.deserialize(&stored.payload, design)?;
        for transform in &migration.transforms {
            if transform.applies_to(design) {
                transform.apply(&mut document)?;
            }
        }

        self.write_back(table, stored, design, &document, migration.to_version)
    }

    /// Re-project every row awaiting it in one sweep. Rows skipped on
    /// conflict are picked up by a later pass.
    fn reproject_table(&self, table: &str, report: &mut MigrationReport) -> Result<()> {
        let filter = format!("\"{}\" = 1", system::AWAITS_REPROJECTION);
        let mut after: Option<String> = None;

        loop {
            if self.cancelled() {
                return Ok(());
            }

            let rows = self.fetch_page(table, &filter, &[], after.as_deref())?;
            if rows.is_empty() {
                return Ok(());
            }

            for row in &rows {
                let stored = StoredRow::read(table, row)?;
                after = Some(stored.id.clone());

                let version = u32::try_from(stored.version).map_err(|_| {
                    Error::Serialization(format!(
                        "{table}/{}: invalid document version {}",
                        stored.id, stored.version
                    ))
                })?;
                let design = self.schema.design_for(table, &stored.discriminator)?;
                let document = self.serializer.deserialize(&stored.payload, design)?;

                match self.write_back(table, stored, design, &document, version)? {
                    RowOutcome::Written => {
                        report.reprojected += 1;
                        self.stats.record_reprojected();
                    }
                    RowOutcome::Skipped => {
                        report.skipped += 1;
                        self.stats.record_skipped();
                    }
                }
            }

            debug!(table, rows = rows.len(), "re-projected page");
        }
    }

    fn write_back(
        &self,
        table: &str,
        stored: StoredRow,
        design: &DocumentDesign,
        document: &JsonValue,
        version: u32,
    ) -> Result<RowOutcome> {
        let projections = design.project(document, self.serializer.as_ref(), version)?;
        let update = UpdateCommand::new(table, stored.id.as_str(), stored.etag, projections);

        match self.pipeline.execute(&[update.into()]) {
            Ok(_) => Ok(RowOutcome::Written),
            Err(e) if e.is_concurrency_conflict() => {
                debug!(table, id = %stored.id, "row changed concurrently; skipped");
                Ok(RowOutcome::Skipped)
            }
            Err(e) => Err(e),
        }
    }

    /// Run passes on a dedicated thread every `interval` until stopped.
    ///
    /// Store failures are logged and retried on the next pass. Any other
    /// failure, such as a version gap, stops the loop; it is returned by
    /// [`BackgroundMigrations::stop`].
    pub fn start(&self) -> Result<BackgroundMigrations> {
        let mut runner = self.clone();
        runner.cancel = Arc::new(AtomicBool::new(false));
        let cancel = Arc::clone(&runner.cancel);
        let (wake, sleep) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("docrow-migrations".to_string())
            .spawn(move || runner.run_loop(sleep))?;

        info!(interval_ms = self.config.interval.as_millis() as u64, "background migrations started");

        Ok(BackgroundMigrations {
            cancel,
            wake,
            handle: Some(handle),
        })
    }

    fn run_loop(self, sleep: mpsc::Receiver<()>) -> Result<()> {
        loop {
            if self.cancelled() {
                break;
            }

            match self.run_once() {
                Ok(report) if !report.is_empty() => info!(
                    migrated = report.migrated,
                    skipped = report.skipped,
                    reprojected = report.reprojected,
                    "document migration pass"
                ),
                Ok(_) => {}
                Err(e @ Error::Store(_)) => {
                    warn!(error = %e, "document migration pass failed; retrying next pass");
                }
                Err(e) => {
                    error!(error = %e, "background migrations stopped");
                    return Err(e);
                }
            }

            match sleep.recv_timeout(self.config.interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        info!("background migrations stopped");
        Ok(())
    }
}

/// Handle to a background runner thread.
pub struct BackgroundMigrations {
    cancel: Arc<AtomicBool>,
    wake: mpsc::Sender<()>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl BackgroundMigrations {
    /// Check whether the thread is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop after the current page and wait for the thread.
    ///
    /// Returns the error that stopped the loop, if any.
    pub fn stop(mut self) -> Result<()> {
        self.signal();
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| {
                Error::Transform("background migration thread panicked".to_string())
            })?,
            None => Ok(()),
        }
    }

    fn signal(&self) {
        self.cancel.store(true, Ordering::Release);
        let _ = self.wake.send(());
    }
}

impl Drop for BackgroundMigrations {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.signal();
        }
    }
}

/// The system columns of a fetched row.
struct StoredRow {
    id: String,
    etag: Uuid,
    version: i64,
    discriminator: String,
    payload: Vec<u8>,
}

impl StoredRow {
    fn read(table: &str, row: &Row) -> Result<Self> {
        let id = row
            .get_str(system::ID)
            .ok_or_else(|| Error::Serialization(format!("{table}: row without id")))?
            .to_string();
        let etag = row
            .get(system::ETAG)
            .and_then(Value::as_uuid)
            .ok_or_else(|| Error::Serialization(format!("{table}/{id}: invalid etag")))?;
        let payload = row
            .get_bytes(system::DOCUMENT)
            .ok_or_else(|| Error::Serialization(format!("{table}/{id}: missing document")))?
            .to_vec();

        Ok(Self {
            version: row.get_i64(system::VERSION).unwrap_or(0),
            discriminator: row.get_str(system::DISCRIMINATOR).unwrap_or_default().to_string(),
            id,
            etag,
            payload,
        })
    }
}
