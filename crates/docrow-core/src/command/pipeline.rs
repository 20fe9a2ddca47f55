//! Atomic batch execution with optimistic concurrency checks.

use super::Command;
use crate::error::{Error, Result};
use crate::stats::StoreStats;
use crate::store::{BackingStore, Isolation, PreparedCommand};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Parameter ceiling per batch. Batches binding this many parameters or more
/// are rejected before reaching the store.
pub const MAX_PARAMETERS: usize = 2000;

/// Prepares and executes command batches.
pub struct CommandPipeline {
    store: Arc<dyn BackingStore>,
    stats: Arc<StoreStats>,
    last_written: RwLock<Option<Uuid>>,
}

impl CommandPipeline {
    /// Create a pipeline over a store.
    pub fn new(store: Arc<dyn BackingStore>, stats: Arc<StoreStats>) -> Self {
        Self {
            store,
            stats,
            last_written: RwLock::new(None),
        }
    }

    /// Prepare every command against a shared etag and timestamp.
    pub fn prepare(commands: &[Command], etag: Uuid, now: DateTime<Utc>) -> Vec<PreparedCommand> {
        commands
            .iter()
            .enumerate()
            .map(|(index, command)| command.prepare(etag, index, now))
            .collect()
    }

    /// Execute a batch in one transaction and return the etag it committed.
    ///
    /// Every statement must affect the number of rows it declares; on the first
    /// mismatch the whole batch is rolled back and
    /// [`Error::ConcurrencyConflict`] is returned. An empty batch is a no-op
    /// that returns the nil etag.
    pub fn execute(&self, commands: &[Command]) -> Result<Uuid> {
        if commands.is_empty() {
            return Ok(Uuid::nil());
        }

        let etag = Uuid::new_v4();
        let prepared = Self::prepare(commands, etag, Utc::now());

        let count: usize = prepared.iter().map(|p| p.parameters.len()).sum();
        if count >= MAX_PARAMETERS {
            return Err(Error::ParameterLimitExceeded {
                count,
                limit: MAX_PARAMETERS,
            });
        }

        let mut tx = self.store.begin(Isolation::ReadCommitted)?;
        let counts = tx.execute_batch(&prepared)?;

        for (index, (command, actual)) in prepared.iter().zip(&counts).enumerate() {
            let Some(expected) = command.expected_rows else {
                continue;
            };
            if expected != *actual {
                tx.rollback()?;
                self.stats.record_conflict();
                debug!(
                    %etag,
                    index,
                    expected,
                    actual,
                    "batch rolled back on concurrency conflict"
                );
                return Err(Error::ConcurrencyConflict {
                    index,
                    expected,
                    actual: *actual,
                });
            }
        }

        // Taken while the transaction still holds the store, so watermark
        // writes follow commit order.
        let mut last_written = self.last_written.write();
        tx.commit()?;
        *last_written = Some(etag);
        drop(last_written);

        self.stats.record_batch(commands.len());
        debug!(%etag, commands = commands.len(), parameters = count, "batch committed");

        Ok(etag)
    }

    /// Etag of the most recent batch committed through this pipeline.
    pub fn last_written(&self) -> Option<Uuid> {
        *self.last_written.read()
    }
}
