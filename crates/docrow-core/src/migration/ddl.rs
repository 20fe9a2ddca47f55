//! DDL execution inside a caller-owned transaction.

use super::operation::DdlOperation;
use crate::config::MigrationConfig;
use crate::error::{Error, Result};
use crate::store::StoreTransaction;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Applies DDL operations in order, refusing unsafe ones unless authorized.
#[derive(Debug, Clone)]
pub struct DdlExecutor {
    allow_unsafe: bool,
    operation_timeout: Duration,
}

impl DdlExecutor {
    /// Create an executor from the migration settings.
    pub fn new(config: &MigrationConfig) -> Self {
        Self {
            allow_unsafe: config.allow_unsafe,
            operation_timeout: config.operation_timeout,
        }
    }

    /// Fail with [`Error::UnsafeMigrationRejected`] on the first unsafe
    /// operation, unless unsafe operations are allowed.
    pub fn check(&self, operations: &[DdlOperation]) -> Result<()> {
        if self.allow_unsafe {
            return Ok(());
        }
        match operations.iter().find(|op| op.is_unsafe()) {
            Some(op) => Err(Error::UnsafeMigrationRejected {
                operation: op.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Check, then run every operation. Nothing is committed here; the caller
    /// owns the transaction.
    pub fn execute(&self, tx: &mut dyn StoreTransaction, operations: &[DdlOperation]) -> Result<()> {
        self.check(operations)?;

        for operation in operations {
            tx.set_timeout(self.operation_timeout)?;
            let start = Instant::now();

            for statement in operation.statements() {
                debug!(sql = %statement, "executing ddl");
                tx.execute(&statement, &[])?;
            }

            info!(
                operation = %operation,
                unsafe_op = operation.is_unsafe(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "applied schema operation"
            );
        }

        Ok(())
    }
}
