//! Command-line configuration.

use crate::formatter::OutputFormat;
use clap::{Parser, Subcommand};
use docrow_core::{MigrationConfig, RunnerConfig, StoreConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Default database file.
pub const DEFAULT_DATABASE: &str = "./docrow.db";

/// Default lock wait per DDL operation, in seconds.
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

/// Default pause between background passes, in milliseconds.
pub const DEFAULT_INTERVAL_MS: u64 = 1000;

/// Default runner page size.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "docrow")]
#[command(version, about = "Plan and apply docrow schema and document migrations", long_about = None)]
pub struct Args {
    /// Path to the SQLite database file.
    #[arg(short, long, default_value = DEFAULT_DATABASE)]
    pub database: PathBuf,

    /// Path to the JSON schema file.
    #[arg(short, long)]
    pub schema: PathBuf,

    /// Lock wait per DDL operation in seconds.
    #[arg(long, default_value_t = DEFAULT_OPERATION_TIMEOUT_SECS)]
    pub operation_timeout_secs: u64,

    /// Output format.
    #[arg(long, default_value = "text", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Action,
}

/// What to do.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Show the schema changes a startup pass would apply, without applying them.
    Plan,

    /// Apply pending schema changes.
    Migrate {
        /// Run operations that drop tables or columns.
        #[arg(long)]
        allow_unsafe: bool,
    },

    /// Migrate stored documents to the current version.
    RunMigrations {
        /// Run a single pass and exit.
        #[arg(long)]
        once: bool,

        /// Pause between passes in milliseconds.
        #[arg(long, default_value_t = DEFAULT_INTERVAL_MS)]
        interval_ms: u64,

        /// Rows fetched per page.
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,
    },
}

/// Resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Database file.
    pub database: PathBuf,
    /// Schema file.
    pub schema: PathBuf,
    /// Output format.
    pub format: OutputFormat,
    /// Store settings derived from the flags.
    pub store: StoreConfig,
    /// Requested action.
    pub action: Action,
}

impl Args {
    /// Convert command-line arguments to a configuration.
    pub fn into_config(self) -> CliConfig {
        let mut migration = MigrationConfig::default()
            .with_operation_timeout(Duration::from_secs(self.operation_timeout_secs));
        let mut runner = RunnerConfig::default();

        match &self.command {
            Action::Plan => {}
            Action::Migrate { allow_unsafe } => {
                migration = migration.allow_unsafe(*allow_unsafe);
            }
            Action::RunMigrations {
                interval_ms,
                page_size,
                ..
            } => {
                runner = runner
                    .with_interval(Duration::from_millis(*interval_ms))
                    .with_page_size(*page_size);
            }
        }

        CliConfig {
            database: self.database,
            schema: self.schema,
            format: self.format,
            store: StoreConfig::default()
                .with_migration(migration)
                .with_runner(runner),
            action: self.command,
        }
    }
}
