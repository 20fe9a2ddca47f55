//! Store configuration.

use std::time::Duration;

/// Configuration for the startup schema migration pass.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Run operations that can destroy data.
    pub allow_unsafe: bool,

    /// Lock wait bound applied to each DDL operation.
    pub operation_timeout: Duration,

    /// How many times the whole pass is retried on a transient lock failure.
    pub startup_retries: u32,

    /// Base delay between retries. Attempt `n` waits `n * retry_backoff`.
    pub retry_backoff: Duration,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            allow_unsafe: false,
            operation_timeout: Duration::from_secs(30),
            startup_retries: 5,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

impl MigrationConfig {
    /// Allow or refuse unsafe operations.
    pub fn allow_unsafe(mut self, allow: bool) -> Self {
        self.allow_unsafe = allow;
        self
    }

    /// Set the per-operation timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Set the retry budget.
    pub fn with_startup_retries(mut self, retries: u32) -> Self {
        self.startup_retries = retries;
        self
    }

    /// Set the retry backoff.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

/// Configuration for the background document migration runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Rows fetched per page.
    pub page_size: usize,

    /// Pause between passes when running in the background.
    pub interval: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            interval: Duration::from_secs(1),
        }
    }
}

impl RunnerConfig {
    /// Set the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Set the interval between passes.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Configuration for a [`DocumentStore`](crate::DocumentStore).
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// Startup migration settings.
    pub migration: MigrationConfig,

    /// Background runner settings.
    pub runner: RunnerConfig,
}

impl StoreConfig {
    /// Set the migration settings.
    pub fn with_migration(mut self, migration: MigrationConfig) -> Self {
        self.migration = migration;
        self
    }

    /// Set the runner settings.
    pub fn with_runner(mut self, runner: RunnerConfig) -> Self {
        self.runner = runner;
        self
    }
}
