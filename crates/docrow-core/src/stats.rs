//! Store-wide counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters shared by the command pipeline and the migration runner.
#[derive(Debug)]
pub struct StoreStats {
    started_at: Instant,

    // Command pipeline
    batches: AtomicU64,
    commands: AtomicU64,
    conflicts: AtomicU64,

    // Migration runner
    migrated: AtomicU64,
    skipped: AtomicU64,
    reprojected: AtomicU64,
}

/// Point-in-time copy of [`StoreStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Seconds since the store was created.
    pub uptime_secs: u64,
    /// Committed batches.
    pub batches: u64,
    /// Commands in committed batches.
    pub commands: u64,
    /// Batches rolled back on a concurrency conflict.
    pub conflicts: u64,
    /// Rows advanced by a document migration.
    pub migrated: u64,
    /// Rows the runner skipped because a concurrent writer got there first.
    pub skipped: u64,
    /// Rows re-projected after a column was added.
    pub reprojected: u64,
}

impl Default for StoreStats {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            batches: AtomicU64::new(0),
            commands: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            migrated: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            reprojected: AtomicU64::new(0),
        }
    }

    /// Record a committed batch.
    pub fn record_batch(&self, commands: usize) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.commands.fetch_add(commands as u64, Ordering::Relaxed);
    }

    /// Record a batch rolled back on a concurrency conflict.
    pub fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a migrated row.
    pub fn record_migrated(&self) {
        self.migrated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a skipped row.
    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a re-projected row.
    pub fn record_reprojected(&self) {
        self.reprojected.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs(),
            batches: self.batches.load(Ordering::Relaxed),
            commands: self.commands.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            migrated: self.migrated.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            reprojected: self.reprojected.load(Ordering::Relaxed),
        }
    }
}
