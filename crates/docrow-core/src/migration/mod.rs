//! Schema and document migrations.
//!
//! Two kinds of migration keep a database in step with its configuration:
//!
//! - **Schema migrations** run once at startup, in one serializable
//!   transaction. Hand-authored [`SchemaMigration`]s run first and may rename
//!   or drop structure; then the [`MigrationPlanner`] diffs the desired schema
//!   against the live catalog and adds whatever is missing. Unsafe operations
//!   are refused unless explicitly allowed.
//! - **Document migrations** rewrite stored payloads from version `V-1` to
//!   `V` in the background, while the store is live. The
//!   [`MigrationRunner`] writes every row back with an etag-guarded update
//!   and skips rows a concurrent writer got to first.

mod ddl;
mod document;
mod inspector;
mod migrator;
mod operation;
mod planner;
mod runner;

pub use ddl::DdlExecutor;
pub use document::{DocumentMigration, DocumentTransform, TransformFn};
pub use inspector::{LiveSchema, SchemaInspector};
pub use migrator::{MigrationOutcome, SchemaMigrator};
pub use operation::{DdlOperation, SchemaMigration};
pub use planner::MigrationPlanner;
pub use runner::{BackgroundMigrations, MigrationReport, MigrationRunner};

/// Table recording the applied hand-authored schema version.
pub const METADATA_TABLE: &str = "docrow_metadata";
