//! Schema model: tables, columns, document designs and the frozen registry.
//!
//! Application code describes its document types through a
//! [`Configuration`], which is validated and frozen into a [`Schema`]. The
//! schema is the single source of truth for the migration planner, the
//! command pipeline and the migration runner.

mod column;
mod configuration;
mod design;
mod file;
mod table;
mod types;

pub use column::{is_system_column, system, Column, Operation};
pub use configuration::{Configuration, DesignBuilder, Schema};
pub use design::{DocumentDesign, Projection, Projections, ProjectorFn};
pub use file::{ColumnFile, DesignFile, SchemaFile, TableFile};
pub use table::{Table, TableKind};
pub use types::{format_timestamp, SqlType, Value};
