//! Desired-versus-live schema diffing.

use super::inspector::LiveSchema;
use super::operation::DdlOperation;
use crate::schema::Schema;
use tracing::warn;

/// Computes the additive operations that bring the live schema up to the
/// desired one.
///
/// Only tables and columns are ever created. Removals and renames cannot be
/// told apart from a drop followed by an add, so they are left to
/// hand-authored [`SchemaMigration`](super::SchemaMigration)s. Operations are
/// ordered by table name so concurrent processes take locks in the same order.
pub struct MigrationPlanner;

impl MigrationPlanner {
    /// Plan the automatic pass.
    pub fn plan(schema: &Schema, live: &LiveSchema) -> Vec<DdlOperation> {
        let mut operations = Vec::new();

        for table in schema.tables() {
            if !live.has_table(table.name()) {
                operations.push(DdlOperation::CreateTable(table.clone()));
                continue;
            }

            for column in table.columns() {
                match live.column(table.name(), &column.name) {
                    None => operations.push(DdlOperation::AddColumn {
                        table: table.name().to_string(),
                        column: column.clone(),
                        requires_reprojection: table.is_document(),
                    }),
                    Some(existing) => {
                        if existing.sql_type != column.sql_type
                            || existing.nullable != column.nullable
                        {
                            warn!(
                                table = table.name(),
                                column = %column.name,
                                live_type = %existing.sql_type,
                                live_nullable = existing.nullable,
                                desired = %column.definition(),
                                "live column differs from its definition; not altered automatically"
                            );
                        }
                    }
                }
            }
        }

        operations
    }
}
