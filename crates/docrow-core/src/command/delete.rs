use super::{quote, ParameterSet};
use crate::schema::{system, Operation};
use crate::store::PreparedCommand;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Delete a document row.
///
/// Rows are never removed. The id is renamed to `<id>/<random suffix>` and the
/// row is flagged as deleted, which frees the original id and keeps the row
/// for replay.
#[derive(Debug, Clone)]
pub struct DeleteCommand {
    /// Target table.
    pub table: String,
    /// Row identifier.
    pub id: String,
    /// Etag the caller read. Ignored with `last_write_wins`.
    pub expected_etag: Uuid,
    /// Apply regardless of the stored etag.
    pub last_write_wins: bool,
}

impl DeleteCommand {
    /// Create an etag-guarded delete.
    pub fn new(table: impl Into<String>, id: impl Into<String>, expected_etag: Uuid) -> Self {
        Self {
            table: table.into(),
            id: id.into(),
            expected_etag,
            last_write_wins: false,
        }
    }

    /// Skip the etag check.
    pub fn last_write_wins(mut self) -> Self {
        self.last_write_wins = true;
        self
    }

    pub(crate) fn prepare(&self, etag: Uuid, index: usize, now: DateTime<Utc>) -> PreparedCommand {
        let mut params = ParameterSet::new(index);
        let tombstone = format!("{}/{}", self.id, Uuid::new_v4().simple());

        let mut sql = format!(
            "UPDATE {table} SET {id} = {new_id}, {etag_col} = {etag}, {modified_col} = {modified}, \
             {op_col} = {op} WHERE {id} = {old_id}",
            table = quote(&self.table),
            id = quote(system::ID),
            new_id = params.bind("NewId", tombstone),
            etag_col = quote(system::ETAG),
            etag = params.bind(system::ETAG, etag),
            modified_col = quote(system::MODIFIED_AT),
            modified = params.bind(system::MODIFIED_AT, now),
            op_col = quote(system::LAST_OPERATION),
            op = params.bind(system::LAST_OPERATION, Operation::Deleted),
            old_id = params.bind(system::ID, self.id.as_str()),
        );
        if self.last_write_wins {
            // Tombstones are never written through.
            sql.push_str(&format!(
                " AND {} <> {}",
                quote(system::LAST_OPERATION),
                Operation::Deleted.code()
            ));
        } else {
            sql.push_str(&format!(
                " AND {} = {}",
                quote(system::ETAG),
                params.bind("ExpectedEtag", self.expected_etag)
            ));
        }
        sql.push(';');

        PreparedCommand {
            sql,
            parameters: params.into_parameters(),
            expected_rows: Some(1),
        }
    }
}
