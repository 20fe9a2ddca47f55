use super::{bind_projections, quote, ParameterSet};
use crate::schema::{system, Operation, Projections};
use crate::store::PreparedCommand;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Update a document row, guarded by the etag it was read with.
#[derive(Debug, Clone)]
pub struct UpdateCommand {
    /// Target table.
    pub table: String,
    /// Row identifier.
    pub id: String,
    /// Etag the caller read. Ignored with `last_write_wins`.
    pub expected_etag: Uuid,
    /// Apply regardless of the stored etag.
    pub last_write_wins: bool,
    /// Payload and projected columns.
    pub projections: Projections,
}

impl UpdateCommand {
    /// Create an etag-guarded update.
    pub fn new(
        table: impl Into<String>,
        id: impl Into<String>,
        expected_etag: Uuid,
        projections: Projections,
    ) -> Self {
        Self {
            table: table.into(),
            id: id.into(),
            expected_etag,
            last_write_wins: false,
            projections,
        }
    }

    /// Skip the etag check.
    pub fn last_write_wins(mut self) -> Self {
        self.last_write_wins = true;
        self
    }

    pub(crate) fn prepare(&self, etag: Uuid, index: usize, now: DateTime<Utc>) -> PreparedCommand {
        let mut params = ParameterSet::new(index);

        let mut assignments = vec![
            (quote(system::ETAG), params.bind(system::ETAG, etag)),
            (quote(system::MODIFIED_AT), params.bind(system::MODIFIED_AT, now)),
            (
                quote(system::LAST_OPERATION),
                params.bind(system::LAST_OPERATION, Operation::Updated),
            ),
        ];
        assignments.extend(bind_projections(&mut params, &self.projections));

        let set = assignments
            .iter()
            .map(|(column, value)| format!("{column} = {value}"))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "UPDATE {} SET {set} WHERE {} = {}",
            quote(&self.table),
            quote(system::ID),
            params.bind(system::ID, self.id.as_str())
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
