use super::{bind_projections, quote, ParameterSet};
use crate::schema::{system, Operation, Projections};
use crate::store::PreparedCommand;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Insert a new document row. Fails the batch if the id is taken.
#[derive(Debug, Clone)]
pub struct InsertCommand {
    /// Target table.
    pub table: String,
    /// Row identifier.
    pub id: String,
    /// Payload and projected columns.
    pub projections: Projections,
}

impl InsertCommand {
    /// Create an insert.
    pub fn new(table: impl Into<String>, id: impl Into<String>, projections: Projections) -> Self {
        Self {
            table: table.into(),
            id: id.into(),
            projections,
        }
    }

    pub(crate) fn prepare(&self, etag: Uuid, index: usize, now: DateTime<Utc>) -> PreparedCommand {
        let mut params = ParameterSet::new(index);

        let mut columns = vec![
            (quote(system::ID), params.bind(system::ID, self.id.as_str())),
            (quote(system::ETAG), params.bind(system::ETAG, etag)),
            (quote(system::CREATED_AT), params.bind(system::CREATED_AT, now)),
            (quote(system::MODIFIED_AT), params.bind(system::MODIFIED_AT, now)),
            (
                quote(system::LAST_OPERATION),
                params.bind(system::LAST_OPERATION, Operation::Inserted),
            ),
        ];
        columns.extend(bind_projections(&mut params, &self.projections));

        let (names, values): (Vec<_>, Vec<_>) = columns.into_iter().unzip();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({});",
            quote(&self.table),
            names.join(", "),
            values.join(", ")
        );

        PreparedCommand {
            sql,
            parameters: params.into_parameters(),
            expected_rows: Some(1),
        }
    }
}
