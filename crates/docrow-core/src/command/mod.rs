//! Write commands and the batch execution pipeline.
//!
//! Every logical write is a [`Command`]. A batch of commands is prepared
//! against a single commit-wide etag: command `i` suffixes each of its
//! parameter names with `i`, so the prepared statements never collide and run
//! together in one transaction.

mod delete;
mod insert;
mod pipeline;
mod raw;
mod update;
mod upsert;

pub use delete::DeleteCommand;
pub use insert::InsertCommand;
pub use pipeline::{CommandPipeline, MAX_PARAMETERS};
pub use raw::SqlCommand;
pub use update::UpdateCommand;
pub use upsert::UpsertCommand;

use crate::schema::{Projections, Value};
use crate::store::{Parameter, PreparedCommand};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A logical write.
#[derive(Debug, Clone)]
pub enum Command {
    /// Insert a new document row.
    Insert(InsertCommand),
    /// Update an existing document row.
    Update(UpdateCommand),
    /// Tombstone a document row.
    Delete(DeleteCommand),
    /// Insert or overwrite a document row.
    Upsert(UpsertCommand),
    /// Hand-written SQL.
    Sql(SqlCommand),
}

impl Command {
    /// Prepare the command at position `index` of a batch committing `etag`
    /// at `now`.
    pub fn prepare(&self, etag: Uuid, index: usize, now: DateTime<Utc>) -> PreparedCommand {
        match self {
            Command::Insert(c) => c.prepare(etag, index, now),
            Command::Update(c) => c.prepare(etag, index, now),
            Command::Delete(c) => c.prepare(etag, index, now),
            Command::Upsert(c) => c.prepare(etag, index, now),
            Command::Sql(c) => c.prepare(index),
        }
    }

    /// Table written by the command, if known.
    pub fn table(&self) -> Option<&str> {
        match self {
            Command::Insert(c) => Some(&c.table),
            Command::Update(c) => Some(&c.table),
            Command::Delete(c) => Some(&c.table),
            Command::Upsert(c) => Some(&c.table),
            Command::Sql(_) => None,
        }
    }
}

impl From<InsertCommand> for Command {
    fn from(c: InsertCommand) -> Self {
        Command::Insert(c)
    }
}

impl From<UpdateCommand> for Command {
    fn from(c: UpdateCommand) -> Self {
        Command::Update(c)
    }
}

impl From<DeleteCommand> for Command {
    fn from(c: DeleteCommand) -> Self {
        Command::Delete(c)
    }
}

impl From<UpsertCommand> for Command {
    fn from(c: UpsertCommand) -> Self {
        Command::Upsert(c)
    }
}

impl From<SqlCommand> for Command {
    fn from(c: SqlCommand) -> Self {
        Command::Sql(c)
    }
}

/// Collects suffixed parameters for one prepared statement.
#[derive(Debug)]
pub(crate) struct ParameterSet {
    index: usize,
    parameters: Vec<Parameter>,
}

impl ParameterSet {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            parameters: Vec::new(),
        }
    }

    /// Bind `value` under `name` and return the placeholder to splice into
    /// the statement.
    pub(crate) fn bind(&mut self, name: &str, value: impl Into<Value>) -> String {
        let name = format!("{name}{}", self.index);
        let placeholder = format!("@{name}");
        self.parameters.push(Parameter::new(name, value));
        placeholder
    }

    pub(crate) fn into_parameters(self) -> Vec<Parameter> {
        self.parameters
    }
}

/// Quote an identifier.
pub(crate) fn quote(name: &str) -> String {
    format!("\"{name}\"")
}

/// Bind every projection, returning `(quoted column, placeholder)` pairs in
/// column order.
pub(crate) fn bind_projections(
    params: &mut ParameterSet,
    projections: &Projections,
) -> Vec<(String, String)> {
    projections
        .iter()
        .map(|(column, value)| (quote(column), params.bind(column, value.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_suffix() {
        let mut params = ParameterSet::new(7);
        assert_eq!(params.bind("Id", "a"), "@Id7");
        assert_eq!(params.bind("Wheels", 4i64), "@Wheels7");

        let parameters = params.into_parameters();
        assert_eq!(parameters[0].name, "Id7");
        assert_eq!(parameters[1].value, Value::Integer(4));
    }
}
