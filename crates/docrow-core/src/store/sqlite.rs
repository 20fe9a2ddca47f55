//! SQLite backing store.

use super::{
    BackingStore, CatalogColumn, Isolation, Parameter, PreparedCommand, Row, StoreError,
    StoreTransaction,
};
use crate::schema::{format_timestamp, SqlType, Value};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{Connection, Statement, ToSql};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Busy timeout applied to every statement unless a transaction overrides it.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const INTROSPECT_SQL: &str = r#"SELECT m.name, p.name, p.type, p."notnull", p.dflt_value, p.pk
FROM sqlite_master m JOIN pragma_table_info(m.name) p
WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%'
ORDER BY m.name, p.cid"#;

/// A SQLite database behind a single connection.
///
/// Transactions are serialized on the connection; separate `SqliteStore`
/// instances opened on the same file coordinate through SQLite's own locks.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Open or create a database file. The journal is switched to WAL.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        debug!(path = %path.display(), journal_mode = %mode, "opened sqlite store");
        Self::from_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        Ok(Self {
            conn: Mutex::new(conn),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        })
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("busy_timeout", &self.busy_timeout)
            .finish_non_exhaustive()
    }
}

impl BackingStore for SqliteStore {
    fn begin(&self, isolation: Isolation) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        let conn = self.conn.lock();
        match isolation {
            Isolation::Serializable => conn.execute_batch("BEGIN IMMEDIATE")?,
            Isolation::ReadCommitted => conn.execute_batch("BEGIN DEFERRED")?,
        }

        Ok(Box::new(SqliteTransaction {
            conn,
            busy_timeout: self.busy_timeout,
            timeout_changed: false,
            finished: false,
        }))
    }
}

struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    busy_timeout: Duration,
    timeout_changed: bool,
    finished: bool,
}

impl SqliteTransaction<'_> {
    fn finish(&mut self, sql: &str) -> Result<(), StoreError> {
        self.finished = true;
        let result = self.conn.execute_batch(sql);
        if self.timeout_changed {
            self.conn.busy_timeout(self.busy_timeout)?;
        }
        Ok(result?)
    }
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn execute(&mut self, sql: &str, parameters: &[Parameter]) -> Result<u64, StoreError> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        bind(&mut stmt, parameters)?;
        let affected = stmt.raw_execute()?;
        Ok(affected as u64)
    }

    fn execute_batch(&mut self, commands: &[PreparedCommand]) -> Result<Vec<u64>, StoreError> {
        let mut counts = Vec::with_capacity(commands.len());
        for command in commands {
            counts.push(self.execute(&command.sql, &command.parameters)?);
        }
        Ok(counts)
    }

    fn query(&mut self, sql: &str, parameters: &[Parameter]) -> Result<Vec<Row>, StoreError> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        bind(&mut stmt, parameters)?;

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.raw_query();
        let mut result = Vec::new();

        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(from_value_ref(row.get_ref(i)?));
            }
            result.push(Row {
                columns: columns.clone(),
                values,
            });
        }

        Ok(result)
    }

    fn introspect(&mut self) -> Result<Vec<CatalogColumn>, StoreError> {
        let mut stmt = self.conn.prepare_cached(INTROSPECT_SQL)?;
        let columns = stmt
            .query_map([], |row| {
                let sql_type: String = row.get(2)?;
                let not_null: i64 = row.get(3)?;
                let pk: i64 = row.get(5)?;
                Ok(CatalogColumn {
                    table: row.get(0)?,
                    name: row.get(1)?,
                    sql_type: SqlType::parse(&sql_type),
                    nullable: not_null == 0 && pk == 0,
                    default: row.get(4)?,
                    primary_key: pk > 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        self.conn.busy_timeout(timeout)?;
        self.timeout_changed = true;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.finish("COMMIT")
    }

    fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        self.finish("ROLLBACK")
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.finish("ROLLBACK") {
            warn!(error = %e, "failed to roll back abandoned transaction");
        }
    }
}

fn bind(stmt: &mut Statement<'_>, parameters: &[Parameter]) -> Result<(), StoreError> {
    let mut bound = vec![false; stmt.parameter_count()];

    for parameter in parameters {
        let index = stmt
            .parameter_index(&format!("@{}", parameter.name))?
            .ok_or_else(|| StoreError::UnknownParameter(parameter.name.clone()))?;
        stmt.raw_bind_parameter(index, &parameter.value)?;
        bound[index - 1] = true;
    }

    if let Some(missing) = bound.iter().position(|b| !b) {
        let name = stmt
            .parameter_name(missing + 1)
            .map(|n| n.trim_start_matches(['@', ':', '$']).to_string())
            .unwrap_or_else(|| format!("?{}", missing + 1));
        return Err(StoreError::UnknownParameter(name));
    }

    Ok(())
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Owned(SqlValue::Real(*r)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(bytes) => ToSqlOutput::Borrowed(ValueRef::Blob(bytes)),
            Value::Uuid(u) => ToSqlOutput::Owned(SqlValue::Text(u.hyphenated().to_string())),
            Value::Timestamp(ts) => ToSqlOutput::Owned(SqlValue::Text(format_timestamp(ts))),
        })
    }
}
