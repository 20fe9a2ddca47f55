//! Physical column types and the values bound to them.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

/// Physical column types understood by the migration engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlType {
    /// Unbounded text.
    Text,
    /// Text with a declared maximum length.
    VarChar(u32),
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// Double precision floating point.
    Real,
    /// Boolean stored as 0/1.
    Boolean,
    /// Binary payload.
    Blob,
    /// UTC timestamp stored as RFC 3339 text.
    DateTime,
    /// UUID stored as hyphenated text.
    Uuid,
    /// A type reported by the live catalog that has no mapping.
    #[serde(skip)]
    Other(String),
}

impl SqlType {
    /// Parse a type name as reported by catalog introspection.
    pub fn parse(name: &str) -> Self {
        let upper = name.trim().to_ascii_uppercase();

        if let Some(length) = upper
            .strip_prefix("VARCHAR(")
            .and_then(|rest| rest.strip_suffix(')'))
            .and_then(|len| len.trim().parse().ok())
        {
            return SqlType::VarChar(length);
        }

        match upper.as_str() {
            "TEXT" => SqlType::Text,
            "INTEGER" | "INT" => SqlType::Integer,
            "BIGINT" => SqlType::BigInt,
            "REAL" | "DOUBLE" | "FLOAT" => SqlType::Real,
            "BOOLEAN" | "BOOL" => SqlType::Boolean,
            "BLOB" => SqlType::Blob,
            "DATETIME" | "TIMESTAMP" => SqlType::DateTime,
            "UUID" => SqlType::Uuid,
            _ => SqlType::Other(name.trim().to_string()),
        }
    }

    /// Check whether a value of this type is stored as an integer.
    pub fn is_integral(&self) -> bool {
        matches!(self, SqlType::Integer | SqlType::BigInt | SqlType::Boolean)
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Text => write!(f, "TEXT"),
            SqlType::VarChar(length) => write!(f, "VARCHAR({length})"),
            SqlType::Integer => write!(f, "INTEGER"),
            SqlType::BigInt => write!(f, "BIGINT"),
            SqlType::Real => write!(f, "REAL"),
            SqlType::Boolean => write!(f, "BOOLEAN"),
            SqlType::Blob => write!(f, "BLOB"),
            SqlType::DateTime => write!(f, "DATETIME"),
            SqlType::Uuid => write!(f, "UUID"),
            SqlType::Other(name) => write!(f, "{name}"),
        }
    }
}

/// A value bound to a statement parameter or read back from a row.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// SQL NULL.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Real(f64),
    /// Text value.
    Text(String),
    /// Binary data.
    Blob(Vec<u8>),
    /// UUID.
    Uuid(Uuid),
    /// UTC timestamp.
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Check if this is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render the value as a SQL literal, for DEFAULT clauses.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Real(r) => r.to_string(),
            Value::Text(s) => quote_literal(s),
            Value::Blob(bytes) => format!("X'{}'", hex::encode_upper(bytes)),
            Value::Uuid(u) => quote_literal(&u.hyphenated().to_string()),
            Value::Timestamp(ts) => quote_literal(&format_timestamp(ts)),
        }
    }

    /// Convert a JSON value into a column value of the given type.
    ///
    /// Values that cannot be represented in the target type become NULL.
    pub fn from_json(json: &JsonValue, sql_type: &SqlType) -> Value {
        if json.is_null() {
            return Value::Null;
        }

        match sql_type {
            SqlType::Integer | SqlType::BigInt => json
                .as_i64()
                .or_else(|| json.as_str().and_then(|s| s.parse().ok()))
                .map(Value::Integer)
                .unwrap_or(Value::Null),
            SqlType::Real => json.as_f64().map(Value::Real).unwrap_or(Value::Null),
            SqlType::Boolean => json.as_bool().map(Value::Bool).unwrap_or(Value::Null),
            SqlType::Uuid => json
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .map(Value::Uuid)
                .unwrap_or(Value::Null),
            SqlType::DateTime => json
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|ts| Value::Timestamp(ts.with_timezone(&Utc)))
                .unwrap_or(Value::Null),
            SqlType::Blob => match json {
                JsonValue::String(s) => Value::Blob(s.clone().into_bytes()),
                other => Value::Blob(other.to_string().into_bytes()),
            },
            SqlType::Text | SqlType::VarChar(_) | SqlType::Other(_) => match json {
                JsonValue::String(s) => Value::Text(s.clone()),
                other => Value::Text(other.to_string()),
            },
        }
    }

    /// Borrow the value as text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Read the value as an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Read the value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Borrow the value as bytes. Text is returned as its UTF-8 bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(bytes) => Some(bytes),
            Value::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Read the value as a UUID, parsing text if needed.
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Value::Uuid(u) => Some(*u),
            Value::Text(s) => Uuid::parse_str(s).ok(),
            _ => None,
        }
    }

    /// Read the value as a timestamp, parsing text if needed.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            Value::Text(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|ts| ts.with_timezone(&Utc)),
            _ => None,
        }
    }
}

/// Format a timestamp the way it is stored.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Uuid(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}
