//! JSON schema descriptions for tooling that cannot register projector
//! closures.

use super::column::Column;
use super::configuration::Configuration;
use super::design::Projection;
use super::table::Table;
use super::types::SqlType;
use crate::error::{Error, Result};
use crate::migration::DocumentTransform;
use serde::Deserialize;
use std::path::Path;

/// A column in a schema file.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnFile {
    /// Column name.
    pub name: String,
    /// Physical type, e.g. `"integer"` or `{"varchar": 64}`.
    #[serde(rename = "type")]
    pub sql_type: SqlType,
    /// Whether NULL is allowed.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// JSON pointer into the document. Defaults to `/<name>`.
    #[serde(default)]
    pub pointer: Option<String>,
}

fn default_nullable() -> bool {
    true
}

impl ColumnFile {
    fn column(&self) -> Column {
        let column = Column::new(self.name.clone(), self.sql_type.clone());
        if self.nullable {
            column
        } else {
            column.not_null()
        }
    }
}

/// A document design in a schema file.
#[derive(Debug, Clone, Deserialize)]
pub struct DesignFile {
    /// Design name.
    pub name: String,
    /// Storage table.
    #[serde(default)]
    pub table: Option<String>,
    /// Base design.
    #[serde(default)]
    pub extends: Option<String>,
    /// Discriminator tag.
    #[serde(default)]
    pub discriminator: Option<String>,
    /// Projected columns.
    #[serde(default)]
    pub columns: Vec<ColumnFile>,
}

/// A plain table in a schema file.
#[derive(Debug, Clone, Deserialize)]
pub struct TableFile {
    /// Table name.
    pub name: String,
    /// User columns.
    #[serde(default)]
    pub columns: Vec<ColumnFile>,
}

/// Schema description loaded from JSON.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaFile {
    /// Current document version. Every step up to it is registered as an
    /// identity migration, which re-projects rows written at older versions.
    #[serde(default)]
    pub version: u32,
    /// Document designs.
    #[serde(default)]
    pub designs: Vec<DesignFile>,
    /// Plain tables.
    #[serde(default)]
    pub tables: Vec<TableFile>,
}

impl SchemaFile {
    /// Read a schema file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read schema file {}: {e}", path.display()))
        })?;
        text.parse()
    }

    /// Build the configuration application code would have written by hand.
    pub fn into_configuration(self) -> Result<Configuration> {
        let mut config = Configuration::new();

        for design in self.designs {
            let mut builder = config.document(design.name);
            if let Some(table) = design.table {
                builder = builder.table(table);
            }
            if let Some(parent) = design.extends {
                builder = builder.extends(parent);
            }
            if let Some(tag) = design.discriminator {
                builder = builder.discriminator(tag);
            }
            for column in &design.columns {
                let pointer = column
                    .pointer
                    .clone()
                    .unwrap_or_else(|| format!("/{}", column.name));
                builder = builder.with_projection(Projection::pointer(column.column(), pointer));
            }
        }

        for table in self.tables {
            let mut plain = Table::new(table.name);
            for column in &table.columns {
                plain.register(column.column())?;
            }
            config.table(plain);
        }

        for to_version in 1..=self.version {
            config.register_migration(to_version - 1, to_version, DocumentTransform::all(|_| Ok(())))?;
        }

        Ok(config)
    }
}

impl std::str::FromStr for SchemaFile {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::Configuration(format!("invalid schema file: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Value;
    use serde_json::json;

    const FILE: &str = r#"{
        "version": 2,
        "designs": [
            {
                "name": "Vehicle",
                "table": "Vehicles",
                "columns": [{ "name": "Wheels", "type": "integer", "pointer": "/spec/wheels" }]
            },
            {
                "name": "Car",
                "extends": "Vehicle",
                "discriminator": "car",
                "columns": [{ "name": "Brand", "type": { "varchar": 64 }, "nullable": false }]
            }
        ],
        "tables": [
            { "name": "Audit", "columns": [{ "name": "Actor", "type": "text" }] }
        ]
    }"#;

    #[test]
    fn test_schema_file_into_configuration() {
        let file: SchemaFile = FILE.parse().unwrap();
        let schema = file.into_configuration().unwrap().build().unwrap();

        assert_eq!(schema.current_version(), 2);
        assert_eq!(schema.document_migrations().len(), 2);

        let car = schema.design("Car").unwrap();
        assert_eq!(car.table(), "Vehicles");
        assert_eq!(car.discriminator(), "car");

        let doc = json!({"spec": {"wheels": 4}, "Brand": "Volvo"});
        let values: Vec<_> = car.projections().iter().map(|p| p.apply(&doc)).collect();
        assert_eq!(values, vec![Value::Integer(4), Value::Text("Volvo".into())]);

        let brand = schema.table("Vehicles").unwrap().column("Brand").unwrap();
        assert_eq!(brand.sql_type, SqlType::VarChar(64));
        assert!(!brand.nullable);

        let audit = schema.table("Audit").unwrap();
        assert!(!audit.is_document());
        assert!(audit.column("Actor").is_some());
    }

    #[test]
    fn test_invalid_schema_file() {
        let err = "{\"designs\": 3}".parse::<SchemaFile>().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
