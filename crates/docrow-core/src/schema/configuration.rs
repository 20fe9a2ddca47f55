//! Document configuration and the immutable schema built from it.

use super::column::{is_system_column, is_valid_identifier, system, Column};
use super::design::{DocumentDesign, Projection};
use super::table::Table;
use super::types::Value;
use crate::error::{Error, Result};
use crate::migration::{DocumentMigration, DocumentTransform, SchemaMigration};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct DesignSpec {
    table: Option<String>,
    parent: Option<String>,
    discriminator: Option<String>,
    projections: Vec<Projection>,
}

/// Mutable configuration: tables, document designs and migrations.
///
/// Freeze it with [`Configuration::build`]; the resulting [`Schema`] is
/// immutable for the lifetime of the store.
#[derive(Debug, Default)]
pub struct Configuration {
    tables: Vec<Table>,
    designs: BTreeMap<String, DesignSpec>,
    design_order: Vec<String>,
    schema_migrations: Vec<SchemaMigration>,
    document_migrations: BTreeMap<u32, Vec<DocumentTransform>>,
}

/// Builder for one document design.
pub struct DesignBuilder<'a> {
    spec: &'a mut DesignSpec,
}

impl<'a> DesignBuilder<'a> {
    /// Store documents in the given table. Defaults to the base design's
    /// table, or the design name for root designs.
    pub fn table(self, table: impl Into<String>) -> Self {
        self.spec.table = Some(table.into());
        self
    }

    /// Derive from a base design.
    pub fn extends(self, parent: impl Into<String>) -> Self {
        self.spec.parent = Some(parent.into());
        self
    }

    /// Override the discriminator tag. Defaults to the design name.
    pub fn discriminator(self, tag: impl Into<String>) -> Self {
        self.spec.discriminator = Some(tag.into());
        self
    }

    /// Project a column from the document.
    pub fn project<F>(self, column: Column, projector: F) -> Self
    where
        F: Fn(&JsonValue) -> Value + Send + Sync + 'static,
    {
        self.with_projection(Projection::new(column, projector))
    }

    /// Add a prepared projection. A later projection for the same column
    /// replaces the earlier one.
    pub fn with_projection(self, projection: Projection) -> Self {
        self.spec
            .projections
            .retain(|p| p.column.name != projection.column.name);
        self.spec.projections.push(projection);
        self
    }
}

impl Configuration {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare or extend a document design.
    pub fn document(&mut self, name: impl Into<String>) -> DesignBuilder<'_> {
        let name = name.into();
        if !self.designs.contains_key(&name) {
            self.design_order.push(name.clone());
        }

        DesignBuilder {
            spec: self.designs.entry(name).or_default(),
        }
    }

    /// Declare a table directly. Columns are merged with any design stored
    /// in a table of the same name.
    pub fn table(&mut self, table: Table) -> &mut Self {
        self.tables.push(table);
        self
    }

    /// Register a hand-authored schema migration.
    pub fn schema_migration(&mut self, migration: SchemaMigration) -> &mut Self {
        self.schema_migrations.push(migration);
        self
    }

    /// Register a document transform moving rows from `from_version` to
    /// `to_version`. Several transforms may target the same version; they run
    /// in registration order.
    pub fn register_migration(
        &mut self,
        from_version: u32,
        to_version: u32,
        transform: DocumentTransform,
    ) -> Result<&mut Self> {
        if from_version.checked_add(1) != Some(to_version) {
            return Err(Error::Configuration(format!(
                "document migration must advance exactly one version, got {from_version} -> {to_version}"
            )));
        }

        self.document_migrations
            .entry(to_version)
            .or_default()
            .push(transform);
        Ok(self)
    }

    /// Validate and freeze the configuration.
    pub fn build(self) -> Result<Schema> {
        let mut designs = BTreeMap::new();
        for name in &self.design_order {
            resolve_design(name, &self.designs, &mut designs, &mut Vec::new())?;
        }

        let mut tables: BTreeMap<String, Table> = BTreeMap::new();
        let mut by_discriminator = HashMap::new();

        for design in designs.values() {
            let table = tables
                .entry(design.table.clone())
                .or_insert_with(|| Table::document(design.table.clone()));

            for projection in &design.projections {
                table.register(projection.column.clone())?;
            }

            let key = (design.table.clone(), design.discriminator.clone());
            if let Some(existing) = by_discriminator.insert(key, design.name.clone()) {
                return Err(Error::Configuration(format!(
                    "designs '{existing}' and '{}' share discriminator '{}' in table '{}'",
                    design.name, design.discriminator, design.table
                )));
            }
        }

        for declared in self.tables {
            for column in declared.columns() {
                validate_column_name(declared.name(), &column.name)?;
            }
            match tables.get_mut(declared.name()) {
                Some(existing) => {
                    if existing.kind() != declared.kind() {
                        return Err(Error::Configuration(format!(
                            "table '{}' is declared both as a plain and a document table",
                            declared.name()
                        )));
                    }
                    for column in declared.columns() {
                        existing.register(column.clone())?;
                    }
                }
                None => {
                    validate_table_name(declared.name())?;
                    tables.insert(declared.name().to_string(), declared);
                }
            }
        }

        let mut schema_migrations = self.schema_migrations;
        schema_migrations.sort_by_key(|m| m.version);
        for pair in schema_migrations.windows(2) {
            if pair[0].version == pair[1].version {
                return Err(Error::Configuration(format!(
                    "schema migration version {} registered twice",
                    pair[0].version
                )));
            }
        }
        if schema_migrations.first().is_some_and(|m| m.version == 0) {
            return Err(Error::Configuration(
                "schema migration versions start at 1".to_string(),
            ));
        }

        let document_migrations: Vec<DocumentMigration> = self
            .document_migrations
            .into_iter()
            .map(|(to_version, transforms)| DocumentMigration {
                to_version,
                transforms,
            })
            .collect();

        for transform in document_migrations.iter().flat_map(|m| &m.transforms) {
            if let Some(design) = transform.design() {
                if !designs.contains_key(design) {
                    return Err(Error::UnknownDesign(design.to_string()));
                }
            }
        }

        let current_version = document_migrations
            .last()
            .map(|m| m.to_version)
            .unwrap_or(0);

        debug!(
            tables = tables.len(),
            designs = designs.len(),
            current_version,
            "schema built"
        );

        Ok(Schema {
            tables,
            designs: designs
                .into_iter()
                .map(|(name, design)| (name, Arc::new(design)))
                .collect(),
            by_discriminator,
            schema_migrations,
            document_migrations,
            current_version,
        })
    }
}

fn resolve_design(
    name: &str,
    specs: &BTreeMap<String, DesignSpec>,
    resolved: &mut BTreeMap<String, DocumentDesign>,
    visiting: &mut Vec<String>,
) -> Result<()> {
    if resolved.contains_key(name) {
        return Ok(());
    }
    if visiting.iter().any(|v| v == name) {
        return Err(Error::Configuration(format!(
            "design inheritance cycle through '{name}'"
        )));
    }

    let spec = specs
        .get(name)
        .ok_or_else(|| Error::UnknownDesign(name.to_string()))?;

    let (table, lineage, mut projections) = match &spec.parent {
        Some(parent) => {
            visiting.push(name.to_string());
            resolve_design(parent, specs, resolved, visiting)?;
            visiting.pop();

            let base = &resolved[parent.as_str()];
            if let Some(table) = &spec.table {
                if *table != base.table {
                    return Err(Error::Configuration(format!(
                        "design '{name}' must be stored in its base design's table '{}', not '{table}'",
                        base.table
                    )));
                }
            }

            let mut lineage = vec![name.to_string()];
            lineage.extend(base.lineage.iter().cloned());
            (base.table.clone(), lineage, base.projections.clone())
        }
        None => (
            spec.table.clone().unwrap_or_else(|| name.to_string()),
            vec![name.to_string()],
            Vec::new(),
        ),
    };

    validate_table_name(&table)?;

    for projection in &spec.projections {
        validate_column_name(&table, &projection.column.name)?;
        if is_system_column(&projection.column.name) {
            return Err(Error::Configuration(format!(
                "design '{name}' cannot project system column '{}'",
                projection.column.name
            )));
        }

        match projections
            .iter_mut()
            .find(|p| p.column.name == projection.column.name)
        {
            Some(inherited) => *inherited = projection.clone(),
            None => projections.push(projection.clone()),
        }
    }

    let design = DocumentDesign {
        name: name.to_string(),
        table,
        discriminator: spec
            .discriminator
            .clone()
            .unwrap_or_else(|| name.to_string()),
        parent: spec.parent.clone(),
        lineage,
        projections,
    };

    resolved.insert(name.to_string(), design);
    Ok(())
}

fn validate_table_name(name: &str) -> Result<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(Error::Configuration(format!("invalid table name '{name}'")))
    }
}

fn validate_column_name(table: &str, name: &str) -> Result<()> {
    if !is_valid_identifier(name) {
        return Err(Error::Configuration(format!(
            "invalid column name '{table}.{name}'"
        )));
    }
    if system::RESERVED_PARAMETERS.contains(&name) {
        return Err(Error::Configuration(format!(
            "column name '{table}.{name}' is reserved"
        )));
    }
    Ok(())
}

/// The immutable schema registry shared by every component.
#[derive(Debug)]
pub struct Schema {
    tables: BTreeMap<String, Table>,
    designs: BTreeMap<String, Arc<DocumentDesign>>,
    by_discriminator: HashMap<(String, String), String>,
    schema_migrations: Vec<SchemaMigration>,
    document_migrations: Vec<DocumentMigration>,
    current_version: u32,
}

impl Schema {
    /// Tables ordered by name.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Document tables ordered by name.
    pub fn document_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values().filter(|t| t.is_document())
    }

    /// Look up a table.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Look up a design by name.
    pub fn design(&self, name: &str) -> Result<&Arc<DocumentDesign>> {
        self.designs
            .get(name)
            .ok_or_else(|| Error::UnknownDesign(name.to_string()))
    }

    /// All designs ordered by name.
    pub fn designs(&self) -> impl Iterator<Item = &Arc<DocumentDesign>> {
        self.designs.values()
    }

    /// Resolve the design of a stored row from its table and discriminator.
    pub fn design_for(&self, table: &str, discriminator: &str) -> Result<&Arc<DocumentDesign>> {
        let name = self
            .by_discriminator
            .get(&(table.to_string(), discriminator.to_string()))
            .ok_or_else(|| Error::UnknownDesign(format!("{table}/{discriminator}")))?;
        self.design(name)
    }

    /// Hand-authored schema migrations ordered by version.
    pub fn schema_migrations(&self) -> &[SchemaMigration] {
        &self.schema_migrations
    }

    /// Highest hand-authored schema version, 0 if none.
    pub fn schema_version(&self) -> u32 {
        self.schema_migrations
            .last()
            .map(|m| m.version)
            .unwrap_or(0)
    }

    /// Document migrations ordered by target version.
    pub fn document_migrations(&self) -> &[DocumentMigration] {
        &self.document_migrations
    }

    /// Version stamped on every document written by application code.
    pub fn current_version(&self) -> u32 {
        self.current_version
    }
}
