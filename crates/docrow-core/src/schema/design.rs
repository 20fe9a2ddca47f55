//! Document designs: how a document type maps onto a table.

use super::column::{system, Column};
use super::types::Value;
use crate::error::Result;
use crate::serializer::Serializer;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A projector: pure function from a document to a column value.
pub type ProjectorFn = dyn Fn(&JsonValue) -> Value + Send + Sync;

/// Column values computed for one write, keyed by column name.
pub type Projections = BTreeMap<String, Value>;

/// A projected column and the function that computes it.
#[derive(Clone)]
pub struct Projection {
    /// Target column.
    pub column: Column,
    projector: Arc<ProjectorFn>,
}

impl Projection {
    /// Create a projection.
    pub fn new<F>(column: Column, projector: F) -> Self
    where
        F: Fn(&JsonValue) -> Value + Send + Sync + 'static,
    {
        Self {
            column,
            projector: Arc::new(projector),
        }
    }

    /// Project a value using a JSON pointer into the document, converted to
    /// the column type.
    pub fn pointer(column: Column, pointer: impl Into<String>) -> Self {
        let pointer = pointer.into();
        let sql_type = column.sql_type.clone();

        Self::new(column, move |doc| {
            doc.pointer(&pointer)
                .map(|v| Value::from_json(v, &sql_type))
                .unwrap_or(Value::Null)
        })
    }

    /// Compute the value for a document.
    pub fn apply(&self, document: &JsonValue) -> Value {
        (self.projector)(document)
    }
}

impl fmt::Debug for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projection")
            .field("column", &self.column.name)
            .finish_non_exhaustive()
    }
}

/// A resolved document design.
///
/// Designs form a tree: a subtype lives in its base design's table, inherits
/// its projections and may override them.
#[derive(Debug, Clone)]
pub struct DocumentDesign {
    pub(crate) name: String,
    pub(crate) table: String,
    pub(crate) discriminator: String,
    pub(crate) parent: Option<String>,
    /// This design followed by its ancestors, nearest first.
    pub(crate) lineage: Vec<String>,
    pub(crate) projections: Vec<Projection>,
}

impl DocumentDesign {
    /// Design name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table the documents are stored in.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Discriminator tag stored with every document of this design.
    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    /// Base design, if any.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Check whether this design is `design` or derives from it.
    pub fn is_a(&self, design: &str) -> bool {
        self.lineage.iter().any(|name| name == design)
    }

    /// Effective projections, inherited ones included.
    pub fn projections(&self) -> &[Projection] {
        &self.projections
    }

    /// Compute every column written for a document at the given version.
    ///
    /// Includes the payload, the discriminator, the version and a cleared
    /// reprojection marker alongside the user projections.
    pub fn project(
        &self,
        document: &JsonValue,
        serializer: &dyn Serializer,
        version: u32,
    ) -> Result<Projections> {
        let mut projections = Projections::new();

        for projection in &self.projections {
            projections.insert(projection.column.name.clone(), projection.apply(document));
        }

        projections.insert(
            system::DOCUMENT.to_string(),
            Value::Blob(serializer.serialize(document)?),
        );
        projections.insert(
            system::DISCRIMINATOR.to_string(),
            Value::Text(self.discriminator.clone()),
        );
        projections.insert(system::VERSION.to_string(), Value::from(version));
        projections.insert(system::AWAITS_REPROJECTION.to_string(), Value::Bool(false));

        Ok(projections)
    }
}
