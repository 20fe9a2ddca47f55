//! Document migrations: versioned rewrites of stored payloads.

use crate::error::Result;
use crate::schema::DocumentDesign;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

/// A document rewrite function.
pub type TransformFn = dyn Fn(&mut JsonValue) -> Result<()> + Send + Sync;

/// A rewrite applied to documents, optionally limited to one design and its
/// subtypes.
#[derive(Clone)]
pub struct DocumentTransform {
    design: Option<String>,
    transform: Arc<TransformFn>,
}

impl DocumentTransform {
    /// Apply to every document.
    pub fn all<F>(transform: F) -> Self
    where
        F: Fn(&mut JsonValue) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            design: None,
            transform: Arc::new(transform),
        }
    }

    /// Apply to documents of `design` and its subtypes.
    pub fn for_design<F>(design: impl Into<String>, transform: F) -> Self
    where
        F: Fn(&mut JsonValue) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            design: Some(design.into()),
            transform: Arc::new(transform),
        }
    }

    /// Design this transform is limited to.
    pub fn design(&self) -> Option<&str> {
        self.design.as_deref()
    }

    /// Check whether the transform applies to documents of `design`.
    pub fn applies_to(&self, design: &DocumentDesign) -> bool {
        match &self.design {
            Some(name) => design.is_a(name),
            None => true,
        }
    }

    /// Rewrite a document in place.
    pub fn apply(&self, document: &mut JsonValue) -> Result<()> {
        (self.transform)(document)
    }
}

impl fmt::Debug for DocumentTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentTransform")
            .field("design", &self.design)
            .finish_non_exhaustive()
    }
}

/// Moves rows from `to_version - 1` to `to_version`.
#[derive(Debug, Clone)]
pub struct DocumentMigration {
    /// Version the migration produces.
    pub to_version: u32,
    /// Rewrites applied in registration order.
    pub transforms: Vec<DocumentTransform>,
}

impl DocumentMigration {
    /// Version rows must be at before the migration runs.
    pub fn from_version(&self) -> u32 {
        self.to_version - 1
    }
}
