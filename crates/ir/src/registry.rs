//! The schema registry
//!
//! [`Schemas`] maps entity names onto their (unresolved) schemas. It is the
//! one piece of mutable state of a compilation pass: the foreign key and
//! back-reference synthesizers rewrite entries in place, everything else only
//! reads through the resolver and peek helpers.

use schemorm_core::{SchemaError, SchemaResult};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

// ============================================================================
// Schemas
// ============================================================================

/// Entity name → entity schema, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schemas {
    /// The entity schemas
    entries: Map<String, Value>,

    /// Path of the document the schemas came from; its directory is the
    /// default context for relative remote references
    spec_path: Option<PathBuf>,
}

impl Schemas {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry from a JSON object of entity schemas
    pub fn from_value(value: Value) -> SchemaResult<Self> {
        match value {
            Value::Object(entries) => Ok(Self {
                entries,
                spec_path: None,
            }),
            other => Err(SchemaError::malformed_schema(format!(
                "schemas must be an object, found {other}"
            ))),
        }
    }

    /// Create a registry from a full document, reading `components.schemas`
    pub fn from_document(document: &Value) -> SchemaResult<Self> {
        let schemas = document
            .get("components")
            .and_then(|components| components.get("schemas"))
            .ok_or_else(|| SchemaError::not_found("document has no components.schemas"))?;
        Self::from_value(schemas.clone())
    }

    /// Load a JSON or YAML document from disk
    ///
    /// The path is remembered as the default context for remote references.
    pub fn load(path: impl AsRef<Path>) -> SchemaResult<Self> {
        let path = path.as_ref();
        let document = read_document(path)?;
        Ok(Self::from_document(&document)?.with_spec_path(path))
    }

    /// Set the path of the document these schemas came from
    pub fn with_spec_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.spec_path = Some(path.into());
        self
    }

    /// Replace the path of the document these schemas came from
    pub fn set_spec_path(&mut self, path: impl Into<PathBuf>) {
        self.spec_path = Some(path.into());
    }

    /// Get the path of the document these schemas came from
    pub fn spec_path(&self) -> Option<&Path> {
        self.spec_path.as_deref()
    }

    /// Get the schema of an entity
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    /// Check if an entity is registered
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Insert or replace the schema of an entity, returning the previous one
    pub fn insert(&mut self, name: impl Into<String>, schema: Value) -> Option<Value> {
        self.entries.insert(name.into(), schema)
    }

    /// Replace the schema of a registered entity, returning the previous one
    pub fn replace(&mut self, name: &str, schema: Value) -> SchemaResult<Value> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| SchemaError::not_found(format!("{name} is not a registered schema")))?;
        Ok(std::mem::replace(entry, schema))
    }

    /// Entity names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Entity names and schemas in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, schema)| (name.as_str(), schema))
    }

    /// Number of registered entities
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no entities are registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Document Loading
// ============================================================================

/// Read and parse a JSON or YAML document
///
/// Every failure is reported as [`SchemaError::SchemaNotFound`]: from the
/// compiler's point of view an unreadable document is a missing schema.
pub(crate) fn read_document(path: &Path) -> SchemaResult<Value> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        SchemaError::not_found(format!("failed to read '{}': {e}", path.display()))
    })?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let document: Value = match extension.as_deref() {
        Some("json") => serde_json::from_str(&text).map_err(|e| {
            SchemaError::not_found(format!("'{}' is not valid JSON: {e}", path.display()))
        })?,
        Some("yaml") | Some("yml") => serde_yaml::from_str(&text).map_err(|e| {
            SchemaError::not_found(format!("'{}' is not valid YAML: {e}", path.display()))
        })?,
        _ => {
            return Err(SchemaError::not_found(format!(
                "'{}' is neither a JSON nor a YAML document",
                path.display()
            )));
        }
    };

    if !document.is_object() {
        return Err(SchemaError::not_found(format!(
            "'{}' does not contain an object at its root",
            path.display()
        )));
    }

    Ok(document)
}

// ============================================================================
// Tests
// ============================================================================
