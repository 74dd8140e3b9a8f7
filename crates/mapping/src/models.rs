//! Compiled models
//!
//! [`ModelArtifacts`] is everything the assembly step needs to build one
//! mapped class. [`ModelRegistry`] is the seam between the compiler and
//! whatever holds already-built models: the foreign key synthesizer asks it
//! whether a model exists yet and hands it new columns when it does.
//! [`CompiledModels`] is the in-memory implementation used by the compiler.

use schemorm_core::{SchemaError, SchemaResult};
use schemorm_ir::{ColumnArtifacts, CompositeIndex, CompositeUnique, RelationshipArtifacts};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

// ============================================================================
// Model Artifacts
// ============================================================================

/// Artifacts of one property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyArtifacts {
    Column(ColumnArtifacts),
    Relationship(RelationshipArtifacts),
}

/// One compiled property together with its rewritten schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProperty {
    /// Property name
    pub name: String,

    /// Column or relationship artifacts
    pub artifacts: PropertyArtifacts,

    /// Property schema with references replaced by `x-de-$ref`
    pub schema: Value,
}

/// Everything needed to build one mapped model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifacts {
    /// Entity name
    pub name: String,

    /// Table name
    pub tablename: String,

    /// Entity this model inherits from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Properties in declaration order
    pub properties: Vec<ModelProperty>,

    /// Required property names
    #[serde(default)]
    pub required: Vec<String>,

    /// Reverse properties declared by other models
    #[serde(default)]
    pub backrefs: Map<String, Value>,

    #[serde(default)]
    pub composite_indexes: Vec<CompositeIndex>,

    #[serde(default)]
    pub composite_uniques: Vec<CompositeUnique>,

    /// Import paths of mixin classes
    #[serde(default)]
    pub mixins: Vec<String>,

    /// Extra keyword arguments for the model class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kwargs: Option<Map<String, Value>>,
}

impl ModelArtifacts {
    /// Create an empty model
    pub fn new(name: impl Into<String>, tablename: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tablename: tablename.into(),
            parent: None,
            description: None,
            properties: Vec::new(),
            required: Vec::new(),
            backrefs: Map::new(),
            composite_indexes: Vec::new(),
            composite_uniques: Vec::new(),
            mixins: Vec::new(),
            kwargs: None,
        }
    }

    /// Get a property by name
    pub fn property(&self, name: &str) -> Option<&ModelProperty> {
        self.properties.iter().find(|property| property.name == name)
    }

    /// Check if a property exists
    pub fn has_property(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    /// Get the column artifacts of a property
    pub fn column(&self, name: &str) -> Option<&ColumnArtifacts> {
        match &self.property(name)?.artifacts {
            PropertyArtifacts::Column(column) => Some(column),
            PropertyArtifacts::Relationship(_) => None,
        }
    }

    /// Get the relationship artifacts of a property
    pub fn relationship(&self, name: &str) -> Option<&RelationshipArtifacts> {
        match &self.property(name)?.artifacts {
            PropertyArtifacts::Relationship(relationship) => Some(relationship),
            PropertyArtifacts::Column(_) => None,
        }
    }

    /// Iterate over column properties
    pub fn columns(&self) -> impl Iterator<Item = (&str, &ColumnArtifacts)> {
        self.properties
            .iter()
            .filter_map(|property| match &property.artifacts {
                PropertyArtifacts::Column(column) => Some((property.name.as_str(), column)),
                PropertyArtifacts::Relationship(_) => None,
            })
    }

    /// Iterate over relationship properties
    pub fn relationships(&self) -> impl Iterator<Item = (&str, &RelationshipArtifacts)> {
        self.properties
            .iter()
            .filter_map(|property| match &property.artifacts {
                PropertyArtifacts::Relationship(relationship) => {
                    Some((property.name.as_str(), relationship))
                }
                PropertyArtifacts::Column(_) => None,
            })
    }

    /// Names of the primary key columns
    pub fn primary_keys(&self) -> Vec<&str> {
        self.columns()
            .filter(|(_, column)| column.primary_key)
            .map(|(name, _)| name)
            .collect()
    }

    /// The model schema used for dictionary conversion
    pub fn schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .properties
            .iter()
            .map(|property| (property.name.clone(), property.schema.clone()))
            .collect();

        let mut schema = json!({
            "type": "object",
            "x-tablename": self.tablename,
            "properties": properties,
        });
        if let Some(object) = schema.as_object_mut() {
            if !self.required.is_empty() {
                object.insert("required".to_string(), json!(self.required));
            }
            if !self.backrefs.is_empty() {
                object.insert("x-backrefs".to_string(), Value::Object(self.backrefs.clone()));
            }
            if let Some(description) = &self.description {
                object.insert("description".to_string(), Value::String(description.clone()));
            }
        }
        schema
    }
}

// ============================================================================
// Model Registry
// ============================================================================

/// A column the foreign key synthesizer adds to an already-built model
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInjection {
    /// Model receiving the column
    pub model: String,

    /// Property name of the column
    pub property: String,

    /// Property schema of the column
    pub schema: Value,

    /// Column artifacts
    pub artifacts: ColumnArtifacts,
}

/// Access to the models that have already been built
pub trait ModelRegistry {
    /// Check if a model has been built
    fn is_materialized(&self, model: &str) -> bool;

    /// Check if a built model has a property
    fn has_property(&self, model: &str, property: &str) -> bool;

    /// Add a column to a built model
    fn attach_column(&mut self, injection: ColumnInjection) -> SchemaResult<()>;
}

// ============================================================================
// CompiledModels
// ============================================================================

/// In-memory model registry, in materialization order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledModels {
    models: Vec<ModelArtifacts>,
}

impl CompiledModels {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a built model, replacing any model with the same name
    pub fn materialize(&mut self, model: ModelArtifacts) {
        match self.models.iter_mut().find(|existing| existing.name == model.name) {
            Some(existing) => *existing = model,
            None => self.models.push(model),
        }
    }

    /// Get a built model
    pub fn get(&self, name: &str) -> Option<&ModelArtifacts> {
        self.models.iter().find(|model| model.name == name)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut ModelArtifacts> {
        self.models.iter_mut().find(|model| model.name == name)
    }

    /// Number of built models
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Check if no model has been built
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Take the built models
    pub fn into_models(self) -> Vec<ModelArtifacts> {
        self.models
    }
}

impl ModelRegistry for CompiledModels {
    fn is_materialized(&self, model: &str) -> bool {
        self.get(model).is_some()
    }

    fn has_property(&self, model: &str, property: &str) -> bool {
        self.get(model).is_some_and(|model| model.has_property(property))
    }

    fn attach_column(&mut self, injection: ColumnInjection) -> SchemaResult<()> {
        let model = self.get_mut(&injection.model).ok_or_else(|| {
            SchemaError::malformed_relationship(format!(
                "cannot add {} to {}, which has not been built",
                injection.property, injection.model
            ))
        })?;

        model.properties.push(ModelProperty {
            name: injection.property,
            artifacts: PropertyArtifacts::Column(injection.artifacts),
            schema: injection.schema,
        });
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
