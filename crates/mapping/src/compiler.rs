//! # Compilation Driver
//!
//! The [`Compiler`] turns a schema registry into [`CompiledSchema`]: one
//! [`ModelArtifacts`] per constructable entity plus the association tables of
//! many-to-many relationships.
//!
//! ## Pipeline
//!
//! ```text
//! Schemas + CompilerConfig
//!         │
//!         ├──► backref::process()            (once, whole registry)
//!         │
//!         ▼  for every entity with x-tablename, in registry order
//!   ext_prop::validate_entity()
//!   relationship::gather_property()
//!         ├──► foreign_key::ensure_foreign_key()  (one-to-one, many-to-one, one-to-many)
//!         └──► association::build()               (many-to-many)
//!   column::compile()
//!         │
//!         ▼
//!   CompiledModels::materialize()
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use schemorm_ir::Schemas;
//! use schemorm_mapping::{Compiler, CompilerConfig};
//!
//! let mut schemas = Schemas::load("openapi.yaml")?;
//! let compiled = Compiler::new(CompilerConfig::default()).compile(&mut schemas)?;
//!
//! for model in &compiled.models {
//!     println!("{} -> {}", model.name, model.tablename);
//! }
//! ```

use crate::CompilerConfig;
use crate::association::{self, AssociationTable};
use crate::backref;
use crate::foreign_key::ensure_foreign_key;
use crate::models::{CompiledModels, ModelArtifacts, ModelProperty, PropertyArtifacts};
use schemorm_core::{Cardinality, ResultExt, SchemaError, SchemaResult};
use schemorm_ir::{
    RelationshipArtifacts, Schemas, column, ext_prop, inheritance, peek, relationship,
    resolve_skipping,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// CompiledSchema
// ============================================================================

/// Result of compiling a schema registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledSchema {
    /// Models in the order they were built
    pub models: Vec<ModelArtifacts>,

    /// Association tables of many-to-many relationships
    pub association_tables: Vec<AssociationTable>,
}

impl CompiledSchema {
    /// Get a model by entity name
    pub fn model(&self, name: &str) -> Option<&ModelArtifacts> {
        self.models.iter().find(|model| model.name == name)
    }

    /// Get an association table by name
    pub fn association_table(&self, name: &str) -> Option<&AssociationTable> {
        self.association_tables.iter().find(|table| table.name == name)
    }
}

// ============================================================================
// Compiler
// ============================================================================

/// Compiles entity schemas into model artifacts
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    /// Create a new compiler with the given configuration
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    /// Get the current configuration
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile every constructable entity of the registry
    ///
    /// The registry is rewritten in place: back references and foreign key
    /// columns are added to the entities that need them. The first failure
    /// aborts the pass and carries the entity and property it happened in.
    pub fn compile(&self, schemas: &mut Schemas) -> SchemaResult<CompiledSchema> {
        if let Some(spec_path) = &self.config.spec_path {
            schemas.set_spec_path(spec_path.clone());
        }

        if self.config.process_backrefs {
            backref::process(schemas)?;
        }

        let mut models = CompiledModels::new();
        let mut association_tables: Vec<AssociationTable> = Vec::new();

        let names: Vec<String> = schemas.names().map(str::to_string).collect();
        for name in names {
            let Some(model) = self
                .compile_entity(&name, schemas, &mut models, &mut association_tables)
                .with_context(name.as_str())?
            else {
                continue;
            };
            models.materialize(model);
        }

        tracing::info!(
            models = models.len(),
            association_tables = association_tables.len(),
            "schema compilation complete",
        );

        Ok(CompiledSchema {
            models: models.into_models(),
            association_tables,
        })
    }

    /// Compile one entity, `None` when it has no table
    fn compile_entity(
        &self,
        name: &str,
        schemas: &mut Schemas,
        models: &mut CompiledModels,
        association_tables: &mut Vec<AssociationTable>,
    ) -> SchemaResult<Option<ModelArtifacts>> {
        let Some(schema) = schemas.get(name).cloned() else {
            return Ok(None);
        };
        let (parent, own) = inheritance::resolve_own(name, &schema, schemas)?;
        let Some(tablename) = peek::tablename(&own, schemas)? else {
            return Ok(None);
        };

        if self.config.validate_extensions {
            ext_prop::validate_entity(name, &schema, schemas)?;
        }

        // Relationships first: they may add foreign key columns to this entity.
        let mut gathered: Vec<(String, RelationshipArtifacts)> = Vec::new();
        for (property, property_schema) in properties(&own)? {
            let artifacts = relationship::gather_property(&property, &property_schema, schemas)
                .with_context(property.as_str())?;
            let Some(artifacts) = artifacts else {
                continue;
            };

            link(name, &artifacts, schemas, models, association_tables)
                .with_context(property.as_str())?;
            gathered.push((property, artifacts));
        }

        let schema = schemas.get(name).cloned().unwrap_or(schema);
        let (_, own) = resolve_skipping(name, &schema, schemas, parent.as_deref())?;

        let required: Vec<String> = own
            .get("required")
            .and_then(Value::as_array)
            .map(|required| {
                required
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let mut model = ModelArtifacts::new(name, tablename);
        model.parent = parent;
        model.description = peek::description(&own, schemas)?;
        model.required = required;

        for (property, property_schema) in properties(&own)? {
            if let Some(index) = gathered.iter().position(|(gathered, _)| *gathered == property) {
                let (_, artifacts) = gathered.remove(index);
                model.properties.push(ModelProperty {
                    name: property,
                    schema: artifacts.property_schema(),
                    artifacts: PropertyArtifacts::Relationship(artifacts),
                });
                continue;
            }

            let Some(property_model) = compile_column(&property, &property_schema, &model.required, schemas)
                .with_context(property.as_str())?
            else {
                continue;
            };
            model.properties.push(property_model);
        }

        if let Some(backrefs) = own.get("x-backrefs").and_then(Value::as_object) {
            model.backrefs = backrefs.clone();
        }
        if let Some(value) = peek::composite_index(&own, schemas)? {
            model.composite_indexes = ext_prop::composite_indexes(&value)?;
        }
        if let Some(value) = peek::composite_unique(&own, schemas)? {
            model.composite_uniques = ext_prop::composite_uniques(&value)?;
        }
        if let Some(value) = peek::mixins(&own, schemas)? {
            model.mixins = ext_prop::mixins(&value)?;
        }
        if let Some(kwargs) = own.get("x-kwargs") {
            model.kwargs = Some(ext_prop::kwargs(kwargs, ext_prop::KwargsLevel::Entity)?);
        }

        tracing::debug!(
            model = %model.name,
            tablename = %model.tablename,
            properties = model.properties.len(),
            "compiled model"
        );
        Ok(Some(model))
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// The properties of a flat entity schema, in declaration order
fn properties(schema: &Value) -> SchemaResult<Vec<(String, Value)>> {
    match schema.get("properties") {
        None => Ok(Vec::new()),
        Some(Value::Object(properties)) => Ok(properties
            .iter()
            .map(|(name, schema)| (name.clone(), schema.clone()))
            .collect()),
        Some(_) => Err(SchemaError::malformed_schema("properties must be an object")),
    }
}

/// Create the foreign key or association table a relationship needs
fn link(
    name: &str,
    artifacts: &RelationshipArtifacts,
    schemas: &mut Schemas,
    models: &mut CompiledModels,
    association_tables: &mut Vec<AssociationTable>,
) -> SchemaResult<()> {
    match artifacts.cardinality() {
        Cardinality::ManyToMany { secondary } => {
            let table = association::build(&secondary, name, &artifacts.model_name, schemas)?;
            match association_tables.iter().find(|existing| existing.name == table.name) {
                Some(existing) if existing.is_equivalent(&table) => Ok(()),
                Some(_) => Err(SchemaError::malformed_relationship(format!(
                    "the association table {secondary} is defined twice with different columns"
                ))),
                None => {
                    tracing::debug!(table = %table.name, "built association table");
                    association_tables.push(table);
                    Ok(())
                }
            }
        }
        cardinality if cardinality.foreign_key_is_local() => ensure_foreign_key(
            name,
            &artifacts.model_name,
            &artifacts.foreign_key_column,
            artifacts.nullable,
            schemas,
            models,
        ),
        _ => ensure_foreign_key(
            &artifacts.model_name,
            name,
            &artifacts.foreign_key_column,
            None,
            schemas,
            models,
        ),
    }
}

/// Compile a column property; `None` for properties that are not stored
fn compile_column(
    property: &str,
    schema: &Value,
    required: &[String],
    schemas: &Schemas,
) -> SchemaResult<Option<ModelProperty>> {
    let (_, flat) = schemorm_ir::resolve(property, schema, schemas)?;
    let type_ = peek::primitive_type(&flat, schemas)?;
    let json = peek::json(&flat, schemas)? == Some(true);
    if !type_.is_scalar() && !json {
        return Ok(None);
    }

    let is_required = required.iter().any(|name| name == property);
    let artifacts = column::compile(&flat, Some(is_required))?;
    Ok(Some(ModelProperty {
        name: property.to_string(),
        artifacts: PropertyArtifacts::Column(artifacts),
        schema: flat,
    }))
}

// ============================================================================
// Tests
// ============================================================================
