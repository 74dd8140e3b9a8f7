//! Foreign key synthesis
//!
//! Every non many-to-many relationship needs a foreign key column on one of
//! its two entities. [`calculate`] decides whether that column still has to be
//! added; [`ensure_foreign_key`] adds it, either to the already-built model or
//! to the registry entry of a model that has not been built yet.
//!
//! ## Naming
//!
//! The column referencing `division.id` is called `division_id`: the
//! referenced table name, an underscore and the referenced column.

use crate::models::{ColumnInjection, ModelRegistry};
use schemorm_core::{PrimitiveType, SchemaError, SchemaResult};
use schemorm_ir::{ColumnArtifacts, Schemas, column, inheritance, peek, resolve};
use serde_json::{Map, Value, json};

// ============================================================================
// Naming
// ============================================================================

/// Generate the property name of a foreign key column
///
/// # Examples
///
/// - ("division", "id") -> "division_id"
/// - ("project", "code") -> "project_code"
pub fn foreign_key_property_name(tablename: &str, column: &str) -> String {
    format!("{tablename}_{column}")
}

/// Generate the `x-foreign-key` target of a foreign key column
pub fn foreign_key_target(tablename: &str, column: &str) -> String {
    format!("{tablename}.{column}")
}

// ============================================================================
// Requirement
// ============================================================================

/// Whether a foreign key column still has to be added
#[derive(Debug, Clone, PartialEq)]
pub enum ForeignKeyRequirement {
    /// The entity already declares a matching column
    Satisfied { property: String },

    /// The column is missing
    Missing {
        property: String,
        schema: Value,
        artifacts: ColumnArtifacts,
    },
}

impl ForeignKeyRequirement {
    /// Check if the column has to be added
    pub fn is_required(&self) -> bool {
        matches!(self, ForeignKeyRequirement::Missing { .. })
    }

    /// Property name of the foreign key column
    pub fn property(&self) -> &str {
        match self {
            ForeignKeyRequirement::Satisfied { property }
            | ForeignKeyRequirement::Missing { property, .. } => property,
        }
    }
}

fn registered<'a>(name: &str, schemas: &'a Schemas) -> SchemaResult<&'a Value> {
    schemas.get(name).ok_or_else(|| {
        SchemaError::malformed_relationship(format!("{name} is not a registered schema"))
    })
}

/// Flatten a registry entry
fn flat_entity(name: &str, schemas: &Schemas) -> SchemaResult<Value> {
    let (_, flat) = resolve(name, registered(name, schemas)?, schemas)?;
    Ok(flat)
}

/// Flatten a registry entry without the properties of its inheritance parent
fn own_entity(name: &str, schemas: &Schemas) -> SchemaResult<Value> {
    let (_, own) = inheritance::resolve_own(name, registered(name, schemas)?, schemas)?;
    Ok(own)
}

/// Get a property of a flat entity schema, resolved
fn flat_property(entity: &Value, property: &str, schemas: &Schemas) -> SchemaResult<Option<Value>> {
    let Some(schema) = entity
        .get("properties")
        .and_then(|properties| properties.get(property))
    else {
        return Ok(None);
    };
    let (_, flat) = resolve(property, schema, schemas)?;
    Ok(Some(flat))
}

/// Decide whether `target` needs a foreign key column to `owning.fk_column`
///
/// `target` is the entity that holds the key, `owning` the entity whose
/// column is referenced. Only the target's own table is searched for an
/// existing column: an inheriting target needs the key even when its parent
/// already has one.
pub fn calculate(
    target: &str,
    owning: &str,
    fk_column: &str,
    nullable: Option<bool>,
    schemas: &Schemas,
) -> SchemaResult<ForeignKeyRequirement> {
    let target_schema = own_entity(target, schemas)?;
    let owning_schema = flat_entity(owning, schemas)?;

    let tablename = peek::tablename(&owning_schema, schemas)?.ok_or_else(|| {
        SchemaError::malformed_relationship(format!("{owning} has no x-tablename to reference"))
    })?;
    let referenced = flat_property(&owning_schema, fk_column, schemas)?.ok_or_else(|| {
        SchemaError::malformed_relationship(format!(
            "{owning} has no {fk_column} property for the foreign key to reference"
        ))
    })?;

    let type_ = peek::primitive_type(&referenced, schemas)?;
    if !type_.is_scalar() {
        return Err(SchemaError::malformed_relationship(format!(
            "{owning}.{fk_column} cannot be referenced by a foreign key"
        )));
    }

    let property = foreign_key_property_name(&tablename, fk_column);
    let fk_target = foreign_key_target(&tablename, fk_column);

    if let Some(existing) = flat_property(&target_schema, &property, schemas)? {
        return check_existing(target, property, &existing, type_, &fk_target, schemas);
    }

    let mut schema = Map::new();
    schema.insert("type".to_string(), json!(type_.as_str()));
    if let Some(format) = peek::format(&referenced, schemas)? {
        schema.insert("format".to_string(), json!(format));
    }
    if let Some(max_length) = peek::max_length(&referenced, schemas)? {
        schema.insert("maxLength".to_string(), json!(max_length));
    }
    if let Some(nullable) = nullable {
        schema.insert("nullable".to_string(), json!(nullable));
    }
    schema.insert("x-foreign-key".to_string(), json!(fk_target));
    schema.insert("x-dict-ignore".to_string(), json!(true));

    let schema = Value::Object(schema);
    let artifacts = column::compile(&schema, None)?;
    Ok(ForeignKeyRequirement::Missing {
        property,
        schema,
        artifacts,
    })
}

/// Accept an existing column only when it matches the one that would be added
fn check_existing(
    target: &str,
    property: String,
    existing: &Value,
    type_: PrimitiveType,
    fk_target: &str,
    schemas: &Schemas,
) -> SchemaResult<ForeignKeyRequirement> {
    let existing_type = peek::type_(existing, schemas)?;
    if existing_type != type_.as_str() {
        return Err(SchemaError::malformed_relationship(format!(
            "{target}.{property} has the type {existing_type}, the foreign key requires {type_}"
        )));
    }

    match peek::foreign_key(existing, schemas)? {
        Some(existing_target) if existing_target == fk_target => {
            Ok(ForeignKeyRequirement::Satisfied { property })
        }
        Some(existing_target) => Err(SchemaError::malformed_relationship(format!(
            "{target}.{property} references {existing_target}, the foreign key requires {fk_target}"
        ))),
        None => Err(SchemaError::malformed_relationship(format!(
            "{target}.{property} must set x-foreign-key to {fk_target}"
        ))),
    }
}

// ============================================================================
// Injection
// ============================================================================

/// Make sure `target` holds a foreign key column to `owning.fk_column`
///
/// Built models receive the column through the [`ModelRegistry`]; models not
/// built yet get their registry entry wrapped in an `allOf` with a fragment
/// declaring the column. Calling this again with the same arguments changes
/// nothing.
pub fn ensure_foreign_key(
    target: &str,
    owning: &str,
    fk_column: &str,
    nullable: Option<bool>,
    schemas: &mut Schemas,
    models: &mut dyn ModelRegistry,
) -> SchemaResult<()> {
    let requirement = calculate(target, owning, fk_column, nullable, schemas)?;
    let ForeignKeyRequirement::Missing {
        property,
        schema,
        artifacts,
    } = requirement
    else {
        tracing::debug!(model = %target, property = %requirement.property(), "foreign key already present");
        return Ok(());
    };

    if models.is_materialized(target) {
        if models.has_property(target, &property) {
            return Ok(());
        }
        tracing::debug!(model = %target, property = %property, "adding foreign key to built model");
        return models.attach_column(ColumnInjection {
            model: target.to_string(),
            property,
            schema,
            artifacts,
        });
    }

    let previous = schemas.get(target).cloned().unwrap_or_else(|| json!({}));
    let mut properties = Map::new();
    properties.insert(property.clone(), schema);
    let fragment = json!({"type": "object", "properties": properties});
    schemas.replace(target, json!({"allOf": [previous, fragment]}))?;
    tracing::debug!(model = %target, property = %property, "added foreign key to schema");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
