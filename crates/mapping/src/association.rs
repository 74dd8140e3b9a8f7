//! Association tables of many-to-many relationships
//!
//! The table named by `x-secondary` gets one foreign key column per side,
//! each referencing that side's single primary key.

use crate::foreign_key::{foreign_key_property_name, foreign_key_target};
use schemorm_core::{SchemaError, SchemaResult};
use schemorm_ir::{ColumnArtifacts, Schemas, column, peek, resolve};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// One foreign key column of an association table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationColumn {
    /// Column name, `{tablename}_{primary_key}`
    pub name: String,

    /// Column artifacts, including the foreign key
    pub artifacts: ColumnArtifacts,
}

/// Association table joining two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationTable {
    /// Table name
    pub name: String,

    /// One column per side, the declaring side first
    pub columns: [AssociationColumn; 2],
}

impl AssociationTable {
    /// Check if two descriptions define the same table, whichever side declared it
    pub fn is_equivalent(&self, other: &AssociationTable) -> bool {
        let [a, b] = &self.columns;
        self.name == other.name
            && (other.columns == [a.clone(), b.clone()] || other.columns == [b.clone(), a.clone()])
    }

    /// Get a column by name
    pub fn column(&self, name: &str) -> Option<&AssociationColumn> {
        self.columns.iter().find(|column| column.name == name)
    }
}

/// Build the association table joining `left` and `right`
pub fn build(secondary: &str, left: &str, right: &str, schemas: &Schemas) -> SchemaResult<AssociationTable> {
    let left_column = side_column(secondary, left, schemas)?;
    let right_column = side_column(secondary, right, schemas)?;

    if left_column.name == right_column.name {
        return Err(SchemaError::malformed_relationship(format!(
            "{secondary}: both columns of the association table would be called {}",
            left_column.name
        )));
    }

    Ok(AssociationTable {
        name: secondary.to_string(),
        columns: [left_column, right_column],
    })
}

/// The column referencing one side's primary key
fn side_column(secondary: &str, name: &str, schemas: &Schemas) -> SchemaResult<AssociationColumn> {
    let schema = schemas.get(name).ok_or_else(|| {
        SchemaError::malformed_relationship(format!("{secondary}: {name} is not a registered schema"))
    })?;
    let (_, flat) = resolve(name, schema, schemas)?;

    let tablename = peek::tablename(&flat, schemas)?.ok_or_else(|| {
        SchemaError::malformed_relationship(format!("{secondary}: {name} has no x-tablename"))
    })?;

    let properties = flat
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let mut primary_keys = Vec::new();
    for (property, property_schema) in &properties {
        let (_, resolved) = resolve(property, property_schema, schemas)?;
        if peek::primary_key(&resolved, schemas)? == Some(true) {
            primary_keys.push((property.clone(), resolved));
        }
    }

    let (primary_key, key_schema) = match primary_keys.len() {
        1 => primary_keys.remove(0),
        0 => {
            return Err(SchemaError::malformed_relationship(format!(
                "{secondary}: {name} has no primary key"
            )));
        }
        _ => {
            return Err(SchemaError::malformed_relationship(format!(
                "{secondary}: {name} must have exactly one primary key for a many-to-many relationship"
            )));
        }
    };

    let mut column_schema = Map::new();
    column_schema.insert("type".to_string(), json!(peek::type_(&key_schema, schemas)?));
    if let Some(format) = peek::format(&key_schema, schemas)? {
        column_schema.insert("format".to_string(), json!(format));
    }
    if let Some(max_length) = peek::max_length(&key_schema, schemas)? {
        column_schema.insert("maxLength".to_string(), json!(max_length));
    }
    column_schema.insert(
        "x-foreign-key".to_string(),
        json!(foreign_key_target(&tablename, &primary_key)),
    );

    Ok(AssociationColumn {
        name: foreign_key_property_name(&tablename, &primary_key),
        artifacts: column::compile(&Value::Object(column_schema), None)?,
    })
}

// ============================================================================
// Tests
// ============================================================================
