//! Reference-aware keyword accessors
//!
//! [`peek_key`] fetches the effective value of one keyword without flattening
//! the whole schema: the keyword is looked up on the schema itself, then
//! behind its `$ref`, then in each `allOf` fragment in order. The typed
//! accessors below validate the primitive type of what they find.

use crate::inheritance::Inherits;
use crate::reference::{Reference, get_ref};
use crate::registry::Schemas;
use crate::resolve::enter;
use schemorm_core::{PrimitiveType, SchemaError, SchemaResult};
use serde_json::{Map, Value};

// ============================================================================
// Generic Lookup
// ============================================================================

/// Get the effective value of a keyword, following `$ref` and `allOf`
///
/// A JSON `null` counts as absent.
pub fn peek_key(schema: &Value, schemas: &Schemas, key: &str) -> SchemaResult<Option<Value>> {
    peek_key_skipping(schema, schemas, key, None)
}

/// Like [`peek_key`], without entering references to `skip_name`
pub fn peek_key_skipping(
    schema: &Value,
    schemas: &Schemas,
    key: &str,
    skip_name: Option<&str>,
) -> SchemaResult<Option<Value>> {
    let mut chain = Vec::new();
    peek_chain(schema, schemas, key, skip_name, &mut chain)
}

fn peek_chain(
    schema: &Value,
    schemas: &Schemas,
    key: &str,
    skip_name: Option<&str>,
    chain: &mut Vec<String>,
) -> SchemaResult<Option<Value>> {
    let object = schema
        .as_object()
        .ok_or_else(|| SchemaError::malformed_schema("schemas must be objects"))?;

    if let Some(value) = object.get(key).filter(|value| !value.is_null()) {
        return Ok(Some(value.clone()));
    }

    if let Some(reference) = object.get("$ref") {
        let reference = reference
            .as_str()
            .ok_or_else(|| SchemaError::malformed_schema("A $ref value must be of type string"))?;
        let parsed = Reference::parse(reference)?;
        if skip_name == Some(parsed.name()) {
            return Ok(None);
        }

        enter(chain, &parsed)?;
        let (_, ref_schema) = get_ref(reference, schemas)?;
        return peek_chain(&ref_schema, schemas, key, skip_name, chain);
    }

    if let Some(all_of) = object.get("allOf") {
        let fragments = all_of
            .as_array()
            .ok_or_else(|| SchemaError::malformed_schema("An allOf value must be a list"))?;
        for fragment in fragments {
            let mut branch = chain.clone();
            if let Some(value) = peek_chain(fragment, schemas, key, skip_name, &mut branch)? {
                return Ok(Some(value));
            }
        }
    }

    Ok(None)
}

// ============================================================================
// Value Checks
// ============================================================================

fn wrong_type(key: &str, expected: &str) -> SchemaError {
    SchemaError::malformed_schema(format!("A {key} value must be of type {expected}"))
}

pub(crate) fn expect_bool(key: &str, value: &Value) -> SchemaResult<bool> {
    value.as_bool().ok_or_else(|| wrong_type(key, "boolean"))
}

pub(crate) fn expect_str(key: &str, value: &Value) -> SchemaResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| wrong_type(key, "string"))
}

pub(crate) fn expect_u64(key: &str, value: &Value) -> SchemaResult<u64> {
    value.as_u64().ok_or_else(|| wrong_type(key, "non-negative integer"))
}

pub(crate) fn expect_object(key: &str, value: &Value) -> SchemaResult<Map<String, Value>> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| wrong_type(key, "object"))
}

/// Check that a default value matches the declared type
pub(crate) fn check_default(ty: PrimitiveType, value: &Value) -> SchemaResult<()> {
    let matches = match ty {
        PrimitiveType::Integer => value.is_i64() || value.is_u64(),
        PrimitiveType::Number => value.is_number(),
        PrimitiveType::String => value.is_string(),
        PrimitiveType::Boolean => value.is_boolean(),
        PrimitiveType::Object => value.is_object(),
        PrimitiveType::Array => value.is_array(),
    };

    if matches {
        Ok(())
    } else {
        Err(SchemaError::malformed_schema(format!(
            "The default value {value} does not match the type {ty}"
        )))
    }
}

fn peek_bool(schema: &Value, schemas: &Schemas, key: &str) -> SchemaResult<Option<bool>> {
    peek_key(schema, schemas, key)?
        .map(|value| expect_bool(key, &value))
        .transpose()
}

fn peek_str(schema: &Value, schemas: &Schemas, key: &str) -> SchemaResult<Option<String>> {
    peek_key(schema, schemas, key)?
        .map(|value| expect_str(key, &value))
        .transpose()
}

// ============================================================================
// Standard Keywords
// ============================================================================

/// The `type` keyword; absence is a [`SchemaError::TypeMissing`]
pub fn type_(schema: &Value, schemas: &Schemas) -> SchemaResult<String> {
    peek_str(schema, schemas, "type")?
        .ok_or_else(|| SchemaError::type_missing("Every property requires a type"))
}

/// The `type` keyword parsed into a [`PrimitiveType`]
pub fn primitive_type(schema: &Value, schemas: &Schemas) -> SchemaResult<PrimitiveType> {
    PrimitiveType::parse(&type_(schema, schemas)?)
}

pub fn nullable(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<bool>> {
    peek_bool(schema, schemas, "nullable")
}

pub fn format(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<String>> {
    peek_str(schema, schemas, "format")
}

pub fn max_length(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<u64>> {
    peek_key(schema, schemas, "maxLength")?
        .map(|value| expect_u64("maxLength", &value))
        .transpose()
}

pub fn read_only(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<bool>> {
    peek_bool(schema, schemas, "readOnly")
}

pub fn write_only(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<bool>> {
    peek_bool(schema, schemas, "writeOnly")
}

pub fn description(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<String>> {
    peek_str(schema, schemas, "description")
}

/// The `items` schema of an array
pub fn items(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<Value>> {
    match peek_key(schema, schemas, "items")? {
        Some(items) if items.is_object() => Ok(Some(items)),
        Some(_) => Err(wrong_type("items", "object")),
        None => Ok(None),
    }
}

/// The `default` keyword, checked against the schema's type
pub fn default(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<Value>> {
    let Some(value) = peek_key(schema, schemas, "default")? else {
        return Ok(None);
    };
    check_default(primitive_type(schema, schemas)?, &value)?;
    Ok(Some(value))
}

// ============================================================================
// Extension Keywords
// ============================================================================

pub fn tablename(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<String>> {
    peek_str(schema, schemas, "x-tablename")
}

pub fn primary_key(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<bool>> {
    peek_bool(schema, schemas, "x-primary-key")
}

pub fn autoincrement(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<bool>> {
    peek_bool(schema, schemas, "x-autoincrement")
}

pub fn index(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<bool>> {
    peek_bool(schema, schemas, "x-index")
}

pub fn unique(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<bool>> {
    peek_bool(schema, schemas, "x-unique")
}

pub fn foreign_key(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<String>> {
    peek_str(schema, schemas, "x-foreign-key")
}

pub fn foreign_key_column(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<String>> {
    peek_str(schema, schemas, "x-foreign-key-column")
}

pub fn backref(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<String>> {
    peek_str(schema, schemas, "x-backref")
}

pub fn uselist(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<bool>> {
    peek_bool(schema, schemas, "x-uselist")
}

pub fn secondary(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<String>> {
    peek_str(schema, schemas, "x-secondary")
}

pub fn kwargs(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<Map<String, Value>>> {
    peek_key(schema, schemas, "x-kwargs")?
        .map(|value| expect_object("x-kwargs", &value))
        .transpose()
}

pub fn json(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<bool>> {
    peek_bool(schema, schemas, "x-json")
}

pub fn dict_ignore(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<bool>> {
    peek_bool(schema, schemas, "x-dict-ignore")
}

pub fn inherits(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<Inherits>> {
    match peek_key(schema, schemas, "x-inherits")? {
        None => Ok(None),
        Some(Value::Bool(enabled)) => Ok(Some(Inherits::Enabled(enabled))),
        Some(Value::String(parent)) => Ok(Some(Inherits::Parent(parent))),
        Some(_) => Err(wrong_type("x-inherits", "boolean or string")),
    }
}

pub fn mixins(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<Value>> {
    peek_key(schema, schemas, "x-mixins")
}

pub fn composite_index(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<Value>> {
    peek_key(schema, schemas, "x-composite-index")
}

pub fn composite_unique(schema: &Value, schemas: &Schemas) -> SchemaResult<Option<Value>> {
    peek_key(schema, schemas, "x-composite-unique")
}

// ============================================================================
// Tests
// ============================================================================
