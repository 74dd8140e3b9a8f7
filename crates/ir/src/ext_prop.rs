//! Extension property validation
//!
//! Checks the shape of every `x-*` keyword an entity or property carries and
//! parses the structured ones (`x-kwargs`, `x-mixins`, composite indexes and
//! unique constraints). Failures are reported as
//! [`SchemaError::MalformedExtensionProperty`].

use crate::peek;
use crate::registry::Schemas;
use crate::resolve::resolve;
use regex::Regex;
use schemorm_core::{PrimitiveType, ResultExt, SchemaError, SchemaResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;

static FOREIGN_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+\.\w+$").expect("valid foreign key pattern"));

static DUNDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^__\w+__$").expect("valid dunder pattern"));

static IMPORT_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+(\.\w+)+$").expect("valid import path pattern"));

// ============================================================================
// Keyword Table
// ============================================================================

/// Where an `x-kwargs` value is used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KwargsLevel {
    Entity,
    Column,
    Relationship,
}

impl KwargsLevel {
    /// Keys that collide with arguments the compiler sets itself
    fn reserved(&self) -> &'static [&'static str] {
        match self {
            KwargsLevel::Entity => &["__tablename__", "__table_args__"],
            KwargsLevel::Column => &[
                "nullable",
                "default",
                "primary_key",
                "autoincrement",
                "index",
                "unique",
                "type_",
            ],
            KwargsLevel::Relationship => &["backref", "secondary"],
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Shape {
    String,
    Boolean,
    BooleanOrString,
    ForeignKey,
    Mixins,
    Kwargs,
    Backrefs,
    CompositeIndex,
    CompositeUnique,
}

const KEYWORDS: &[(&str, Shape)] = &[
    ("x-tablename", Shape::String),
    ("x-backref", Shape::String),
    ("x-secondary", Shape::String),
    ("x-foreign-key-column", Shape::String),
    ("x-de-$ref", Shape::String),
    ("x-primary-key", Shape::Boolean),
    ("x-autoincrement", Shape::Boolean),
    ("x-index", Shape::Boolean),
    ("x-unique", Shape::Boolean),
    ("x-uselist", Shape::Boolean),
    ("x-json", Shape::Boolean),
    ("x-dict-ignore", Shape::Boolean),
    ("x-inherits", Shape::BooleanOrString),
    ("x-foreign-key", Shape::ForeignKey),
    ("x-mixins", Shape::Mixins),
    ("x-kwargs", Shape::Kwargs),
    ("x-backrefs", Shape::Backrefs),
    ("x-composite-index", Shape::CompositeIndex),
    ("x-composite-unique", Shape::CompositeUnique),
];

fn invalid(name: &str, message: impl Into<String>) -> SchemaError {
    SchemaError::malformed_extension(name, message)
}

/// Validate one extension keyword value
pub fn validate_keyword(name: &str, value: &Value, level: KwargsLevel) -> SchemaResult<()> {
    let Some((_, shape)) = KEYWORDS.iter().find(|(keyword, _)| *keyword == name) else {
        return Ok(());
    };

    match shape {
        Shape::String if !value.is_string() => Err(invalid(name, "must be a string")),
        Shape::Boolean if !value.is_boolean() => Err(invalid(name, "must be a boolean")),
        Shape::BooleanOrString if !(value.is_boolean() || value.is_string()) => {
            Err(invalid(name, "must be a boolean or a string"))
        }
        Shape::ForeignKey => foreign_key(value).map(|_| ()),
        Shape::Mixins => mixins(value).map(|_| ()),
        Shape::Kwargs => kwargs(value, level).map(|_| ()),
        Shape::Backrefs => backrefs(value),
        Shape::CompositeIndex => composite_indexes(value).map(|_| ()),
        Shape::CompositeUnique => composite_uniques(value).map(|_| ()),
        _ => Ok(()),
    }
}

// ============================================================================
// Structured Keywords
// ============================================================================

/// Parse an `x-foreign-key` value (`table.column`)
pub fn foreign_key(value: &Value) -> SchemaResult<String> {
    match value.as_str() {
        Some(target) if FOREIGN_KEY.is_match(target) => Ok(target.to_string()),
        Some(target) => Err(invalid(
            "x-foreign-key",
            format!("'{target}' is not of the form <table>.<column>"),
        )),
        None => Err(invalid("x-foreign-key", "must be a string")),
    }
}

/// Parse an `x-mixins` value into its import paths
pub fn mixins(value: &Value) -> SchemaResult<Vec<String>> {
    let paths: Vec<&str> = match value {
        Value::String(path) => vec![path.as_str()],
        Value::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| {
                item.as_str()
                    .ok_or_else(|| invalid("x-mixins", "every mixin must be a string"))
            })
            .collect::<SchemaResult<_>>()?,
        _ => return Err(invalid("x-mixins", "must be a string or a non-empty list of strings")),
    };

    let mut parsed: Vec<String> = Vec::with_capacity(paths.len());
    for path in paths {
        if !IMPORT_PATH.is_match(path) {
            return Err(invalid("x-mixins", format!("'{path}' is not a dotted import path")));
        }
        if parsed.iter().any(|existing| existing == path) {
            return Err(invalid("x-mixins", format!("'{path}' is listed more than once")));
        }
        parsed.push(path.to_string());
    }

    Ok(parsed)
}

/// Parse an `x-kwargs` value for the given level
pub fn kwargs(value: &Value, level: KwargsLevel) -> SchemaResult<Map<String, Value>> {
    let map = value
        .as_object()
        .ok_or_else(|| invalid("x-kwargs", "must be an object"))?;
    check_kwargs(map, level)?;
    Ok(map.clone())
}

/// Check the keys of an already parsed `x-kwargs` object
pub fn check_kwargs(map: &Map<String, Value>, level: KwargsLevel) -> SchemaResult<()> {
    for key in map.keys() {
        if level.reserved().contains(&key.as_str()) {
            return Err(invalid("x-kwargs", format!("the '{key}' key is not allowed here")));
        }
        if level == KwargsLevel::Entity && !DUNDER.is_match(key) {
            return Err(invalid(
                "x-kwargs",
                format!("model keys must be of the form __<name>__, found '{key}'"),
            ));
        }
    }
    Ok(())
}

fn backrefs(value: &Value) -> SchemaResult<()> {
    let map = value
        .as_object()
        .ok_or_else(|| invalid("x-backrefs", "must be an object"))?;
    match map.iter().find(|(_, schema)| !schema.is_object()) {
        Some((name, _)) => Err(invalid("x-backrefs", format!("'{name}' must map to a schema"))),
        None => Ok(()),
    }
}

// ============================================================================
// Composite Indexes and Unique Constraints
// ============================================================================

/// An index spanning one or more columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeIndex {
    /// Index name, generated by the storage engine when unset
    pub name: Option<String>,

    /// Column names or expressions
    pub expressions: Vec<String>,

    /// Whether the index enforces uniqueness
    pub unique: bool,
}

/// A unique constraint spanning one or more columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeUnique {
    /// Constraint name, generated by the storage engine when unset
    pub name: Option<String>,

    /// Column names
    pub columns: Vec<String>,
}

/// Parse an `x-composite-index` value
///
/// Accepts a list of columns, a list of such lists, an object
/// `{name?, expressions, unique?}` or a list of such objects.
pub fn composite_indexes(value: &Value) -> SchemaResult<Vec<CompositeIndex>> {
    const NAME: &str = "x-composite-index";

    composite_entries(NAME, value)?
        .into_iter()
        .map(|entry| match entry {
            Value::Object(object) => {
                let expressions = object
                    .get("expressions")
                    .ok_or_else(|| invalid(NAME, "an index object requires expressions"))?;
                Ok(CompositeIndex {
                    name: optional_string(NAME, object.get("name"))?,
                    expressions: string_list(NAME, expressions)?,
                    unique: match object.get("unique") {
                        None => false,
                        Some(unique) => unique
                            .as_bool()
                            .ok_or_else(|| invalid(NAME, "unique must be a boolean"))?,
                    },
                })
            }
            columns => Ok(CompositeIndex {
                name: None,
                expressions: string_list(NAME, &columns)?,
                unique: false,
            }),
        })
        .collect()
}

/// Parse an `x-composite-unique` value
///
/// Accepts a list of columns, a list of such lists, an object
/// `{name?, columns}` or a list of such objects.
pub fn composite_uniques(value: &Value) -> SchemaResult<Vec<CompositeUnique>> {
    const NAME: &str = "x-composite-unique";

    composite_entries(NAME, value)?
        .into_iter()
        .map(|entry| match entry {
            Value::Object(object) => {
                let columns = object
                    .get("columns")
                    .ok_or_else(|| invalid(NAME, "a unique constraint object requires columns"))?;
                Ok(CompositeUnique {
                    name: optional_string(NAME, object.get("name"))?,
                    columns: string_list(NAME, columns)?,
                })
            }
            columns => Ok(CompositeUnique {
                name: None,
                columns: string_list(NAME, &columns)?,
            }),
        })
        .collect()
}

/// Split a composite value into one entry per index/constraint
fn composite_entries(name: &str, value: &Value) -> SchemaResult<Vec<Value>> {
    match value {
        Value::Object(_) => Ok(vec![value.clone()]),
        Value::Array(items) if items.is_empty() => Err(invalid(name, "must not be empty")),
        Value::Array(items) if items.iter().all(Value::is_string) => Ok(vec![value.clone()]),
        Value::Array(items) => Ok(items.clone()),
        _ => Err(invalid(name, "must be a list or an object")),
    }
}

fn string_list(name: &str, value: &Value) -> SchemaResult<Vec<String>> {
    let items = value
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| invalid(name, "columns must be a non-empty list"))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid(name, "columns must be strings"))
        })
        .collect()
}

fn optional_string(name: &str, value: Option<&Value>) -> SchemaResult<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(invalid(name, "name must be a string")),
    }
}

// ============================================================================
// Entity Validation
// ============================================================================

/// Validate the extension keywords of an entity and of all of its properties
pub fn validate_entity(name: &str, schema: &Value, schemas: &Schemas) -> SchemaResult<()> {
    let (_, flat) = resolve(name, schema, schemas)?;
    let Some(object) = flat.as_object() else {
        return Ok(());
    };

    for (key, value) in object {
        validate_keyword(key, value, KwargsLevel::Entity).with_context(name)?;
    }

    let Some(properties) = object.get("properties") else {
        return Ok(());
    };
    let properties = properties
        .as_object()
        .ok_or_else(|| SchemaError::malformed_schema(format!("{name}: properties must be an object")))?;

    for (property, property_schema) in properties {
        validate_property(property, property_schema, schemas)
            .with_context(format!("{name}.{property}"))?;
    }

    Ok(())
}

/// Validate the extension keywords written on a property schema
///
/// Keywords inside `allOf` fragments and `items` are checked; referenced
/// entities are not, they are validated as entities of their own.
pub fn validate_property(name: &str, schema: &Value, schemas: &Schemas) -> SchemaResult<()> {
    let (_, flat) = resolve(name, schema, schemas)?;
    let is_relationship = matches!(
        peek::primitive_type(&flat, schemas),
        Ok(PrimitiveType::Object | PrimitiveType::Array)
    ) && peek::json(&flat, schemas)? != Some(true);

    let level = if is_relationship {
        KwargsLevel::Relationship
    } else {
        KwargsLevel::Column
    };
    validate_fragment(schema, level)
}

fn validate_fragment(schema: &Value, level: KwargsLevel) -> SchemaResult<()> {
    let Some(object) = schema.as_object() else {
        return Ok(());
    };

    for (key, value) in object {
        match key.as_str() {
            "allOf" => {
                for fragment in value.as_array().into_iter().flatten() {
                    validate_fragment(fragment, level)?;
                }
            }
            "items" => validate_fragment(value, level)?,
            _ => validate_keyword(key, value, level)?,
        }
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
