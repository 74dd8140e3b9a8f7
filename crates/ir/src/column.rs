//! Column artifact compilation
//!
//! Turns a resolved scalar property schema into [`ColumnArtifacts`]: the
//! storage type, the key and index flags and a concrete nullability.

use crate::ext_prop::{self, KwargsLevel};
use crate::peek;
use crate::registry::Schemas;
use crate::resolve::is_flat;
use schemorm_core::{ColumnType, PrimitiveType, SchemaError, SchemaResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Everything the assembly step needs to build one storage column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnArtifacts {
    /// Declared primitive type
    #[serde(rename = "type")]
    pub type_: PrimitiveType,

    /// Storage type derived from type and format
    pub column_type: ColumnType,

    /// Declared format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Maximum length of string columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,

    /// Whether the column accepts NULL; always decided
    pub nullable: bool,

    #[serde(default)]
    pub primary_key: bool,

    #[serde(default)]
    pub autoincrement: bool,

    #[serde(default)]
    pub index: bool,

    #[serde(default)]
    pub unique: bool,

    /// Referenced column as `table.column`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,

    /// Default value, checked against the type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Extra keyword arguments for the column constructor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kwargs: Option<Map<String, Value>>,

    /// Skipped when converting instances to dictionaries
    #[serde(default)]
    pub dict_ignore: bool,

    #[serde(default)]
    pub read_only: bool,

    #[serde(default)]
    pub write_only: bool,
}

/// Compile a resolved scalar property schema
///
/// `required` is whether the property appears in the entity's `required`
/// list (`None` when the caller does not know).
pub fn compile(schema: &Value, required: Option<bool>) -> SchemaResult<ColumnArtifacts> {
    if !is_flat(schema) {
        return Err(SchemaError::malformed_schema(
            "columns are compiled from resolved schemas",
        ));
    }
    let schemas = Schemas::new();

    let type_ = peek::primitive_type(schema, &schemas)?;
    let json = peek::json(schema, &schemas)?.unwrap_or(false);
    let format = peek::format(schema, &schemas)?;

    let column_type = if json {
        ColumnType::Json
    } else if type_.is_scalar() {
        ColumnType::from_schema(type_, format.as_deref())?
    } else {
        return Err(SchemaError::malformed_schema(format!(
            "{type_} properties are relationships unless they set x-json"
        )));
    };

    let max_length = peek::max_length(schema, &schemas)?;
    if max_length.is_some() && !column_type.supports_max_length() {
        return Err(SchemaError::malformed_schema(format!(
            "maxLength is not supported for {} columns",
            column_type.display_name()
        )));
    }

    let foreign_key = peek::foreign_key(schema, &schemas)?
        .map(|target| ext_prop::foreign_key(&Value::String(target)))
        .transpose()?;

    let kwargs = peek::kwargs(schema, &schemas)?;
    if let Some(kwargs) = &kwargs {
        ext_prop::check_kwargs(kwargs, KwargsLevel::Column)?;
    }

    let autoincrement = peek::autoincrement(schema, &schemas)?.unwrap_or(false);
    let default = peek::default(schema, &schemas)?;
    let nullable = calculate_nullable(
        peek::nullable(schema, &schemas)?,
        required,
        autoincrement,
        default.is_some(),
    );

    Ok(ColumnArtifacts {
        type_,
        column_type,
        format,
        max_length,
        nullable,
        primary_key: peek::primary_key(schema, &schemas)?.unwrap_or(false),
        autoincrement,
        index: peek::index(schema, &schemas)?.unwrap_or(false),
        unique: peek::unique(schema, &schemas)?.unwrap_or(false),
        foreign_key,
        default,
        description: peek::description(schema, &schemas)?,
        kwargs,
        dict_ignore: peek::dict_ignore(schema, &schemas)?.unwrap_or(false),
        read_only: peek::read_only(schema, &schemas)?.unwrap_or(false),
        write_only: peek::write_only(schema, &schemas)?.unwrap_or(false),
    })
}

/// Decide nullability
///
/// An explicit `nullable` always wins. Otherwise a column is nullable unless
/// it is required, generated or defaulted.
pub fn calculate_nullable(
    nullable: Option<bool>,
    required: Option<bool>,
    generated: bool,
    defaulted: bool,
) -> bool {
    match nullable {
        Some(nullable) => nullable,
        None => !(required == Some(true) || generated || defaulted),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use schemorm_core::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_type_format_mapping() {
        let cases = [
            (json!({"type": "integer"}), ColumnType::Integer),
            (json!({"type": "integer", "format": "int32"}), ColumnType::Integer),
            (json!({"type": "integer", "format": "int64"}), ColumnType::BigInteger),
            (json!({"type": "number"}), ColumnType::Float),
            (json!({"type": "number", "format": "float"}), ColumnType::Float),
            (json!({"type": "string"}), ColumnType::String),
            (json!({"type": "string", "format": "password"}), ColumnType::String),
            (json!({"type": "string", "format": "byte"}), ColumnType::String),
            (json!({"type": "string", "format": "binary"}), ColumnType::Binary),
            (json!({"type": "string", "format": "date"}), ColumnType::Date),
            (json!({"type": "string", "format": "date-time"}), ColumnType::DateTime),
            (json!({"type": "boolean"}), ColumnType::Boolean),
            (json!({"type": "object", "x-json": true}), ColumnType::Json),
            (json!({"type": "integer", "x-json": true}), ColumnType::Json),
        ];

        for (schema, expected) in cases {
            let artifacts = compile(&schema, None).unwrap();
            assert_eq!(artifacts.column_type, expected, "{schema}");
        }
    }

    #[test]
    fn test_unsupported_formats() {
        for schema in [
            json!({"type": "number", "format": "double"}),
            json!({"type": "integer", "format": "int16"}),
            json!({"type": "string", "format": "uuid"}),
            json!({"type": "decimal"}),
        ] {
            let err = compile(&schema, None).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::FeatureNotImplemented, "{schema}");
        }
    }

    #[test]
    fn test_invalid_columns() {
        let err = compile(&json!({"format": "int32"}), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMissing);

        for schema in [
            json!({"type": "object"}),
            json!({"type": "integer", "maxLength": 5}),
            json!({"type": "integer", "default": "one"}),
            json!({"$ref": "#/Id"}),
        ] {
            let err = compile(&schema, None).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedSchema, "{schema}");
        }

        let err = compile(&json!({"type": "integer", "x-foreign-key": "division"}), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedExtensionProperty);

        let err = compile(&json!({"type": "integer", "x-kwargs": {"index": true}}), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedExtensionProperty);
    }

    #[test]
    fn test_full_artifacts() {
        let schema = json!({
            "type": "string",
            "maxLength": 255,
            "description": "Work email",
            "x-unique": true,
            "x-index": true,
            "x-kwargs": {"doc": "email"},
            "writeOnly": true
        });

        let artifacts = compile(&schema, Some(true)).unwrap();
        assert_eq!(
            artifacts,
            ColumnArtifacts {
                type_: PrimitiveType::String,
                column_type: ColumnType::String,
                format: None,
                max_length: Some(255),
                nullable: false,
                primary_key: false,
                autoincrement: false,
                index: true,
                unique: true,
                foreign_key: None,
                default: None,
                description: Some("Work email".to_string()),
                kwargs: Some(json!({"doc": "email"}).as_object().unwrap().clone()),
                dict_ignore: false,
                read_only: false,
                write_only: true,
            }
        );
    }

    #[test]
    fn test_foreign_key_column() {
        let schema = json!({"type": "integer", "x-foreign-key": "division.id", "x-dict-ignore": true});
        let artifacts = compile(&schema, None).unwrap();
        assert_eq!(artifacts.foreign_key.as_deref(), Some("division.id"));
        assert!(artifacts.dict_ignore);
        assert!(artifacts.nullable);
    }

    #[test]
    fn test_nullable_truth_table() {
        for nullable in [None, Some(false), Some(true)] {
            for required in [None, Some(false), Some(true)] {
                for (generated, defaulted) in [(false, false), (true, false), (false, true)] {
                    let expected = match nullable {
                        Some(true) => true,
                        Some(false) => false,
                        None => required != Some(true) && !generated && !defaulted,
                    };
                    assert_eq!(
                        calculate_nullable(nullable, required, generated, defaulted),
                        expected,
                        "nullable={nullable:?} required={required:?} generated={generated} defaulted={defaulted}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_nullable_from_schema() {
        let cases = [
            (json!({"type": "integer"}), None, true),
            (json!({"type": "integer"}), Some(false), true),
            (json!({"type": "integer"}), Some(true), false),
            (json!({"type": "integer", "nullable": true}), Some(true), true),
            (json!({"type": "integer", "nullable": false}), None, false),
            (json!({"type": "integer", "x-autoincrement": true}), None, false),
            (json!({"type": "integer", "default": 3}), None, false),
            (json!({"type": "integer", "default": 3, "nullable": true}), None, true),
        ];

        for (schema, required, expected) in cases {
            let artifacts = compile(&schema, required).unwrap();
            assert_eq!(artifacts.nullable, expected, "{schema} required={required:?}");
        }
    }
}
