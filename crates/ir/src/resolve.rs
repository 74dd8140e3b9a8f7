//! Reference and composition resolution
//!
//! [`resolve`] turns any schema node into a flat schema: `$ref` chains are
//! followed (carrying the target's name forward) and `allOf` lists are
//! resolved fragment by fragment and merged. The chain of references visited
//! on the way is tracked so that cycles fail instead of looping.

use crate::all_of;
use crate::reference::{Reference, get_ref};
use crate::registry::Schemas;
use schemorm_core::{SchemaError, SchemaResult};
use serde_json::{Map, Value};

/// Resolve a schema into its flat form
///
/// Returns the final name (the name of the last `$ref` target, or `name` when
/// the schema is not a reference) and a schema free of `$ref` and `allOf`.
pub fn resolve(name: &str, schema: &Value, schemas: &Schemas) -> SchemaResult<(String, Value)> {
    resolve_skipping(name, schema, schemas, None)
}

/// Resolve a schema, treating references to `skip_name` as empty schemas
///
/// Used to look at an entity without re-entering the entity a calculation
/// started from (self references, inheritance parents).
pub fn resolve_skipping(
    name: &str,
    schema: &Value,
    schemas: &Schemas,
    skip_name: Option<&str>,
) -> SchemaResult<(String, Value)> {
    let mut chain = Vec::new();
    resolve_chain(name, schema, schemas, skip_name, &mut chain)
}

/// Check if a schema is already flat
pub fn is_flat(schema: &Value) -> bool {
    schema
        .as_object()
        .is_some_and(|object| !object.contains_key("$ref") && !object.contains_key("allOf"))
}

fn resolve_chain(
    name: &str,
    schema: &Value,
    schemas: &Schemas,
    skip_name: Option<&str>,
    chain: &mut Vec<String>,
) -> SchemaResult<(String, Value)> {
    let object = schema
        .as_object()
        .ok_or_else(|| SchemaError::malformed_schema(format!("{name}: schemas must be objects")))?;

    if let Some(reference) = object.get("$ref") {
        let reference = reference
            .as_str()
            .ok_or_else(|| SchemaError::malformed_schema("A $ref value must be of type string"))?;
        let parsed = Reference::parse(reference)?;

        if skip_name == Some(parsed.name()) {
            return Ok((name.to_string(), Value::Object(Map::new())));
        }

        enter(chain, &parsed)?;
        let (ref_name, ref_schema) = get_ref(reference, schemas)?;
        return resolve_chain(&ref_name, &ref_schema, schemas, skip_name, chain);
    }

    if let Some(all_of) = object.get("allOf") {
        let fragments = all_of
            .as_array()
            .ok_or_else(|| SchemaError::malformed_schema("An allOf value must be a list"))?;

        let mut resolved = Vec::with_capacity(fragments.len() + 1);
        for fragment in fragments {
            let mut branch = chain.clone();
            let (_, flat) = resolve_chain(name, fragment, schemas, skip_name, &mut branch)?;
            resolved.push(flat);
        }

        // Keywords written next to allOf apply on top of the fragments.
        let siblings: Map<String, Value> = object
            .iter()
            .filter(|(key, _)| key.as_str() != "allOf")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if !siblings.is_empty() {
            resolved.push(Value::Object(siblings));
        }

        let merged = all_of::merge(&resolved);
        return resolve_chain(name, &merged, schemas, skip_name, chain);
    }

    Ok((name.to_string(), schema.clone()))
}

/// Record a reference on the chain, failing if it was already visited
pub(crate) fn enter(chain: &mut Vec<String>, reference: &Reference) -> SchemaResult<()> {
    let key = reference.key();
    if chain.contains(&key) {
        let mut path = chain.clone();
        path.push(key);
        return Err(SchemaError::malformed_schema(format!(
            "circular reference detected: {}",
            path.join(" -> ")
        )));
    }
    chain.push(key);
    Ok(())
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

    fn schemas(value: Value) -> Schemas {
        Schemas::from_value(value).unwrap()
    }

    #[test]
    fn test_flat_schema_unchanged() {
        let schema = json!({"type": "integer", "x-primary-key": true});
        let (name, resolved) = resolve("id", &schema, &Schemas::new()).unwrap();
        assert_eq!(name, "id");
        assert_eq!(resolved, schema);
        assert!(is_flat(&resolved));
    }

    #[test]
    fn test_resolve_ref_chain_carries_name() {
        let schemas = schemas(json!({
            "Alias": {"$ref": "#/components/schemas/Division"},
            "Division": {"type": "object", "x-tablename": "division"}
        }));
        let (name, resolved) =
            resolve("division", &json!({"$ref": "#/components/schemas/Alias"}), &schemas).unwrap();
        assert_eq!(name, "Division");
        assert_eq!(resolved, json!({"type": "object", "x-tablename": "division"}));
    }

    #[test]
    fn test_resolve_all_of() {
        let schemas = schemas(json!({
            "Base": {
                "type": "object",
                "properties": {"id": {"type": "integer"}},
                "required": ["id"]
            }
        }));
        let schema = json!({"allOf": [
            {"$ref": "#/components/schemas/Base"},
            {"properties": {"name": {"type": "string"}}, "required": ["name"], "x-tablename": "employee"}
        ]});

        let (name, resolved) = resolve("Employee", &schema, &schemas).unwrap();
        assert_eq!(name, "Employee");
        assert_eq!(
            resolved,
            json!({
                "type": "object",
                "properties": {"id": {"type": "integer"}, "name": {"type": "string"}},
                "required": ["id", "name"],
                "x-tablename": "employee"
            })
        );
    }

    #[test]
    fn test_resolve_nested_all_of() {
        let schemas = schemas(json!({
            "Inner": {"allOf": [{"type": "object"}, {"description": "inner"}]}
        }));
        let schema = json!({"allOf": [
            {"allOf": [{"$ref": "#/Inner"}, {"x-tablename": "outer"}]},
            {"description": "outer"}
        ]});

        let (_, resolved) = resolve("Outer", &schema, &schemas).unwrap();
        assert_eq!(
            resolved,
            json!({"type": "object", "description": "outer", "x-tablename": "outer"})
        );
    }

    #[test]
    fn test_all_of_siblings_win() {
        let schema = json!({"allOf": [{"type": "string"}], "description": "local"});
        let (_, resolved) = resolve("name", &schema, &Schemas::new()).unwrap();
        assert_eq!(resolved, json!({"type": "string", "description": "local"}));
    }

    #[test]
    fn test_direct_cycle() {
        let schemas = schemas(json!({"X": {"$ref": "#/X"}}));
        let err = resolve("x", &json!({"$ref": "#/X"}), &schemas).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSchema);
        assert!(err.to_string().contains("circular reference"));
    }

    #[test]
    fn test_indirect_cycle() {
        let schemas = schemas(json!({
            "X": {"$ref": "#/Y"},
            "Y": {"allOf": [{"type": "object"}, {"$ref": "#/X"}]}
        }));
        let err = resolve("x", &json!({"$ref": "#/X"}), &schemas).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSchema);
    }

    #[test]
    fn test_repeated_ref_in_siblings_is_not_a_cycle() {
        let schemas = schemas(json!({"Base": {"type": "object", "description": "base"}}));
        let schema = json!({"allOf": [{"$ref": "#/Base"}, {"$ref": "#/Base"}]});
        let (_, resolved) = resolve("Twice", &schema, &schemas).unwrap();
        assert_eq!(resolved, json!({"type": "object", "description": "base"}));
    }

    #[test]
    fn test_skip_name() {
        let schemas = schemas(json!({
            "Parent": {"type": "object", "properties": {"id": {"type": "integer"}}},
            "Child": {"allOf": [
                {"$ref": "#/Parent"},
                {"properties": {"extra": {"type": "string"}}}
            ]}
        }));
        let child = schemas.get("Child").unwrap().clone();

        let (_, resolved) = resolve_skipping("Child", &child, &schemas, Some("Parent")).unwrap();
        assert_eq!(resolved, json!({"properties": {"extra": {"type": "string"}}}));

        let (_, resolved) = resolve("Child", &child, &schemas).unwrap();
        assert_eq!(resolved["properties"].as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_and_invalid_refs() {
        let err = resolve("x", &json!({"$ref": "#/Missing"}), &Schemas::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaNotFound);

        let err = resolve("x", &json!({"$ref": "not a pointer"}), &Schemas::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaNotFound);

        let err = resolve("x", &json!({"allOf": {"type": "object"}}), &Schemas::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSchema);
    }
}
