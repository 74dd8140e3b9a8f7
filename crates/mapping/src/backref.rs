//! Back reference synthesis
//!
//! A relationship declaring `x-backref` implies a reverse property on the
//! entity it references. [`process`] computes every reverse property of the
//! registry and adds them, grouped per referenced entity, as one `x-backrefs`
//! fragment each.
//!
//! ## Reverse shapes
//!
//! | referenced from | uselist       | secondary | reverse shape |
//! |-----------------|---------------|-----------|---------------|
//! | object          | unset or true | -         | array         |
//! | object          | false         | -         | object        |
//! | array           | -             | unset     | object        |
//! | array           | -             | set       | array         |

use schemorm_core::{ResultExt, SchemaError, SchemaResult};
use schemorm_ir::relationship::{self, RelationshipType};
use schemorm_ir::{RelationshipArtifacts, Schemas, inheritance, peek, resolve};
use serde_json::{Map, Value, json};

/// One reverse property
#[derive(Debug, Clone, PartialEq)]
pub struct BackrefEntry {
    /// Entity receiving the reverse property
    pub model: String,

    /// Name of the reverse property
    pub property: String,

    /// Schema of the reverse property
    pub schema: Value,
}

/// Compute the reverse schema of a relationship declared on `owner`
pub fn reverse_schema(owner: &str, artifacts: &RelationshipArtifacts) -> Value {
    let reference = json!({"type": "object", "x-de-$ref": owner});

    let is_list = match artifacts.type_ {
        RelationshipType::Object => {
            artifacts.backref.as_ref().and_then(|backref| backref.uselist) != Some(false)
        }
        RelationshipType::Array => artifacts.cardinality().requires_association_table(),
    };

    if is_list {
        json!({"type": "array", "items": reference})
    } else {
        reference
    }
}

/// Compute the reverse properties declared by one entity
///
/// An inheriting entity only contributes the relationships it declares
/// itself; those of its parent belong to the parent.
pub fn entity_backrefs(name: &str, schema: &Value, schemas: &Schemas) -> SchemaResult<Vec<BackrefEntry>> {
    let (_, own) = inheritance::resolve_own(name, schema, schemas)?;
    if peek::tablename(&own, schemas)?.is_none() {
        return Ok(Vec::new());
    }

    let Some(properties) = own.get("properties").and_then(Value::as_object) else {
        return Ok(Vec::new());
    };

    let mut entries = Vec::new();
    for (property, property_schema) in properties {
        let Some(artifacts) = relationship::gather_property(property, property_schema, schemas)
            .with_context(format!("{name}.{property}"))?
        else {
            continue;
        };
        let Some(backref) = &artifacts.backref else {
            continue;
        };

        entries.push(BackrefEntry {
            model: artifacts.model_name.clone(),
            property: backref.name.clone(),
            schema: reverse_schema(name, &artifacts),
        });
    }

    Ok(entries)
}

/// Add the reverse properties of every relationship to the registry
///
/// All reverse properties are computed from the registry as given before any
/// entry is rewritten. Entries that already carry an identical reverse
/// property are left alone, so running this twice changes nothing.
pub fn process(schemas: &mut Schemas) -> SchemaResult<()> {
    let mut grouped: Map<String, Value> = Map::new();

    for (name, schema) in schemas.iter() {
        for entry in entity_backrefs(name, schema, schemas)? {
            let group = grouped
                .entry(entry.model.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            let Some(group) = group.as_object_mut() else {
                continue;
            };

            match group.get(&entry.property) {
                Some(existing) if *existing != entry.schema => {
                    return Err(SchemaError::malformed_relationship(format!(
                        "{}.{} is defined as a back reference twice with different schemas",
                        entry.model, entry.property
                    )));
                }
                Some(_) => {}
                None => {
                    group.insert(entry.property, entry.schema);
                }
            }
        }
    }

    for (model, backrefs) in grouped {
        let Value::Object(backrefs) = backrefs else {
            continue;
        };
        add_backrefs(&model, backrefs, schemas)?;
    }

    Ok(())
}

/// Append the reverse properties an entity does not carry yet
fn add_backrefs(model: &str, backrefs: Map<String, Value>, schemas: &mut Schemas) -> SchemaResult<()> {
    let schema = schemas.get(model).cloned().ok_or_else(|| {
        SchemaError::malformed_relationship(format!(
            "back references can only be added to registered schemas, {model} is not one"
        ))
    })?;

    let (_, flat) = resolve(model, &schema, schemas)?;
    let existing = flat.get("x-backrefs").and_then(Value::as_object);

    let mut missing = Map::new();
    for (property, reverse) in backrefs {
        match existing.and_then(|existing| existing.get(&property)) {
            Some(current) if *current == reverse => {}
            Some(_) => {
                return Err(SchemaError::malformed_relationship(format!(
                    "{model}.{property} already has a different back reference"
                )));
            }
            None => {
                missing.insert(property, reverse);
            }
        }
    }

    if missing.is_empty() {
        return Ok(());
    }

    tracing::debug!(model = %model, count = missing.len(), "adding back references");
    let fragment = json!({"type": "object", "x-backrefs": missing});
    schemas.replace(model, json!({"allOf": [schema, fragment]}))?;
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

    fn reference(owner: &str) -> Value {
        json!({"type": "object", "x-de-$ref": owner})
    }

    #[test]
    fn test_reverse_shapes() {
        let object = RelationshipArtifacts::object("Division");
        assert_eq!(
            reverse_schema("Employee", &object.clone().with_backref("employees", None)),
            json!({"type": "array", "items": reference("Employee")})
        );
        assert_eq!(
            reverse_schema("Employee", &object.clone().with_backref("employees", Some(true))),
            json!({"type": "array", "items": reference("Employee")})
        );
        assert_eq!(
            reverse_schema("Employee", &object.with_backref("head", Some(false))),
            reference("Employee")
        );

        let array = RelationshipArtifacts::array("Project").with_backref("employee", None);
        assert_eq!(reverse_schema("Employee", &array), reference("Employee"));
        assert_eq!(
            reverse_schema("Employee", &array.with_secondary("assoc")),
            json!({"type": "array", "items": reference("Employee")})
        );
    }

    fn grouping_schemas() -> Schemas {
        Schemas::from_value(json!({
            "Division": {
                "type": "object",
                "x-tablename": "division",
                "properties": {"id": {"type": "integer"}}
            },
            "Project": {
                "type": "object",
                "x-tablename": "project",
                "properties": {"id": {"type": "integer"}}
            },
            "Employee": {
                "type": "object",
                "x-tablename": "employee",
                "properties": {
                    "id": {"type": "integer"},
                    "division": {"allOf": [{"$ref": "#/Division"}, {"x-backref": "employees"}]}
                }
            },
            "Manager": {
                "type": "object",
                "x-tablename": "manager",
                "properties": {
                    "id": {"type": "integer"},
                    "projects": {
                        "type": "array",
                        "items": {"allOf": [{"$ref": "#/Project"}, {"x-backref": "manager"}]}
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_grouping() {
        let mut schemas = grouping_schemas();
        process(&mut schemas).unwrap();

        let (_, division) = resolve("Division", schemas.get("Division").unwrap(), &schemas).unwrap();
        assert_eq!(
            division["x-backrefs"],
            json!({"employees": {"type": "array", "items": reference("Employee")}})
        );

        let (_, project) = resolve("Project", schemas.get("Project").unwrap(), &schemas).unwrap();
        assert_eq!(project["x-backrefs"], json!({"manager": reference("Manager")}));

        assert_eq!(schemas.get("Employee"), grouping_schemas().get("Employee"));
        assert_eq!(schemas.get("Manager"), grouping_schemas().get("Manager"));
    }

    #[test]
    fn test_order_independent() {
        let forward = grouping_schemas();
        let mut reversed = Schemas::new();
        for name in ["Manager", "Employee", "Project", "Division"] {
            reversed.insert(name, forward.get(name).cloned().unwrap());
        }

        let mut forward = forward;
        process(&mut forward).unwrap();
        process(&mut reversed).unwrap();

        for name in ["Division", "Project", "Employee", "Manager"] {
            assert_eq!(forward.get(name), reversed.get(name), "{name}");
        }
    }

    #[test]
    fn test_idempotent() {
        let mut schemas = grouping_schemas();
        process(&mut schemas).unwrap();
        let once = schemas.clone();
        process(&mut schemas).unwrap();
        assert_eq!(schemas, once);
    }

    #[test]
    fn test_conflicting_backrefs() {
        let mut schemas = Schemas::from_value(json!({
            "Division": {
                "type": "object",
                "x-tablename": "division",
                "properties": {"id": {"type": "integer"}}
            },
            "Employee": {
                "type": "object",
                "x-tablename": "employee",
                "properties": {
                    "division": {"allOf": [{"$ref": "#/Division"}, {"x-backref": "members"}]},
                    "divisions": {
                        "type": "array",
                        "items": {"allOf": [{"$ref": "#/Division"}, {"x-backref": "members"}]}
                    }
                }
            }
        }))
        .unwrap();

        let err = process(&mut schemas).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedRelationship);
    }

    #[test]
    fn test_inherited_relationships_stay_with_parent() {
        let mut schemas = Schemas::from_value(json!({
            "Division": {
                "type": "object",
                "x-tablename": "division",
                "properties": {"id": {"type": "integer"}}
            },
            "Employee": {
                "type": "object",
                "x-tablename": "employee",
                "properties": {
                    "id": {"type": "integer"},
                    "division": {"allOf": [{"$ref": "#/Division"}, {"x-backref": "employees"}]}
                }
            },
            "Manager": {"allOf": [
                {"$ref": "#/Employee"},
                {"x-tablename": "manager", "x-inherits": true}
            ]}
        }))
        .unwrap();

        let manager = schemas.get("Manager").cloned().unwrap();
        assert_eq!(entity_backrefs("Manager", &manager, &schemas).unwrap(), Vec::new());

        process(&mut schemas).unwrap();
        let (_, division) = resolve("Division", schemas.get("Division").unwrap(), &schemas).unwrap();
        assert_eq!(
            division["x-backrefs"],
            json!({"employees": {"type": "array", "items": reference("Employee")}})
        );
    }

    #[test]
    fn test_skips_columns_and_non_tables() {
        let mut schemas = Schemas::from_value(json!({
            "Division": {"type": "object", "x-tablename": "division", "properties": {}},
            "Draft": {
                "type": "object",
                "properties": {
                    "division": {"allOf": [{"$ref": "#/Division"}, {"x-backref": "drafts"}]}
                }
            },
            "Employee": {
                "type": "object",
                "x-tablename": "employee",
                "properties": {
                    "name": {"type": "string"},
                    "meta": {"type": "object", "x-json": true},
                    "division": {"allOf": [{"$ref": "#/Division"}, {"readOnly": true}]}
                }
            }
        }))
        .unwrap();
        let original = schemas.clone();

        process(&mut schemas).unwrap();
        assert_eq!(schemas, original);
    }
}
