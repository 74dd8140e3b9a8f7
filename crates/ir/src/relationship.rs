//! Relationship artifact gathering
//!
//! Object and array properties that reference another entity become
//! [`RelationshipArtifacts`]. The property schema is read unresolved: keywords
//! that only make sense on a relationship (`x-backref`, `x-secondary`, ...)
//! sit next to the `$ref` inside an `allOf`, and are collected by one fold
//! driven by the [`KEYWORDS`] table. Back reference, uselist, secondary and
//! foreign key column fall back to the referenced entity when the property
//! does not set them.

use crate::ext_prop::{self, KwargsLevel};
use crate::peek::{self, expect_bool, expect_object, expect_str};
use crate::registry::Schemas;
use crate::resolve::resolve;
use schemorm_core::{Cardinality, PrimitiveType, SchemaError, SchemaResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Foreign key column used when a relationship does not name one
pub const DEFAULT_FOREIGN_KEY_COLUMN: &str = "id";

// ============================================================================
// Relationship Artifacts
// ============================================================================

/// Whether the relationship property holds one instance or a list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Object,
    Array,
}

/// The reverse-side property of a relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backref {
    /// Property name on the referenced entity
    pub name: String,

    /// Whether the reverse property is a list (unset means the default)
    pub uselist: Option<bool>,
}

/// Everything the assembly step needs to build one relationship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipArtifacts {
    /// Object or array property
    #[serde(rename = "type")]
    pub type_: RelationshipType,

    /// Name of the referenced entity
    pub model_name: String,

    /// Column the foreign key points at
    pub foreign_key_column: String,

    /// Whether an object relationship may be empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_only: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backref: Option<Backref>,

    /// Association table name of many-to-many relationships
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,

    /// Extra keyword arguments for the relationship constructor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kwargs: Option<Map<String, Value>>,
}

impl RelationshipArtifacts {
    /// Create an object relationship to an entity
    pub fn object(model_name: impl Into<String>) -> Self {
        Self::new(RelationshipType::Object, model_name)
    }

    /// Create an array relationship to an entity
    pub fn array(model_name: impl Into<String>) -> Self {
        Self::new(RelationshipType::Array, model_name)
    }

    fn new(type_: RelationshipType, model_name: impl Into<String>) -> Self {
        Self {
            type_,
            model_name: model_name.into(),
            foreign_key_column: DEFAULT_FOREIGN_KEY_COLUMN.to_string(),
            nullable: None,
            description: None,
            write_only: None,
            backref: None,
            secondary: None,
            kwargs: None,
        }
    }

    // ========================================================================
    // Builder methods
    // ========================================================================

    /// Set the back reference
    pub fn with_backref(mut self, name: impl Into<String>, uselist: Option<bool>) -> Self {
        self.backref = Some(Backref {
            name: name.into(),
            uselist,
        });
        self
    }

    /// Set the association table
    pub fn with_secondary(mut self, secondary: impl Into<String>) -> Self {
        self.secondary = Some(secondary.into());
        self
    }

    /// Set nullability
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    // ========================================================================
    // Derived values
    // ========================================================================

    /// Derive the cardinality
    ///
    /// Objects are many-to-one unless the back reference is explicitly not a
    /// list; arrays are one-to-many unless they go through a secondary table.
    pub fn cardinality(&self) -> Cardinality {
        match (self.type_, &self.secondary) {
            (RelationshipType::Array, Some(secondary)) => Cardinality::ManyToMany {
                secondary: secondary.clone(),
            },
            (RelationshipType::Array, None) => Cardinality::OneToMany,
            (RelationshipType::Object, _) => match &self.backref {
                Some(Backref {
                    uselist: Some(false),
                    ..
                }) => Cardinality::OneToOne,
                _ => Cardinality::ManyToOne,
            },
        }
    }

    /// The property schema recorded on the model in place of the reference
    pub fn property_schema(&self) -> Value {
        let reference = json!({"type": "object", "x-de-$ref": self.model_name});

        let mut schema = match self.type_ {
            RelationshipType::Object => reference,
            RelationshipType::Array => json!({"type": "array", "items": reference}),
        };

        if let Some(object) = schema.as_object_mut() {
            if let Some(nullable) = self.nullable {
                object.insert("nullable".to_string(), Value::Bool(nullable));
            }
            if let Some(description) = &self.description {
                object.insert("description".to_string(), Value::String(description.clone()));
            }
            if let Some(write_only) = self.write_only {
                object.insert("writeOnly".to_string(), Value::Bool(write_only));
            }
        }

        schema
    }
}

// ============================================================================
// Keyword Table
// ============================================================================

/// How many `allOf` fragments may define a keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arity {
    ExactlyOne,
    AtMostOne,
}

/// Where a keyword not set on the property is looked up next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fallback {
    None,
    ReferencedEntity,
}

struct KeywordRule {
    keyword: &'static str,
    arity: Arity,
    fallback: Fallback,
}

const fn rule(keyword: &'static str, arity: Arity, fallback: Fallback) -> KeywordRule {
    KeywordRule {
        keyword,
        arity,
        fallback,
    }
}

/// Keywords collected from a relationship property
const KEYWORDS: &[KeywordRule] = &[
    rule("$ref", Arity::ExactlyOne, Fallback::None),
    rule("x-backref", Arity::AtMostOne, Fallback::ReferencedEntity),
    rule("x-uselist", Arity::AtMostOne, Fallback::ReferencedEntity),
    rule("x-secondary", Arity::AtMostOne, Fallback::ReferencedEntity),
    rule("x-foreign-key-column", Arity::AtMostOne, Fallback::ReferencedEntity),
    rule("nullable", Arity::AtMostOne, Fallback::None),
    rule("description", Arity::AtMostOne, Fallback::None),
    rule("writeOnly", Arity::AtMostOne, Fallback::None),
    rule("x-kwargs", Arity::AtMostOne, Fallback::None),
];

/// Fold the fragments of a relationship property into one keyword map
fn collect_keywords(logical_name: &str, schema: &Value) -> SchemaResult<Map<String, Value>> {
    let object = schema.as_object().ok_or_else(|| {
        SchemaError::malformed_relationship(format!("{logical_name}: the schema must be an object"))
    })?;

    let fragments: Vec<&Value> = match (object.get("$ref"), object.get("allOf")) {
        (Some(_), None) => vec![schema],
        // Keywords next to allOf are folded in as one more fragment.
        (None, Some(Value::Array(fragments))) => {
            fragments.iter().chain(std::iter::once(schema)).collect()
        }
        (None, Some(_)) => {
            return Err(SchemaError::malformed_relationship(format!(
                "{logical_name}: allOf must be a list"
            )));
        }
        _ => {
            return Err(SchemaError::malformed_relationship(format!(
                "{logical_name}: a relationship requires exactly one of $ref or allOf"
            )));
        }
    };

    let mut collected = Map::new();
    for fragment in fragments {
        let fragment = fragment.as_object().ok_or_else(|| {
            SchemaError::malformed_relationship(format!(
                "{logical_name}: allOf fragments must be objects"
            ))
        })?;

        for rule in KEYWORDS {
            let Some(value) = fragment.get(rule.keyword).filter(|value| !value.is_null()) else {
                continue;
            };
            if collected.contains_key(rule.keyword) {
                return Err(SchemaError::malformed_relationship(format!(
                    "{logical_name}: {} is defined more than once",
                    rule.keyword
                )));
            }
            collected.insert(rule.keyword.to_string(), value.clone());
        }
    }

    for rule in KEYWORDS.iter().filter(|rule| rule.arity == Arity::ExactlyOne) {
        if !collected.contains_key(rule.keyword) {
            return Err(SchemaError::malformed_relationship(format!(
                "{logical_name}: a relationship requires a {}",
                rule.keyword
            )));
        }
    }

    Ok(collected)
}

/// Take a collected keyword, falling back to the referenced entity
fn lookup(collected: &Map<String, Value>, target: &Value, keyword: &str) -> Option<Value> {
    if let Some(value) = collected.get(keyword) {
        return Some(value.clone());
    }

    let falls_back = KEYWORDS
        .iter()
        .any(|rule| rule.keyword == keyword && rule.fallback == Fallback::ReferencedEntity);
    if falls_back {
        target.get(keyword).filter(|value| !value.is_null()).cloned()
    } else {
        None
    }
}

// ============================================================================
// Gathering
// ============================================================================

/// Gather the artifacts of an object relationship property
pub fn gather(
    schema: &Value,
    logical_name: &str,
    schemas: &Schemas,
) -> SchemaResult<RelationshipArtifacts> {
    let artifacts = gather_reference(RelationshipType::Object, schema, logical_name, schemas)?;

    if let Some(secondary) = &artifacts.secondary {
        return Err(SchemaError::malformed_relationship(format!(
            "{logical_name}: object relationships cannot use the secondary table {secondary}"
        )));
    }

    tracing::debug!(
        property = %logical_name,
        model = %artifacts.model_name,
        cardinality = %artifacts.cardinality(),
        "gathered object relationship"
    );
    Ok(artifacts)
}

/// Gather the artifacts of an array relationship property
///
/// The `items` schema is gathered like an object relationship; the array's
/// own `description` and `writeOnly` take precedence over the item's.
pub fn gather_array(
    schema: &Value,
    logical_name: &str,
    schemas: &Schemas,
) -> SchemaResult<RelationshipArtifacts> {
    let items = peek::items(schema, schemas)?.ok_or_else(|| {
        SchemaError::malformed_relationship(format!("{logical_name}: array relationships require items"))
    })?;

    let mut artifacts = gather_reference(RelationshipType::Array, &items, logical_name, schemas)?;
    artifacts.nullable = None;
    if let Some(backref) = &mut artifacts.backref {
        backref.uselist = None;
    }
    if let Some(description) = peek::description(schema, schemas)? {
        artifacts.description = Some(description);
    }
    if let Some(write_only) = peek::write_only(schema, schemas)? {
        artifacts.write_only = Some(write_only);
    }

    tracing::debug!(
        property = %logical_name,
        model = %artifacts.model_name,
        cardinality = %artifacts.cardinality(),
        "gathered array relationship"
    );
    Ok(artifacts)
}

/// Gather a property of an entity when it is a relationship
///
/// Returns `None` for properties stored as columns (scalars and `x-json`)
/// and for `readOnly` properties, which are not backed by a relationship.
pub fn gather_property(
    property: &str,
    schema: &Value,
    schemas: &Schemas,
) -> SchemaResult<Option<RelationshipArtifacts>> {
    let (_, flat) = resolve(property, schema, schemas)?;
    if peek::json(&flat, schemas)? == Some(true) {
        return Ok(None);
    }

    let type_ = peek::primitive_type(&flat, schemas)?;
    if type_.is_scalar() || peek::read_only(&flat, schemas)? == Some(true) {
        return Ok(None);
    }

    match type_ {
        PrimitiveType::Array => gather_array(schema, property, schemas).map(Some),
        _ => gather(schema, property, schemas).map(Some),
    }
}

fn gather_reference(
    type_: RelationshipType,
    schema: &Value,
    logical_name: &str,
    schemas: &Schemas,
) -> SchemaResult<RelationshipArtifacts> {
    let collected = collect_keywords(logical_name, schema)?;

    let reference = collected
        .get("$ref")
        .map(|value| expect_str("$ref", value))
        .transpose()?
        .unwrap_or_default();
    let (model_name, target) = resolve(logical_name, &json!({ "$ref": reference }), schemas)?;

    if peek::primitive_type(&target, schemas)? != PrimitiveType::Object {
        return Err(SchemaError::malformed_relationship(format!(
            "{logical_name}: the referenced schema {model_name} must be of type object"
        )));
    }

    let backref = lookup(&collected, &target, "x-backref")
        .map(|value| expect_str("x-backref", &value))
        .transpose()?;
    let uselist = lookup(&collected, &target, "x-uselist")
        .map(|value| expect_bool("x-uselist", &value))
        .transpose()?;
    let secondary = lookup(&collected, &target, "x-secondary")
        .map(|value| expect_str("x-secondary", &value))
        .transpose()?;
    let foreign_key_column = lookup(&collected, &target, "x-foreign-key-column")
        .map(|value| expect_str("x-foreign-key-column", &value))
        .transpose()?
        .unwrap_or_else(|| DEFAULT_FOREIGN_KEY_COLUMN.to_string());

    let backref = match (backref, uselist) {
        (Some(name), uselist) => Some(Backref { name, uselist }),
        (None, Some(_)) => {
            return Err(SchemaError::malformed_relationship(format!(
                "{logical_name}: x-uselist requires x-backref"
            )));
        }
        (None, _) => None,
    };

    let kwargs = collected
        .get("x-kwargs")
        .map(|value| expect_object("x-kwargs", value))
        .transpose()?;
    if let Some(kwargs) = &kwargs {
        ext_prop::check_kwargs(kwargs, KwargsLevel::Relationship)?;
    }

    Ok(RelationshipArtifacts {
        type_,
        model_name,
        foreign_key_column,
        nullable: collected
            .get("nullable")
            .map(|value| expect_bool("nullable", value))
            .transpose()?,
        description: collected
            .get("description")
            .map(|value| expect_str("description", value))
            .transpose()?,
        write_only: collected
            .get("writeOnly")
            .map(|value| expect_bool("writeOnly", value))
            .transpose()?,
        backref,
        secondary,
        kwargs,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use schemorm_core::ErrorKind;

    fn schemas() -> Schemas {
        Schemas::from_value(json!({
            "Division": {
                "type": "object",
                "x-tablename": "division",
                "properties": {"id": {"type": "integer", "x-primary-key": true}}
            },
            "Project": {
                "type": "object",
                "x-tablename": "project",
                "x-backref": "owner",
                "x-foreign-key-column": "code",
                "properties": {"code": {"type": "string", "x-primary-key": true}}
            },
            "Tag": {"type": "string"}
        }))
        .unwrap()
    }

    fn assert_malformed(result: SchemaResult<RelationshipArtifacts>) {
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedRelationship, "{err}");
    }

    #[test]
    fn test_plain_reference() {
        let schema = json!({"$ref": "#/components/schemas/Division"});
        let artifacts = gather(&schema, "division", &schemas()).unwrap();

        assert_eq!(artifacts, RelationshipArtifacts::object("Division"));
        assert_eq!(artifacts.cardinality(), Cardinality::ManyToOne);
    }

    #[test]
    fn test_all_of_keywords() {
        let schema = json!({"allOf": [
            {"$ref": "#/components/schemas/Division"},
            {"x-backref": "employees", "nullable": false},
            {"description": "Home division", "x-kwargs": {"lazy": "joined"}}
        ]});
        let artifacts = gather(&schema, "division", &schemas()).unwrap();

        assert_eq!(artifacts.model_name, "Division");
        assert_eq!(
            artifacts.backref,
            Some(Backref {
                name: "employees".to_string(),
                uselist: None
            })
        );
        assert_eq!(artifacts.nullable, Some(false));
        assert_eq!(artifacts.description.as_deref(), Some("Home division"));
        assert_eq!(
            artifacts.kwargs,
            Some(json!({"lazy": "joined"}).as_object().unwrap().clone())
        );
    }

    #[test]
    fn test_one_to_one() {
        let schema = json!({"allOf": [
            {"$ref": "#/Division"},
            {"x-backref": "head", "x-uselist": false}
        ]});
        let artifacts = gather(&schema, "division", &schemas()).unwrap();
        assert_eq!(artifacts.cardinality(), Cardinality::OneToOne);
    }

    #[test]
    fn test_entity_level_fallback() {
        let schema = json!({"$ref": "#/Project"});
        let artifacts = gather(&schema, "project", &schemas()).unwrap();
        assert_eq!(artifacts.backref.map(|backref| backref.name).as_deref(), Some("owner"));
        assert_eq!(artifacts.foreign_key_column, "code");

        let schema = json!({"allOf": [{"$ref": "#/Project"}, {"x-backref": "lead"}]});
        let artifacts = gather(&schema, "project", &schemas()).unwrap();
        assert_eq!(artifacts.backref.map(|backref| backref.name).as_deref(), Some("lead"));
    }

    #[test]
    fn test_structure_errors() {
        let schemas = schemas();
        assert_malformed(gather(&json!({"type": "object"}), "p", &schemas));
        assert_malformed(gather(
            &json!({"$ref": "#/Division", "allOf": [{"$ref": "#/Division"}]}),
            "p",
            &schemas,
        ));
        assert_malformed(gather(&json!({"allOf": [{"x-backref": "a"}]}), "p", &schemas));
        assert_malformed(gather(
            &json!({"allOf": [{"$ref": "#/Division"}, {"$ref": "#/Project"}]}),
            "p",
            &schemas,
        ));
        assert_malformed(gather(
            &json!({"allOf": [{"$ref": "#/Division"}, {"x-backref": "a"}, {"x-backref": "b"}]}),
            "p",
            &schemas,
        ));
        assert_malformed(gather(&json!({"$ref": "#/Tag"}), "p", &schemas));
    }

    #[test]
    fn test_uselist_requires_backref() {
        let schema = json!({"allOf": [{"$ref": "#/Division"}, {"x-uselist": false}]});
        assert_malformed(gather(&schema, "division", &schemas()));
    }

    #[test]
    fn test_array_uselist_requires_backref() {
        let schema = json!({
            "type": "array",
            "items": {"allOf": [{"$ref": "#/Division"}, {"x-uselist": true}]}
        });
        assert_malformed(gather_array(&schema, "divisions", &schemas()));
    }

    #[test]
    fn test_keywords_next_to_all_of() {
        let schema = json!({"allOf": [{"$ref": "#/Division"}], "x-backref": "staff"});
        let artifacts = gather(&schema, "division", &schemas()).unwrap();
        assert_eq!(artifacts.backref.map(|backref| backref.name).as_deref(), Some("staff"));

        let schema = json!({
            "allOf": [{"$ref": "#/Division"}, {"x-backref": "members"}],
            "x-backref": "staff"
        });
        assert_malformed(gather(&schema, "division", &schemas()));
    }

    #[test]
    fn test_gather_property() {
        let schemas = schemas();
        for skipped in [
            json!({"type": "integer"}),
            json!({"type": "object", "x-json": true}),
            json!({"allOf": [{"$ref": "#/Division"}, {"readOnly": true}]}),
        ] {
            assert_eq!(gather_property("p", &skipped, &schemas).unwrap(), None, "{skipped}");
        }

        let object = gather_property("division", &json!({"$ref": "#/Division"}), &schemas).unwrap();
        assert_eq!(object, Some(RelationshipArtifacts::object("Division")));

        let array = json!({"type": "array", "items": {"$ref": "#/Division"}});
        let array = gather_property("divisions", &array, &schemas).unwrap().unwrap();
        assert_eq!(array.type_, RelationshipType::Array);

        let err = gather_property("p", &json!({"maxLength": 3}), &schemas).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMissing);
    }

    #[test]
    fn test_object_with_secondary() {
        let schema = json!({"allOf": [{"$ref": "#/Division"}, {"x-secondary": "assoc"}]});
        assert_malformed(gather(&schema, "division", &schemas()));
    }

    #[test]
    fn test_missing_target() {
        let err = gather(&json!({"$ref": "#/Missing"}), "p", &schemas()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaNotFound);
    }

    #[test]
    fn test_relationship_kwargs_checked() {
        let schema = json!({"allOf": [{"$ref": "#/Division"}, {"x-kwargs": {"backref": "x"}}]});
        let err = gather(&schema, "division", &schemas()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedExtensionProperty);
    }

    #[test]
    fn test_gather_array() {
        let schema = json!({
            "type": "array",
            "description": "Projects led",
            "items": {"allOf": [
                {"$ref": "#/Division"},
                {"x-backref": "lead", "description": "ignored", "nullable": true}
            ]}
        });
        let artifacts = gather_array(&schema, "divisions", &schemas()).unwrap();

        assert_eq!(artifacts.type_, RelationshipType::Array);
        assert_eq!(artifacts.cardinality(), Cardinality::OneToMany);
        assert_eq!(artifacts.description.as_deref(), Some("Projects led"));
        assert_eq!(artifacts.nullable, None);
    }

    #[test]
    fn test_gather_array_many_to_many() {
        let schema = json!({
            "type": "array",
            "items": {"allOf": [{"$ref": "#/Division"}, {"x-secondary": "employee_division"}]}
        });
        let artifacts = gather_array(&schema, "divisions", &schemas()).unwrap();
        assert_eq!(
            artifacts.cardinality(),
            Cardinality::ManyToMany {
                secondary: "employee_division".to_string()
            }
        );

        let err = gather_array(&json!({"type": "array"}), "divisions", &schemas()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedRelationship);
    }

    #[test]
    fn test_property_schema() {
        let object = RelationshipArtifacts::object("Division").with_nullable(true);
        assert_eq!(
            object.property_schema(),
            json!({"type": "object", "x-de-$ref": "Division", "nullable": true})
        );

        let array = RelationshipArtifacts::array("Project").with_secondary("assoc");
        assert_eq!(
            array.property_schema(),
            json!({"type": "array", "items": {"type": "object", "x-de-$ref": "Project"}})
        );
    }
}
