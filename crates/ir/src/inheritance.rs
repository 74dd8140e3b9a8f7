//! Entity inheritance (`x-inherits`)
//!
//! A child entity composes its parent through `$ref`/`allOf`. `x-inherits:
//! true` picks the closest constructable entity on that chain, a string picks
//! the entity with that name.

use crate::peek;
use crate::reference::{Reference, get_ref};
use crate::registry::Schemas;
use crate::resolve::{enter, resolve, resolve_skipping};
use schemorm_core::{SchemaError, SchemaResult};
use serde_json::Value;

/// Value of the `x-inherits` keyword
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inherits {
    /// `true` inherits from the closest constructable entity
    Enabled(bool),
    /// Inherit from the named entity
    Parent(String),
}

/// Get the name of the entity a schema inherits from
///
/// Returns `None` when the schema does not inherit. Fails with
/// [`SchemaError::MalformedSchema`] when inheritance is requested but no
/// matching parent is composed into the schema.
pub fn parent(name: &str, schema: &Value, schemas: &Schemas) -> SchemaResult<Option<String>> {
    // The child's own keywords override what it composes, so read them flat.
    let (_, flat) = resolve(name, schema, schemas)?;
    let wanted = match peek::inherits(&flat, schemas)? {
        None | Some(Inherits::Enabled(false)) => return Ok(None),
        Some(Inherits::Enabled(true)) => None,
        Some(Inherits::Parent(parent)) => Some(parent),
    };

    let mut chain = Vec::new();
    match find_parent(schema, schemas, wanted.as_deref(), &mut chain)? {
        Some(parent) => Ok(Some(parent)),
        None => Err(SchemaError::malformed_schema(match wanted {
            Some(parent) => format!("{name} inherits from {parent}, which it does not reference"),
            None => format!("{name} inherits but references no entity with a x-tablename"),
        })),
    }
}

/// Resolve an entity without what it inherits
///
/// Returns the parent's name, if any, and the flat schema of the entity
/// with references to the parent treated as empty.
pub fn resolve_own(
    name: &str,
    schema: &Value,
    schemas: &Schemas,
) -> SchemaResult<(Option<String>, Value)> {
    let parent = parent(name, schema, schemas)?;
    let (_, own) = resolve_skipping(name, schema, schemas, parent.as_deref())?;
    Ok((parent, own))
}

fn find_parent(
    schema: &Value,
    schemas: &Schemas,
    wanted: Option<&str>,
    chain: &mut Vec<String>,
) -> SchemaResult<Option<String>> {
    for reference in references(schema) {
        let parsed = Reference::parse(reference)?;
        let mut branch = chain.clone();
        enter(&mut branch, &parsed)?;

        let (ref_name, target) = get_ref(reference, schemas)?;
        let is_parent = match wanted {
            Some(wanted) => ref_name == wanted,
            None => peek::tablename(&target, schemas)?.is_some(),
        };
        if is_parent {
            return Ok(Some(ref_name));
        }

        if let Some(parent) = find_parent(&target, schemas, wanted, &mut branch)? {
            return Ok(Some(parent));
        }
    }

    Ok(None)
}

/// The `$ref` values composed directly into a schema
fn references(schema: &Value) -> Vec<&str> {
    if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
        return vec![reference];
    }

    schema
        .get("allOf")
        .and_then(Value::as_array)
        .map(|fragments| fragments.iter().flat_map(references).collect())
        .unwrap_or_default()
}
