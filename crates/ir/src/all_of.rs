//! `allOf` composition merging
//!
//! Fragments are folded left to right. Scalar keywords take the last
//! definition; `properties` and `x-backrefs` are unioned key by key with later
//! fragments winning; `required` is the set union in first-seen order.

use serde_json::{Map, Value};

/// Keywords whose values are unioned key by key
const DICTIONARY_KEYWORDS: &[&str] = &["properties", "x-backrefs"];

/// Merge flat schema fragments into one schema
///
/// Fragments are expected to be resolved already (no `$ref`/`allOf` of their
/// own); non-object fragments are ignored.
pub fn merge<'a>(fragments: impl IntoIterator<Item = &'a Value>) -> Value {
    let mut merged = Map::new();

    for fragment in fragments {
        let Some(fragment) = fragment.as_object() else {
            continue;
        };

        for (key, value) in fragment {
            let is_dictionary = DICTIONARY_KEYWORDS.contains(&key.as_str());

            match (merged.get_mut(key), value) {
                (Some(Value::Object(existing)), Value::Object(incoming)) if is_dictionary => {
                    for (name, schema) in incoming {
                        existing.insert(name.clone(), schema.clone());
                    }
                }
                (Some(Value::Array(existing)), Value::Array(incoming)) if key == "required" => {
                    for name in incoming {
                        if !existing.contains(name) {
                            existing.push(name.clone());
                        }
                    }
                }
                _ => {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
    }

    Value::Object(merged)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_scalar_last_wins() {
        let a = json!({"type": "object", "description": "first", "x-tablename": "a"});
        let b = json!({"description": "second"});
        assert_eq!(
            merge([&a, &b]),
            json!({"type": "object", "description": "second", "x-tablename": "a"})
        );
    }

    #[test]
    fn test_properties_union() {
        let a = json!({"properties": {"id": {"type": "integer"}, "name": {"type": "string"}}});
        let b = json!({"properties": {"name": {"type": "string", "maxLength": 5}, "age": {"type": "integer"}}});

        assert_eq!(
            merge([&a, &b]),
            json!({"properties": {
                "id": {"type": "integer"},
                "name": {"type": "string", "maxLength": 5},
                "age": {"type": "integer"}
            }})
        );
    }

    #[test]
    fn test_required_union() {
        let a = json!({"required": ["id", "name"]});
        let b = json!({"required": ["name", "age"]});
        assert_eq!(merge([&a, &b]), json!({"required": ["id", "name", "age"]}));
    }

    #[test]
    fn test_backrefs_union() {
        let a = json!({"x-backrefs": {"employees": {"type": "array"}}});
        let b = json!({"x-backrefs": {"projects": {"type": "object"}}});
        assert_eq!(
            merge([&a, &b]),
            json!({"x-backrefs": {
                "employees": {"type": "array"},
                "projects": {"type": "object"}
            }})
        );
    }

    #[test]
    fn test_empty_and_non_object_fragments() {
        let a = json!({"type": "object"});
        let b = json!(true);
        assert_eq!(merge([&a, &b]), json!({"type": "object"}));
        assert_eq!(merge(std::iter::empty::<&Value>()), json!({}));
    }
}
