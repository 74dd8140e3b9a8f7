//! `$ref` pointers
//!
//! Local pointers (`#/components/schemas/Name` or `#/Name`) are looked up in
//! the [`Schemas`] registry. Remote pointers (`path/to/doc.json#/json/pointer`)
//! are read relative to the directory of the registry's spec path, cached
//! process-wide, and have every nested `$ref` rewritten so that it still
//! resolves from the schema document directory.

use crate::registry::{Schemas, read_document};
use schemorm_core::{SchemaError, SchemaResult};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};

// ============================================================================
// Reference
// ============================================================================

/// A parsed `$ref` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// An entity of the registry
    Local { name: String },

    /// A schema inside another document
    Remote {
        /// Normalized document path, relative to the schema document directory
        document: String,
        /// Unescaped JSON pointer segments
        pointer: Vec<String>,
    },
}

impl Reference {
    /// Parse a `$ref` value
    pub fn parse(reference: &str) -> SchemaResult<Self> {
        if let Some(pointer) = reference.strip_prefix('#') {
            let segments = pointer_segments(reference, pointer)?;
            let name = match segments.as_slice() {
                [name] => name.clone(),
                [components, schemas, name] if components == "components" && schemas == "schemas" => {
                    name.clone()
                }
                _ => {
                    return Err(SchemaError::not_found(format!(
                        "{reference} is not a valid local reference"
                    )));
                }
            };
            return Ok(Reference::Local { name });
        }

        let Some((document, pointer)) = reference.split_once('#') else {
            return Err(SchemaError::not_found(format!(
                "{reference} is missing the '#' separating document and pointer"
            )));
        };

        if document.starts_with("http://") || document.starts_with("https://") {
            return Err(SchemaError::not_implemented(format!(
                "{reference}: references to remote URLs are not supported"
            )));
        }

        let document = normalize_context(document);
        if document.is_empty() || document == "." {
            return Err(SchemaError::not_found(format!(
                "{reference} does not name a document"
            )));
        }

        Ok(Reference::Remote {
            document,
            pointer: pointer_segments(reference, pointer)?,
        })
    }

    /// The entity name the reference points at (the last pointer segment)
    pub fn name(&self) -> &str {
        match self {
            Reference::Local { name } => name,
            Reference::Remote { pointer, .. } => pointer.last().map_or("", String::as_str),
        }
    }

    /// Identity of the target, used to detect reference cycles
    pub fn key(&self) -> String {
        match self {
            Reference::Local { name } => name.clone(),
            Reference::Remote { document, pointer } => {
                format!("{document}#/{}", pointer.join("/"))
            }
        }
    }
}

/// Split a JSON pointer (`/a/b~1c`) into unescaped segments
fn pointer_segments(reference: &str, pointer: &str) -> SchemaResult<Vec<String>> {
    let Some(pointer) = pointer.strip_prefix('/') else {
        return Err(SchemaError::not_found(format!(
            "{reference} does not contain a JSON pointer"
        )));
    };

    let segments: Vec<String> = pointer
        .split('/')
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect();

    if segments.iter().any(String::is_empty) {
        return Err(SchemaError::not_found(format!(
            "{reference} contains an empty pointer segment"
        )));
    }

    Ok(segments)
}

// ============================================================================
// Lookup
// ============================================================================

/// Look up the schema a `$ref` value points at
///
/// Returns the target's name (the last pointer segment) and its schema.
pub fn get_ref(reference: &str, schemas: &Schemas) -> SchemaResult<(String, Value)> {
    match Reference::parse(reference)? {
        Reference::Local { name } => {
            let schema = schemas
                .get(&name)
                .cloned()
                .ok_or_else(|| SchemaError::not_found(format!("{reference} was not found")))?;
            Ok((name, schema))
        }
        Reference::Remote { document, pointer } => {
            let base = remote_base(reference, schemas)?;
            let root = remote_document(&base.join(&document))?;

            let mut current: &Value = &root;
            for segment in &pointer {
                current = current.get(segment.as_str()).ok_or_else(|| {
                    SchemaError::not_found(format!(
                        "{reference}: '{segment}' was not found in {document}"
                    ))
                })?;
            }

            let mut schema = current.clone();
            add_remote_context(&document, &mut schema);

            let name = pointer.last().cloned().unwrap_or_default();
            Ok((name, schema))
        }
    }
}

/// The directory relative remote documents are read from
fn remote_base(reference: &str, schemas: &Schemas) -> SchemaResult<PathBuf> {
    schemas
        .spec_path()
        .map(|path| path.parent().unwrap_or(Path::new("")).to_path_buf())
        .ok_or_else(|| {
            SchemaError::not_found(format!(
                "{reference}: remote references need the spec path to be known"
            ))
        })
}

// ============================================================================
// Remote Document Cache
// ============================================================================

/// Remote documents keyed by normalized absolute path
static REMOTE_DOCUMENTS: LazyLock<Mutex<HashMap<PathBuf, Arc<Value>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Load a remote document, reading it from disk at most once per process
fn remote_document(path: &Path) -> SchemaResult<Arc<Value>> {
    let key = std::path::absolute(path)
        .map(|absolute| PathBuf::from(normalize_context(&absolute.to_string_lossy())))
        .unwrap_or_else(|_| path.to_path_buf());

    {
        let cache = REMOTE_DOCUMENTS.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(document) = cache.get(&key) {
            tracing::debug!(path = %key.display(), "remote document cache hit");
            return Ok(Arc::clone(document));
        }
    }

    let document = Arc::new(read_document(&key)?);
    tracing::debug!(path = %key.display(), "loaded remote document");

    let mut cache = REMOTE_DOCUMENTS.lock().unwrap_or_else(|e| e.into_inner());
    Ok(Arc::clone(cache.entry(key).or_insert(document)))
}

// ============================================================================
// Context Handling
// ============================================================================

/// Lexically normalize a `/`-separated path (`a/./b/../c` → `a/c`)
pub fn normalize_context(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if absolute { format!("/{joined}") } else { joined }
}

/// Rewrite a `$ref` found inside `context` so it resolves from the schema document directory
fn contextualize(context: &str, reference: &str) -> String {
    if reference.starts_with('#') {
        return format!("{context}{reference}");
    }
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return reference.to_string();
    }

    let (document, pointer) = reference.split_once('#').unwrap_or((reference, ""));
    let directory = context.rsplit_once('/').map_or("", |(directory, _)| directory);
    let document = if directory.is_empty() || document.starts_with('/') {
        normalize_context(document)
    } else {
        normalize_context(&format!("{directory}/{document}"))
    };

    format!("{document}#{pointer}")
}

/// Rewrite every nested `$ref` of a schema taken from the `context` document
fn add_remote_context(context: &str, schema: &mut Value) {
    match schema {
        Value::Object(map) => {
            for (key, value) in map.iter_mut() {
                match value {
                    Value::String(reference) if key == "$ref" => {
                        *reference = contextualize(context, reference);
                    }
                    other => add_remote_context(context, other),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                add_remote_context(context, item);
            }
        }
        _ => {}
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
    fn test_parse_local() {
        assert_eq!(
            Reference::parse("#/components/schemas/Employee").unwrap(),
            Reference::Local {
                name: "Employee".to_string()
            }
        );
        assert_eq!(Reference::parse("#/Employee").unwrap().name(), "Employee");
    }

    #[test]
    fn test_parse_invalid() {
        for reference in ["#", "#Employee", "#/", "#/a/b", "Employee", "#/components//X"] {
            let err = Reference::parse(reference).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::SchemaNotFound, "{reference}");
        }

        let err = Reference::parse("https://example.com/spec.json#/X").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FeatureNotImplemented);
    }

    #[test]
    fn test_parse_remote() {
        let reference = Reference::parse("./models/../shared/doc.json#/components/schemas/a~1b").unwrap();
        assert_eq!(
            reference,
            Reference::Remote {
                document: "shared/doc.json".to_string(),
                pointer: vec![
                    "components".to_string(),
                    "schemas".to_string(),
                    "a/b".to_string()
                ],
            }
        );
        assert_eq!(reference.name(), "a/b");
        assert_eq!(reference.key(), "shared/doc.json#/components/schemas/a/b");
    }

    #[test]
    fn test_normalize_context() {
        assert_eq!(normalize_context("a/./b/../c.json"), "a/c.json");
        assert_eq!(normalize_context("../a/b.json"), "../a/b.json");
        assert_eq!(normalize_context("a/../../b.json"), "../b.json");
        assert_eq!(normalize_context("/x/../y.json"), "/y.json");
        assert_eq!(normalize_context("/../y.json"), "/y.json");
    }

    #[test]
    fn test_contextualize() {
        assert_eq!(contextualize("sub/doc.json", "#/X"), "sub/doc.json#/X");
        assert_eq!(
            contextualize("sub/doc.json", "other.json#/Y"),
            "sub/other.json#/Y"
        );
        assert_eq!(
            contextualize("sub/doc.json", "../top.json#/Z"),
            "top.json#/Z"
        );
        assert_eq!(contextualize("doc.json", "other.json#/Y"), "other.json#/Y");
    }

    #[test]
    fn test_get_local_ref() {
        let schemas = Schemas::from_value(json!({"Division": {"type": "object"}})).unwrap();
        let (name, schema) = get_ref("#/components/schemas/Division", &schemas).unwrap();
        assert_eq!(name, "Division");
        assert_eq!(schema, json!({"type": "object"}));

        let err = get_ref("#/components/schemas/Missing", &schemas).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaNotFound);
    }

    #[test]
    fn test_get_remote_ref_rewrites_context() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(
            dir.path().join("sub/remote.json"),
            json!({
                "Division": {
                    "type": "object",
                    "properties": {
                        "head": {"$ref": "#/Employee"},
                        "site": {"$ref": "sites.yaml#/Site"}
                    }
                }
            })
            .to_string(),
        )
        .unwrap();

        let schemas = Schemas::new().with_spec_path(dir.path().join("spec.json"));
        let (name, schema) = get_ref("sub/remote.json#/Division", &schemas).unwrap();

        assert_eq!(name, "Division");
        assert_eq!(
            schema,
            json!({
                "type": "object",
                "properties": {
                    "head": {"$ref": "sub/remote.json#/Employee"},
                    "site": {"$ref": "sub/sites.yaml#/Site"}
                }
            })
        );
    }

    #[test]
    fn test_get_remote_yaml_ref() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("shared.yml"),
            "Site:\n  type: object\n  x-tablename: site\n",
        )
        .unwrap();

        let schemas = Schemas::new().with_spec_path(dir.path().join("spec.yaml"));
        let (name, schema) = get_ref("shared.yml#/Site", &schemas).unwrap();
        assert_eq!(name, "Site");
        assert_eq!(schema, json!({"type": "object", "x-tablename": "site"}));
    }

    #[test]
    fn test_get_remote_ref_failures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("doc.json"), "{\"A\": {}}").unwrap();
        let schemas = Schemas::new().with_spec_path(dir.path().join("spec.json"));

        for reference in ["missing.json#/A", "broken.json#/A", "doc.json#/B"] {
            let err = get_ref(reference, &schemas).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::SchemaNotFound, "{reference}");
        }

        let err = get_ref("doc.json#/A", &Schemas::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaNotFound);
    }
}
