//! Error types for the schemorm compiler
//!
//! Every failure raised while resolving schemas or deriving mapping artifacts
//! is a [`SchemaError`]. Each variant corresponds to one failure kind; the
//! kind survives any context that is layered on top with
//! [`ResultExt::with_context`].

use thiserror::Error;

/// The main error type for the schema compiler
#[derive(Debug, Error)]
pub enum SchemaError {
    // ========================================================================
    // Resolution Errors
    // ========================================================================
    /// A `$ref` pointer (or the document it points into) could not be resolved
    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    /// The `type` keyword is required but absent
    #[error("Type missing: {0}")]
    TypeMissing(String),

    // ========================================================================
    // Structural Errors
    // ========================================================================
    /// Structural violation: wrong value type, missing keyword, circular reference
    #[error("Malformed schema: {0}")]
    MalformedSchema(String),

    /// A relationship-specific rule was violated
    #[error("Malformed relationship: {0}")]
    MalformedRelationship(String),

    /// An `x-*` keyword value failed its shape validation
    #[error("Malformed extension property '{name}': {message}")]
    MalformedExtensionProperty { name: String, message: String },

    /// Syntactically valid but unsupported input (e.g. `number` with `double`)
    #[error("Feature not implemented: {0}")]
    FeatureNotImplemented(String),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// The compiler configuration could not be loaded
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // Context
    // ========================================================================
    /// Another error with the entity/property it was raised for
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<SchemaError>,
    },
}

/// The failure kind of a [`SchemaError`], independent of any context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SchemaNotFound,
    TypeMissing,
    MalformedSchema,
    MalformedRelationship,
    MalformedExtensionProperty,
    FeatureNotImplemented,
    InvalidConfig,
}

impl SchemaError {
    /// Create a schema-not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        SchemaError::SchemaNotFound(msg.into())
    }

    /// Create a type-missing error
    pub fn type_missing(msg: impl Into<String>) -> Self {
        SchemaError::TypeMissing(msg.into())
    }

    /// Create a malformed schema error
    pub fn malformed_schema(msg: impl Into<String>) -> Self {
        SchemaError::MalformedSchema(msg.into())
    }

    /// Create a malformed relationship error
    pub fn malformed_relationship(msg: impl Into<String>) -> Self {
        SchemaError::MalformedRelationship(msg.into())
    }

    /// Create a malformed extension property error
    pub fn malformed_extension(name: impl Into<String>, msg: impl Into<String>) -> Self {
        SchemaError::MalformedExtensionProperty {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a feature-not-implemented error
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        SchemaError::FeatureNotImplemented(msg.into())
    }

    /// Create an error with context
    pub fn with_context(context: impl Into<String>, source: SchemaError) -> Self {
        SchemaError::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// The failure kind, looking through any added context
    pub fn kind(&self) -> ErrorKind {
        match self {
            SchemaError::SchemaNotFound(_) => ErrorKind::SchemaNotFound,
            SchemaError::TypeMissing(_) => ErrorKind::TypeMissing,
            SchemaError::MalformedSchema(_) => ErrorKind::MalformedSchema,
            SchemaError::MalformedRelationship(_) => ErrorKind::MalformedRelationship,
            SchemaError::MalformedExtensionProperty { .. } => {
                ErrorKind::MalformedExtensionProperty
            }
            SchemaError::FeatureNotImplemented(_) => ErrorKind::FeatureNotImplemented,
            SchemaError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            SchemaError::WithContext { source, .. } => source.kind(),
        }
    }

    /// The innermost error, without context layers
    pub fn root(&self) -> &SchemaError {
        match self {
            SchemaError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this error is a structural schema error
    pub fn is_malformed(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::MalformedSchema
                | ErrorKind::MalformedRelationship
                | ErrorKind::MalformedExtensionProperty
        )
    }

    /// Check if this error is a resolution error
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::SchemaNotFound
    }
}

/// Result type alias using SchemaError
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<C: Into<String>>(self, context: C) -> SchemaResult<T>;
}

impl<T> ResultExt<T> for SchemaResult<T> {
    fn with_context<C: Into<String>>(self, context: C) -> SchemaResult<T> {
        self.map_err(|e| SchemaError::with_context(context, e))
    }
}

// ============================================================================
// Tests
// ============================================================================
