//! Core types used throughout the compiler
//!
//! This module contains the vocabulary shared by the IR and mapping crates:
//! the primitive types a schema may declare, the storage column types they
//! map to, and the relationship cardinalities.

use crate::error::{SchemaError, SchemaResult};
use serde::{Deserialize, Serialize};

// ============================================================================
// Primitive Types
// ============================================================================

/// Primitive types a schema may declare with the `type` keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    Integer,
    Number,
    String,
    Boolean,
    Object,
    Array,
}

impl PrimitiveType {
    /// Parse the value of a `type` keyword
    pub fn parse(value: &str) -> SchemaResult<Self> {
        match value {
            "integer" => Ok(PrimitiveType::Integer),
            "number" => Ok(PrimitiveType::Number),
            "string" => Ok(PrimitiveType::String),
            "boolean" => Ok(PrimitiveType::Boolean),
            "object" => Ok(PrimitiveType::Object),
            "array" => Ok(PrimitiveType::Array),
            other => Err(SchemaError::not_implemented(format!(
                "{other} type is not supported"
            ))),
        }
    }

    /// The keyword spelling of this type
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveType::Integer => "integer",
            PrimitiveType::Number => "number",
            PrimitiveType::String => "string",
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Object => "object",
            PrimitiveType::Array => "array",
        }
    }

    /// Check if this type maps onto a single scalar column
    pub fn is_scalar(&self) -> bool {
        !matches!(self, PrimitiveType::Object | PrimitiveType::Array)
    }
}

impl std::fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Column Types
// ============================================================================

/// Storage column types produced by the column compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// 32-bit signed integer
    Integer,
    /// 64-bit signed integer
    BigInteger,
    /// Floating point
    Float,
    /// Text with an optional maximum length
    String,
    /// Byte blob with an optional maximum length
    Binary,
    /// Calendar date
    Date,
    /// Timestamp
    DateTime,
    /// Boolean true/false
    Boolean,
    /// Arbitrary JSON document
    Json,
}

impl ColumnType {
    /// Map a primitive type and format onto a column type
    ///
    /// Object and array types only map onto [`ColumnType::Json`], which is
    /// selected by the caller through `x-json` rather than here.
    pub fn from_schema(ty: PrimitiveType, format: Option<&str>) -> SchemaResult<Self> {
        match (ty, format) {
            (PrimitiveType::Integer, None | Some("int32")) => Ok(ColumnType::Integer),
            (PrimitiveType::Integer, Some("int64")) => Ok(ColumnType::BigInteger),
            (PrimitiveType::Number, None | Some("float")) => Ok(ColumnType::Float),
            (PrimitiveType::String, None | Some("byte") | Some("password")) => {
                Ok(ColumnType::String)
            }
            (PrimitiveType::String, Some("binary")) => Ok(ColumnType::Binary),
            (PrimitiveType::String, Some("date")) => Ok(ColumnType::Date),
            (PrimitiveType::String, Some("date-time")) => Ok(ColumnType::DateTime),
            (PrimitiveType::Boolean, None) => Ok(ColumnType::Boolean),
            (ty, Some(format)) => Err(SchemaError::not_implemented(format!(
                "{format} format for {ty} is not supported"
            ))),
            (ty, None) => Err(SchemaError::not_implemented(format!(
                "{ty} is not supported as a column type"
            ))),
        }
    }

    /// Check if the column type honours a maximum length
    pub fn supports_max_length(&self) -> bool {
        matches!(self, ColumnType::String | ColumnType::Binary)
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "Integer",
            ColumnType::BigInteger => "BigInteger",
            ColumnType::Float => "Float",
            ColumnType::String => "String",
            ColumnType::Binary => "LargeBinary",
            ColumnType::Date => "Date",
            ColumnType::DateTime => "DateTime",
            ColumnType::Boolean => "Boolean",
            ColumnType::Json => "JSON",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ============================================================================
// Cardinality
// ============================================================================

/// Relationship cardinality, derived from the shape of a property
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// Object property whose back reference is not a list
    OneToOne,
    /// Array property without an association table
    OneToMany,
    /// Object property (the default for object references)
    ManyToOne,
    /// Array property through an association table
    ManyToMany { secondary: String },
}

impl Cardinality {
    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Cardinality::OneToOne => "One to One",
            Cardinality::OneToMany => "One to Many",
            Cardinality::ManyToOne => "Many to One",
            Cardinality::ManyToMany { .. } => "Many to Many",
        }
    }

    /// Check if this relationship requires an association table
    pub fn requires_association_table(&self) -> bool {
        matches!(self, Cardinality::ManyToMany { .. })
    }

    /// Check if the foreign key lives on the entity declaring the property
    ///
    /// Many-to-one and one-to-one keep the key locally, one-to-many puts it
    /// on the referenced entity and many-to-many on the association table.
    pub fn foreign_key_is_local(&self) -> bool {
        matches!(self, Cardinality::ManyToOne | Cardinality::OneToOne)
    }
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ============================================================================
// Tests
// ============================================================================
