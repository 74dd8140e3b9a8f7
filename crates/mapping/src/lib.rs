//! # Schemorm Mapping
//!
//! Relational mapping for schemorm: turns resolved entity schemas into
//! tables, columns, foreign keys and relationships.
//!
//! ## Features
//!
//! - **Foreign keys**: synthesizes the key column every relationship needs
//! - **Back references**: adds reverse properties to referenced entities
//! - **Association tables**: joins both sides of many-to-many relationships
//! - **Compiler**: drives the whole pass over a schema registry
//!

// ============================================================================
// Modules
// ============================================================================

pub mod association;
pub mod backref;
pub mod compiler;
pub mod foreign_key;
pub mod models;

// ============================================================================
// Re-exports
// ============================================================================

pub use association::{AssociationColumn, AssociationTable};
pub use compiler::{CompiledSchema, Compiler};
pub use foreign_key::{ForeignKeyRequirement, ensure_foreign_key};
pub use models::{
    ColumnInjection, CompiledModels, ModelArtifacts, ModelProperty, ModelRegistry,
    PropertyArtifacts,
};

use schemorm_core::{SchemaError, SchemaResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// CompilerConfig
// ============================================================================

/// Configuration for the schema compiler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Path of the schema document; relative remote references are read
    /// from its directory
    pub spec_path: Option<PathBuf>,

    /// Whether to validate extension properties before compiling an entity
    pub validate_extensions: bool,

    /// Whether to add back references before compiling
    pub process_backrefs: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            spec_path: None,
            validate_extensions: true,
            process_backrefs: true,
        }
    }
}

impl CompilerConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML
    pub fn from_toml_str(text: &str) -> SchemaResult<Self> {
        toml::from_str(text).map_err(|e| SchemaError::InvalidConfig(e.to_string()))
    }

    /// Read a configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> SchemaResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SchemaError::InvalidConfig(format!("failed to read '{}': {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Set the schema document path
    pub fn with_spec_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.spec_path = Some(path.into());
        self
    }

    /// Skip extension property validation
    pub fn without_validation(mut self) -> Self {
        self.validate_extensions = false;
        self
    }

    /// Skip back reference synthesis
    pub fn without_backrefs(mut self) -> Self {
        self.process_backrefs = false;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
