//! # Schemorm
//!
//! Compiles entity schemas (OpenAPI / JSON-Schema documents extended with
//! `x-` keywords) into relational mapping artifacts: tables, columns,
//! foreign keys, relationships and association tables.
//!
//! ## Crates
//!
//! - [`schemorm_core`]: error type and the type vocabulary shared by all crates
//! - [`schemorm_ir`]: schema registry, `$ref`/`allOf` resolution, peek and
//!   per-property artifacts
//! - [`schemorm_mapping`]: foreign keys, back references, association tables
//!   and the compilation driver
//!
//! ## Usage
//!
//! ```rust,ignore
//! use schemorm::{CompilerConfig, compile_file};
//!
//! schemorm::init_logging();
//! let (compiled, _schemas) = compile_file("openapi.yaml", CompilerConfig::default())?;
//! for model in &compiled.models {
//!     println!("{} -> {}", model.name, model.tablename);
//! }
//! ```

use std::path::Path;

pub use schemorm_core as core;
pub use schemorm_ir as ir;
pub use schemorm_mapping as mapping;

pub use schemorm_core::{
    Cardinality, ColumnType, ErrorKind, PrimitiveType, ResultExt, SchemaError, SchemaResult,
};
pub use schemorm_ir::{ColumnArtifacts, RelationshipArtifacts, Schemas, resolve};
pub use schemorm_mapping::{
    AssociationTable, CompiledSchema, Compiler, CompilerConfig, ModelArtifacts,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install a formatting subscriber honoring `RUST_LOG`, defaulting to `info`
///
/// Does nothing when a global subscriber is already set.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Load a JSON or YAML document and compile its `components.schemas`
///
/// The document's path is used for remote references unless the
/// configuration names another one. Returns the compiled artifacts along
/// with the registry as rewritten by the compiler.
pub fn compile_file(
    path: impl AsRef<Path>,
    config: CompilerConfig,
) -> SchemaResult<(CompiledSchema, Schemas)> {
    let path = path.as_ref();
    let mut schemas = Schemas::load(path)?;
    tracing::info!(path = %path.display(), entities = schemas.len(), "loaded schema document");

    let compiled = Compiler::new(config).compile(&mut schemas)?;
    Ok((compiled, schemas))
}

// ============================================================================
// Prelude Module
// ============================================================================

/// Convenient re-exports for common usage
pub mod prelude {
    pub use crate::{
        Cardinality, ColumnArtifacts, ColumnType, CompiledSchema, Compiler, CompilerConfig,
        ModelArtifacts, RelationshipArtifacts, SchemaError, SchemaResult, Schemas,
        compile_file,
    };
}

// ============================================================================
// Tests
// ============================================================================
