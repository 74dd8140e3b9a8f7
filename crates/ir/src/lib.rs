//! # Schemorm IR
//!
//! Schema-level building blocks of the schemorm compiler. Everything here
//! reads entity schemas; nothing mutates the registry.
//!
//! ## Core Concepts
//!
//! - **Schemas**: the registry mapping entity names onto their schemas
//! - **Resolution**: following `$ref` pointers (local and remote) and merging
//!   `allOf` compositions into flat schemas
//! - **Peek**: fetching one keyword's effective value without resolving
//! - **Column artifacts**: storage columns compiled from scalar properties
//! - **Relationship artifacts**: links gathered from object/array properties
//!

// Module declarations
pub mod all_of;
pub mod column;
pub mod ext_prop;
pub mod inheritance;
pub mod peek;
pub mod reference;
pub mod registry;
pub mod relationship;
pub mod resolve;

// Re-export commonly used types at crate root
pub use column::ColumnArtifacts;
pub use ext_prop::{CompositeIndex, CompositeUnique, KwargsLevel};
pub use inheritance::{Inherits, resolve_own};
pub use reference::Reference;
pub use registry::Schemas;
pub use relationship::{Backref, RelationshipArtifacts, RelationshipType};
pub use resolve::{resolve, resolve_skipping};

// Re-export core types that are commonly used with the IR
pub use schemorm_core::{
    Cardinality, ColumnType, ErrorKind, PrimitiveType, ResultExt, SchemaError, SchemaResult,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Prelude Module
// ============================================================================

/// Convenient re-exports for common usage
pub mod prelude {
    pub use crate::{
        Backref,
        Cardinality,
        // Artifacts
        ColumnArtifacts,
        ColumnType,
        PrimitiveType,
        RelationshipArtifacts,
        RelationshipType,
        // Re-exported from core
        SchemaError,
        SchemaResult,
        // Registry
        Schemas,
        // Operations
        resolve,
        resolve_skipping,
    };
}
