//! # Schemorm Core
//!
//! Core types and error handling for the schemorm schema compiler.
//!
//! This crate provides the foundational building blocks used by the IR and
//! mapping crates:
//!
//! - **Types**: primitive schema types, storage column types, cardinalities
//! - **Errors**: the failure taxonomy with `SchemaError` and `SchemaResult`
//!

pub mod error;
pub mod types;

// Re-export commonly used items at crate root
pub use error::{ErrorKind, ResultExt, SchemaError, SchemaResult};
pub use types::{Cardinality, ColumnType, PrimitiveType};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
