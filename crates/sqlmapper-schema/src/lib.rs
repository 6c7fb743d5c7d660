//! Schema metadata support for SQLMapper.
//!
//! This crate provides:
//! - Column metadata introspection for SQLite, PostgreSQL and MySQL
//! - The schema resolver that turns entity declarations into cached
//!   table mappings

pub mod introspect;
pub mod resolver;

pub use introspect::{ColumnMetadata, Introspector, parse_sql_type};
pub use resolver::SchemaResolver;
