//! Core types and traits for SQLMapper.
//!
//! This crate provides the foundational abstractions the mapper is built on:
//!
//! - `Value` / `Row` for raw SQL data
//! - `Entity` declarations describing how a struct maps to a table
//! - `TableMapping` for the resolved struct/table link
//! - `ConversionService` for reshaping driver values before assignment
//! - `Connection` trait for blocking database access

pub mod connection;
pub mod convert;
pub mod entity;
pub mod error;
pub mod identifiers;
pub mod mapping;
pub mod row;
pub mod types;
pub mod value;

pub use connection::{Connection, Dialect};
pub use convert::{ConversionService, Converter};
pub use entity::{
    ColumnValue, Entity, EntityModel, IdKind, ManyAccessor, OneAccessor, PropertyBuilder,
    PropertyDecl, RelationDecl, RelationShape, Role,
};
pub use error::{
    ConfigError, ConfigErrorKind, ConnectionError, Error,
    OptimisticLockError, QueryError, QueryErrorKind, Result, TypeError,
};
pub use identifiers::{is_valid_identifier, sanitize_identifier};
pub use mapping::{EntityMapping, PropertyMapping, TableMapping};
pub use row::{ColumnIndex, FromValue, Row};
pub use types::{HostType, SqlType, TypeInfo, simple_type_name};
pub use value::Value;
