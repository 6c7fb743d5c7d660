//! SQLMapper - metadata-driven row mapping and relationship merging for SQL databases.
//!
//! SQLMapper maps plain structs to tables using a one-time declaration plus
//! the live column metadata of the database, and stitches related structs
//! together without lazy loading:
//!
//! - Table mappings resolved once per type and cached
//! - Rows materialized from prefixed, aliased column lists
//! - `HAS_ONE`, `HAS_MANY` and `HAS_MANY_THROUGH` merges over batched `IN` queries
//! - Merge SQL cached per relationship configuration
//! - Joined queries with where, order-by and limit clauses
//! - Single-table CRUD with audit fields and optimistic locking
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlmapper::prelude::*;
//!
//! #[derive(Debug, Default, Clone)]
//! struct Customer {
//!     customer_id: Option<i64>,
//!     name: Option<String>,
//! }
//!
//! impl Entity for Customer {
//!     fn describe(model: &mut EntityModel<Self>) {
//!         model.id("customer_id", |c| &c.customer_id, |c| &mut c.customer_id).auto_increment();
//!         model.property("name", |c| &c.name, |c| &mut c.name);
//!     }
//! }
//!
//! #[derive(Debug, Default, Clone)]
//! struct Order {
//!     id: Option<i64>,
//!     customer_id: Option<i64>,
//!     customer: Option<Customer>,
//! }
//!
//! impl Entity for Order {
//!     fn describe(model: &mut EntityModel<Self>) {
//!         model.table("orders");
//!         model.id("id", |o| &o.id, |o| &mut o.id).auto_increment();
//!         model.property("customer_id", |o| &o.customer_id, |o| &mut o.customer_id);
//!         model.has_one("customer", |o| &mut o.customer);
//!     }
//! }
//!
//! fn example(conn: impl Connection) -> Result<()> {
//!     let mapper = Mapper::new(conn);
//!     let mut orders = mapper.find_all::<Order>(Some("id"))?;
//!     mapper.merge(
//!         &RelationshipSpec::<Order, Customer>::has_one()
//!             .join_column_owning_side("customer_id")
//!             .populate_property("customer"),
//!         &mut orders,
//!     )?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crud;
pub mod mapper;
pub mod merge;
pub mod query;
pub mod relationship;
pub mod validate;

pub use config::{DEFAULT_IN_CLAUSE_CHUNK_SIZE, MapperConfig};
pub use mapper::{Mapper, RecordOperatorResolver};
pub use query::{JoinQuery, Query};
pub use relationship::{RelationshipKind, RelationshipSpec, ThroughJoin};

// Re-export the building blocks from sub-crates
pub use sqlmapper_core::{
    ColumnValue, ConfigError, ConfigErrorKind, Connection, ConversionService, Dialect, Entity,
    EntityMapping, EntityModel, Error, HostType, IdKind, OptimisticLockError, PropertyMapping,
    QueryError, Result, Role, Row, SqlType, TableMapping, TypeInfo, Value,
};
pub use sqlmapper_query::{PlanCache, SqlPlan};
pub use sqlmapper_schema::{Introspector, SchemaResolver};

/// Everything needed to declare entities and run merges.
pub mod prelude {
    pub use crate::{
        Connection, Entity, EntityModel, Error, Mapper, MapperConfig, Query, RelationshipSpec,
        Result, Row, Value,
    };
}

#[cfg(test)]
mod testing;
