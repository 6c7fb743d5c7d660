//! SQL building blocks for SQLMapper.
//!
//! `sqlmapper-query` sits between the resolved table mappings and the
//! database. It renders aliased column lists, checks caller-supplied
//! order-by text, turns rows back into structs and caches the SQL plans
//! produced for relationship merges.
//!
//! # Role In The Architecture
//!
//! - **Select columns**: `alias.col AS alias_col` lists and table qualification.
//! - **Order-by validation**: only `table.column [asc|desc]` terms get through.
//! - **Materialization**: prefixed, case-insensitive row-to-struct mapping.
//! - **Plan cache**: fingerprint-keyed, bounded, shared across threads.
//!
//! Most users reach these through the `sqlmapper` facade crate.

pub mod cache;
pub mod materialize;
pub mod order_by;
pub mod select;

pub use cache::{DEFAULT_PLAN_CACHE_CAPACITY, PlanCache, SqlPlan};
pub use materialize::{holds_row, materialize};
pub use order_by::validate_order_by;
pub use select::{columns_sql, find_columns_sql, prefix, qualified_table};
