//! Joined queries.
//!
//! Where a merge loads related instances for owners already in memory, a
//! [`Query`] loads the owners themselves with a single SELECT, optionally
//! joined to one related type so the relationship property is filled from
//! the same rows.
//!
//! ```ignore
//! let orders = Query::<Order>::new()
//!     .has_many::<OrderLine>()
//!     .join_column_many_side("order_id")
//!     .populate_property("orderLines")
//!     .where_clause("orders.status = ?")
//!     .bind("NEW")
//!     .order_by("orders.order_id, order_line.order_line_id")
//!     .execute(&mapper)?;
//! ```
//!
//! Owners come back in row order, each once. The where clause and its
//! parameters are passed through verbatim, so placeholders follow the
//! connection's dialect. The order-by clause may name columns of both tables.

use std::collections::HashMap;
use std::marker::PhantomData;

use sqlmapper_core::{
    ConfigErrorKind, Connection, Entity, EntityMapping, Error, ManyAccessor, OneAccessor, Result,
    TableMapping, Value, simple_type_name,
};
use sqlmapper_query::{columns_sql, materialize, prefix, validate_order_by};

use crate::mapper::Mapper;
use crate::merge::MergeKey;
use crate::relationship::{RelationshipKind, RelationshipSpec};

/// Where, order-by and limit settings shared by both query forms.
#[derive(Debug, Clone, Default)]
struct Clauses {
    where_clause: Option<String>,
    params: Vec<Value>,
    order_by: Option<String>,
    limit: Option<String>,
}

impl Clauses {
    fn check(&self, owner: &TableMapping, related: Option<&TableMapping>) -> Result<()> {
        if self.where_clause.as_deref().is_some_and(|w| w.trim().is_empty()) {
            return Err(invalid(
                "where() blank string is invalid. Don't invoke where() method if no value",
            ));
        }
        if self.limit.as_deref().is_some_and(|l| l.trim().is_empty()) {
            return Err(invalid(
                "limitClause() blank string is invalid. Don't invoke limitClause() method if no value",
            ));
        }
        if let Some(order_by) = &self.order_by {
            validate_order_by(order_by, owner, related)?;
        }
        Ok(())
    }

    /// Append the clauses to `select`.
    fn finish(&self, mut select: String) -> String {
        if let Some(where_clause) = &self.where_clause {
            select.push_str(" WHERE ");
            select.push_str(where_clause.trim());
        }
        if let Some(order_by) = &self.order_by {
            select.push_str(" ORDER BY ");
            select.push_str(order_by.trim());
        }
        if let Some(limit) = &self.limit {
            select.push(' ');
            select.push_str(limit.trim());
        }
        select
    }
}

fn invalid(message: &str) -> Error {
    Error::config(ConfigErrorKind::InvalidQuery, message)
}

/// A single-table query for `O`; see the [module docs](self).
pub struct Query<O> {
    clauses: Clauses,
    _marker: PhantomData<fn() -> O>,
}

impl<O: Entity> Query<O> {
    pub fn new() -> Self {
        Self {
            clauses: Clauses::default(),
            _marker: PhantomData,
        }
    }

    /// SQL condition appended after `WHERE`. Bind its parameters with
    /// [`bind`](Query::bind), in placeholder order.
    pub fn where_clause(mut self, condition: &str) -> Self {
        self.clauses.where_clause = Some(condition.to_string());
        self
    }

    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.clauses.params.push(value.into());
        self
    }

    /// `table.column [asc|desc], ...` against the owner table.
    pub fn order_by(mut self, order_by: &str) -> Self {
        self.clauses.order_by = Some(order_by.trim().to_string());
        self
    }

    /// Row limiting clause appended last, written in the connection's
    /// dialect (`LIMIT 10`, `FETCH FIRST 10 ROWS ONLY`).
    pub fn limit_clause(mut self, limit: &str) -> Self {
        self.clauses.limit = Some(limit.to_string());
        self
    }

    /// Join each owner to at most one `R` through a column of the owner table.
    pub fn has_one<R: Entity>(self) -> JoinQuery<O, R> {
        JoinQuery::new(RelationshipSpec::has_one(), self.clauses)
    }

    /// Join each owner to the `R` rows whose join column references it.
    pub fn has_many<R: Entity>(self) -> JoinQuery<O, R> {
        JoinQuery::new(RelationshipSpec::has_many(), self.clauses)
    }

    /// Join owners to `R` through `join_table`.
    pub fn has_many_through<R: Entity>(
        self,
        join_table: &str,
        owner_join_column: &str,
        related_join_column: &str,
    ) -> JoinQuery<O, R> {
        JoinQuery::new(
            RelationshipSpec::has_many_through(join_table, owner_join_column, related_join_column),
            self.clauses,
        )
    }

    #[tracing::instrument(level = "debug", skip(self, mapper), fields(owner = O::entity_name()))]
    pub fn execute<C: Connection>(&self, mapper: &Mapper<C>) -> Result<Vec<O>> {
        let owner_map = mapper.load_mapping::<O>()?;
        let owner = owner_map.table();
        self.clauses.check(owner, None)?;

        let sql = self.clauses.finish(format!(
            "SELECT {} FROM {}",
            columns_sql(owner, owner.table_name()),
            mapper.qualified(owner.table_name())
        ));
        tracing::debug!(sql = %sql, "Executing query");

        let owner_prefix = prefix(owner.table_name());
        let mut found = Vec::new();
        mapper
            .connection()
            .query_each(&sql, &self.clauses.params, &mut |row| {
                if let Some(entity) =
                    materialize(row, &owner_map, &owner_prefix, mapper.conversion_service())?
                {
                    found.push(entity);
                }
                Ok(())
            })?;
        Ok(found)
    }
}

impl<O: Entity> Default for Query<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> std::fmt::Debug for Query<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("owner", &simple_type_name(std::any::type_name::<O>()))
            .field("clauses", &self.clauses)
            .finish()
    }
}

/// A query for `O` joined to `R`; built from [`Query`].
pub struct JoinQuery<O, R> {
    spec: RelationshipSpec<O, R>,
    clauses: Clauses,
}

enum Slot<O, R> {
    One(OneAccessor<O, R>),
    Many(ManyAccessor<O, R>),
}

impl<O: Entity, R: Entity> JoinQuery<O, R> {
    fn new(spec: RelationshipSpec<O, R>, clauses: Clauses) -> Self {
        Self { spec, clauses }
    }

    /// Join column on the owner table (`has_one` only).
    pub fn join_column_owning_side(mut self, column: &str) -> Self {
        self.spec = self.spec.join_column_owning_side(column);
        self
    }

    /// Join column on the related table (`has_many` only).
    pub fn join_column_many_side(mut self, column: &str) -> Self {
        self.spec = self.spec.join_column_many_side(column);
        self
    }

    /// Owner property that receives the joined instances.
    pub fn populate_property(mut self, property: &str) -> Self {
        self.spec = self.spec.populate_property(property);
        self
    }

    pub fn where_clause(mut self, condition: &str) -> Self {
        self.clauses.where_clause = Some(condition.to_string());
        self
    }

    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.clauses.params.push(value.into());
        self
    }

    /// `table.column [asc|desc], ...` against the owner or related table.
    pub fn order_by(mut self, order_by: &str) -> Self {
        self.clauses.order_by = Some(order_by.trim().to_string());
        self
    }

    /// Only for `has_one` joins, where rows and owners correspond.
    pub fn limit_clause(mut self, limit: &str) -> Self {
        self.clauses.limit = Some(limit.to_string());
        self
    }

    pub fn relationship(&self) -> &RelationshipSpec<O, R> {
        &self.spec
    }

    #[tracing::instrument(
        level = "debug",
        skip(self, mapper),
        fields(owner = O::entity_name(), related = R::entity_name(), kind = %self.spec.kind())
    )]
    pub fn execute<C: Connection>(&self, mapper: &Mapper<C>) -> Result<Vec<O>> {
        mapper.validate(&self.spec)?;
        let owner_map = mapper.load_mapping::<O>()?;
        let related_map = mapper.load_mapping::<R>()?;
        let (owner, related) = (owner_map.table(), related_map.table());

        if owner.table_name() == related.table_name() {
            return Err(self.spec.error(
                ConfigErrorKind::InvalidQuery,
                &format!(
                    "Query cannot join table {} to itself. Use merge() for this relationship",
                    owner.table_name()
                ),
            ));
        }
        if self.clauses.limit.is_some() && self.spec.kind() != RelationshipKind::HasOne {
            return Err(self.spec.error(
                ConfigErrorKind::InvalidQuery,
                "limitClause() is not supported for hasMany relationships",
            ));
        }
        self.clauses.check(owner, Some(related))?;

        let property = self.spec.populate_property_name().unwrap_or_default();
        let slot = owner_map
            .model()
            .relation(property)
            .and_then(|decl| match self.spec.kind() {
                RelationshipKind::HasOne => decl.one::<R>().map(Slot::One),
                _ => decl.many::<R>().map(Slot::Many),
            })
            .ok_or_else(|| {
                self.spec.error(
                    ConfigErrorKind::TypeMismatch,
                    &format!("property {}.{property} cannot hold {}", O::entity_name(), R::entity_name()),
                )
            })?;

        let sql = self.clauses.finish(self.select_sql(mapper, &owner_map, &related_map)?);
        tracing::debug!(sql = %sql, "Executing joined query");

        let owner_prefix = prefix(owner.table_name());
        let related_prefix = prefix(related.table_name());
        let conversion = mapper.conversion_service();
        let mut owners: Vec<O> = Vec::new();
        let mut positions: HashMap<MergeKey, usize> = HashMap::new();
        let mut rows = 0usize;

        mapper
            .connection()
            .query_each(&sql, &self.clauses.params, &mut |row| {
                rows += 1;
                let Some(candidate) = materialize(row, &owner_map, &owner_prefix, conversion)? else {
                    return Ok(());
                };
                let Some(key) = MergeKey::of(&owner_map.id_value(&candidate)) else {
                    return Ok(());
                };
                let index = *positions.entry(key).or_insert_with(|| {
                    owners.push(candidate);
                    owners.len() - 1
                });
                let Some(item) = materialize(row, &related_map, &related_prefix, conversion)? else {
                    return Ok(());
                };
                let owner = &mut owners[index];
                match &slot {
                    Slot::One(access) => *access(owner) = Some(item),
                    Slot::Many(access) => {
                        if let Some(container) = access.get(owner) {
                            container.push(item);
                        }
                    }
                }
                Ok(())
            })?;

        tracing::debug!(rows, owners = owners.len(), "Joined query complete");
        Ok(owners)
    }

    fn select_sql<C: Connection>(
        &self,
        mapper: &Mapper<C>,
        owner_map: &EntityMapping<O>,
        related_map: &EntityMapping<R>,
    ) -> Result<String> {
        let (owner, related) = (owner_map.table(), related_map.table());
        let owner_table = owner.table_name();
        let related_table = related.table_name();
        let join = match (self.spec.kind(), self.spec.through()) {
            (RelationshipKind::HasOne, _) => format!(
                "LEFT JOIN {} ON {owner_table}.{} = {related_table}.{}",
                mapper.qualified(related_table),
                self.spec.join_column_owning_side_name().unwrap_or_default(),
                related.id_column_name()
            ),
            (RelationshipKind::HasMany, _) => format!(
                "LEFT JOIN {} ON {owner_table}.{} = {related_table}.{}",
                mapper.qualified(related_table),
                owner.id_column_name(),
                self.spec.join_column_many_side_name().unwrap_or_default()
            ),
            (RelationshipKind::HasManyThrough, Some(through)) => format!(
                "LEFT JOIN {jt_from} ON {owner_table}.{owner_id} = {jt}.{owner_col} \
                 LEFT JOIN {from} ON {jt}.{related_col} = {related_table}.{related_id}",
                jt = through.table,
                jt_from = mapper.qualified(&through.table),
                owner_id = owner.id_column_name(),
                owner_col = through.owner_join_column,
                related_col = through.related_join_column,
                from = mapper.qualified(related_table),
                related_id = related.id_column_name(),
            ),
            (RelationshipKind::HasManyThrough, None) => {
                return Err(self.spec.error(
                    ConfigErrorKind::InvalidJoinColumn,
                    "throughJoinTable cannot be blank",
                ));
            }
        };
        Ok(format!(
            "SELECT {}, {} FROM {} {join}",
            columns_sql(owner, owner_table),
            columns_sql(related, related_table),
            mapper.qualified(owner_table)
        ))
    }
}

impl<O, R> std::fmt::Debug for JoinQuery<O, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinQuery")
            .field("spec", &self.spec)
            .field("clauses", &self.clauses)
            .finish()
    }
}
