//! Relationship merge engine.
//!
//! Given owners already in memory, a merge loads their related instances
//! with one `IN (...)` query per chunk of distinct keys and attaches them:
//!
//! 1. Clear the target property on every owner and collect the distinct,
//!    non-null keys (join column values for `HAS_ONE`, owner ids otherwise).
//! 2. Fetch the cached SQL plan for the spec, or build it.
//! 3. Run the plan chunk by chunk, materializing related rows.
//! 4. Assign (`HAS_ONE`) or append (collections) in result order.
//!
//! Configuration problems are reported before any query runs. A database
//! error in a later chunk leaves the owners cleared but not populated.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use sqlmapper_core::{
    ConfigErrorKind, Connection, Entity, EntityMapping, Error, RelationDecl, Result, Row,
    TableMapping, Value,
};
use sqlmapper_query::{SqlPlan, columns_sql, materialize, prefix};

use crate::mapper::Mapper;
use crate::relationship::{RelationshipKind, RelationshipSpec};
use crate::validate::uninitialized;

/// Name of the list parameter in merge plans.
const KEYS_PARAM: &str = "keys";

/// Label of the owner key column in join-table plans, lengthened until no
/// related column label uses it. The key is read by position.
fn owner_key_alias(related: &TableMapping, related_prefix: &str) -> String {
    let mut alias = String::from("merge_owner_key");
    while related
        .properties()
        .iter()
        .any(|p| format!("{related_prefix}{}", p.column_name).eq_ignore_ascii_case(&alias))
    {
        alias.insert(0, '_');
    }
    alias
}

/// Hashable form of a key value.
///
/// Drivers may report the same integer as `Int` or `BigInt` depending on
/// its magnitude, so all integer widths collapse to one variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum MergeKey {
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid([u8; 16]),
    Bool(bool),
    Float(u64),
    Other(String),
}

impl MergeKey {
    /// `None` for SQL null.
    pub(crate) fn of(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Null => return None,
            Value::TinyInt(_) | Value::SmallInt(_) | Value::Int(_) | Value::BigInt(_) => {
                MergeKey::Int(value.as_i64()?)
            }
            Value::Text(s) | Value::Decimal(s) => MergeKey::Text(s.clone()),
            Value::Bytes(b) => MergeKey::Bytes(b.clone()),
            Value::Uuid(u) => MergeKey::Uuid(*u),
            Value::Bool(b) => MergeKey::Bool(*b),
            Value::Float(f) => MergeKey::Float(f64::from(*f).to_bits()),
            Value::Double(f) => MergeKey::Float(f.to_bits()),
            other => MergeKey::Other(other.to_string()),
        })
    }
}

/// Distinct non-null key values in first-seen order.
#[derive(Default)]
struct KeySet {
    seen: HashSet<MergeKey>,
    values: Vec<Value>,
}

impl KeySet {
    fn add(&mut self, value: Value) {
        if let Some(key) = MergeKey::of(&value) {
            if self.seen.insert(key) {
                self.values.push(value);
            }
        }
    }
}

impl<C: Connection> Mapper<C> {
    /// Populate the related property named by `spec` on every owner.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut orders = mapper.find_all::<Order>(None)?;
    /// mapper.merge(
    ///     &RelationshipSpec::<Order, OrderLine>::has_many()
    ///         .join_column_many_side("order_id")
    ///         .populate_property("order_lines")
    ///         .order_by("order_line.id"),
    ///     &mut orders,
    /// )?;
    /// ```
    pub fn merge<O: Entity, R: Entity + Clone>(
        &self,
        spec: &RelationshipSpec<O, R>,
        owners: &mut [O],
    ) -> Result<()> {
        self.merge_owners(spec, owners.iter_mut().collect())
    }

    /// Like [`merge`](Mapper::merge), skipping `None` entries.
    pub fn merge_sparse<O: Entity, R: Entity + Clone>(
        &self,
        spec: &RelationshipSpec<O, R>,
        owners: &mut [Option<O>],
    ) -> Result<()> {
        self.merge_owners(spec, owners.iter_mut().flatten().collect())
    }

    #[tracing::instrument(
        level = "debug",
        skip(self, spec, owners),
        fields(
            owner = O::entity_name(),
            related = R::entity_name(),
            kind = %spec.kind(),
            owners = owners.len()
        )
    )]
    fn merge_owners<O: Entity, R: Entity + Clone>(
        &self,
        spec: &RelationshipSpec<O, R>,
        mut owners: Vec<&mut O>,
    ) -> Result<()> {
        spec.check()?;
        let fingerprint = spec.fingerprint(self.id());
        if !self.is_validated(&fingerprint) {
            self.validate(spec)?;
        }
        if owners.is_empty() {
            return Ok(());
        }

        let owner_map = self.load_mapping::<O>()?;
        let related_map = self.load_mapping::<R>()?;
        let property = spec.populate_property_name().unwrap_or_default();
        let relation = owner_map.model().relation(property).ok_or_else(|| {
            Error::config(
                ConfigErrorKind::InvalidProperty,
                format!(
                    "Invalid property name {} for class {}",
                    property,
                    O::entity_name()
                ),
            )
        })?;

        let ctx = MergeContext {
            mapper: self,
            spec,
            fingerprint,
            owner_map: &owner_map,
            related_map: &related_map,
            relation,
            property,
        };
        match spec.kind() {
            RelationshipKind::HasOne => ctx.has_one(&mut owners),
            RelationshipKind::HasMany | RelationshipKind::HasManyThrough => {
                ctx.has_many(&mut owners)
            }
        }
    }
}

struct MergeContext<'a, C: Connection, O, R> {
    mapper: &'a Mapper<C>,
    spec: &'a RelationshipSpec<O, R>,
    fingerprint: String,
    owner_map: &'a EntityMapping<O>,
    related_map: &'a EntityMapping<R>,
    relation: &'a RelationDecl<O>,
    property: &'a str,
}

impl<C: Connection, O: Entity, R: Entity + Clone> MergeContext<'_, C, O, R> {
    fn has_one(&self, owners: &mut [&mut O]) -> Result<()> {
        let access = self.relation.one::<R>().ok_or_else(|| self.shape_error())?;
        let join_column = self.spec.join_column_owning_side_name().unwrap_or_default();
        let join_index = self
            .owner_map
            .table()
            .property_by_column(join_column)
            .and_then(|p| self.owner_map.table().property_index(&p.property_name))
            .ok_or_else(|| {
                Error::config(
                    ConfigErrorKind::InvalidJoinColumn,
                    format!(
                        "Invalid join column {} table {} for object {} does not have a column {}",
                        join_column,
                        self.owner_map.table().table_name(),
                        O::entity_name(),
                        join_column
                    ),
                )
            })?;

        let mut keys = KeySet::default();
        for owner in owners.iter_mut() {
            let owner = &mut **owner;
            *access(owner) = None;
            keys.add(self.owner_map.get(owner, join_index));
        }
        if keys.values.is_empty() {
            return Ok(());
        }

        let related_prefix = prefix(self.related_map.table().table_name());
        let mut by_id: HashMap<MergeKey, R> = HashMap::new();
        self.run(&keys.values, |row| {
            if let Some(related) = self.materialize(row, &related_prefix)? {
                if let Some(id) = MergeKey::of(&self.related_map.id_value(&related)) {
                    by_id.insert(id, related);
                }
            }
            Ok(())
        })?;

        for owner in owners.iter_mut() {
            let owner = &mut **owner;
            let key = MergeKey::of(&self.owner_map.get(owner, join_index));
            if let Some(related) = key.and_then(|k| by_id.get(&k)) {
                *access(owner) = Some(related.clone());
            }
        }
        tracing::debug!(matched = by_id.len(), "Merged hasOne relationship");
        Ok(())
    }

    fn has_many(&self, owners: &mut [&mut O]) -> Result<()> {
        let access = self.relation.many::<R>().ok_or_else(|| self.shape_error())?;
        if owners.iter_mut().any(|o| access.get(&mut **o).is_none()) {
            return Err(uninitialized::<O>(self.property));
        }

        let mut keys = KeySet::default();
        for owner in owners.iter_mut() {
            let owner = &mut **owner;
            if let Some(container) = access.get(owner) {
                container.clear();
            }
            keys.add(self.owner_map.id_value(owner));
        }
        if keys.values.is_empty() {
            return Ok(());
        }

        let related_prefix = prefix(self.related_map.table().table_name());
        let through = self.spec.kind() == RelationshipKind::HasManyThrough;
        let join_index = match self.spec.kind() {
            RelationshipKind::HasMany => {
                let join_column = self.spec.join_column_many_side_name().unwrap_or_default();
                self.related_map
                    .table()
                    .property_by_column(join_column)
                    .and_then(|p| self.related_map.table().property_index(&p.property_name))
            }
            _ => None,
        };

        let mut grouped: HashMap<MergeKey, Vec<R>> = HashMap::new();
        let mut rows = 0usize;
        self.run(&keys.values, |row| {
            rows += 1;
            let Some(related) = self.materialize(row, &related_prefix)? else {
                return Ok(());
            };
            // Join-table plans select the owner key first.
            let owner_key = match (through, join_index) {
                (true, _) => row.get(0).and_then(MergeKey::of),
                (false, Some(index)) => MergeKey::of(&self.related_map.get(&related, index)),
                (false, None) => None,
            };
            if let Some(key) = owner_key {
                grouped.entry(key).or_default().push(related);
            }
            Ok(())
        })?;

        for owner in owners.iter_mut() {
            let owner = &mut **owner;
            let Some(key) = MergeKey::of(&self.owner_map.id_value(owner)) else {
                continue;
            };
            if let (Some(related), Some(container)) = (grouped.get(&key), access.get(owner)) {
                container.extend(related.iter().cloned());
            }
        }
        tracing::debug!(rows, owners_matched = grouped.len(), "Merged collection relationship");
        Ok(())
    }

    fn materialize(&self, row: &Row, related_prefix: &str) -> Result<Option<R>> {
        materialize(
            row,
            self.related_map,
            related_prefix,
            self.mapper.conversion_service(),
        )
    }

    /// Run the plan for this spec once per chunk of `keys`, in order.
    ///
    /// The plan is cached only after every chunk succeeded.
    fn run(&self, keys: &[Value], mut on_row: impl FnMut(&Row) -> Result<()>) -> Result<()> {
        let cached = self.mapper.plan_cache().get(&self.fingerprint);
        let plan = match &cached {
            Some(plan) => Arc::clone(plan),
            None => Arc::new(self.build_plan()),
        };

        let conn = self.mapper.connection();
        let chunk_size = self.mapper.config().in_clause_chunk_size.max(1);
        for chunk in keys.chunks(chunk_size) {
            let (sql, params) = plan.expand(conn.dialect(), chunk);
            tracing::trace!(sql = %sql, keys = chunk.len(), "Executing merge chunk");
            conn.query_each(&sql, &params, &mut on_row)?;
        }

        if cached.is_none() {
            self.mapper
                .plan_cache()
                .insert(self.fingerprint.clone(), plan);
        }
        Ok(())
    }

    fn build_plan(&self) -> SqlPlan {
        let related = self.related_map.table();
        let related_table = related.table_name();
        let columns = columns_sql(related, related_table);
        let from = self.mapper.qualified(related_table);
        let owner_key = owner_key_alias(related, &prefix(related_table));

        let mut sql = match (self.spec.kind(), self.spec.through()) {
            (RelationshipKind::HasManyThrough, Some(through)) => format!(
                "SELECT {jt}.{owner_col} AS {owner_key}, {columns} FROM {jt_from} \
                 LEFT JOIN {from} ON {jt}.{related_col} = {related_table}.{related_id} \
                 WHERE {jt}.{owner_col} IN (:{KEYS_PARAM})",
                jt = through.table,
                jt_from = self.mapper.qualified(&through.table),
                owner_col = through.owner_join_column,
                related_col = through.related_join_column,
                related_id = related.id_column_name(),
            ),
            (RelationshipKind::HasMany, _) => format!(
                "SELECT {columns} FROM {from} WHERE {related_table}.{join} IN (:{KEYS_PARAM})",
                join = self.spec.join_column_many_side_name().unwrap_or_default(),
            ),
            _ => format!(
                "SELECT {columns} FROM {from} WHERE {related_table}.{id} IN (:{KEYS_PARAM})",
                id = related.id_column_name(),
            ),
        };
        if let Some(order_by) = self.spec.order_by_clause() {
            sql.push_str(" ORDER BY ");
            sql.push_str(order_by);
        }
        tracing::debug!(sql = %sql, "Built merge SQL plan");
        SqlPlan::new(sql, KEYS_PARAM)
    }

    fn shape_error(&self) -> Error {
        Error::config(
            ConfigErrorKind::TypeMismatch,
            format!(
                "property {}.{} cannot hold {} for a {} relationship",
                O::entity_name(),
                self.property,
                R::entity_name(),
                self.spec.kind()
            ),
        )
    }
}
