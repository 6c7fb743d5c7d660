//! The mapper: one connection, one configuration, shared caches.
//!
//! A [`Mapper`] owns everything that is learned once and reused: resolved
//! table mappings, cached merge SQL plans and cached CRUD statements. A
//! relationship whose plan is cached has passed validation. All of it sits behind
//! locks that are never held across a database call, so a mapper can be
//! shared between threads (`Arc<Mapper<C>>`).
//!
//! Merging, validation and the CRUD operations are implemented in their own
//! modules as further `impl` blocks on `Mapper`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use sqlmapper_core::{
    Connection, ConversionService, Entity, EntityMapping, Result, Row, Value,
};
use sqlmapper_query::{PlanCache, qualified_table};
use sqlmapper_schema::{Introspector, SchemaResolver};

use crate::config::MapperConfig;
use crate::crud::StatementKey;

static NEXT_MAPPER_ID: AtomicU64 = AtomicU64::new(1);

/// Supplies the value written to created-by / updated-by properties.
pub trait RecordOperatorResolver: Send + Sync {
    /// The current operator (user name, id, ...). `Value::Null` leaves the
    /// property unset.
    fn record_operator(&self) -> Value;
}

impl<F> RecordOperatorResolver for F
where
    F: Fn() -> Value + Send + Sync,
{
    fn record_operator(&self) -> Value {
        self()
    }
}

/// Maps structs to tables and merges relationships over one connection.
pub struct Mapper<C: Connection> {
    conn: C,
    config: MapperConfig,
    id: u64,
    resolver: SchemaResolver,
    conversion: ConversionService,
    plans: PlanCache,
    pub(crate) statements: RwLock<HashMap<StatementKey, Arc<str>>>,
    record_operator: Option<Arc<dyn RecordOperatorResolver>>,
}

impl<C: Connection> Mapper<C> {
    /// Create a mapper with the default configuration.
    pub fn new(conn: C) -> Self {
        Self::build(conn, MapperConfig::default())
    }

    /// Create a mapper with an explicit configuration.
    pub fn with_config(conn: C, config: MapperConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(conn, config))
    }

    fn build(conn: C, config: MapperConfig) -> Self {
        let id = NEXT_MAPPER_ID.fetch_add(1, Ordering::Relaxed);
        let introspector = Introspector::new(config.schema.clone(), config.catalog.clone());
        let resolver = SchemaResolver::new(introspector)
            .force_postgres_timestamp_tz(config.force_postgres_timestamp_tz);
        tracing::debug!(
            mapper_id = id,
            dialect = conn.dialect().name(),
            schema = ?config.schema,
            "Created mapper"
        );
        Self {
            plans: PlanCache::new(config.plan_cache_capacity),
            conn,
            config,
            id,
            resolver,
            conversion: ConversionService::new(),
            statements: RwLock::new(HashMap::new()),
            record_operator: None,
        }
    }

    /// Set the source of created-by / updated-by values.
    pub fn record_operator_resolver(
        mut self,
        resolver: impl RecordOperatorResolver + 'static,
    ) -> Self {
        self.record_operator = Some(Arc::new(resolver));
        self
    }

    /// Process-unique identifier, part of every plan fingerprint.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Converters applied to column values before assignment. Register
    /// custom converters here.
    pub fn conversion_service(&self) -> &ConversionService {
        &self.conversion
    }

    pub fn plan_cache(&self) -> &PlanCache {
        &self.plans
    }

    /// The resolved mapping of `E`, resolving it on first use.
    pub fn load_mapping<E: Entity>(&self) -> Result<Arc<EntityMapping<E>>> {
        self.resolver.resolve::<E, C>(&self.conn)
    }

    /// Column mapped to `property` of `E`, if any.
    pub fn column_name<E: Entity>(&self, property: &str) -> Result<Option<String>> {
        Ok(self
            .load_mapping::<E>()?
            .table()
            .column_name(property)
            .map(str::to_string))
    }

    /// Build an `E` from columns prefixed with `alias_`; see
    /// [`materialize`](sqlmapper_query::materialize).
    pub fn materialize<E: Entity>(&self, row: &Row, alias: &str) -> Result<Option<E>> {
        let mapping = self.load_mapping::<E>()?;
        sqlmapper_query::materialize(row, &mapping, &sqlmapper_query::prefix(alias), &self.conversion)
    }

    /// Table name qualified with the configured schema.
    pub(crate) fn qualified(&self, table: &str) -> String {
        qualified_table(self.config.schema.as_deref(), table)
    }

    pub(crate) fn operator(&self) -> Option<Value> {
        self.record_operator
            .as_ref()
            .map(|r| r.record_operator())
            .filter(|v| !v.is_null())
    }

    /// Whether a relationship with this fingerprint already ran to
    /// completion. Only validated specs reach the plan cache.
    pub(crate) fn is_validated(&self, fingerprint: &str) -> bool {
        self.plans.contains(fingerprint)
    }
}

impl<C: Connection> std::fmt::Debug for Mapper<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapper")
            .field("id", &self.id)
            .field("dialect", &self.conn.dialect())
            .field("config", &self.config)
            .field("resolver", &self.resolver)
            .field("plans", &self.plans.len())
            .finish_non_exhaustive()
    }
}
