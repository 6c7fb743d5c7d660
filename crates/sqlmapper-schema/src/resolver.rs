//! Schema Metadata Resolver.
//!
//! Builds the [`EntityMapping`] of a struct type from its declaration and
//! the live column metadata of its table, once per type. Later calls are
//! served from an in-memory cache without touching the database.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use sqlmapper_core::mapping::{column_name_for, table_name_for};
use sqlmapper_core::{
    ConfigErrorKind, Connection, Dialect, Entity, EntityMapping, EntityModel, Error, IdKind,
    PropertyMapping, Result, Role, SqlType, TableMapping,
};

use crate::introspect::{ColumnMetadata, Introspector};

type CachedMapping = Arc<dyn Any + Send + Sync>;

/// Resolves and caches struct-to-table mappings.
pub struct SchemaResolver {
    introspector: Introspector,
    force_postgres_timestamp_tz: bool,
    cache: RwLock<HashMap<TypeId, CachedMapping>>,
}

impl SchemaResolver {
    pub fn new(introspector: Introspector) -> Self {
        Self {
            introspector,
            force_postgres_timestamp_tz: false,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Report `TIMESTAMPTZ` for UTC timestamp properties on PostgreSQL,
    /// whatever the column metadata says.
    pub fn force_postgres_timestamp_tz(mut self, enabled: bool) -> Self {
        self.force_postgres_timestamp_tz = enabled;
        self
    }

    /// The mapping for `E`, building it on first use.
    ///
    /// Two threads resolving the same type concurrently may both build it;
    /// the first one published is kept and returned to both.
    pub fn resolve<E: Entity, C: Connection + ?Sized>(
        &self,
        conn: &C,
    ) -> Result<Arc<EntityMapping<E>>> {
        if let Some(mapping) = self.cached::<E>() {
            return Ok(mapping);
        }

        let built: CachedMapping = Arc::new(self.build::<E, C>(conn)?);
        let published = {
            let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
            Arc::clone(cache.entry(TypeId::of::<E>()).or_insert(built))
        };
        downcast::<E>(published)
    }

    /// The cached mapping for `E`, if already resolved.
    pub fn cached<E: Entity>(&self) -> Option<Arc<EntityMapping<E>>> {
        let entry = {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            cache.get(&TypeId::of::<E>()).cloned()
        }?;
        downcast::<E>(entry).ok()
    }

    /// Number of resolved types.
    pub fn len(&self) -> usize {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[tracing::instrument(level = "debug", skip(self, conn), fields(entity = E::entity_name()))]
    fn build<E: Entity, C: Connection + ?Sized>(&self, conn: &C) -> Result<EntityMapping<E>> {
        let entity_name = E::entity_name();
        let model = EntityModel::<E>::declare();
        let table_name = model
            .table_override()
            .map_or_else(|| table_name_for(entity_name), str::to_ascii_lowercase);

        let columns = self.introspector.columns(conn, &table_name)?;
        if columns.is_empty() {
            return Err(Error::config(
                ConfigErrorKind::MissingTable,
                format!(
                    "Unable to locate meta-data for table {} (struct {}) in the database",
                    table_name, entity_name
                ),
            ));
        }
        let by_name: HashMap<&str, &ColumnMetadata> =
            columns.iter().map(|c| (c.name.as_str(), c)).collect();

        let (id_property, id_kind) = designated_id(&model, entity_name)?;

        let mut properties = Vec::with_capacity(model.properties().len());
        let mut roles: Vec<(Role, &str)> = Vec::new();
        for decl in model.properties() {
            let column = decl
                .column_override()
                .map_or_else(|| column_name_for(decl.name()), str::to_ascii_lowercase);

            let Some(meta) = by_name.get(column.as_str()) else {
                if decl.column_override().is_some() {
                    return Err(Error::config(
                        ConfigErrorKind::UnknownColumn,
                        format!(
                            "column {} declared for property {}.{} not found in table {}",
                            column,
                            entity_name,
                            decl.name(),
                            table_name
                        ),
                    ));
                }
                if decl.name() == id_property {
                    return Err(Error::config(
                        ConfigErrorKind::MissingId,
                        format!(
                            "id property {}.{} does not have a corresponding column {} in table {}",
                            entity_name,
                            decl.name(),
                            column,
                            table_name
                        ),
                    ));
                }
                tracing::trace!(property = decl.name(), column = %column, "Property left unmapped");
                continue;
            };

            let sql_type = if self.force_postgres_timestamp_tz
                && conn.dialect() == Dialect::Postgres
                && decl.sql_type().has_zone()
            {
                SqlType::TimestampTz
            } else {
                meta.sql_type.clone()
            };

            if let Some(role) = decl.role() {
                roles.push((role, decl.name()));
            }
            properties.push(PropertyMapping::new(decl.name(), &meta.name, decl.host(), sql_type));
        }

        // Role properties whose column was not found are reported by name.
        for decl in model.properties() {
            if let Some(role) = decl.role() {
                if !properties.iter().any(|p| p.property_name == decl.name()) {
                    roles.push((role, decl.name()));
                }
            }
        }

        let table = TableMapping::new(
            entity_name,
            &table_name,
            properties,
            id_property,
            id_kind == IdKind::AutoIncrement,
            &roles,
        )?;
        tracing::debug!(
            table = table.table_name(),
            properties = table.properties().len(),
            "Resolved table mapping"
        );
        EntityMapping::new(table, model)
    }
}

impl std::fmt::Debug for SchemaResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaResolver")
            .field("introspector", &self.introspector)
            .field("force_postgres_timestamp_tz", &self.force_postgres_timestamp_tz)
            .field("resolved", &self.len())
            .finish()
    }
}

/// The explicitly designated id, or a property named `id`.
fn designated_id<E: Entity>(
    model: &EntityModel<E>,
    entity_name: &str,
) -> Result<(&'static str, IdKind)> {
    let mut explicit = model
        .properties()
        .iter()
        .filter_map(|d| d.id_kind().map(|kind| (d.name(), kind)));
    match (explicit.next(), explicit.next()) {
        (Some(id), None) => Ok(id),
        (Some(_), Some(_)) => Err(Error::config(
            ConfigErrorKind::MissingId,
            format!("{} declares more than one id property", entity_name),
        )),
        (None, _) => model
            .property_decl("id")
            .map(|d| (d.name(), IdKind::Manual))
            .ok_or_else(|| {
                Error::config(
                    ConfigErrorKind::MissingId,
                    format!("{} does not declare an id property", entity_name),
                )
            }),
    }
}

fn downcast<E: Entity>(entry: CachedMapping) -> Result<Arc<EntityMapping<E>>> {
    entry.downcast::<EntityMapping<E>>().map_err(|_| {
        Error::Custom(format!(
            "mapping cache entry for {} has an unexpected type",
            E::entity_name()
        ))
    })
}
