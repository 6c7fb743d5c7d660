//! Mapper configuration.

use serde::{Deserialize, Serialize};

use sqlmapper_core::{ConfigErrorKind, Error, Result};
use sqlmapper_query::DEFAULT_PLAN_CACHE_CAPACITY;

/// Default number of key values bound into one `IN (...)` list.
pub const DEFAULT_IN_CLAUSE_CHUNK_SIZE: usize = 100;

/// Settings a [`Mapper`](crate::Mapper) is created with.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use sqlmapper::MapperConfig;
///
/// let config = MapperConfig::from_json(r#"{ "schema": "sales", "in_clause_chunk_size": 50 }"#).unwrap();
/// assert_eq!(config.schema.as_deref(), Some("sales"));
/// assert_eq!(config.in_clause_chunk_size, 50);
/// assert_eq!(config.plan_cache_capacity, 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Schema tables live in; generated SQL qualifies table names with it.
    pub schema: Option<String>,
    /// Catalog used for metadata lookups (the database name on MySQL).
    pub catalog: Option<String>,
    /// Maximum number of values per `IN (...)` list in merge queries.
    pub in_clause_chunk_size: usize,
    /// Maximum number of cached merge SQL plans.
    pub plan_cache_capacity: usize,
    /// Map UTC timestamp properties to `TIMESTAMPTZ` on PostgreSQL.
    pub force_postgres_timestamp_tz: bool,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            schema: None,
            catalog: None,
            in_clause_chunk_size: DEFAULT_IN_CLAUSE_CHUNK_SIZE,
            plan_cache_capacity: DEFAULT_PLAN_CACHE_CAPACITY,
            force_postgres_timestamp_tz: false,
        }
    }
}

impl MapperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    pub fn in_clause_chunk_size(mut self, size: usize) -> Self {
        self.in_clause_chunk_size = size;
        self
    }

    pub fn plan_cache_capacity(mut self, capacity: usize) -> Self {
        self.plan_cache_capacity = capacity;
        self
    }

    pub fn force_postgres_timestamp_tz(mut self, enabled: bool) -> Self {
        self.force_postgres_timestamp_tz = enabled;
        self
    }

    /// Reject settings the mapper cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.in_clause_chunk_size == 0 {
            return Err(Error::config(
                ConfigErrorKind::InvalidState,
                "in_clause_chunk_size must be at least 1",
            ));
        }
        for (name, value) in [("schema", &self.schema), ("catalog", &self.catalog)] {
            if let Some(v) = value {
                if v.trim().is_empty() {
                    return Err(Error::config(
                        ConfigErrorKind::InvalidState,
                        format!("{name} cannot be blank"),
                    ));
                }
            }
        }
        Ok(())
    }
}
