//! SQL plan caching for relationship merges.
//!
//! A merge configuration always produces the same SQL text, so the text is
//! built once and stored under the configuration's fingerprint. The stored
//! plan carries a named list parameter (`:keys`) that is expanded into
//! dialect placeholders for each chunk of key values.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use sqlmapper_core::{Dialect, Value};

/// Default number of plans kept before eviction starts.
pub const DEFAULT_PLAN_CACHE_CAPACITY: usize = 1000;

/// SQL text with one named list parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlPlan {
    /// SQL text containing `:<param>` exactly where the value list goes.
    pub sql: String,
    /// Name of the list parameter, without the leading colon.
    pub param: String,
}

impl SqlPlan {
    pub fn new(sql: impl Into<String>, param: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            param: param.into(),
        }
    }

    /// Substitute the list parameter with one placeholder per value.
    ///
    /// Returns the executable SQL and the positional parameters.
    ///
    /// # Example
    ///
    /// ```
    /// use sqlmapper_core::{Dialect, Value};
    /// use sqlmapper_query::SqlPlan;
    ///
    /// let plan = SqlPlan::new("SELECT id FROM customer WHERE customer.id IN (:keys)", "keys");
    /// let (sql, params) = plan.expand(Dialect::Postgres, &[Value::BigInt(3), Value::BigInt(7)]);
    /// assert_eq!(sql, "SELECT id FROM customer WHERE customer.id IN ($1, $2)");
    /// assert_eq!(params.len(), 2);
    /// ```
    pub fn expand(&self, dialect: Dialect, values: &[Value]) -> (String, Vec<Value>) {
        let placeholders = (1..=values.len())
            .map(|i| dialect.placeholder(i))
            .collect::<Vec<_>>()
            .join(", ");
        let named = format!(":{}", self.param);
        (self.sql.replacen(&named, &placeholders, 1), values.to_vec())
    }
}

/// Bounded cache of SQL plans keyed by fingerprint.
///
/// When full, inserting a new fingerprint evicts whichever entry the map
/// iterator yields first. Plans are cheap to rebuild, so no recency is
/// tracked.
#[derive(Debug)]
pub struct PlanCache {
    plans: RwLock<HashMap<String, Arc<SqlPlan>>>,
    capacity: usize,
}

impl PlanCache {
    /// Create a cache holding at most `capacity` plans.
    pub fn new(capacity: usize) -> Self {
        Self {
            plans: RwLock::new(HashMap::with_capacity(capacity.min(256))),
            capacity,
        }
    }

    pub fn get(&self, fingerprint: &str) -> Option<Arc<SqlPlan>> {
        let plans = self.plans.read().unwrap_or_else(|e| e.into_inner());
        plans.get(fingerprint).cloned()
    }

    /// Store a plan, evicting an arbitrary entry if the cache is full.
    pub fn insert(&self, fingerprint: impl Into<String>, plan: Arc<SqlPlan>) {
        let fingerprint = fingerprint.into();
        let mut plans = self.plans.write().unwrap_or_else(|e| e.into_inner());
        if self.capacity == 0 {
            return;
        }
        if !plans.contains_key(&fingerprint) && plans.len() >= self.capacity {
            let victim = plans.keys().next().cloned();
            if let Some(victim) = victim {
                tracing::trace!(fingerprint = %victim, "Evicting cached SQL plan");
                plans.remove(&victim);
            }
        }
        plans.insert(fingerprint, plan);
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        let plans = self.plans.read().unwrap_or_else(|e| e.into_inner());
        plans.contains_key(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.plans.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.plans
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::new(DEFAULT_PLAN_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(n: usize) -> Arc<SqlPlan> {
        Arc::new(SqlPlan::new(format!("SELECT {n} WHERE x IN (:keys)"), "keys"))
    }

    #[test]
    fn test_expand_per_dialect() {
        let p = plan(1);
        let keys = [Value::Int(1), Value::Int(2), Value::Int(3)];
        assert_eq!(
            p.expand(Dialect::Sqlite, &keys).0,
            "SELECT 1 WHERE x IN (?1, ?2, ?3)"
        );
        assert_eq!(p.expand(Dialect::Mysql, &keys).0, "SELECT 1 WHERE x IN (?, ?, ?)");
        let (sql, params) = p.expand(Dialect::Postgres, &keys[..1]);
        assert_eq!(sql, "SELECT 1 WHERE x IN ($1)");
        assert_eq!(params, vec![Value::Int(1)]);
    }

    #[test]
    fn test_cache_hit() {
        let cache = PlanCache::new(10);
        assert!(cache.get("a").is_none());
        cache.insert("a", plan(1));
        assert_eq!(cache.get("a").unwrap().sql, "SELECT 1 WHERE x IN (:keys)");
        assert!(cache.contains("a"));
    }

    #[test]
    fn test_eviction_keeps_bound() {
        let cache = PlanCache::new(2);
        cache.insert("a", plan(1));
        cache.insert("b", plan(2));
        cache.insert("c", plan(3));

        assert_eq!(cache.len(), 2);
        assert!(cache.contains("c"));
        assert_eq!(
            ["a", "b"].iter().filter(|k| cache.contains(k)).count(),
            1
        );
    }

    #[test]
    fn test_replacing_existing_key_does_not_evict() {
        let cache = PlanCache::new(2);
        cache.insert("a", plan(1));
        cache.insert("b", plan(2));
        cache.insert("a", plan(3));
        assert_eq!(cache.len(), 2);
        assert!(cache.contains("b"));
        assert_eq!(cache.get("a").unwrap().sql, "SELECT 3 WHERE x IN (:keys)");
    }

    #[test]
    fn test_clear() {
        let cache = PlanCache::default();
        assert_eq!(cache.capacity(), DEFAULT_PLAN_CACHE_CAPACITY);
        cache.insert("a", plan(1));
        cache.clear();
        assert!(cache.is_empty());
    }
}
