//! Per-collection configuration.
//!
//! A collection is configured in code through [`EntityConfig::builder`], and
//! can take its declarative part from a serde-loaded [`EntitySettings`] block.

use std::{fmt, num::NonZeroUsize, sync::Arc};

use hashbrown::HashMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::{
    clock::{Clock, SystemClock},
    key::KeyStrategy,
    op::OperationConfig,
    runtime::executor::Executor,
    types::{OperationKind, TimestampMs},
};

const DEFAULT_CACHE_REQUESTS_COUNT: usize = 3;

/// Rejected entity configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Name is empty or contains `/`.
    #[error("collection name must be non-empty and must not contain '/', got {0:?}")]
    InvalidName(String),
    /// No executor was supplied for the named collection.
    #[error("collection `{0}` has no executor configured")]
    MissingExecutor(String),
    /// History must keep at least one request per kind.
    #[error("cacheRequestsCount must be a positive integer")]
    ZeroRequestsCount,
}

/// How long a successful request keeps equal requests from being launched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CacheValidity {
    /// Successes are stale immediately; equal requests always run.
    #[default]
    Never,
    /// One window, in milliseconds, for every kind.
    Uniform(u64),
    /// A window per kind; kinds without an entry are never cached.
    PerKind(HashMap<OperationKind, u64>),
}

impl CacheValidity {
    /// Validity window of `kind` in milliseconds, if results of that kind are cached.
    pub fn window_for(&self, kind: OperationKind) -> Option<u64> {
        match self {
            Self::Never => None,
            Self::Uniform(ms) => Some(*ms),
            Self::PerKind(map) => map.get(&kind).copied(),
        }
    }

    /// True if a success finished at `finished_at` is still fresh at `now`.
    pub fn is_fresh(&self, kind: OperationKind, finished_at: TimestampMs, now: TimestampMs) -> bool {
        self.window_for(kind)
            .is_some_and(|window| now.saturating_sub(finished_at) < window)
    }

    /// Reads `null`, a number of milliseconds, or an object of per-kind
    /// numbers. Values that are not usable durations disable caching for
    /// their scope.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(map) => {
                let mut windows = HashMap::new();
                for (name, window) in map {
                    let Ok(kind) = name.parse::<OperationKind>() else {
                        warn!(entry = %name, "ignoring cacheValidityTime entry for unknown kind");
                        continue;
                    };
                    if let Some(ms) = duration_ms(window) {
                        windows.insert(kind, ms);
                    }
                }
                Self::PerKind(windows)
            }
            other => duration_ms(other).map_or(Self::Never, Self::Uniform),
        }
    }
}

fn duration_ms(value: &Value) -> Option<u64> {
    let Value::Number(n) = value else {
        return None;
    };
    n.as_u64().or_else(|| {
        n.as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f as u64)
    })
}

/// Declarative settings, typically deserialized from JSON.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EntitySettings {
    /// Requests kept per kind.
    pub cache_requests_count: usize,
    /// Null, a number of milliseconds, or an object keyed by kind name.
    pub cache_validity_time: Value,
    /// Entities visible before any request.
    pub reducer_default: Vec<Value>,
    /// Top-level field holding the entity key; `id` when unset.
    pub key_field: Option<String>,
    /// Default for every operation's `optimistic` flag.
    pub optimistic: bool,
    /// Default for every operation's `force` flag.
    pub force: bool,
}

impl Default for EntitySettings {
    fn default() -> Self {
        Self {
            cache_requests_count: DEFAULT_CACHE_REQUESTS_COUNT,
            cache_validity_time: Value::Null,
            reducer_default: Vec::new(),
            key_field: None,
            optimistic: false,
            force: false,
        }
    }
}

/// Validated configuration of one entity collection.
#[derive(Clone)]
pub struct EntityConfig {
    name: Arc<str>,
    keys: KeyStrategy,
    cache_requests_count: NonZeroUsize,
    cache_validity: CacheValidity,
    reducer_default: Vec<Value>,
    action_defaults: OperationConfig,
    executor: Arc<dyn Executor>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for EntityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityConfig")
            .field("name", &self.name)
            .field("cache_requests_count", &self.cache_requests_count)
            .field("cache_validity", &self.cache_validity)
            .field("reducer_default", &self.reducer_default)
            .field("action_defaults", &self.action_defaults)
            .finish_non_exhaustive()
    }
}

impl EntityConfig {
    /// Starts a builder for the collection `name`.
    pub fn builder(name: impl Into<String>) -> EntityConfigBuilder {
        EntityConfigBuilder {
            name: name.into(),
            keys: KeyStrategy::default(),
            cache_requests_count: DEFAULT_CACHE_REQUESTS_COUNT,
            cache_validity: CacheValidity::Never,
            reducer_default: Vec::new(),
            action_defaults: OperationConfig::default(),
            executor: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// Key strategy.
    pub fn keys(&self) -> &KeyStrategy {
        &self.keys
    }

    /// Requests kept per kind.
    pub fn cache_requests_count(&self) -> NonZeroUsize {
        self.cache_requests_count
    }

    /// Result caching windows.
    pub fn cache_validity(&self) -> &CacheValidity {
        &self.cache_validity
    }

    /// Seed entities.
    pub fn reducer_default(&self) -> &[Value] {
        &self.reducer_default
    }

    /// Config every input is merged over.
    pub fn action_defaults(&self) -> &OperationConfig {
        &self.action_defaults
    }

    /// Executor doing the actual work.
    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// Timestamp source.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

/// Builder for [`EntityConfig`]; validation happens in [`build`](Self::build).
pub struct EntityConfigBuilder {
    name: String,
    keys: KeyStrategy,
    cache_requests_count: usize,
    cache_validity: CacheValidity,
    reducer_default: Vec<Value>,
    action_defaults: OperationConfig,
    executor: Option<Arc<dyn Executor>>,
    clock: Arc<dyn Clock>,
}

impl EntityConfigBuilder {
    /// Sets the executor. Required.
    pub fn executor(mut self, executor: impl Executor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Sets an executor shared with other collections.
    pub fn shared_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Defaults to the `id` field.
    pub fn key_strategy(mut self, keys: KeyStrategy) -> Self {
        self.keys = keys;
        self
    }

    /// Requests kept per kind; defaults to 3.
    pub fn cache_requests_count(mut self, count: usize) -> Self {
        self.cache_requests_count = count;
        self
    }

    /// Defaults to [`CacheValidity::Never`].
    pub fn cache_validity(mut self, validity: CacheValidity) -> Self {
        self.cache_validity = validity;
        self
    }

    /// Entities visible before any request.
    pub fn reducer_default(mut self, items: Vec<Value>) -> Self {
        self.reducer_default = items;
        self
    }

    /// Config every input is merged over.
    pub fn action_defaults(mut self, defaults: OperationConfig) -> Self {
        self.action_defaults = defaults;
        self
    }

    /// Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Applies a declarative settings block over the current values.
    pub fn settings(mut self, settings: EntitySettings) -> Self {
        self.cache_requests_count = settings.cache_requests_count;
        self.cache_validity = CacheValidity::from_json(&settings.cache_validity_time);
        self.reducer_default = settings.reducer_default;
        if let Some(field) = settings.key_field {
            self.keys = KeyStrategy::field(field);
        }
        self.action_defaults.optimistic = settings.optimistic;
        self.action_defaults.force = settings.force;
        self
    }

    /// Validates and freezes the configuration.
    pub fn build(self) -> Result<EntityConfig, ConfigError> {
        if self.name.is_empty() || self.name.contains('/') {
            return Err(ConfigError::InvalidName(self.name));
        }
        let executor = self
            .executor
            .ok_or_else(|| ConfigError::MissingExecutor(self.name.clone()))?;
        let cache_requests_count =
            NonZeroUsize::new(self.cache_requests_count).ok_or(ConfigError::ZeroRequestsCount)?;

        Ok(EntityConfig {
            name: self.name.into(),
            keys: self.keys,
            cache_requests_count,
            cache_validity: self.cache_validity,
            reducer_default: self.reducer_default,
            action_defaults: self.action_defaults,
            executor,
            clock: self.clock,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::runtime::executor::NoopExecutor;

    #[test]
    fn build_rejects_bad_names_and_missing_executor() {
        let err = EntityConfig::builder("").executor(NoopExecutor).build().unwrap_err();
        assert_eq!(err, ConfigError::InvalidName(String::new()));

        let err = EntityConfig::builder("a/b").executor(NoopExecutor).build().unwrap_err();
        assert_eq!(err, ConfigError::InvalidName("a/b".to_string()));

        let err = EntityConfig::builder("users").build().unwrap_err();
        assert_eq!(err, ConfigError::MissingExecutor("users".to_string()));

        let err = EntityConfig::builder("users")
            .executor(NoopExecutor)
            .cache_requests_count(0)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroRequestsCount);
    }

    #[test]
    fn validity_parses_numbers_objects_and_garbage() {
        assert_eq!(CacheValidity::from_json(&Value::Null), CacheValidity::Never);
        assert_eq!(CacheValidity::from_json(&json!(1000)), CacheValidity::Uniform(1000));
        assert_eq!(CacheValidity::from_json(&json!(250.7)), CacheValidity::Uniform(250));
        assert_eq!(CacheValidity::from_json(&json!(-5)), CacheValidity::Never);
        assert_eq!(CacheValidity::from_json(&json!("1000")), CacheValidity::Never);

        let per_kind = CacheValidity::from_json(&json!({
            "READ_MANY": 5000,
            "READ_ONE": "soon",
            "BOGUS": 1,
        }));
        assert_eq!(per_kind.window_for(OperationKind::ReadMany), Some(5000));
        assert_eq!(per_kind.window_for(OperationKind::ReadOne), None);
        assert_eq!(per_kind.window_for(OperationKind::CreateOne), None);
    }

    #[test]
    fn freshness_is_strictly_inside_window() {
        let validity = CacheValidity::Uniform(1000);
        assert!(validity.is_fresh(OperationKind::ReadOne, 1000, 1500));
        assert!(!validity.is_fresh(OperationKind::ReadOne, 1000, 2000));
        assert!(!CacheValidity::Never.is_fresh(OperationKind::ReadOne, 1000, 1000));
    }

    #[test]
    fn settings_deserialize_and_apply() {
        let settings: EntitySettings = serde_json::from_value(json!({
            "cacheRequestsCount": 5,
            "cacheValidityTime": {"READ_MANY": 60000},
            "reducerDefault": [{"uuid": "u1"}],
            "keyField": "uuid",
            "optimistic": true,
        }))
        .unwrap();
        assert!(!settings.force);

        let cfg = EntityConfig::builder("users")
            .executor(NoopExecutor)
            .settings(settings)
            .build()
            .unwrap();
        assert_eq!(cfg.cache_requests_count().get(), 5);
        assert_eq!(cfg.cache_validity().window_for(OperationKind::ReadMany), Some(60000));
        assert_eq!(cfg.keys().extract(&json!({"uuid": "u1"})), Some("u1".to_string()));
        assert!(cfg.action_defaults().optimistic);
        assert_eq!(cfg.reducer_default().len(), 1);
    }
}
