//! Entity identity: key extraction with a generated fallback.

use std::{fmt, sync::Arc};

use serde_json::Value;

use crate::types::EntityKey;

type Extractor = dyn Fn(&Value) -> Option<EntityKey> + Send + Sync;
type Generator = dyn Fn(&Value) -> EntityKey + Send + Sync;

/// Extracts the identity key of an entity payload, or generates one when the
/// payload carries none (e.g. a not-yet-saved optimistic create).
#[derive(Clone)]
pub struct KeyStrategy {
    extractor: Arc<Extractor>,
    generator: Arc<Generator>,
}

impl Default for KeyStrategy {
    fn default() -> Self {
        Self::field("id")
    }
}

impl fmt::Debug for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStrategy").finish_non_exhaustive()
    }
}

impl KeyStrategy {
    /// Reads the key from a top-level field; generated keys are ULIDs.
    pub fn field(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            extractor: Arc::new(move |entity: &Value| {
                entity.get(name.as_str()).and_then(key_from_value)
            }),
            generator: Arc::new(|_: &Value| ulid::Ulid::new().to_string()),
        }
    }

    /// Replaces the extractor.
    pub fn with_extractor<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&Value) -> Option<EntityKey> + Send + Sync + 'static,
    {
        self.extractor = Arc::new(extractor);
        self
    }

    /// Replaces the generator. Generated keys must not collide with extracted
    /// ones.
    pub fn with_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&Value) -> EntityKey + Send + Sync + 'static,
    {
        self.generator = Arc::new(generator);
        self
    }

    /// Key carried by `entity`, if any.
    pub fn extract(&self, entity: &Value) -> Option<EntityKey> {
        (self.extractor)(entity)
    }

    /// Fresh key for an entity that carries none.
    pub fn generate(&self, entity: &Value) -> EntityKey {
        (self.generator)(entity)
    }

    /// `extract`, falling back to `generate`.
    pub fn key_for(&self, entity: &Value) -> EntityKey {
        self.extract(entity).unwrap_or_else(|| self.generate(entity))
    }
}

/// Strings are used verbatim, numbers in their decimal form. Anything else
/// has no key.
pub fn key_from_value(value: &Value) -> Option<EntityKey> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn default_reads_id_field() {
        let keys = KeyStrategy::default();
        assert_eq!(keys.extract(&json!({"id": 12})), Some("12".to_string()));
        assert_eq!(keys.extract(&json!({"id": "a-1"})), Some("a-1".to_string()));
        assert_eq!(keys.extract(&json!({"id": null})), None);
        assert_eq!(keys.extract(&json!({"name": "x"})), None);
    }

    #[test]
    fn generated_keys_are_unique_fallbacks() {
        let keys = KeyStrategy::default();
        let a = keys.key_for(&json!({"name": "x"}));
        let b = keys.key_for(&json!({"name": "x"}));
        assert_ne!(a, b);
        assert_eq!(keys.key_for(&json!({"id": 3})), "3");
    }

    #[test]
    fn custom_extractor_and_generator() {
        let keys = KeyStrategy::field("uuid")
            .with_extractor(|e| e.get("slug").and_then(Value::as_str).map(str::to_uppercase))
            .with_generator(|_| "tmp".to_string());
        assert_eq!(keys.key_for(&json!({"slug": "ab"})), "AB");
        assert_eq!(keys.key_for(&json!({})), "tmp");
    }
}
