use hashbrown::HashMap;
use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::Value;

use crate::types::EntityKey;

/// Ordered key → entity map. Keys keep the position of their first insertion;
/// replacing or merging an existing entity does not move it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityCollection {
    entries: Vec<(EntityKey, Value)>,
    pos: HashMap<EntityKey, usize>,
}

impl EntityCollection {
    /// Empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no entities.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.pos.contains_key(key)
    }

    /// Entity stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.pos.get(key).map(|idx| &self.entries[*idx].1)
    }

    /// Mutable entity stored under `key`.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        let idx = *self.pos.get(key)?;
        Some(&mut self.entries[idx].1)
    }

    /// Inserts at the end, or replaces in place when `key` is present.
    pub fn upsert(&mut self, key: EntityKey, value: Value) {
        if let Some(idx) = self.pos.get(&key) {
            self.entries[*idx].1 = value;
            return;
        }
        self.pos.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
    }

    /// Removes `key`; absent keys are a no-op.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.pos.remove(key)?;
        let (_, value) = self.entries.remove(idx);
        for (k, _) in &self.entries[idx..] {
            if let Some(p) = self.pos.get_mut(k) {
                *p -= 1;
            }
        }
        Some(value)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Entities in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// Key and entity pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Serialize for EntityCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl FromIterator<(EntityKey, Value)> for EntityCollection {
    fn from_iter<I: IntoIterator<Item = (EntityKey, Value)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (k, v) in iter {
            out.upsert(k, v);
        }
        out
    }
}
