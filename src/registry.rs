//! Many entity collections combined under one roof, addressed by name.

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    config::EntityConfig,
    core::collection::EntityCollection,
    runtime::handle::{EntityHandle, RuntimeConfig, RuntimeError, spawn_entity},
    tag::ActionTag,
    types::{OperationKind, Phase},
};

/// Rejected registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A collection with this name is already registered.
    #[error("collection `{0}` is already registered")]
    Duplicate(String),
}

/// Entity handles by collection name.
#[derive(Clone, Default)]
pub struct EntityRegistry {
    handles: BTreeMap<String, EntityHandle>,
}

impl EntityRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns one runtime per config. Must be called from within a tokio
    /// runtime.
    pub fn spawn_all(
        configs: impl IntoIterator<Item = EntityConfig>,
        runtime: RuntimeConfig,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for config in configs {
            if registry.handles.contains_key(config.name()) {
                return Err(RegistryError::Duplicate(config.name().to_string()));
            }
            registry.register(spawn_entity(config, None, runtime.clone()))?;
        }
        Ok(registry)
    }

    /// Adds a running handle; names must be unique.
    pub fn register(&mut self, handle: EntityHandle) -> Result<(), RegistryError> {
        if self.handles.contains_key(handle.name()) {
            return Err(RegistryError::Duplicate(handle.name().to_string()));
        }
        self.handles.insert(handle.name().to_string(), handle);
        Ok(())
    }

    /// Handle of collection `name`.
    pub fn get(&self, name: &str) -> Option<&EntityHandle> {
        self.handles.get(name)
    }

    /// Collection names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handles.keys().map(String::as_str)
    }

    /// Number of registered collections.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// True if no collection is registered.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Finds the collection a tag belongs to, with the tag's kind and phase.
    pub fn route(&self, tag: &str) -> Option<(&EntityHandle, OperationKind, Phase)> {
        let parsed = ActionTag::parse(tag)?;
        let handle = self.handles.get(parsed.collection)?;
        Some((handle, parsed.kind, parsed.phase))
    }

    /// Current view of every collection, by name.
    pub async fn snapshot(&self) -> Result<BTreeMap<String, Arc<EntityCollection>>, RuntimeError> {
        let mut out = BTreeMap::new();
        for (name, handle) in &self.handles {
            out.insert(name.clone(), handle.collection().await?);
        }
        Ok(out)
    }

    /// Clears every collection.
    pub async fn clear_all(&self) -> Result<(), RuntimeError> {
        for handle in self.handles.values() {
            handle.clear().await?;
        }
        Ok(())
    }

    /// Stops every runtime.
    pub async fn shutdown_all(&self) -> Result<(), RuntimeError> {
        for handle in self.handles.values() {
            handle.shutdown().await?;
        }
        Ok(())
    }
}
