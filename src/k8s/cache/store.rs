use super::object::{ObjectKey, ResourceObject};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// In-memory keyed mirror of the remote collection
///
/// Writes are last-writer-wins in arrival order; resourceVersions are never
/// compared here. Only the reflector mutates the store, readers take
/// point-in-time copies.
#[derive(Debug, Default)]
pub struct Store {
    items: RwLock<BTreeMap<ObjectKey, ResourceObject>>,
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // The map holds plain values, so a panic mid-operation cannot leave it half-written
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<ObjectKey, ResourceObject>> {
        self.items.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<ObjectKey, ResourceObject>> {
        self.items.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `object` under its key, returning the entry it replaced
    pub fn put(&self, object: ResourceObject) -> Option<ResourceObject> {
        let key = object.key();
        debug!("💾 Store PUT: {} (rv {})", key, object.resource_version);
        self.write().insert(key, object)
    }

    /// Remove `key`, returning the removed entry if there was one
    pub fn delete(&self, key: &ObjectKey) -> Option<ResourceObject> {
        let removed = self.write().remove(key);
        if removed.is_some() {
            debug!("🗑️  Store DELETE: {}", key);
        } else {
            debug!("❌ Store DELETE of absent key: {}", key);
        }
        removed
    }

    #[must_use]
    pub fn get(&self, key: &ObjectKey) -> Option<ResourceObject> {
        self.read().get(key).cloned()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<ObjectKey> {
        self.read().keys().cloned().collect()
    }

    /// Point-in-time copy of every object, ordered by key
    #[must_use]
    pub fn snapshot(&self) -> Vec<ResourceObject> {
        self.read().values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn clear(&self) {
        self.write().clear();
    }
}
