use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::store::{Cache, CacheSettings};
use crate::config::CacheConfig;

/// Hands out named caches, creating them on first use with the default
/// settings.
#[derive(Debug, Default)]
pub struct CacheManager {
    defaults: CacheSettings,
    caches: RwLock<HashMap<String, Arc<Cache>>>,
}

impl CacheManager {
    pub fn new(defaults: CacheSettings) -> Self {
        Self { defaults, caches: RwLock::default() }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.settings())
    }

    /// Registers a cache with its own settings. Replaces an existing cache of
    /// the same name.
    pub fn with_cache(self, name: &str, settings: CacheSettings) -> Self {
        self.caches.write().insert(name.to_owned(), Arc::new(Cache::new(name, settings)));
        self
    }

    pub fn cache(&self, name: &str) -> Arc<Cache> {
        if let Some(cache) = self.caches.read().get(name) {
            return Arc::clone(cache);
        }
        let mut caches = self.caches.write();
        let cache = caches.entry(name.to_owned()).or_insert_with(|| {
            debug!(cache = name, "created");
            Arc::new(Cache::new(name, self.defaults))
        });
        Arc::clone(cache)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Cache>> {
        self.caches.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.caches.read().keys().cloned().collect();
        names.sort();
        names
    }
}
