//! Explicit cache registry, constructed once at startup.
//!
//! Replaces ambient name-keyed singleton maps: the registry is built during
//! bootstrap and passed by reference to every consumer, so cache lookup never
//! goes through global state.

use crate::content_cache::ContentCache;
use crate::error::{CacheError, CacheResult};
use crate::policy::SweepTarget;
use darkroom_content::ContentStore;
use darkroom_core::AppConfig;
use darkroom_index::ContentIndex;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of caches known to the process.
#[derive(Default)]
pub struct CacheRegistry {
    content: HashMap<String, Arc<ContentCache>>,
    generic: HashMap<String, Arc<dyn SweepTarget>>,
}

impl CacheRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry with one content cache per configured entry.
    pub async fn from_config(
        config: &AppConfig,
        content: &ContentStore,
        index: &Arc<dyn ContentIndex>,
    ) -> CacheResult<Self> {
        let mut registry = Self::new();
        for cache_config in &config.caches {
            let cache = ContentCache::new(
                &cache_config.name,
                content.clone(),
                index.clone(),
                cache_config.policy.clone(),
            )
            .await?;
            registry.register_content(Arc::new(cache))?;
        }
        Ok(registry)
    }

    /// Register a content cache.
    pub fn register_content(&mut self, cache: Arc<ContentCache>) -> CacheResult<()> {
        let name = cache.name().to_string();
        if self.content.contains_key(&name) || self.generic.contains_key(&name) {
            return Err(CacheError::InvalidArgument(format!(
                "cache {name} already registered"
            )));
        }
        self.content.insert(name, cache);
        Ok(())
    }

    /// Register a generic cache (or any other sweep target).
    pub fn register(&mut self, target: Arc<dyn SweepTarget>) -> CacheResult<()> {
        let name = target.name().to_string();
        if self.content.contains_key(&name) || self.generic.contains_key(&name) {
            return Err(CacheError::InvalidArgument(format!(
                "cache {name} already registered"
            )));
        }
        self.generic.insert(name, target);
        Ok(())
    }

    /// Look up a content cache by name.
    pub fn content_cache(&self, name: &str) -> Option<Arc<ContentCache>> {
        self.content.get(name).cloned()
    }

    /// All registered caches as sweep targets.
    pub fn sweep_targets(&self) -> Vec<Arc<dyn SweepTarget>> {
        let mut targets: Vec<Arc<dyn SweepTarget>> = Vec::new();
        for cache in self.content.values() {
            targets.push(cache.clone() as Arc<dyn SweepTarget>);
        }
        for target in self.generic.values() {
            targets.push(target.clone());
        }
        targets
    }

    /// Names of all registered caches.
    pub fn names(&self) -> Vec<String> {
        self.content
            .keys()
            .chain(self.generic.keys())
            .cloned()
            .collect()
    }
}
