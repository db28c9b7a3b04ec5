use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    pub max_size: usize,
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_size: 50,
            ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub asset_id: String,
    pub operation: String,
    pub params: String,
}

impl CacheKey {
    pub fn new(
        asset_id: impl Into<String>,
        operation: impl Into<String>,
        params: impl Into<String>,
    ) -> Self {
        Self {
            asset_id: asset_id.into(),
            operation: operation.into(),
            params: params.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    bytes: Vec<u8>,
    created_at: Instant,
}

/// Bounded store of processed results. Expired entries are dropped on read;
/// a full cache evicts the entry created first, regardless of access.
#[derive(Debug)]
pub struct ResultCache {
    settings: CacheSettings,
    entries: HashMap<CacheKey, CacheEntry>,
}

impl ResultCache {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            settings,
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<Vec<u8>> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&mut self, key: &CacheKey, now: Instant) -> Option<Vec<u8>> {
        let entry = self.entries.get(key)?;
        if now.saturating_duration_since(entry.created_at) < self.settings.ttl {
            return Some(entry.bytes.clone());
        }
        debug!(
            "Cache entry expired for {}:{}:{}",
            key.asset_id, key.operation, key.params
        );
        self.entries.remove(key);
        None
    }

    pub fn set(&mut self, key: CacheKey, bytes: Vec<u8>) {
        self.set_at(key, bytes, Instant::now());
    }

    pub fn set_at(&mut self, key: CacheKey, bytes: Vec<u8>, now: Instant) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.settings.max_size {
            self.evict_oldest();
        }
        self.entries.insert(
            key,
            CacheEntry {
                bytes,
                created_at: now,
            },
        );
    }

    #[cfg(test)]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.created_at)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            debug!("Evicting cache entry {}:{}", key.asset_id, key.operation);
            self.entries.remove(&key);
        }
    }
}
