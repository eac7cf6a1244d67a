//! Time-boxed cache for rendered list fragments.
//!
//! Entries live in the key-value backend under `cache:` and expire after a
//! fixed TTL. Writes to posts never invalidate them; a new post shows up in a
//! cached page once the entry expires or is evicted.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CACHE_PREFIX;
use crate::core::db::KvStore;

pub const INDEX_FRAGMENT: &str = "index_page";

/// Identifies a cached fragment together with the request context it was
/// rendered for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentKey {
    pub fragment: String,
    pub page: Option<usize>,
    pub viewer: Option<String>,
}

impl FragmentKey {
    pub fn new(fragment: &str) -> Self {
        FragmentKey {
            fragment: fragment.to_string(),
            page: None,
            viewer: None,
        }
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    pub fn viewer(mut self, viewer: &str) -> Self {
        self.viewer = Some(viewer.to_string());
        self
    }

    fn storage_key(&self) -> String {
        format!(
            "{}{}:{}:{}",
            CACHE_PREFIX,
            self.fragment,
            self.page.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
            self.viewer.as_deref().unwrap_or("anon"),
        )
    }
}

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    stored_at: DateTime<Utc>,
    body: serde_json::Value,
}

pub struct PageCache<'a, S: KvStore> {
    store: &'a S,
    ttl: Duration,
}

impl<'a, S: KvStore> PageCache<'a, S> {
    pub fn new(store: &'a S, ttl: Duration) -> Self {
        PageCache { store, ttl }
    }

    /// The cached body, if present and younger than the TTL at `now`.
    pub fn get(&self, key: &FragmentKey, now: DateTime<Utc>) -> anyhow::Result<Option<serde_json::Value>> {
        let storage_key = key.storage_key();
        let entry = match self.store.get_json::<CacheEntry>(&storage_key) {
            Ok(entry) => entry,
            Err(err) => {
                // Unreadable entries are treated as misses and dropped.
                tracing::warn!(key = %storage_key, error = %err, "discarding corrupt cache entry");
                self.store.delete(&storage_key)?;
                None
            }
        };

        match entry {
            Some(entry) if now - entry.stored_at < self.ttl => {
                tracing::debug!(key = %storage_key, "cache hit");
                Ok(Some(entry.body))
            }
            Some(_) => {
                tracing::debug!(key = %storage_key, "cache entry expired");
                self.store.delete(&storage_key)?;
                Ok(None)
            }
            None => {
                tracing::debug!(key = %storage_key, "cache miss");
                Ok(None)
            }
        }
    }

    pub fn put(&self, key: &FragmentKey, body: &serde_json::Value, now: DateTime<Utc>) -> anyhow::Result<()> {
        let entry = CacheEntry {
            stored_at: now,
            body: body.clone(),
        };
        self.store.set_json(&key.storage_key(), &entry)
    }

    /// Returns the cached body or renders, stores and returns a fresh one.
    pub fn get_or_render<F>(&self, key: &FragmentKey, now: DateTime<Utc>, render: F) -> anyhow::Result<serde_json::Value>
    where
        F: FnOnce() -> anyhow::Result<serde_json::Value>,
    {
        if let Some(body) = self.get(key, now)? {
            return Ok(body);
        }
        let body = render()?;
        self.put(key, &body, now)?;
        Ok(body)
    }

    pub fn evict(&self, key: &FragmentKey) -> anyhow::Result<()> {
        self.store.delete(&key.storage_key())
    }

    /// Drops every cached fragment. Returns how many entries were removed.
    pub fn clear(&self) -> anyhow::Result<usize> {
        let keys = self.store.keys_with_prefix(CACHE_PREFIX)?;
        for key in &keys {
            self.store.delete(key)?;
        }
        tracing::info!(entries = keys.len(), "page cache cleared");
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::MemoryStore;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn entries_expire_after_ttl() {
        let store = MemoryStore::new();
        let cache = PageCache::new(&store, Duration::seconds(20));
        let key = FragmentKey::new(INDEX_FRAGMENT).page(1);

        cache.put(&key, &json!({"v": 1}), t0()).unwrap();
        assert_eq!(cache.get(&key, t0() + Duration::seconds(19)).unwrap(), Some(json!({"v": 1})));
        assert_eq!(cache.get(&key, t0() + Duration::seconds(20)).unwrap(), None);
        // Expired entries are removed on read.
        assert!(store.keys_with_prefix(CACHE_PREFIX).unwrap().is_empty());
    }

    #[test]
    fn get_or_render_serves_stale_until_evicted() {
        let store = MemoryStore::new();
        let cache = PageCache::new(&store, Duration::seconds(20));
        let key = FragmentKey::new(INDEX_FRAGMENT).page(1);

        let first = cache.get_or_render(&key, t0(), || Ok(json!(["old"]))).unwrap();
        let second = cache
            .get_or_render(&key, t0() + Duration::seconds(5), || Ok(json!(["old", "new"])))
            .unwrap();
        assert_eq!(first, second);

        cache.evict(&key).unwrap();
        let third = cache
            .get_or_render(&key, t0() + Duration::seconds(6), || Ok(json!(["old", "new"])))
            .unwrap();
        assert_eq!(third, json!(["old", "new"]));
    }

    #[test]
    fn keys_are_scoped_by_page_and_viewer() {
        let store = MemoryStore::new();
        let cache = PageCache::new(&store, Duration::seconds(20));
        let page1 = FragmentKey::new(INDEX_FRAGMENT).page(1);
        let page2 = FragmentKey::new(INDEX_FRAGMENT).page(2);
        let alice = FragmentKey::new(INDEX_FRAGMENT).page(1).viewer("alice");

        cache.put(&page1, &json!(1), t0()).unwrap();
        assert!(cache.get(&page2, t0()).unwrap().is_none());
        assert!(cache.get(&alice, t0()).unwrap().is_none());
    }

    #[test]
    fn clear_removes_only_cache_entries() {
        let store = MemoryStore::new();
        store.set("post:1", b"{}").unwrap();
        let cache = PageCache::new(&store, Duration::seconds(20));
        cache.put(&FragmentKey::new("a"), &json!(1), t0()).unwrap();
        cache.put(&FragmentKey::new("b").page(3), &json!(2), t0()).unwrap();

        assert_eq!(cache.clear().unwrap(), 2);
        assert!(store.get("post:1").unwrap().is_some());
    }
}
