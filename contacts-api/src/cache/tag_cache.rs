//! TTL cache with tag-based invalidation.
//!
//! - DashMap gives lock-free reads from concurrent request handlers
//! - Each tag maps to the set of keys stored with it, so invalidation only
//!   visits affected entries
//! - A generation counter keeps a value computed before an invalidation from
//!   surviving it
//! - Expired entries are swept every [`SWEEP_EVERY`] inserts, so keys that are
//!   never read again do not pile up

use super::types::CacheTag;
use dashmap::DashMap;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Number of inserts between two sweeps of expired entries.
const SWEEP_EVERY: u64 = 256;

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    tags: Vec<CacheTag>,
}

pub struct TagCache<V> {
    /// Cached values keyed by caller-chosen key
    entries: DashMap<String, CacheEntry<V>>,

    /// Tag -> keys stored with that tag
    tag_index: DashMap<CacheTag, HashSet<String>>,

    /// Bumped on every invalidation
    generation: AtomicU64,

    inserts: AtomicU64,
}

impl<V> Default for TagCache<V> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            tag_index: DashMap::new(),
            generation: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
        }
    }
}

impl<V: Clone> TagCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh value for `key`, evicting it if it has expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let lookup = self
            .entries
            .get(key)
            .map(|entry| (entry.expires_at > now).then(|| entry.value.clone()));

        match lookup {
            Some(Some(value)) => Some(value),
            Some(None) => {
                if let Some((key, entry)) =
                    self.entries.remove_if(key, |_, entry| entry.expires_at <= now)
                {
                    self.unlink(&key, &entry.tags);
                }
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: &str, value: V, ttl: Duration, tags: &[CacheTag]) {
        let replaced = self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
                tags: tags.to_vec(),
            },
        );
        if let Some(previous) = replaced {
            let stale: Vec<CacheTag> = previous
                .tags
                .into_iter()
                .filter(|tag| !tags.contains(tag))
                .collect();
            self.unlink(key, &stale);
        }
        for tag in tags {
            self.tag_index
                .entry(*tag)
                .or_default()
                .insert(key.to_string());
        }

        if self.inserts.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.purge_expired();
        }
    }

    /// Return the cached value for `key` or compute, store and return it.
    ///
    /// Errors from `compute` are passed through and nothing is cached.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        tags: &[CacheTag],
        compute: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            log::trace!("cache hit: {}", key);
            return Ok(value);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let value = compute().await?;

        if !self.store_if_current(key, value.clone(), ttl, tags, generation) {
            log::trace!("cache invalidated while computing {}, not storing", key);
        }

        Ok(value)
    }

    /// Store `value` unless an invalidation happened since `generation` was
    /// read. The check runs after the entry is indexed, so an invalidation
    /// racing the insert either finds the key in the tag index or bumps the
    /// generation before the check.
    fn store_if_current(
        &self,
        key: &str,
        value: V,
        ttl: Duration,
        tags: &[CacheTag],
        generation: u64,
    ) -> bool {
        self.insert(key, value, ttl, tags);

        if self.generation.load(Ordering::SeqCst) == generation {
            return true;
        }
        if let Some((key, entry)) = self.entries.remove(key) {
            self.unlink(&key, &entry.tags);
        }
        false
    }

    /// Evict every entry stored with any of `tags`. Returns the number evicted.
    pub fn invalidate(&self, tags: &[CacheTag]) -> usize {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let mut evicted = 0;
        for tag in tags {
            if let Some((_, keys)) = self.tag_index.remove(tag) {
                for key in keys {
                    if let Some((key, entry)) = self.entries.remove(&key) {
                        self.unlink(&key, &entry.tags);
                        evicted += 1;
                    }
                }
            }
        }
        evicted
    }

    /// Drop every expired entry together with its tag-index links.
    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut expired: Vec<(String, Vec<CacheTag>)> = Vec::new();
        self.entries.retain(|key, entry| {
            if entry.expires_at > now {
                return true;
            }
            expired.push((key.clone(), std::mem::take(&mut entry.tags)));
            false
        });

        for (key, tags) in &expired {
            self.unlink(key, tags);
        }
        if !expired.is_empty() {
            log::trace!("swept {} expired cache entries", expired.len());
        }
        expired.len()
    }

    /// Remove `key` from the index sets of `tags`, dropping sets that empty out.
    fn unlink(&self, key: &str, tags: &[CacheTag]) {
        for tag in tags {
            self.tag_index.remove_if_mut(tag, |_, keys| {
                keys.remove(key);
                keys.is_empty()
            });
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn computes_once_until_invalidated() {
        let cache: TagCache<u32> = TagCache::new();
        let env = Uuid::new_v4();
        let tags = [CacheTag::Environment(env)];

        let first: Result<u32, ()> = cache.get_or_compute("k", TTL, &tags, || async { Ok(1) }).await;
        let second: Result<u32, ()> = cache.get_or_compute("k", TTL, &tags, || async { Ok(2) }).await;
        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(1));

        assert_eq!(cache.invalidate(&tags), 1);
        let third: Result<u32, ()> = cache.get_or_compute("k", TTL, &tags, || async { Ok(3) }).await;
        assert_eq!(third, Ok(3));
    }

    #[test]
    fn invalidation_only_touches_tagged_entries() {
        let cache: TagCache<&'static str> = TagCache::new();
        let contact_a = Uuid::new_v4();
        let contact_b = Uuid::new_v4();

        cache.insert("a", "alpha", TTL, &[CacheTag::Contact(contact_a)]);
        cache.insert("b", "beta", TTL, &[CacheTag::Contact(contact_b)]);

        assert_eq!(cache.invalidate(&[CacheTag::Contact(contact_a)]), 1);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some("beta"));
    }

    #[test]
    fn expired_entries_are_evicted_on_read() {
        let cache: TagCache<u8> = TagCache::new();
        cache.insert("stale", 7, Duration::ZERO, &[]);

        assert_eq!(cache.get("stale"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn unread_expired_entries_are_swept() {
        let cache: TagCache<u32> = TagCache::new();
        let keep = CacheTag::Environment(Uuid::new_v4());
        cache.insert("keep", 0, TTL, &[keep]);

        for i in 1..SWEEP_EVERY {
            let key = format!("contact:{i}");
            let tags = [CacheTag::Contact(Uuid::new_v4())];
            let value: Result<u32, ()> = cache
                .get_or_compute(&key, Duration::ZERO, &tags, || async { Ok(1) })
                .await;
            assert_eq!(value, Ok(1));
        }

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.tag_index.len(), 1);
        assert_eq!(cache.get("keep"), Some(0));
    }

    #[test]
    fn read_eviction_unlinks_tags() {
        let cache: TagCache<u8> = TagCache::new();
        cache.insert("stale", 7, Duration::ZERO, &[CacheTag::Contact(Uuid::new_v4())]);

        assert_eq!(cache.get("stale"), None);
        assert!(cache.tag_index.is_empty());
    }

    #[test]
    fn value_from_before_an_invalidation_is_not_kept() {
        let cache: TagCache<u8> = TagCache::new();
        let tag = CacheTag::Environment(Uuid::new_v4());
        let generation = cache.generation.load(Ordering::SeqCst);

        cache.invalidate(&[tag]);

        assert!(!cache.store_if_current("page", 1, TTL, &[tag], generation));
        assert_eq!(cache.get("page"), None);
        assert!(cache.tag_index.is_empty());

        let generation = cache.generation.load(Ordering::SeqCst);
        assert!(cache.store_if_current("page", 2, TTL, &[tag], generation));
        assert_eq!(cache.get("page"), Some(2));
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache: TagCache<u8> = TagCache::new();

        let failed: Result<u8, &str> = cache
            .get_or_compute("k", TTL, &[], || async { Err("boom") })
            .await;
        assert_eq!(failed, Err("boom"));
        assert!(cache.is_empty());
    }
}
