//! TTL cache for testing-service responses.
//!
//! Passed explicitly to every testing service through the registry; there is
//! no process-wide cache.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::config::Timeouts;
use crate::models::TestBuild;
use crate::services::testing_service::ProjectMetadata;

struct CachedEntry<V> {
    value: V,
    fetched_at: Instant,
}

/// Map of values that expire `ttl` after insertion.
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, CachedEntry<V>>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Fresh value for `key`, if any. An expired entry is removed.
    pub async fn get(&self, key: &K) -> Option<V> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(e) if e.fetched_at.elapsed() < self.ttl => return Some(e.value.clone()),
                Some(_) => {}
            }
        }
        let mut entries = self.entries.write().await;
        if entries
            .get(key)
            .is_some_and(|e| e.fetched_at.elapsed() >= self.ttl)
        {
            entries.remove(key);
        }
        None
    }

    pub async fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            CachedEntry {
                value,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Drop every entry whose key matches `predicate`.
    pub async fn remove_where(&self, predicate: impl Fn(&K) -> bool) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|k, _| !predicate(k));
        before - entries.len()
    }

    /// Drop expired entries.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.fetched_at.elapsed() < self.ttl);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Cache of project metadata and finished builds.
pub struct BuildCache {
    metadata: TtlCache<(Uuid, bool), ProjectMetadata>,
    builds: TtlCache<(Uuid, i64), TestBuild>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Hit/miss counters of a [`BuildCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl BuildCache {
    /// Project metadata lives for the default cache timeout, builds for the build timeout.
    pub fn new(timeouts: &Timeouts) -> Self {
        Self {
            metadata: TtlCache::new(timeouts.cache_default),
            builds: TtlCache::new(timeouts.build),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn record(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn get_metadata(&self, instance: Uuid, fetch_all: bool) -> Option<ProjectMetadata> {
        let cached = self.metadata.get(&(instance, fetch_all)).await;
        self.record(cached.is_some());
        cached
    }

    pub async fn put_metadata(&self, instance: Uuid, fetch_all: bool, metadata: ProjectMetadata) {
        self.metadata.insert((instance, fetch_all), metadata).await;
    }

    pub async fn get_build(&self, instance: Uuid, build_number: i64) -> Option<TestBuild> {
        let cached = self.builds.get(&(instance, build_number)).await;
        self.record(cached.is_some());
        cached
    }

    /// Cache a build. Running builds are never cached.
    pub async fn put_build(&self, build: &TestBuild) -> bool {
        if build.is_running() {
            debug!(build = %build, "Running build not cached");
            return false;
        }
        self.builds
            .insert((build.test_instance_id, build.build_number), build.clone())
            .await;
        true
    }

    /// Forget the project metadata of an instance so the next poll reads the backend.
    pub async fn invalidate_instance(&self, instance: Uuid) {
        let removed = self.metadata.remove_where(|(id, _)| *id == instance).await;
        debug!(instance = %instance, removed, "Project metadata invalidated");
    }

    /// Drop expired entries of both maps.
    pub async fn purge_expired(&self) -> usize {
        self.metadata.purge_expired().await + self.builds.purge_expired().await
    }

    /// Number of cached builds, expired or not.
    pub async fn build_count(&self) -> usize {
        self.builds.len().await
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
