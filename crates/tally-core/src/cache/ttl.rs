//! Generic bounded, expiring cache
//!
//! This is the primitive behind the idempotency and summary caches: a TTL
//! cache with least-recently-accessed eviction, sharded by key hash so
//! unrelated keys do not contend on one lock.

use lru::LruCache;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Configuration for a [`TtlCache`]
#[derive(Debug, Clone)]
pub struct TtlCacheConfig {
    /// Maximum entries across all shards
    pub max_entries: usize,
    /// Number of lock shards; 1 gives a single lock
    pub shards: usize,
    /// TTL applied when `set` is called without an explicit one
    pub default_ttl: Duration,
    /// Interval used by the background sweeper
    pub sweep_interval: Duration,
}

impl Default for TtlCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1024,
            shards: 8,
            default_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

impl TtlCacheConfig {
    /// Set the total entry capacity
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Set the shard count
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards.max(1);
        self
    }

    /// Set the default TTL
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the sweep interval
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

/// A cached value plus its expiry bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The cached value
    pub value: V,
    /// When the entry was inserted
    pub inserted_at: Instant,
    /// Time-to-live from insertion
    pub ttl: Duration,
    /// Last access time
    pub last_accessed: Instant,
    /// Number of hits served by this entry
    pub hit_count: u64,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            inserted_at: now,
            ttl,
            last_accessed: now,
            hit_count: 0,
        }
    }

    /// An entry is visible only while `now < inserted_at + ttl`
    pub fn is_valid(&self) -> bool {
        self.inserted_at.elapsed() < self.ttl
    }

    /// Age since insertion
    pub fn age(&self) -> Duration {
        self.inserted_at.elapsed()
    }

    fn touch(&mut self) {
        self.last_accessed = Instant::now();
        self.hit_count += 1;
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Cache hits
    pub hits: u64,
    /// Cache misses
    pub misses: u64,
    /// Insertions
    pub inserts: u64,
    /// Entries dropped because their TTL elapsed
    pub expirations: u64,
    /// Entries dropped to stay under capacity
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Format stats as a summary string
    pub fn summary(&self) -> String {
        format!(
            "hits: {}, misses: {}, hit rate: {:.1}%, evictions: {}",
            self.hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.evictions
        )
    }
}

/// Bounded, expiring cache with lazy TTL checks
///
/// Expiry is checked on access; [`TtlCache::purge_expired`] is the
/// opportunistic sweep and can be driven on an interval with
/// [`TtlCache::spawn_sweeper`]. When a shard is over capacity the
/// least-recently-accessed entry in that shard is evicted first.
pub struct TtlCache<K, V> {
    shards: Vec<Mutex<LruCache<K, CacheEntry<V>>>>,
    config: TtlCacheConfig,
    stats: Mutex<CacheStats>,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Create a new cache
    pub fn new(config: TtlCacheConfig) -> Self {
        let shard_count = config.shards.max(1);
        let per_shard = config.max_entries.div_ceil(shard_count).max(1);
        let capacity = NonZeroUsize::new(per_shard).unwrap_or(NonZeroUsize::MIN);

        let shards = (0..shard_count)
            .map(|_| Mutex::new(LruCache::new(capacity)))
            .collect();

        Self {
            shards,
            config,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Create with default config
    pub fn with_defaults() -> Self {
        Self::new(TtlCacheConfig::default())
    }

    fn shard_for(&self, key: &K) -> &Mutex<LruCache<K, CacheEntry<V>>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }

    /// Get a value, touching its recency
    pub fn get(&self, key: &K) -> Option<V> {
        let mut shard = self.shard_for(key).lock();

        let mut expired = false;
        let mut found = None;
        if let Some(entry) = shard.get_mut(key) {
            if entry.is_valid() {
                entry.touch();
                found = Some(entry.value.clone());
            } else {
                expired = true;
            }
        }
        if expired {
            shard.pop(key);
        }
        drop(shard);

        let mut stats = self.stats.lock();
        if let Some(value) = found {
            stats.hits += 1;
            return Some(value);
        }
        stats.misses += 1;
        if expired {
            stats.expirations += 1;
        }
        None
    }

    /// Insert a value with an explicit TTL
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let entry = CacheEntry::new(value, ttl);
        let mut shard = self.shard_for(&key).lock();
        let evicted = shard.push(key.clone(), entry);
        drop(shard);

        let mut stats = self.stats.lock();
        stats.inserts += 1;
        if let Some((old_key, _)) = evicted {
            if old_key != key {
                stats.evictions += 1;
            }
        }
    }

    /// Insert a value with the configured default TTL
    pub fn set_default(&self, key: K, value: V) {
        self.set(key, value, self.config.default_ttl);
    }

    /// Remove a single entry
    pub fn invalidate(&self, key: &K) -> bool {
        self.shard_for(key).lock().pop(key).is_some()
    }

    /// Remove all entries
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.lock().clear();
        }
    }

    /// Current entry count, including not-yet-swept expired entries
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut removed = 0;
        for shard in &self.shards {
            let mut shard = shard.lock();
            let expired: Vec<K> = shard
                .iter()
                .filter(|(_, entry)| !entry.is_valid())
                .map(|(key, _)| key.clone())
                .collect();
            for key in expired {
                shard.pop(&key);
                removed += 1;
            }
        }
        if removed > 0 {
            self.stats.lock().expirations += removed as u64;
        }
        removed
    }

    /// Snapshot of the cache statistics
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    /// Get the configuration
    pub fn config(&self) -> &TtlCacheConfig {
        &self.config
    }

    /// Spawn a background task sweeping expired entries on an interval
    ///
    /// The task exits when `cancel` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()>
    where
        K: Sync,
        V: Sync,
    {
        let cache = Arc::clone(self);
        let interval = cache.config.sweep_interval;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        let removed = cache.purge_expired();
                        if removed > 0 {
                            tracing::debug!(removed, "cache sweep removed expired entries");
                        }
                    }
                }
            }
        })
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::with_defaults()
    }
}
