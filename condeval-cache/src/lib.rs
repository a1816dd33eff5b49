//! # condeval-cache — bounded TTL cache for evaluation results
//!
//! A thread-safe key→value map backed by `DashMap`, with the semantics
//! the evaluation engine needs:
//!
//! - entries expire after a configurable TTL (per-entry override allowed)
//!   and are lazily evicted on access, plus periodically by a sweeper;
//! - a hard key cap with oldest-first overflow eviction and a warning at
//!   90% occupancy;
//! - structured, escaped keys ([`CacheKey`]) so invalidation can target a
//!   single node or a whole (campaign, branch) prefix;
//! - running hit/miss counters and byte-size estimates, surfaced by
//!   [`ResultCache::stats`].
//!
//! Values are cloned in and out and treated as immutable at the protocol
//! level. The cache never propagates errors to callers; degraded states
//! are logged.

mod key;

pub use key::{prefix, CacheKey};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// Per-value size estimate used for the `vsize` statistic.
pub trait Weigh {
    fn weight(&self) -> usize;
}

/// Cache tuning, clamped to the supported ranges on construction.
#[derive(Clone, Copy, Debug)]
pub struct CacheConfig {
    pub default_ttl: Duration,
    pub sweep_interval: Duration,
    pub max_keys: usize,
}

impl CacheConfig {
    pub const TTL_RANGE_SECONDS: (u64, u64) = (1, 86_400);
    pub const SWEEP_RANGE_SECONDS: (u64, u64) = (10, 3_600);
    pub const MAX_KEYS_RANGE: (usize, usize) = (100, 1_000_000);

    /// Build a config from raw seconds/counts, clamping each value into
    /// its supported range.
    pub fn new(ttl_seconds: u64, sweep_seconds: u64, max_keys: usize) -> Self {
        let (ttl_lo, ttl_hi) = Self::TTL_RANGE_SECONDS;
        let (sweep_lo, sweep_hi) = Self::SWEEP_RANGE_SECONDS;
        let (keys_lo, keys_hi) = Self::MAX_KEYS_RANGE;
        CacheConfig {
            default_ttl: Duration::from_secs(ttl_seconds.clamp(ttl_lo, ttl_hi)),
            sweep_interval: Duration::from_secs(sweep_seconds.clamp(sweep_lo, sweep_hi)),
            max_keys: max_keys.clamp(keys_lo, keys_hi),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig::new(300, 60, 10_000)
    }
}

/// A point-in-time statistics snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub keys: usize,
    pub ksize: usize,
    pub vsize: usize,
    pub hit_rate: f64,
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    expires_at: Instant,
}

struct Shared<V> {
    entries: DashMap<String, Entry<V>>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    high_water_warned: AtomicBool,
}

/// The process-wide evaluation result cache. Cheap to clone; clones share
/// the same storage.
pub struct ResultCache<V> {
    shared: Arc<Shared<V>>,
}

impl<V> Clone for ResultCache<V> {
    fn clone(&self) -> Self {
        ResultCache {
            shared: self.shared.clone(),
        }
    }
}

impl<V: Clone + Weigh> ResultCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        ResultCache {
            shared: Arc::new(Shared {
                entries: DashMap::new(),
                config,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                high_water_warned: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.shared.config
    }

    /// Insert or replace an entry. `ttl` overrides the configured default
    /// for this entry only. Capacity is enforced before insertion:
    /// expired entries are collected first, then the oldest-inserted.
    pub fn set(&self, key: &CacheKey, value: V, ttl: Option<Duration>) {
        let encoded = key.encode();
        if !self.shared.entries.contains_key(&encoded) {
            self.make_room_for_one();
        }
        let now = Instant::now();
        let ttl = ttl.unwrap_or(self.shared.config.default_ttl);
        self.shared.entries.insert(
            encoded,
            Entry {
                value,
                inserted_at: now,
                expires_at: now + ttl,
            },
        );
        self.warn_if_nearly_full();
    }

    /// Fetch a live entry, counting the access as a hit or a miss.
    /// An expired entry counts as a miss and is evicted on the spot.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let encoded = key.encode();
        if let Some(entry) = self.shared.entries.get(&encoded) {
            if entry.expires_at > Instant::now() {
                self.shared.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            // Expired — drop the read guard before removing.
            drop(entry);
            self.shared.entries.remove(&encoded);
        }
        self.shared.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Whether a live entry exists. Does not touch the hit/miss counters.
    pub fn has(&self, key: &CacheKey) -> bool {
        self.shared
            .entries
            .get(&key.encode())
            .is_some_and(|entry| entry.expires_at > Instant::now())
    }

    /// Remove a single entry; true when something was removed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.shared.entries.remove(&key.encode()).is_some()
    }

    /// Remove every entry under a campaign, optionally narrowed to one
    /// branch. Returns the number of entries removed.
    pub fn invalidate_by_prefix(&self, campaign_id: &str, branch_id: Option<&str>) -> usize {
        let prefix = key::prefix(campaign_id, branch_id);
        let before = self.shared.entries.len();
        self.shared.entries.retain(|k, _| !k.starts_with(&prefix));
        before.saturating_sub(self.shared.entries.len())
    }

    pub fn clear(&self) {
        self.shared.entries.clear();
        self.shared.high_water_warned.store(false, Ordering::Relaxed);
    }

    /// Every encoded key currently stored, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.shared
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Encoded keys under a campaign (and optionally branch) prefix.
    pub fn keys_by_prefix(&self, campaign_id: &str, branch_id: Option<&str>) -> Vec<String> {
        let prefix = key::prefix(campaign_id, branch_id);
        self.shared
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.shared.hits.load(Ordering::Relaxed);
        let misses = self.shared.misses.load(Ordering::Relaxed);
        let mut keys = 0;
        let mut ksize = 0;
        let mut vsize = 0;
        for entry in self.shared.entries.iter() {
            keys += 1;
            ksize += entry.key().len();
            vsize += entry.value().value.weight();
        }
        let accesses = hits + misses;
        CacheStats {
            hits,
            misses,
            keys,
            ksize,
            vsize,
            hit_rate: if accesses == 0 {
                0.0
            } else {
                hits as f64 / accesses as f64
            },
        }
    }

    /// Drop every expired entry. Runs on the sweeper but is safe to call
    /// directly.
    pub fn evict_expired(&self) {
        let now = Instant::now();
        self.shared.entries.retain(|_, entry| entry.expires_at > now);
        self.reset_high_water_mark();
    }

    /// Periodic expiry sweep; stops when the token is cancelled. Runs on
    /// its own task and never blocks handlers.
    pub fn spawn_sweeper(&self, token: CancellationToken) -> tokio::task::JoinHandle<()>
    where
        V: Send + Sync + 'static,
    {
        let cache = self.clone();
        let interval = self.shared.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => cache.evict_expired(),
                }
            }
        })
    }

    fn make_room_for_one(&self) {
        if self.shared.entries.len() < self.shared.config.max_keys {
            return;
        }
        self.evict_expired();
        let len = self.shared.entries.len();
        if len < self.shared.config.max_keys {
            return;
        }
        // Still full: shed the oldest-inserted entries. Linear, but only
        // ever runs at the cap.
        let shed = len + 1 - self.shared.config.max_keys;
        let mut oldest: Vec<(Instant, String)> = self
            .shared
            .entries
            .iter()
            .map(|entry| (entry.value().inserted_at, entry.key().clone()))
            .collect();
        // Tie-break equal timestamps by key so eviction is deterministic.
        oldest.sort();
        for (_, key) in oldest.into_iter().take(shed) {
            self.shared.entries.remove(&key);
        }
        tracing::warn!(
            evicted = shed,
            max_keys = self.shared.config.max_keys,
            "result cache at capacity, evicted oldest entries"
        );
    }

    fn warn_if_nearly_full(&self) {
        let len = self.shared.entries.len();
        let threshold = self.shared.config.max_keys * 9 / 10;
        if len >= threshold
            && !self.shared.high_water_warned.swap(true, Ordering::Relaxed)
        {
            tracing::warn!(
                keys = len,
                max_keys = self.shared.config.max_keys,
                "result cache above 90% of its key capacity"
            );
        }
    }

    fn reset_high_water_mark(&self) {
        let threshold = self.shared.config.max_keys * 9 / 10;
        if self.shared.entries.len() < threshold {
            self.shared.high_water_warned.store(false, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl Weigh for String {
        fn weight(&self) -> usize {
            self.len()
        }
    }

    fn key(node: &str) -> CacheKey {
        CacheKey::new("camp", "main", node)
    }

    fn cache_with_max(max_keys: usize) -> ResultCache<String> {
        ResultCache::new(CacheConfig {
            default_ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
            max_keys,
        })
    }

    #[test]
    fn set_get_has_invalidate() {
        let cache = cache_with_max(1000);
        let k = key("CONDITION:a");
        cache.set(&k, "value".to_string(), None);
        assert!(cache.has(&k));
        assert_eq!(cache.get(&k), Some("value".to_string()));
        assert!(cache.invalidate(&k));
        assert!(!cache.invalidate(&k));
        assert_eq!(cache.get(&k), None);
    }

    #[test]
    fn per_entry_ttl_overrides_default() {
        let cache = cache_with_max(1000);
        let k = key("CONDITION:short");
        cache.set(&k, "v".to_string(), Some(Duration::from_millis(20)));
        assert!(cache.has(&k));
        std::thread::sleep(Duration::from_millis(40));
        assert!(!cache.has(&k));
        assert_eq!(cache.get(&k), None);
    }

    #[test]
    fn prefix_invalidation_scopes_by_branch() {
        let cache = cache_with_max(1000);
        cache.set(&CacheKey::new("camp", "main", "CONDITION:a"), "1".into(), None);
        cache.set(&CacheKey::new("camp", "alt", "CONDITION:a"), "2".into(), None);
        cache.set(&CacheKey::new("other", "main", "CONDITION:a"), "3".into(), None);

        assert_eq!(cache.invalidate_by_prefix("camp", Some("main")), 1);
        assert!(cache.has(&CacheKey::new("camp", "alt", "CONDITION:a")));
        assert_eq!(cache.invalidate_by_prefix("camp", None), 1);
        assert!(cache.has(&CacheKey::new("other", "main", "CONDITION:a")));
    }

    #[test]
    fn stats_track_hits_misses_and_sizes() {
        let cache = cache_with_max(1000);
        assert_eq!(cache.stats().hit_rate, 0.0);

        let k = key("CONDITION:a");
        cache.set(&k, "seven77".to_string(), None);
        assert!(cache.get(&k).is_some());
        assert!(cache.get(&key("CONDITION:b")).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.keys, 1);
        assert_eq!(stats.ksize, k.encode().len());
        assert_eq!(stats.vsize, 7);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let cache = cache_with_max(100);
        for i in 0..100 {
            cache.set(&key(&format!("CONDITION:{i:03}")), i.to_string(), None);
        }
        assert_eq!(cache.stats().keys, 100);

        cache.set(&key("CONDITION:next"), "new".to_string(), None);
        assert_eq!(cache.stats().keys, 100);
        // The very first insert went first.
        assert!(!cache.has(&key("CONDITION:000")));
        assert!(cache.has(&key("CONDITION:next")));
    }

    #[test]
    fn overwriting_does_not_evict() {
        let cache = cache_with_max(100);
        for i in 0..100 {
            cache.set(&key(&format!("CONDITION:{i:03}")), i.to_string(), None);
        }
        cache.set(&key("CONDITION:050"), "updated".to_string(), None);
        assert_eq!(cache.stats().keys, 100);
        assert_eq!(cache.get(&key("CONDITION:050")), Some("updated".to_string()));
    }

    #[tokio::test]
    async fn sweeper_collects_expired_entries() {
        let cache = cache_with_max(1000);
        cache.set(&key("CONDITION:a"), "v".into(), Some(Duration::from_millis(10)));
        std::thread::sleep(Duration::from_millis(20));
        cache.evict_expired();
        assert_eq!(cache.stats().keys, 0);

        let token = CancellationToken::new();
        let handle = cache.spawn_sweeper(token.clone());
        token.cancel();
        handle.await.unwrap();
    }
}
