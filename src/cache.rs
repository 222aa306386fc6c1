//! Short-lived response store with lazy TTL eviction
//!
//! Entries are keyed by request fingerprint. Nothing runs on a timer: expired
//! entries are swept at the start of every request, and the read path checks
//! staleness again so an entry is never served past its TTL even if it has
//! not been swept yet.
//!
//! Timestamps use [`tokio::time::Instant`] so a paused test runtime can move
//! the clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::time::Instant;

/// Default time-to-live for cached responses
pub const DEFAULT_RESPONSE_TTL: Duration = Duration::from_secs(2);

/// Response store with a fixed TTL
pub struct ResponseCache {
    /// Cache entries keyed by fingerprint
    entries: DashMap<String, CachedResponse>,
    /// Time-to-live shared by every entry
    ttl: Duration,
    /// Cache statistics
    stats: CacheStats,
}

/// A cached payload and its creation instant
struct CachedResponse {
    value: Value,
    cached_at: Instant,
}

impl CachedResponse {
    /// Still servable at `now`
    fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        self.cached_at + ttl > now
    }

    /// Due for removal at `now`
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        self.cached_at + ttl < now
    }
}

/// Cache statistics tracked atomically
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Total cache hits (entries served from cache)
    pub hits: AtomicU64,
    /// Total cache misses (entries not found or stale)
    pub misses: AtomicU64,
    /// Total evictions (expired entries removed)
    pub evictions: AtomicU64,
}

impl CacheStats {
    /// Get current cache hit count
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get current cache miss count
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get current eviction count
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Calculate hit rate as a fraction (0.0-1.0)
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

impl ResponseCache {
    /// Create an empty store whose entries live for `ttl`
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            stats: CacheStats::default(),
        }
    }

    /// Remove every entry whose `cached_at + ttl < now`.
    ///
    /// Returns the number of entries removed.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.is_expired(self.ttl, now));
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            self.stats
                .evictions
                .fetch_add(removed as u64, Ordering::Relaxed);
            tracing::debug!(removed, remaining = self.entries.len(), "Swept expired responses");
        }
        removed
    }

    /// Get the payload stored under `key` if it is still fresh at `now`.
    ///
    /// A stale entry is reported as a miss but left for the next sweep.
    pub fn get(&self, key: &str, now: Instant) -> Option<Value> {
        match self.entries.get(key) {
            Some(entry) if entry.is_fresh(self.ttl, now) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            _ => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn set(&self, key: &str, value: Value, now: Instant) {
        self.entries.insert(
            key.to_string(),
            CachedResponse {
                value,
                cached_at: now,
            },
        );
    }

    /// Current number of entries, stale ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` when the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits(),
            misses: self.stats.misses(),
            evictions: self.stats.evictions(),
            size: self.entries.len(),
            hit_rate: self.stats.hit_rate(),
        }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_RESPONSE_TTL)
    }
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStatsSnapshot {
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses
    pub misses: u64,
    /// Total evictions
    pub evictions: u64,
    /// Current number of entries
    pub size: usize,
    /// Hit rate (0.0-1.0)
    pub hit_rate: f64,
}
