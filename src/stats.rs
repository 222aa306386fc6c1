//! Dispatch statistics
//!
//! Counts logical requests, network calls and how many requests were served by
//! riding on someone else's call.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

use crate::cache::CacheStatsSnapshot;

/// Counters kept by the dispatcher
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Logical requests submitted
    requests: AtomicU64,
    /// Network calls performed
    transport_calls: AtomicU64,
    /// Requests that attached to an in-flight call instead of driving one
    coalesced: AtomicU64,
    /// Requests that set the force flag
    forced: AtomicU64,
    /// Fetch sequences that ended in an error
    failures: AtomicU64,
    /// Network calls per target address
    target_calls: DashMap<String, AtomicU64>,
}

impl DispatchStats {
    /// Record a submitted request
    pub fn record_request(&self, forced: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if forced {
            self.forced.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a request that rides on an in-flight call
    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a network call to `target`
    pub fn record_transport_call(&self, target: &str) {
        self.transport_calls.fetch_add(1, Ordering::Relaxed);
        self.target_calls
            .entry(target.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed fetch sequence
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Network calls performed so far
    pub fn transport_calls(&self) -> u64 {
        self.transport_calls.load(Ordering::Relaxed)
    }

    /// Network calls performed for `target`
    pub fn target_calls(&self, target: &str) -> u64 {
        self.target_calls
            .get(target)
            .map_or(0, |entry| entry.load(Ordering::Relaxed))
    }

    /// Network calls per target, ordered by target
    fn targets(&self) -> BTreeMap<String, u64> {
        self.target_calls
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }

    /// Snapshot combined with the cache's own statistics
    pub fn snapshot(&self, in_flight: usize, cache: CacheStatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            transport_calls: self.transport_calls(),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            forced: self.forced.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            in_flight,
            targets: self.targets(),
            cache,
        }
    }
}

/// Point-in-time view of the dispatcher
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    /// Logical requests submitted
    pub requests: u64,
    /// Network calls performed
    pub transport_calls: u64,
    /// Requests served by an in-flight call
    pub coalesced: u64,
    /// Requests that set the force flag
    pub forced: u64,
    /// Fetch sequences that ended in an error
    pub failures: u64,
    /// Fingerprints with pending waiters
    pub in_flight: usize,
    /// Network calls per target address
    pub targets: BTreeMap<String, u64>,
    /// Response cache statistics
    pub cache: CacheStatsSnapshot,
}
