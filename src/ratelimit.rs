//! Registry of per-visitor token buckets.
//!
//! Every `(contract, visitor)` pair gets its own bucket holding `quota` tokens
//! and refilling one token every `60 / quota` seconds. The map is guarded by a
//! single mutex for lookup-or-create; buckets are lock-free `governor` limiters
//! checked after the map lock is released.
//!
//! The map is bounded: once `capacity` keys exist the least recently used one
//! is evicted, which resets that visitor's bucket to full.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroU32;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::trace;

/// Default number of tracked keys.
pub const DEFAULT_REGISTRY_CAPACITY: usize = 100_000;

/// Contract id under which free-tier visitors are tracked.
pub const FREE_TIER_CONTRACT: u64 = 0;

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

struct Entry {
    quota: NonZeroU32,
    limiter: Arc<Limiter>,
}

/// Process-wide registry of rate limiters keyed by `"<contract_id>-<visitor>"`.
pub struct RateLimiterRegistry {
    limiters: Mutex<LruCache<String, Entry>>,
}

impl RateLimiterRegistry {
    /// Create an empty registry with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REGISTRY_CAPACITY)
    }

    /// Create an empty registry tracking at most `capacity` keys.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            limiters: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Take one token for `visitor` under `contract_id`.
    ///
    /// Returns `true` if the call is rate limited and must be rejected. A
    /// zero quota always limits.
    pub fn is_rate_limited(&self, contract_id: u64, visitor: &str, quota_per_minute: u32) -> bool {
        let Some(quota) = NonZeroU32::new(quota_per_minute) else {
            return true;
        };
        let key = format!("{contract_id}-{visitor}");
        let limiter = self.limiter_for(key, quota);
        limiter.check().is_err()
    }

    fn limiter_for(&self, key: String, quota: NonZeroU32) -> Arc<Limiter> {
        let mut limiters = self.limiters.lock();
        if let Some(entry) = limiters.get(&key) {
            if entry.quota == quota {
                return Arc::clone(&entry.limiter);
            }
        }

        trace!("Creating limiter {} ({} per minute)", key, quota);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_minute(quota)));
        limiters.put(
            key,
            Entry {
                quota,
                limiter: Arc::clone(&limiter),
            },
        );
        limiter
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.limiters.lock().len()
    }

    /// Check if no keys are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.limiters.lock().is_empty()
    }
}

impl Default for RateLimiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
