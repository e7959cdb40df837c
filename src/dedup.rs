//! # Deduplicator
//!
//! Best-effort suppression of repeat sends for an identical
//! `(tenant, rule, object, event type)` within a short TTL. The map is
//! in-memory only and lost on restart; duplicate delivery after a restart
//! is tolerated under the at-least-once model.
//!
//! The deduplicator is an explicitly owned value injected into the pipeline
//! (never a process-wide singleton). Eviction is lazy on probe, with an
//! optional owned background sweep for long-idle keys.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

/// The suppression key for one rule-level send
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub tenant_id: i64,
    pub rule_id: i64,
    pub object_id: String,
    pub event_type: String,
}

/// Concurrency-safe TTL map of recently sent keys
#[derive(Debug)]
pub struct Deduplicator {
    entries: DashMap<DedupKey, Instant>,
    ttl: Duration,
}

impl Deduplicator {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Record the key if it is fresh. Returns true when the send should
    /// proceed, false when it is a duplicate inside the TTL window.
    pub fn check_and_record(&self, key: DedupKey) -> bool {
        let now = Instant::now();
        let mut fresh = true;
        self.entries
            .entry(key)
            .and_modify(|last_seen| {
                if now.duration_since(*last_seen) < self.ttl {
                    fresh = false;
                } else {
                    *last_seen = now;
                }
            })
            .or_insert(now);
        fresh
    }

    /// Drop every entry past the TTL
    pub fn evict_expired(&self) {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, last_seen| now.duration_since(*last_seen) < self.ttl);
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            debug!(evicted = evicted, "Dedup cache eviction pass");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawn the owned background eviction task. The handle belongs to the
    /// caller; aborting it stops eviction without affecting correctness
    /// (lazy eviction still applies on probe).
    pub fn spawn_eviction(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let dedup = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                dedup.evict_expired();
            }
        })
    }
}
