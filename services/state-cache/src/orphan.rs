//! Orphan buffer
//!
//! Holds child records (tick arrays, bin arrays) that arrive before their
//! parent pool is resolvable. Records are indexed by child key and, in a
//! reverse index, by parent key so the lifecycle oracle can claim every
//! pending child of a pool in one call. Both indexes are mutated under the
//! same lock.
//!
//! A parent that never shows up would leak its children forever, so
//! `cleanup` must be driven periodically to expire records past the TTL.

use std::collections::{BTreeSet, HashMap};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};
use types::entity::ChildRecord;
use types::ids::{AccountKey, ChildKey};
use types::ordering::OrderingMetadata;

use crate::config::OrphanConfig;
use crate::metrics::RollingSample;

/// A child record waiting for its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanedChildRecord {
    pub child_key: ChildKey,
    pub parent_key: AccountKey,
    pub record: ChildRecord,
    pub meta: OrderingMetadata,
    /// When the record entered the buffer, Unix milliseconds
    pub buffered_at: i64,
}

/// What `add_child` did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AddOutcome {
    /// New child key entered the buffer.
    Buffered,
    /// Replaced an older buffered version of the same child.
    Refreshed,
    /// An equal or newer version was already buffered; incoming dropped.
    Discarded,
}

/// Orphan buffer counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrphanStats {
    pub current: usize,
    /// Parents with at least one pending child
    pub parents: usize,
    pub buffered: u64,
    pub claimed: u64,
    pub expired: u64,
    /// Re-deliveries of an already buffered child
    pub superseded: u64,
    pub avg_claim_delay_ms: Option<u64>,
    pub p99_claim_delay_ms: Option<u64>,
}

/// Health verdict of the orphan buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrphanHealth {
    pub healthy: bool,
    /// `claimed / buffered`; 1.0 when nothing was ever buffered
    pub reclaim_rate: f64,
    pub current_orphans: usize,
    pub threshold: f64,
    pub max_warning: usize,
}

struct OrphanInner {
    orphans: HashMap<ChildKey, OrphanedChildRecord>,
    by_parent: HashMap<AccountKey, BTreeSet<ChildKey>>,
    buffered: u64,
    claimed: u64,
    expired: u64,
    superseded: u64,
    claim_delays_ms: RollingSample,
    /// Set while size is above the warning threshold
    warned: bool,
}

impl OrphanInner {
    fn new(delay_sample_size: usize) -> Self {
        Self {
            orphans: HashMap::new(),
            by_parent: HashMap::new(),
            buffered: 0,
            claimed: 0,
            expired: 0,
            superseded: 0,
            claim_delays_ms: RollingSample::new(delay_sample_size),
            warned: false,
        }
    }

    /// Remove `child` from the reverse index, dropping the parent's set once empty.
    fn unindex(&mut self, parent: &AccountKey, child: &ChildKey) {
        if let Some(children) = self.by_parent.get_mut(parent) {
            children.remove(child);
            if children.is_empty() {
                self.by_parent.remove(parent);
            }
        }
    }
}

/// Buffer for child records whose parent is not yet known.
pub struct OrphanBuffer {
    config: OrphanConfig,
    inner: Mutex<OrphanInner>,
}

impl OrphanBuffer {
    pub fn new(config: OrphanConfig) -> Self {
        info!(
            ttl_ms = config.ttl_ms,
            health_threshold = config.health_threshold,
            max_warning = config.max_warning,
            "OrphanBuffer initialized"
        );
        Self {
            inner: Mutex::new(OrphanInner::new(config.delay_sample_size)),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(OrphanConfig::default())
    }

    pub fn config(&self) -> &OrphanConfig {
        &self.config
    }

    /// Buffer a child record under its parent.
    ///
    /// If the same child is already buffered, the version with the larger
    /// `(slot, write_version)` is kept and the original residency start is
    /// preserved so the TTL still bounds how long the child can wait.
    pub fn add_child(&self, record: ChildRecord, meta: OrderingMetadata, now: i64) -> AddOutcome {
        let child_key = record.key();
        let parent_key = record.parent;
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if let Some(existing) = inner.orphans.get_mut(&child_key) {
            let outcome = if meta.supersedes(&existing.meta) {
                existing.record = record;
                existing.meta = meta;
                AddOutcome::Refreshed
            } else {
                AddOutcome::Discarded
            };
            inner.superseded += 1;
            debug!(
                child = %child_key,
                slot = meta.slot,
                outcome = ?outcome,
                "Child re-delivered while buffered"
            );
            return outcome;
        }

        inner.orphans.insert(
            child_key,
            OrphanedChildRecord {
                child_key,
                parent_key,
                record,
                meta,
                buffered_at: now,
            },
        );
        inner
            .by_parent
            .entry(parent_key)
            .or_default()
            .insert(child_key);
        inner.buffered += 1;

        let size = inner.orphans.len();
        debug!(
            child = %child_key,
            parent = %parent_key.short(),
            slot = meta.slot,
            size,
            "Buffered orphaned child"
        );

        if size >= self.config.max_warning && !inner.warned {
            inner.warned = true;
            warn!(
                size,
                max_warning = self.config.max_warning,
                parents = inner.by_parent.len(),
                "Orphan buffer above warning threshold; parent stream may be stalled"
            );
        }

        AddOutcome::Buffered
    }

    /// Remove and return every child buffered under `parent`.
    ///
    /// Returns an empty vector when nothing is pending. Records come back
    /// ordered by child key.
    pub fn claim_children(&self, parent: &AccountKey, now: i64) -> Vec<OrphanedChildRecord> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(children) = inner.by_parent.remove(parent) else {
            return Vec::new();
        };

        let mut claimed = Vec::with_capacity(children.len());
        for child_key in children {
            if let Some(orphan) = inner.orphans.remove(&child_key) {
                let delay = (now - orphan.buffered_at).max(0) as u64;
                inner.claim_delays_ms.record(delay);
                claimed.push(orphan);
            }
        }

        inner.claimed += claimed.len() as u64;
        self.rearm_warning(inner);

        if !claimed.is_empty() {
            debug!(
                parent = %parent.short(),
                count = claimed.len(),
                remaining = inner.orphans.len(),
                "Claimed orphaned children"
            );
        }

        claimed
    }

    /// Expire every record that has waited longer than the TTL.
    ///
    /// Returns the number of records expired.
    pub fn cleanup(&self, now: i64) -> usize {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let ttl = self.config.ttl_ms;

        let expired: Vec<(ChildKey, AccountKey)> = inner
            .orphans
            .values()
            .filter(|orphan| now - orphan.buffered_at > ttl)
            .map(|orphan| (orphan.child_key, orphan.parent_key))
            .collect();

        for (child_key, parent_key) in &expired {
            inner.orphans.remove(child_key);
            inner.unindex(parent_key, child_key);
        }

        let count = expired.len();
        inner.expired += count as u64;
        self.rearm_warning(inner);

        if count > 0 {
            info!(
                expired = count,
                remaining = inner.orphans.len(),
                total_expired = inner.expired,
                ttl_ms = ttl,
                "Expired orphaned children past TTL"
            );
        }

        count
    }

    /// Reclaim-rate and size verdict.
    pub fn health(&self) -> OrphanHealth {
        let inner = self.inner.lock();
        let reclaim_rate = if inner.buffered == 0 {
            1.0
        } else {
            inner.claimed as f64 / inner.buffered as f64
        };
        let current_orphans = inner.orphans.len();

        OrphanHealth {
            healthy: reclaim_rate >= self.config.health_threshold
                && current_orphans < self.config.max_warning,
            reclaim_rate,
            current_orphans,
            threshold: self.config.health_threshold,
            max_warning: self.config.max_warning,
        }
    }

    pub fn stats(&self) -> OrphanStats {
        let inner = self.inner.lock();
        OrphanStats {
            current: inner.orphans.len(),
            parents: inner.by_parent.len(),
            buffered: inner.buffered,
            claimed: inner.claimed,
            expired: inner.expired,
            superseded: inner.superseded,
            avg_claim_delay_ms: inner.claim_delays_ms.average(),
            p99_claim_delay_ms: inner.claim_delays_ms.percentile(99),
        }
    }

    /// Drop all records and zero every counter.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.orphans.len();
        *inner = OrphanInner::new(self.config.delay_sample_size);
        info!(dropped, "Orphan buffer reset");
    }

    pub fn len(&self) -> usize {
        self.inner.lock().orphans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, child: &ChildKey) -> bool {
        self.inner.lock().orphans.contains_key(child)
    }

    /// Number of children pending for `parent`.
    pub fn pending_for(&self, parent: &AccountKey) -> usize {
        self.inner
            .lock()
            .by_parent
            .get(parent)
            .map(|children| children.len())
            .unwrap_or(0)
    }

    fn rearm_warning(&self, inner: &mut OrphanInner) {
        if inner.warned && inner.orphans.len() < self.config.max_warning {
            inner.warned = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ordering::UpdateSource;

    const T0: i64 = 1_708_123_456_789;

    fn tick(parent: u8, start: i32) -> ChildRecord {
        ChildRecord::tick_array(AccountKey::from_seed(parent), start, 1)
    }

    fn meta(slot: u64, wv: u64) -> OrderingMetadata {
        OrderingMetadata::new(slot, wv, 10240, UpdateSource::Stream, T0)
    }

    #[test]
    fn test_add_and_claim() {
        let buffer = OrphanBuffer::with_defaults();
        let parent = AccountKey::from_seed(1);

        for i in 0..5 {
            assert_eq!(
                buffer.add_child(tick(1, i * 60), meta(100, 0), T0),
                AddOutcome::Buffered
            );
        }
        assert_eq!(buffer.pending_for(&parent), 5);

        let claimed = buffer.claim_children(&parent, T0 + 250);
        assert_eq!(claimed.len(), 5);
        assert_eq!(buffer.pending_for(&parent), 0);
        assert!(buffer.is_empty());

        let stats = buffer.stats();
        assert_eq!(stats.buffered, 5);
        assert_eq!(stats.claimed, 5);
        assert_eq!(stats.parents, 0);
        assert_eq!(stats.avg_claim_delay_ms, Some(250));
    }

    #[test]
    fn test_claim_returns_sorted_children() {
        let buffer = OrphanBuffer::with_defaults();
        buffer.add_child(tick(1, 120), meta(1, 0), T0);
        buffer.add_child(tick(1, -120), meta(1, 0), T0);
        buffer.add_child(tick(1, 0), meta(1, 0), T0);

        let starts: Vec<i32> = buffer
            .claim_children(&AccountKey::from_seed(1), T0)
            .iter()
            .map(|o| o.child_key.start_index)
            .collect();
        assert_eq!(starts, vec![-120, 0, 120]);
    }

    #[test]
    fn test_claim_unknown_parent_is_empty() {
        let buffer = OrphanBuffer::with_defaults();
        buffer.add_child(tick(1, 0), meta(1, 0), T0);

        assert!(buffer
            .claim_children(&AccountKey::from_seed(9), T0)
            .is_empty());
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.stats().claimed, 0);
    }

    #[test]
    fn test_claim_only_touches_requested_parent() {
        let buffer = OrphanBuffer::with_defaults();
        buffer.add_child(tick(1, 0), meta(1, 0), T0);
        buffer.add_child(tick(2, 0), meta(1, 0), T0);

        assert_eq!(buffer.claim_children(&AccountKey::from_seed(1), T0).len(), 1);
        assert!(buffer.contains(&ChildKey::new(AccountKey::from_seed(2), 0)));
    }

    #[test]
    fn test_redelivery_keeps_newest_version() {
        let buffer = OrphanBuffer::with_defaults();
        let parent = AccountKey::from_seed(1);

        assert_eq!(buffer.add_child(tick(1, 0), meta(100, 0), T0), AddOutcome::Buffered);

        let mut newer = tick(1, 0);
        newer.initialized_count = 9;
        assert_eq!(
            buffer.add_child(newer, meta(101, 0), T0 + 10),
            AddOutcome::Refreshed
        );
        assert_eq!(
            buffer.add_child(tick(1, 0), meta(99, 0), T0 + 20),
            AddOutcome::Discarded
        );

        let claimed = buffer.claim_children(&parent, T0 + 30);
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].record.initialized_count, 9);
        assert_eq!(claimed[0].meta.slot, 101);
        // Residency is measured from the first arrival
        assert_eq!(claimed[0].buffered_at, T0);

        let stats = buffer.stats();
        assert_eq!(stats.buffered, 1);
        assert_eq!(stats.superseded, 2);
    }

    #[test]
    fn test_cleanup_expires_after_ttl() {
        let buffer = OrphanBuffer::new(OrphanConfig {
            ttl_ms: 1_000,
            ..OrphanConfig::default()
        });
        let parent = AccountKey::from_seed(1);
        buffer.add_child(tick(1, 0), meta(1, 0), T0);

        assert_eq!(buffer.cleanup(T0 + 1_000), 0);
        assert!(buffer.contains(&ChildKey::new(parent, 0)));

        assert_eq!(buffer.cleanup(T0 + 1_001), 1);
        assert!(buffer.is_empty());
        assert_eq!(buffer.pending_for(&parent), 0);
        assert_eq!(buffer.stats().expired, 1);
        assert_eq!(buffer.stats().parents, 0);
    }

    #[test]
    fn test_cleanup_keeps_younger_siblings_indexed() {
        let buffer = OrphanBuffer::new(OrphanConfig {
            ttl_ms: 1_000,
            ..OrphanConfig::default()
        });
        let parent = AccountKey::from_seed(1);
        buffer.add_child(tick(1, 0), meta(1, 0), T0);
        buffer.add_child(tick(1, 60), meta(1, 0), T0 + 800);

        assert_eq!(buffer.cleanup(T0 + 1_200), 1);
        assert_eq!(buffer.pending_for(&parent), 1);

        let claimed = buffer.claim_children(&parent, T0 + 1_300);
        assert_eq!(claimed[0].child_key.start_index, 60);
    }

    #[test]
    fn test_health_reclaim_rate() {
        let buffer = OrphanBuffer::with_defaults();
        assert!(buffer.health().healthy);
        assert_eq!(buffer.health().reclaim_rate, 1.0);

        // 100 buffered across 100 parents, 94 claimed
        for p in 0..100u8 {
            buffer.add_child(tick(p, 0), meta(1, 0), T0);
        }
        for p in 0..94u8 {
            buffer.claim_children(&AccountKey::from_seed(p), T0);
        }

        let health = buffer.health();
        assert_eq!(health.current_orphans, 6);
        assert!((health.reclaim_rate - 0.94).abs() < 1e-9);
        assert!(!health.healthy);

        buffer.claim_children(&AccountKey::from_seed(94), T0);
        assert!(buffer.health().healthy);
    }

    #[test]
    fn test_health_fails_when_over_warning_size() {
        let buffer = OrphanBuffer::new(OrphanConfig {
            max_warning: 3,
            ..OrphanConfig::default()
        });
        for start in 0..3 {
            buffer.add_child(tick(1, start), meta(1, 0), T0);
        }
        // Reclaim rate is 0 anyway, but size alone must also fail
        let health = buffer.health();
        assert!(!health.healthy);
        assert_eq!(health.current_orphans, 3);
    }

    #[test]
    fn test_reset_clears_counters() {
        let buffer = OrphanBuffer::with_defaults();
        buffer.add_child(tick(1, 0), meta(1, 0), T0);
        buffer.claim_children(&AccountKey::from_seed(1), T0 + 5);
        buffer.add_child(tick(2, 0), meta(1, 0), T0);

        buffer.reset();
        let stats = buffer.stats();
        assert_eq!(stats.current, 0);
        assert_eq!(stats.buffered, 0);
        assert_eq!(stats.claimed, 0);
        assert_eq!(stats.avg_claim_delay_ms, None);
    }
}
