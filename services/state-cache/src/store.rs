//! Cache entry store
//!
//! Holds the latest accepted value per key together with its ordering
//! metadata. Every write goes through two gates, in this order:
//!
//! 1. Schema: the value's entity kind must match the store and the observed
//!    `data_len` must be one of the sizes declared for that value. Failing
//!    either is a fault returned as `CacheError`.
//! 2. Ordering: accept iff the key is new or the incoming
//!    `(slot, write_version)` is strictly greater than the stored pair.
//!    Losing writes are reported in `ApplyOutcome`, never as errors.
//!
//! Stores built with a capacity evict their least-recently-updated entries
//! once the ceiling is exceeded. Eviction only affects presence; surviving
//! entries keep their ordering guarantee.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::hash::Hash;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info};
use types::entity::{CacheValue, EntityKind};
use types::errors::CacheError;
use types::ordering::{OrderingMetadata, Slot};

/// A cached value and the metadata of the write that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<V> {
    pub value: V,
    pub meta: OrderingMetadata,
}

/// Result of a single `apply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    pub accepted: bool,
    pub was_stale: bool,
    /// Slot of the entry that was there before this write, if any.
    /// On a stale rejection this is the winning slot.
    pub previous_slot: Option<Slot>,
}

impl ApplyOutcome {
    fn accepted(previous_slot: Option<Slot>) -> Self {
        Self {
            accepted: true,
            was_stale: false,
            previous_slot,
        }
    }

    fn stale(winning_slot: Slot) -> Self {
        Self {
            accepted: false,
            was_stale: true,
            previous_slot: Some(winning_slot),
        }
    }
}

/// Point-in-time counters for one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub kind: EntityKind,
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub accepted: u64,
    pub stale_rejected: u64,
    pub schema_violations: u64,
    /// Highest slot among accepted writes
    pub last_update_slot: Option<Slot>,
}

/// Read-only view every store exposes to monitoring.
pub trait CacheView: Send + Sync {
    fn kind(&self) -> EntityKind;

    fn stats(&self) -> CacheStats;

    fn len(&self) -> usize {
        self.stats().size
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn last_update_slot(&self) -> Option<Slot> {
        self.stats().last_update_slot
    }
}

/// Keyed capability contract implemented by every cache kind.
pub trait StateCache: CacheView {
    type Key;
    type Value;

    fn apply(
        &self,
        key: Self::Key,
        value: Self::Value,
        meta: OrderingMetadata,
    ) -> Result<ApplyOutcome, CacheError>;

    fn get(&self, key: &Self::Key) -> Option<CacheEntry<Self::Value>>;

    fn has(&self, key: &Self::Key) -> bool;

    fn clear(&self);
}

/// Check that `value` belongs in a store of `kind` and that `data_len` is
/// one of its declared payload sizes.
pub fn validate_payload<V: CacheValue>(
    kind: EntityKind,
    value: &V,
    data_len: usize,
) -> Result<(), CacheError> {
    let value_kind = value.entity_kind();
    if value_kind != kind {
        return Err(CacheError::KindMismatch {
            store: kind,
            value: value_kind,
        });
    }

    let expected = value.valid_sizes();
    if !expected.contains(&data_len) {
        return Err(CacheError::SchemaViolation {
            kind,
            data_len,
            expected,
        });
    }

    Ok(())
}

struct StoredEntry<V> {
    entry: CacheEntry<V>,
    /// Position in the recency index
    touch: u64,
}

struct StoreInner<K, V> {
    entries: HashMap<K, StoredEntry<V>>,
    /// touch sequence -> key, oldest first
    recency: BTreeMap<u64, K>,
    next_touch: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    accepted: u64,
    stale_rejected: u64,
    schema_violations: u64,
    last_update_slot: Option<Slot>,
}

impl<K, V> StoreInner<K, V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            next_touch: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            accepted: 0,
            stale_rejected: 0,
            schema_violations: 0,
            last_update_slot: None,
        }
    }
}

/// Ordered, schema-checked key/value store for one entity kind.
pub struct CacheEntryStore<K, V> {
    kind: EntityKind,
    /// Eviction ceiling; `None` means unbounded
    capacity: Option<usize>,
    inner: Mutex<StoreInner<K, V>>,
}

impl<K, V> CacheEntryStore<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync,
    V: CacheValue,
{
    /// Create an unbounded store for `kind`.
    pub fn new(kind: EntityKind) -> Self {
        info!(kind = kind.as_str(), "CacheEntryStore initialized");
        Self {
            kind,
            capacity: None,
            inner: Mutex::new(StoreInner::new()),
        }
    }

    /// Create a store that evicts least-recently-updated entries above `capacity`.
    pub fn with_capacity(kind: EntityKind, capacity: usize) -> Self {
        info!(
            kind = kind.as_str(),
            capacity, "CacheEntryStore initialized with eviction ceiling"
        );
        Self {
            kind,
            capacity: Some(capacity),
            inner: Mutex::new(StoreInner::new()),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Apply a write subject to the schema and ordering gates.
    pub fn apply(
        &self,
        key: K,
        value: V,
        meta: OrderingMetadata,
    ) -> Result<ApplyOutcome, CacheError> {
        let mut inner = self.inner.lock();

        if let Err(err) = validate_payload(self.kind, &value, meta.data_len) {
            inner.schema_violations += 1;
            error!(
                kind = self.kind.as_str(),
                key = ?key,
                slot = meta.slot,
                data_len = meta.data_len,
                error = %err,
                "Rejecting write that violates payload schema"
            );
            return Err(err);
        }

        let existing = inner.entries.get(&key).map(|stored| stored.entry.meta);
        let previous_slot = match existing {
            Some(existing) if !meta.supersedes(&existing) => {
                let winning = existing.slot;
                inner.stale_rejected += 1;
                debug!(
                    kind = self.kind.as_str(),
                    key = ?key,
                    slot = meta.slot,
                    write_version = meta.write_version,
                    winning_slot = winning,
                    source = meta.source.as_str(),
                    "Stale write rejected"
                );
                return Ok(ApplyOutcome::stale(winning));
            }
            Some(existing) => Some(existing.slot),
            None => None,
        };

        let touch = inner.next_touch;
        inner.next_touch += 1;

        let stored = StoredEntry {
            entry: CacheEntry { value, meta },
            touch,
        };
        if let Some(old) = inner.entries.insert(key.clone(), stored) {
            inner.recency.remove(&old.touch);
        }
        inner.recency.insert(touch, key);

        inner.accepted += 1;
        inner.last_update_slot = Some(match inner.last_update_slot {
            Some(last) => last.max(meta.slot),
            None => meta.slot,
        });

        self.evict_over_capacity(&mut inner);

        Ok(ApplyOutcome::accepted(previous_slot))
    }

    /// Read an entry, counting a hit or miss.
    pub fn get(&self, key: &K) -> Option<CacheEntry<V>> {
        let mut inner = self.inner.lock();
        let found = inner.entries.get(key).map(|stored| stored.entry.clone());
        if found.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        found
    }

    pub fn has(&self, key: &K) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// Remove a single entry (administrative).
    pub fn remove(&self, key: &K) -> Option<CacheEntry<V>> {
        let mut inner = self.inner.lock();
        let removed = inner.entries.remove(key)?;
        inner.recency.remove(&removed.touch);
        Some(removed.entry)
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.entries.len();
        inner.entries.clear();
        inner.recency.clear();
        info!(kind = self.kind.as_str(), dropped, "Cache cleared");
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All keys currently present, in no particular order.
    pub fn keys(&self) -> Vec<K> {
        self.inner.lock().entries.keys().cloned().collect()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            kind: self.kind,
            size: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            accepted: inner.accepted,
            stale_rejected: inner.stale_rejected,
            schema_violations: inner.schema_violations,
            last_update_slot: inner.last_update_slot,
        }
    }

    fn evict_over_capacity(&self, inner: &mut StoreInner<K, V>) {
        let Some(capacity) = self.capacity else {
            return;
        };

        let mut evicted = 0u64;
        while inner.entries.len() > capacity {
            let Some((_, key)) = inner.recency.pop_first() else {
                break;
            };
            inner.entries.remove(&key);
            evicted += 1;
        }

        if evicted > 0 {
            inner.evictions += evicted;
            debug!(
                kind = self.kind.as_str(),
                evicted,
                capacity,
                total_evictions = inner.evictions,
                "Evicted least-recently-updated entries"
            );
        }
    }
}

impl<K, V> CacheView for CacheEntryStore<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync,
    V: CacheValue,
{
    fn kind(&self) -> EntityKind {
        self.kind
    }

    fn stats(&self) -> CacheStats {
        CacheEntryStore::stats(self)
    }

    fn len(&self) -> usize {
        CacheEntryStore::len(self)
    }
}

impl<K, V> StateCache for CacheEntryStore<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync,
    V: CacheValue,
{
    type Key = K;
    type Value = V;

    fn apply(&self, key: K, value: V, meta: OrderingMetadata) -> Result<ApplyOutcome, CacheError> {
        CacheEntryStore::apply(self, key, value, meta)
    }

    fn get(&self, key: &K) -> Option<CacheEntry<V>> {
        CacheEntryStore::get(self, key)
    }

    fn has(&self, key: &K) -> bool {
        CacheEntryStore::has(self, key)
    }

    fn clear(&self) {
        CacheEntryStore::clear(self)
    }
}
