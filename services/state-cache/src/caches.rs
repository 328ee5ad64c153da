//! The four concrete cache kinds
//!
//! Pools are the primary entities, vaults hold their token balances, and
//! tick arrays / bin arrays are the child records of concentrated-liquidity
//! and liquidity-book pools. Only the vault cache is bounded.

use std::sync::Arc;

use tracing::error;
use types::entity::{ChildRecord, EntityKind, PoolState, VaultBalance};
use types::errors::CacheError;
use types::ids::{AccountKey, ChildKey};
use types::ordering::OrderingMetadata;

use crate::config::CacheConfig;
use crate::orphan::OrphanBuffer;
use crate::store::{ApplyOutcome, CacheEntryStore, CacheStats, CacheView};

pub type PoolCache = CacheEntryStore<AccountKey, PoolState>;
pub type VaultCache = CacheEntryStore<AccountKey, VaultBalance>;
pub type ChildCache = CacheEntryStore<ChildKey, ChildRecord>;

/// Handles to every cache, shared by ingestion, lifecycle and monitoring.
#[derive(Clone)]
pub struct Caches {
    pub pools: Arc<PoolCache>,
    pub vaults: Arc<VaultCache>,
    pub tick_arrays: Arc<ChildCache>,
    pub bin_arrays: Arc<ChildCache>,
}

impl Caches {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            pools: Arc::new(PoolCache::new(EntityKind::Pool)),
            vaults: Arc::new(VaultCache::with_capacity(
                EntityKind::Vault,
                config.balance_capacity,
            )),
            tick_arrays: Arc::new(ChildCache::new(EntityKind::TickArray)),
            bin_arrays: Arc::new(ChildCache::new(EntityKind::BinArray)),
        }
    }

    /// Child cache holding records of `kind`, if `kind` is a child kind.
    pub fn child_cache(&self, kind: EntityKind) -> Option<&Arc<ChildCache>> {
        match kind {
            EntityKind::TickArray => Some(&self.tick_arrays),
            EntityKind::BinArray => Some(&self.bin_arrays),
            EntityKind::Pool | EntityKind::Vault => None,
        }
    }

    /// Route a child record to the cache for its kind.
    pub fn apply_child(
        &self,
        record: ChildRecord,
        meta: OrderingMetadata,
    ) -> Result<ApplyOutcome, CacheError> {
        let cache = self
            .child_cache(record.kind)
            .ok_or(CacheError::KindMismatch {
                store: EntityKind::TickArray,
                value: record.kind,
            })?;
        cache.apply(record.key(), record, meta)
    }

    /// Claim every orphan buffered under `parent` into its child cache.
    ///
    /// Returns the number claimed. A claimed record the child cache rejects
    /// is logged and dropped.
    pub fn adopt_orphans(&self, orphans: &OrphanBuffer, parent: &AccountKey, now: i64) -> usize {
        let claimed = orphans.claim_children(parent, now);
        let count = claimed.len();
        for orphan in claimed {
            if let Err(err) = self.apply_child(orphan.record, orphan.meta) {
                error!(
                    child = %orphan.child_key,
                    error = %err,
                    "Claimed orphan rejected by child cache"
                );
            }
        }
        count
    }

    /// Whether a child record is present in its cache.
    pub fn has_child(&self, kind: EntityKind, key: &ChildKey) -> bool {
        self.child_cache(kind).is_some_and(|cache| cache.has(key))
    }

    /// Monitoring views in a fixed order: pool, vault, tick array, bin array.
    pub fn views(&self) -> Vec<Arc<dyn CacheView>> {
        vec![
            self.pools.clone() as Arc<dyn CacheView>,
            self.vaults.clone() as Arc<dyn CacheView>,
            self.tick_arrays.clone() as Arc<dyn CacheView>,
            self.bin_arrays.clone() as Arc<dyn CacheView>,
        ]
    }

    pub fn stats(&self) -> Vec<CacheStats> {
        vec![
            self.pools.stats(),
            self.vaults.stats(),
            self.tick_arrays.stats(),
            self.bin_arrays.stats(),
        ]
    }

    /// Administrative clear of every cache.
    pub fn clear_all(&self) {
        self.pools.clear();
        self.vaults.clear();
        self.tick_arrays.clear();
        self.bin_arrays.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ordering::UpdateSource;

    fn meta(slot: u64, data_len: usize) -> OrderingMetadata {
        OrderingMetadata::new(slot, 0, data_len, UpdateSource::Stream, 0)
    }

    #[test]
    fn test_apply_child_routes_by_kind() {
        let caches = Caches::new(&CacheConfig::default());
        let pool = AccountKey::from_seed(1);

        caches
            .apply_child(ChildRecord::tick_array(pool, -60, 3), meta(10, 10240))
            .unwrap();
        caches
            .apply_child(ChildRecord::bin_array(pool, 4, 9), meta(10, 10136))
            .unwrap();

        assert!(caches.has_child(EntityKind::TickArray, &ChildKey::new(pool, -60)));
        assert!(caches.has_child(EntityKind::BinArray, &ChildKey::new(pool, 4)));
        assert!(!caches.has_child(EntityKind::BinArray, &ChildKey::new(pool, -60)));
    }

    #[test]
    fn test_apply_child_rejects_non_child_kind() {
        let caches = Caches::new(&CacheConfig::default());
        let mut record = ChildRecord::tick_array(AccountKey::from_seed(1), 0, 0);
        record.kind = EntityKind::Pool;

        assert!(caches.apply_child(record, meta(1, 10240)).is_err());
    }

    #[test]
    fn test_adopt_orphans_keeps_newest_version() {
        let caches = Caches::new(&CacheConfig::default());
        let orphans = OrphanBuffer::new(crate::config::OrphanConfig::default());
        let pool = AccountKey::from_seed(1);
        caches
            .apply_child(ChildRecord::tick_array(pool, 0, 1), meta(100, 10240))
            .unwrap();
        orphans.add_child(ChildRecord::tick_array(pool, 0, 2), meta(105, 10240), 0);
        orphans.add_child(ChildRecord::tick_array(pool, 60, 2), meta(99, 10240), 0);

        assert_eq!(caches.adopt_orphans(&orphans, &pool, 10), 2);
        assert!(orphans.is_empty());
        let entry = caches.tick_arrays.get(&ChildKey::new(pool, 0)).unwrap();
        assert_eq!(entry.meta.slot, 105);
        assert!(caches.has_child(EntityKind::TickArray, &ChildKey::new(pool, 60)));
        assert_eq!(caches.adopt_orphans(&orphans, &pool, 20), 0);
    }

    #[test]
    fn test_vault_cache_is_bounded() {
        let caches = Caches::new(&CacheConfig {
            balance_capacity: 7,
        });
        assert_eq!(caches.vaults.capacity(), Some(7));
        assert_eq!(caches.pools.capacity(), None);
    }

    #[test]
    fn test_views_order() {
        let caches = Caches::new(&CacheConfig::default());
        let kinds: Vec<EntityKind> = caches.views().iter().map(|v| v.kind()).collect();
        assert_eq!(kinds, EntityKind::ALL.to_vec());
    }
}
