//! Component wiring
//!
//! Builds every component once from a `StateCacheConfig` and hands out
//! shared handles. There is no global state: callers that need a component
//! hold a clone of its `Arc`.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::caches::Caches;
use crate::config::StateCacheConfig;
use crate::dispatch::Dispatcher;
use crate::health::HealthMonitor;
use crate::lifecycle::LifecycleOracle;
use crate::maintenance::Maintenance;
use crate::memory::{MemoryProbe, SysinfoProbe};
use crate::metrics;
use crate::orphan::OrphanBuffer;

pub struct StateCacheSystem {
    pub config: StateCacheConfig,
    pub caches: Caches,
    pub orphans: Arc<OrphanBuffer>,
    pub lifecycle: Arc<LifecycleOracle>,
    pub health: Arc<HealthMonitor>,
    pub dispatcher: Arc<Dispatcher>,
}

impl StateCacheSystem {
    /// Wire every component, measuring memory through `sysinfo`.
    pub fn new(config: StateCacheConfig, now: i64) -> Self {
        Self::with_probe(config, Box::new(SysinfoProbe::new()), now)
    }

    pub fn with_probe(config: StateCacheConfig, probe: Box<dyn MemoryProbe>, now: i64) -> Self {
        let caches = Caches::new(&config.cache);
        let orphans = Arc::new(OrphanBuffer::new(config.orphan.clone()));
        let lifecycle = Arc::new(LifecycleOracle::new(
            config.lifecycle.clone(),
            caches.clone(),
            orphans.clone(),
        ));
        let health = Arc::new(HealthMonitor::new(
            config.health.clone(),
            orphans.clone(),
            caches.pools.clone(),
            caches.vaults.clone(),
            caches.views(),
            probe,
            now,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            caches.clone(),
            orphans.clone(),
            lifecycle.clone(),
            health.clone(),
        ));

        info!(
            balance_capacity = config.cache.balance_capacity,
            orphan_ttl_ms = config.orphan.ttl_ms,
            sweep_interval_ms = config.runtime.sweep_interval_ms,
            "State cache system started"
        );

        Self {
            config,
            caches,
            orphans,
            lifecycle,
            health,
            dispatcher,
        }
    }

    /// A maintenance driver bound to this system's components.
    pub fn maintenance(&self) -> Maintenance {
        Maintenance::new(
            self.orphans.clone(),
            self.lifecycle.clone(),
            self.health.clone(),
        )
    }

    pub fn metrics(&self) -> BTreeMap<String, u64> {
        metrics::export(self)
    }
}
