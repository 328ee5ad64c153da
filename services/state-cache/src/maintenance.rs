//! Periodic maintenance sweep
//!
//! The core owns no timer. Whoever schedules it calls `tick` at a fixed
//! interval; each tick is safe to run concurrently with ingestion and may
//! be repeated freely.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};
use types::ids::AccountKey;

use crate::health::{HealthMonitor, HealthReport};
use crate::lifecycle::{LifecycleOracle, SweepSummary};
use crate::orphan::OrphanBuffer;

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub expired_orphans: usize,
    pub demoted: Vec<AccountKey>,
    pub lifecycle: SweepSummary,
    pub health: HealthReport,
}

pub struct Maintenance {
    orphans: Arc<OrphanBuffer>,
    lifecycle: Arc<LifecycleOracle>,
    health: Arc<HealthMonitor>,
    ticks: u64,
}

impl Maintenance {
    pub fn new(
        orphans: Arc<OrphanBuffer>,
        lifecycle: Arc<LifecycleOracle>,
        health: Arc<HealthMonitor>,
    ) -> Self {
        Self {
            orphans,
            lifecycle,
            health,
            ticks: 0,
        }
    }

    /// Expire orphans, demote active pools that lost a dependency, retry
    /// every pending pool, then run the health check.
    pub fn tick(&mut self, now: i64) -> SweepReport {
        self.ticks += 1;

        let expired_orphans = self.orphans.cleanup(now);
        let demoted = self.lifecycle.revalidate_active();
        let lifecycle = self.lifecycle.sweep(self.health.max_slot_seen(), now);
        let health = self.health.check(now);

        if lifecycle.activated > 0
            || lifecycle.adopted > 0
            || !demoted.is_empty()
            || expired_orphans > 0
        {
            info!(
                tick = self.ticks,
                expired_orphans,
                demoted = demoted.len(),
                activated = lifecycle.activated,
                adopted = lifecycle.adopted,
                pending = lifecycle.incomplete + lifecycle.freeze_failures,
                healthy = health.healthy,
                "Maintenance tick"
            );
        } else {
            debug!(tick = self.ticks, healthy = health.healthy, "Maintenance tick");
        }

        SweepReport {
            expired_orphans,
            demoted,
            lifecycle,
            health,
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
