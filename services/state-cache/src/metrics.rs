//! Observability helpers for the state cache
//!
//! Rolling samples for delay distributions and a flat counter export for
//! log lines and Prometheus-style scraping.

use std::collections::{BTreeMap, VecDeque};

use crate::system::StateCacheSystem;

/// Bounded window of the most recent samples.
#[derive(Debug, Clone)]
pub struct RollingSample {
    samples: VecDeque<u64>,
    max_samples: usize,
}

impl RollingSample {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Record a sample, evicting the oldest once full.
    pub fn record(&mut self, value: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Get a percentile value (0-100).
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (p.min(100) as f64 / 100.0 * (sorted.len() - 1) as f64) as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }

    pub fn average(&self) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: u64 = self.samples.iter().sum();
        Some(sum / self.samples.len() as u64)
    }

    pub fn max(&self) -> Option<u64> {
        self.samples.iter().copied().max()
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }
}

/// Flatten every component's counters into one map.
///
/// Keys are `<component>_<counter>`; cache keys are prefixed with the
/// entity kind (`vault_evictions`, `pool_stale_rejected`, ...).
pub fn export(system: &StateCacheSystem) -> BTreeMap<String, u64> {
    let mut m = BTreeMap::new();

    for stats in system.caches.stats() {
        let kind = stats.kind.as_str();
        m.insert(format!("{kind}_size"), stats.size as u64);
        m.insert(format!("{kind}_hits"), stats.hits);
        m.insert(format!("{kind}_misses"), stats.misses);
        m.insert(format!("{kind}_evictions"), stats.evictions);
        m.insert(format!("{kind}_accepted"), stats.accepted);
        m.insert(format!("{kind}_stale_rejected"), stats.stale_rejected);
        m.insert(format!("{kind}_schema_violations"), stats.schema_violations);
        m.insert(
            format!("{kind}_last_update_slot"),
            stats.last_update_slot.unwrap_or(0),
        );
    }

    let orphan = system.orphans.stats();
    m.insert("orphan_current".to_string(), orphan.current as u64);
    m.insert("orphan_buffered".to_string(), orphan.buffered);
    m.insert("orphan_claimed".to_string(), orphan.claimed);
    m.insert("orphan_expired".to_string(), orphan.expired);
    m.insert("orphan_superseded".to_string(), orphan.superseded);
    m.insert(
        "orphan_avg_claim_delay_ms".to_string(),
        orphan.avg_claim_delay_ms.unwrap_or(0),
    );
    m.insert(
        "orphan_p99_claim_delay_ms".to_string(),
        orphan.p99_claim_delay_ms.unwrap_or(0),
    );

    let lifecycle = system.lifecycle.stats();
    m.insert("lifecycle_discovered".to_string(), lifecycle.discovered as u64);
    m.insert(
        "lifecycle_topology_frozen".to_string(),
        lifecycle.topology_frozen as u64,
    );
    m.insert("lifecycle_active".to_string(), lifecycle.active as u64);
    m.insert("lifecycle_incomplete".to_string(), lifecycle.incomplete as u64);
    m.insert("lifecycle_freezes".to_string(), lifecycle.freezes);
    m.insert("lifecycle_activations".to_string(), lifecycle.activations);
    m.insert("lifecycle_demotions".to_string(), lifecycle.demotions);

    let dispatch = system.dispatcher.stats();
    m.insert("dispatch_total".to_string(), dispatch.dispatched);
    m.insert("dispatch_applied".to_string(), dispatch.applied);
    m.insert("dispatch_stale".to_string(), dispatch.stale);
    m.insert("dispatch_buffered".to_string(), dispatch.buffered);
    m.insert(
        "dispatch_bootstrap_refused".to_string(),
        dispatch.bootstrap_refused,
    );
    m.insert("dispatch_faults".to_string(), dispatch.faults);

    let breaker = system.health.get_circuit_breaker();
    m.insert(
        "health_max_slot_seen".to_string(),
        system.health.max_slot_seen(),
    );
    m.insert("circuit_open".to_string(), u64::from(breaker.open));
    m.insert(
        "circuit_consecutive_failures".to_string(),
        u64::from(breaker.consecutive_failures),
    );
    m.insert("circuit_times_opened".to_string(), breaker.times_opened);

    m
}
