//! Health monitor and circuit breaker
//!
//! `check` ANDs four sub-checks: orphan buffer health, cache parity,
//! per-cache freshness against the highest slot seen, and process memory.
//! The breaker opens only after `failure_threshold` consecutive failed
//! checks and closes on the first healthy one. Operators can force it
//! either way; a manually opened breaker stays open until closed manually.
//!
//! The execution engine consults `should_block_execution` before acting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};
use types::entity::EntityKind;
use types::ordering::Slot;

use crate::config::HealthConfig;
use crate::memory::MemoryProbe;
use crate::orphan::{OrphanBuffer, OrphanHealth};
use crate::store::CacheView;

/// Snapshot of the circuit breaker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerState {
    pub open: bool,
    pub reason: Option<String>,
    /// Unix milliseconds at which the breaker last opened
    pub opened_at: Option<i64>,
    pub consecutive_failures: u32,
    /// Opened by an operator rather than by failed checks
    pub manual: bool,
    pub times_opened: u64,
}

/// Primary and balance caches must hold data once warm-up is over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParityCheck {
    pub healthy: bool,
    pub warming_up: bool,
    pub primary_size: usize,
    pub balance_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheLag {
    pub kind: EntityKind,
    pub last_update_slot: Slot,
    pub slots_behind: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FreshnessCheck {
    pub healthy: bool,
    pub max_slot_seen: Slot,
    pub max_slots_behind: u64,
    /// Caches over the lag ceiling
    pub lagging: Vec<CacheLag>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryCheck {
    pub healthy: bool,
    /// `None` when the probe could not measure
    pub heap_used_mb: Option<f64>,
    pub max_heap_mb: u64,
}

/// Result of one `check`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub checked_at: i64,
    pub orphan: OrphanHealth,
    pub parity: ParityCheck,
    pub freshness: FreshnessCheck,
    pub memory: MemoryCheck,
    pub circuit: CircuitBreakerState,
}

impl HealthReport {
    /// Names of the failing sub-checks, comma separated.
    pub fn failing_checks(&self) -> String {
        let mut failing = Vec::new();
        if !self.orphan.healthy {
            failing.push("orphan_buffer");
        }
        if !self.parity.healthy {
            failing.push("cache_parity");
        }
        if !self.freshness.healthy {
            failing.push("freshness");
        }
        if !self.memory.healthy {
            failing.push("memory");
        }
        failing.join(",")
    }
}

pub struct HealthMonitor {
    config: HealthConfig,
    orphans: Arc<OrphanBuffer>,
    primary: Arc<dyn CacheView>,
    balance: Arc<dyn CacheView>,
    caches: Vec<Arc<dyn CacheView>>,
    probe: Box<dyn MemoryProbe>,
    started_at: i64,
    max_slot_seen: AtomicU64,
    breaker: Mutex<CircuitBreakerState>,
}

impl HealthMonitor {
    /// `primary` and `balance` feed the parity check; every view in
    /// `caches` is checked for freshness.
    pub fn new(
        config: HealthConfig,
        orphans: Arc<OrphanBuffer>,
        primary: Arc<dyn CacheView>,
        balance: Arc<dyn CacheView>,
        caches: Vec<Arc<dyn CacheView>>,
        probe: Box<dyn MemoryProbe>,
        started_at: i64,
    ) -> Self {
        info!(
            max_slots_behind = config.max_slots_behind,
            max_heap_mb = config.max_heap_mb,
            failure_threshold = config.failure_threshold,
            warmup_ms = config.warmup_ms,
            caches = caches.len(),
            "HealthMonitor initialized"
        );
        Self {
            config,
            orphans,
            primary,
            balance,
            caches,
            probe,
            started_at,
            max_slot_seen: AtomicU64::new(0),
            breaker: Mutex::new(CircuitBreakerState::default()),
        }
    }

    /// Raise the slot high-water mark used by the freshness check.
    pub fn update_slot(&self, slot: Slot) {
        self.max_slot_seen.fetch_max(slot, Ordering::Relaxed);
    }

    pub fn max_slot_seen(&self) -> Slot {
        self.max_slot_seen.load(Ordering::Relaxed)
    }

    /// Run every sub-check and advance the breaker.
    pub fn check(&self, now: i64) -> HealthReport {
        let orphan = self.orphans.health();
        let parity = self.check_parity(now);
        let freshness = self.check_freshness();
        let memory = self.check_memory();
        let healthy = orphan.healthy && parity.healthy && freshness.healthy && memory.healthy;

        let mut report = HealthReport {
            healthy,
            checked_at: now,
            orphan,
            parity,
            freshness,
            memory,
            circuit: CircuitBreakerState::default(),
        };

        let mut breaker = self.breaker.lock();
        if healthy {
            breaker.consecutive_failures = 0;
            if breaker.open && !breaker.manual {
                let open_for_ms = breaker.opened_at.map(|at| now - at).unwrap_or(0);
                breaker.open = false;
                breaker.reason = None;
                breaker.opened_at = None;
                info!(open_for_ms, "Circuit breaker closed; health restored");
            }
        } else {
            breaker.consecutive_failures = breaker.consecutive_failures.saturating_add(1);
            let failing = report.failing_checks();
            debug!(
                consecutive_failures = breaker.consecutive_failures,
                failing = %failing,
                "Health check failed"
            );

            if !breaker.open && breaker.consecutive_failures >= self.config.failure_threshold {
                breaker.open = true;
                breaker.manual = false;
                breaker.opened_at = Some(now);
                breaker.times_opened += 1;
                warn!(
                    consecutive_failures = breaker.consecutive_failures,
                    failing = %failing,
                    reclaim_rate = report.orphan.reclaim_rate,
                    current_orphans = report.orphan.current_orphans,
                    primary_size = report.parity.primary_size,
                    balance_size = report.parity.balance_size,
                    lagging_caches = report.freshness.lagging.len(),
                    heap_used_mb = report.memory.heap_used_mb,
                    "Circuit breaker opened; blocking execution"
                );
                breaker.reason = Some(format!("unhealthy: {failing}"));
            }
        }

        report.circuit = breaker.clone();
        report
    }

    pub fn get_circuit_breaker(&self) -> CircuitBreakerState {
        self.breaker.lock().clone()
    }

    /// Operator override: open regardless of the failure counter.
    pub fn open_circuit(&self, reason: &str, now: i64) {
        let mut breaker = self.breaker.lock();
        if !breaker.open {
            breaker.times_opened += 1;
            breaker.opened_at = Some(now);
        }
        breaker.open = true;
        breaker.manual = true;
        breaker.reason = Some(reason.to_string());
        warn!(reason, "Circuit breaker opened manually");
    }

    /// Operator override: close and reset the failure counter.
    pub fn close_circuit(&self) {
        let mut breaker = self.breaker.lock();
        let was_open = breaker.open;
        breaker.open = false;
        breaker.manual = false;
        breaker.reason = None;
        breaker.opened_at = None;
        breaker.consecutive_failures = 0;
        if was_open {
            info!("Circuit breaker closed manually");
        }
    }

    /// Whether downstream execution must stand down.
    pub fn should_block_execution(&self) -> bool {
        self.breaker.lock().open
    }

    fn check_parity(&self, now: i64) -> ParityCheck {
        let primary_size = self.primary.len();
        let balance_size = self.balance.len();
        let warming_up = now - self.started_at < self.config.warmup_ms;
        ParityCheck {
            healthy: warming_up || (primary_size > 0 && balance_size > 0),
            warming_up,
            primary_size,
            balance_size,
        }
    }

    fn check_freshness(&self) -> FreshnessCheck {
        let max_slot_seen = self.max_slot_seen();
        let lagging: Vec<CacheLag> = self
            .caches
            .iter()
            .filter_map(|cache| {
                let last_update_slot = cache.last_update_slot()?;
                let slots_behind = max_slot_seen.saturating_sub(last_update_slot);
                (slots_behind > self.config.max_slots_behind).then(|| CacheLag {
                    kind: cache.kind(),
                    last_update_slot,
                    slots_behind,
                })
            })
            .collect();

        FreshnessCheck {
            healthy: lagging.is_empty(),
            max_slot_seen,
            max_slots_behind: self.config.max_slots_behind,
            lagging,
        }
    }

    fn check_memory(&self) -> MemoryCheck {
        let heap_used_mb = self.probe.heap_used_mb();
        MemoryCheck {
            healthy: heap_used_mb.map_or(true, |mb| mb < self.config.max_heap_mb as f64),
            heap_used_mb,
            max_heap_mb: self.config.max_heap_mb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caches::Caches;
    use crate::config::{CacheConfig, OrphanConfig};
    use crate::memory::FixedProbe;
    use types::entity::{PoolState, VaultBalance};
    use types::ids::AccountKey;
    use types::ordering::{OrderingMetadata, UpdateSource};

    const T0: i64 = 1_708_123_456_789;
    const WARM: i64 = T0 + 60_000;

    struct Fixture {
        caches: Caches,
        orphans: Arc<OrphanBuffer>,
        monitor: HealthMonitor,
    }

    fn make_fixture(heap_mb: Option<f64>) -> Fixture {
        let caches = Caches::new(&CacheConfig::default());
        let orphans = Arc::new(OrphanBuffer::new(OrphanConfig::default()));
        let monitor = HealthMonitor::new(
            HealthConfig::default(),
            orphans.clone(),
            caches.pools.clone(),
            caches.vaults.clone(),
            caches.views(),
            Box::new(FixedProbe(heap_mb)),
            T0,
        );
        Fixture {
            caches,
            orphans,
            monitor,
        }
    }

    fn make_meta(slot: u64, data_len: usize) -> OrderingMetadata {
        OrderingMetadata::new(slot, 0, data_len, UpdateSource::Stream, T0)
    }

    fn populate(f: &Fixture, slot: u64) {
        let pool = PoolState::pumpswap(
            AccountKey::from_seed(90),
            AccountKey::from_seed(91),
            AccountKey::from_seed(11),
            AccountKey::from_seed(12),
        );
        f.caches
            .pools
            .apply(AccountKey::from_seed(1), pool, make_meta(slot, 211))
            .unwrap();
        f.caches
            .vaults
            .apply(
                AccountKey::from_seed(11),
                VaultBalance {
                    mint: AccountKey::from_seed(90),
                    owner: AccountKey::from_seed(1),
                    amount: 5,
                },
                make_meta(slot, 165),
            )
            .unwrap();
        f.monitor.update_slot(slot);
    }

    #[test]
    fn test_empty_caches_pass_during_warmup_only() {
        let f = make_fixture(None);
        let early = f.monitor.check(T0 + 1_000);
        assert!(early.parity.warming_up);
        assert!(early.healthy);

        let late = f.monitor.check(WARM);
        assert!(!late.parity.healthy);
        assert_eq!(late.failing_checks(), "cache_parity");
    }

    #[test]
    fn test_freshness_lag() {
        let f = make_fixture(None);
        populate(&f, 100);

        f.monitor.update_slot(102);
        assert!(f.monitor.check(WARM).freshness.healthy);

        f.monitor.update_slot(103);
        let report = f.monitor.check(WARM);
        assert!(!report.freshness.healthy);
        let kinds: Vec<EntityKind> = report.freshness.lagging.iter().map(|l| l.kind).collect();
        assert_eq!(kinds, vec![EntityKind::Pool, EntityKind::Vault]);
        assert_eq!(report.freshness.lagging[0].slots_behind, 3);
    }

    #[test]
    fn test_update_slot_is_high_water_mark() {
        let f = make_fixture(None);
        f.monitor.update_slot(50);
        f.monitor.update_slot(40);
        assert_eq!(f.monitor.max_slot_seen(), 50);
    }

    #[test]
    fn test_memory_ceiling() {
        let f = make_fixture(Some(5_000.0));
        populate(&f, 10);
        let report = f.monitor.check(WARM);
        assert!(!report.memory.healthy);
        assert_eq!(report.failing_checks(), "memory");

        let unknown = make_fixture(None);
        populate(&unknown, 10);
        assert!(unknown.monitor.check(WARM).memory.healthy);
    }

    #[test]
    fn test_breaker_opens_after_threshold_and_closes_on_recovery() {
        let f = make_fixture(Some(10.0));
        populate(&f, 10);

        for p in 0..100u8 {
            f.orphans.add_child(
                types::entity::ChildRecord::tick_array(AccountKey::from_seed(p), 0, 1),
                make_meta(10, 10240),
                T0,
            );
        }
        for p in 0..94u8 {
            f.orphans.claim_children(&AccountKey::from_seed(p), T0);
        }

        let first = f.monitor.check(WARM);
        assert!(!first.orphan.healthy);
        assert!(!first.circuit.open);
        assert!(!f.monitor.check(WARM + 1).circuit.open);

        let third = f.monitor.check(WARM + 2);
        assert!(third.circuit.open);
        assert_eq!(third.circuit.consecutive_failures, 3);
        assert_eq!(third.circuit.opened_at, Some(WARM + 2));
        assert!(f.monitor.should_block_execution());

        // Stays open without re-counting an open event
        f.monitor.check(WARM + 3);
        assert_eq!(f.monitor.get_circuit_breaker().times_opened, 1);

        f.orphans.claim_children(&AccountKey::from_seed(94), T0);
        let recovered = f.monitor.check(WARM + 4);
        assert!(recovered.healthy);
        assert!(!recovered.circuit.open);
        assert_eq!(recovered.circuit.consecutive_failures, 0);
        assert!(!f.monitor.should_block_execution());
    }

    #[test]
    fn test_manual_open_survives_healthy_checks() {
        let f = make_fixture(Some(10.0));
        populate(&f, 10);

        f.monitor.open_circuit("operator halt", WARM);
        assert!(f.monitor.check(WARM + 1).healthy);
        let breaker = f.monitor.get_circuit_breaker();
        assert!(breaker.open);
        assert!(breaker.manual);
        assert_eq!(breaker.reason.as_deref(), Some("operator halt"));

        f.monitor.close_circuit();
        assert!(!f.monitor.should_block_execution());
        assert_eq!(f.monitor.get_circuit_breaker().times_opened, 1);
    }

    #[test]
    fn test_manual_close_resets_counter() {
        let f = make_fixture(Some(10.0));
        // Empty caches after warm-up keep failing
        f.monitor.check(WARM);
        f.monitor.check(WARM);
        f.monitor.close_circuit();
        assert_eq!(f.monitor.get_circuit_breaker().consecutive_failures, 0);
        assert!(!f.monitor.check(WARM).circuit.open);
    }
}
