//! Update dispatcher
//!
//! Entry point for decoded account updates from the stream and the
//! bootstrap fetcher. Routes each update to its cache, buffers child
//! records whose parent pool is not cached yet, registers newly seen pools
//! with the lifecycle oracle, and feeds the slot high-water mark.
//!
//! Locks are taken one component at a time; the dispatcher never nests them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error};
use types::errors::CacheError;
use types::ordering::UpdateSource;
use types::update::{AccountUpdate, UpdatePayload};

use crate::caches::Caches;
use crate::health::HealthMonitor;
use crate::lifecycle::LifecycleOracle;
use crate::orphan::{AddOutcome, OrphanBuffer};
use crate::store::{validate_payload, ApplyOutcome};

/// What happened to one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DispatchOutcome {
    /// Reached its cache; the outcome says whether it won the ordering check.
    Applied(ApplyOutcome),
    /// Child record parked until its parent pool is cached.
    Buffered(AddOutcome),
    /// Bootstrap write for a pool whose topology is already frozen.
    BootstrapRefused,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub dispatched: u64,
    pub applied: u64,
    pub stale: u64,
    pub buffered: u64,
    pub bootstrap_refused: u64,
    pub faults: u64,
}

#[derive(Default)]
struct Counters {
    dispatched: AtomicU64,
    applied: AtomicU64,
    stale: AtomicU64,
    buffered: AtomicU64,
    bootstrap_refused: AtomicU64,
    faults: AtomicU64,
}

pub struct Dispatcher {
    caches: Caches,
    orphans: Arc<OrphanBuffer>,
    lifecycle: Arc<LifecycleOracle>,
    health: Arc<HealthMonitor>,
    counters: Counters,
}

impl Dispatcher {
    pub fn new(
        caches: Caches,
        orphans: Arc<OrphanBuffer>,
        lifecycle: Arc<LifecycleOracle>,
        health: Arc<HealthMonitor>,
    ) -> Self {
        Self {
            caches,
            orphans,
            lifecycle,
            health,
            counters: Counters::default(),
        }
    }

    /// Route one update. `now` is the capture time in Unix milliseconds.
    ///
    /// Schema faults (wrong size, payload of the wrong kind) are returned as
    /// errors and leave every component unchanged. Only updates that pass the
    /// schema gate move the slot high-water mark.
    pub fn dispatch(&self, update: AccountUpdate, now: i64) -> Result<DispatchOutcome, CacheError> {
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        let slot = update.slot;

        let result = self.route(update, now);
        if result.is_ok() {
            self.health.update_slot(slot);
        }
        match &result {
            Ok(DispatchOutcome::Applied(outcome)) if outcome.accepted => {
                self.counters.applied.fetch_add(1, Ordering::Relaxed);
            }
            Ok(DispatchOutcome::Applied(_)) => {
                self.counters.stale.fetch_add(1, Ordering::Relaxed);
            }
            Ok(DispatchOutcome::Buffered(_)) => {
                self.counters.buffered.fetch_add(1, Ordering::Relaxed);
            }
            Ok(DispatchOutcome::BootstrapRefused) => {
                self.counters.bootstrap_refused.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.counters.faults.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            applied: self.counters.applied.load(Ordering::Relaxed),
            stale: self.counters.stale.load(Ordering::Relaxed),
            buffered: self.counters.buffered.load(Ordering::Relaxed),
            bootstrap_refused: self.counters.bootstrap_refused.load(Ordering::Relaxed),
            faults: self.counters.faults.load(Ordering::Relaxed),
        }
    }

    fn route(&self, update: AccountUpdate, now: i64) -> Result<DispatchOutcome, CacheError> {
        let payload_kind = update.payload.entity_kind();
        if payload_kind != update.kind {
            error!(
                key = %update.key,
                declared = update.kind_label(),
                payload = payload_kind.as_str(),
                slot = update.slot,
                "Payload does not match declared kind"
            );
            return Err(CacheError::KindMismatch {
                store: update.kind,
                value: payload_kind,
            });
        }

        let meta = update.metadata(now);
        let key = update.key;

        match update.payload {
            UpdatePayload::Pool(pool) => {
                if update.source == UpdateSource::Bootstrap && self.lifecycle.is_frozen(&key) {
                    debug!(
                        pool = %key.short(),
                        slot = update.slot,
                        "Refusing bootstrap write for frozen pool"
                    );
                    return Ok(DispatchOutcome::BootstrapRefused);
                }
                let outcome = self.caches.pools.apply(key, pool, meta)?;
                // Also re-registers a pool whose lifecycle record was removed
                if outcome.accepted {
                    self.lifecycle.discover(key, update.slot);
                }
                Ok(DispatchOutcome::Applied(outcome))
            }
            UpdatePayload::Vault(balance) => {
                let outcome = self.caches.vaults.apply(key, balance, meta)?;
                Ok(DispatchOutcome::Applied(outcome))
            }
            UpdatePayload::Child(record) => {
                if self.caches.pools.has(&record.parent) {
                    return Ok(DispatchOutcome::Applied(
                        self.caches.apply_child(record, meta)?,
                    ));
                }
                // Validate before parking so a bad payload cannot sit in the buffer
                validate_payload(record.kind, &record, meta.data_len)?;
                let parent = record.parent;
                let outcome = self.orphans.add_child(record, meta, now);
                // The parent may have been cached, and its orphans claimed,
                // between the check above and the add
                if self.caches.pools.has(&parent) {
                    self.caches.adopt_orphans(&self.orphans, &parent, now);
                }
                Ok(DispatchOutcome::Buffered(outcome))
            }
        }
    }
}
