//! Lifecycle oracle
//!
//! Per-pool state machine gating when a cached pool is trustworthy:
//!
//! ```text
//! DISCOVERED ──freeze──▶ TOPOLOGY_FROZEN ──activate──▶ ACTIVE
//!                              │    ▲                   │
//!                     missing  ▼    │ activate          │ demote / dependency lost
//!                           INCOMPLETE ◀────────────────┘
//! ```
//!
//! Freezing computes the dependency set exactly once from the pool's own
//! cached fields. From then on the bootstrap source must not write the
//! pool's slot. Activation resolves every dependency from the caches or by
//! claiming buffered orphans; missing dependencies are reported, not
//! raised. INCOMPLETE is a frozen state: the dependency set is kept.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};
use types::errors::LifecycleError;
use types::ids::{AccountKey, ChildKey};
use types::ordering::Slot;

use crate::caches::Caches;
use crate::config::LifecycleConfig;
use crate::orphan::OrphanBuffer;
use crate::topology::{compute_dependencies, DependencySet};

/// Lifecycle state of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Discovered,
    TopologyFrozen,
    Active,
    Incomplete,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Discovered => "DISCOVERED",
            LifecycleState::TopologyFrozen => "TOPOLOGY_FROZEN",
            LifecycleState::Active => "ACTIVE",
            LifecycleState::Incomplete => "INCOMPLETE",
        }
    }

    /// Whether the dependency set has been committed.
    pub fn is_frozen(&self) -> bool {
        !matches!(self, LifecycleState::Discovered)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle bookkeeping for one pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleRecord {
    pub key: AccountKey,
    pub state: LifecycleState,
    pub discovered_slot: Slot,
    pub frozen_slot: Option<Slot>,
    pub dependencies: Option<DependencySet>,
    pub activation_attempts: u32,
    /// Why the entity was last demoted out of ACTIVE
    pub demotion_reason: Option<String>,
}

impl LifecycleRecord {
    fn discovered(key: AccountKey, slot: Slot) -> Self {
        Self {
            key,
            state: LifecycleState::Discovered,
            discovered_slot: slot,
            frozen_slot: None,
            dependencies: None,
            activation_attempts: 0,
            demotion_reason: None,
        }
    }
}

/// Dependencies that could not be resolved, by category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MissingDependencies {
    /// Set when the pool's own value is no longer cached
    pub parent: Option<AccountKey>,
    pub vaults: Vec<AccountKey>,
    pub children: Vec<ChildKey>,
}

impl MissingDependencies {
    pub fn is_empty(&self) -> bool {
        self.parent.is_none() && self.vaults.is_empty() && self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        usize::from(self.parent.is_some()) + self.vaults.len() + self.children.len()
    }
}

/// Result of `freeze`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FreezeResult {
    pub key: AccountKey,
    pub dependencies: DependencySet,
    /// False when the entity was already frozen
    pub newly_frozen: bool,
}

/// Result of `activate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivationResult {
    pub key: AccountKey,
    pub activated: bool,
    /// True when the entity was ACTIVE before this call
    pub already_active: bool,
    pub state: LifecycleState,
    /// Resolved dependency set on success
    pub resolved: Option<DependencySet>,
    pub missing: MissingDependencies,
    /// Orphans claimed into the caches during this call
    pub claimed: usize,
}

/// Result of `freeze_and_activate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FreezeAndActivateResult {
    pub freeze: FreezeResult,
    pub activation: ActivationResult,
}

/// Outcome of one maintenance pass over pending entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub attempted: usize,
    pub activated: usize,
    pub incomplete: usize,
    pub freeze_failures: usize,
    /// Orphans claimed for pools that were already ACTIVE
    pub adopted: usize,
}

/// Per-state counts and cumulative transition counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleStats {
    pub discovered: usize,
    pub topology_frozen: usize,
    pub active: usize,
    pub incomplete: usize,
    pub freezes: u64,
    pub activations: u64,
    pub demotions: u64,
}

#[derive(Default)]
struct LifecycleInner {
    records: HashMap<AccountKey, LifecycleRecord>,
    freezes: u64,
    activations: u64,
    demotions: u64,
}

/// Freeze/activate state machine over every known pool.
pub struct LifecycleOracle {
    config: LifecycleConfig,
    caches: Caches,
    orphans: Arc<OrphanBuffer>,
    inner: Mutex<LifecycleInner>,
}

impl LifecycleOracle {
    pub fn new(config: LifecycleConfig, caches: Caches, orphans: Arc<OrphanBuffer>) -> Self {
        info!(
            child_window_radius = config.child_window_radius,
            "LifecycleOracle initialized"
        );
        Self {
            config,
            caches,
            orphans,
            inner: Mutex::new(LifecycleInner::default()),
        }
    }

    /// Record the first observation of a pool. Returns false if already known.
    pub fn discover(&self, key: AccountKey, slot: Slot) -> bool {
        let mut inner = self.inner.lock();
        if inner.records.contains_key(&key) {
            return false;
        }
        inner
            .records
            .insert(key, LifecycleRecord::discovered(key, slot));
        debug!(pool = %key.short(), slot, "Pool discovered");
        true
    }

    /// Commit the pool's dependency set.
    ///
    /// Idempotent: freezing an already frozen pool returns the original set.
    /// Fails if the pool has no cached value or its fields do not define a
    /// topology; the pool then stays DISCOVERED.
    pub fn freeze(&self, key: AccountKey, slot: Slot) -> Result<FreezeResult, LifecycleError> {
        let mut inner = self.inner.lock();
        self.freeze_locked(&mut inner, key, slot)
    }

    /// Try to promote a frozen pool to ACTIVE.
    ///
    /// Claims any orphans buffered under the pool into the child caches,
    /// then checks every frozen dependency. Safe to call repeatedly.
    pub fn activate(&self, key: AccountKey, now: i64) -> Result<ActivationResult, LifecycleError> {
        let mut inner = self.inner.lock();
        self.activate_locked(&mut inner, key, now)
    }

    /// `freeze` then `activate` under one lock acquisition.
    pub fn freeze_and_activate(
        &self,
        key: AccountKey,
        slot: Slot,
        now: i64,
    ) -> Result<FreezeAndActivateResult, LifecycleError> {
        let mut inner = self.inner.lock();
        let freeze = self.freeze_locked(&mut inner, key, slot)?;
        let activation = self.activate_locked(&mut inner, key, now)?;
        Ok(FreezeAndActivateResult { freeze, activation })
    }

    /// Freeze and activate every entity that is not yet ACTIVE.
    ///
    /// ACTIVE pools are not re-activated, but any orphans parked under them
    /// are claimed into the child caches.
    pub fn sweep(&self, slot: Slot, now: i64) -> SweepSummary {
        let mut inner = self.inner.lock();
        let mut pending: Vec<AccountKey> = Vec::new();
        let mut summary = SweepSummary::default();

        for record in inner.records.values() {
            if record.state != LifecycleState::Active {
                pending.push(record.key);
            } else if self.orphans.pending_for(&record.key) > 0 {
                summary.adopted += self.caches.adopt_orphans(&self.orphans, &record.key, now);
            }
        }
        pending.sort();
        summary.attempted = pending.len();

        for key in pending {
            let result = self
                .freeze_locked(&mut inner, key, slot)
                .and_then(|_| self.activate_locked(&mut inner, key, now));
            match result {
                Ok(activation) if activation.activated => summary.activated += 1,
                Ok(_) => summary.incomplete += 1,
                Err(err) => {
                    summary.freeze_failures += 1;
                    debug!(pool = %key.short(), error = %err, "Sweep could not freeze pool yet");
                }
            }
        }

        if summary.attempted > 0 || summary.adopted > 0 {
            debug!(
                attempted = summary.attempted,
                activated = summary.activated,
                incomplete = summary.incomplete,
                freeze_failures = summary.freeze_failures,
                adopted = summary.adopted,
                "Lifecycle sweep complete"
            );
        }

        summary
    }

    /// Move an ACTIVE pool back to INCOMPLETE. Returns false if it was not ACTIVE.
    pub fn demote(&self, key: AccountKey, reason: &str) -> Result<bool, LifecycleError> {
        let mut inner = self.inner.lock();
        let record = inner
            .records
            .get_mut(&key)
            .ok_or(LifecycleError::UnknownEntity(key))?;
        if record.state != LifecycleState::Active {
            return Ok(false);
        }
        record.state = LifecycleState::Incomplete;
        record.demotion_reason = Some(reason.to_string());
        inner.demotions += 1;
        warn!(pool = %key.short(), reason, "Pool demoted from ACTIVE");
        Ok(true)
    }

    /// Demote every ACTIVE pool whose dependencies are no longer all cached.
    ///
    /// Returns the demoted keys.
    pub fn revalidate_active(&self) -> Vec<AccountKey> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let mut demoted = Vec::new();

        for record in inner.records.values_mut() {
            if record.state != LifecycleState::Active {
                continue;
            }
            let Some(deps) = record.dependencies.as_ref() else {
                continue;
            };
            let missing = self.missing_dependencies(record.key, deps);
            if missing.is_empty() {
                continue;
            }

            record.state = LifecycleState::Incomplete;
            record.demotion_reason = Some(format!("{} dependencies lost", missing.len()));
            demoted.push(record.key);
            warn!(
                pool = %record.key.short(),
                missing_vaults = missing.vaults.len(),
                missing_children = missing.children.len(),
                parent_missing = missing.parent.is_some(),
                "Active pool lost dependencies; demoted"
            );
        }

        inner.demotions += demoted.len() as u64;
        demoted.sort();
        demoted
    }

    /// Administrative removal of a pool's lifecycle record.
    pub fn remove(&self, key: &AccountKey) -> Option<LifecycleRecord> {
        let removed = self.inner.lock().records.remove(key);
        if removed.is_some() {
            info!(pool = %key.short(), "Lifecycle record removed");
        }
        removed
    }

    pub fn state(&self, key: &AccountKey) -> Option<LifecycleState> {
        self.inner.lock().records.get(key).map(|record| record.state)
    }

    /// Whether the pool's dependency set is committed (bootstrap writes forbidden).
    pub fn is_frozen(&self, key: &AccountKey) -> bool {
        self.state(key).is_some_and(|state| state.is_frozen())
    }

    /// Whether the pool may be used for decisions.
    pub fn is_active(&self, key: &AccountKey) -> bool {
        self.state(key) == Some(LifecycleState::Active)
    }

    pub fn record(&self, key: &AccountKey) -> Option<LifecycleRecord> {
        self.inner.lock().records.get(key).cloned()
    }

    /// Keys of every entity currently in `state`, sorted.
    pub fn get_entities_by_state(&self, state: LifecycleState) -> Vec<AccountKey> {
        let inner = self.inner.lock();
        let mut keys: Vec<AccountKey> = inner
            .records
            .values()
            .filter(|record| record.state == state)
            .map(|record| record.key)
            .collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> LifecycleStats {
        let inner = self.inner.lock();
        let mut stats = LifecycleStats {
            freezes: inner.freezes,
            activations: inner.activations,
            demotions: inner.demotions,
            ..LifecycleStats::default()
        };
        for record in inner.records.values() {
            match record.state {
                LifecycleState::Discovered => stats.discovered += 1,
                LifecycleState::TopologyFrozen => stats.topology_frozen += 1,
                LifecycleState::Active => stats.active += 1,
                LifecycleState::Incomplete => stats.incomplete += 1,
            }
        }
        stats
    }

    fn freeze_locked(
        &self,
        inner: &mut LifecycleInner,
        key: AccountKey,
        slot: Slot,
    ) -> Result<FreezeResult, LifecycleError> {
        if let Some(deps) = inner
            .records
            .get(&key)
            .and_then(|record| record.dependencies.clone())
        {
            return Ok(FreezeResult {
                key,
                dependencies: deps,
                newly_frozen: false,
            });
        }

        let pool = self
            .caches
            .pools
            .get(&key)
            .ok_or(LifecycleError::ParentNotCached(key))?;
        let deps = compute_dependencies(key, &pool.value, self.config.child_window_radius)?;

        let record = inner
            .records
            .entry(key)
            .or_insert_with(|| LifecycleRecord::discovered(key, pool.meta.slot));
        record.state = LifecycleState::TopologyFrozen;
        record.frozen_slot = Some(slot);
        record.dependencies = Some(deps.clone());
        inner.freezes += 1;

        info!(
            pool = %key.short(),
            venue = pool.value.venue.as_str(),
            slot,
            vaults = deps.vaults.len(),
            children = deps.children.len(),
            "Pool topology frozen"
        );

        Ok(FreezeResult {
            key,
            dependencies: deps,
            newly_frozen: true,
        })
    }

    fn activate_locked(
        &self,
        inner: &mut LifecycleInner,
        key: AccountKey,
        now: i64,
    ) -> Result<ActivationResult, LifecycleError> {
        let record = inner
            .records
            .get_mut(&key)
            .ok_or(LifecycleError::UnknownEntity(key))?;
        let deps = record
            .dependencies
            .clone()
            .ok_or(LifecycleError::NotFrozen(key))?;

        if record.state == LifecycleState::Active {
            return Ok(ActivationResult {
                key,
                activated: true,
                already_active: true,
                state: LifecycleState::Active,
                resolved: Some(deps),
                missing: MissingDependencies::default(),
                claimed: 0,
            });
        }

        record.activation_attempts += 1;
        let claimed = self.caches.adopt_orphans(&self.orphans, &key, now);
        let missing = self.missing_dependencies(key, &deps);

        if missing.is_empty() {
            record.state = LifecycleState::Active;
            record.demotion_reason = None;
            let attempts = record.activation_attempts;
            inner.activations += 1;
            info!(
                pool = %key.short(),
                attempts,
                claimed,
                "Pool activated"
            );
            return Ok(ActivationResult {
                key,
                activated: true,
                already_active: false,
                state: LifecycleState::Active,
                resolved: Some(deps),
                missing,
                claimed,
            });
        }

        record.state = LifecycleState::Incomplete;
        debug!(
            pool = %key.short(),
            attempts = record.activation_attempts,
            missing_vaults = missing.vaults.len(),
            missing_children = missing.children.len(),
            claimed,
            "Pool activation incomplete"
        );
        Ok(ActivationResult {
            key,
            activated: false,
            already_active: false,
            state: LifecycleState::Incomplete,
            resolved: None,
            missing,
            claimed,
        })
    }

    fn missing_dependencies(&self, key: AccountKey, deps: &DependencySet) -> MissingDependencies {
        let parent = (!self.caches.pools.has(&key)).then_some(key);
        let vaults = deps
            .vaults
            .iter()
            .filter(|vault| !self.caches.vaults.has(vault))
            .copied()
            .collect();
        let children = match deps.child_kind {
            Some(kind) => deps
                .children
                .iter()
                .filter(|child| !self.caches.has_child(kind, child))
                .copied()
                .collect(),
            None => Vec::new(),
        };
        MissingDependencies {
            parent,
            vaults,
            children,
        }
    }
}
