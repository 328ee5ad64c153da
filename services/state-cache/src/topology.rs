//! Dependency-set computation
//!
//! Derives, from a pool's own cached fields, the exact set of accounts the
//! pool needs before it can be trusted: its two vaults, plus a window of
//! child arrays around the current activity pointer. The result is computed
//! once at freeze time and never recomputed.

use serde::Serialize;
use types::entity::{EntityKind, PoolState, Venue, BINS_PER_ARRAY, TICKS_PER_ARRAY};
use types::errors::LifecycleError;
use types::ids::{AccountKey, ChildKey};

/// Frozen dependency set of one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencySet {
    /// Balance-holding sub-accounts (base vault first)
    pub vaults: Vec<AccountKey>,
    /// Kind of the required child records, if the venue has any
    pub child_kind: Option<EntityKind>,
    /// Required child arrays, ascending by start index
    pub children: Vec<ChildKey>,
}

impl DependencySet {
    pub fn len(&self) -> usize {
        self.vaults.len() + self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Compute the dependency set of `pool` keyed at `key`.
///
/// Fails when the pool lacks the fields its venue needs to place the
/// child window.
pub fn compute_dependencies(
    key: AccountKey,
    pool: &PoolState,
    window_radius: u32,
) -> Result<DependencySet, LifecycleError> {
    let vaults = vec![pool.vault_base, pool.vault_quote];
    let undefined = |reason: &str| LifecycleError::UndefinedTopology {
        key,
        reason: reason.to_string(),
    };

    let children = match pool.venue {
        Venue::PumpSwap => Vec::new(),
        Venue::RaydiumClmm => {
            let tick = pool
                .active_index
                .ok_or_else(|| undefined("missing current tick"))?;
            let spacing = match pool.index_spacing {
                Some(0) | None => return Err(undefined("missing tick spacing")),
                Some(spacing) => i32::from(spacing),
            };
            let span = spacing * TICKS_PER_ARRAY;
            let current = tick.div_euclid(span) * span;
            window(current, span, window_radius)
                .ok_or_else(|| undefined("tick array window out of range"))?
        }
        Venue::MeteoraDlmm => {
            let active_id = pool
                .active_index
                .ok_or_else(|| undefined("missing active bin id"))?;
            let current = active_id.div_euclid(BINS_PER_ARRAY);
            window(current, 1, window_radius)
                .ok_or_else(|| undefined("bin array window out of range"))?
        }
    };

    Ok(DependencySet {
        vaults,
        child_kind: pool.venue.child_kind(),
        children: children
            .into_iter()
            .map(|start| ChildKey::new(key, start))
            .collect(),
    })
}

/// `center + k * step` for `k` in `-radius..=radius`, or `None` on overflow.
fn window(center: i32, step: i32, radius: u32) -> Option<Vec<i32>> {
    let radius = i32::try_from(radius).ok()?;
    (-radius..=radius)
        .map(|k| k.checked_mul(step).and_then(|offset| center.checked_add(offset)))
        .collect()
}
