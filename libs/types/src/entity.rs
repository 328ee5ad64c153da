//! Decoded entity values held by the state cache
//!
//! Account decoding happens upstream; these are the already-decoded shapes
//! the cache admits, together with the payload sizes each kind is allowed
//! to arrive with. A size outside the declared set means the account was
//! routed to the wrong kind and must never be admitted.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{AccountKey, ChildKey};

/// PumpSwap pool account sizes (pre- and post-creator-fee layout)
pub const PUMPSWAP_POOL_SIZES: &[usize] = &[211, 243];
/// Concentrated-liquidity pool account size
pub const CLMM_POOL_SIZES: &[usize] = &[1544];
/// Liquidity-book pair account size
pub const DLMM_PAIR_SIZES: &[usize] = &[904];
/// Token account sizes: base layout and the two common extension layouts
pub const TOKEN_ACCOUNT_SIZES: &[usize] = &[165, 170, 182];
/// Concentrated-liquidity tick array size
pub const TICK_ARRAY_SIZES: &[usize] = &[10240];
/// Liquidity-book bin array size
pub const BIN_ARRAY_SIZES: &[usize] = &[10136];

/// Ticks covered by one tick array, in units of tick spacing
pub const TICKS_PER_ARRAY: i32 = 60;
/// Bins covered by one bin array
pub const BINS_PER_ARRAY: i32 = 70;

/// The four kinds of cached entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Pool,
    Vault,
    TickArray,
    BinArray,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Pool,
        EntityKind::Vault,
        EntityKind::TickArray,
        EntityKind::BinArray,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Pool => "pool",
            EntityKind::Vault => "vault",
            EntityKind::TickArray => "tick_array",
            EntityKind::BinArray => "bin_array",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trading venue a pool belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    /// Constant-product pool; reserves live entirely in its two vaults
    PumpSwap,
    /// Concentrated liquidity; liquidity is distributed over tick arrays
    RaydiumClmm,
    /// Liquidity book; liquidity is distributed over bin arrays
    MeteoraDlmm,
}

impl Venue {
    /// Valid payload sizes for this venue's pool account
    pub fn pool_sizes(&self) -> &'static [usize] {
        match self {
            Venue::PumpSwap => PUMPSWAP_POOL_SIZES,
            Venue::RaydiumClmm => CLMM_POOL_SIZES,
            Venue::MeteoraDlmm => DLMM_PAIR_SIZES,
        }
    }

    /// Child record kind this venue depends on, if any
    pub fn child_kind(&self) -> Option<EntityKind> {
        match self {
            Venue::PumpSwap => None,
            Venue::RaydiumClmm => Some(EntityKind::TickArray),
            Venue::MeteoraDlmm => Some(EntityKind::BinArray),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::PumpSwap => "pumpswap",
            Venue::RaydiumClmm => "raydium_clmm",
            Venue::MeteoraDlmm => "meteora_dlmm",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value that can live in a cache entry store.
///
/// Each value reports which entity kind it is and which payload sizes are
/// legal for it, so a store can refuse misrouted writes before ordering.
pub trait CacheValue: Clone + Send + Sync + 'static {
    fn entity_kind(&self) -> EntityKind;

    fn valid_sizes(&self) -> &'static [usize];
}

/// Decoded pool (primary entity)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    pub venue: Venue,
    pub base_mint: AccountKey,
    pub quote_mint: AccountKey,
    /// Token account holding the base reserve
    pub vault_base: AccountKey,
    /// Token account holding the quote reserve
    pub vault_quote: AccountKey,
    /// Current tick (CLMM) or active bin id (DLMM)
    #[serde(default)]
    pub active_index: Option<i32>,
    /// Tick spacing (CLMM) or bin step (DLMM)
    #[serde(default)]
    pub index_spacing: Option<u16>,
}

impl PoolState {
    /// Constant-product pool with no child records
    pub fn pumpswap(
        base_mint: AccountKey,
        quote_mint: AccountKey,
        vault_base: AccountKey,
        vault_quote: AccountKey,
    ) -> Self {
        Self {
            venue: Venue::PumpSwap,
            base_mint,
            quote_mint,
            vault_base,
            vault_quote,
            active_index: None,
            index_spacing: None,
        }
    }
}

impl CacheValue for PoolState {
    fn entity_kind(&self) -> EntityKind {
        EntityKind::Pool
    }

    fn valid_sizes(&self) -> &'static [usize] {
        self.venue.pool_sizes()
    }
}

/// Decoded token account balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultBalance {
    pub mint: AccountKey,
    pub owner: AccountKey,
    pub amount: u64,
}

impl CacheValue for VaultBalance {
    fn entity_kind(&self) -> EntityKind {
        EntityKind::Vault
    }

    fn valid_sizes(&self) -> &'static [usize] {
        TOKEN_ACCOUNT_SIZES
    }
}

/// Decoded tick array or bin array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRecord {
    /// `TickArray` or `BinArray`
    pub kind: EntityKind,
    /// Owning pool
    pub parent: AccountKey,
    /// Start tick (tick arrays) or array index (bin arrays)
    pub start_index: i32,
    /// Number of initialized ticks / non-empty bins in the array
    pub initialized_count: u16,
}

impl ChildRecord {
    pub fn tick_array(parent: AccountKey, start_index: i32, initialized_count: u16) -> Self {
        Self {
            kind: EntityKind::TickArray,
            parent,
            start_index,
            initialized_count,
        }
    }

    pub fn bin_array(parent: AccountKey, index: i32, initialized_count: u16) -> Self {
        Self {
            kind: EntityKind::BinArray,
            parent,
            start_index: index,
            initialized_count,
        }
    }

    pub fn key(&self) -> ChildKey {
        ChildKey::new(self.parent, self.start_index)
    }
}

impl CacheValue for ChildRecord {
    fn entity_kind(&self) -> EntityKind {
        self.kind
    }

    fn valid_sizes(&self) -> &'static [usize] {
        match self.kind {
            EntityKind::TickArray => TICK_ARRAY_SIZES,
            EntityKind::BinArray => BIN_ARRAY_SIZES,
            // A child record tagged as a non-child kind can never be valid
            EntityKind::Pool | EntityKind::Vault => &[],
        }
    }
}
