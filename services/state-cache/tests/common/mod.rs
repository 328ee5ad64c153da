//! Update builders shared by the integration tests

#![allow(dead_code)]

use state_cache::config::StateCacheConfig;
use state_cache::memory::FixedProbe;
use state_cache::StateCacheSystem;
use types::entity::{ChildRecord, EntityKind, PoolState, VaultBalance, Venue};
use types::ids::AccountKey;
use types::ordering::UpdateSource;
use types::update::{AccountUpdate, UpdatePayload};

pub const T0: i64 = 1_708_123_456_789;

pub const MINT_BASE: u8 = 200;
pub const MINT_QUOTE: u8 = 201;

pub fn key(seed: u8) -> AccountKey {
    AccountKey::from_seed(seed)
}

pub fn make_system(config: StateCacheConfig) -> StateCacheSystem {
    StateCacheSystem::with_probe(config, Box::new(FixedProbe(Some(64.0))), T0)
}

pub fn make_pumpswap_update(pool: u8, vaults: (u8, u8), slot: u64) -> AccountUpdate {
    AccountUpdate {
        kind: EntityKind::Pool,
        key: key(pool),
        payload: UpdatePayload::Pool(PoolState::pumpswap(
            key(MINT_BASE),
            key(MINT_QUOTE),
            key(vaults.0),
            key(vaults.1),
        )),
        slot,
        write_version: 0,
        data_len: 211,
        source: UpdateSource::Stream,
    }
}

pub fn make_clmm_update(pool: u8, vaults: (u8, u8), tick: i32, spacing: u16, slot: u64) -> AccountUpdate {
    let mut state = PoolState::pumpswap(key(MINT_BASE), key(MINT_QUOTE), key(vaults.0), key(vaults.1));
    state.venue = Venue::RaydiumClmm;
    state.active_index = Some(tick);
    state.index_spacing = Some(spacing);
    AccountUpdate {
        kind: EntityKind::Pool,
        key: key(pool),
        payload: UpdatePayload::Pool(state),
        slot,
        write_version: 0,
        data_len: 1544,
        source: UpdateSource::Stream,
    }
}

pub fn make_vault_update(vault: u8, amount: u64, slot: u64, write_version: u64) -> AccountUpdate {
    AccountUpdate {
        kind: EntityKind::Vault,
        key: key(vault),
        payload: UpdatePayload::Vault(VaultBalance {
            mint: key(MINT_BASE),
            owner: key(250),
            amount,
        }),
        slot,
        write_version,
        data_len: 165,
        source: UpdateSource::Stream,
    }
}

pub fn make_tick_update(pool: u8, start: i32, slot: u64) -> AccountUpdate {
    AccountUpdate {
        kind: EntityKind::TickArray,
        key: key(255),
        payload: UpdatePayload::Child(ChildRecord::tick_array(key(pool), start, 1)),
        slot,
        write_version: 0,
        data_len: 10240,
        source: UpdateSource::Stream,
    }
}
