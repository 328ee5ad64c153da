//! Upstream account-update event
//!
//! Both the live stream and the bootstrap fetcher hand the cache this same
//! shape. There is no ordering guarantee across keys; per key and per source
//! `(slot, write_version)` is monotonic.

use serde::{Deserialize, Serialize};

use crate::entity::{ChildRecord, EntityKind, PoolState, VaultBalance};
use crate::ids::AccountKey;
use crate::ordering::{OrderingMetadata, Slot, UpdateSource, WriteVersion};

/// Decoded payload of an account update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdatePayload {
    Pool(PoolState),
    Vault(VaultBalance),
    Child(ChildRecord),
}

impl UpdatePayload {
    /// Entity kind the payload decodes as
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            UpdatePayload::Pool(_) => EntityKind::Pool,
            UpdatePayload::Vault(_) => EntityKind::Vault,
            UpdatePayload::Child(record) => record.kind,
        }
    }
}

/// One observation of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdate {
    /// Kind the transport classified this account as
    pub kind: EntityKind,
    /// Ledger address of the account
    pub key: AccountKey,
    pub payload: UpdatePayload,
    pub slot: Slot,
    pub write_version: WriteVersion,
    /// Raw account data length in bytes
    pub data_len: usize,
    pub source: UpdateSource,
}

impl AccountUpdate {
    /// Ordering metadata for this update, stamped with the capture time.
    pub fn metadata(&self, now: i64) -> OrderingMetadata {
        OrderingMetadata::new(
            self.slot,
            self.write_version,
            self.data_len,
            self.source,
            now,
        )
    }

    /// Label for log fields
    pub fn kind_label(&self) -> &'static str {
        self.kind.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_kind() {
        let child = UpdatePayload::Child(ChildRecord::bin_array(AccountKey::from_seed(1), 2, 0));
        assert_eq!(child.entity_kind(), EntityKind::BinArray);

        let vault = UpdatePayload::Vault(VaultBalance {
            mint: AccountKey::from_seed(2),
            owner: AccountKey::from_seed(3),
            amount: 10,
        });
        assert_eq!(vault.entity_kind(), EntityKind::Vault);
    }

    #[test]
    fn test_update_json_shape() {
        let update = AccountUpdate {
            kind: EntityKind::Vault,
            key: AccountKey::from_seed(9),
            payload: UpdatePayload::Vault(VaultBalance {
                mint: AccountKey::from_seed(2),
                owner: AccountKey::from_seed(3),
                amount: 1_000,
            }),
            slot: 250_000_000,
            write_version: 7,
            data_len: 165,
            source: UpdateSource::Stream,
        };

        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["kind"], "vault");
        assert_eq!(json["payload"]["type"], "vault");
        assert_eq!(json["source"], "stream");

        let back: AccountUpdate = serde_json::from_value(json).unwrap();
        assert_eq!(back, update);
    }

    #[test]
    fn test_metadata_carries_ordering_fields() {
        let update = AccountUpdate {
            kind: EntityKind::TickArray,
            key: AccountKey::from_seed(5),
            payload: UpdatePayload::Child(ChildRecord::tick_array(AccountKey::from_seed(1), 0, 1)),
            slot: 42,
            write_version: 3,
            data_len: 10240,
            source: UpdateSource::Bootstrap,
        };
        let meta = update.metadata(1_700_000_000_000);
        assert_eq!(meta.slot, 42);
        assert_eq!(meta.write_version, 3);
        assert_eq!(meta.data_len, 10240);
        assert_eq!(meta.source, UpdateSource::Bootstrap);
        assert_eq!(meta.updated_at, 1_700_000_000_000);
    }
}
