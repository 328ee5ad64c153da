//! Identifier types for ledger entities
//!
//! Every account on the ledger is addressed by a 32-byte key. Keys render
//! and parse as base58, which is how upstream transports and operators
//! refer to them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::KeyParseError;

/// 32-byte ledger account address
///
/// Serializes as a base58 string so captured update streams stay readable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountKey([u8; AccountKey::LEN]);

impl AccountKey {
    pub const LEN: usize = 32;

    /// Wrap raw address bytes
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Deterministic key for tests and fixtures: every byte set to `seed`
    pub const fn from_seed(seed: u8) -> Self {
        Self([seed; 32])
    }

    /// Short form for log fields (first 8 base58 characters)
    pub fn short(&self) -> String {
        let full = self.to_string();
        full.chars().take(8).collect()
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountKey({})", self)
    }
}

impl FromStr for AccountKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = bs58::decode(s)
            .into_vec()
            .map_err(|e| KeyParseError::InvalidBase58(e.to_string()))?;
        let bytes: [u8; Self::LEN] = decoded
            .try_into()
            .map_err(|v: Vec<u8>| KeyParseError::InvalidLength(v.len()))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for AccountKey {
    type Error = KeyParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccountKey> for String {
    fn from(key: AccountKey) -> Self {
        key.to_string()
    }
}

impl From<[u8; 32]> for AccountKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Key of a child record: the owning pool plus the array's start index
///
/// The ledger address of a tick or bin array is derived from exactly these
/// two values, so the pair identifies the record without a second lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChildKey {
    pub parent: AccountKey,
    pub start_index: i32,
}

impl ChildKey {
    pub fn new(parent: AccountKey, start_index: i32) -> Self {
        Self {
            parent,
            start_index,
        }
    }
}

impl fmt::Display for ChildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.parent, self.start_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_key_base58_roundtrip() {
        let key = AccountKey::from_seed(7);
        let rendered = key.to_string();
        let parsed: AccountKey = rendered.parse().unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn test_account_key_serializes_as_string() {
        let key = AccountKey::from_seed(1);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key));

        let back: AccountKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_account_key_rejects_wrong_length() {
        let short = bs58::encode([1u8; 16]).into_string();
        let err = short.parse::<AccountKey>().unwrap_err();
        assert_eq!(err, KeyParseError::InvalidLength(16));
    }

    #[test]
    fn test_account_key_rejects_invalid_alphabet() {
        // '0' is not part of the base58 alphabet
        assert!(matches!(
            "0000".parse::<AccountKey>(),
            Err(KeyParseError::InvalidBase58(_))
        ));
    }

    #[test]
    fn test_child_key_ordering_groups_by_parent() {
        let a = ChildKey::new(AccountKey::from_seed(1), 60);
        let b = ChildKey::new(AccountKey::from_seed(1), -60);
        let c = ChildKey::new(AccountKey::from_seed(2), -600);
        let mut keys = vec![c, a, b];
        keys.sort();
        assert_eq!(keys, vec![b, a, c]);
    }
}
