//! Error types for the state cache
//!
//! Comprehensive error taxonomy using thiserror. Only genuine faults live
//! here: a stale write or an incomplete activation is an expected outcome
//! and is reported as data, not as an error.

use thiserror::Error;

use crate::entity::EntityKind;
use crate::ids::AccountKey;

/// Failure to parse a base58 account key
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyParseError {
    #[error("invalid base58: {0}")]
    InvalidBase58(String),

    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// Cache write faults
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Payload size outside the declared set for the entity kind
    #[error("schema violation for {kind}: data length {data_len} not in {expected:?}")]
    SchemaViolation {
        kind: EntityKind,
        data_len: usize,
        expected: &'static [usize],
    },

    /// Value routed to a store of a different entity kind
    #[error("kind mismatch: {store} store received a {value} value")]
    KindMismatch { store: EntityKind, value: EntityKind },
}

/// Lifecycle oracle faults
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Freeze requested before the entity's own value is cached
    #[error("cannot freeze {0}: entity has no cached value")]
    ParentNotCached(AccountKey),

    /// Cached value lacks the fields the dependency set is computed from
    #[error("cannot freeze {key}: undefined topology ({reason})")]
    UndefinedTopology { key: AccountKey, reason: String },

    #[error("unknown entity: {0}")]
    UnknownEntity(AccountKey),

    /// Activation requested for an entity that was never frozen
    #[error("entity {0} has not been frozen")]
    NotFrozen(AccountKey),
}

/// Configuration loading faults
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
