//! Types library for the ledger state cache
//!
//! This library provides the core type definitions shared by the cache and
//! its collaborators (stream transport, bootstrap fetcher, execution engine).
//!
//! # Modules
//! - `ids`: Ledger account keys and child-record keys
//! - `ordering`: `(slot, write_version)` ordering metadata
//! - `entity`: Decoded entity values and their payload schemas
//! - `update`: Upstream account-update event
//! - `time`: Wall-clock helper
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod ordering;
pub mod entity;
pub mod update;
pub mod time;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::ordering::*;
    pub use crate::entity::*;
    pub use crate::update::*;
    pub use crate::time::*;
    pub use crate::errors::*;
}
