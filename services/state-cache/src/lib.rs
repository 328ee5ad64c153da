//! Ledger State Cache
//!
//! Keeps an in-memory, order-correct view of pool accounts and everything a
//! pool depends on, fed by a live account stream and a bootstrap fetcher:
//! - Per-key caches that only accept strictly newer `(slot, write_version)`
//! - An orphan buffer for child records that beat their parent pool
//! - A lifecycle oracle that freezes each pool's dependency set and gates
//!   it to ACTIVE only when every dependency is cached
//! - A health monitor whose circuit breaker tells execution to stand down
//!
//! # Architecture
//!
//! ```text
//!   Stream / Bootstrap updates
//!             │
//!        ┌────▼─────┐
//!        │Dispatcher│  ← schema check, routing, slot high-water mark
//!        └────┬─────┘
//!   ┌─────────┼──────────────┐
//!   │         │              │
//! ┌─▼───┐ ┌───▼────┐   ┌─────▼─────┐
//! │Pools│ │Vaults  │   │Orphan     │
//! └─┬───┘ │Children│   │Buffer     │
//!   │     └───▲────┘   └─────┬─────┘
//!   │         │  claim       │
//! ┌─▼─────────┴──────────────▼─┐
//! │      Lifecycle Oracle      │  ← freeze / activate / demote
//! └─────────────┬──────────────┘
//!               │
//!        ┌──────▼───────┐
//!        │Health Monitor│  → should_block_execution()
//!        └──────────────┘
//! ```
//!
//! Nothing here owns a timer: `Maintenance::tick` is driven externally,
//! by `runtime::run` in the service binary.

pub mod caches;
pub mod config;
pub mod dispatch;
pub mod health;
pub mod lifecycle;
pub mod maintenance;
pub mod memory;
pub mod metrics;
pub mod orphan;
pub mod runtime;
pub mod store;
pub mod system;
pub mod topology;

pub use system::StateCacheSystem;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
