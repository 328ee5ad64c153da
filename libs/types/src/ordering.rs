//! Ordering metadata attached to every stored value
//!
//! Ledger updates are totally ordered per key by `(slot, write_version)`.
//! Wall-clock time is recorded for diagnostics only and never participates
//! in ordering decisions.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Ledger sequence number
pub type Slot = u64;

/// Tie-breaker within a slot, monotonic per source
pub type WriteVersion = u64;

/// Which data source produced an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateSource {
    /// Authoritative live account stream
    Stream,
    /// Slower snapshot fetcher, only trusted before an entity is frozen
    Bootstrap,
}

impl UpdateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateSource::Stream => "stream",
            UpdateSource::Bootstrap => "bootstrap",
        }
    }
}

impl fmt::Display for UpdateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordering key of a single observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub slot: Slot,
    pub write_version: WriteVersion,
}

impl Version {
    pub fn new(slot: Slot, write_version: WriteVersion) -> Self {
        Self {
            slot,
            write_version,
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.slot
            .cmp(&other.slot)
            .then(self.write_version.cmp(&other.write_version))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Metadata stored alongside every cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingMetadata {
    pub slot: Slot,
    pub write_version: WriteVersion,
    /// Observed payload size in bytes
    pub data_len: usize,
    pub source: UpdateSource,
    /// Capture time, Unix milliseconds
    pub updated_at: i64,
}

impl OrderingMetadata {
    pub fn new(
        slot: Slot,
        write_version: WriteVersion,
        data_len: usize,
        source: UpdateSource,
        updated_at: i64,
    ) -> Self {
        Self {
            slot,
            write_version,
            data_len,
            source,
            updated_at,
        }
    }

    pub fn version(&self) -> Version {
        Version::new(self.slot, self.write_version)
    }

    /// Whether an observation carrying `self` may replace one carrying `existing`.
    ///
    /// Strictly newer wins; an equal pair is a replay and loses.
    pub fn supersedes(&self, existing: &OrderingMetadata) -> bool {
        self.version() > existing.version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(slot: Slot, wv: WriteVersion) -> OrderingMetadata {
        OrderingMetadata::new(slot, wv, 165, UpdateSource::Stream, 0)
    }

    #[test]
    fn test_higher_slot_supersedes() {
        assert!(meta(101, 0).supersedes(&meta(100, 50)));
        assert!(!meta(99, 500).supersedes(&meta(100, 0)));
    }

    #[test]
    fn test_write_version_breaks_ties() {
        assert!(meta(100, 6).supersedes(&meta(100, 5)));
        assert!(!meta(100, 5).supersedes(&meta(100, 6)));
    }

    #[test]
    fn test_equal_version_does_not_supersede() {
        assert!(!meta(100, 5).supersedes(&meta(100, 5)));
    }

    #[test]
    fn test_source_is_ignored_for_ordering() {
        let stream = meta(100, 1);
        let bootstrap = OrderingMetadata::new(100, 2, 165, UpdateSource::Bootstrap, i64::MAX);
        assert!(bootstrap.supersedes(&stream));
        assert!(!stream.supersedes(&bootstrap));
    }

    #[test]
    fn test_update_source_serde_lowercase() {
        let json = serde_json::to_string(&UpdateSource::Bootstrap).unwrap();
        assert_eq!(json, "\"bootstrap\"");
    }

    proptest::proptest! {
        #[test]
        fn prop_exactly_one_direction_or_equal(
            a in (0u64..20, 0u64..20),
            b in (0u64..20, 0u64..20),
        ) {
            let (x, y) = (meta(a.0, a.1), meta(b.0, b.1));
            let forward = x.supersedes(&y);
            let backward = y.supersedes(&x);
            proptest::prop_assert!(!(forward && backward));
            proptest::prop_assert_eq!(!forward && !backward, a == b);
        }
    }
}
