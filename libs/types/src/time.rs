//! Wall-clock helpers
//!
//! The cache never reads the clock on its own; callers pass `now` in Unix
//! milliseconds so sweeps stay deterministic under test.

use chrono::Utc;

/// Current wall-clock time in Unix milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_millis_is_after_2024() {
        // 2024-01-01T00:00:00Z
        assert!(now_millis() > 1_704_067_200_000);
    }
}
