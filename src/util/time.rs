//! Wall-clock helpers.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp in seconds.
///
/// Peer bookkeeping (`checked`, `accessed`, `fail_timeout`) is kept at
/// second resolution.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}
