//! Request identifiers for correlating selection logs.
//!
//! Every peer-selection session carries one so that the log lines of all
//! its attempts can be grouped together.

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Counter for short request IDs.
static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identifier of one request's selection session.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Create a new random (UUID v4) request ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a counter-based request ID, unique within this process.
    ///
    /// Format: `req-{counter}` with the counter zero-padded to 16 hex digits.
    pub fn short() -> Self {
        let count = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("req-{:016x}", count))
    }

    /// Reuse an identifier assigned by the host (e.g. an `X-Request-Id` header).
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the request ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::short()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
