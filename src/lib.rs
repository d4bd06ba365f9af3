//! stickylb - sticky-cookie peer selection for reverse proxies
//!
//! This crate decides which backend peer serves each attempt of a request:
//! - Session affinity through a routing cookie (index, hash, text or HMAC identities)
//! - Smooth weighted round-robin and weighted least-connections fallback
//! - Per-request tried bitmap so retries never repeat a peer
//! - Passive failure accounting with fail-timeout forgiveness
//! - Backup peer pools
//! - Prometheus metrics

pub mod backend;
pub mod config;
pub mod metrics;
pub mod state;
pub mod sticky;
pub mod util;

pub use config::Config;
