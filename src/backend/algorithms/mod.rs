//! Load balancing algorithms.

mod least_conn;
mod round_robin;

pub use least_conn::LeastConnections;
pub use round_robin::RoundRobin;

use crate::backend::pool::{PeerData, SelectedPeer};
use crate::config::Algorithm;
use thiserror::Error;

/// No peer can take the request right now.
///
/// This is a normal outcome; the caller typically answers with a gateway
/// error or retries at a higher layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Busy {
    /// Every peer (including backups) is tried, down, failed or full.
    #[error("no eligible upstream peer")]
    Exhausted,
    /// The sticky peer is unusable and fallback is disabled.
    #[error("sticky peer unavailable and fallback is disabled")]
    NoFallback,
}

/// Trait for load balancing algorithms.
pub trait LoadBalancer: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Select the next peer for this request.
    ///
    /// Takes the active pool's write lock for the duration of the scan,
    /// skips peers already set in the request's tried bitmap, and moves the
    /// request to the backup pool when the active pool has no eligible peer.
    fn select(&self, data: &mut PeerData, now: u64) -> Result<SelectedPeer, Busy>;
}

/// The balancer implementing an algorithm.
pub fn balancer(algorithm: Algorithm) -> &'static dyn LoadBalancer {
    static ROUND_ROBIN: RoundRobin = RoundRobin;
    static LEAST_CONNECTIONS: LeastConnections = LeastConnections;

    match algorithm {
        Algorithm::RoundRobin => &ROUND_ROBIN,
        Algorithm::LeastConnections => &LEAST_CONNECTIONS,
    }
}
