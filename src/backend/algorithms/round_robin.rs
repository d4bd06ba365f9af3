//! Smooth weighted round-robin load balancing algorithm.

use super::{Busy, LoadBalancer};
use crate::backend::peer::Peer;
use crate::backend::pool::{PeerData, SelectedPeer};
use crate::backend::tried::TriedSet;
use tracing::debug;

/// Smooth weighted round-robin load balancer.
///
/// Every eligible peer gains its effective weight each round; the peer with
/// the highest running weight wins and pays back the round's total. With
/// weights 5, 1, 1 this yields `a a b a c a a`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundRobin;

impl RoundRobin {
    /// Create a new round-robin load balancer.
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for RoundRobin {
    fn name(&self) -> &'static str {
        "rr"
    }

    fn select(&self, data: &mut PeerData, now: u64) -> Result<SelectedPeer, Busy> {
        let pool = data.pool().clone();
        let mut peers = pool.write();

        if pool.is_single() {
            if data.tried().test(0) || !peers[0].is_available(now) {
                debug!(pool = %pool.name(), "single peer unavailable");
                return Err(Busy::Exhausted);
            }
            return Ok(data.accept(&mut peers, 0));
        }

        if let Some(index) = best_weighted(&mut peers, data.tried(), now) {
            let selected = data.accept(&mut peers, index);
            debug!(pool = %pool.name(), peer = %selected.name, "round-robin selected peer");
            return Ok(selected);
        }

        drop(peers);

        if data.switch_to_backup() {
            return self.select(data, now);
        }

        debug!(pool = %pool.name(), "no round-robin peer available");
        Err(Busy::Exhausted)
    }
}

/// One smooth weighted round over the untried, available peers.
fn best_weighted(peers: &mut [Peer], tried: &TriedSet, now: u64) -> Option<usize> {
    let mut best: Option<usize> = None;
    let mut total = 0;

    for i in 0..peers.len() {
        if tried.test(i) || !peers[i].is_available(now) {
            continue;
        }

        let peer = &mut peers[i];
        peer.current_weight += peer.effective_weight;
        total += peer.effective_weight;

        if peer.effective_weight < peer.weight {
            peer.effective_weight += 1;
        }

        if best.is_none_or(|b| peers[i].current_weight > peers[b].current_weight) {
            best = Some(i);
        }
    }

    let best = best?;
    peers[best].current_weight -= total;
    peers[best].touch_checked(now);

    Some(best)
}
