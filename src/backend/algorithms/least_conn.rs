//! Weighted least-connections load balancing algorithm.

use super::{Busy, LoadBalancer, RoundRobin};
use crate::backend::peer::Peer;
use crate::backend::pool::{PeerData, SelectedPeer};
use crate::backend::tried::TriedSet;
use tracing::debug;

/// Weighted least-connections load balancer.
///
/// Sends requests to the peer with the lowest `conns / weight`. Peers tied
/// for the best ratio are separated with a smooth weighted round-robin
/// round, so equally loaded peers still share traffic by weight.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastConnections;

impl LeastConnections {
    /// Create a new least-connections load balancer.
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for LeastConnections {
    fn name(&self) -> &'static str {
        "lc"
    }

    fn select(&self, data: &mut PeerData, now: u64) -> Result<SelectedPeer, Busy> {
        if data.pool().is_single() {
            return RoundRobin.select(data, now);
        }

        let pool = data.pool().clone();
        let mut peers = pool.write();

        let Some(best) = least_loaded(&mut peers, data.tried(), now) else {
            drop(peers);
            debug!(pool = %pool.name(), "no least-connections peer found");

            if data.switch_to_backup() {
                return self.select(data, now);
            }
            return Err(Busy::Exhausted);
        };

        peers[best].touch_checked(now);
        let selected = data.accept(&mut peers, best);

        debug!(
            pool = %pool.name(),
            peer = %selected.name,
            conns = peers[best].conns,
            "least-connections selected peer"
        );

        Ok(selected)
    }
}

fn eligible(peer: &Peer, index: usize, tried: &TriedSet, now: u64) -> bool {
    !tried.test(index) && peer.is_available(now)
}

/// `a` carries strictly less load per unit of weight than `b`.
fn less_loaded(a: &Peer, b: &Peer) -> bool {
    i64::from(a.conns) * b.weight < i64::from(b.conns) * a.weight
}

fn same_load(a: &Peer, b: &Peer) -> bool {
    i64::from(a.conns) * b.weight == i64::from(b.conns) * a.weight
}

/// Index of the least loaded eligible peer, after the tie-break round.
fn least_loaded(peers: &mut [Peer], tried: &TriedSet, now: u64) -> Option<usize> {
    let mut best: Option<usize> = None;
    let mut many = false;

    for (i, peer) in peers.iter().enumerate() {
        if !eligible(peer, i, tried, now) {
            continue;
        }

        match best {
            Some(b) if !less_loaded(peer, &peers[b]) => {
                if same_load(peer, &peers[b]) {
                    many = true;
                }
            }
            _ => {
                best = Some(i);
                many = false;
            }
        }
    }

    let first = best?;
    if !many {
        return Some(first);
    }

    debug!("several peers share the least load, breaking the tie");

    let reference = peers[first].clone();
    let mut winner = first;
    let mut total = 0;

    for i in first..peers.len() {
        if !eligible(&peers[i], i, tried, now) || !same_load(&peers[i], &reference) {
            continue;
        }

        let peer = &mut peers[i];
        peer.current_weight += peer.effective_weight;
        total += peer.effective_weight;

        if peer.effective_weight < peer.weight {
            peer.effective_weight += 1;
        }

        if peers[i].current_weight > peers[winner].current_weight {
            winner = i;
        }
    }

    peers[winner].current_weight -= total;
    Some(winner)
}
