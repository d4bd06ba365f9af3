//! Peer pools and load balancing algorithms.

pub mod algorithms;
mod peer;
mod pool;
mod router;
mod tried;

pub use algorithms::{Busy, LoadBalancer};
pub use peer::{Peer, PeerState};
pub use pool::{PeerData, PeerPool, SelectedPeer};
pub use router::BackendRouter;
pub use tried::TriedSet;
