//! Peer pools and per-request round-robin data.

use crate::backend::peer::{Peer, PeerState};
use crate::backend::tried::TriedSet;
use crate::config::ServerConfig;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::net::SocketAddr;
use std::sync::Arc;

/// An ordered set of peers shared by every request to an upstream.
///
/// Peer counters are mutated only through [`PeerPool::write`]; the guard
/// is held for one scan or update and never across calls.
#[derive(Debug)]
pub struct PeerPool {
    name: String,
    peers: RwLock<Vec<Peer>>,
    /// Immutable copy of the addresses, readable without the lock.
    addresses: Vec<SocketAddr>,
    single: bool,
    backup: Option<Arc<PeerPool>>,
}

impl PeerPool {
    /// Create a pool from peer records.
    ///
    /// A pool is `single` when it has exactly one peer and no backup pool.
    pub fn new(name: impl Into<String>, peers: Vec<Peer>, backup: Option<Arc<PeerPool>>) -> Self {
        let addresses = peers.iter().map(|p| p.address).collect();
        let single = peers.len() == 1 && backup.is_none();
        Self {
            name: name.into(),
            peers: RwLock::new(peers),
            addresses,
            single,
            backup,
        }
    }

    /// Create a backup pool. It is never `single`, so its peers keep
    /// failure accounting and the tried bitmap applies to them.
    pub fn new_backup(name: impl Into<String>, peers: Vec<Peer>) -> Self {
        Self {
            single: false,
            ..Self::new(name, peers, None)
        }
    }

    /// Build the primary pool of an upstream and, if any server is marked
    /// `backup`, its backup pool.
    ///
    /// Returns `None` when there is no primary server.
    pub fn from_servers(name: &str, servers: &[ServerConfig]) -> Option<Arc<Self>> {
        let (backup, primary): (Vec<&ServerConfig>, Vec<&ServerConfig>) =
            servers.iter().partition(|s| s.backup);

        if primary.is_empty() {
            return None;
        }

        let backup = (!backup.is_empty()).then(|| {
            let peers = backup.into_iter().map(Peer::from_config).collect();
            Arc::new(PeerPool::new_backup(format!("{name} (backup)"), peers))
        });

        let peers = primary.into_iter().map(Peer::from_config).collect();
        Some(Arc::new(PeerPool::new(name, peers, backup)))
    }

    /// Pool name, used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of peers.
    pub fn number(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_single(&self) -> bool {
        self.single
    }

    pub fn backup(&self) -> Option<&Arc<PeerPool>> {
        self.backup.as_ref()
    }

    pub fn addresses(&self) -> &[SocketAddr] {
        &self.addresses
    }

    /// Index of the peer with this address.
    pub fn position(&self, address: SocketAddr) -> Option<usize> {
        self.addresses.iter().position(|a| *a == address)
    }

    /// Acquire the pool's write lock.
    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<Peer>> {
        self.peers.write()
    }

    /// Acquire the pool's read lock.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<Peer>> {
        self.peers.read()
    }

    /// Copy of one peer's current state.
    pub fn snapshot(&self, index: usize) -> Option<Peer> {
        self.read().get(index).cloned()
    }
}

/// A peer handed to the connection layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedPeer {
    /// Index within the pool it was selected from.
    pub index: usize,
    pub address: SocketAddr,
    pub name: String,
    /// Selected from the backup pool.
    pub backup: bool,
}

/// Round-robin peer data owned by one request.
///
/// Tracks the pool currently in use (primary, then possibly backup), the
/// tried bitmap for that pool, and the peer most recently handed out.
#[derive(Debug)]
pub struct PeerData {
    primary: Arc<PeerPool>,
    active: Arc<PeerPool>,
    tried: TriedSet,
    current: Option<usize>,
}

impl PeerData {
    /// Start a request on the primary pool.
    pub fn new(primary: Arc<PeerPool>) -> Self {
        let bits = primary
            .backup()
            .map_or(primary.number(), |b| b.number().max(primary.number()));
        Self {
            active: Arc::clone(&primary),
            primary,
            tried: TriedSet::new(bits),
            current: None,
        }
    }

    /// The pool selections are currently made from.
    pub fn pool(&self) -> &Arc<PeerPool> {
        &self.active
    }

    pub fn is_backup(&self) -> bool {
        !Arc::ptr_eq(&self.active, &self.primary)
    }

    pub fn tried(&self) -> &TriedSet {
        &self.tried
    }

    pub fn tried_mut(&mut self) -> &mut TriedSet {
        &mut self.tried
    }

    /// Index of the last peer handed out, in the active pool.
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub(crate) fn set_current(&mut self, index: usize) {
        self.current = Some(index);
    }

    /// Move to the backup pool with a cleared bitmap.
    ///
    /// Returns `false` when already on the backup pool or none exists.
    pub fn switch_to_backup(&mut self) -> bool {
        if self.is_backup() {
            return false;
        }

        let Some(backup) = self.primary.backup().cloned() else {
            return false;
        };

        tracing::debug!(pool = %self.primary.name(), "switching to backup peers");
        self.tried.reset(backup.number());
        self.active = backup;
        self.current = None;
        true
    }

    /// Mark a peer of the active pool as handed out.
    pub(crate) fn accept(&mut self, peers: &mut [Peer], index: usize) -> SelectedPeer {
        let peer = &mut peers[index];
        peer.conns += 1;
        self.current = Some(index);
        self.tried.set(index);

        SelectedPeer {
            index,
            address: peer.address,
            name: peer.name.clone(),
            backup: self.is_backup(),
        }
    }

    /// Report the outcome of the attempt on the current peer.
    ///
    /// Returns the address of the released peer, if one was handed out.
    pub fn free(&mut self, state: PeerState, now: u64) -> Option<SocketAddr> {
        let index = self.current.take()?;

        let mut peers = self.active.write();
        let peer = peers.get_mut(index)?;
        if self.active.is_single() {
            peer.conns = peer.conns.saturating_sub(1);
        } else {
            peer.release(state, now);
        }
        Some(peer.address)
    }
}
