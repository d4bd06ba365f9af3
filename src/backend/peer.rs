//! Peer records and their failure bookkeeping.

use crate::config::ServerConfig;
use std::net::SocketAddr;

/// Outcome reported by the connection layer when it is done with a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// The attempt completed normally.
    Succeeded,
    /// The attempt failed (connect error, timeout, bad response).
    Failed,
}

/// One backend peer.
///
/// Records live inside a [`PeerPool`](super::PeerPool) and are only
/// touched while the pool's lock is held. Timestamps are unix seconds.
#[derive(Debug, Clone)]
pub struct Peer {
    pub address: SocketAddr,
    /// Display name used in logs.
    pub name: String,

    pub weight: i64,
    pub effective_weight: i64,
    pub current_weight: i64,

    /// Active connections.
    pub conns: u32,
    pub max_conns: u32,

    pub fails: u32,
    pub max_fails: u32,
    /// Seconds.
    pub fail_timeout: u64,

    /// Last time the peer was (re)admitted after failures.
    pub checked: u64,
    /// Last time the peer failed.
    pub accessed: u64,

    pub down: bool,
}

impl Peer {
    /// Create a peer from its configuration.
    pub fn from_config(server: &ServerConfig) -> Self {
        let weight = i64::from(server.weight);
        Self {
            address: server.address,
            name: server.address.to_string(),
            weight,
            effective_weight: weight,
            current_weight: 0,
            conns: 0,
            max_conns: server.max_conns,
            fails: 0,
            max_fails: server.max_fails,
            fail_timeout: server.fail_timeout.as_secs(),
            checked: 0,
            accessed: 0,
            down: server.down,
        }
    }

    /// Whether more than `fail_timeout` seconds have passed since `since`.
    pub fn window_elapsed(&self, since: u64, now: u64) -> bool {
        now.saturating_sub(since) > self.fail_timeout
    }

    /// Failed `max_fails` times and the last check is still within the window.
    pub fn failed_recently(&self, now: u64) -> bool {
        self.max_fails > 0 && self.fails >= self.max_fails && !self.window_elapsed(self.checked, now)
    }

    /// Reached its connection cap.
    pub fn at_capacity(&self) -> bool {
        self.max_conns > 0 && self.conns >= self.max_conns
    }

    /// Eligible for algorithmic selection (ignoring the tried bitmap).
    pub fn is_available(&self, now: u64) -> bool {
        !self.down && !self.failed_recently(now) && !self.at_capacity()
    }

    /// Refresh `checked` once the previous check has gone stale.
    pub(crate) fn touch_checked(&mut self, now: u64) {
        if self.window_elapsed(self.checked, now) {
            self.checked = now;
        }
    }

    /// Account for a finished attempt.
    ///
    /// A failure bumps `fails`, stamps `accessed` and `checked`, and lowers
    /// `effective_weight` by `weight / max_fails` (never below zero). A
    /// success after a later check clears `fails`.
    pub fn release(&mut self, state: PeerState, now: u64) {
        match state {
            PeerState::Failed => {
                self.fails += 1;
                self.accessed = now;
                self.checked = now;

                if self.max_fails > 0 {
                    self.effective_weight -= self.weight / i64::from(self.max_fails);

                    if self.fails >= self.max_fails {
                        tracing::warn!(
                            peer = %self.name,
                            fails = self.fails,
                            "upstream peer temporarily disabled"
                        );
                    }
                }

                if self.effective_weight < 0 {
                    self.effective_weight = 0;
                }
            }
            PeerState::Succeeded => {
                if self.accessed < self.checked {
                    self.fails = 0;
                }
            }
        }

        self.conns = self.conns.saturating_sub(1);
    }
}
