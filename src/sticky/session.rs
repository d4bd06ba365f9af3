//! Per-request sticky peer selection.

use crate::backend::algorithms::{Busy, balancer};
use crate::backend::{PeerData, PeerState, SelectedPeer, TriedSet};
use crate::config::Algorithm;
use crate::metrics::{MetricsCollector, Outcome};
use crate::sticky::cookie::{CookieSink, SetCookie};
use crate::sticky::group::UpstreamGroup;
use crate::sticky::matcher::match_route;
use crate::sticky::selector::{Verdict, validate};
use crate::util::{RequestId, current_timestamp};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// Selection state of one request across all of its attempts.
///
/// The routing cookie is matched once, when the request starts. Each call
/// to [`get_peer`](Self::get_peer) is one attempt; the connection layer
/// reports how it went with [`free_peer`](Self::free_peer) before asking
/// again.
#[derive(Debug)]
pub struct StickyRequest {
    group: Arc<UpstreamGroup>,
    data: PeerData,
    /// Primary peer named by the cookie, consumed by the first attempt.
    selected_peer: Option<usize>,
    /// Raised once the cookie's peer was checked under `no_fallback`.
    no_fallback: bool,
    /// Algorithm that served the last fallback selection.
    lb_alg: Option<Algorithm>,
    cookie: Option<SetCookie>,
    request_id: RequestId,
    metrics: Option<MetricsCollector>,
}

impl StickyRequest {
    /// Start a request on `group` with the routing cookie value, if any.
    pub fn new(group: Arc<UpstreamGroup>, route: Option<&str>) -> Self {
        let selected_peer = match group.sticky() {
            Some(sticky) if group.sticky_enabled() => match_route(
                route,
                &sticky.identity,
                group.digests(),
                group.pool().number(),
            ),
            _ => None,
        };

        Self {
            data: PeerData::new(Arc::clone(group.pool())),
            group,
            selected_peer,
            no_fallback: false,
            lb_alg: None,
            cookie: None,
            request_id: RequestId::default(),
            metrics: None,
        }
    }

    /// Use the caller's request ID in log fields.
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    /// Record selections in `metrics`.
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Select a peer for the next attempt.
    pub fn get_peer(&mut self) -> Result<SelectedPeer, Busy> {
        self.get_peer_at(current_timestamp())
    }

    /// Select a peer for the next attempt, at unix time `now`.
    pub fn get_peer_at(&mut self, now: u64) -> Result<SelectedPeer, Busy> {
        debug!(
            request_id = %self.request_id,
            upstream = %self.group.name(),
            candidate = ?self.selected_peer,
            no_fallback = self.no_fallback,
            "getting sticky peer"
        );

        if let Some(index) = self.selected_peer.take() {
            match self.try_sticky(index, now) {
                Ok(Some(selected)) => {
                    self.record(Outcome::Sticky);
                    return Ok(selected);
                }
                Ok(None) => {}
                Err(busy) => {
                    self.record(Outcome::Busy);
                    return Err(busy);
                }
            }
        }

        self.fallback(now)
    }

    /// Check the cookie's peer and hand it out if it may serve this attempt.
    fn try_sticky(&mut self, index: usize, now: u64) -> Result<Option<SelectedPeer>, Busy> {
        let pool = Arc::clone(self.data.pool());
        if pool.is_single() || self.data.is_backup() {
            return Ok(None);
        }

        let configured = self.group.sticky().is_some_and(|s| s.no_fallback);
        let mut peers = pool.write();
        let Some(peer) = peers.get_mut(index) else {
            return Ok(None);
        };

        let verdict = validate(
            peer,
            index,
            self.data.tried_mut(),
            configured,
            &mut self.no_fallback,
            now,
        );

        match verdict {
            Verdict::Accepted => {
                let selected = self.data.accept(&mut peers, index);
                debug!(
                    request_id = %self.request_id,
                    upstream = %self.group.name(),
                    peer = %selected.name,
                    index,
                    "using sticky peer"
                );
                Ok(Some(selected))
            }
            Verdict::Busy => {
                info!(
                    request_id = %self.request_id,
                    upstream = %self.group.name(),
                    peer = %peers[index].name,
                    "sticky peer unavailable and no_fallback is set"
                );
                Err(Busy::NoFallback)
            }
            Verdict::AlreadyTried | Verdict::Ineligible => {
                debug!(
                    request_id = %self.request_id,
                    upstream = %self.group.name(),
                    index,
                    ?verdict,
                    "sticky peer not usable, falling back"
                );
                Ok(None)
            }
        }
    }

    fn fallback(&mut self, now: u64) -> Result<SelectedPeer, Busy> {
        if self.no_fallback {
            info!(
                request_id = %self.request_id,
                upstream = %self.group.name(),
                "no fallback in action"
            );
            self.record(Outcome::Busy);
            return Err(Busy::NoFallback);
        }

        let algorithm = self.group.algorithm();
        self.lb_alg = Some(algorithm);

        let balancer = balancer(algorithm);

        let selected = match balancer.select(&mut self.data, now) {
            Ok(selected) => selected,
            Err(busy) => {
                debug!(
                    request_id = %self.request_id,
                    upstream = %self.group.name(),
                    algorithm = balancer.name(),
                    "fallback found no peer"
                );
                self.record(Outcome::Busy);
                return Err(busy);
            }
        };

        self.record(Outcome::Fallback);
        self.stage_cookie(&selected);
        Ok(selected)
    }

    /// Stage the cookie naming a peer chosen by the balancer.
    fn stage_cookie(&mut self, selected: &SelectedPeer) {
        let Some(sticky) = self.group.sticky().filter(|_| self.group.sticky_enabled()) else {
            return;
        };

        // Cookies name primary peers; a backup peer only gets one when it
        // also appears in the primary pool.
        let index = if selected.backup {
            self.group.pool().position(selected.address)
        } else {
            Some(selected.index)
        };

        let Some(value) = index.and_then(|i| self.group.cookie_value(i)) else {
            debug!(
                request_id = %self.request_id,
                upstream = %self.group.name(),
                peer = %selected.name,
                "selected peer has no routing cookie"
            );
            return;
        };

        debug!(
            request_id = %self.request_id,
            upstream = %self.group.name(),
            cookie = %sticky.cookie_name,
            value = %value,
            "set routing cookie"
        );

        self.cookie = Some(SetCookie::new(sticky, value));
        if let Some(metrics) = &self.metrics {
            metrics.record_cookie(self.group.name());
        }
    }

    /// Report the outcome of the current attempt.
    pub fn free_peer(&mut self, state: PeerState) -> Option<SocketAddr> {
        self.free_peer_at(state, current_timestamp())
    }

    /// Report the outcome of the current attempt, at unix time `now`.
    pub fn free_peer_at(&mut self, state: PeerState, now: u64) -> Option<SocketAddr> {
        let address = self.data.free(state, now)?;

        debug!(
            request_id = %self.request_id,
            upstream = %self.group.name(),
            peer = %address,
            ?state,
            "free sticky peer"
        );

        if state == PeerState::Failed {
            if let Some(metrics) = &self.metrics {
                metrics.record_peer_failure(self.group.name(), address);
            }
        }
        Some(address)
    }

    /// Take the staged routing cookie, if a balancer selection produced one.
    pub fn take_cookie(&mut self) -> Option<SetCookie> {
        self.cookie.take()
    }

    /// Deliver the staged routing cookie to `sink`.
    ///
    /// Returns whether a cookie was written.
    pub fn write_cookie(&mut self, sink: &mut impl CookieSink) -> bool {
        match self.cookie.take() {
            Some(cookie) => {
                sink.set_cookie(cookie);
                true
            }
            None => false,
        }
    }

    pub fn group(&self) -> &Arc<UpstreamGroup> {
        &self.group
    }

    /// Primary peer named by the cookie, until an attempt consumes it.
    pub fn selected_peer(&self) -> Option<usize> {
        self.selected_peer
    }

    /// Whether fallback has been disabled for the rest of the request.
    pub fn no_fallback(&self) -> bool {
        self.no_fallback
    }

    /// Algorithm used by the last fallback selection.
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.lb_alg
    }

    pub fn tried(&self) -> &TriedSet {
        self.data.tried()
    }

    /// Whether attempts now go to the backup pool.
    pub fn is_backup(&self) -> bool {
        self.data.is_backup()
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    fn record(&self, outcome: Outcome) {
        if let Some(metrics) = &self.metrics {
            metrics.record_selection(self.group.name(), outcome);
        }
    }
}
