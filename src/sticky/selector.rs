//! Eligibility check for the peer named by the routing cookie.

use crate::backend::{Peer, TriedSet};

/// Result of checking a sticky candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Use the candidate.
    Accepted,
    /// Already attempted by this request; fall back silently.
    AlreadyTried,
    /// Down or failed; fall back to the balancer.
    Ineligible,
    /// Unusable and fallback is disabled; fail this attempt.
    Busy,
}

/// Decide whether the sticky candidate may serve this attempt.
///
/// `no_fallback` is the group setting; `effective_no_fallback` is the
/// request's flag and is raised as soon as a candidate is checked under
/// `no_fallback`, which disables the balancer for the rest of the request.
///
/// Failures older than `fail_timeout` (measured from `accessed`) are
/// forgiven by resetting `fails`. A candidate that is still failed is
/// marked in `tried` so no later attempt picks it again.
///
/// Must be called with the pool's write lock held.
pub fn validate(
    peer: &mut Peer,
    index: usize,
    tried: &mut TriedSet,
    no_fallback: bool,
    effective_no_fallback: &mut bool,
    now: u64,
) -> Verdict {
    if tried.test(index) {
        return Verdict::AlreadyTried;
    }

    if peer.down {
        if no_fallback {
            *effective_no_fallback = true;
            return Verdict::Busy;
        }
        return Verdict::Ineligible;
    }

    if no_fallback {
        *effective_no_fallback = true;

        if peer.window_elapsed(peer.accessed, now) {
            peer.fails = 0;
        }

        if peer.max_fails > 0 && peer.fails >= peer.max_fails {
            return Verdict::Busy;
        }
    }

    if peer.max_fails == 0 || peer.fails < peer.max_fails {
        return Verdict::Accepted;
    }

    if peer.window_elapsed(peer.accessed, now) {
        peer.fails = 0;
        return Verdict::Accepted;
    }

    tried.set(index);
    Verdict::Ineligible
}
