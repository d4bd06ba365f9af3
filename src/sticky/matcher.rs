//! Resolving a routing cookie to a peer index.

use crate::config::Identity;
use crate::sticky::digest::DigestTable;
use tracing::{debug, warn};

/// Find the peer a routing cookie names.
///
/// Digest modes compare the cookie against the digest table; index mode
/// expects a decimal index below `peer_count`. Anything that does not
/// resolve yields `None` and the request falls back to the balancer.
pub fn match_route(
    route: Option<&str>,
    identity: &Identity,
    digests: Option<&DigestTable>,
    peer_count: usize,
) -> Option<usize> {
    let Some(route) = route else {
        debug!("route cookie not found");
        return None;
    };

    debug!(route, "got route cookie, looking for a matching peer");

    let matched = if identity.uses_digest() {
        let Some(digests) = digests else {
            warn!("digest table has not been built, ignoring route cookie");
            return None;
        };
        digests.find(route).filter(|&index| index < peer_count)
    } else {
        match parse_index(route) {
            Some(index) if index < peer_count => Some(index),
            Some(_) => None,
            None => {
                warn!(route, "unable to convert the route to an integer value");
                return None;
            }
        }
    };

    match matched {
        Some(index) => debug!(route, index, "route matches peer"),
        None => debug!(route, "route doesn't match any peer, ignoring it"),
    }

    matched
}

/// Non-negative decimal integer, digits only.
fn parse_index(route: &str) -> Option<usize> {
    if route.is_empty() || !route.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    route.parse().ok()
}
