//! Cookie-based session affinity.
//!
//! A sticky upstream remembers which peer served a client in a routing
//! cookie. On the next request the cookie is matched against the peers'
//! identities; if the named peer is still usable it serves the request,
//! otherwise the upstream's balancer picks a peer and a new cookie is
//! issued.

mod cookie;
mod digest;
mod group;
mod matcher;
mod selector;
mod session;

pub use cookie::{CookieSink, SetCookie, find_cookie};
pub use digest::{DigestError, DigestTable};
pub use group::{GroupError, UpstreamGroup};
pub use matcher::match_route;
pub use selector::{Verdict, validate};
pub use session::StickyRequest;
