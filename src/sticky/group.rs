//! Per-upstream sticky state built at load time.

use crate::backend::PeerPool;
use crate::config::{Algorithm, StickyConfig, UpstreamConfig};
use crate::sticky::cookie::find_cookie;
use crate::sticky::digest::{DigestError, DigestTable};
use crate::sticky::session::StickyRequest;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors building an upstream group.
#[derive(Debug, Error)]
pub enum GroupError {
    #[error("upstream '{0}' has no primary server")]
    NoPrimary(String),

    #[error("upstream '{upstream}': {source}")]
    Digest {
        upstream: String,
        #[source]
        source: DigestError,
    },
}

/// An upstream with its peer pool and, when configured, sticky routing.
///
/// Immutable once built; every request holds an `Arc` to the group it
/// started on.
#[derive(Debug)]
pub struct UpstreamGroup {
    name: String,
    pool: Arc<PeerPool>,
    algorithm: Algorithm,
    sticky: Option<StickyConfig>,
    digests: Option<DigestTable>,
    sticky_enabled: bool,
}

impl UpstreamGroup {
    /// Build the pool and digest table of an upstream.
    ///
    /// Sticky routing is disabled for a single-peer pool: no digest table
    /// is built, no cookie is read or written, and requests go straight to
    /// the configured algorithm.
    pub fn build(config: &UpstreamConfig) -> Result<Self, GroupError> {
        let pool = PeerPool::from_servers(&config.name, &config.servers)
            .ok_or_else(|| GroupError::NoPrimary(config.name.clone()))?;

        let sticky_enabled = config.sticky.is_some() && pool.number() > 1 && !pool.is_single();

        let digests = match &config.sticky {
            Some(sticky) if sticky_enabled => DigestTable::build(&sticky.identity, pool.addresses())
                .map_err(|source| GroupError::Digest {
                    upstream: config.name.clone(),
                    source,
                })?,
            _ => None,
        };

        if config.sticky.is_some() && !sticky_enabled {
            debug!(upstream = %config.name, "single peer upstream, sticky routing disabled");
        }

        info!(
            upstream = %config.name,
            peers = pool.number(),
            backup = pool.backup().map_or(0, |b| b.number()),
            algorithm = %config.algorithm(),
            sticky = sticky_enabled,
            "upstream group ready"
        );

        Ok(Self {
            name: config.name.clone(),
            pool,
            algorithm: config.algorithm(),
            sticky: config.sticky.clone(),
            digests,
            sticky_enabled,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The primary pool.
    pub fn pool(&self) -> &Arc<PeerPool> {
        &self.pool
    }

    /// Fallback algorithm.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn sticky(&self) -> Option<&StickyConfig> {
        self.sticky.as_ref()
    }

    pub fn digests(&self) -> Option<&DigestTable> {
        self.digests.as_ref()
    }

    /// Whether requests read and write routing cookies.
    pub fn sticky_enabled(&self) -> bool {
        self.sticky_enabled
    }

    /// Cookie value naming primary peer `index`.
    pub fn cookie_value(&self, index: usize) -> Option<String> {
        if !self.sticky_enabled {
            return None;
        }
        match &self.digests {
            Some(digests) => digests.get(index).map(str::to_string),
            None => (index < self.pool.number()).then(|| index.to_string()),
        }
    }

    /// Start a request, reading the routing cookie from its `Cookie` headers.
    pub fn begin<'a, I>(self: &Arc<Self>, headers: I) -> StickyRequest
    where
        I: IntoIterator<Item = &'a str>,
    {
        let route = match &self.sticky {
            Some(sticky) if self.sticky_enabled => find_cookie(headers, &sticky.cookie_name),
            _ => None,
        };
        StickyRequest::new(Arc::clone(self), route)
    }
}
