//! Routes requests to upstream groups by name.

use crate::config::UpstreamConfig;
use crate::metrics::MetricsCollector;
use crate::sticky::{GroupError, StickyRequest, UpstreamGroup};
use crate::util::RequestId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// All upstream groups of one configuration.
pub struct BackendRouter {
    /// Map of upstream name to group.
    upstreams: HashMap<String, Arc<UpstreamGroup>>,
    metrics: MetricsCollector,
}

impl BackendRouter {
    /// Build every upstream group of the configuration.
    pub fn new(upstreams: &[UpstreamConfig], metrics: MetricsCollector) -> Result<Self, GroupError> {
        let mut map = HashMap::with_capacity(upstreams.len());

        for upstream in upstreams {
            let group = UpstreamGroup::build(upstream)?;
            map.insert(upstream.name.clone(), Arc::new(group));
        }

        info!(upstreams = map.len(), "backend router built");

        Ok(Self {
            upstreams: map,
            metrics,
        })
    }

    /// Start a request on an upstream.
    ///
    /// `cookie_headers` are the request's `Cookie` header values. Returns
    /// `None` when the upstream does not exist.
    pub fn begin<'a, I>(&self, upstream: &str, cookie_headers: I) -> Option<StickyRequest>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let Some(group) = self.upstreams.get(upstream) else {
            warn!(upstream, "unknown upstream");
            return None;
        };

        Some(
            group
                .begin(cookie_headers)
                .with_request_id(RequestId::new())
                .with_metrics(self.metrics.clone()),
        )
    }

    /// Get an upstream group.
    pub fn group(&self, upstream: &str) -> Option<&Arc<UpstreamGroup>> {
        self.upstreams.get(upstream)
    }

    /// Upstream names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.upstreams.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }
}
