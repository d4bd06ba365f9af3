//! Metrics collector using prometheus-client.
//!
//! Counts peer selections by outcome, routing cookies issued, and peer
//! failures reported back by the connection layer.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;
use std::net::SocketAddr;
use std::sync::Arc;

/// How a peer selection ended.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Outcome {
    /// The cookie's peer was used.
    Sticky,
    /// The balancer picked the peer.
    Fallback,
    /// No peer could be selected.
    Busy,
}

/// Labels for selection metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SelectionLabels {
    pub upstream: String,
    pub outcome: Outcome,
}

/// Labels for per-upstream metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct UpstreamLabels {
    pub upstream: String,
}

/// Labels for per-peer metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PeerLabels {
    pub upstream: String,
    pub peer: String,
}

/// Collects and stores all metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsCollectorInner>,
}

struct MetricsCollectorInner {
    selections_total: Family<SelectionLabels, Counter>,
    cookies_issued_total: Family<UpstreamLabels, Counter>,
    peer_failures_total: Family<PeerLabels, Counter>,
    registry: Registry,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let selections_total = Family::<SelectionLabels, Counter>::default();
        let cookies_issued_total = Family::<UpstreamLabels, Counter>::default();
        let peer_failures_total = Family::<PeerLabels, Counter>::default();

        registry.register(
            "stickylb_selections",
            "Total number of peer selections by outcome",
            selections_total.clone(),
        );
        registry.register(
            "stickylb_cookies_issued",
            "Total number of routing cookies issued",
            cookies_issued_total.clone(),
        );
        registry.register(
            "stickylb_peer_failures",
            "Total number of failed attempts reported for a peer",
            peer_failures_total.clone(),
        );

        Self {
            inner: Arc::new(MetricsCollectorInner {
                selections_total,
                cookies_issued_total,
                peer_failures_total,
                registry,
            }),
        }
    }

    /// Record the outcome of one selection attempt.
    pub fn record_selection(&self, upstream: &str, outcome: Outcome) {
        let labels = SelectionLabels {
            upstream: upstream.to_string(),
            outcome,
        };
        self.inner.selections_total.get_or_create(&labels).inc();
    }

    /// Record a routing cookie staged for the client.
    pub fn record_cookie(&self, upstream: &str) {
        let labels = UpstreamLabels {
            upstream: upstream.to_string(),
        };
        self.inner.cookies_issued_total.get_or_create(&labels).inc();
    }

    /// Record a failed attempt against a peer.
    pub fn record_peer_failure(&self, upstream: &str, peer: SocketAddr) {
        let labels = PeerLabels {
            upstream: upstream.to_string(),
            peer: peer.to_string(),
        };
        self.inner.peer_failures_total.get_or_create(&labels).inc();
    }

    /// Number of selections recorded for an upstream and outcome.
    pub fn selections(&self, upstream: &str, outcome: Outcome) -> u64 {
        let labels = SelectionLabels {
            upstream: upstream.to_string(),
            outcome,
        };
        self.inner.selections_total.get_or_create(&labels).get()
    }

    /// Render all metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.inner.registry)?;
        Ok(buffer)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector").finish_non_exhaustive()
    }
}
