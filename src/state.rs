//! Shared application state.

use crate::backend::BackendRouter;
use crate::config::Config;
use crate::metrics::MetricsCollector;
use crate::sticky::GroupError;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::info;

/// State shared by every request handler.
///
/// The router is swapped atomically on reload. Requests already in flight
/// keep the upstream groups they started with; metrics survive reloads.
#[derive(Clone)]
pub struct AppState {
    router: Arc<ArcSwap<BackendRouter>>,
    metrics: MetricsCollector,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: &Config) -> Result<Self, GroupError> {
        let metrics = MetricsCollector::new();
        let router = BackendRouter::new(&config.upstreams, metrics.clone())?;

        Ok(Self {
            router: Arc::new(ArcSwap::from_pointee(router)),
            metrics,
        })
    }

    /// Get the current router.
    pub fn router(&self) -> arc_swap::Guard<Arc<BackendRouter>> {
        self.router.load()
    }

    /// Build a router for `config` and swap it in.
    ///
    /// On error the current router stays in place.
    pub fn reload(&self, config: &Config) -> Result<(), GroupError> {
        let router = BackendRouter::new(&config.upstreams, self.metrics.clone())?;
        self.router.store(Arc::new(router));
        info!(upstreams = config.upstreams.len(), "configuration reloaded");
        Ok(())
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }
}
