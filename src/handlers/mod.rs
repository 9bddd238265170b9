//! HTTP request handlers for pondmetrics

use crate::metrics::Registry;
use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod metrics;

/// Application state shared across all handlers
///
/// Cloned per request; the registry sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    registry: Arc<Registry>,
}

impl AppState {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Get reference to the registry scraped by `/metrics`
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Build the HTTP router: `GET /metrics` with request tracing
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics::handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Opts;

    #[test]
    fn test_appstate_shares_registry() {
        let registry = Arc::new(Registry::new());
        let state = AppState::new(Arc::clone(&registry));
        let cloned = state.clone();

        registry.counter(Opts::new("c", "h")).unwrap();
        assert!(state.registry().contains("c"));
        assert!(cloned.registry().contains("c"));
    }
}
