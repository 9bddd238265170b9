//! Scrape endpoint
//!
//! Serves the registry in the text exposition format.

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
};

use crate::error::AppError;
use crate::handlers::AppState;
use crate::metrics::TextEncoder;

/// `GET /metrics`
///
/// # Response
///
/// - `200 OK` with every non-empty family, content type
///   `text/plain; version=0.0.4; charset=utf-8`
/// - `500 Internal Server Error` if encoding fails
///
/// # Example
///
/// ```bash
/// curl http://localhost:8080/metrics
/// # HELP worker_pool_completed_tasks_total Total number of tasks completed.
/// # TYPE worker_pool_completed_tasks_total counter
/// worker_pool_completed_tasks_total 42
/// ```
pub async fn handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let families = state.registry().snapshot();
    let encoder = TextEncoder::new();
    let body = encoder.encode_to_vec(&families).map_err(|e| {
        tracing::error!(
            error = %e,
            families = families.len(),
            "Failed to encode metrics for scrape"
        );
        AppError::Encode(e.to_string())
    })?;

    tracing::debug!(families = families.len(), bytes = body.len(), "Served scrape");
    Ok(([(header::CONTENT_TYPE, encoder.format_type())], body))
}
