//! pondmetrics - in-process metrics registry with a text exposition endpoint
//!
//! Applications register counters, gauges, summaries and histograms in a
//! [`metrics::Registry`], update them from any thread, and expose a
//! consistent snapshot at `GET /metrics` for pull-based collectors.

pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod telemetry;
pub mod workload;
