//! In-process metrics
//!
//! Counters, gauges, summaries and histograms, grouped into labelled
//! families inside a [`Registry`], and rendered by [`TextEncoder`].
//!
//! ```
//! use pondmetrics::metrics::{Opts, Registry, TextEncoder};
//!
//! let registry = Registry::new();
//! let completed = registry
//!     .counter(Opts::new("worker_pool_completed_tasks_total", "Tasks completed."))
//!     .unwrap();
//! completed.inc();
//!
//! let body = TextEncoder::new().encode_to_vec(&registry.snapshot()).unwrap();
//! assert!(String::from_utf8(body).unwrap().contains("worker_pool_completed_tasks_total 1\n"));
//! ```

pub mod desc;
pub mod encoder;
pub mod family;
pub mod histogram;
pub mod quantile;
pub mod registry;
pub mod snapshot;
pub mod value;

pub use desc::{Desc, HistogramOpts, MetricKind, Objective, Opts, SummaryOpts};
pub use encoder::{CONTENT_TYPE, TextEncoder};
pub use family::{Family, Metric};
pub use histogram::{Histogram, exponential_buckets, linear_buckets};
pub use quantile::Summary;
pub use registry::Registry;
pub use snapshot::{FamilySnapshot, HistogramSnapshot, Sample, SampleValue, SummarySnapshot};
pub use value::{Counter, Gauge};

/// Instruments that record individual observations
pub trait Observe: Send + Sync {
    fn observe(&self, value: f64);
}

impl Observe for Histogram {
    fn observe(&self, value: f64) {
        Histogram::observe(self, value);
    }
}

impl Observe for Summary {
    fn observe(&self, value: f64) {
        Summary::observe(self, value);
    }
}
