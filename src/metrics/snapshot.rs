//! Point-in-time views of registered metrics
//!
//! The registry produces these; the encoder consumes them. They own their
//! data, so no lock is held while a snapshot is being rendered.

use crate::metrics::desc::MetricKind;

/// State of one summary instance
#[derive(Debug, Clone, PartialEq)]
pub struct SummarySnapshot {
    /// `(quantile, estimate)` pairs in ascending quantile order
    pub quantiles: Vec<(f64, f64)>,
    pub sum: f64,
    pub count: u64,
}

/// State of one histogram instance
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    /// `(upper_bound, cumulative_count)` pairs; the last bound is `+Inf`
    pub buckets: Vec<(f64, u64)>,
    pub sum: f64,
    pub count: u64,
}

/// Rendered value of a single instance
#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    Counter(f64),
    Gauge(f64),
    Summary(SummarySnapshot),
    Histogram(HistogramSnapshot),
}

/// One instance of a family: its label values and its value
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub label_values: Vec<String>,
    pub value: SampleValue,
}

/// All instances of one family, in first-seen order
#[derive(Debug, Clone, PartialEq)]
pub struct FamilySnapshot {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub label_names: Vec<String>,
    pub samples: Vec<Sample>,
}

impl FamilySnapshot {
    /// Find the sample for an exact label tuple
    pub fn sample(&self, label_values: &[&str]) -> Option<&SampleValue> {
        self.samples
            .iter()
            .find(|sample| {
                sample.label_values.len() == label_values.len()
                    && sample
                        .label_values
                        .iter()
                        .zip(label_values)
                        .all(|(have, want)| have == want)
            })
            .map(|sample| &sample.value)
    }
}
