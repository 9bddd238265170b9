//! Fixed-bucket histogram
//!
//! Bucket bounds are supplied once at construction and never change. Counts
//! are exact: every observation lands in the first bucket whose upper bound is
//! `>=` the value, and the snapshot turns the per-bucket counts into the
//! cumulative form the exposition format expects. Counts, sum and total are
//! updated under one short critical section, so a snapshot never sees a
//! bucket total that disagrees with `_count`.

use crate::error::MetricsError;
use crate::metrics::desc::MetricKind;
use crate::metrics::family::Metric;
use crate::metrics::snapshot::{HistogramSnapshot, SampleValue};
use parking_lot::Mutex;
use std::sync::Arc;

/// `count` buckets starting at `start`, each `width` wide
///
/// # Errors
///
/// Fails when `count` is zero or `width` is not a positive finite number.
pub fn linear_buckets(start: f64, width: f64, count: usize) -> Result<Vec<f64>, MetricsError> {
    if count < 1 {
        return Err(MetricsError::InvalidArgument(
            "linear_buckets needs a positive count".to_string(),
        ));
    }
    if !(width > 0.0) || !width.is_finite() {
        return Err(MetricsError::InvalidArgument(format!(
            "linear_buckets needs a positive finite width, got {}",
            width
        )));
    }
    let mut buckets = Vec::with_capacity(count);
    let mut bound = start;
    for _ in 0..count {
        buckets.push(bound);
        bound += width;
    }
    Ok(buckets)
}

/// `count` buckets where the first is `start` and each next one is `factor` times the previous
///
/// # Errors
///
/// Fails when `count` is zero, `start` is not positive, or `factor` is not greater than one.
pub fn exponential_buckets(
    start: f64,
    factor: f64,
    count: usize,
) -> Result<Vec<f64>, MetricsError> {
    if count < 1 {
        return Err(MetricsError::InvalidArgument(
            "exponential_buckets needs a positive count".to_string(),
        ));
    }
    if !(start > 0.0) {
        return Err(MetricsError::InvalidArgument(format!(
            "exponential_buckets needs a positive start, got {}",
            start
        )));
    }
    if !(factor > 1.0) {
        return Err(MetricsError::InvalidArgument(format!(
            "exponential_buckets needs a factor greater than 1, got {}",
            factor
        )));
    }
    let mut buckets = Vec::with_capacity(count);
    let mut bound = start;
    for _ in 0..count {
        buckets.push(bound);
        bound *= factor;
    }
    Ok(buckets)
}

/// Validated, strictly increasing upper bounds (excluding the implicit `+Inf`)
#[derive(Debug, Clone, PartialEq)]
pub struct Buckets(Arc<[f64]>);

impl Buckets {
    /// Validate caller-supplied bounds
    ///
    /// A trailing `+Inf` is dropped because that bucket is always present.
    ///
    /// # Errors
    ///
    /// Fails when no finite bound remains, a bound is NaN, or the bounds are
    /// not strictly increasing.
    pub fn new(mut bounds: Vec<f64>) -> Result<Self, MetricsError> {
        if bounds.last() == Some(&f64::INFINITY) {
            bounds.pop();
        }
        if bounds.is_empty() {
            return Err(MetricsError::InvalidDescriptor(
                "histogram needs at least one bucket bound".to_string(),
            ));
        }
        if bounds.iter().any(|bound| bound.is_nan()) {
            return Err(MetricsError::InvalidDescriptor(
                "histogram bucket bounds cannot be NaN".to_string(),
            ));
        }
        if let Some(pair) = bounds.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(MetricsError::InvalidDescriptor(format!(
                "histogram bucket bounds must be strictly increasing, got {} then {}",
                pair[0], pair[1]
            )));
        }
        Ok(Self(bounds.into()))
    }

    pub fn bounds(&self) -> &[f64] {
        &self.0
    }
}

#[derive(Debug)]
struct HistogramState {
    /// Non-cumulative counts, one per bound plus the `+Inf` bucket
    counts: Vec<u64>,
    sum: f64,
    count: u64,
}

#[derive(Debug)]
struct HistogramCore {
    buckets: Buckets,
    state: Mutex<HistogramState>,
}

/// Histogram instrument; cloning yields another handle to the same data
#[derive(Debug, Clone)]
pub struct Histogram {
    core: Arc<HistogramCore>,
}

impl Histogram {
    /// Standalone histogram with validated bounds
    pub fn new(bounds: Vec<f64>) -> Result<Self, MetricsError> {
        Ok(Self::with_buckets(&Buckets::new(bounds)?))
    }

    fn with_buckets(buckets: &Buckets) -> Self {
        let slots = buckets.bounds().len() + 1;
        Self {
            core: Arc::new(HistogramCore {
                buckets: buckets.clone(),
                state: Mutex::new(HistogramState {
                    counts: vec![0; slots],
                    sum: 0.0,
                    count: 0,
                }),
            }),
        }
    }

    /// Record one observation
    pub fn observe(&self, value: f64) {
        let bounds = self.core.buckets.bounds();
        let index = if value.is_nan() {
            bounds.len()
        } else {
            bounds.partition_point(|bound| *bound < value)
        };

        let mut state = self.core.state.lock();
        state.counts[index] += 1;
        state.sum += value;
        state.count += 1;
    }

    /// Cumulative bucket counts, sum and count
    pub fn snapshot(&self) -> HistogramSnapshot {
        let (counts, sum, count) = {
            let state = self.core.state.lock();
            (state.counts.clone(), state.sum, state.count)
        };

        let mut cumulative = 0;
        let buckets = self
            .core
            .buckets
            .bounds()
            .iter()
            .copied()
            .chain(std::iter::once(f64::INFINITY))
            .zip(counts)
            .map(|(bound, in_bucket)| {
                cumulative += in_bucket;
                (bound, cumulative)
            })
            .collect();

        HistogramSnapshot {
            buckets,
            sum,
            count,
        }
    }
}

impl Metric for Histogram {
    type Config = Buckets;
    const KIND: MetricKind = MetricKind::Histogram;

    fn with_config(buckets: &Buckets) -> Self {
        Self::with_buckets(buckets)
    }

    fn sample(&self) -> SampleValue {
        SampleValue::Histogram(self.snapshot())
    }
}
