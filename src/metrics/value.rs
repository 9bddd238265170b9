//! Counter and gauge instruments
//!
//! Both store an `f64` bit-cast into an `AtomicU64`. Updates are lock-free:
//! `set` is a plain store, additive updates are a compare-and-swap loop.

use crate::error::MetricsError;
use crate::metrics::family::Metric;
use crate::metrics::desc::MetricKind;
use crate::metrics::snapshot::SampleValue;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// An `f64` that can be shared and updated across threads without locking
#[derive(Debug, Default)]
pub(crate) struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub(crate) fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub(crate) fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn fetch_add(&self, delta: f64) {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Monotonically non-decreasing accumulator
///
/// Cloning yields another handle to the same value.
#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicF64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one
    pub fn inc(&self) {
        self.value.fetch_add(1.0);
    }

    /// Add `delta`, which must be non-negative
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::InvalidArgument` for negative or NaN deltas; the
    /// counter is left unchanged.
    pub fn add(&self, delta: f64) -> Result<(), MetricsError> {
        if !(delta >= 0.0) {
            return Err(MetricsError::InvalidArgument(format!(
                "counter cannot decrease, got delta {}",
                delta
            )));
        }
        self.value.fetch_add(delta);
        Ok(())
    }

    pub fn get(&self) -> f64 {
        self.value.load()
    }
}

impl Metric for Counter {
    type Config = ();
    const KIND: MetricKind = MetricKind::Counter;

    fn with_config(_: &()) -> Self {
        Self::new()
    }

    fn sample(&self) -> SampleValue {
        SampleValue::Counter(self.get())
    }
}

/// Freely settable point-in-time value
///
/// Cloning yields another handle to the same value.
#[derive(Debug, Clone, Default)]
pub struct Gauge {
    value: Arc<AtomicF64>,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: f64) {
        self.value.store(value);
    }

    pub fn add(&self, delta: f64) {
        self.value.fetch_add(delta);
    }

    pub fn sub(&self, delta: f64) {
        self.value.fetch_add(-delta);
    }

    pub fn inc(&self) {
        self.add(1.0);
    }

    pub fn dec(&self) {
        self.sub(1.0);
    }

    pub fn get(&self) -> f64 {
        self.value.load()
    }
}

impl Metric for Gauge {
    type Config = ();
    const KIND: MetricKind = MetricKind::Gauge;

    fn with_config(_: &()) -> Self {
        Self::new()
    }

    fn sample(&self) -> SampleValue {
        SampleValue::Gauge(self.get())
    }
}
