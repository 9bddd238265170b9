//! Streaming quantile estimation and the summary instrument
//!
//! `TargetedStream` implements the targeted-quantile variant of the
//! Cormode, Korn, Muthukrishnan and Srivastava algorithm ("Effective
//! Computation of Biased Quantiles over Data Streams", ICDE 2005). It keeps a
//! compressed list of `(value, width, delta)` tuples whose size is bounded by
//! the error targets rather than by the number of observations. Incoming
//! values are buffered and merged in sorted batches.
//!
//! Estimates are approximate. For a target `(q, e)` over `n` observations the
//! returned value has a rank within `e * n` of `q * n`. While fewer
//! observations than one buffer have been seen, answers are exact.
//!
//! `Summary` wraps several streams to get a sliding window: each stream is
//! reset in turn every `max_age / age_buckets`, and queries go to the oldest
//! one. `_sum` and `_count` are cumulative and never decay.

use crate::error::MetricsError;
use crate::metrics::desc::{MetricKind, Objective, SummaryOpts};
use crate::metrics::family::Metric;
use crate::metrics::snapshot::{SampleValue, SummarySnapshot};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Observations buffered before they are merged into the compressed list
const BUFFER_CAPACITY: usize = 500;

/// Share of each target's error the compressed list is built against; the
/// rest covers rank drift while a sorted batch is merged
const COMPRESSION_ERROR_SHARE: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
struct Tuple {
    value: f64,
    /// Rank difference to the previous tuple
    width: f64,
    /// Uncertainty of this tuple's rank
    delta: f64,
}

/// Compressed stream answering the configured target quantiles
#[derive(Debug, Clone)]
pub struct TargetedStream {
    targets: Arc<[Objective]>,
    /// Observations merged into `tuples`
    n: f64,
    tuples: Vec<Tuple>,
    buffer: Vec<f64>,
    buffer_sorted: bool,
}

impl TargetedStream {
    pub fn new(targets: Arc<[Objective]>) -> Self {
        Self {
            targets,
            n: 0.0,
            tuples: Vec::new(),
            buffer: Vec::with_capacity(BUFFER_CAPACITY),
            buffer_sorted: true,
        }
    }

    pub fn insert(&mut self, value: f64) {
        self.buffer.push(value);
        self.buffer_sorted = false;
        if self.buffer.len() == BUFFER_CAPACITY {
            self.flush();
        }
    }

    /// Number of observations seen since the last reset
    pub fn count(&self) -> u64 {
        self.n as u64 + self.buffer.len() as u64
    }

    pub fn reset(&mut self) {
        self.n = 0.0;
        self.tuples.clear();
        self.buffer.clear();
        self.buffer_sorted = true;
    }

    /// Estimate quantile `q`; `NaN` on an empty stream
    pub fn query(&mut self, q: f64) -> f64 {
        if self.tuples.is_empty() {
            // Nothing merged yet: answer exactly from the buffer
            if self.buffer.is_empty() {
                return f64::NAN;
            }
            self.sort_buffer();
            let len = self.buffer.len();
            let index = ((len as f64 * q).ceil() as usize).saturating_sub(1);
            return self.buffer[index.min(len - 1)];
        }

        self.flush();

        let mut target = (q * self.n).ceil();
        target += (self.invariant(target) / 2.0).ceil();

        let mut previous = self.tuples[0];
        let mut rank = 0.0;
        for current in &self.tuples[1..] {
            rank += previous.width;
            if rank + current.width + current.delta > target {
                return previous.value;
            }
            previous = *current;
        }
        previous.value
    }

    /// Allowed `width + delta` for a tuple at rank `r`
    fn invariant(&self, r: f64) -> f64 {
        let n = self.n;
        self.targets
            .iter()
            .map(|target| {
                let error = target.error * COMPRESSION_ERROR_SHARE;
                if target.quantile * n <= r {
                    2.0 * error * r / target.quantile
                } else {
                    2.0 * error * (n - r) / (1.0 - target.quantile)
                }
            })
            .fold(f64::MAX, f64::min)
    }

    fn sort_buffer(&mut self) {
        if !self.buffer_sorted {
            self.buffer.sort_by(f64::total_cmp);
            self.buffer_sorted = true;
        }
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        self.sort_buffer();
        let batch = std::mem::take(&mut self.buffer);
        self.merge(&batch);
        self.buffer = batch;
        self.buffer.clear();
    }

    /// Merge an ascending batch into the tuple list, then compress
    fn merge(&mut self, batch: &[f64]) {
        let mut rank = 0.0;
        let mut i = 0;
        for &value in batch {
            let mut inserted = false;
            while i < self.tuples.len() {
                let current = self.tuples[i];
                if current.value > value {
                    let delta = (self.invariant(rank).floor() - 1.0).max(0.0);
                    self.tuples.insert(
                        i,
                        Tuple {
                            value,
                            width: 1.0,
                            delta,
                        },
                    );
                    i += 1;
                    inserted = true;
                    break;
                }
                rank += current.width;
                i += 1;
            }
            if !inserted {
                // Beyond the current maximum: the rank is known exactly
                self.tuples.push(Tuple {
                    value,
                    width: 1.0,
                    delta: 0.0,
                });
                i += 1;
            }
            self.n += 1.0;
            rank += 1.0;
        }
        self.compress();
    }

    fn compress(&mut self) {
        if self.tuples.len() < 2 {
            return;
        }
        let mut last_index = self.tuples.len() - 1;
        let mut last = self.tuples[last_index];
        let mut rank = self.n - 1.0 - last.width;

        for i in (0..self.tuples.len() - 1).rev() {
            let current = self.tuples[i];
            if current.width + last.width + last.delta <= self.invariant(rank) {
                last.width += current.width;
                self.tuples[last_index] = last;
                self.tuples.remove(i);
                last_index -= 1;
            } else {
                last = current;
                last_index = i;
            }
            rank -= current.width;
        }
    }
}

/// Validated summary settings shared by every instance of a family
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryConfig {
    objectives: Arc<[Objective]>,
    max_age: Duration,
    age_buckets: u32,
}

impl SummaryConfig {
    /// Validate objectives and the decay window
    ///
    /// # Errors
    ///
    /// Quantiles must lie in (0, 1) and be distinct, error tolerances must be
    /// finite and non-negative, `max_age` and `age_buckets` must be non-zero.
    pub fn new(opts: &SummaryOpts) -> Result<Self, MetricsError> {
        let mut objectives = opts.objectives.clone();
        for objective in &objectives {
            if !(objective.quantile > 0.0 && objective.quantile < 1.0) {
                return Err(MetricsError::InvalidDescriptor(format!(
                    "summary quantile must lie in (0, 1), got {}",
                    objective.quantile
                )));
            }
            if !(objective.error >= 0.0) || !objective.error.is_finite() {
                return Err(MetricsError::InvalidDescriptor(format!(
                    "summary error tolerance must be finite and non-negative, got {} for quantile {}",
                    objective.error, objective.quantile
                )));
            }
        }
        objectives.sort_by(|a, b| a.quantile.total_cmp(&b.quantile));
        if let Some(pair) = objectives
            .windows(2)
            .find(|pair| pair[0].quantile == pair[1].quantile)
        {
            return Err(MetricsError::InvalidDescriptor(format!(
                "summary quantile {} is listed twice",
                pair[0].quantile
            )));
        }
        if opts.max_age.is_zero() {
            return Err(MetricsError::InvalidDescriptor(
                "summary max_age must be greater than zero".to_string(),
            ));
        }
        if opts.age_buckets == 0 {
            return Err(MetricsError::InvalidDescriptor(
                "summary age_buckets must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            objectives: objectives.into(),
            max_age: opts.max_age,
            age_buckets: opts.age_buckets,
        })
    }

    /// Objectives in ascending quantile order
    pub fn objectives(&self) -> &[Objective] {
        &self.objectives
    }

    fn stream_duration(&self) -> Duration {
        self.max_age / self.age_buckets
    }
}

#[derive(Debug)]
struct SummaryState {
    streams: Vec<TargetedStream>,
    head: usize,
    head_expires: Instant,
    sum: f64,
    count: u64,
}

impl SummaryState {
    /// Reset and advance the head stream for every rotation period that has elapsed
    fn rotate(&mut self, now: Instant, config: &SummaryConfig) {
        let period = config.stream_duration();
        if now < self.head_expires {
            return;
        }
        if now.duration_since(self.head_expires) >= config.max_age {
            // Idle for a whole window: every stream is stale
            for stream in &mut self.streams {
                stream.reset();
            }
            self.head_expires = now + period;
            return;
        }
        while now >= self.head_expires {
            self.streams[self.head].reset();
            self.head = (self.head + 1) % self.streams.len();
            self.head_expires += period;
        }
    }
}

#[derive(Debug)]
struct SummaryCore {
    config: SummaryConfig,
    state: Mutex<SummaryState>,
}

/// Summary instrument; cloning yields another handle to the same data
#[derive(Debug, Clone)]
pub struct Summary {
    core: Arc<SummaryCore>,
}

impl Summary {
    /// Standalone summary with validated options
    pub fn new(opts: &SummaryOpts) -> Result<Self, MetricsError> {
        Ok(Self::with_config_at(&SummaryConfig::new(opts)?, Instant::now()))
    }

    fn with_config_at(config: &SummaryConfig, now: Instant) -> Self {
        let streams = (0..config.age_buckets)
            .map(|_| TargetedStream::new(Arc::clone(&config.objectives)))
            .collect();
        Self {
            core: Arc::new(SummaryCore {
                config: config.clone(),
                state: Mutex::new(SummaryState {
                    streams,
                    head: 0,
                    head_expires: now + config.stream_duration(),
                    sum: 0.0,
                    count: 0,
                }),
            }),
        }
    }

    /// Record one observation
    pub fn observe(&self, value: f64) {
        self.observe_at(value, Instant::now());
    }

    fn observe_at(&self, value: f64, now: Instant) {
        let mut state = self.core.state.lock();
        state.rotate(now, &self.core.config);
        if !self.core.config.objectives.is_empty() {
            for stream in &mut state.streams {
                stream.insert(value);
            }
        }
        state.sum += value;
        state.count += 1;
    }

    /// Quantile estimates over the current window, plus cumulative sum and count
    pub fn snapshot(&self) -> SummarySnapshot {
        self.snapshot_at(Instant::now())
    }

    fn snapshot_at(&self, now: Instant) -> SummarySnapshot {
        let mut state = self.core.state.lock();
        state.rotate(now, &self.core.config);
        let head = state.head;
        let stream = &mut state.streams[head];
        let empty = stream.count() == 0;
        let quantiles = self
            .core
            .config
            .objectives
            .iter()
            .map(|objective| {
                let estimate = if empty {
                    f64::NAN
                } else {
                    stream.query(objective.quantile)
                };
                (objective.quantile, estimate)
            })
            .collect();

        SummarySnapshot {
            quantiles,
            sum: state.sum,
            count: state.count,
        }
    }
}

impl Metric for Summary {
    type Config = SummaryConfig;
    const KIND: MetricKind = MetricKind::Summary;

    fn with_config(config: &SummaryConfig) -> Self {
        Self::with_config_at(config, Instant::now())
    }

    fn sample(&self) -> SampleValue {
        SampleValue::Summary(self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    fn pond_opts() -> SummaryOpts {
        SummaryOpts::new("pond_temperature_celsius", "The temperature of the frog pond.")
            .objective(0.5, 0.05)
            .objective(0.9, 0.01)
            .objective(0.99, 0.001)
    }

    fn pond_targets() -> Arc<[Objective]> {
        SummaryConfig::new(&pond_opts()).unwrap().objectives
    }

    /// Smallest and largest values whose rank is within `slack * n` of `q * n`
    fn rank_bounds(sorted: &[f64], q: f64, slack: f64) -> (f64, f64) {
        let n = sorted.len() as f64;
        let lower = ((q - slack) * n).floor();
        let upper = ((q + slack) * n).ceil() as usize;
        let min = if lower > 1.0 {
            sorted[lower as usize - 1]
        } else {
            sorted[0]
        };
        let max = if upper < sorted.len() {
            sorted[upper.max(1) - 1]
        } else {
            sorted[sorted.len() - 1]
        };
        (min, max)
    }

    fn assert_within_tolerance(stream: &mut TargetedStream, values: &[f64]) {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        for target in pond_targets().iter() {
            let estimate = stream.query(target.quantile);
            let (min, max) = rank_bounds(&sorted, target.quantile, target.error);
            assert!(
                estimate >= min && estimate <= max,
                "q={} estimate={} not within [{}, {}] for n={}",
                target.quantile,
                estimate,
                min,
                max,
                values.len()
            );
        }
    }

    #[test]
    fn test_empty_stream_returns_nan() {
        let mut stream = TargetedStream::new(pond_targets());
        assert!(stream.query(0.5).is_nan());
        assert_eq!(stream.count(), 0);
    }

    #[test]
    fn test_small_stream_is_exact() {
        let mut stream = TargetedStream::new(pond_targets());
        for v in (1..=100).rev() {
            stream.insert(v as f64);
        }
        assert_eq!(stream.count(), 100);
        assert_eq!(stream.query(0.5), 50.0);
        assert_eq!(stream.query(0.9), 90.0);
        assert_eq!(stream.query(0.99), 99.0);
    }

    #[test]
    fn test_single_value_stream() {
        let mut stream = TargetedStream::new(pond_targets());
        stream.insert(42.0);
        for q in [0.5, 0.9, 0.99] {
            assert_eq!(stream.query(q), 42.0);
        }
    }

    #[test]
    fn test_uniform_random_streams_within_tolerance() {
        for seed in 0..200u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let n = rng.random_range(1_000..20_000);
            let values: Vec<f64> = (0..n).map(|_| rng.random::<f64>() * 100.0).collect();

            let mut stream = TargetedStream::new(pond_targets());
            for &v in &values {
                stream.insert(v);
            }
            assert_eq!(stream.count(), n as u64);
            assert_within_tolerance(&mut stream, &values);
        }
    }

    #[test]
    fn test_tail_quantile_within_tolerance_after_few_merges() {
        // A handful of merged batches is where the 0.99 target has the least room
        for n in (1_000..=3_000).step_by(37) {
            let mut rng = StdRng::seed_from_u64(n as u64);
            let values: Vec<f64> = (0..n).map(|_| rng.random::<f64>()).collect();

            let mut stream = TargetedStream::new(pond_targets());
            for &v in &values {
                stream.insert(v);
            }
            assert_within_tolerance(&mut stream, &values);
        }
    }

    #[test]
    fn test_shuffled_sequence_within_tolerance() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut values: Vec<f64> = (0..10_000).map(f64::from).collect();
        values.shuffle(&mut rng);

        let mut stream = TargetedStream::new(pond_targets());
        for &v in &values {
            stream.insert(v);
        }
        assert_within_tolerance(&mut stream, &values);
    }

    #[test]
    fn test_sine_wave_temperatures_within_tolerance() {
        let values: Vec<f64> = (0..1_000)
            .map(|i| 30.0 + (120.0 * (f64::from(i) * 0.1).sin()).floor() / 10.0)
            .collect();

        let mut stream = TargetedStream::new(pond_targets());
        for &v in &values {
            stream.insert(v);
        }
        assert_within_tolerance(&mut stream, &values);
    }

    #[test]
    fn test_compression_bounds_memory() {
        let mut stream = TargetedStream::new(pond_targets());
        for i in 0..100_000 {
            stream.insert(f64::from(i % 1_000));
        }
        stream.query(0.5);
        assert!(
            stream.tuples.len() < 25_000,
            "expected a compressed list, got {} tuples",
            stream.tuples.len()
        );
    }

    #[test]
    fn test_reset_clears_stream() {
        let mut stream = TargetedStream::new(pond_targets());
        for i in 0..1_000 {
            stream.insert(f64::from(i));
        }
        stream.reset();
        assert_eq!(stream.count(), 0);
        assert!(stream.query(0.5).is_nan());
    }

    #[test]
    fn test_summary_config_rejects_bad_objectives() {
        for (q, e) in [(0.0, 0.01), (1.0, 0.01), (-0.5, 0.01), (f64::NAN, 0.01), (0.5, -0.1)] {
            let opts = SummaryOpts::new("s", "h").objective(q, e);
            assert!(
                SummaryConfig::new(&opts).is_err(),
                "objective ({}, {}) should be rejected",
                q,
                e
            );
        }
        let opts = SummaryOpts::new("s", "h")
            .objective(0.5, 0.05)
            .objective(0.5, 0.01);
        assert!(SummaryConfig::new(&opts).is_err());
    }

    #[test]
    fn test_summary_config_rejects_bad_window() {
        let opts = pond_opts().max_age(Duration::ZERO);
        assert!(SummaryConfig::new(&opts).is_err());
        let opts = pond_opts().age_buckets(0);
        assert!(SummaryConfig::new(&opts).is_err());
    }

    #[test]
    fn test_summary_config_sorts_objectives() {
        let opts = SummaryOpts::new("s", "h")
            .objective(0.99, 0.001)
            .objective(0.5, 0.05);
        let config = SummaryConfig::new(&opts).unwrap();
        let quantiles: Vec<f64> = config.objectives().iter().map(|o| o.quantile).collect();
        assert_eq!(quantiles, vec![0.5, 0.99]);
    }

    #[test]
    fn test_summary_snapshot_tracks_sum_and_count() {
        let summary = Summary::new(&pond_opts()).unwrap();
        for v in 1..=100 {
            summary.observe(f64::from(v));
        }
        let snapshot = summary.snapshot();
        assert_eq!(snapshot.count, 100);
        assert_eq!(snapshot.sum, 5050.0);
        assert_eq!(
            snapshot.quantiles,
            vec![(0.5, 50.0), (0.9, 90.0), (0.99, 99.0)]
        );
    }

    #[test]
    fn test_empty_summary_reports_nan_quantiles() {
        let summary = Summary::new(&pond_opts()).unwrap();
        let snapshot = summary.snapshot();
        assert_eq!(snapshot.count, 0);
        assert_eq!(snapshot.quantiles.len(), 3);
        assert!(snapshot.quantiles.iter().all(|(_, v)| v.is_nan()));
    }

    #[test]
    fn test_summary_without_objectives_keeps_sum_and_count() {
        let summary = Summary::new(&SummaryOpts::new("s", "h")).unwrap();
        summary.observe(2.0);
        summary.observe(3.0);
        let snapshot = summary.snapshot();
        assert!(snapshot.quantiles.is_empty());
        assert_eq!(snapshot.sum, 5.0);
        assert_eq!(snapshot.count, 2);
    }

    #[test]
    fn test_summary_window_expires_but_totals_remain() {
        let config = SummaryConfig::new(
            &pond_opts()
                .max_age(Duration::from_secs(10))
                .age_buckets(5),
        )
        .unwrap();
        let base = Instant::now();
        let summary = Summary::with_config_at(&config, base);

        for v in 1..=100 {
            summary.observe_at(f64::from(v), base);
        }
        let fresh = summary.snapshot_at(base + Duration::from_secs(1));
        assert_eq!(fresh.quantiles[0], (0.5, 50.0));

        let stale = summary.snapshot_at(base + Duration::from_secs(11));
        assert!(stale.quantiles.iter().all(|(_, v)| v.is_nan()));
        assert_eq!(stale.count, 100);
        assert_eq!(stale.sum, 5050.0);
    }

    #[test]
    fn test_summary_window_slides_to_recent_observations() {
        let config = SummaryConfig::new(
            &pond_opts()
                .max_age(Duration::from_secs(10))
                .age_buckets(5),
        )
        .unwrap();
        let base = Instant::now();
        let summary = Summary::with_config_at(&config, base);

        for v in 1..=100 {
            summary.observe_at(f64::from(v), base);
        }
        for v in 1_000..1_100 {
            summary.observe_at(f64::from(v), base + Duration::from_secs(5));
        }

        // Both batches are still inside the window
        let mixed = summary.snapshot_at(base + Duration::from_secs(9));
        assert_eq!(mixed.quantiles[0], (0.5, 100.0));

        // The first batch has aged out
        let recent = summary.snapshot_at(base + Duration::from_secs(11));
        assert_eq!(recent.quantiles[0], (0.5, 1_049.0));
        assert_eq!(recent.count, 200);
    }

    #[test]
    fn test_summary_long_idle_resets_every_stream() {
        let config = SummaryConfig::new(&pond_opts()).unwrap();
        let base = Instant::now();
        let summary = Summary::with_config_at(&config, base);
        summary.observe_at(5.0, base);

        let later = base + Duration::from_secs(24 * 60 * 60);
        let snapshot = summary.snapshot_at(later);
        assert!(snapshot.quantiles[0].1.is_nan());

        summary.observe_at(7.0, later);
        let snapshot = summary.snapshot_at(later);
        assert_eq!(snapshot.quantiles[0], (0.5, 7.0));
        assert_eq!(snapshot.count, 2);
    }

    #[test]
    fn test_concurrent_summary_observations() {
        let summary = Summary::new(&pond_opts()).unwrap();
        let mut handles = Vec::new();
        for t in 0..4 {
            let summary = summary.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..2_500 {
                    summary.observe(f64::from(t * 2_500 + i));
                }
            }));
        }
        for handle in handles {
            handle.join().expect("thread should not panic");
        }
        let snapshot = summary.snapshot();
        assert_eq!(snapshot.count, 10_000);
        assert_eq!(snapshot.sum, (0..10_000).map(f64::from).sum::<f64>());
        let median = snapshot.quantiles[0].1;
        assert!((4_000.0..=6_000.0).contains(&median), "median {}", median);
    }
}
