//! Demo instruments and the simulated workload that drives them
//!
//! Three kinds of activity keep the scrape output interesting:
//!
//! - a queue loop that grows `our_company_blob_storage_ops_queued` every
//!   period and counts one completed task per period;
//! - two feeders that push a sine-shaped series of pond temperatures into a
//!   summary and a histogram, then log what the instruments saw;
//! - a seeded `job_in_queue{job_type}` gauge, set once at startup.
//!
//! All tasks watch one shutdown channel, so [`WorkloadHandle::shutdown`]
//! stops them promptly, including a queue loop that is mid-wait.

use crate::config::WorkloadConfig;
use crate::error::{AppResult, MetricsError};
use crate::metrics::{
    Counter, Family, Gauge, Histogram, HistogramOpts, Observe, Opts, Registry, Summary,
    SummaryOpts, linear_buckets,
};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// The five instruments the demo registers
#[derive(Debug, Clone)]
pub struct DemoMetrics {
    pub ops_queued: Gauge,
    pub jobs_in_queue: Family<Gauge>,
    pub completed_tasks: Counter,
    pub temperature_summary: Summary,
    pub temperature_histogram: Histogram,
}

impl DemoMetrics {
    /// Register every demo instrument with `registry`
    ///
    /// # Errors
    ///
    /// Fails if any of the names is already taken in this registry.
    pub fn register(registry: &Registry) -> Result<Self, MetricsError> {
        let ops_queued = registry.gauge(
            Opts::new(
                "ops_queued",
                "Number of blob storage operations waiting to be processed",
            )
            .namespace("our_company")
            .subsystem("blob_storage"),
        )?;

        let jobs_in_queue = registry.gauge_vec(
            Opts::new("job_in_queue", "Current number of jobs in the queue"),
            &["job_type"],
        )?;

        let completed_tasks = registry.counter(
            Opts::new("completed_tasks_total", "Total number of tasks completed.")
                .subsystem("worker_pool"),
        )?;

        let temperature_summary = registry.summary(
            SummaryOpts::new("pond_temperature_celsius", "The temperature of the frog pond.")
                .objective(0.5, 0.05)
                .objective(0.9, 0.01)
                .objective(0.99, 0.001),
        )?;

        let temperature_histogram = registry.histogram(
            HistogramOpts::new(
                "pond_temperature_histogram_celsius",
                "The temperature of the frog pond.",
            )
            .buckets(linear_buckets(20.0, 5.0, 5)?),
        )?;

        Ok(Self {
            ops_queued,
            jobs_in_queue,
            completed_tasks,
            temperature_summary,
            temperature_histogram,
        })
    }

    /// Add `count` jobs of `job_type` to the queue gauge
    pub fn seed_jobs(&self, job_type: &str, count: f64) -> Result<(), MetricsError> {
        self.jobs_in_queue.get_or_create(&[job_type])?.add(count);
        tracing::info!(job_type = %job_type, count, "Seeded job queue");
        Ok(())
    }
}

/// Temperature fed to the pond instruments for sample `i`
pub fn temperature_at(i: u32) -> f64 {
    30.0 + (120.0 * (f64::from(i) * 0.1).sin()).floor() / 10.0
}

/// Running workload tasks
#[derive(Debug)]
pub struct WorkloadHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl WorkloadHandle {
    /// Signal every task to stop and wait for all of them
    pub async fn shutdown(self) {
        // Receivers may already be gone if every task finished on its own
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Workload task ended abnormally");
            }
        }
        tracing::info!("Workload stopped");
    }
}

/// Register the demo instruments, seed the job queue and, when enabled, start the workload
///
/// Must be called inside a tokio runtime.
pub fn start(
    registry: &Registry,
    config: &WorkloadConfig,
) -> AppResult<(DemoMetrics, Option<WorkloadHandle>)> {
    let metrics = DemoMetrics::register(registry)?;
    metrics.seed_jobs(&config.seed_job_type, config.seed_job_count)?;

    if !config.enabled {
        tracing::info!("Simulated workload disabled");
        return Ok((metrics, None));
    }
    let handle = spawn(&metrics, config);
    Ok((metrics, Some(handle)))
}

/// Start the queue loop and both temperature feeders
///
/// Must be called inside a tokio runtime.
pub fn spawn(metrics: &DemoMetrics, config: &WorkloadConfig) -> WorkloadHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let queue = tokio::spawn(run_queue(
        metrics.ops_queued.clone(),
        metrics.completed_tasks.clone(),
        config.ops_increment,
        config.ops_interval(),
        shutdown_rx.clone(),
    ));

    let summary = {
        let summary = metrics.temperature_summary.clone();
        let shutdown_rx = shutdown_rx.clone();
        let samples = config.temperature_samples;
        tokio::spawn(async move {
            let fed = feed_temperatures(&summary, samples, &shutdown_rx).await;
            let snapshot = summary.snapshot();
            tracing::info!(
                metric = "pond_temperature_celsius",
                fed,
                count = snapshot.count,
                sum = snapshot.sum,
                quantiles = ?snapshot.quantiles,
                "Summary state after feeding temperatures"
            );
        })
    };

    let histogram = {
        let histogram = metrics.temperature_histogram.clone();
        let samples = config.temperature_samples;
        tokio::spawn(async move {
            let fed = feed_temperatures(&histogram, samples, &shutdown_rx).await;
            let snapshot = histogram.snapshot();
            tracing::info!(
                metric = "pond_temperature_histogram_celsius",
                fed,
                count = snapshot.count,
                sum = snapshot.sum,
                buckets = ?snapshot.buckets,
                "Histogram state after feeding temperatures"
            );
        })
    };

    tracing::info!(
        ops_interval_ms = config.ops_interval_ms,
        ops_increment = config.ops_increment,
        temperature_samples = config.temperature_samples,
        "Workload started"
    );

    WorkloadHandle {
        shutdown_tx,
        tasks: vec![queue, summary, histogram],
    }
}

async fn run_queue(
    ops_queued: Gauge,
    completed_tasks: Counter,
    increment: f64,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    while !*shutdown.borrow() {
        ops_queued.add(increment);
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            // A dropped sender also means stop
            _ = shutdown.changed() => break,
        }
        completed_tasks.inc();
    }
    tracing::debug!("Queue loop stopped");
}

/// Observe `samples` temperatures, stopping early on shutdown; returns how many were fed
async fn feed_temperatures<O: Observe>(
    instrument: &O,
    samples: u32,
    shutdown: &watch::Receiver<bool>,
) -> u32 {
    for i in 0..samples {
        if *shutdown.borrow() {
            return i;
        }
        instrument.observe(temperature_at(i));
        if i % 100 == 99 {
            tokio::task::yield_now().await;
        }
    }
    samples
}
