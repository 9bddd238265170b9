//! Command-line interface for pondmetrics

use clap::{Parser, Subcommand};

/// Metrics registry demo exposing a /metrics scrape endpoint
#[derive(Parser)]
#[command(name = "pondmetrics")]
#[command(version)]
#[command(about = "Metrics registry demo exposing a /metrics scrape endpoint")]
#[command(
    long_about = "pondmetrics registers counters, gauges, summaries and histograms, \
    drives them with a simulated workload, and serves them in the text exposition \
    format at GET /metrics."
)]
pub struct Cli {
    /// Path to configuration file (defaults to ./pondmetrics.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Address to listen on, e.g. ":8080" or "127.0.0.1:9100"
    #[arg(short, long)]
    pub listen_address: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# pondmetrics configuration
#
# Every section and key is optional. Missing keys take the defaults shown here.

[server]
# Scrape endpoint address. ":port" listens on every IPv4 interface.
listen_address = ":8080"

[observability]
# Log level: "trace", "debug", "info", "warn", "error"
# RUST_LOG overrides this when set.
log_level = "info"

[workload]
# Run the simulated workload that moves the demo instruments
enabled = true

# Period of the queued-ops / completed-tasks loop, in milliseconds
ops_interval_ms = 1000

# Added to our_company_blob_storage_ops_queued every period
ops_increment = 4.0

# Observations fed to pond_temperature_celsius and
# pond_temperature_histogram_celsius at startup
temperature_samples = 1000

# Label value pre-populated in job_in_queue, and its initial count
seed_job_type = "testjob"
seed_job_count = 3.0
"#
}
