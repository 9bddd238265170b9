//! Metric descriptors and registration options
//!
//! A descriptor is the immutable identity of a metric family: its fully
//! qualified name, help text, kind and ordered label names. Options are the
//! builder-style inputs a caller hands to the registry.

use crate::error::MetricsError;
use std::time::Duration;

/// Default histogram buckets, tuned for request latencies in seconds
pub const DEFAULT_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Default window over which summary quantiles are computed
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(10 * 60);

/// Default number of rotating streams a summary keeps inside its window
pub const DEFAULT_AGE_BUCKETS: u32 = 5;

/// Label name reserved for histogram bucket bounds
pub const BUCKET_LABEL: &str = "le";

/// Label name reserved for summary quantiles
pub const QUANTILE_LABEL: &str = "quantile";

/// The four instrument kinds the registry knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
    Summary,
    Histogram,
}

impl MetricKind {
    /// Name used on the `# TYPE` line
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Summary => "summary",
            MetricKind::Histogram => "histogram",
        }
    }
}

/// Common options for every metric kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Opts {
    pub namespace: String,
    pub subsystem: String,
    pub name: String,
    pub help: String,
}

impl Opts {
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            ..Self::default()
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn subsystem(mut self, subsystem: impl Into<String>) -> Self {
        self.subsystem = subsystem.into();
        self
    }

    /// Fully qualified name: non-empty parts of namespace, subsystem and name joined by `_`
    ///
    /// An empty `name` yields an empty string regardless of the prefixes, which
    /// then fails validation.
    pub fn fq_name(&self) -> String {
        if self.name.is_empty() {
            return String::new();
        }
        [
            self.namespace.as_str(),
            self.subsystem.as_str(),
            self.name.as_str(),
        ]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
    }
}

/// Options for histograms: common options plus bucket upper bounds
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramOpts {
    pub common: Opts,
    pub buckets: Vec<f64>,
}

impl HistogramOpts {
    /// New options with [`DEFAULT_BUCKETS`]
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            common: Opts::new(name, help),
            buckets: DEFAULT_BUCKETS.to_vec(),
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.common = self.common.namespace(namespace);
        self
    }

    pub fn subsystem(mut self, subsystem: impl Into<String>) -> Self {
        self.common = self.common.subsystem(subsystem);
        self
    }

    pub fn buckets(mut self, buckets: Vec<f64>) -> Self {
        self.buckets = buckets;
        self
    }
}

/// One summary target: estimate `quantile` with at most `error` rank error
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Objective {
    pub quantile: f64,
    pub error: f64,
}

/// Options for summaries: common options, quantile objectives and the decay window
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOpts {
    pub common: Opts,
    pub objectives: Vec<Objective>,
    pub max_age: Duration,
    pub age_buckets: u32,
}

impl SummaryOpts {
    /// New options with no objectives (only `_sum` and `_count` are exported)
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            common: Opts::new(name, help),
            objectives: Vec::new(),
            max_age: DEFAULT_MAX_AGE,
            age_buckets: DEFAULT_AGE_BUCKETS,
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.common = self.common.namespace(namespace);
        self
    }

    pub fn subsystem(mut self, subsystem: impl Into<String>) -> Self {
        self.common = self.common.subsystem(subsystem);
        self
    }

    /// Add a target quantile with its absolute rank-error tolerance
    pub fn objective(mut self, quantile: f64, error: f64) -> Self {
        self.objectives.push(Objective { quantile, error });
        self
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn age_buckets(mut self, age_buckets: u32) -> Self {
        self.age_buckets = age_buckets;
        self
    }
}

/// Validated identity of a metric family
#[derive(Debug, Clone, PartialEq)]
pub struct Desc {
    fq_name: String,
    help: String,
    kind: MetricKind,
    label_names: Vec<String>,
}

impl Desc {
    /// Build a descriptor, validating the name and the label names for `kind`
    pub fn new(opts: &Opts, kind: MetricKind, label_names: &[&str]) -> Result<Self, MetricsError> {
        let fq_name = opts.fq_name();
        if !is_valid_metric_name(&fq_name) {
            return Err(MetricsError::InvalidDescriptor(format!(
                "'{}' is not a valid metric name",
                fq_name
            )));
        }

        let mut names: Vec<String> = Vec::with_capacity(label_names.len());
        for label in label_names {
            if !is_valid_label_name(label) {
                return Err(MetricsError::InvalidDescriptor(format!(
                    "'{}' is not a valid label name for metric '{}'",
                    label, fq_name
                )));
            }
            let reserved = match kind {
                MetricKind::Histogram => *label == BUCKET_LABEL,
                MetricKind::Summary => *label == QUANTILE_LABEL,
                MetricKind::Counter | MetricKind::Gauge => false,
            };
            if reserved {
                return Err(MetricsError::InvalidDescriptor(format!(
                    "label '{}' is reserved for {} metric '{}'",
                    label,
                    kind.as_str(),
                    fq_name
                )));
            }
            if names.iter().any(|existing| existing == label) {
                return Err(MetricsError::InvalidDescriptor(format!(
                    "duplicate label name '{}' for metric '{}'",
                    label, fq_name
                )));
            }
            names.push((*label).to_string());
        }

        Ok(Self {
            fq_name,
            help: opts.help.clone(),
            kind,
            label_names: names,
        })
    }

    pub fn fq_name(&self) -> &str {
        &self.fq_name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }
}

/// `[a-zA-Z_:][a-zA-Z0-9_:]*`
fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// `[a-zA-Z_][a-zA-Z0-9_]*`, excluding the `__` prefix
fn is_valid_label_name(name: &str) -> bool {
    if name.starts_with("__") {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
