//! Metric registry
//!
//! The registry is an explicit value: create one, register families against
//! it, and hand an `Arc<Registry>` to whatever produces or scrapes metrics.
//! Separate registries are fully independent, which keeps tests isolated.
//!
//! Registration takes a write lock on the family list only; instruments that
//! were already handed out keep updating without touching it.

use crate::error::MetricsError;
use crate::metrics::desc::{Desc, HistogramOpts, MetricKind, Opts, SummaryOpts};
use crate::metrics::family::{Collect, Family, Metric};
use crate::metrics::histogram::{Buckets, Histogram};
use crate::metrics::quantile::{Summary, SummaryConfig};
use crate::metrics::snapshot::FamilySnapshot;
use crate::metrics::value::{Counter, Gauge};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

#[derive(Default)]
struct RegistryInner {
    families: Vec<Arc<dyn Collect>>,
    names: HashSet<String>,
}

/// Collection of uniquely named metric families, in registration order
#[derive(Default)]
pub struct Registry {
    inner: RwLock<RegistryInner>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        let names: Vec<&str> = inner
            .families
            .iter()
            .map(|family| family.desc().fq_name())
            .collect();
        f.debug_struct("Registry").field("families", &names).finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a family described by `desc`
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::DuplicateName` if a family with the same fully
    /// qualified name exists; the existing family is left untouched.
    pub fn register<M: Metric>(
        &self,
        desc: Desc,
        config: M::Config,
    ) -> Result<Family<M>, MetricsError> {
        let family = Family::<M>::new(desc, config);
        let name = family.desc().fq_name().to_string();

        let mut inner = self.inner.write();
        if inner.names.contains(&name) {
            tracing::warn!(metric = %name, "Rejected duplicate metric registration");
            return Err(MetricsError::DuplicateName { name });
        }
        inner.names.insert(name.clone());
        inner.families.push(family.collector());
        drop(inner);

        tracing::debug!(
            metric = %name,
            kind = M::KIND.as_str(),
            labels = ?family.desc().label_names(),
            "Registered metric family"
        );
        Ok(family)
    }

    /// Register an unlabelled counter
    pub fn counter(&self, opts: Opts) -> Result<Counter, MetricsError> {
        self.counter_vec(opts, &[])?.get_or_create(&[])
    }

    pub fn counter_vec(&self, opts: Opts, labels: &[&str]) -> Result<Family<Counter>, MetricsError> {
        self.register(Desc::new(&opts, MetricKind::Counter, labels)?, ())
    }

    /// Register an unlabelled gauge
    pub fn gauge(&self, opts: Opts) -> Result<Gauge, MetricsError> {
        self.gauge_vec(opts, &[])?.get_or_create(&[])
    }

    pub fn gauge_vec(&self, opts: Opts, labels: &[&str]) -> Result<Family<Gauge>, MetricsError> {
        self.register(Desc::new(&opts, MetricKind::Gauge, labels)?, ())
    }

    /// Register an unlabelled summary
    pub fn summary(&self, opts: SummaryOpts) -> Result<Summary, MetricsError> {
        self.summary_vec(opts, &[])?.get_or_create(&[])
    }

    pub fn summary_vec(
        &self,
        opts: SummaryOpts,
        labels: &[&str],
    ) -> Result<Family<Summary>, MetricsError> {
        let config = SummaryConfig::new(&opts)?;
        self.register(Desc::new(&opts.common, MetricKind::Summary, labels)?, config)
    }

    /// Register an unlabelled histogram
    pub fn histogram(&self, opts: HistogramOpts) -> Result<Histogram, MetricsError> {
        self.histogram_vec(opts, &[])?.get_or_create(&[])
    }

    pub fn histogram_vec(
        &self,
        opts: HistogramOpts,
        labels: &[&str],
    ) -> Result<Family<Histogram>, MetricsError> {
        let buckets = Buckets::new(opts.buckets.clone())?;
        self.register(
            Desc::new(&opts.common, MetricKind::Histogram, labels)?,
            buckets,
        )
    }

    /// Whether a family with this fully qualified name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().names.contains(name)
    }

    /// Number of registered families
    pub fn len(&self) -> usize {
        self.inner.read().families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time view of every family, in registration order
    ///
    /// Each instance is read consistently on its own; different instances may
    /// be read at slightly different moments.
    pub fn snapshot(&self) -> Vec<FamilySnapshot> {
        let families: Vec<Arc<dyn Collect>> = self.inner.read().families.clone();
        families.iter().map(|family| family.collect()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::snapshot::SampleValue;

    #[test]
    fn test_duplicate_name_fails_and_keeps_first() {
        let registry = Registry::new();
        let first = registry
            .counter(Opts::new("completed_tasks_total", "first"))
            .unwrap();
        first.inc();

        let err = registry
            .gauge(Opts::new("completed_tasks_total", "second"))
            .unwrap_err();
        assert_eq!(
            err,
            MetricsError::DuplicateName {
                name: "completed_tasks_total".to_string()
            }
        );

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].help, "first");
        assert_eq!(snapshot[0].kind, MetricKind::Counter);
        assert_eq!(snapshot[0].sample(&[]), Some(&SampleValue::Counter(1.0)));
    }

    #[test]
    fn test_duplicate_detection_uses_fully_qualified_name() {
        let registry = Registry::new();
        registry
            .gauge(Opts::new("ops_queued", "h").namespace("a").subsystem("b"))
            .unwrap();
        assert!(registry.gauge(Opts::new("b_ops_queued", "h").namespace("a")).is_err());
        assert!(registry.gauge(Opts::new("ops_queued", "h")).is_ok());
        assert!(registry.contains("a_b_ops_queued"));
        assert!(registry.contains("ops_queued"));
    }

    #[test]
    fn test_invalid_descriptor_is_not_registered() {
        let registry = Registry::new();
        assert!(registry.counter(Opts::new("bad name", "h")).is_err());
        assert!(
            registry
                .histogram(HistogramOpts::new("h", "h").buckets(vec![]))
                .is_err()
        );
        assert!(
            registry
                .summary(SummaryOpts::new("s", "h").objective(1.5, 0.1))
                .is_err()
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unlabelled_metrics_are_present_before_use() {
        let registry = Registry::new();
        registry.counter(Opts::new("c", "h")).unwrap();
        registry.gauge_vec(Opts::new("g", "h"), &["job_type"]).unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].samples.len(), 1);
        assert_eq!(snapshot[0].sample(&[]), Some(&SampleValue::Counter(0.0)));
        assert!(snapshot[1].samples.is_empty());
    }

    #[test]
    fn test_snapshot_in_registration_order() {
        let registry = Registry::new();
        registry.gauge(Opts::new("zeta", "h")).unwrap();
        registry.counter(Opts::new("alpha", "h")).unwrap();
        registry
            .histogram(HistogramOpts::new("mid", "h").buckets(vec![1.0]))
            .unwrap();

        let names: Vec<String> = registry.snapshot().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_labelled_gauge_scenario() {
        let registry = Registry::new();
        let family = registry.gauge_vec(Opts::new("g", "h"), &["name"]).unwrap();
        family.get_or_create(&["a"]).unwrap().add(3.0);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].sample(&["a"]), Some(&SampleValue::Gauge(3.0)));
        // "b" was never accessed, so it is absent rather than zero
        assert_eq!(snapshot[0].sample(&["b"]), None);

        family.get_or_create(&["b"]).unwrap();
        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].sample(&["b"]), Some(&SampleValue::Gauge(0.0)));
    }

    #[test]
    fn test_independent_registries() {
        let one = Registry::new();
        let two = Registry::new();
        one.counter(Opts::new("c", "h")).unwrap();
        assert!(two.counter(Opts::new("c", "h")).is_ok());
    }

    #[test]
    fn test_registration_while_observing() {
        let registry = Arc::new(Registry::new());
        let counter = registry.counter(Opts::new("hot_total", "h")).unwrap();

        let producer = {
            let counter = counter.clone();
            std::thread::spawn(move || {
                for _ in 0..10_000 {
                    counter.inc();
                }
            })
        };
        let registrar = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                for i in 0..100 {
                    registry
                        .gauge(Opts::new(format!("late_{}", i), "h"))
                        .expect("unique names register");
                    registry.snapshot();
                }
            })
        };
        producer.join().expect("producer should not panic");
        registrar.join().expect("registrar should not panic");

        assert_eq!(counter.get(), 10_000.0);
        assert_eq!(registry.len(), 101);
    }
}
