//! Metric families
//!
//! A family owns one descriptor and a table from label-value tuples to
//! instrument instances. Instances are created on first access and live as
//! long as the family; nothing is evicted. Iteration order is first-seen
//! order, which keeps the exposition output stable between scrapes.

use crate::error::MetricsError;
use crate::metrics::desc::{Desc, MetricKind};
use crate::metrics::snapshot::{FamilySnapshot, Sample, SampleValue};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// An instrument kind that can live inside a family
///
/// Implementors are cheap handles (an `Arc` inside), so cloning one out of
/// the family table shares the underlying value.
pub trait Metric: Clone + Send + Sync + 'static {
    /// Per-family settings every instance is built from (buckets, objectives)
    type Config: Send + Sync + 'static;

    const KIND: MetricKind;

    fn with_config(config: &Self::Config) -> Self;

    /// Current value of this instance
    fn sample(&self) -> SampleValue;
}

/// Type-erased view of a family, as the registry stores it
pub(crate) trait Collect: Send + Sync {
    fn desc(&self) -> &Desc;

    fn collect(&self) -> FamilySnapshot;
}

struct Instances<M> {
    positions: HashMap<Vec<String>, usize>,
    entries: Vec<(Vec<String>, M)>,
}

pub(crate) struct FamilyCore<M: Metric> {
    desc: Desc,
    config: M::Config,
    instances: RwLock<Instances<M>>,
}

impl<M: Metric> Collect for FamilyCore<M> {
    fn desc(&self) -> &Desc {
        &self.desc
    }

    fn collect(&self) -> FamilySnapshot {
        // Copy the handles out so instruments are sampled without the table lock
        let entries: Vec<(Vec<String>, M)> = self.instances.read().entries.clone();

        let samples = entries
            .into_iter()
            .map(|(label_values, metric)| Sample {
                label_values,
                value: metric.sample(),
            })
            .collect();

        FamilySnapshot {
            name: self.desc.fq_name().to_string(),
            help: self.desc.help().to_string(),
            kind: self.desc.kind(),
            label_names: self.desc.label_names().to_vec(),
            samples,
        }
    }
}

/// Handle to a registered family; cloning shares the same table
pub struct Family<M: Metric> {
    core: Arc<FamilyCore<M>>,
}

impl<M: Metric> Clone for Family<M> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<M: Metric> fmt::Debug for Family<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Family")
            .field("name", &self.core.desc.fq_name())
            .field("kind", &M::KIND)
            .field("instances", &self.len())
            .finish()
    }
}

impl<M: Metric> Family<M> {
    pub(crate) fn new(desc: Desc, config: M::Config) -> Self {
        Self {
            core: Arc::new(FamilyCore {
                desc,
                config,
                instances: RwLock::new(Instances {
                    positions: HashMap::new(),
                    entries: Vec::new(),
                }),
            }),
        }
    }

    pub(crate) fn collector(&self) -> Arc<dyn Collect> {
        self.core.clone()
    }

    pub fn desc(&self) -> &Desc {
        &self.core.desc
    }

    /// Return the instance for `label_values`, creating it on first access
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::LabelCardinality` when the number of values does
    /// not match the family's label names.
    pub fn get_or_create(&self, label_values: &[&str]) -> Result<M, MetricsError> {
        let key = self.key(label_values)?;

        if let Some(metric) = self.lookup(&key) {
            return Ok(metric);
        }

        let mut instances = self.core.instances.write();
        if let Some(&position) = instances.positions.get(&key) {
            return Ok(instances.entries[position].1.clone());
        }
        let metric = M::with_config(&self.core.config);
        let position = instances.entries.len();
        instances.positions.insert(key.clone(), position);
        instances.entries.push((key, metric.clone()));
        Ok(metric)
    }

    /// Return the instance for `label_values` only if it was created before
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::LabelCardinality` on a label count mismatch.
    pub fn get(&self, label_values: &[&str]) -> Result<Option<M>, MetricsError> {
        let key = self.key(label_values)?;
        Ok(self.lookup(&key))
    }

    /// Number of instances created so far
    pub fn len(&self) -> usize {
        self.core.instances.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every instance, in first-seen order
    pub fn snapshot(&self) -> FamilySnapshot {
        self.core.collect()
    }

    fn key(&self, label_values: &[&str]) -> Result<Vec<String>, MetricsError> {
        let expected = self.core.desc.label_names().len();
        if label_values.len() != expected {
            return Err(MetricsError::LabelCardinality {
                name: self.core.desc.fq_name().to_string(),
                expected,
                got: label_values.len(),
            });
        }
        Ok(label_values.iter().map(|value| value.to_string()).collect())
    }

    fn lookup(&self, key: &[String]) -> Option<M> {
        let instances = self.core.instances.read();
        instances
            .positions
            .get(key)
            .map(|&position| instances.entries[position].1.clone())
    }
}
