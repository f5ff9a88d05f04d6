//! Per-cluster label shares.
//!
//! Aggregation is two-phase: a [`ShareAccumulator`] collects label counts and
//! raw confidence scores, and [`ShareAccumulator::finish`] consumes it into an
//! immutable [`LabelShares`] where every confidence list is collapsed to its
//! mean (0.0 for an empty list).

use crate::config::LabelPolicy;
use crate::error::{ClassifierError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use splitexit_cluster::Assignment;

/// Bookkeeping for one aggregation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationStats {
    /// Examples that contributed to the tables.
    pub aggregated: usize,
    /// Examples assigned to no cluster.
    pub unassigned: usize,
    /// Examples skipped because their label was out of range.
    pub dropped_labels: usize,
}

#[derive(Debug, Clone)]
pub struct ShareAccumulator {
    n_labels: usize,
    counts: Array2<u64>,
    confidences: Vec<Vec<Vec<f32>>>,
    policy: LabelPolicy,
    stats: AggregationStats,
}

impl ShareAccumulator {
    pub fn new(n_clusters: usize, n_labels: usize, policy: LabelPolicy) -> Self {
        Self {
            n_labels,
            counts: Array2::zeros((n_clusters, n_labels)),
            confidences: vec![vec![Vec::new(); n_labels]; n_clusters],
            policy,
            stats: AggregationStats::default(),
        }
    }

    pub fn record(&mut self, cluster: Assignment, label: usize, confidence: f32) -> Result<()> {
        let Some(cluster) = cluster else {
            self.stats.unassigned += 1;
            return Ok(());
        };
        if cluster >= self.counts.nrows() {
            return Err(ClassifierError::InvalidInput(format!(
                "cluster id {} out of range for {} clusters",
                cluster,
                self.counts.nrows()
            )));
        }
        if label >= self.n_labels {
            return match self.policy {
                LabelPolicy::Skip => {
                    self.stats.dropped_labels += 1;
                    Ok(())
                }
                LabelPolicy::Reject => Err(ClassifierError::LabelOutOfRange {
                    label,
                    n_labels: self.n_labels,
                }),
            };
        }

        self.counts[(cluster, label)] += 1;
        self.confidences[cluster][label].push(confidence);
        self.stats.aggregated += 1;
        Ok(())
    }

    /// Record parallel sequences of assignment, label and confidence.
    pub fn extend(
        &mut self,
        assignments: &[Assignment],
        labels: &[usize],
        confidences: &[f32],
    ) -> Result<()> {
        if assignments.len() != labels.len() || labels.len() != confidences.len() {
            return Err(ClassifierError::LengthMismatch {
                embeddings: assignments.len(),
                labels: labels.len(),
                confidences: confidences.len(),
            });
        }
        for ((cluster, label), confidence) in assignments.iter().zip(labels).zip(confidences) {
            self.record(*cluster, *label, *confidence)?;
        }
        Ok(())
    }

    pub fn finish(self) -> LabelShares {
        let (n_clusters, n_labels) = self.counts.dim();
        let mean_confidences = Array2::from_shape_fn((n_clusters, n_labels), |(c, l)| {
            let scores = &self.confidences[c][l];
            if scores.is_empty() {
                0.0
            } else {
                scores.iter().map(|s| *s as f64).sum::<f64>() / scores.len() as f64
            }
        });
        LabelShares {
            counts: self.counts,
            mean_confidences,
            stats: self.stats,
        }
    }
}

/// Finalized per-cluster label counts and mean confidences, both `[k, n_labels]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelShares {
    counts: Array2<u64>,
    mean_confidences: Array2<f64>,
    stats: AggregationStats,
}

impl LabelShares {
    pub fn from_counts(counts: Array2<u64>) -> Self {
        let mean_confidences = Array2::zeros(counts.dim());
        let aggregated = counts.iter().sum::<u64>() as usize;
        Self {
            counts,
            mean_confidences,
            stats: AggregationStats {
                aggregated,
                ..AggregationStats::default()
            },
        }
    }

    pub fn counts(&self) -> &Array2<u64> {
        &self.counts
    }

    pub fn mean_confidences(&self) -> &Array2<f64> {
        &self.mean_confidences
    }

    pub fn stats(&self) -> AggregationStats {
        self.stats
    }

    pub fn n_clusters(&self) -> usize {
        self.counts.nrows()
    }

    pub fn n_labels(&self) -> usize {
        self.counts.ncols()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

pub fn aggregate(
    n_clusters: usize,
    n_labels: usize,
    policy: LabelPolicy,
    assignments: &[Assignment],
    labels: &[usize],
    confidences: &[f32],
) -> Result<LabelShares> {
    let mut accumulator = ShareAccumulator::new(n_clusters, n_labels, policy);
    accumulator.extend(assignments, labels, confidences)?;
    Ok(accumulator.finish())
}
