//! Classifier configuration.

use crate::error::{ClassifierError, Result};
use serde::{Deserialize, Serialize};
use splitexit_cluster::KMeansConfig;

/// What to do with training labels outside `[0, n_labels)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelPolicy {
    /// Ignore the example. Skipped examples are counted in the fit summary.
    #[default]
    Skip,
    /// Fail the fit with `LabelOutOfRange`.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub n_labels: usize,
    #[serde(default)]
    pub kmeans: KMeansConfig,
    /// Quantile of the eligible purities used as the acceptance threshold.
    #[serde(default = "default_threshold_quantile")]
    pub threshold_quantile: f64,
    /// Clusters smaller than this are left out of the threshold.
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: u64,
    #[serde(default)]
    pub label_policy: LabelPolicy,
}

fn default_threshold_quantile() -> f64 {
    0.2
}

fn default_min_cluster_size() -> u64 {
    2
}

impl ClassifierConfig {
    pub fn new(n_labels: usize, k: usize) -> Self {
        Self {
            n_labels,
            kmeans: KMeansConfig::new(k),
            threshold_quantile: default_threshold_quantile(),
            min_cluster_size: default_min_cluster_size(),
            label_policy: LabelPolicy::default(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.kmeans.seed = Some(seed);
        self
    }

    pub fn with_label_policy(mut self, policy: LabelPolicy) -> Self {
        self.label_policy = policy;
        self
    }

    pub fn with_kmeans(mut self, kmeans: KMeansConfig) -> Self {
        self.kmeans = kmeans;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_labels == 0 {
            return Err(ClassifierError::InvalidConfig(
                "n_labels must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.threshold_quantile) {
            return Err(ClassifierError::InvalidConfig(format!(
                "threshold_quantile must be in [0, 1], got {}",
                self.threshold_quantile
            )));
        }
        self.kmeans.validate()?;
        Ok(())
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self::new(10, KMeansConfig::default().n_clusters)
    }
}
