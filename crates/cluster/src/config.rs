//! Clustering configuration structures.

use crate::error::{ClusterError, ClusterResult};
use serde::{Deserialize, Serialize};

/// Parameters for k-means fitting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KMeansConfig {
    /// Number of clusters (k).
    pub n_clusters: usize,
    /// Maximum Lloyd iterations per restart.
    pub max_iter: usize,
    /// Convergence tolerance, relative to the mean per-feature variance.
    pub tol: f64,
    /// Number of k-means++ restarts; the lowest-inertia run is kept.
    pub n_init: usize,
    /// RNG seed. `None` draws a fresh seed per fit.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            n_clusters: 8,
            max_iter: 300,
            tol: 1e-4,
            n_init: 10,
            seed: None,
        }
    }
}

impl KMeansConfig {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn validate(&self) -> ClusterResult<()> {
        if self.n_clusters == 0 {
            return Err(ClusterError::invalid_config("n_clusters must be > 0"));
        }
        if self.max_iter == 0 {
            return Err(ClusterError::invalid_config("max_iter must be > 0"));
        }
        if self.n_init == 0 {
            return Err(ClusterError::invalid_config("n_init must be > 0"));
        }
        if self.tol.is_nan() || self.tol < 0.0 {
            return Err(ClusterError::invalid_config(format!(
                "tol must be >= 0, got {}",
                self.tol
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(KMeansConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_clusters_and_nan_tol() {
        assert!(matches!(
            KMeansConfig::new(0).validate(),
            Err(ClusterError::InvalidConfig(_))
        ));
        assert!(KMeansConfig::new(3).with_tol(f64::NAN).validate().is_err());
        assert!(KMeansConfig::new(3).with_n_init(0).validate().is_err());
    }

    #[test]
    fn builders_override_defaults() {
        let config = KMeansConfig::new(5).with_seed(7).with_max_iter(20).with_n_init(1);
        assert_eq!(config.n_clusters, 5);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.max_iter, 20);
        assert_eq!(config.n_init, 1);
        assert_eq!(config.tol, KMeansConfig::default().tol);
    }
}
