//! Centroid-based clustering: the `Clusterer` capability and its k-means implementation.

use crate::config::KMeansConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::utils::{assign_rows, mean_feature_variance, squared_distance, validate_embeddings};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Cluster id for one input. `None` is the unassigned sentinel.
pub type Assignment = Option<usize>;

/// Outcome of a successful `fit`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterFit {
    pub inertia: f64,
    pub n_iter: usize,
}

pub trait Clusterer: Send + Sync {
    fn name(&self) -> &'static str;
    fn n_clusters(&self) -> usize;
    /// Embedding width seen during `fit`, or `None` while unfitted.
    fn dim(&self) -> Option<usize>;
    fn fit(&mut self, data: ArrayView2<'_, f32>) -> ClusterResult<ClusterFit>;
    fn predict(&self, data: ArrayView2<'_, f32>) -> ClusterResult<Vec<Assignment>>;

    fn is_fitted(&self) -> bool {
        self.dim().is_some()
    }
}

/// Fitted k-means state: everything `predict` needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansState {
    /// Centroids, shape `[k, dim]`.
    pub centroids: Array2<f32>,
    pub inertia: f64,
    pub n_iter: usize,
}

#[derive(Debug, Clone)]
pub struct KMeans {
    config: KMeansConfig,
    state: Option<KMeansState>,
}

impl KMeans {
    pub fn new(config: KMeansConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Rebuild a fitted model from exported state. `n_clusters` follows the centroid count.
    pub fn from_state(mut config: KMeansConfig, state: KMeansState) -> ClusterResult<Self> {
        if state.centroids.nrows() == 0 || state.centroids.ncols() == 0 {
            return Err(ClusterError::invalid_input("k-means state has no centroids"));
        }
        config.n_clusters = state.centroids.nrows();
        Ok(Self {
            config,
            state: Some(state),
        })
    }

    pub fn config(&self) -> &KMeansConfig {
        &self.config
    }

    pub fn state(&self) -> Option<&KMeansState> {
        self.state.as_ref()
    }

    pub fn centroids(&self) -> Option<ArrayView2<'_, f32>> {
        self.state.as_ref().map(|state| state.centroids.view())
    }

    fn run_once(
        &self,
        data: &ArrayView2<'_, f32>,
        rng: &mut fastrand::Rng,
        tol: f64,
    ) -> KMeansState {
        let k = self.config.n_clusters;
        let mut centroids = kmeans_plus_plus(data, k, rng);
        let mut n_iter = 0;

        for iter in 0..self.config.max_iter {
            n_iter = iter + 1;
            let assignments = assign_rows(data, &centroids.view());
            let updated = update_centroids(data, &assignments, k);
            let shift: f64 = centroids
                .outer_iter()
                .zip(updated.outer_iter())
                .map(|(old, new)| squared_distance(&old, &new))
                .sum();
            centroids = updated;
            if shift <= tol {
                break;
            }
        }

        let inertia = assign_rows(data, &centroids.view())
            .iter()
            .map(|(_, dist)| dist)
            .sum();

        KMeansState {
            centroids,
            inertia,
            n_iter,
        }
    }
}

impl Clusterer for KMeans {
    fn name(&self) -> &'static str {
        "kmeans"
    }

    fn n_clusters(&self) -> usize {
        self.config.n_clusters
    }

    fn dim(&self) -> Option<usize> {
        self.state.as_ref().map(|state| state.centroids.ncols())
    }

    fn fit(&mut self, data: ArrayView2<'_, f32>) -> ClusterResult<ClusterFit> {
        self.config.validate()?;
        validate_embeddings(&data, None)?;
        if data.ncols() == 0 {
            return Err(ClusterError::invalid_input("embeddings have zero width"));
        }
        if data.nrows() < self.config.n_clusters {
            return Err(ClusterError::invalid_input(format!(
                "n_samples={} should be >= n_clusters={}",
                data.nrows(),
                self.config.n_clusters
            )));
        }

        let mut rng = match self.config.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        let tol = self.config.tol * mean_feature_variance(&data);

        let mut best: Option<KMeansState> = None;
        for run in 0..self.config.n_init {
            let candidate = self.run_once(&data, &mut rng, tol);
            debug!(
                run,
                inertia = candidate.inertia,
                n_iter = candidate.n_iter,
                "k-means restart finished"
            );
            if best
                .as_ref()
                .map_or(true, |current| candidate.inertia < current.inertia)
            {
                best = Some(candidate);
            }
        }

        let state = best.ok_or_else(|| ClusterError::invalid_config("n_init must be > 0"))?;
        let fit = ClusterFit {
            inertia: state.inertia,
            n_iter: state.n_iter,
        };
        self.state = Some(state);
        Ok(fit)
    }

    fn predict(&self, data: ArrayView2<'_, f32>) -> ClusterResult<Vec<Assignment>> {
        let state = self.state.as_ref().ok_or(ClusterError::NotFitted)?;
        validate_embeddings(&data, Some(state.centroids.ncols()))?;
        Ok(assign_rows(&data, &state.centroids.view())
            .into_iter()
            .map(|(cluster, _)| Some(cluster))
            .collect())
    }
}

/// k-means++ seeding: each new centroid is drawn with probability proportional
/// to its squared distance from the closest centroid chosen so far.
fn kmeans_plus_plus(data: &ArrayView2<'_, f32>, k: usize, rng: &mut fastrand::Rng) -> Array2<f32> {
    let n = data.nrows();
    let mut centroids = Array2::<f32>::zeros((k, data.ncols()));

    let first = rng.usize(0..n);
    centroids.row_mut(0).assign(&data.row(first));
    let mut min_dist: Vec<f64> = data
        .outer_iter()
        .map(|row| squared_distance(&row, &data.row(first)))
        .collect();

    for c in 1..k {
        let total: f64 = min_dist.iter().sum();
        let next = if total > 0.0 {
            let target = rng.f64() * total;
            let mut acc = 0.0;
            let mut chosen = n - 1;
            for (idx, dist) in min_dist.iter().enumerate() {
                acc += dist;
                if acc >= target && *dist > 0.0 {
                    chosen = idx;
                    break;
                }
            }
            chosen
        } else {
            rng.usize(0..n)
        };

        centroids.row_mut(c).assign(&data.row(next));
        let chosen = data.row(next);
        for (dist, row) in min_dist.iter_mut().zip(data.outer_iter()) {
            *dist = dist.min(squared_distance(&row, &chosen));
        }
    }

    centroids
}

/// Mean of assigned rows per cluster. Empty clusters take the rows farthest
/// from their current centroid.
fn update_centroids(data: &ArrayView2<'_, f32>, assignments: &[(usize, f64)], k: usize) -> Array2<f32> {
    let d = data.ncols();
    let mut sums = Array2::<f64>::zeros((k, d));
    let mut counts = vec![0usize; k];

    for (row, &(cluster, _)) in data.outer_iter().zip(assignments) {
        counts[cluster] += 1;
        for (acc, x) in sums.row_mut(cluster).iter_mut().zip(row.iter()) {
            *acc += *x as f64;
        }
    }

    let mut donors = if counts.contains(&0) {
        let mut order: Vec<usize> = (0..assignments.len()).collect();
        order.sort_by(|&a, &b| assignments[b].1.total_cmp(&assignments[a].1));
        order
    } else {
        Vec::new()
    }
    .into_iter();

    let mut centroids = Array2::<f32>::zeros((k, d));
    for (cluster, count) in counts.iter().enumerate() {
        if *count > 0 {
            let inv = 1.0 / *count as f64;
            for (c, s) in centroids.row_mut(cluster).iter_mut().zip(sums.row(cluster).iter()) {
                *c = (s * inv) as f32;
            }
        } else if let Some(idx) = donors.next() {
            centroids.row_mut(cluster).assign(&data.row(idx));
        }
    }
    centroids
}
