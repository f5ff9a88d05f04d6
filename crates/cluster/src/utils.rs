//! Shared numeric helpers for clustering.

use crate::error::{ClusterError, ClusterResult};
use ndarray::{ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

pub fn validate_embeddings(data: &ArrayView2<'_, f32>, expected_dim: Option<usize>) -> ClusterResult<()> {
    if let Some(expected) = expected_dim {
        if data.ncols() != expected {
            return Err(ClusterError::DimensionMismatch {
                expected,
                actual: data.ncols(),
            });
        }
    }
    if data.iter().any(|x| !x.is_finite()) {
        return Err(ClusterError::invalid_input("embeddings contain NaN or infinite values"));
    }
    Ok(())
}

pub fn squared_distance(a: &ArrayView1<'_, f32>, b: &ArrayView1<'_, f32>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x - *y) as f64;
            d * d
        })
        .sum()
}

/// Index of the closest centroid and its squared distance. Ties go to the lower index.
pub fn nearest_centroid(point: &ArrayView1<'_, f32>, centroids: &ArrayView2<'_, f32>) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (idx, centroid) in centroids.outer_iter().enumerate() {
        let dist = squared_distance(point, &centroid);
        if dist < best.1 {
            best = (idx, dist);
        }
    }
    best
}

/// Nearest-centroid assignment for every row, computed in parallel.
pub fn assign_rows(data: &ArrayView2<'_, f32>, centroids: &ArrayView2<'_, f32>) -> Vec<(usize, f64)> {
    data.axis_iter(Axis(0))
        .into_par_iter()
        .map(|row| nearest_centroid(&row, centroids))
        .collect()
}

/// Mean of the per-feature variances, used to scale the convergence tolerance.
pub fn mean_feature_variance(data: &ArrayView2<'_, f32>) -> f64 {
    if data.nrows() == 0 || data.ncols() == 0 {
        return 0.0;
    }
    let n = data.nrows() as f64;
    let total: f64 = data
        .axis_iter(Axis(1))
        .map(|column| {
            let mean = column.iter().map(|x| *x as f64).sum::<f64>() / n;
            column
                .iter()
                .map(|x| {
                    let d = *x as f64 - mean;
                    d * d
                })
                .sum::<f64>()
                / n
        })
        .sum();
    total / data.ncols() as f64
}
