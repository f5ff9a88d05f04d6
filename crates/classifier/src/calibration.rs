//! Cluster profiles and the global acceptance threshold.

use crate::error::{ClassifierError, Result};
use crate::shares::LabelShares;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use splitexit_cluster::Assignment;
use tracing::debug;

/// Dominant label, purity and labeled size of one cluster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterProfile {
    pub dominant_label: usize,
    /// `max_count / size`, or 0.0 for an empty cluster.
    pub purity: f64,
    pub size: u64,
}

impl ClusterProfile {
    /// Ties between label counts resolve to the lowest label id.
    pub fn from_counts(counts: ArrayView1<'_, u64>) -> Self {
        let mut dominant_label = 0;
        let mut max_count = 0u64;
        for (label, &count) in counts.iter().enumerate() {
            if count > max_count {
                dominant_label = label;
                max_count = count;
            }
        }
        let size: u64 = counts.iter().sum();
        let purity = if size > 0 {
            max_count as f64 / size as f64
        } else {
            0.0
        };
        Self {
            dominant_label,
            purity,
            size,
        }
    }
}

pub fn cluster_profiles(shares: &LabelShares) -> Vec<ClusterProfile> {
    shares
        .counts()
        .outer_iter()
        .map(ClusterProfile::from_counts)
        .collect()
}

/// Single-hot prediction rows: each assigned input carries its cluster's
/// purity at the dominant label. Unassigned inputs stay all-zero.
pub fn confidence_vectors(
    assignments: &[Assignment],
    profiles: &[ClusterProfile],
    n_labels: usize,
) -> Result<Array2<f32>> {
    let mut output = Array2::<f32>::zeros((assignments.len(), n_labels));
    for (row, assignment) in assignments.iter().enumerate() {
        let Some(cluster) = assignment else {
            continue;
        };
        let profile = profiles.get(*cluster).ok_or_else(|| {
            ClassifierError::InvalidInput(format!(
                "cluster {} has no calibrated profile",
                cluster
            ))
        })?;
        if profile.dominant_label < n_labels {
            output[(row, profile.dominant_label)] = profile.purity as f32;
        }
    }
    Ok(output)
}

/// Linear-interpolation quantile (rank `q * (m - 1)` over sorted values).
/// Returns `None` for an empty input.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}

/// Result of calibrating a fitted share table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub profiles: Vec<ClusterProfile>,
    /// Purities of clusters that met the minimum size, in cluster order.
    pub valid_shares: Vec<f64>,
    pub threshold: f64,
}

impl Calibration {
    pub fn shares_mean(&self) -> f64 {
        if self.valid_shares.is_empty() {
            return 0.0;
        }
        self.valid_shares.iter().sum::<f64>() / self.valid_shares.len() as f64
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ThresholdCalibrator {
    quantile: f64,
    min_cluster_size: u64,
}

impl Default for ThresholdCalibrator {
    fn default() -> Self {
        Self {
            quantile: 0.2,
            min_cluster_size: 2,
        }
    }
}

impl ThresholdCalibrator {
    pub fn new(quantile: f64, min_cluster_size: u64) -> Self {
        Self {
            quantile,
            min_cluster_size,
        }
    }

    pub fn calibrate(&self, shares: &LabelShares) -> Result<Calibration> {
        self.calibrate_profiles(cluster_profiles(shares))
    }

    pub fn calibrate_profiles(&self, profiles: Vec<ClusterProfile>) -> Result<Calibration> {
        let valid_shares: Vec<f64> = profiles
            .iter()
            .filter(|profile| profile.size >= self.min_cluster_size)
            .map(|profile| profile.purity)
            .collect();

        let threshold =
            quantile(&valid_shares, self.quantile).ok_or(ClassifierError::EmptyDistribution {
                min_cluster_size: self.min_cluster_size,
            })?;

        debug!(
            eligible = valid_shares.len(),
            clusters = profiles.len(),
            threshold,
            "calibrated share threshold"
        );

        Ok(Calibration {
            profiles,
            valid_shares,
            threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    fn shares(counts: Array2<u64>) -> LabelShares {
        LabelShares::from_counts(counts)
    }

    #[test]
    fn threshold_from_four_cluster_table() {
        let table = shares(array![[10, 0], [1, 9], [5, 5], [0, 0]]);
        let calibration = ThresholdCalibrator::default()
            .calibrate(&table)
            .expect("calibrate");

        let sizes: Vec<u64> = calibration.profiles.iter().map(|p| p.size).collect();
        assert_eq!(sizes, vec![10, 10, 10, 0]);
        let purities: Vec<f64> = calibration.profiles.iter().map(|p| p.purity).collect();
        assert_eq!(purities, vec![1.0, 0.9, 0.5, 0.0]);

        assert_eq!(calibration.valid_shares, vec![1.0, 0.9, 0.5]);
        assert_abs_diff_eq!(calibration.threshold, 0.66, epsilon = 1e-12);
        assert_abs_diff_eq!(calibration.shares_mean(), 0.8, epsilon = 1e-12);
    }

    #[test]
    fn ties_resolve_to_lowest_label() {
        let profile = ClusterProfile::from_counts(array![0u64, 4, 4, 1].view());
        assert_eq!(profile.dominant_label, 1);
        assert_abs_diff_eq!(profile.purity, 4.0 / 9.0, epsilon = 1e-12);
    }

    #[test]
    fn empty_cluster_has_zero_purity() {
        let profile = ClusterProfile::from_counts(array![0u64, 0, 0].view());
        assert_eq!(profile.size, 0);
        assert_eq!(profile.purity, 0.0);
        assert_eq!(profile.dominant_label, 0);
    }

    #[test]
    fn singleton_clusters_are_excluded() {
        let table = shares(array![[1, 0], [0, 1], [3, 1]]);
        let calibration = ThresholdCalibrator::default()
            .calibrate(&table)
            .expect("calibrate");
        assert_eq!(calibration.valid_shares, vec![0.75]);
        assert_abs_diff_eq!(calibration.threshold, 0.75, epsilon = 1e-12);
    }

    #[test]
    fn no_eligible_cluster_is_an_error() {
        let table = shares(Array2::zeros((3, 2)));
        let err = ThresholdCalibrator::default().calibrate(&table).unwrap_err();
        assert!(matches!(
            err,
            ClassifierError::EmptyDistribution {
                min_cluster_size: 2
            }
        ));
    }

    #[test]
    fn quantile_interpolates_between_order_statistics() {
        assert_eq!(quantile(&[], 0.5), None);
        assert_eq!(quantile(&[0.3], 0.2), Some(0.3));
        assert_abs_diff_eq!(quantile(&[4.0, 1.0, 3.0, 2.0], 0.5).unwrap(), 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(quantile(&[4.0, 1.0, 3.0, 2.0], 0.0).unwrap(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(quantile(&[4.0, 1.0, 3.0, 2.0], 1.0).unwrap(), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn unassigned_inputs_get_zero_vectors() {
        let table = shares(array![[8, 2, 0], [0, 1, 3]]);
        let profiles = cluster_profiles(&table);
        let vectors = confidence_vectors(&[Some(0), None, Some(1)], &profiles, 3)
            .expect("confidence vectors");

        assert_eq!(vectors.dim(), (3, 3));
        assert_eq!(vectors.row(0).to_vec(), vec![0.8, 0.0, 0.0]);
        assert!(vectors.row(1).iter().all(|v| *v == 0.0));
        assert_eq!(vectors.row(2).to_vec(), vec![0.0, 0.0, 0.75]);
    }

    #[test]
    fn unknown_cluster_has_no_profile() {
        let profiles = cluster_profiles(&shares(array![[2, 1]]));
        let err = confidence_vectors(&[Some(3)], &profiles, 2).unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidInput(_)));
    }

    #[test]
    fn all_unassigned_inputs_yield_no_threshold_and_zero_vectors() {
        let assignments = [None, None, None];
        let table = crate::shares::aggregate(
            2,
            2,
            crate::config::LabelPolicy::Skip,
            &assignments,
            &[0, 1, 1],
            &[0.9, 0.8, 0.7],
        )
        .expect("aggregate");
        let profiles = cluster_profiles(&table);

        let err = ThresholdCalibrator::default().calibrate(&table).unwrap_err();
        assert!(matches!(err, ClassifierError::EmptyDistribution { .. }));

        let vectors = confidence_vectors(&assignments, &profiles, 2).expect("confidence vectors");
        assert_eq!(vectors.dim(), (3, 2));
        assert!(vectors.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn purity_stays_in_unit_interval() {
        let table = shares(array![[3, 2, 1], [0, 7, 0], [2, 2, 2]]);
        for profile in cluster_profiles(&table) {
            assert!(profile.purity > 0.0 && profile.purity <= 1.0);
        }
    }
}
