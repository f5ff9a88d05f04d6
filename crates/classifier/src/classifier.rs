//! The capability set shared by early-exit classifiers.

use crate::error::Result;
use crate::persistence::ClassifierRecord;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Counters and calibration outcome of one `fit`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    pub n_samples: usize,
    pub n_aggregated: usize,
    pub n_unassigned: usize,
    pub n_dropped_labels: usize,
    pub inertia: f64,
    pub n_iter: usize,
    pub threshold: f64,
}

/// Eligible cluster purities and their mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareDiagnostics {
    pub shares: Vec<f64>,
    pub shares_mean: f64,
}

/// An unsupervised model that turns embeddings into single-hot confidence
/// vectors plus a calibrated acceptance threshold.
///
/// Implementations start unfitted and become fitted through `fit` or `load`.
/// `predict`, `threshold`, `diagnostics` and `save` fail with `NotFitted`
/// before that.
pub trait EarlyClassifier: Send + Sync {
    /// Type tag written into persisted records.
    fn kind(&self) -> &'static str;
    fn n_labels(&self) -> usize;
    /// The algorithm's defining hyper-parameter (k for k-means).
    fn key_param(&self) -> usize;
    fn is_fitted(&self) -> bool;

    fn fit(
        &mut self,
        embeddings: ArrayView2<'_, f32>,
        labels: &[usize],
        confidences: &[f32],
    ) -> Result<FitSummary>;

    /// One row per input, `n_labels` columns.
    fn predict(&self, embeddings: ArrayView2<'_, f32>) -> Result<Array2<f32>>;
    fn threshold(&self) -> Result<f64>;
    fn diagnostics(&self) -> Result<ShareDiagnostics>;

    fn to_record(&self) -> Result<ClassifierRecord>;
    /// Replace the fitted state with a persisted one. Fails with `TypeMismatch`
    /// if the record was written by another classifier type.
    fn restore(&mut self, record: ClassifierRecord) -> Result<()>;

    fn prediction_confidences(&self, predictions: ArrayView2<'_, f32>) -> Array1<f32> {
        prediction_confidences(predictions)
    }

    fn save(&self, path: &Path) -> Result<()> {
        let record = self.to_record()?;
        record.save(path)?;
        info!(kind = self.kind(), path = %path.display(), "saved classifier");
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        let record = ClassifierRecord::load(path)?;
        self.restore(record)?;
        info!(kind = self.kind(), path = %path.display(), "loaded classifier");
        Ok(())
    }
}

/// Row-wise maximum of non-negative prediction vectors.
pub fn prediction_confidences(predictions: ArrayView2<'_, f32>) -> Array1<f32> {
    predictions.map_axis(Axis(1), |row| row.iter().copied().fold(0.0, f32::max))
}

/// `true` where an input is confident enough to exit early.
pub fn early_exit_mask(confidences: ArrayView1<'_, f32>, threshold: f64) -> Vec<bool> {
    // Purities reach the prediction vector as f32, so compare at that width.
    let threshold = threshold as f32;
    confidences.iter().map(|c| *c >= threshold).collect()
}
