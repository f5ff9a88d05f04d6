//! K-means early-exit classifier.

use crate::calibration::{confidence_vectors, Calibration, ClusterProfile, ThresholdCalibrator};
use crate::classifier::{EarlyClassifier, FitSummary, ShareDiagnostics};
use crate::config::ClassifierConfig;
use crate::error::{ClassifierError, Result};
use crate::persistence::{ClassifierRecord, RecordMetadata};
use crate::shares::aggregate;
use ndarray::{Array2, ArrayView2};
use splitexit_cluster::{Assignment, Clusterer, KMeans, KMeansState};
use tracing::{info, warn};

pub const KMEANS_TAG: &str = "kmeans";

#[derive(Debug, Clone)]
struct FittedModel {
    clusterer: KMeans,
    calibration: Calibration,
    mean_confidences: Option<Array2<f64>>,
}

#[derive(Debug, Clone)]
pub struct KMeansClassifier {
    config: ClassifierConfig,
    fitted: Option<FittedModel>,
}

impl KMeansClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    pub fn with_k(n_labels: usize, k: usize) -> Self {
        Self::new(ClassifierConfig::new(n_labels, k))
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.fitted.as_ref().map(|fitted| &fitted.calibration)
    }

    pub fn profiles(&self) -> Result<&[ClusterProfile]> {
        Ok(&self.fitted()?.calibration.profiles)
    }

    /// Mean training confidence per (cluster, label); absent on records that did not store it.
    pub fn mean_confidences(&self) -> Option<&Array2<f64>> {
        self.fitted
            .as_ref()
            .and_then(|fitted| fitted.mean_confidences.as_ref())
    }

    pub fn clusterer(&self) -> Option<&KMeans> {
        self.fitted.as_ref().map(|fitted| &fitted.clusterer)
    }

    /// Cluster assignment for each embedding.
    pub fn assign(&self, embeddings: ArrayView2<'_, f32>) -> Result<Vec<Assignment>> {
        Ok(self.fitted()?.clusterer.predict(embeddings)?)
    }

    fn fitted(&self) -> Result<&FittedModel> {
        self.fitted.as_ref().ok_or(ClassifierError::NotFitted)
    }

    fn calibrator(&self) -> ThresholdCalibrator {
        ThresholdCalibrator::new(self.config.threshold_quantile, self.config.min_cluster_size)
    }
}

impl EarlyClassifier for KMeansClassifier {
    fn kind(&self) -> &'static str {
        KMEANS_TAG
    }

    fn n_labels(&self) -> usize {
        self.config.n_labels
    }

    fn key_param(&self) -> usize {
        self.config.kmeans.n_clusters
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    fn fit(
        &mut self,
        embeddings: ArrayView2<'_, f32>,
        labels: &[usize],
        confidences: &[f32],
    ) -> Result<FitSummary> {
        self.config.validate()?;
        if embeddings.nrows() != labels.len() || labels.len() != confidences.len() {
            return Err(ClassifierError::LengthMismatch {
                embeddings: embeddings.nrows(),
                labels: labels.len(),
                confidences: confidences.len(),
            });
        }

        let mut clusterer = KMeans::new(self.config.kmeans);
        let cluster_fit = clusterer.fit(embeddings)?;
        let assignments = clusterer.predict(embeddings)?;

        let shares = aggregate(
            clusterer.n_clusters(),
            self.config.n_labels,
            self.config.label_policy,
            &assignments,
            labels,
            confidences,
        )?;
        let stats = shares.stats();
        if stats.dropped_labels > 0 {
            warn!(
                dropped = stats.dropped_labels,
                n_labels = self.config.n_labels,
                "skipped training examples with out-of-range labels"
            );
        }

        let calibration = self.calibrator().calibrate(&shares)?;
        let summary = FitSummary {
            n_samples: embeddings.nrows(),
            n_aggregated: stats.aggregated,
            n_unassigned: stats.unassigned,
            n_dropped_labels: stats.dropped_labels,
            inertia: cluster_fit.inertia,
            n_iter: cluster_fit.n_iter,
            threshold: calibration.threshold,
        };
        info!(
            k = clusterer.n_clusters(),
            n_samples = summary.n_samples,
            eligible_clusters = calibration.valid_shares.len(),
            threshold = summary.threshold,
            inertia = summary.inertia,
            "fitted k-means early classifier"
        );

        self.fitted = Some(FittedModel {
            clusterer,
            calibration,
            mean_confidences: Some(shares.mean_confidences().clone()),
        });
        Ok(summary)
    }

    fn predict(&self, embeddings: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let fitted = self.fitted()?;
        let assignments = fitted.clusterer.predict(embeddings)?;
        confidence_vectors(
            &assignments,
            &fitted.calibration.profiles,
            self.config.n_labels,
        )
    }

    fn threshold(&self) -> Result<f64> {
        Ok(self.fitted()?.calibration.threshold)
    }

    fn diagnostics(&self) -> Result<ShareDiagnostics> {
        let calibration = &self.fitted()?.calibration;
        Ok(ShareDiagnostics {
            shares: calibration.valid_shares.clone(),
            shares_mean: calibration.shares_mean(),
        })
    }

    fn to_record(&self) -> Result<ClassifierRecord> {
        let fitted = self.fitted()?;
        let state = fitted.clusterer.state().ok_or(ClassifierError::NotFitted)?;
        let metadata = RecordMetadata::from_calibration(
            KMEANS_TAG,
            self.config.n_labels,
            &fitted.calibration,
            fitted.mean_confidences.clone(),
        );
        ClassifierRecord::new(metadata, state)
    }

    fn restore(&mut self, record: ClassifierRecord) -> Result<()> {
        record.ensure_kind(KMEANS_TAG)?;
        let calibration = record.metadata.calibration()?;
        let state: KMeansState = record.model_state()?;
        if state.centroids.nrows() != record.metadata.k {
            return Err(ClassifierError::Serialization(format!(
                "record metadata lists {} clusters but the model has {} centroids",
                record.metadata.k,
                state.centroids.nrows()
            )));
        }

        let mut config = self.config.clone();
        config.n_labels = record.metadata.n_labels;
        config.kmeans.n_clusters = record.metadata.k;
        let clusterer = KMeans::from_state(config.kmeans, state)?;

        self.config = config;
        self.fitted = Some(FittedModel {
            clusterer,
            calibration,
            mean_confidences: record.metadata.mean_confidences,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::early_exit_mask;
    use crate::config::LabelPolicy;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    /// Four groups on a line; labels are mixed in group 2 and group 3 is a singleton.
    fn training_set() -> (Array2<f32>, Vec<usize>, Vec<f32>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..10 {
            rows.push([0.0 + i as f32 * 0.01, 0.0]);
            labels.push(0);
        }
        for i in 0..10 {
            rows.push([10.0 + i as f32 * 0.01, 0.0]);
            labels.push(if i == 0 { 0 } else { 1 });
        }
        for i in 0..10 {
            rows.push([20.0 + i as f32 * 0.01, 0.0]);
            labels.push(if i < 5 { 0 } else { 1 });
        }
        rows.push([40.0, 0.0]);
        labels.push(1);

        let embeddings =
            Array2::from_shape_vec((rows.len(), 2), rows.into_iter().flatten().collect()).unwrap();
        let confidences = vec![0.5; labels.len()];
        (embeddings, labels, confidences)
    }

    fn fitted() -> KMeansClassifier {
        let (x, y, c) = training_set();
        let mut classifier = KMeansClassifier::new(ClassifierConfig::new(2, 4).with_seed(17));
        classifier.fit(x.view(), &y, &c).expect("fit");
        classifier
    }

    #[test]
    fn fit_calibrates_threshold_from_cluster_purities() {
        let (x, y, c) = training_set();
        let mut classifier = KMeansClassifier::new(ClassifierConfig::new(2, 4).with_seed(17));
        let summary = classifier.fit(x.view(), &y, &c).expect("fit");

        assert_eq!(summary.n_samples, 31);
        assert_eq!(summary.n_aggregated, 31);
        assert_eq!(summary.n_unassigned, 0);

        // eligible purities: 1.0, 0.9, 0.5 (singleton excluded)
        let mut shares = classifier.diagnostics().unwrap().shares;
        shares.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(shares, vec![0.5, 0.9, 1.0]);
        assert_abs_diff_eq!(classifier.threshold().unwrap(), 0.66, epsilon = 1e-9);
        assert_abs_diff_eq!(
            classifier.diagnostics().unwrap().shares_mean,
            0.8,
            epsilon = 1e-9
        );
    }

    #[test]
    fn predict_emits_single_hot_purity_vectors() {
        let classifier = fitted();
        let queries = array![[0.02f32, 0.0], [10.05, 0.0], [20.05, 0.0], [40.0, 0.0]];
        let predictions = classifier.predict(queries.view()).unwrap();

        assert_eq!(predictions.dim(), (4, 2));
        assert_abs_diff_eq!(predictions[(0, 0)], 1.0);
        assert_eq!(predictions[(0, 1)], 0.0);
        assert_abs_diff_eq!(predictions[(1, 1)], 0.9);
        assert_eq!(predictions[(1, 0)], 0.0);
        // tie in the mixed cluster resolves to label 0
        assert_abs_diff_eq!(predictions[(2, 0)], 0.5);
        assert_abs_diff_eq!(predictions[(3, 1)], 1.0);

        let confidences = classifier.prediction_confidences(predictions.view());
        let mask = early_exit_mask(confidences.view(), classifier.threshold().unwrap());
        assert_eq!(mask, vec![true, true, false, true]);
    }

    #[test]
    fn predict_is_idempotent() {
        let classifier = fitted();
        let queries = array![[0.3f32, 0.1], [19.0, -1.0], [11.0, 2.0]];
        let first = classifier.predict(queries.view()).unwrap();
        let second = classifier.predict(queries.view()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unfitted_classifier_refuses_to_predict() {
        let classifier = KMeansClassifier::with_k(2, 3);
        assert!(!classifier.is_fitted());
        assert!(matches!(
            classifier.predict(array![[0.0f32, 0.0]].view()),
            Err(ClassifierError::NotFitted)
        ));
        assert!(matches!(
            classifier.threshold(),
            Err(ClassifierError::NotFitted)
        ));
        assert!(matches!(
            classifier.to_record(),
            Err(ClassifierError::NotFitted)
        ));
    }

    #[test]
    fn wrong_embedding_width_is_a_dimension_mismatch() {
        let classifier = fitted();
        let err = classifier
            .predict(array![[0.0f32, 0.0, 0.0]].view())
            .unwrap_err();
        assert!(matches!(
            err,
            ClassifierError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn only_singletons_leave_classifier_unfitted() {
        let x = array![[0.0f32], [5.0], [10.0]];
        let mut classifier = KMeansClassifier::new(ClassifierConfig::new(2, 3).with_seed(1));
        let err = classifier.fit(x.view(), &[0, 1, 0], &[1.0, 1.0, 1.0]).unwrap_err();
        assert!(matches!(err, ClassifierError::EmptyDistribution { .. }));
        assert!(!classifier.is_fitted());
    }

    #[test]
    fn out_of_range_labels_follow_policy() {
        let (x, mut y, c) = training_set();
        y[0] = 7;

        let mut skipping = KMeansClassifier::new(ClassifierConfig::new(2, 4).with_seed(17));
        let summary = skipping.fit(x.view(), &y, &c).unwrap();
        assert_eq!(summary.n_dropped_labels, 1);
        assert_eq!(summary.n_aggregated, 30);

        let mut strict = KMeansClassifier::new(
            ClassifierConfig::new(2, 4)
                .with_seed(17)
                .with_label_policy(LabelPolicy::Reject),
        );
        assert!(matches!(
            strict.fit(x.view(), &y, &c),
            Err(ClassifierError::LabelOutOfRange { label: 7, .. })
        ));
        assert!(!strict.is_fitted());
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let (x, y, _) = training_set();
        let mut classifier = KMeansClassifier::with_k(2, 4);
        assert!(matches!(
            classifier.fit(x.view(), &y, &[1.0]),
            Err(ClassifierError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn mean_confidences_are_kept_after_fit() {
        let classifier = fitted();
        let means = classifier.mean_confidences().expect("means");
        assert_eq!(means.dim(), (4, 2));
        assert!(means.iter().all(|m| *m == 0.0 || (*m - 0.5).abs() < 1e-9));
    }

    #[test]
    fn record_round_trip_preserves_behaviour() {
        let classifier = fitted();
        let record = classifier.to_record().unwrap();
        assert_eq!(record.kind(), KMEANS_TAG);
        assert_eq!(record.metadata.k, 4);

        let mut restored = KMeansClassifier::with_k(2, 1);
        restored.restore(record).unwrap();
        assert_eq!(restored.key_param(), 4);
        assert_eq!(restored.threshold().unwrap(), classifier.threshold().unwrap());

        let queries = array![[0.0f32, 0.0], [12.0, 1.0], [21.0, 0.0], [39.0, 0.0]];
        assert_eq!(
            restored.predict(queries.view()).unwrap(),
            classifier.predict(queries.view()).unwrap()
        );
        assert_eq!(restored.mean_confidences(), classifier.mean_confidences());
    }

    #[test]
    fn restore_rejects_foreign_type_tag() {
        let mut record = fitted().to_record().unwrap();
        record.metadata.kind = "gmm".to_string();
        let mut classifier = KMeansClassifier::with_k(2, 4);
        assert!(matches!(
            classifier.restore(record),
            Err(ClassifierError::TypeMismatch { .. })
        ));
        assert!(!classifier.is_fitted());
    }
}
