//! Early-exit evaluation over labeled datasets.
//!
//! Runs a fitted classifier on every example, applies the calibrated
//! threshold, and summarizes how many inputs would exit early and how often
//! the exited predictions agree with the true label.

use crate::dataset::EmbeddingDataset;
use anyhow::Result;
use ndarray::{ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use splitexit_classifier::{early_exit_mask, EarlyClassifier};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Per-input output of `predict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub index: usize,
    /// Dominant label of the assigned cluster; `None` when no label carries confidence.
    pub label: Option<usize>,
    pub confidence: f32,
    pub early_exit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitReport {
    pub kind: String,
    pub key_param: usize,
    pub generated_at_unix_ms: u128,
    pub n_samples: usize,
    pub threshold: f64,
    pub exited: usize,
    pub exit_rate: f64,
    /// Accuracy over the exited inputs; `None` when nothing exits.
    pub exit_accuracy: Option<f64>,
    pub overall_accuracy: f64,
}

pub fn predict_records(
    classifier: &dyn EarlyClassifier,
    dataset: &EmbeddingDataset,
) -> Result<Vec<PredictionRecord>> {
    let embeddings = dataset.embedding_matrix()?;
    let predictions = classifier.predict(embeddings.view())?;
    let confidences = classifier.prediction_confidences(predictions.view());
    let mask = early_exit_mask(confidences.view(), classifier.threshold()?);

    Ok(predictions
        .axis_iter(Axis(0))
        .zip(confidences.iter().zip(mask))
        .enumerate()
        .map(|(index, (row, (confidence, early_exit)))| PredictionRecord {
            index,
            label: predicted_label(row),
            confidence: *confidence,
            early_exit,
        })
        .collect())
}

pub fn evaluate(classifier: &dyn EarlyClassifier, dataset: &EmbeddingDataset) -> Result<ExitReport> {
    let labels = dataset.labels()?;
    let records = predict_records(classifier, dataset)?;

    let mut exited = 0usize;
    let mut exited_correct = 0usize;
    let mut correct = 0usize;
    for (record, truth) in records.iter().zip(labels) {
        let hit = record.label == Some(*truth);
        if hit {
            correct += 1;
        }
        if record.early_exit {
            exited += 1;
            if hit {
                exited_correct += 1;
            }
        }
    }

    let n_samples = records.len();
    let ratio = |num: usize, den: usize| {
        if den == 0 {
            0.0
        } else {
            num as f64 / den as f64
        }
    };

    let generated_at_unix_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_millis();

    Ok(ExitReport {
        kind: classifier.kind().to_string(),
        key_param: classifier.key_param(),
        generated_at_unix_ms,
        n_samples,
        threshold: classifier.threshold()?,
        exited,
        exit_rate: ratio(exited, n_samples),
        exit_accuracy: (exited > 0).then(|| ratio(exited_correct, exited)),
        overall_accuracy: ratio(correct, n_samples),
    })
}

/// First label holding the row maximum, if that maximum is positive.
fn predicted_label(row: ArrayView1<'_, f32>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (label, &value) in row.iter().enumerate() {
        if value > 0.0 && best.map_or(true, |(_, max)| value > max) {
            best = Some((label, value));
        }
    }
    best.map(|(label, _)| label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use splitexit_classifier::{ClassifierConfig, KMeansClassifier};

    fn dataset() -> EmbeddingDataset {
        // cluster near 0: all label 0; cluster near 10: 3 of 4 label 1
        EmbeddingDataset {
            embeddings: vec![
                vec![0.0],
                vec![0.1],
                vec![0.2],
                vec![0.3],
                vec![10.0],
                vec![10.1],
                vec![10.2],
                vec![10.3],
            ],
            labels: Some(vec![0, 0, 0, 0, 1, 1, 1, 0]),
            confidences: None,
        }
    }

    fn fitted(data: &EmbeddingDataset) -> KMeansClassifier {
        let mut classifier = KMeansClassifier::new(ClassifierConfig::new(2, 2).with_seed(2));
        classifier
            .fit(
                data.embedding_matrix().unwrap().view(),
                data.labels().unwrap(),
                &data.confidences_or_default().unwrap(),
            )
            .unwrap();
        classifier
    }

    #[test]
    fn report_counts_exits_and_accuracy() {
        let data = dataset();
        let classifier = fitted(&data);
        // purities 1.0 and 0.75 -> threshold 0.75 + 0.2 * 0.25 = 0.8
        assert_abs_diff_eq!(classifier.threshold().unwrap(), 0.8, epsilon = 1e-9);

        let report = evaluate(&classifier, &data).unwrap();
        assert_eq!(report.kind, "kmeans");
        assert_eq!(report.key_param, 2);
        assert_eq!(report.n_samples, 8);
        assert_eq!(report.exited, 4);
        assert_abs_diff_eq!(report.exit_rate, 0.5);
        assert_eq!(report.exit_accuracy, Some(1.0));
        assert_abs_diff_eq!(report.overall_accuracy, 7.0 / 8.0);
    }

    #[test]
    fn prediction_records_carry_labels_and_decisions() {
        let data = dataset();
        let classifier = fitted(&data);
        let records = predict_records(&classifier, &data).unwrap();
        assert_eq!(records.len(), 8);
        assert_eq!(records[0].label, Some(0));
        assert!(records[0].early_exit);
        assert_eq!(records[5].label, Some(1));
        assert_abs_diff_eq!(records[5].confidence, 0.75);
        assert!(!records[5].early_exit);
    }

    #[test]
    fn zero_rows_have_no_label() {
        assert_eq!(predicted_label(array![0.0f32, 0.0].view()), None);
        assert_eq!(predicted_label(array![0.0f32, 0.4, 0.4].view()), Some(1));
    }
}
