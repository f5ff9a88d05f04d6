//! Error types for the early-exit classifier.

use splitexit_cluster::ClusterError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClassifierError>;

#[derive(Error, Debug)]
pub enum ClassifierError {
    /// `predict`, `threshold` or `save` called before `fit`/`load`.
    #[error("classifier has not been fitted")]
    NotFitted,

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Persisted record was written by a different classifier type.
    #[error("type mismatch: expected model type '{expected}', found '{found}'")]
    TypeMismatch { expected: String, found: String },

    /// Threshold quantile over zero eligible clusters.
    #[error("no cluster has at least {min_cluster_size} labeled members; threshold is undefined")]
    EmptyDistribution { min_cluster_size: u64 },

    #[error("length mismatch: {embeddings} embeddings, {labels} labels, {confidences} confidences")]
    LengthMismatch {
        embeddings: usize,
        labels: usize,
        confidences: usize,
    },

    #[error("label {label} out of range for {n_labels} labels")]
    LabelOutOfRange { label: usize, n_labels: usize },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ClusterError> for ClassifierError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::DimensionMismatch { expected, actual } => {
                ClassifierError::DimensionMismatch { expected, actual }
            }
            ClusterError::NotFitted => ClassifierError::NotFitted,
            ClusterError::InvalidConfig(msg) => ClassifierError::InvalidConfig(msg),
            ClusterError::InvalidInput(msg) => ClassifierError::InvalidInput(msg),
        }
    }
}
