//! Cluster-purity early-exit classifier.
//!
//! Fitting runs an unsupervised clusterer over training embeddings, counts the
//! true labels routed to each cluster, and calibrates a global acceptance
//! threshold as a low quantile of the cluster purities. Prediction maps an
//! embedding to a single-hot vector holding its cluster's purity at the
//! cluster's dominant label; callers exit early when that confidence reaches
//! the threshold.

pub mod calibration;
pub mod classifier;
pub mod config;
pub mod error;
pub mod kmeans;
pub mod persistence;
pub mod registry;
pub mod shares;

pub use calibration::{
    cluster_profiles, confidence_vectors, quantile, Calibration, ClusterProfile,
    ThresholdCalibrator,
};
pub use classifier::{early_exit_mask, prediction_confidences, EarlyClassifier, FitSummary, ShareDiagnostics};
pub use config::{ClassifierConfig, LabelPolicy};
pub use error::{ClassifierError, Result};
pub use kmeans::{KMeansClassifier, KMEANS_TAG};
pub use persistence::{ClassifierRecord, RecordMetadata};
pub use registry::{ClassifierFactory, ClassifierRegistry, DynClassifier};
pub use shares::{aggregate, AggregationStats, LabelShares, ShareAccumulator};
