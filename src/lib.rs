//! splitexit: clustering-based early-exit classification for split-computing networks.
//!
//! Re-exports the clusterer and classifier crates under one roof.

pub use splitexit_classifier as classifier;
pub use splitexit_cluster as cluster;

pub use splitexit_classifier::{
    early_exit_mask, ClassifierConfig, ClassifierError, ClassifierRegistry, EarlyClassifier,
    KMeansClassifier, LabelPolicy,
};
pub use splitexit_cluster::{Clusterer, KMeans, KMeansConfig};
