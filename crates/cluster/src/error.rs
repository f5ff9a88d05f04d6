//! Error types for clustering.

use thiserror::Error;

pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusterError {
    /// Input rows do not match the fitted dimensionality.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// `predict` or state export was called before `fit`.
    #[error("clusterer has not been fitted")]
    NotFitted,

    #[error("invalid clustering config: {0}")]
    InvalidConfig(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ClusterError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
