//! On-disk record for fitted classifiers.
//!
//! A record is a bincode-encoded envelope: a metadata block carrying the type
//! tag and the calibrated per-cluster statistics, followed by the clusterer's
//! own state as an opaque byte string. The envelope decodes without knowing
//! which clusterer produced it, so the tag can be checked before the model
//! bytes are interpreted.

use crate::calibration::{Calibration, ClusterProfile};
use crate::error::{ClassifierError, Result};
use ndarray::Array2;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    #[serde(rename = "type")]
    pub kind: String,
    pub k: usize,
    pub n_labels: usize,
    pub max_labels: Vec<usize>,
    pub shares: Vec<f64>,
    pub cluster_sizes: Vec<u64>,
    pub valid_shares: Vec<f64>,
    pub share_threshold: f64,
    pub mean_confidences: Option<Array2<f64>>,
}

impl RecordMetadata {
    pub fn from_calibration(
        kind: &str,
        n_labels: usize,
        calibration: &Calibration,
        mean_confidences: Option<Array2<f64>>,
    ) -> Self {
        let profiles = &calibration.profiles;
        Self {
            kind: kind.to_string(),
            k: profiles.len(),
            n_labels,
            max_labels: profiles.iter().map(|p| p.dominant_label).collect(),
            shares: profiles.iter().map(|p| p.purity).collect(),
            cluster_sizes: profiles.iter().map(|p| p.size).collect(),
            valid_shares: calibration.valid_shares.clone(),
            share_threshold: calibration.threshold,
            mean_confidences,
        }
    }

    pub fn calibration(&self) -> Result<Calibration> {
        if self.max_labels.len() != self.k
            || self.shares.len() != self.k
            || self.cluster_sizes.len() != self.k
        {
            return Err(ClassifierError::Serialization(format!(
                "record metadata lists {} clusters but carries {} labels, {} shares, {} sizes",
                self.k,
                self.max_labels.len(),
                self.shares.len(),
                self.cluster_sizes.len()
            )));
        }
        let profiles = self
            .max_labels
            .iter()
            .zip(&self.shares)
            .zip(&self.cluster_sizes)
            .map(|((&dominant_label, &purity), &size)| ClusterProfile {
                dominant_label,
                purity,
                size,
            })
            .collect();
        Ok(Calibration {
            profiles,
            valid_shares: self.valid_shares.clone(),
            threshold: self.share_threshold,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierRecord {
    pub metadata: RecordMetadata,
    pub model: Vec<u8>,
}

impl ClassifierRecord {
    pub fn new<S: Serialize>(metadata: RecordMetadata, model_state: &S) -> Result<Self> {
        Ok(Self {
            metadata,
            model: encode(model_state)?,
        })
    }

    pub fn kind(&self) -> &str {
        &self.metadata.kind
    }

    pub fn ensure_kind(&self, expected: &str) -> Result<()> {
        if self.metadata.kind != expected {
            return Err(ClassifierError::TypeMismatch {
                expected: expected.to_string(),
                found: self.metadata.kind.clone(),
            });
        }
        Ok(())
    }

    pub fn model_state<S: DeserializeOwned>(&self) -> Result<S> {
        decode(&self.model)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| ClassifierError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (value, _): (T, usize) =
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ClassifierError::Serialization(e.to_string()))?;
    Ok(value)
}
