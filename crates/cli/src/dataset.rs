//! JSON datasets of embeddings with optional labels and confidence scores.

use anyhow::{bail, Context, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use splitexit_classifier::ClassifierError;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingDataset {
    pub embeddings: Vec<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<usize>>,
    /// Upstream confidence per example. Missing scores default to 1.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidences: Option<Vec<f32>>,
}

impl EmbeddingDataset {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let data = fs::read(path)
            .with_context(|| format!("cannot read dataset '{}'", path.display()))?;
        let dataset = serde_json::from_slice(&data)
            .with_context(|| format!("cannot parse dataset '{}'", path.display()))?;
        Ok(dataset)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let blob = serde_json::to_vec_pretty(self)?;
        fs::write(path, blob)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.embeddings.first().map(Vec::len).unwrap_or(0)
    }

    /// Stack the rows into an `[n, dim]` matrix. Ragged rows are an error.
    pub fn embedding_matrix(&self) -> Result<Array2<f32>> {
        let dim = self.dim();
        for (idx, row) in self.embeddings.iter().enumerate() {
            if row.len() != dim {
                return Err(ClassifierError::DimensionMismatch {
                    expected: dim,
                    actual: row.len(),
                })
                .with_context(|| format!("embedding row {}", idx));
            }
        }
        let flat: Vec<f32> = self.embeddings.iter().flatten().copied().collect();
        Ok(Array2::from_shape_vec((self.len(), dim), flat)?)
    }

    pub fn labels(&self) -> Result<&[usize]> {
        let labels = self
            .labels
            .as_deref()
            .context("dataset has no labels")?;
        if labels.len() != self.len() {
            bail!(
                "dataset has {} embeddings but {} labels",
                self.len(),
                labels.len()
            );
        }
        Ok(labels)
    }

    pub fn confidences_or_default(&self) -> Result<Vec<f32>> {
        match &self.confidences {
            Some(scores) if scores.len() != self.len() => bail!(
                "dataset has {} embeddings but {} confidences",
                self.len(),
                scores.len()
            ),
            Some(scores) => Ok(scores.clone()),
            None => Ok(vec![1.0; self.len()]),
        }
    }
}
