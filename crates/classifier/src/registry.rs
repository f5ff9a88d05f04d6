//! Classifier lookup by type tag.

use crate::classifier::EarlyClassifier;
use crate::config::ClassifierConfig;
use crate::error::{ClassifierError, Result};
use crate::kmeans::{KMeansClassifier, KMEANS_TAG};
use crate::persistence::ClassifierRecord;
use std::path::Path;
use tracing::info;

pub type DynClassifier = Box<dyn EarlyClassifier>;
pub type ClassifierFactory = fn(ClassifierConfig) -> DynClassifier;

#[derive(Clone, Default)]
pub struct ClassifierRegistry {
    factories: Vec<(&'static str, ClassifierFactory)>,
}

impl ClassifierRegistry {
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    pub fn with_default_classifiers() -> Self {
        let mut registry = Self::new();
        registry.register(KMEANS_TAG, kmeans_factory);
        registry
    }

    /// Register a factory. A later registration for the same tag wins.
    pub fn register(&mut self, kind: &'static str, factory: ClassifierFactory) {
        self.factories.retain(|(existing, _)| *existing != kind);
        self.factories.push((kind, factory));
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.factories.iter().map(|(kind, _)| *kind).collect()
    }

    fn find(&self, kind: &str) -> Option<ClassifierFactory> {
        self.factories
            .iter()
            .find(|(existing, _)| *existing == kind)
            .map(|(_, factory)| *factory)
    }

    pub fn create(&self, kind: &str, config: ClassifierConfig) -> Result<DynClassifier> {
        let factory = self.find(kind).ok_or_else(|| {
            ClassifierError::InvalidConfig(format!(
                "unknown classifier type '{}', expected one of [{}]",
                kind,
                self.kinds().join(", ")
            ))
        })?;
        Ok(factory(config))
    }

    /// Load a persisted classifier, picking the implementation from the record's tag.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<DynClassifier> {
        let path = path.as_ref();
        let record = ClassifierRecord::load(path)?;
        let factory = self
            .find(record.kind())
            .ok_or_else(|| ClassifierError::TypeMismatch {
                expected: self.kinds().join("|"),
                found: record.kind().to_string(),
            })?;

        let config = ClassifierConfig::new(record.metadata.n_labels, record.metadata.k);
        let mut classifier = factory(config);
        classifier.restore(record)?;
        info!(
            kind = classifier.kind(),
            key_param = classifier.key_param(),
            path = %path.display(),
            "loaded classifier from registry"
        );
        Ok(classifier)
    }
}

fn kmeans_factory(config: ClassifierConfig) -> DynClassifier {
    Box::new(KMeansClassifier::new(config))
}
