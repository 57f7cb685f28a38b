use std::fmt;
use std::sync::Arc;

use shared::ImagePrediction;

use super::model::{Classifier, InferenceError};
use super::preprocess::Preprocessor;
use crate::labels::LabelSet;

/// Result of classifying a single image.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub index: usize,
    pub label: String,
    pub confidence: f32,
    pub distribution: Vec<f32>,
}

impl Prediction {
    /// Picks the most probable label. Ties go to the lowest index.
    pub fn from_distribution(
        labels: &LabelSet,
        distribution: Vec<f32>,
    ) -> Result<Self, InferenceError> {
        if distribution.len() != labels.len() {
            return Err(InferenceError::LabelMismatch {
                expected: labels.len(),
                actual: distribution.len(),
            });
        }
        let (index, confidence) = argmax(&distribution).ok_or(InferenceError::EmptyOutput)?;
        let label = labels
            .get(index)
            .ok_or(InferenceError::LabelMismatch {
                expected: labels.len(),
                actual: distribution.len(),
            })?
            .to_string();
        Ok(Self {
            index,
            label,
            confidence,
            distribution,
        })
    }

    /// Indices of the `k` most likely classes, highest first.
    pub fn top_k(&self, k: usize) -> Vec<usize> {
        let mut indexed: Vec<usize> = (0..self.distribution.len()).collect();
        indexed.sort_by(|&a, &b| {
            self.distribution[b]
                .partial_cmp(&self.distribution[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        indexed.truncate(k);
        indexed
    }

    pub fn to_wire(&self) -> ImagePrediction {
        ImagePrediction {
            disease: self.label.clone(),
            confidence: self.confidence,
            all: self.distribution.clone(),
        }
    }
}

/// First index holding the maximum value. NaN entries never win.
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &value) in values.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((index, value)),
        }
    }
    best
}

/// Preprocesses raw image bytes and classifies them against the label set.
#[derive(Clone)]
pub struct Predictor {
    preprocessor: Preprocessor,
    classifier: Arc<dyn Classifier>,
    labels: Arc<LabelSet>,
}

impl fmt::Debug for Predictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predictor")
            .field("preprocessor", &self.preprocessor)
            .field("labels", &self.labels.len())
            .finish_non_exhaustive()
    }
}

impl Predictor {
    pub fn new(
        preprocessor: Preprocessor,
        classifier: Arc<dyn Classifier>,
        labels: Arc<LabelSet>,
    ) -> Self {
        Self {
            preprocessor,
            classifier,
            labels,
        }
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn predict(&self, image: &[u8]) -> Result<Prediction, InferenceError> {
        let tensor = self.preprocessor.preprocess(image)?;
        let distribution = self.classifier.classify(&tensor)?;
        Prediction::from_distribution(&self.labels, distribution)
    }

    /// Runs one forward pass on a blank input and checks that the classifier's
    /// output width matches the label count.
    pub fn verify_output_width(&self) -> Result<usize, InferenceError> {
        let probe = ndarray::Array4::<f32>::zeros(self.preprocessor.input_shape());
        let width = self.classifier.classify(&probe)?.len();
        if width != self.labels.len() {
            return Err(InferenceError::LabelMismatch {
                expected: self.labels.len(),
                actual: width,
            });
        }
        Ok(width)
    }
}
