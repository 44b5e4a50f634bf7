//! Relevance scoring rules and vector utilities.
//!
//! The relevance gate admits a candidate only when both its cosine
//! similarity to the reference embedding and its acceptance probability
//! clear their thresholds. The probability comes from a
//! [`LogisticEstimator`] when one is configured; otherwise the similarity is
//! reused as the probability and the result is tagged with
//! [`embedding_only_version`].
//!
//! The embedding calls themselves live in the `tender-harvest` app crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::RelevanceScore;

/// Prefix of the model version used when no estimator is configured.
pub const EMBEDDING_ONLY_PREFIX: &str = "emb_only";

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.70;
pub const DEFAULT_PROBABILITY_THRESHOLD: f64 = 0.85;

/// Acceptance thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub similarity: f64,
    pub probability: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            similarity: DEFAULT_SIMILARITY_THRESHOLD,
            probability: DEFAULT_PROBABILITY_THRESHOLD,
        }
    }
}

impl Thresholds {
    /// Both conditions must hold.
    pub fn accepts(&self, similarity: f64, probability: f64) -> bool {
        similarity >= self.similarity && probability >= self.probability
    }
}

#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("failed to parse estimator artifact: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("estimator expects {expected} features, embedding has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("estimator artifact has no weights")]
    Empty,
}

/// Logistic-regression probability estimator over an embedding.
///
/// Stored as JSON:
///
/// ```json
/// { "version": "clf_v1", "weights": [0.12, -0.4, ...], "bias": -1.3 }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticEstimator {
    #[serde(default = "default_estimator_version")]
    pub version: String,
    pub weights: Vec<f32>,
    #[serde(default)]
    pub bias: f32,
}

fn default_estimator_version() -> String {
    "clf_v1".to_string()
}

impl LogisticEstimator {
    pub fn from_json(content: &str) -> Result<Self, EstimatorError> {
        let estimator: Self = serde_json::from_str(content)?;
        if estimator.weights.is_empty() {
            return Err(EstimatorError::Empty);
        }
        Ok(estimator)
    }

    /// Probability of the positive (relevant) class.
    pub fn predict_proba(&self, features: &[f32]) -> Result<f64, EstimatorError> {
        if features.len() != self.weights.len() {
            return Err(EstimatorError::DimensionMismatch {
                expected: self.weights.len(),
                actual: features.len(),
            });
        }
        let z: f64 = self
            .weights
            .iter()
            .zip(features)
            .map(|(w, x)| f64::from(*w) * f64::from(*x))
            .sum::<f64>()
            + f64::from(self.bias);
        Ok(sigmoid(z))
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Model version recorded when the similarity doubles as the probability.
pub fn embedding_only_version(embedding_model: &str) -> String {
    format!("{}:{}", EMBEDDING_ONLY_PREFIX, embedding_model)
}

/// Score one embedding against the reference embedding.
///
/// `model_version` should be the estimator's version when `estimator` is
/// `Some`, and [`embedding_only_version`] otherwise.
pub fn score_embedding(
    embedding: &[f32],
    reference: &[f32],
    estimator: Option<&LogisticEstimator>,
    model_version: &str,
    thresholds: &Thresholds,
) -> Result<RelevanceScore, EstimatorError> {
    let similarity = f64::from(cosine_similarity(embedding, reference));
    let probability = match estimator {
        Some(est) => est.predict_proba(embedding)?,
        None => similarity,
    };

    Ok(RelevanceScore {
        accept: thresholds.accepts(similarity, probability),
        similarity,
        probability,
        model_version: model_version.to_string(),
    })
}

/// Element-wise mean of a set of vectors.
///
/// Returns `None` when `vectors` is empty or the lengths disagree.
pub fn mean_embedding(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let dims = first.len();
    if dims == 0 || vectors.iter().any(|v| v.len() != dims) {
        return None;
    }

    let mut mean = vec![0.0f32; dims];
    for v in vectors {
        for (acc, x) in mean.iter_mut().zip(v) {
            *acc += x;
        }
    }
    let n = vectors.len() as f32;
    for acc in &mut mean {
        *acc /= n;
    }
    Some(mean)
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or vectors
/// of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
