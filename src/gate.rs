//! Semantic relevance gate.
//!
//! Embeds the candidate text, compares it with the reference embedding of
//! the target subject area, and applies the acceptance rule from
//! [`tender_harvest_core::relevance`]. The reference embedding and the
//! optional estimator are loaded lazily on first use and then reused for
//! the lifetime of the gate.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;

use tender_harvest_core::models::RelevanceScore;
use tender_harvest_core::relevance::{
    embedding_only_version, mean_embedding, score_embedding, EstimatorError, LogisticEstimator,
    Thresholds,
};

use crate::config::RelevanceConfig;
use crate::embedding::{embed_one, EmbeddingProvider};

#[derive(Debug, Error)]
pub enum GateError {
    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),
    #[error("reference embedding unavailable: {0}")]
    Reference(String),
    #[error("estimator artifact {path}: {source}")]
    EstimatorLoad {
        path: String,
        #[source]
        source: EstimatorError,
    },
    #[error("failed to read estimator artifact {path}: {source}")]
    EstimatorRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// The estimator failed to load earlier in this process.
    #[error("estimator unavailable: {0}")]
    EstimatorUnavailable(String),
    #[error(transparent)]
    Scoring(#[from] EstimatorError),
}

/// Anything that can score a candidate's text for relevance.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    async fn score(&self, text: &str) -> Result<RelevanceScore, GateError>;
}

/// Embedding-backed [`RelevanceScorer`].
pub struct RelevanceGate {
    provider: Arc<dyn EmbeddingProvider>,
    thresholds: Thresholds,
    reference_texts: Vec<String>,
    estimator_path: Option<PathBuf>,
    reference: OnceCell<Vec<f32>>,
    /// Load failures are kept too, so a broken artifact is read only once.
    estimator: OnceCell<Result<Option<LogisticEstimator>, String>>,
}

impl RelevanceGate {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &RelevanceConfig) -> Self {
        Self {
            provider,
            thresholds: config.thresholds(),
            reference_texts: config
                .reference_texts
                .iter()
                .filter(|t| !t.trim().is_empty())
                .cloned()
                .collect(),
            estimator_path: config.estimator_path.clone(),
            reference: OnceCell::new(),
            estimator: OnceCell::new(),
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    async fn reference(&self) -> Result<&Vec<f32>, GateError> {
        self.reference
            .get_or_try_init(|| async {
                let vectors = self
                    .provider
                    .embed(&self.reference_texts)
                    .await
                    .map_err(GateError::Embedding)?;
                let mean = mean_embedding(&vectors).ok_or_else(|| {
                    GateError::Reference(
                        "reference texts produced no usable embeddings".to_string(),
                    )
                })?;
                tracing::debug!(
                    texts = self.reference_texts.len(),
                    dims = mean.len(),
                    "reference embedding ready"
                );
                Ok(mean)
            })
            .await
    }

    async fn estimator(&self) -> Result<Option<&LogisticEstimator>, GateError> {
        let loaded = self
            .estimator
            .get_or_init(|| async {
                load_estimator(self.estimator_path.as_deref()).map_err(|e| {
                    tracing::error!(error = %e, "relevance estimator failed to load");
                    e.to_string()
                })
            })
            .await;
        match loaded {
            Ok(estimator) => Ok(estimator.as_ref()),
            Err(msg) => Err(GateError::EstimatorUnavailable(msg.clone())),
        }
    }
}

/// A missing path or missing file means "no estimator".
fn load_estimator(path: Option<&std::path::Path>) -> Result<Option<LogisticEstimator>, GateError> {
    let Some(path) = path else {
        return Ok(None);
    };
    if !path.exists() {
        tracing::warn!(
            path = %path.display(),
            "estimator artifact not found; using embedding-only scoring"
        );
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|source| GateError::EstimatorRead {
        path: path.display().to_string(),
        source,
    })?;
    let estimator =
        LogisticEstimator::from_json(&content).map_err(|source| GateError::EstimatorLoad {
            path: path.display().to_string(),
            source,
        })?;
    tracing::info!(version = %estimator.version, "loaded relevance estimator");
    Ok(Some(estimator))
}

#[async_trait]
impl RelevanceScorer for RelevanceGate {
    async fn score(&self, text: &str) -> Result<RelevanceScore, GateError> {
        let reference = self.reference().await?;
        let estimator = self.estimator().await?;
        let embedding = embed_one(self.provider.as_ref(), text)
            .await
            .map_err(GateError::Embedding)?;

        let model_version = match estimator {
            Some(est) => est.version.clone(),
            None => embedding_only_version(self.provider.model_name()),
        };

        Ok(score_embedding(
            &embedding,
            reference,
            estimator,
            &model_version,
            &self.thresholds,
        )?)
    }
}
