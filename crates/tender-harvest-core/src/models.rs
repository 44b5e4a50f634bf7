//! Core data models used throughout Tender Harvest.
//!
//! These types represent the sources, candidates, and persisted tenders that
//! flow through the ingestion pipeline. Candidates are ephemeral and live only
//! within one run; persisted tenders are append-only apart from their category.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of an origin portal, as reported by its extractor.
///
/// `slug` is the stable join key for every tender harvested from the portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub slug: String,
    pub name: String,
    pub url: String,
}

/// A registered source row.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Raw tender emitted by an extractor before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub published_at: Option<NaiveDateTime>,
}

impl Candidate {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            description: None,
            published_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_published_at(mut self, published_at: NaiveDateTime) -> Self {
        self.published_at = Some(published_at);
        self
    }

    /// Trims title, URL and description; an empty description becomes `None`.
    pub fn normalized(&self) -> Candidate {
        Candidate {
            title: self.title.trim().to_string(),
            url: self.url.trim().to_string(),
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            published_at: self.published_at,
        }
    }

    /// Text fed to the relevance gate: title, newline, description.
    pub fn relevance_text(&self) -> String {
        format!(
            "{}\n{}",
            self.title,
            self.description.as_deref().unwrap_or_default()
        )
    }
}

/// Output of the relevance gate for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceScore {
    pub accept: bool,
    pub similarity: f64,
    pub probability: f64,
    /// Which estimator (or the embedding-only fallback) produced `probability`.
    pub model_version: String,
}

/// A fully prepared tender, ready to be written by a [`TenderStore`](crate::store::TenderStore).
#[derive(Debug, Clone)]
pub struct NewTender {
    pub source_id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<NaiveDateTime>,
    pub fingerprint: String,
    pub category: String,
    pub relevance: RelevanceScore,
}

/// The durable tender record.
#[derive(Debug, Clone, Serialize)]
pub struct PersistedTender {
    pub id: i64,
    pub source_id: i64,
    pub source_slug: String,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<NaiveDateTime>,
    pub fingerprint: String,
    pub category: String,
    pub similarity: f64,
    pub probability: f64,
    pub model_version: String,
    pub created_at: DateTime<Utc>,
}

/// Filters for read-side tender queries.
#[derive(Debug, Clone)]
pub struct TenderFilter {
    /// Case-insensitive substring match against title or description.
    pub query: Option<String>,
    pub source_slug: Option<String>,
    pub published_from: Option<NaiveDateTime>,
    pub published_to: Option<NaiveDateTime>,
    pub category: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for TenderFilter {
    fn default() -> Self {
        Self {
            query: None,
            source_slug: None,
            published_from: None,
            published_to: None,
            category: None,
            limit: 50,
            offset: 0,
        }
    }
}
