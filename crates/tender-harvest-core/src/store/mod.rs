//! Storage abstraction for Tender Harvest.
//!
//! The [`TenderStore`] trait is the persistence gateway used by the
//! ingestion pipeline and the maintenance commands, enabling pluggable
//! backends (SQLite in the app crate, in-memory for tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`health_check`](TenderStore::health_check) | Verify the backend is reachable |
//! | [`ensure_source`](TenderStore::ensure_source) | Create a source by slug if absent |
//! | [`find_by_fingerprint`](TenderStore::find_by_fingerprint) | Dedup lookup |
//! | [`insert`](TenderStore::insert) | Write a new tender; fails with [`StoreError::Duplicate`] on a known fingerprint |
//! | [`query`](TenderStore::query) | Filtered listing for read-side consumers |
//! | [`all_tenders`](TenderStore::all_tenders) | Full scan for batch recategorization |
//! | [`update_category`](TenderStore::update_category) | Change one tender's category |

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{NewTender, PersistedTender, Source, SourceInfo, TenderFilter};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A tender with this fingerprint is already stored.
    #[error("tender with fingerprint {0} already exists")]
    Duplicate(String),
    /// The backend cannot be reached at all.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate(_))
    }
}

/// Persistence gateway for sources and tenders.
#[async_trait]
pub trait TenderStore: Send + Sync {
    /// Returns [`StoreError::Unavailable`] when no connection can be made.
    async fn health_check(&self) -> Result<(), StoreError>;

    /// Idempotent create-by-slug. Refreshes display name and URL.
    async fn ensure_source(&self, info: &SourceInfo) -> Result<Source, StoreError>;

    async fn list_sources(&self) -> Result<Vec<Source>, StoreError>;

    async fn find_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<PersistedTender>, StoreError>;

    /// Insert a tender atomically.
    ///
    /// A uniqueness conflict on the fingerprint, including one caused by a
    /// concurrent writer, is reported as [`StoreError::Duplicate`].
    async fn insert(&self, tender: &NewTender) -> Result<PersistedTender, StoreError>;

    /// Tenders matching `filter`, newest publication first.
    async fn query(&self, filter: &TenderFilter) -> Result<Vec<PersistedTender>, StoreError>;

    async fn all_tenders(&self) -> Result<Vec<PersistedTender>, StoreError>;

    async fn update_category(&self, id: i64, category: &str) -> Result<(), StoreError>;
}
