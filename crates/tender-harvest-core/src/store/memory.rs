//! In-memory [`TenderStore`] implementation for testing.
//!
//! Uses `Vec`s behind a `std::sync::RwLock`. The fingerprint uniqueness rule
//! is enforced inside the write lock, so it behaves like a storage-level
//! unique constraint under concurrent callers.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::models::{NewTender, PersistedTender, Source, SourceInfo, TenderFilter};

use super::{StoreError, TenderStore};

#[derive(Default)]
struct Inner {
    sources: Vec<Source>,
    tenders: Vec<PersistedTender>,
}

/// In-memory store for tests.
pub struct InMemoryStore {
    inner: RwLock<Inner>,
    offline: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            offline: AtomicBool::new(false),
        }
    }

    /// Simulate a backend that cannot be reached.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, AtomicOrdering::SeqCst);
    }

    pub fn tender_count(&self) -> usize {
        self.read().map(|i| i.tenders.len()).unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.check_online()?;
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        self.check_online()?;
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store is offline".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_filter(t: &PersistedTender, filter: &TenderFilter) -> bool {
    if let Some(q) = &filter.query {
        let q = q.to_lowercase();
        let in_title = t.title.to_lowercase().contains(&q);
        let in_desc = t
            .description
            .as_deref()
            .map(|d| d.to_lowercase().contains(&q))
            .unwrap_or(false);
        if !in_title && !in_desc {
            return false;
        }
    }
    if let Some(slug) = &filter.source_slug {
        if &t.source_slug != slug {
            return false;
        }
    }
    if let Some(from) = &filter.published_from {
        if t.published_at.map_or(true, |p| p < *from) {
            return false;
        }
    }
    if let Some(to) = &filter.published_to {
        if t.published_at.map_or(true, |p| p > *to) {
            return false;
        }
    }
    if let Some(category) = &filter.category {
        if &t.category != category {
            return false;
        }
    }
    true
}

#[async_trait]
impl TenderStore for InMemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.check_online()
    }

    async fn ensure_source(&self, info: &SourceInfo) -> Result<Source, StoreError> {
        let mut inner = self.write()?;
        if let Some(existing) = inner.sources.iter_mut().find(|s| s.slug == info.slug) {
            existing.name = info.name.clone();
            existing.url = info.url.clone();
            return Ok(existing.clone());
        }
        let source = Source {
            id: inner.sources.len() as i64 + 1,
            slug: info.slug.clone(),
            name: info.name.clone(),
            url: info.url.clone(),
            created_at: Utc::now(),
        };
        inner.sources.push(source.clone());
        Ok(source)
    }

    async fn list_sources(&self) -> Result<Vec<Source>, StoreError> {
        Ok(self.read()?.sources.clone())
    }

    async fn find_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<PersistedTender>, StoreError> {
        Ok(self
            .read()?
            .tenders
            .iter()
            .find(|t| t.fingerprint == fingerprint)
            .cloned())
    }

    async fn insert(&self, tender: &NewTender) -> Result<PersistedTender, StoreError> {
        let mut inner = self.write()?;
        if inner
            .tenders
            .iter()
            .any(|t| t.fingerprint == tender.fingerprint)
        {
            return Err(StoreError::Duplicate(tender.fingerprint.clone()));
        }
        let source_slug = inner
            .sources
            .iter()
            .find(|s| s.id == tender.source_id)
            .map(|s| s.slug.clone())
            .ok_or_else(|| StoreError::NotFound(format!("source id {}", tender.source_id)))?;

        let persisted = PersistedTender {
            id: inner.tenders.len() as i64 + 1,
            source_id: tender.source_id,
            source_slug,
            title: tender.title.clone(),
            url: tender.url.clone(),
            description: tender.description.clone(),
            published_at: tender.published_at,
            fingerprint: tender.fingerprint.clone(),
            category: tender.category.clone(),
            similarity: tender.relevance.similarity,
            probability: tender.relevance.probability,
            model_version: tender.relevance.model_version.clone(),
            created_at: Utc::now(),
        };
        inner.tenders.push(persisted.clone());
        Ok(persisted)
    }

    async fn query(&self, filter: &TenderFilter) -> Result<Vec<PersistedTender>, StoreError> {
        let inner = self.read()?;
        let mut results: Vec<PersistedTender> = inner
            .tenders
            .iter()
            .filter(|t| matches_filter(t, filter))
            .cloned()
            .collect();
        // Newest publication first, unknown dates last, then newest id.
        results.sort_by(|a, b| match (a.published_at, b.published_at) {
            (Some(pa), Some(pb)) => pb.cmp(&pa).then(b.id.cmp(&a.id)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => b.id.cmp(&a.id),
        });
        Ok(results
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn all_tenders(&self) -> Result<Vec<PersistedTender>, StoreError> {
        Ok(self.read()?.tenders.clone())
    }

    async fn update_category(&self, id: i64, category: &str) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let tender = inner
            .tenders
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("tender id {}", id)))?;
        tender.category = category.to_string();
        Ok(())
    }
}
