//! Fingerprint-based insert-if-new.

use tender_harvest_core::fingerprint::candidate_fingerprint;
use tender_harvest_core::models::{Candidate, NewTender, PersistedTender, RelevanceScore, Source};
use tender_harvest_core::store::{StoreError, TenderStore};

/// Persist `candidate` unless a tender with the same fingerprint exists.
///
/// Returns `Ok(None)` for an already-known tender, including one inserted
/// by a concurrent writer between the lookup and the insert.
pub async fn insert_if_new(
    store: &dyn TenderStore,
    candidate: &Candidate,
    source: &Source,
    category: &str,
    relevance: RelevanceScore,
) -> Result<Option<PersistedTender>, StoreError> {
    let candidate = candidate.normalized();
    let fingerprint = candidate_fingerprint(&candidate);

    if store.find_by_fingerprint(&fingerprint).await?.is_some() {
        tracing::debug!(source = %source.slug, %fingerprint, "already known");
        return Ok(None);
    }

    let tender = NewTender {
        source_id: source.id,
        title: candidate.title,
        url: candidate.url,
        description: candidate.description,
        published_at: candidate.published_at,
        fingerprint,
        category: category.to_string(),
        relevance,
    };

    match store.insert(&tender).await {
        Ok(saved) => Ok(Some(saved)),
        Err(StoreError::Duplicate(_)) => {
            tracing::debug!(
                source = %source.slug,
                fingerprint = %tender.fingerprint,
                "lost insert race; already known"
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
