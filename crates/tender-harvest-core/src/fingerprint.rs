//! Tender fingerprinting.
//!
//! A fingerprint is the SHA-256 digest (lowercase hex) of
//! `title | url | published_at`, computed over the trimmed title and URL.
//! A missing publication time contributes an empty string so that its
//! absence hashes the same way on every run.

use chrono::NaiveDateTime;
use sha2::{Digest, Sha256};

use crate::models::Candidate;

/// Separator placed between the hashed fields.
pub const FIELD_SEPARATOR: &str = "|";

/// Rendering of `published_at` inside the hashed string.
pub const PUBLISHED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Compute the dedup fingerprint for a tender.
///
/// # Example
///
/// ```rust
/// use tender_harvest_core::fingerprint::fingerprint;
///
/// let a = fingerprint(" Sunucu Alımı ", "http://x/1", None);
/// let b = fingerprint("Sunucu Alımı", "http://x/1", None);
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 64);
/// ```
pub fn fingerprint(title: &str, url: &str, published_at: Option<&NaiveDateTime>) -> String {
    let published = published_at
        .map(|p| p.format(PUBLISHED_AT_FORMAT).to_string())
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(title.trim().as_bytes());
    hasher.update(FIELD_SEPARATOR.as_bytes());
    hasher.update(url.trim().as_bytes());
    hasher.update(FIELD_SEPARATOR.as_bytes());
    hasher.update(published.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fingerprint of a candidate.
pub fn candidate_fingerprint(candidate: &Candidate) -> String {
    fingerprint(
        &candidate.title,
        &candidate.url,
        candidate.published_at.as_ref(),
    )
}
