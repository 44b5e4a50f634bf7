//! # Tender Harvest Core
//!
//! Shared, I/O-free logic for Tender Harvest: tender data models, the
//! fingerprint used for deduplication, the keyword taxonomy classifier,
//! the relevance acceptance rule and estimator, and the store abstraction.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem dependencies.
//! Everything that touches the network or disk lives in the `tender-harvest`
//! app crate.

pub mod fingerprint;
pub mod models;
pub mod relevance;
pub mod store;
pub mod taxonomy;
