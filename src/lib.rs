//! # Tender Harvest
//!
//! Harvests public procurement announcements ("tenders") from configured
//! portals, drops the ones a semantic relevance gate rejects, classifies the
//! rest with a keyword taxonomy, and stores each tender exactly once.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌────────────────┐   ┌──────────┐   ┌──────────┐
//! │ Extractors  │──▶│ Relevance gate │──▶│ Taxonomy │──▶│  SQLite  │
//! │ html / json │   │ embed + score  │   │ classify │   │  dedup   │
//! └─────────────┘   └────────────────┘   └──────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! tenders init                  # create database
//! tenders run                   # harvest every configured source
//! tenders run --source dmo      # harvest one source
//! tenders list --category bilisim_teknolojileri
//! tenders recategorize --dry-run
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and env overrides |
//! | [`extract`] | Source extractor trait, registry, built-in extractors |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`gate`] | Relevance gate with cached reference embedding |
//! | [`dedup`] | Fingerprint insert-if-new |
//! | [`ingest`] | Run orchestrator |
//! | [`sqlite_store`] | SQLite persistence gateway |
//! | [`recategorize`] | Batch category correction |
//! | [`list`] | Filtered tender listing |
//! | [`inspect`] | `classify`, `score` and `categories` commands |
//! | [`sources`] | Configured source listing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod dedup;
pub mod embedding;
pub mod extract;
pub mod gate;
pub mod ingest;
pub mod inspect;
pub mod list;
pub mod migrate;
pub mod recategorize;
pub mod sources;
pub mod sqlite_store;
