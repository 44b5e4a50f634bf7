//! Ingestion run orchestration.
//!
//! One run walks the selected sources in registry order:
//!
//! ```text
//! ensure source → extract → for each candidate:
//!     relevance gate → (accepted) classify → insert-if-new
//! ```
//!
//! Failures are absorbed at the smallest scope that contains them: a bad
//! candidate is skipped, a failing source contributes zero and the run moves
//! on. Only an unreachable store at start-up fails the run.

use anyhow::{Context, Result};
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use tender_harvest_core::models::{Candidate, Source};
use tender_harvest_core::store::{StoreError, TenderStore};
use tender_harvest_core::taxonomy::Taxonomy;

use crate::config::Config;
use crate::dedup::insert_if_new;
use crate::embedding::create_provider;
use crate::extract::{ExtractError, ExtractorRegistry, SourceExtractor};
use crate::gate::{RelevanceGate, RelevanceScorer};
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] StoreError),
    #[error("unknown source: '{0}'")]
    UnknownSource(String),
}

/// Orchestrator lifecycle for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    /// Processing the source at this index of the selection.
    RunningSource(usize),
    Completed,
    Failed,
}

/// Counts for one source.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceOutcome {
    pub slug: String,
    pub inserted: u64,
    pub rejected: u64,
    pub duplicates: u64,
    pub skipped: u64,
    /// Set when the source stopped early.
    pub error: Option<String>,
}

/// Result of one run, consumed by downstream notifiers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub inserted_count: u64,
    pub per_source: Vec<SourceOutcome>,
    pub errors: Vec<String>,
}

enum CandidateOutcome {
    Inserted,
    Rejected,
    Duplicate,
    Skipped,
}

pub struct Orchestrator<'a> {
    store: &'a dyn TenderStore,
    scorer: &'a dyn RelevanceScorer,
    taxonomy: &'a Taxonomy,
    state: RunState,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        store: &'a dyn TenderStore,
        scorer: &'a dyn RelevanceScorer,
        taxonomy: &'a Taxonomy,
    ) -> Self {
        Self {
            store,
            scorer,
            taxonomy,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run every extractor in `sources`, sequentially and in order.
    pub async fn run(&mut self, sources: &[&dyn SourceExtractor]) -> Result<RunReport, RunError> {
        if let Err(e) = self.store.health_check().await {
            self.state = RunState::Failed;
            tracing::error!(error = %e, "storage unavailable; run aborted");
            return Err(RunError::StorageUnavailable(e));
        }

        let mut report = RunReport::default();

        for (i, extractor) in sources.iter().enumerate() {
            self.state = RunState::RunningSource(i);
            let outcome = self.run_source(*extractor).await;

            report.inserted_count += outcome.inserted;
            if let Some(err) = &outcome.error {
                report.errors.push(format!("{}: {}", outcome.slug, err));
            }
            report.per_source.push(outcome);
        }

        self.state = RunState::Completed;
        tracing::info!(inserted = report.inserted_count, "run completed");
        Ok(report)
    }

    async fn run_source(&self, extractor: &dyn SourceExtractor) -> SourceOutcome {
        let info = extractor.identify();
        let mut outcome = SourceOutcome {
            slug: info.slug.clone(),
            ..Default::default()
        };

        let source = match self.store.ensure_source(&info).await {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(source = %info.slug, error = %e, "could not register source");
                outcome.error = Some(e.to_string());
                return outcome;
            }
        };

        let mut candidates = match extractor.extract().await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(source = %info.slug, error = %e, "extraction failed");
                outcome.error = Some(e.to_string());
                return outcome;
            }
        };

        while let Some(item) = candidates.next().await {
            match item {
                Ok(candidate) => match self.process_candidate(&source, &candidate).await {
                    CandidateOutcome::Inserted => outcome.inserted += 1,
                    CandidateOutcome::Rejected => outcome.rejected += 1,
                    CandidateOutcome::Duplicate => outcome.duplicates += 1,
                    CandidateOutcome::Skipped => outcome.skipped += 1,
                },
                Err(ExtractError::Malformed(msg)) => {
                    tracing::warn!(
                        source = %source.slug,
                        error = %msg,
                        "skipping malformed candidate"
                    );
                    outcome.skipped += 1;
                }
                Err(e @ ExtractError::Transport(_)) => {
                    tracing::warn!(source = %source.slug, error = %e, "source stopped");
                    outcome.error = Some(e.to_string());
                    break;
                }
            }
        }

        tracing::info!(
            source = %source.slug,
            inserted = outcome.inserted,
            rejected = outcome.rejected,
            duplicates = outcome.duplicates,
            skipped = outcome.skipped,
            "source done"
        );
        outcome
    }

    async fn process_candidate(&self, source: &Source, candidate: &Candidate) -> CandidateOutcome {
        let candidate = candidate.normalized();
        if candidate.title.is_empty() || candidate.url.is_empty() {
            tracing::warn!(source = %source.slug, "skipping candidate without title or url");
            return CandidateOutcome::Skipped;
        }

        let score = match self.scorer.score(&candidate.relevance_text()).await {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!(
                    source = %source.slug,
                    title = %candidate.title,
                    error = %e,
                    "scoring failed"
                );
                return CandidateOutcome::Skipped;
            }
        };

        if !score.accept {
            tracing::info!(
                source = %source.slug,
                title = %candidate.title,
                similarity = score.similarity,
                probability = score.probability,
                "rejected by relevance gate"
            );
            return CandidateOutcome::Rejected;
        }

        let category = self.taxonomy.classify(
            &candidate.title,
            candidate.description.as_deref().unwrap_or_default(),
        );

        match insert_if_new(self.store, &candidate, source, category, score).await {
            Ok(Some(saved)) => {
                tracing::debug!(
                    source = %source.slug,
                    id = saved.id,
                    category = %saved.category,
                    "inserted"
                );
                CandidateOutcome::Inserted
            }
            Ok(None) => CandidateOutcome::Duplicate,
            Err(e) => {
                tracing::warn!(
                    source = %source.slug,
                    title = %candidate.title,
                    error = %e,
                    "insert failed"
                );
                CandidateOutcome::Skipped
            }
        }
    }
}

/// `tenders run`: wire config into an orchestrator and print the report.
pub async fn run_ingest(config: &Config, sources: &[String], json: bool) -> Result<RunReport> {
    config.require_embeddings()?;

    let registry = ExtractorRegistry::from_config(config)?;
    let selected = registry.select(sources)?;
    let taxonomy = config.load_taxonomy()?;

    let provider = create_provider(&config.embedding)?;
    let gate = RelevanceGate::new(Arc::clone(&provider), &config.relevance);

    let store = SqliteStore::open(config)
        .await
        .map_err(RunError::StorageUnavailable)?;

    let mut orchestrator = Orchestrator::new(&store, &gate, &taxonomy);
    let report = orchestrator
        .run(&selected)
        .await
        .context("ingestion run failed")?;
    store.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(report)
}

fn print_report(report: &RunReport) {
    println!("run");
    for outcome in &report.per_source {
        match &outcome.error {
            Some(err) => println!(
                "  {}: inserted {}, rejected {}, duplicates {}, skipped {} (stopped: {})",
                outcome.slug,
                outcome.inserted,
                outcome.rejected,
                outcome.duplicates,
                outcome.skipped,
                err
            ),
            None => println!(
                "  {}: inserted {}, rejected {}, duplicates {}, skipped {}",
                outcome.slug,
                outcome.inserted,
                outcome.rejected,
                outcome.duplicates,
                outcome.skipped
            ),
        }
    }
    println!("  inserted: {}", report.inserted_count);
    if !report.errors.is_empty() {
        println!("  errors: {}", report.errors.len());
    }
    println!("ok");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream;
    use tender_harvest_core::models::{RelevanceScore, SourceInfo};
    use tender_harvest_core::store::memory::InMemoryStore;

    use crate::extract::CandidateStream;
    use crate::gate::GateError;

    struct FixedExtractor {
        slug: &'static str,
        items: Vec<Result<Candidate, ExtractError>>,
    }

    impl FixedExtractor {
        fn ok(slug: &'static str, titles: &[&str]) -> Self {
            Self {
                slug,
                items: titles
                    .iter()
                    .enumerate()
                    .map(|(i, t)| Ok(Candidate::new(*t, format!("http://{}/{}", slug, i))))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl SourceExtractor for FixedExtractor {
        fn identify(&self) -> SourceInfo {
            SourceInfo {
                slug: self.slug.into(),
                name: self.slug.to_uppercase(),
                url: format!("http://{}", self.slug),
            }
        }
        async fn extract(&self) -> Result<CandidateStream, ExtractError> {
            let items: Vec<_> = self
                .items
                .iter()
                .map(|r| match r {
                    Ok(c) => Ok(c.clone()),
                    Err(ExtractError::Malformed(m)) => Err(ExtractError::Malformed(m.clone())),
                    Err(ExtractError::Transport(m)) => Err(ExtractError::Transport(m.clone())),
                })
                .collect();
            Ok(stream::iter(items).boxed())
        }
    }

    struct FailingExtractor;

    #[async_trait]
    impl SourceExtractor for FailingExtractor {
        fn identify(&self) -> SourceInfo {
            SourceInfo {
                slug: "broken".into(),
                name: "Broken".into(),
                url: "http://broken".into(),
            }
        }
        async fn extract(&self) -> Result<CandidateStream, ExtractError> {
            Err(ExtractError::Transport("connection refused".into()))
        }
    }

    /// Accepts titles containing "reject" as rejections, "boom" as errors.
    struct KeywordScorer;

    #[async_trait]
    impl RelevanceScorer for KeywordScorer {
        async fn score(&self, text: &str) -> Result<RelevanceScore, GateError> {
            if text.contains("boom") {
                return Err(GateError::Reference("scorer exploded".into()));
            }
            let accept = !text.contains("reject");
            Ok(RelevanceScore {
                accept,
                similarity: 0.95,
                probability: if accept { 0.90 } else { 0.10 },
                model_version: "fixed".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_run_isolates_failing_source() {
        let store = InMemoryStore::new();
        let taxonomy = Taxonomy::builtin();
        let first = FixedExtractor::ok("dmo", &["Firewall Alımı", "SIEM Lisansı"]);
        let third = FixedExtractor::ok("ptt", &["EDR Yazılımı"]);
        let sources: [&dyn SourceExtractor; 3] = [&first, &FailingExtractor, &third];

        let mut orch = Orchestrator::new(&store, &KeywordScorer, &taxonomy);
        assert_eq!(orch.state(), RunState::Idle);
        let report = orch.run(&sources).await.unwrap();

        assert_eq!(orch.state(), RunState::Completed);
        assert_eq!(report.inserted_count, 3);
        assert_eq!(report.per_source[0].inserted, 2);
        assert_eq!(report.per_source[1].inserted, 0);
        assert!(report.per_source[1].error.is_some());
        assert_eq!(report.per_source[2].inserted, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("broken:"));
    }

    #[tokio::test]
    async fn test_rejections_duplicates_and_skips() {
        let store = InMemoryStore::new();
        let taxonomy = Taxonomy::builtin();
        let extractor = FixedExtractor {
            slug: "dmo",
            items: vec![
                Ok(Candidate::new("Firewall Alımı", "http://x/1")),
                Ok(Candidate::new("Firewall Alımı", "http://x/1")),
                Ok(Candidate::new("reject me", "http://x/2")),
                Ok(Candidate::new("boom", "http://x/3")),
                Ok(Candidate::new("   ", "http://x/4")),
                Err(ExtractError::Malformed("row has no title".into())),
                Ok(Candidate::new("SOC Hizmeti", "http://x/5")),
            ],
        };

        let mut orch = Orchestrator::new(&store, &KeywordScorer, &taxonomy);
        let report = orch.run(&[&extractor as &dyn SourceExtractor]).await.unwrap();
        let o = &report.per_source[0];

        assert_eq!(o.inserted, 2);
        assert_eq!(o.duplicates, 1);
        assert_eq!(o.rejected, 1);
        assert_eq!(o.skipped, 3);
        assert!(o.error.is_none());
        assert_eq!(store.tender_count(), 2);
    }

    #[tokio::test]
    async fn test_transport_error_mid_stream_keeps_earlier_inserts() {
        let store = InMemoryStore::new();
        let taxonomy = Taxonomy::builtin();
        let extractor = FixedExtractor {
            slug: "tpao",
            items: vec![
                Ok(Candidate::new("Firewall Alımı", "http://x/1")),
                Err(ExtractError::Transport("timeout on page 2".into())),
                Ok(Candidate::new("never reached", "http://x/2")),
            ],
        };

        let mut orch = Orchestrator::new(&store, &KeywordScorer, &taxonomy);
        let report = orch.run(&[&extractor as &dyn SourceExtractor]).await.unwrap();

        assert_eq!(report.inserted_count, 1);
        assert_eq!(store.tender_count(), 1);
        assert!(report.per_source[0].error.as_deref().unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn test_storage_unavailable_fails_run() {
        let store = InMemoryStore::new();
        store.set_offline(true);
        let taxonomy = Taxonomy::builtin();
        let extractor = FixedExtractor::ok("dmo", &["Firewall Alımı"]);

        let mut orch = Orchestrator::new(&store, &KeywordScorer, &taxonomy);
        let err = orch.run(&[&extractor as &dyn SourceExtractor]).await.unwrap_err();

        assert!(matches!(err, RunError::StorageUnavailable(_)));
        assert_eq!(orch.state(), RunState::Failed);
    }

    #[tokio::test]
    async fn test_accepted_candidates_are_classified() {
        let store = InMemoryStore::new();
        let taxonomy = Taxonomy::builtin();
        let extractor = FixedExtractor::ok(
            "dmo",
            &["Yeni Nesil Güvenlik Duvarı Alımı", "MADENİ YAĞ ALIMI"],
        );

        let mut orch = Orchestrator::new(&store, &KeywordScorer, &taxonomy);
        orch.run(&[&extractor as &dyn SourceExtractor]).await.unwrap();

        let all = store.all_tenders().await.unwrap();
        let firewall = all.iter().find(|t| t.title.starts_with("Yeni")).unwrap();
        let oil = all.iter().find(|t| t.title.starts_with("MADEN")).unwrap();
        assert_eq!(firewall.category, "bilisim_teknolojileri");
        assert_eq!(oil.category, "diger");
        assert_eq!(firewall.model_version, "fixed");
    }

    #[test]
    fn test_report_serializes_notification_contract() {
        let report = RunReport {
            inserted_count: 2,
            per_source: vec![SourceOutcome {
                slug: "dmo".into(),
                inserted: 2,
                ..Default::default()
            }],
            errors: vec![],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["inserted_count"], 2);
        assert_eq!(json["per_source"][0]["slug"], "dmo");
        assert!(json["errors"].as_array().unwrap().is_empty());
    }
}
