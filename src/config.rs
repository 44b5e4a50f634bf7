//! TOML configuration.
//!
//! Loaded from `--config` (default `./config/tenders.toml`). Every optional
//! value has a serde default; the relevance and embedding settings can also
//! be overridden from the environment:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `SEC_SIM_THR` | `relevance.similarity_threshold` |
//! | `SEC_PROB_THR` | `relevance.probability_threshold` |
//! | `SEC_EMB_NAME` | `embedding.model` |
//! | `SEC_CLF_PATH` | `relevance.estimator_path` |
//! | `TENDERS_DB_PATH` | `db.path` |
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/tenders.sqlite"
//!
//! [relevance]
//! similarity_threshold = 0.70
//! probability_threshold = 0.85
//!
//! [embedding]
//! provider = "local"
//! model = "paraphrase-multilingual-minilm-l12-v2"
//!
//! [[sources]]
//! slug = "dmo"
//! name = "DMO"
//! url = "https://dmo.gov.tr/Ihale/Liste?type=1"
//!
//! [sources.extractor]
//! kind = "html_table"
//! row = "table#sample_1 tbody tr"
//! title = "td:nth-child(7)"
//! link = "td:nth-child(1) a"
//! date = "td:nth-child(5)"
//! date_format = "%d.%m.%Y"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tender_harvest_core::relevance::{
    Thresholds, DEFAULT_PROBABILITY_THRESHOLD, DEFAULT_SIMILARITY_THRESHOLD,
};
use tender_harvest_core::taxonomy::Taxonomy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub relevance: RelevanceConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelevanceConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_probability_threshold")]
    pub probability_threshold: f64,
    /// JSON logistic-regression artifact. Missing file → embedding-only scoring.
    #[serde(default)]
    pub estimator_path: Option<PathBuf>,
    /// Canonical descriptions of the target subject area.
    #[serde(default = "default_reference_texts")]
    pub reference_texts: Vec<String>,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            probability_threshold: default_probability_threshold(),
            estimator_path: None,
            reference_texts: default_reference_texts(),
        }
    }
}

impl RelevanceConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            similarity: self.similarity_threshold,
            probability: self.probability_threshold,
        }
    }
}

fn default_similarity_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}
fn default_probability_threshold() -> f64 {
    DEFAULT_PROBABILITY_THRESHOLD
}
fn default_reference_texts() -> Vec<String> {
    vec![
        "siber güvenlik hizmetleri SOC SIEM SOAR XDR NDR EDR IDS IPS malware tehdit istihbaratı zafiyet yönetimi".to_string(),
        "cyber security operations incident response endpoint detection firewall sandbox network detection response".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Model identifier used in `emb_only:<model>` version tags.
    pub fn model_label(&self) -> &str {
        self.model.as_deref().unwrap_or(&self.provider)
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_model() -> Option<String> {
    Some("paraphrase-multilingual-minilm-l12-v2".to_string())
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Several public portals serve broken certificate chains.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            accept_invalid_certs: false,
        }
    }
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TaxonomyConfig {
    /// TOML taxonomy file replacing the built-in keyword lists.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// One `[[sources]]` entry.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub slug: String,
    pub name: String,
    pub url: String,
    pub extractor: ExtractorConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractorConfig {
    HtmlTable(HtmlTableConfig),
    JsonFile(JsonFileConfig),
}

/// CSS selectors for a listing table. Cell selectors are relative to `row`.
#[derive(Debug, Deserialize, Clone)]
pub struct HtmlTableConfig {
    /// Listing page; defaults to the source URL.
    #[serde(default)]
    pub list_url: Option<String>,
    pub row: String,
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Labelled cells composed into the description, one `Label: text` line
    /// each, ahead of the `description` cell.
    #[serde(default)]
    pub details: Vec<DetailCell>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default = "default_date_format")]
    pub date_format: String,
    /// Maximum title length in characters; longer titles are cut with `...`.
    #[serde(default)]
    pub max_title_chars: Option<usize>,
    /// Marker strings removed from titles (e.g. amendment banners).
    #[serde(default)]
    pub strip: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetailCell {
    pub label: String,
    pub selector: String,
}

fn default_date_format() -> String {
    "%d.%m.%Y".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct JsonFileConfig {
    pub path: PathBuf,
}

impl Config {
    /// Load and compile the configured taxonomy (built-in when unset).
    pub fn load_taxonomy(&self) -> Result<Taxonomy> {
        match &self.taxonomy.path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read taxonomy file: {}", path.display()))?;
                Taxonomy::from_toml_str(&content)
                    .with_context(|| format!("Invalid taxonomy file: {}", path.display()))
            }
            None => Ok(Taxonomy::builtin()),
        }
    }

    /// Fails unless an embedding provider is configured.
    pub fn require_embeddings(&self) -> Result<()> {
        if !self.embedding.is_enabled() {
            bail!("relevance scoring requires an embedding provider; embedding.provider is 'disabled'");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;

    Ok(config)
}

/// Apply `SEC_*` / `TENDERS_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("SEC_SIM_THR") {
        config.relevance.similarity_threshold = v
            .trim()
            .parse()
            .with_context(|| format!("SEC_SIM_THR is not a number: '{}'", v))?;
    }
    if let Some(v) = lookup("SEC_PROB_THR") {
        config.relevance.probability_threshold = v
            .trim()
            .parse()
            .with_context(|| format!("SEC_PROB_THR is not a number: '{}'", v))?;
    }
    if let Some(v) = lookup("SEC_EMB_NAME") {
        config.embedding.model = Some(v);
    }
    if let Some(v) = lookup("SEC_CLF_PATH") {
        config.relevance.estimator_path = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("TENDERS_DB_PATH") {
        config.db.path = PathBuf::from(v);
    }
    Ok(())
}

fn validate(config: &Config) -> Result<()> {
    let r = &config.relevance;
    if !(0.0..=1.0).contains(&r.similarity_threshold) {
        bail!("relevance.similarity_threshold must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&r.probability_threshold) {
        bail!("relevance.probability_threshold must be in [0.0, 1.0]");
    }
    if r.reference_texts.iter().all(|t| t.trim().is_empty()) {
        bail!("relevance.reference_texts must contain at least one non-empty text");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.provider == "openai" && config.embedding.model.is_none() {
        bail!("embedding.model must be specified when provider is 'openai'");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    let mut seen = HashSet::new();
    for source in &config.sources {
        if source.slug.trim().is_empty() {
            bail!("sources: slug must not be empty (source '{}')", source.name);
        }
        if !seen.insert(source.slug.as_str()) {
            bail!("sources: duplicate slug '{}'", source.slug);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "/tmp/tenders.sqlite"
"#;

    fn parse(content: &str) -> Config {
        toml::from_str(content).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cfg = parse(MINIMAL);
        validate(&cfg).unwrap();
        assert_eq!(cfg.relevance.similarity_threshold, 0.70);
        assert_eq!(cfg.relevance.probability_threshold, 0.85);
        assert_eq!(cfg.embedding.provider, "local");
        assert_eq!(cfg.embedding.model_label(), "paraphrase-multilingual-minilm-l12-v2");
        assert_eq!(cfg.relevance.reference_texts.len(), 2);
        assert!(cfg.sources.is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = parse(MINIMAL);
        apply_env_overrides(&mut cfg, |key| match key {
            "SEC_SIM_THR" => Some("0.5".into()),
            "SEC_PROB_THR" => Some(" 0.6 ".into()),
            "SEC_EMB_NAME" => Some("multilingual-e5-small".into()),
            "SEC_CLF_PATH" => Some("/models/sec_clf.json".into()),
            "TENDERS_DB_PATH" => Some("/var/lib/tenders/prod.sqlite".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.db.path, PathBuf::from("/var/lib/tenders/prod.sqlite"));
        assert_eq!(cfg.relevance.similarity_threshold, 0.5);
        assert_eq!(cfg.relevance.probability_threshold, 0.6);
        assert_eq!(cfg.embedding.model.as_deref(), Some("multilingual-e5-small"));
        assert_eq!(
            cfg.relevance.estimator_path,
            Some(PathBuf::from("/models/sec_clf.json"))
        );
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut cfg = parse(MINIMAL);
        let res = apply_env_overrides(&mut cfg, |key| {
            (key == "SEC_SIM_THR").then(|| "high".to_string())
        });
        assert!(res.is_err());
    }

    #[test]
    fn test_threshold_out_of_range() {
        let mut cfg = parse(MINIMAL);
        cfg.relevance.probability_threshold = 1.5;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_sources_parse_in_order() {
        let cfg = parse(
            r#"
[db]
path = "/tmp/t.sqlite"

[[sources]]
slug = "dmo"
name = "DMO"
url = "https://dmo.gov.tr/Ihale/Liste?type=1"

[sources.extractor]
kind = "html_table"
row = "table#sample_1 tbody tr"
title = "td:nth-child(7)"
link = "td:nth-child(1) a"
date = "td:nth-child(5)"

[[sources.extractor.details]]
label = "Kategori"
selector = "td:nth-child(4)"

[[sources]]
slug = "fixture"
name = "Fixture"
url = "file://fixture"

[sources.extractor]
kind = "json_file"
path = "fixtures/tenders.json"
"#,
        );
        validate(&cfg).unwrap();
        let slugs: Vec<&str> = cfg.sources.iter().map(|s| s.slug.as_str()).collect();
        assert_eq!(slugs, vec!["dmo", "fixture"]);
        match &cfg.sources[0].extractor {
            ExtractorConfig::HtmlTable(t) => {
                assert_eq!(t.date_format, "%d.%m.%Y");
                assert_eq!(t.details.len(), 1);
                assert_eq!(t.details[0].label, "Kategori");
            }
            other => panic!("unexpected extractor: {:?}", other),
        }
        assert!(matches!(
            cfg.sources[1].extractor,
            ExtractorConfig::JsonFile(_)
        ));
    }

    #[test]
    fn test_duplicate_slugs_rejected() {
        let cfg = parse(
            r#"
[db]
path = "/tmp/t.sqlite"

[[sources]]
slug = "dmo"
name = "A"
url = "u"
[sources.extractor]
kind = "json_file"
path = "a.json"

[[sources]]
slug = "dmo"
name = "B"
url = "u"
[sources.extractor]
kind = "json_file"
path = "b.json"
"#,
        );
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("duplicate slug"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut cfg = parse(MINIMAL);
        cfg.embedding.provider = "magic".into();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_load_taxonomy_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("taxonomy.toml");
        std::fs::write(
            &path,
            r#"
default_key = "diger"

[target]
key = "enerji"
name = "Enerji"
strong = ["trafo merkezi"]
primary = ["trafo", "kablo"]
exclude = ["yemek"]
"#,
        )
        .unwrap();

        let mut cfg = parse(MINIMAL);
        assert_eq!(cfg.load_taxonomy().unwrap().target_key(), "bilisim_teknolojileri");

        cfg.taxonomy.path = Some(path);
        let taxonomy = cfg.load_taxonomy().unwrap();
        assert_eq!(taxonomy.target_key(), "enerji");
        assert_eq!(taxonomy.classify("Trafo Merkezi Bakımı", ""), "enerji");
        assert_eq!(taxonomy.classify("Sunucu ve switch alımı", ""), "diger");
    }

    #[test]
    fn test_load_taxonomy_reports_bad_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = parse(MINIMAL);

        cfg.taxonomy.path = Some(tmp.path().join("missing.toml"));
        let err = cfg.load_taxonomy().unwrap_err();
        assert!(err.to_string().contains("Failed to read taxonomy file"));

        let bad = tmp.path().join("bad.toml");
        std::fs::write(&bad, "[target]\nkey = \"x\"\n").unwrap();
        cfg.taxonomy.path = Some(bad);
        let err = cfg.load_taxonomy().unwrap_err();
        assert!(err.to_string().contains("Invalid taxonomy file"));
    }

    #[test]
    fn test_require_embeddings() {
        let mut cfg = parse(MINIMAL);
        assert!(cfg.require_embeddings().is_ok());
        cfg.embedding.provider = "disabled".into();
        assert!(cfg.require_embeddings().is_err());
    }
}
