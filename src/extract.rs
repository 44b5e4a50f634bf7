//! Source extractors and their registry.
//!
//! A [`SourceExtractor`] turns one procurement portal into a lazy, finite
//! stream of [`Candidate`]s. Items in the stream carry their own errors:
//!
//! | Item | Orchestrator reaction |
//! |------|-----------------------|
//! | `Ok(candidate)` | gate → dedup → persist |
//! | `Err(ExtractError::Malformed)` | skip this candidate |
//! | `Err(ExtractError::Transport)` | stop this source |
//!
//! An `Err` returned by [`extract`](SourceExtractor::extract) itself fails
//! the whole source.
//!
//! Built-in extractors are created from `[[sources]]` config entries:
//! - `html_table`: [`HtmlTableExtractor`], one listing page parsed with CSS selectors.
//! - `json_file`: [`JsonFileExtractor`], a JSON array on disk.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use futures::stream::{self, BoxStream, StreamExt};
use scraper::{ElementRef, Html, Selector};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use tender_harvest_core::models::{Candidate, SourceInfo};

use crate::config::{
    Config, ExtractorConfig, HtmlTableConfig, HttpConfig, JsonFileConfig, SourceConfig,
};
use crate::ingest::RunError;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// The portal could not be reached or returned an unusable response.
    #[error("transport failure: {0}")]
    Transport(String),
    /// One record could not be turned into a candidate.
    #[error("malformed candidate: {0}")]
    Malformed(String),
}

pub type CandidateStream = BoxStream<'static, Result<Candidate, ExtractError>>;

/// Produces candidate tenders for one source.
#[async_trait]
pub trait SourceExtractor: Send + Sync {
    fn identify(&self) -> SourceInfo;

    /// Start extraction. The returned stream is consumed once.
    async fn extract(&self) -> Result<CandidateStream, ExtractError>;
}

/// Ordered collection of extractors keyed by slug.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn SourceExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Build one extractor per `[[sources]]` entry, in config order.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = build_http_client(&config.http)?;
        let mut registry = Self::new();
        for source in &config.sources {
            let extractor: Box<dyn SourceExtractor> = match &source.extractor {
                ExtractorConfig::HtmlTable(table) => Box::new(HtmlTableExtractor::new(
                    source_info(source),
                    table.clone(),
                    client.clone(),
                )?),
                ExtractorConfig::JsonFile(file) => {
                    Box::new(JsonFileExtractor::new(source_info(source), file))
                }
            };
            registry.register(extractor);
        }
        Ok(registry)
    }

    pub fn register(&mut self, extractor: Box<dyn SourceExtractor>) {
        self.extractors.push(extractor);
    }

    pub fn find(&self, slug: &str) -> Option<&dyn SourceExtractor> {
        self.extractors
            .iter()
            .find(|e| e.identify().slug == slug)
            .map(|e| e.as_ref())
    }

    /// Extractors for a run, in registry order.
    ///
    /// An empty `slugs` selects every extractor. Unknown slugs are rejected
    /// before anything runs.
    pub fn select(&self, slugs: &[String]) -> Result<Vec<&dyn SourceExtractor>, RunError> {
        if slugs.is_empty() {
            return Ok(self.iter().collect());
        }
        for slug in slugs {
            if self.find(slug).is_none() {
                return Err(RunError::UnknownSource(slug.clone()));
            }
        }
        Ok(self
            .iter()
            .filter(|e| slugs.contains(&e.identify().slug))
            .collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn SourceExtractor> {
        self.extractors.iter().map(|e| e.as_ref())
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn source_info(source: &SourceConfig) -> SourceInfo {
    SourceInfo {
        slug: source.slug.clone(),
        name: source.name.clone(),
        url: source.url.clone(),
    }
}

pub fn build_http_client(http: &HttpConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(http.timeout_secs))
        .user_agent(http.user_agent.clone())
        .danger_accept_invalid_certs(http.accept_invalid_certs)
        .build()?)
}

// ============ HTML table ============

/// Extracts candidates from one HTML listing table.
pub struct HtmlTableExtractor {
    info: SourceInfo,
    config: HtmlTableConfig,
    list_url: Url,
    client: reqwest::Client,
}

impl HtmlTableExtractor {
    /// Fails on an unparseable listing URL or invalid CSS selectors.
    pub fn new(info: SourceInfo, config: HtmlTableConfig, client: reqwest::Client) -> Result<Self> {
        let list_url = Url::parse(config.list_url.as_deref().unwrap_or(&info.url))
            .map_err(|e| anyhow::anyhow!("source '{}': invalid listing URL: {}", info.slug, e))?;
        TableSelectors::compile(&config)
            .map_err(|e| anyhow::anyhow!("source '{}': {}", info.slug, e))?;
        Ok(Self {
            info,
            config,
            list_url,
            client,
        })
    }
}

#[async_trait]
impl SourceExtractor for HtmlTableExtractor {
    fn identify(&self) -> SourceInfo {
        self.info.clone()
    }

    async fn extract(&self) -> Result<CandidateStream, ExtractError> {
        let response = self
            .client
            .get(self.list_url.clone())
            .send()
            .await
            .map_err(|e| ExtractError::Transport(format!("{}: {}", self.list_url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::Transport(format!(
                "{} returned HTTP {}",
                self.list_url, status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ExtractError::Transport(format!("{}: {}", self.list_url, e)))?;

        // Html is not Send; parse fully before handing out the stream
        let items = parse_table(&body, &self.list_url, &self.config)?;
        Ok(stream::iter(items).boxed())
    }
}

struct TableSelectors {
    row: Selector,
    title: Selector,
    link: Selector,
    description: Option<Selector>,
    details: Vec<(String, Selector)>,
    date: Option<Selector>,
}

impl TableSelectors {
    fn compile(config: &HtmlTableConfig) -> Result<Self, ExtractError> {
        Ok(Self {
            row: compile_selector(&config.row)?,
            title: compile_selector(&config.title)?,
            link: compile_selector(&config.link)?,
            description: config.description.as_deref().map(compile_selector).transpose()?,
            details: config
                .details
                .iter()
                .map(|d| Ok((d.label.clone(), compile_selector(&d.selector)?)))
                .collect::<Result<_, ExtractError>>()?,
            date: config.date.as_deref().map(compile_selector).transpose()?,
        })
    }
}

fn compile_selector(raw: &str) -> Result<Selector, ExtractError> {
    Selector::parse(raw)
        .map_err(|e| ExtractError::Malformed(format!("invalid selector '{}': {}", raw, e)))
}

/// Parse a listing page into one item per table row.
pub fn parse_table(
    html: &str,
    base: &Url,
    config: &HtmlTableConfig,
) -> Result<Vec<Result<Candidate, ExtractError>>, ExtractError> {
    let selectors = TableSelectors::compile(config)?;
    let document = Html::parse_document(html);

    Ok(document
        .select(&selectors.row)
        .map(|row| parse_row(row, base, config, &selectors))
        .collect())
}

fn parse_row(
    row: ElementRef<'_>,
    base: &Url,
    config: &HtmlTableConfig,
    selectors: &TableSelectors,
) -> Result<Candidate, ExtractError> {
    let title = row
        .select(&selectors.title)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ExtractError::Malformed("row has no title".to_string()))?;

    let href = row
        .select(&selectors.link)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ExtractError::Malformed(format!("row '{}' has no link", title)))?;
    let url = base
        .join(href)
        .map_err(|e| ExtractError::Malformed(format!("bad link '{}': {}", href, e)))?;

    let title = strip_markers(&title, &config.strip);
    if title.is_empty() {
        return Err(ExtractError::Malformed(format!("row at {} has an empty title", url)));
    }
    let title = match config.max_title_chars {
        Some(max) => truncate_chars(&title, max),
        None => title,
    };
    let mut candidate = Candidate::new(title, url.to_string());

    let mut lines: Vec<String> = selectors
        .details
        .iter()
        .filter_map(|(label, sel)| {
            let text = row.select(sel).next().map(element_text)?;
            (!text.is_empty()).then(|| format!("{}: {}", label, text))
        })
        .collect();
    if let Some(sel) = &selectors.description {
        if let Some(text) = row.select(sel).next().map(element_text) {
            lines.push(text);
        }
    }
    if !lines.is_empty() {
        candidate = candidate.with_description(lines.join("\n"));
    }

    if let Some(sel) = &selectors.date {
        if let Some(raw) = row.select(sel).next().map(element_text) {
            match parse_date(&raw, &config.date_format) {
                Some(published_at) => candidate = candidate.with_published_at(published_at),
                None => tracing::debug!(date = %raw, "unparseable publication date"),
            }
        }
    }

    Ok(candidate)
}

/// Cell text with whitespace runs collapsed to single spaces.
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_markers(title: &str, markers: &[String]) -> String {
    let mut title = title.to_string();
    for marker in markers.iter().filter(|m| !m.is_empty()) {
        title = title.replace(marker.as_str(), "");
    }
    title.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Never longer than `max` characters; the `...` marker only when it fits.
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max <= 3 {
        return text.chars().take(max).collect();
    }
    let kept: String = text.chars().take(max - 3).collect();
    format!("{}...", kept)
}

/// Accepts a date-time format, or a date-only format at midnight. With a
/// date-only format, a trailing time of day in the cell is ignored.
pub fn parse_date(raw: &str, format: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    let date_only = |s: &str| {
        NaiveDate::parse_from_str(s, format)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    };
    NaiveDateTime::parse_from_str(raw, format)
        .ok()
        .or_else(|| date_only(raw))
        .or_else(|| raw.split_whitespace().next().and_then(date_only))
}

// ============ JSON file ============

/// Reads candidates from a JSON array of
/// `{title, url, description?, published_at?}` objects.
pub struct JsonFileExtractor {
    info: SourceInfo,
    path: PathBuf,
}

impl JsonFileExtractor {
    pub fn new(info: SourceInfo, config: &JsonFileConfig) -> Self {
        Self {
            info,
            path: config.path.clone(),
        }
    }
}

#[async_trait]
impl SourceExtractor for JsonFileExtractor {
    fn identify(&self) -> SourceInfo {
        self.info.clone()
    }

    async fn extract(&self) -> Result<CandidateStream, ExtractError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ExtractError::Transport(format!("{}: {}", self.path.display(), e)))?;
        let entries: Vec<serde_json::Value> = serde_json::from_str(&content)
            .map_err(|e| ExtractError::Malformed(format!("{}: {}", self.path.display(), e)))?;

        let items: Vec<Result<Candidate, ExtractError>> = entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                serde_json::from_value::<Candidate>(entry)
                    .map_err(|e| ExtractError::Malformed(format!("entry {}: {}", i, e)))
            })
            .collect();
        Ok(stream::iter(items).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetailCell;

    const LISTING: &str = r#"
<html><body>
<table id="sample_1">
  <thead><tr><th>No</th><th>Tarih</th><th>Konu</th></tr></thead>
  <tbody>
    <tr>
      <td><a href="/Ihale/Detay/17031">17031</a></td>
      <td>05.08.2025</td>
      <td>  Yeni Nesil
          Güvenlik Duvarı Alımı </td>
    </tr>
    <tr>
      <td><a href="https://dmo.gov.tr/Ihale/Detay/17032">17032</a></td>
      <td>bilinmiyor</td>
      <td>Sunucu Bakım Hizmeti *** ZEYİLNAME YAYINLANMIŞTIR ***</td>
    </tr>
    <tr>
      <td>17033</td>
      <td>07.08.2025</td>
      <td>Linksiz satır</td>
    </tr>
  </tbody>
</table>
</body></html>
"#;

    fn table_config() -> HtmlTableConfig {
        HtmlTableConfig {
            list_url: None,
            row: "table#sample_1 tbody tr".into(),
            title: "td:nth-child(3)".into(),
            link: "td:nth-child(1) a".into(),
            description: None,
            details: Vec::new(),
            date: Some("td:nth-child(2)".into()),
            date_format: "%d.%m.%Y".into(),
            max_title_chars: None,
            strip: vec!["*** ZEYİLNAME YAYINLANMIŞTIR ***".into()],
        }
    }

    fn base() -> Url {
        Url::parse("https://dmo.gov.tr/Ihale/Liste?type=1").unwrap()
    }

    #[test]
    fn test_parse_table_rows() {
        let items = parse_table(LISTING, &base(), &table_config()).unwrap();
        assert_eq!(items.len(), 3);

        let first = items[0].as_ref().unwrap();
        assert_eq!(first.title, "Yeni Nesil Güvenlik Duvarı Alımı");
        assert_eq!(first.url, "https://dmo.gov.tr/Ihale/Detay/17031");
        assert_eq!(
            first.published_at,
            NaiveDate::from_ymd_opt(2025, 8, 5).unwrap().and_hms_opt(0, 0, 0)
        );

        let second = items[1].as_ref().unwrap();
        assert_eq!(second.title, "Sunucu Bakım Hizmeti");
        assert_eq!(second.published_at, None);

        assert!(matches!(items[2], Err(ExtractError::Malformed(_))));
    }

    #[test]
    fn test_details_compose_description() {
        let mut cfg = table_config();
        cfg.details = vec![
            DetailCell {
                label: "İhale No".into(),
                selector: "td:nth-child(1)".into(),
            },
            DetailCell {
                label: "Tarih".into(),
                selector: "td:nth-child(9)".into(),
            },
        ];
        cfg.description = Some("td:nth-child(3)".into());
        let items = parse_table(LISTING, &base(), &cfg).unwrap();

        let first = items[0].as_ref().unwrap();
        assert_eq!(
            first.description.as_deref(),
            Some("İhale No: 17031\nYeni Nesil Güvenlik Duvarı Alımı")
        );

        cfg.details[0].selector = "td[".into();
        assert!(parse_table(LISTING, &base(), &cfg).is_err());
    }

    #[test]
    fn test_invalid_selector() {
        let mut cfg = table_config();
        cfg.row = "tr[".into();
        assert!(parse_table(LISTING, &base(), &cfg).is_err());
    }

    #[test]
    fn test_truncate_title() {
        let mut cfg = table_config();
        cfg.max_title_chars = Some(10);
        let items = parse_table(LISTING, &base(), &cfg).unwrap();
        assert_eq!(items[0].as_ref().unwrap().title, "Yeni Ne...");
    }

    #[test]
    fn test_truncate_never_exceeds_limit() {
        assert_eq!(truncate_chars("Güvenlik", 8), "Güvenlik");
        assert_eq!(truncate_chars("Güvenlik Duvarı", 6), "Güv...");
        assert_eq!(truncate_chars("Güvenlik", 3), "Güv");
        assert_eq!(truncate_chars("Güvenlik", 1), "G");
        assert_eq!(truncate_chars("Güvenlik", 0), "");
    }

    #[test]
    fn test_parse_date_formats() {
        assert!(parse_date("05.08.2025", "%d.%m.%Y").is_some());
        assert!(parse_date("2025-08-05 14:30", "%Y-%m-%d %H:%M").is_some());
        assert!(parse_date("yarın", "%d.%m.%Y").is_none());
        assert_eq!(
            parse_date("05.08.2025 14:30", "%d.%m.%Y"),
            NaiveDate::from_ymd_opt(2025, 8, 5).unwrap().and_hms_opt(0, 0, 0)
        );
    }

    #[tokio::test]
    async fn test_json_file_extractor_skips_bad_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tenders.json");
        std::fs::write(
            &path,
            r#"[
                {"title": "Firewall Alımı", "url": "http://x/1", "published_at": "2025-08-05T00:00:00"},
                {"url": "http://x/2"},
                {"title": "SIEM Lisansı", "url": "http://x/3", "description": "1 yıllık"}
            ]"#,
        )
        .unwrap();

        let extractor = JsonFileExtractor::new(
            SourceInfo {
                slug: "fixture".into(),
                name: "Fixture".into(),
                url: "file://fixture".into(),
            },
            &JsonFileConfig { path },
        );
        let items: Vec<_> = extractor.extract().await.unwrap().collect().await;
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(ExtractError::Malformed(_))));
        assert_eq!(
            items[2].as_ref().unwrap().description.as_deref(),
            Some("1 yıllık")
        );
    }

    #[tokio::test]
    async fn test_json_file_missing_is_transport_error() {
        let extractor = JsonFileExtractor::new(
            SourceInfo {
                slug: "gone".into(),
                name: "Gone".into(),
                url: "file://gone".into(),
            },
            &JsonFileConfig {
                path: PathBuf::from("/nonexistent/tenders.json"),
            },
        );
        assert!(matches!(
            extractor.extract().await,
            Err(ExtractError::Transport(_))
        ));
    }

    struct Named(&'static str);

    #[async_trait]
    impl SourceExtractor for Named {
        fn identify(&self) -> SourceInfo {
            SourceInfo {
                slug: self.0.into(),
                name: self.0.into(),
                url: String::new(),
            }
        }
        async fn extract(&self) -> Result<CandidateStream, ExtractError> {
            Ok(stream::empty().boxed())
        }
    }

    #[test]
    fn test_registry_select() {
        let mut registry = ExtractorRegistry::new();
        registry.register(Box::new(Named("dmo")));
        registry.register(Box::new(Named("ptt")));
        registry.register(Box::new(Named("tpao")));

        let all = registry.select(&[]).unwrap();
        assert_eq!(all.len(), 3);

        let subset = registry
            .select(&["tpao".to_string(), "dmo".to_string()])
            .unwrap();
        let slugs: Vec<String> = subset.iter().map(|e| e.identify().slug).collect();
        assert_eq!(slugs, vec!["dmo", "tpao"]);

        assert!(matches!(
            registry.select(&["egm".to_string()]),
            Err(RunError::UnknownSource(_))
        ));
        assert!(registry.find("ptt").is_some());
    }
}
