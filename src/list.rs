//! `tenders list`: filtered read-side listing of stored tenders.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};

use tender_harvest_core::models::{PersistedTender, TenderFilter};
use tender_harvest_core::store::TenderStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Raw CLI arguments for a listing.
#[derive(Debug, Clone, Default)]
pub struct ListArgs {
    pub query: Option<String>,
    pub source: Option<String>,
    /// `YYYY-MM-DD`, inclusive from the start of the day.
    pub since: Option<String>,
    /// `YYYY-MM-DD`, inclusive to the end of the day.
    pub until: Option<String>,
    pub category: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl ListArgs {
    pub fn to_filter(&self) -> Result<TenderFilter> {
        Ok(TenderFilter {
            query: self.query.clone().filter(|q| !q.trim().is_empty()),
            source_slug: self.source.clone(),
            published_from: self
                .since
                .as_deref()
                .map(|s| parse_day(s, 0, 0, 0))
                .transpose()?,
            published_to: self
                .until
                .as_deref()
                .map(|s| parse_day(s, 23, 59, 59))
                .transpose()?,
            category: self.category.clone(),
            limit: self.limit,
            offset: self.offset,
        })
    }
}

fn parse_day(s: &str, h: u32, m: u32, sec: u32) -> Result<NaiveDateTime> {
    let day = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", s))?;
    day.and_hms_opt(h, m, sec)
        .ok_or_else(|| anyhow::anyhow!("invalid time of day for '{}'", s))
}

pub async fn list_tenders(
    store: &dyn TenderStore,
    args: &ListArgs,
) -> Result<Vec<PersistedTender>> {
    let filter = args.to_filter()?;
    Ok(store.query(&filter).await?)
}

pub async fn run_list(config: &Config, args: &ListArgs, json: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let tenders = list_tenders(&store, args).await?;
    store.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&tenders)?);
        return Ok(());
    }

    if tenders.is_empty() {
        println!("No tenders found.");
        return Ok(());
    }

    println!(
        "{:<6} {:<10} {:<10} {:<22} {:>5} {:>5}  TITLE",
        "ID", "PUBLISHED", "SOURCE", "CATEGORY", "SIM", "PROB"
    );
    for t in &tenders {
        let published = t
            .published_at
            .map(|p| p.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<6} {:<10} {:<10} {:<22} {:>5.2} {:>5.2}  {}",
            t.id, published, t.source_slug, t.category, t.similarity, t.probability, t.title
        );
    }
    Ok(())
}
