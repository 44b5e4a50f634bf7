use anyhow::Result;

use tender_harvest_core::store::TenderStore;

use crate::config::{Config, ExtractorConfig};
use crate::sqlite_store::SqliteStore;

pub async fn list_sources(config: &Config) -> Result<()> {
    // Registration state is only read when the database already exists.
    let registered: Vec<String> = if config.db.path.exists() {
        let store = SqliteStore::open(config).await?;
        let sources = store.list_sources().await?;
        store.close().await;
        sources.into_iter().map(|s| s.slug).collect()
    } else {
        Vec::new()
    };

    if config.sources.is_empty() {
        println!("No sources configured.");
        return Ok(());
    }

    println!("{:<12} {:<12} {:<11} URL", "SOURCE", "EXTRACTOR", "REGISTERED");
    for source in &config.sources {
        let kind = match source.extractor {
            ExtractorConfig::HtmlTable(_) => "html_table",
            ExtractorConfig::JsonFile(_) => "json_file",
        };
        let is_registered = registered.iter().any(|slug| slug == &source.slug);
        println!(
            "{:<12} {:<12} {:<11} {}",
            source.slug, kind, is_registered, source.url
        );
    }

    Ok(())
}
