//! Batch re-classification of stored tenders.
//!
//! Re-runs the taxonomy classifier over every persisted tender and rewrites
//! the category only where the result differs. Nothing else on a tender is
//! ever touched.

use anyhow::Result;
use serde::Serialize;

use tender_harvest_core::store::{StoreError, TenderStore};
use tender_harvest_core::taxonomy::Taxonomy;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Serialize)]
pub struct CategoryChange {
    pub id: i64,
    pub title: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecategorizeReport {
    pub scanned: u64,
    pub changed: u64,
    pub changes: Vec<CategoryChange>,
}

/// With `dry_run`, changes are reported but not written.
pub async fn recategorize(
    store: &dyn TenderStore,
    taxonomy: &Taxonomy,
    dry_run: bool,
) -> Result<RecategorizeReport, StoreError> {
    let tenders = store.all_tenders().await?;
    let mut report = RecategorizeReport {
        scanned: tenders.len() as u64,
        ..Default::default()
    };

    for tender in tenders {
        let category = taxonomy.classify(
            &tender.title,
            tender.description.as_deref().unwrap_or_default(),
        );
        if category == tender.category {
            continue;
        }

        if !dry_run {
            store.update_category(tender.id, category).await?;
        }
        tracing::debug!(
            id = tender.id,
            from = %tender.category,
            to = %category,
            "category changed"
        );
        report.changed += 1;
        report.changes.push(CategoryChange {
            id: tender.id,
            title: tender.title,
            from: tender.category,
            to: category.to_string(),
        });
    }

    Ok(report)
}

pub async fn run_recategorize(config: &Config, dry_run: bool) -> Result<()> {
    let taxonomy = config.load_taxonomy()?;
    let store = SqliteStore::open(config).await?;
    let report = recategorize(&store, &taxonomy, dry_run).await?;
    store.close().await;

    if dry_run {
        println!("recategorize (dry-run)");
    } else {
        println!("recategorize");
    }
    for change in &report.changes {
        println!("  #{} {} → {}  {}", change.id, change.from, change.to, change.title);
    }
    println!("  scanned: {}", report.scanned);
    println!("  changed: {}", report.changed);
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tender_harvest_core::fingerprint::fingerprint;
    use tender_harvest_core::models::{NewTender, RelevanceScore, SourceInfo};
    use tender_harvest_core::store::memory::InMemoryStore;

    async fn seed(store: &InMemoryStore, title: &str, category: &str) -> i64 {
        let source = store
            .ensure_source(&SourceInfo {
                slug: "dmo".into(),
                name: "DMO".into(),
                url: "https://dmo.gov.tr".into(),
            })
            .await
            .unwrap();
        let url = format!("http://x/{}", title.len());
        store
            .insert(&NewTender {
                source_id: source.id,
                title: title.to_string(),
                fingerprint: fingerprint(title, &url, None),
                url,
                description: None,
                published_at: None,
                category: category.to_string(),
                relevance: RelevanceScore {
                    accept: true,
                    similarity: 0.9,
                    probability: 0.9,
                    model_version: "emb_only:test".into(),
                },
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_updates_only_changed_categories() {
        let store = InMemoryStore::new();
        let taxonomy = Taxonomy::builtin();
        seed(&store, "Yeni Nesil Güvenlik Duvarı Alımı", "bilisim_teknolojileri").await;
        let oil = seed(&store, "MADENİ YAĞ ALIMI", "bilisim_teknolojileri").await;

        let report = recategorize(&store, &taxonomy, false).await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.changed, 1);
        assert_eq!(report.changes[0].id, oil);
        assert_eq!(report.changes[0].to, "diger");

        let again = recategorize(&store, &taxonomy, false).await.unwrap();
        assert_eq!(again.changed, 0);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let store = InMemoryStore::new();
        let taxonomy = Taxonomy::builtin();
        seed(&store, "MADENİ YAĞ ALIMI", "bilisim_teknolojileri").await;

        let report = recategorize(&store, &taxonomy, true).await.unwrap();
        assert_eq!(report.changed, 1);
        let stored = store.all_tenders().await.unwrap();
        assert_eq!(stored[0].category, "bilisim_teknolojileri");
    }
}
