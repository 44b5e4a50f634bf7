//! SQLite-backed [`TenderStore`] implementation.
//!
//! Publication dates are stored as ISO-8601 text so that lexical order is
//! chronological order; bookkeeping timestamps are unix seconds.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use tender_harvest_core::fingerprint::PUBLISHED_AT_FORMAT;
use tender_harvest_core::models::{NewTender, PersistedTender, Source, SourceInfo, TenderFilter};
use tender_harvest_core::store::{StoreError, TenderStore};

use crate::config::Config;
use crate::{db, migrate};

const TENDER_COLUMNS: &str = r#"
    t.id, t.source_id, s.slug AS source_slug, t.title, t.url, t.description,
    t.published_at, t.fingerprint, t.category, t.relevance_similarity,
    t.relevance_probability, t.model_version, t.created_at
"#;

/// SQLite implementation of the [`TenderStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and make sure the schema exists.
    ///
    /// Any failure here means the backend cannot be used at all and is
    /// reported as [`StoreError::Unavailable`].
    pub async fn open(config: &Config) -> Result<Self, StoreError> {
        let pool = db::connect(config)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{:#}", e)))?;
        migrate::apply_schema(&pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{:#}", e)))?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn fetch_tender(&self, id: i64) -> Result<PersistedTender, StoreError> {
        let sql = format!(
            "SELECT {} FROM tenders t JOIN sources s ON s.id = t.source_id WHERE t.id = ?",
            TENDER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| StoreError::NotFound(format!("tender id {}", id)))?;
        row_to_tender(&row)
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::Duplicate(db_err.message().to_string())
        }
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
            StoreError::NotFound(db_err.message().to_string())
        }
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
        _ => StoreError::Backend(Box::new(err)),
    }
}

fn timestamp_to_utc(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

fn format_published_at(value: Option<&NaiveDateTime>) -> Option<String> {
    value.map(|dt| dt.format(PUBLISHED_AT_FORMAT).to_string())
}

fn parse_published_at(value: Option<String>) -> Result<Option<NaiveDateTime>, StoreError> {
    match value {
        None => Ok(None),
        Some(s) => NaiveDateTime::parse_from_str(&s, PUBLISHED_AT_FORMAT)
            .map(Some)
            .map_err(|e| StoreError::Backend(Box::new(e))),
    }
}

fn row_to_source(row: &SqliteRow) -> Source {
    Source {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        url: row.get("url"),
        created_at: timestamp_to_utc(row.get("created_at")),
    }
}

fn row_to_tender(row: &SqliteRow) -> Result<PersistedTender, StoreError> {
    Ok(PersistedTender {
        id: row.get("id"),
        source_id: row.get("source_id"),
        source_slug: row.get("source_slug"),
        title: row.get("title"),
        url: row.get("url"),
        description: row.get("description"),
        published_at: parse_published_at(row.get("published_at"))?,
        fingerprint: row.get("fingerprint"),
        category: row.get("category"),
        similarity: row.get("relevance_similarity"),
        probability: row.get("relevance_probability"),
        model_version: row.get("model_version"),
        created_at: timestamp_to_utc(row.get("created_at")),
    })
}

/// Make `%`, `_` and `\` in user text match literally under `ESCAPE '\'`.
fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn push_filters<'a>(qb: &mut QueryBuilder<'a, Sqlite>, filter: &'a TenderFilter) {
    if let Some(q) = &filter.query {
        let pattern = format!("%{}%", escape_like(q));
        qb.push(" AND (t.title LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" ESCAPE '\\' OR t.description LIKE ");
        qb.push_bind(pattern);
        qb.push(" ESCAPE '\\')");
    }
    if let Some(slug) = &filter.source_slug {
        qb.push(" AND s.slug = ");
        qb.push_bind(slug.as_str());
    }
    if let Some(from) = &filter.published_from {
        qb.push(" AND t.published_at >= ");
        qb.push_bind(from.format(PUBLISHED_AT_FORMAT).to_string());
    }
    if let Some(to) = &filter.published_to {
        qb.push(" AND t.published_at <= ");
        qb.push_bind(to.format(PUBLISHED_AT_FORMAT).to_string());
    }
    if let Some(category) = &filter.category {
        qb.push(" AND t.category = ");
        qb.push_bind(category.as_str());
    }
}

#[async_trait]
impl TenderStore for SqliteStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn ensure_source(&self, info: &SourceInfo) -> Result<Source, StoreError> {
        let now = Utc::now().timestamp();
        let row = sqlx::query(
            r#"
            INSERT INTO sources (slug, name, url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(slug) DO UPDATE SET
                name = excluded.name,
                url = excluded.url,
                updated_at = excluded.updated_at
            RETURNING id, slug, name, url, created_at
            "#,
        )
        .bind(&info.slug)
        .bind(&info.name)
        .bind(&info.url)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row_to_source(&row))
    }

    async fn list_sources(&self) -> Result<Vec<Source>, StoreError> {
        let rows = sqlx::query("SELECT id, slug, name, url, created_at FROM sources ORDER BY slug")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.iter().map(row_to_source).collect())
    }

    async fn find_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<PersistedTender>, StoreError> {
        let sql = format!(
            "SELECT {} FROM tenders t JOIN sources s ON s.id = t.source_id WHERE t.fingerprint = ?",
            TENDER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(row_to_tender).transpose()
    }

    async fn insert(&self, tender: &NewTender) -> Result<PersistedTender, StoreError> {
        let now = Utc::now().timestamp();
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO tenders (source_id, title, url, description, published_at,
                                 fingerprint, category, relevance_similarity,
                                 relevance_probability, model_version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(tender.source_id)
        .bind(&tender.title)
        .bind(&tender.url)
        .bind(&tender.description)
        .bind(format_published_at(tender.published_at.as_ref()))
        .bind(&tender.fingerprint)
        .bind(&tender.category)
        .bind(tender.relevance.similarity)
        .bind(tender.relevance.probability)
        .bind(&tender.relevance.model_version)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match map_sqlx_error(e) {
            StoreError::Duplicate(_) => StoreError::Duplicate(tender.fingerprint.clone()),
            other => other,
        })?;

        self.fetch_tender(id).await
    }

    async fn query(&self, filter: &TenderFilter) -> Result<Vec<PersistedTender>, StoreError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM tenders t JOIN sources s ON s.id = t.source_id WHERE 1 = 1",
            TENDER_COLUMNS
        ));
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY t.published_at IS NULL, t.published_at DESC, t.id DESC LIMIT ");
        qb.push_bind(filter.limit.max(0));
        qb.push(" OFFSET ");
        qb.push_bind(filter.offset.max(0));

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_tender).collect()
    }

    async fn all_tenders(&self) -> Result<Vec<PersistedTender>, StoreError> {
        let sql = format!(
            "SELECT {} FROM tenders t JOIN sources s ON s.id = t.source_id ORDER BY t.id",
            TENDER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_tender).collect()
    }

    async fn update_category(&self, id: i64, category: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE tenders SET category = ?, updated_at = ? WHERE id = ?")
            .bind(category)
            .bind(Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("tender id {}", id)));
        }
        Ok(())
    }
}
