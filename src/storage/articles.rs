use sqlx::QueryBuilder;

use super::schema::Store;
use super::types::{Article, ArticleQuery, InsertOutcome, NewArticle, StoreError};

// ============================================================================
// Query Limit Constants
// ============================================================================

/// Maximum number of articles returned from any single listing (OOM protection)
pub const MAX_LIST_LIMIT: i64 = 500;

impl Store {
    // ========================================================================
    // Article Operations
    // ========================================================================

    /// Insert `article` unless its URL is already stored.
    ///
    /// A single `INSERT ... ON CONFLICT(url) DO NOTHING RETURNING id` statement
    /// decides existence and inserts at once, so concurrent callers racing on
    /// the same URL see exactly one `Inserted`. Existing rows are never
    /// modified.
    pub async fn try_insert_article(
        &self,
        article: &NewArticle,
    ) -> Result<InsertOutcome, StoreError> {
        let now = chrono::Utc::now().timestamp();

        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO articles (source, title, url, date, content, fetched_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&article.source)
        .bind(&article.title)
        .bind(&article.url)
        .bind(&article.published_at)
        .bind(&article.content)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(match row {
            Some((id,)) => InsertOutcome::Inserted(id),
            None => InsertOutcome::AlreadyExists,
        })
    }

    // ========================================================================
    // Article Queries
    // ========================================================================

    /// List articles newest first, optionally restricted to one source.
    ///
    /// Articles without a date sort after every dated one. `limit` is clamped
    /// to `1..=MAX_LIST_LIMIT` and a negative `offset` is treated as zero.
    pub async fn list_articles(&self, query: &ArticleQuery) -> Result<Vec<Article>, StoreError> {
        let limit = query.limit.clamp(1, MAX_LIST_LIMIT);
        let offset = query.offset.max(0);

        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            "SELECT id, source, title, url, date, content, fetched_at FROM articles",
        );
        if let Some(source) = &query.source {
            builder.push(" WHERE source = ");
            builder.push_bind(source);
        }
        // NULL dates last, ties broken by insertion order
        builder.push(" ORDER BY date IS NULL, date DESC, id DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        builder
            .build_query_as::<Article>()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    pub async fn get_article_by_url(&self, url: &str) -> Result<Option<Article>, StoreError> {
        sqlx::query_as::<_, Article>(
            "SELECT id, source, title, url, date, content, fetched_at FROM articles WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    pub async fn count_articles(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(count)
    }
}
