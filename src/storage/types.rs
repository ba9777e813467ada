use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Store errors. Any of these aborts the running ingestion cycle.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another process holds the database lock
    #[error("Database is locked by another process")]
    Locked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StoreError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
        {
            return StoreError::Locked;
        }

        StoreError::Other(err)
    }
}

// ============================================================================
// Write-side Types
// ============================================================================

/// A normalized article that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArticle {
    pub source: String,
    pub title: String,
    /// Canonical absolute URL; the dedup key.
    pub url: String,
    /// Best-effort timestamp as published by the source, not reformatted.
    pub published_at: Option<String>,
    pub content: String,
}

/// Result of [`Store::try_insert_article`](super::Store::try_insert_article).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The article was new; carries its assigned id.
    Inserted(i64),
    /// An article with the same URL was already stored. Not an error.
    AlreadyExists,
}

/// A name/type pair produced by an extractor, not yet tied to an article.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateEntity {
    pub name: String,
    pub entity_type: String,
}

impl CandidateEntity {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
        }
    }
}

// ============================================================================
// Read-side Types
// ============================================================================

/// Persisted article as served by the read API.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Article {
    pub id: i64,
    pub source: String,
    pub title: String,
    pub url: String,
    pub date: Option<String>,
    pub content: Option<String>,
    /// Unix seconds at which this pipeline first stored the article.
    pub fetched_at: i64,
}

/// Persisted entity joined with its owning article.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EntityRecord {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub entity_type: String,
    pub article_id: i64,
    pub article_title: String,
    pub article_url: String,
    pub article_date: Option<String>,
}

/// Filters for [`Store::list_articles`](super::Store::list_articles).
#[derive(Debug, Clone)]
pub struct ArticleQuery {
    pub source: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ArticleQuery {
    fn default() -> Self {
        Self {
            source: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// Filters for [`Store::list_entities`](super::Store::list_entities).
#[derive(Debug, Clone)]
pub struct EntityQuery {
    pub entity_type: Option<String>,
    pub limit: i64,
}

impl Default for EntityQuery {
    fn default() -> Self {
        Self {
            entity_type: None,
            limit: 50,
        }
    }
}
