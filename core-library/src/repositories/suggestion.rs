//! Search history and cached suggestion repository

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::Result;
use crate::models::{CachedSuggestion, SearchHistoryEntry};

#[async_trait]
pub trait SuggestionRepository: Send + Sync {
    async fn insert_history(&self, entry: &SearchHistoryEntry) -> Result<()>;

    async fn insert_suggestion(&self, suggestion: &CachedSuggestion) -> Result<()>;

    async fn count_history(&self) -> Result<i64>;

    async fn count_suggestions(&self) -> Result<i64>;

    /// Delete history entries created strictly before `cutoff_ms`.
    async fn delete_history_before(&self, cutoff_ms: i64) -> Result<u64>;

    /// Delete cached suggestions created strictly before `cutoff_ms`.
    async fn delete_suggestions_before(&self, cutoff_ms: i64) -> Result<u64>;
}

#[derive(Clone)]
pub struct SqliteSuggestionRepository {
    pool: SqlitePool,
}

impl SqliteSuggestionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SuggestionRepository for SqliteSuggestionRepository {
    async fn insert_history(&self, entry: &SearchHistoryEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO search_history (authority, search_text, media_set_id, cover_media_id, created_at_ms)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.authority.as_deref())
        .bind(entry.search_text.as_deref())
        .bind(entry.media_set_id.as_deref())
        .bind(entry.cover_media_id.as_deref())
        .bind(entry.created_at_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_suggestion(&self, suggestion: &CachedSuggestion) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO search_suggestions (
                authority, search_text, media_set_id, suggestion_type, cover_media_id, created_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&suggestion.authority)
        .bind(suggestion.search_text.as_deref())
        .bind(suggestion.media_set_id.as_deref())
        .bind(suggestion.suggestion_type.as_str())
        .bind(suggestion.cover_media_id.as_deref())
        .bind(suggestion.created_at_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_history(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM search_history")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_suggestions(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM search_suggestions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn delete_history_before(&self, cutoff_ms: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM search_history WHERE created_at_ms < ?")
            .bind(cutoff_ms)
            .execute(&self.pool)
            .await?;
        debug!(deleted = result.rows_affected(), "Expired search history");
        Ok(result.rows_affected())
    }

    async fn delete_suggestions_before(&self, cutoff_ms: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM search_suggestions WHERE created_at_ms < ?")
            .bind(cutoff_ms)
            .execute(&self.pool)
            .await?;
        debug!(deleted = result.rows_affected(), "Expired cached suggestions");
        Ok(result.rows_affected())
    }
}
