//! Media set repository

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::{LibraryError, Result};
use crate::models::{MediaSet, MediaSetRow, ResumeKey};

const SELECT_COLUMNS: &str = r#"
    SELECT picker_id, category_id, media_set_id, authority, display_name, cover_media_id,
           mime_types, media_resume_key
    FROM media_sets
"#;

#[async_trait]
pub trait MediaSetRepository: Send + Sync {
    async fn find_by_picker_id(&self, picker_id: i64) -> Result<Option<MediaSet>>;

    /// Media sets of a category for one authority, in insertion order.
    async fn find_by_category(&self, category_id: &str, authority: &str) -> Result<Vec<MediaSet>>;

    /// Persist the media-in-media-set resume key of a media set.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the media set does not exist.
    async fn update_resume_key(&self, picker_id: i64, key: Option<&ResumeKey>) -> Result<()>;

    async fn count(&self) -> Result<i64>;
}

#[derive(Clone)]
pub struct SqliteMediaSetRepository {
    pool: SqlitePool,
}

impl SqliteMediaSetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MediaSetRepository for SqliteMediaSetRepository {
    async fn find_by_picker_id(&self, picker_id: i64) -> Result<Option<MediaSet>> {
        let row: Option<MediaSetRow> =
            sqlx::query_as(&format!("{} WHERE picker_id = ?", SELECT_COLUMNS))
                .bind(picker_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(MediaSet::from))
    }

    async fn find_by_category(&self, category_id: &str, authority: &str) -> Result<Vec<MediaSet>> {
        let rows: Vec<MediaSetRow> = sqlx::query_as(&format!(
            "{} WHERE category_id = ? AND authority = ? ORDER BY picker_id",
            SELECT_COLUMNS
        ))
        .bind(category_id)
        .bind(authority)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(MediaSet::from).collect())
    }

    async fn update_resume_key(&self, picker_id: i64, key: Option<&ResumeKey>) -> Result<()> {
        let result = sqlx::query("UPDATE media_sets SET media_resume_key = ? WHERE picker_id = ?")
            .bind(key.map(ResumeKey::as_str))
            .bind(picker_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::not_found("MediaSet", picker_id));
        }
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media_sets")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
