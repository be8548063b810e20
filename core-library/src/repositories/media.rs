//! Read access to cached media rows.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::{MediaParent, MediaRecord, SyncSource};

#[async_trait]
pub trait MediaRepository: Send + Sync {
    /// Cached media of a parent, newest first.
    async fn list(&self, parent: MediaParent) -> Result<Vec<MediaRecord>>;

    async fn count(&self, parent: MediaParent) -> Result<i64>;

    /// Rows of a parent that came from `source`.
    async fn count_by_source(&self, parent: MediaParent, source: SyncSource) -> Result<i64>;
}

#[derive(Clone)]
pub struct SqliteMediaRepository {
    pool: SqlitePool,
}

impl SqliteMediaRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MediaRepository for SqliteMediaRepository {
    async fn list(&self, parent: MediaParent) -> Result<Vec<MediaRecord>> {
        let sql = format!(
            r#"
            SELECT authority, media_id, local_id, cloud_id, is_local, mime_type, date_taken_ms,
                   size_bytes, duration_ms, width, height, display_name
            FROM {}
            WHERE {} = ?
            ORDER BY date_taken_ms DESC, id DESC
            "#,
            parent.table(),
            parent.parent_column()
        );
        let rows = sqlx::query_as::<_, MediaRecord>(&sql)
            .bind(parent.id())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn count(&self, parent: MediaParent) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?",
            parent.table(),
            parent.parent_column()
        );
        let (count,): (i64,) = sqlx::query_as(&sql)
            .bind(parent.id())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_by_source(&self, parent: MediaParent, source: SyncSource) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ? AND is_local = ?",
            parent.table(),
            parent.parent_column()
        );
        let (count,): (i64,) = sqlx::query_as(&sql)
            .bind(parent.id())
            .bind(source.is_local())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
