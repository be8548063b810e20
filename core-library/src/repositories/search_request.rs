//! Search request repository

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{LibraryError, Result};
use crate::models::{
    join_mime_types, NewSearchRequest, ResumeKey, ResumeState, SearchRequest, SearchRequestRow,
    SyncSource,
};

const SELECT_COLUMNS: &str = r#"
    SELECT id, search_text, media_set_id, suggestion_authority, suggestion_type, mime_types,
           local_sync_resume_key, local_authority, cloud_sync_resume_key, cloud_authority
    FROM search_requests
"#;

#[async_trait]
pub trait SearchRequestRepository: Send + Sync {
    /// Insert a search request and return its id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the request has neither text nor suggestion.
    async fn insert(&self, request: &NewSearchRequest, created_at_ms: i64) -> Result<i64>;

    async fn find_by_id(&self, id: i64) -> Result<Option<SearchRequest>>;

    /// # Errors
    ///
    /// Returns `NotFound` if the request does not exist.
    async fn resume_state(&self, id: i64, source: SyncSource) -> Result<ResumeState>;

    /// Persist the resume state of one (request, source) pair.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the request does not exist.
    async fn update_resume_state(
        &self,
        id: i64,
        source: SyncSource,
        state: &ResumeState,
    ) -> Result<()>;

    /// Ids of requests with any recorded sync progress for `source`.
    async fn synced_ids(&self, source: SyncSource) -> Result<Vec<i64>>;

    async fn count(&self) -> Result<i64>;
}

#[derive(Clone)]
pub struct SqliteSearchRequestRepository {
    pool: SqlitePool,
}

impl SqliteSearchRequestRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SearchRequestRepository for SqliteSearchRequestRepository {
    async fn insert(&self, request: &NewSearchRequest, created_at_ms: i64) -> Result<i64> {
        request.validate()?;

        let suggestion = request.suggestion.as_ref();
        let result = sqlx::query(
            r#"
            INSERT INTO search_requests (
                search_text, media_set_id, suggestion_authority, suggestion_type,
                mime_types, created_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.search_text.as_deref())
        .bind(suggestion.map(|s| s.media_set_id.as_str()))
        .bind(suggestion.map(|s| s.authority.as_str()))
        .bind(suggestion.map(|s| s.suggestion_type.as_str()))
        .bind(join_mime_types(request.mime_types.as_deref()))
        .bind(created_at_ms)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(search_request_id = id, "Inserted search request");
        Ok(id)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<SearchRequest>> {
        let row: Option<SearchRequestRow> =
            sqlx::query_as(&format!("{} WHERE id = ?", SELECT_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(SearchRequest::try_from).transpose()
    }

    async fn resume_state(&self, id: i64, source: SyncSource) -> Result<ResumeState> {
        let request = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| LibraryError::not_found("SearchRequest", id))?;
        Ok(request.resume_state(source).clone())
    }

    async fn update_resume_state(
        &self,
        id: i64,
        source: SyncSource,
        state: &ResumeState,
    ) -> Result<()> {
        let (key_column, authority_column) = source.search_resume_columns();
        let sql = format!(
            "UPDATE search_requests SET {} = ?, {} = ? WHERE id = ?",
            key_column, authority_column
        );

        let result = sqlx::query(&sql)
            .bind(state.key.as_ref().map(ResumeKey::as_str))
            .bind(state.authority.as_deref())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::not_found("SearchRequest", id));
        }
        Ok(())
    }

    async fn synced_ids(&self, source: SyncSource) -> Result<Vec<i64>> {
        let (key_column, authority_column) = source.search_resume_columns();
        let sql = format!(
            "SELECT id FROM search_requests WHERE {} IS NOT NULL OR {} IS NOT NULL ORDER BY id",
            authority_column, key_column
        );
        let ids: Vec<(i64,)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM search_requests")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{SuggestionRef, SuggestionType};

    async fn setup() -> SqliteSearchRequestRepository {
        SqliteSearchRequestRepository::new(create_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_insert_and_find_text_request() {
        let repo = setup().await;
        let id = repo
            .insert(
                &NewSearchRequest::text("sunset").with_mime_types(vec!["image/*".to_string()]),
                1_000,
            )
            .await
            .unwrap();

        let request = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(request.search_text.as_deref(), Some("sunset"));
        assert_eq!(request.suggestion, None);
        assert_eq!(request.mime_types, Some(vec!["image/*".to_string()]));
        assert_eq!(request.local_resume, ResumeState::never_synced());
        assert_eq!(request.cloud_resume, ResumeState::never_synced());
    }

    #[tokio::test]
    async fn test_insert_suggestion_request() {
        let repo = setup().await;
        let suggestion = SuggestionRef {
            media_set_id: "album-9".to_string(),
            authority: "com.example.cloud".to_string(),
            suggestion_type: SuggestionType::Album,
        };
        let id = repo
            .insert(
                &NewSearchRequest::from_suggestion(suggestion.clone(), Some("Trip".to_string())),
                1_000,
            )
            .await
            .unwrap();

        let request = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(request.suggestion, Some(suggestion));
    }

    #[tokio::test]
    async fn test_insert_rejects_empty_request() {
        let repo = setup().await;
        let result = repo.insert(&NewSearchRequest::default(), 0).await;
        assert!(matches!(result, Err(LibraryError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_resume_state_per_source() {
        let repo = setup().await;
        let id = repo.insert(&NewSearchRequest::text("cats"), 0).await.unwrap();

        repo.update_resume_state(id, SyncSource::Cloud, &ResumeState::partial("t1", "cloud.a"))
            .await
            .unwrap();
        repo.update_resume_state(id, SyncSource::Local, &ResumeState::synced("local"))
            .await
            .unwrap();

        assert_eq!(
            repo.resume_state(id, SyncSource::Cloud).await.unwrap(),
            ResumeState::partial("t1", "cloud.a")
        );
        assert!(repo
            .resume_state(id, SyncSource::Local)
            .await
            .unwrap()
            .is_synced());
    }

    #[tokio::test]
    async fn test_update_resume_state_missing_request() {
        let repo = setup().await;
        let result = repo
            .update_resume_state(99, SyncSource::Local, &ResumeState::synced("local"))
            .await;
        assert!(matches!(result, Err(LibraryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_synced_ids_only_reports_progressed_requests() {
        let repo = setup().await;
        let synced = repo.insert(&NewSearchRequest::text("a"), 0).await.unwrap();
        let _fresh = repo.insert(&NewSearchRequest::text("b"), 0).await.unwrap();
        repo.update_resume_state(synced, SyncSource::Cloud, &ResumeState::synced("cloud.a"))
            .await
            .unwrap();

        assert_eq!(repo.synced_ids(SyncSource::Cloud).await.unwrap(), vec![synced]);
        assert!(repo.synced_ids(SyncSource::Local).await.unwrap().is_empty());
        assert_eq!(repo.count().await.unwrap(), 2);
    }
}
