use sqlx::SqlitePool;
use tracing::trace;

use crate::db::{create_pool, DatabaseConfig};
use crate::error::Result;
use crate::repositories::{
    SqliteMediaRepository, SqliteMediaSetRepository, SqliteSearchRequestRepository,
    SqliteSuggestionRepository,
};
use crate::transaction::CacheTransaction;

/// Handle to the media index cache. Cheap to clone; all clones share the
/// same pool.
#[derive(Clone)]
pub struct MediaIndexStore {
    pool: SqlitePool,
}

impl MediaIndexStore {
    /// Open (creating and migrating if needed) the store described by `config`.
    pub async fn open(config: DatabaseConfig) -> Result<Self> {
        Ok(Self::from_pool(create_pool(config).await?))
    }

    /// Wrap an already migrated pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a write transaction. The write lock is taken up front, so reads
    /// made inside the transaction stay valid until commit.
    pub async fn begin(&self) -> Result<CacheTransaction> {
        let tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        trace!("Began cache transaction");
        Ok(CacheTransaction::new(tx))
    }

    pub fn search_requests(&self) -> SqliteSearchRequestRepository {
        SqliteSearchRequestRepository::new(self.pool.clone())
    }

    pub fn media_sets(&self) -> SqliteMediaSetRepository {
        SqliteMediaSetRepository::new(self.pool.clone())
    }

    pub fn media(&self) -> SqliteMediaRepository {
        SqliteMediaRepository::new(self.pool.clone())
    }

    pub fn suggestions(&self) -> SqliteSuggestionRepository {
        SqliteSuggestionRepository::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResumeState, SyncSource};
    use crate::repositories::SearchRequestRepository;
    use crate::NewSearchRequest;
    use std::time::Duration;

    #[tokio::test]
    async fn test_open_in_memory_store() {
        let store = MediaIndexStore::open(DatabaseConfig::in_memory())
            .await
            .unwrap();
        store
            .search_requests()
            .insert(&NewSearchRequest::text("trees"), 0)
            .await
            .unwrap();

        let clone = store.clone();
        assert_eq!(clone.search_requests().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_transaction_holds_write_lock_from_begin() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaIndexStore::open(DatabaseConfig::new(dir.path().join("index.db")))
            .await
            .unwrap();
        let requests = store.search_requests();
        let id = requests
            .insert(&NewSearchRequest::text("trees"), 0)
            .await
            .unwrap();
        requests
            .update_resume_state(id, SyncSource::Local, &ResumeState::synced("local"))
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        let ids = tx.synced_search_request_ids(SyncSource::Local).await.unwrap();
        assert_eq!(ids, vec![id]);

        // A writer on another connection waits for the commit instead of
        // invalidating the transaction's snapshot.
        let writer = store.clone();
        let insert = tokio::spawn(async move {
            writer
                .search_requests()
                .insert(&NewSearchRequest::text("lakes"), 1)
                .await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!insert.is_finished());

        assert_eq!(
            tx.clear_search_resume(&ids, SyncSource::Local).await.unwrap(),
            1
        );
        tx.commit().await.unwrap();

        insert.await.unwrap().unwrap();
        assert_eq!(requests.count().await.unwrap(), 2);
        let request = requests.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(request.local_resume, ResumeState::never_synced());
    }
}
