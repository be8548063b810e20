//! Write-side access to the cache store.
//!
//! Every mutation a sync page or a reset performs goes through one
//! [`CacheTransaction`]. Dropping it without calling [`CacheTransaction::commit`]
//! rolls back everything written through it.

use sqlx::{QueryBuilder, Sqlite, Transaction};
use tracing::{debug, trace};

use crate::error::{LibraryError, Result};
use crate::models::{
    join_mime_types, ConflictPolicy, MediaParent, MediaRecord, MediaSetRecord, ResumeKey,
    ResumeState, SearchRequest, SearchRequestRow, SyncSource,
};
use crate::repositories::push_id_list;

const MEDIA_COLUMNS: &str = "authority, media_id, local_id, cloud_id, is_local, mime_type, \
     date_taken_ms, size_bytes, duration_ms, width, height, display_name";

/// Columns refreshed by a replacing upsert. The conflict key columns are
/// excluded.
const MEDIA_UPDATE_COLUMNS: [&str; 10] = [
    "local_id",
    "cloud_id",
    "is_local",
    "mime_type",
    "date_taken_ms",
    "size_bytes",
    "duration_ms",
    "width",
    "height",
    "display_name",
];

pub struct CacheTransaction {
    tx: Transaction<'static, Sqlite>,
}

impl CacheTransaction {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Media rows
    // -------------------------------------------------------------------------

    /// Upsert media rows under `parent` and return how many rows were
    /// inserted or changed. Rows identical to the cached copy are not counted.
    pub async fn upsert_media(
        &mut self,
        parent: MediaParent,
        records: &[MediaRecord],
        policy: ConflictPolicy,
    ) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let sql = upsert_media_sql(parent, policy);
        let mut written = 0u64;
        for record in records {
            let result = sqlx::query(&sql)
                .bind(parent.id())
                .bind(&record.authority)
                .bind(&record.media_id)
                .bind(record.local_id.as_deref())
                .bind(record.cloud_id.as_deref())
                .bind(record.is_local)
                .bind(record.mime_type.as_deref())
                .bind(record.date_taken_ms)
                .bind(record.size_bytes)
                .bind(record.duration_ms)
                .bind(record.width)
                .bind(record.height)
                .bind(record.display_name.as_deref())
                .execute(&mut *self.tx)
                .await?;
            written += result.rows_affected();
        }

        trace!(%parent, rows = records.len(), written, "Upserted media page");
        Ok(written)
    }

    /// Delete search results of `ids` that came from `source`.
    pub async fn delete_search_results(&mut self, ids: &[i64], source: SyncSource) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("DELETE FROM search_result_media WHERE is_local = ");
        builder.push_bind(source.is_local());
        builder.push(" AND search_request_id IN ");
        push_id_list(&mut builder, ids);

        let result = builder.build().execute(&mut *self.tx).await?;
        debug!(
            source = %source,
            requests = ids.len(),
            deleted = result.rows_affected(),
            "Deleted cached search results"
        );
        Ok(result.rows_affected())
    }

    pub async fn delete_media_in_media_sets(&mut self, picker_ids: &[i64]) -> Result<u64> {
        if picker_ids.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("DELETE FROM media_in_media_set WHERE media_set_picker_id IN ");
        push_id_list(&mut builder, picker_ids);

        let result = builder.build().execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    // -------------------------------------------------------------------------
    // Search request resume state
    // -------------------------------------------------------------------------

    /// Read a search request inside this transaction.
    pub async fn search_request(&mut self, id: i64) -> Result<Option<SearchRequest>> {
        let row: Option<SearchRequestRow> = sqlx::query_as(
            r#"
            SELECT id, search_text, media_set_id, suggestion_authority, suggestion_type,
                   mime_types, local_sync_resume_key, local_authority, cloud_sync_resume_key,
                   cloud_authority
            FROM search_requests
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(SearchRequest::try_from).transpose()
    }

    pub async fn update_search_resume(
        &mut self,
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
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::not_found("SearchRequest", id));
        }
        Ok(())
    }

    /// Ids of search requests with any recorded progress for `source`.
    pub async fn synced_search_request_ids(&mut self, source: SyncSource) -> Result<Vec<i64>> {
        let (key_column, authority_column) = source.search_resume_columns();
        let sql = format!(
            "SELECT id FROM search_requests WHERE {} IS NOT NULL OR {} IS NOT NULL ORDER BY id",
            authority_column, key_column
        );
        let ids: Vec<(i64,)> = sqlx::query_as(&sql).fetch_all(&mut *self.tx).await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    /// Clear the resume key and authority of `source` for the given requests.
    pub async fn clear_search_resume(&mut self, ids: &[i64], source: SyncSource) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let (key_column, authority_column) = source.search_resume_columns();
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "UPDATE search_requests SET {} = NULL, {} = NULL WHERE id IN ",
            key_column, authority_column
        ));
        push_id_list(&mut builder, ids);

        let result = builder.build().execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    /// Drop every search request together with its results and resume state,
    /// for both sources. Returns the number of result rows deleted.
    pub async fn clear_all_search_data(&mut self) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM search_result_media")
            .execute(&mut *self.tx)
            .await?
            .rows_affected();

        let requests = sqlx::query("DELETE FROM search_requests")
            .execute(&mut *self.tx)
            .await?
            .rows_affected();

        debug!(deleted, requests, "Cleared all search requests and results");
        Ok(deleted)
    }

    // -------------------------------------------------------------------------
    // Media sets
    // -------------------------------------------------------------------------

    /// Upsert media sets of a category. Resume keys of existing sets are
    /// left untouched.
    pub async fn upsert_media_sets(
        &mut self,
        category_id: &str,
        records: &[MediaSetRecord],
    ) -> Result<u64> {
        let mut written = 0u64;
        for record in records {
            let result = sqlx::query(
                r#"
                INSERT INTO media_sets (
                    category_id, media_set_id, authority, display_name, cover_media_id, mime_types
                ) VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT (category_id, media_set_id, authority) DO UPDATE SET
                    display_name = excluded.display_name,
                    cover_media_id = excluded.cover_media_id,
                    mime_types = excluded.mime_types
                WHERE display_name IS NOT excluded.display_name
                   OR cover_media_id IS NOT excluded.cover_media_id
                   OR mime_types IS NOT excluded.mime_types
                "#,
            )
            .bind(category_id)
            .bind(&record.media_set_id)
            .bind(&record.authority)
            .bind(record.display_name.as_deref())
            .bind(record.cover_media_id.as_deref())
            .bind(join_mime_types(record.mime_types.as_deref()))
            .execute(&mut *self.tx)
            .await?;
            written += result.rows_affected();
        }
        Ok(written)
    }

    pub async fn media_set_picker_ids(
        &mut self,
        category_id: &str,
        authority: &str,
    ) -> Result<Vec<i64>> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            "SELECT picker_id FROM media_sets WHERE category_id = ? AND authority = ? ORDER BY picker_id",
        )
        .bind(category_id)
        .bind(authority)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    pub async fn delete_media_sets(&mut self, category_id: &str, authority: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM media_sets WHERE category_id = ? AND authority = ?")
            .bind(category_id)
            .bind(authority)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }
}

fn upsert_media_sql(parent: MediaParent, policy: ConflictPolicy) -> String {
    let conflict = match policy {
        ConflictPolicy::Ignore => "DO NOTHING".to_string(),
        ConflictPolicy::Replace => {
            let set = MEDIA_UPDATE_COLUMNS
                .iter()
                .map(|c| format!("{c} = excluded.{c}"))
                .collect::<Vec<_>>()
                .join(", ");
            let changed = MEDIA_UPDATE_COLUMNS
                .iter()
                .map(|c| format!("{c} IS NOT excluded.{c}"))
                .collect::<Vec<_>>()
                .join(" OR ");
            format!("DO UPDATE SET {} WHERE {}", set, changed)
        }
    };

    format!(
        "INSERT INTO {table} ({parent_column}, {columns}) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT ({parent_column}, authority, media_id) {conflict}",
        table = parent.table(),
        parent_column = parent.parent_column(),
        columns = MEDIA_COLUMNS,
        conflict = conflict,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::NewSearchRequest;
    use crate::repositories::{MediaRepository, SearchRequestRepository};
    use crate::MediaIndexStore;

    fn media(id: &str, is_local: bool, name: &str) -> MediaRecord {
        MediaRecord {
            authority: if is_local { "local" } else { "cloud" }.to_string(),
            media_id: id.to_string(),
            local_id: is_local.then(|| id.to_string()),
            cloud_id: (!is_local).then(|| id.to_string()),
            is_local,
            mime_type: Some("image/jpeg".to_string()),
            date_taken_ms: Some(1_000),
            size_bytes: Some(42),
            duration_ms: None,
            width: Some(10),
            height: Some(10),
            display_name: Some(name.to_string()),
        }
    }

    async fn store_with_request() -> (MediaIndexStore, i64) {
        let store = MediaIndexStore::from_pool(create_test_pool().await.unwrap());
        let id = store
            .search_requests()
            .insert(&NewSearchRequest::text("dogs"), 0)
            .await
            .unwrap();
        (store, id)
    }

    #[test]
    fn test_upsert_sql_shapes() {
        let ignore = upsert_media_sql(MediaParent::SearchRequest(1), ConflictPolicy::Ignore);
        assert!(ignore.contains("INTO search_result_media (search_request_id,"));
        assert!(ignore.ends_with("DO NOTHING"));

        let replace = upsert_media_sql(MediaParent::MediaSet(1), ConflictPolicy::Replace);
        assert!(replace.contains("ON CONFLICT (media_set_picker_id, authority, media_id)"));
        assert!(replace.contains("display_name IS NOT excluded.display_name"));
    }

    #[tokio::test]
    async fn test_rewriting_same_page_is_idempotent() {
        let (store, id) = store_with_request().await;
        let parent = MediaParent::SearchRequest(id);
        let page = vec![media("a", true, "A"), media("b", true, "B")];

        for expected in [2, 0] {
            let mut tx = store.begin().await.unwrap();
            let written = tx
                .upsert_media(parent, &page, ConflictPolicy::Replace)
                .await
                .unwrap();
            tx.commit().await.unwrap();
            assert_eq!(written, expected);
        }
        assert_eq!(store.media().count(parent).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_conflict_policies() {
        let (store, id) = store_with_request().await;
        let parent = MediaParent::SearchRequest(id);

        let mut tx = store.begin().await.unwrap();
        tx.upsert_media(parent, &[media("a", true, "old")], ConflictPolicy::Replace)
            .await
            .unwrap();
        tx.upsert_media(parent, &[media("c", false, "old")], ConflictPolicy::Ignore)
            .await
            .unwrap();

        let replaced = tx
            .upsert_media(parent, &[media("a", true, "new")], ConflictPolicy::Replace)
            .await
            .unwrap();
        let ignored = tx
            .upsert_media(parent, &[media("c", false, "new")], ConflictPolicy::Ignore)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(replaced, 1);
        assert_eq!(ignored, 0);

        let rows = store.media().list(parent).await.unwrap();
        let name = |id: &str| {
            rows.iter()
                .find(|r| r.media_id == id)
                .and_then(|r| r.display_name.clone())
        };
        assert_eq!(name("a").as_deref(), Some("new"));
        assert_eq!(name("c").as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let (store, id) = store_with_request().await;
        let parent = MediaParent::SearchRequest(id);

        {
            let mut tx = store.begin().await.unwrap();
            tx.upsert_media(parent, &[media("a", true, "A")], ConflictPolicy::Replace)
                .await
                .unwrap();
        }

        assert_eq!(store.media().count(parent).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_source_scoped_clear() {
        let (store, id) = store_with_request().await;
        let parent = MediaParent::SearchRequest(id);
        store
            .search_requests()
            .update_resume_state(id, SyncSource::Cloud, &ResumeState::synced("cloud"))
            .await
            .unwrap();
        store
            .search_requests()
            .update_resume_state(id, SyncSource::Local, &ResumeState::synced("local"))
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.upsert_media(
            parent,
            &[media("a", true, "A"), media("b", false, "B")],
            ConflictPolicy::Replace,
        )
        .await
        .unwrap();

        let ids = tx.synced_search_request_ids(SyncSource::Cloud).await.unwrap();
        assert_eq!(ids, vec![id]);
        assert_eq!(tx.clear_search_resume(&ids, SyncSource::Cloud).await.unwrap(), 1);
        assert_eq!(tx.delete_search_results(&ids, SyncSource::Cloud).await.unwrap(), 1);
        tx.commit().await.unwrap();

        let request = store.search_requests().find_by_id(id).await.unwrap().unwrap();
        assert_eq!(request.cloud_resume, ResumeState::never_synced());
        assert!(request.local_resume.is_synced());
        assert_eq!(
            store
                .media()
                .count_by_source(parent, SyncSource::Local)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_media_set_cleanup() {
        let store = MediaIndexStore::from_pool(create_test_pool().await.unwrap());
        let set = MediaSetRecord {
            media_set_id: "place-1".to_string(),
            authority: "cloud".to_string(),
            display_name: None,
            cover_media_id: None,
            mime_types: None,
        };

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.upsert_media_sets("places", &[set.clone()]).await.unwrap(), 1);
        assert_eq!(tx.upsert_media_sets("places", &[set]).await.unwrap(), 0);

        let picker_ids = tx.media_set_picker_ids("places", "cloud").await.unwrap();
        assert_eq!(picker_ids.len(), 1);
        tx.upsert_media(
            MediaParent::MediaSet(picker_ids[0]),
            &[media("m", false, "M")],
            ConflictPolicy::Ignore,
        )
        .await
        .unwrap();

        assert_eq!(tx.delete_media_in_media_sets(&picker_ids).await.unwrap(), 1);
        assert_eq!(tx.delete_media_sets("places", "cloud").await.unwrap(), 1);
        tx.commit().await.unwrap();
    }
}
