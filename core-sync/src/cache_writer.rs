//! # Cache Writer
//!
//! Maps provider rows to cache rows and writes one page per transaction.
//! The run guard is re-checked after the rows are staged and before the
//! commit; a failed check or any store error drops the transaction, which
//! rolls the whole page back.

use async_trait::async_trait;
use bridge_traits::ProviderRow;
use core_library::{
    ConflictPolicy, MediaIndexStore, MediaParent, MediaRecord, MediaSetRecord, SyncSource,
};
use tracing::debug;

use crate::binding::RunGuard;
use crate::error::Result;
use crate::page_loop::PageSink;

#[derive(Clone)]
pub struct CacheWriter {
    store: MediaIndexStore,
}

impl CacheWriter {
    pub fn new(store: MediaIndexStore) -> Self {
        Self { store }
    }

    /// Write a page of media rows under `parent` and return the number of
    /// rows inserted or changed.
    pub async fn write_media_page(
        &self,
        parent: MediaParent,
        authority: &str,
        source: SyncSource,
        rows: &[ProviderRow],
        guard: &RunGuard,
    ) -> Result<u64> {
        let records = media_records(rows, authority, source);

        let mut tx = self.store.begin().await?;
        let written = tx
            .upsert_media(parent, &records, ConflictPolicy::for_source(source))
            .await?;

        guard.check()?;
        tx.commit().await?;

        debug!(%parent, %source, rows = rows.len(), written, "Cached media page");
        Ok(written)
    }

    /// Write a page of media sets of `category_id`.
    pub async fn write_media_set_page(
        &self,
        category_id: &str,
        authority: &str,
        mime_types: Option<&[String]>,
        rows: &[ProviderRow],
        guard: &RunGuard,
    ) -> Result<u64> {
        let records = media_set_records(rows, authority, mime_types);

        let mut tx = self.store.begin().await?;
        let written = tx.upsert_media_sets(category_id, &records).await?;

        guard.check()?;
        tx.commit().await?;

        debug!(category_id, rows = rows.len(), written, "Cached media set page");
        Ok(written)
    }
}

/// Writes pages of media rows under one parent.
pub struct MediaPageSink<'a> {
    pub writer: &'a CacheWriter,
    pub parent: MediaParent,
    pub authority: &'a str,
    pub source: SyncSource,
}

#[async_trait]
impl<'a> PageSink for MediaPageSink<'a> {
    async fn write_page(&self, rows: &[ProviderRow], guard: &RunGuard) -> Result<u64> {
        self.writer
            .write_media_page(self.parent, self.authority, self.source, rows, guard)
            .await
    }
}

/// Writes pages of media sets of one category.
pub struct MediaSetPageSink<'a> {
    pub writer: &'a CacheWriter,
    pub category_id: &'a str,
    pub authority: &'a str,
    pub mime_types: Option<&'a [String]>,
}

#[async_trait]
impl<'a> PageSink for MediaSetPageSink<'a> {
    async fn write_page(&self, rows: &[ProviderRow], guard: &RunGuard) -> Result<u64> {
        self.writer
            .write_media_set_page(self.category_id, self.authority, self.mime_types, rows, guard)
            .await
    }
}

/// Cache shape of provider media rows. Local rows are keyed by their local
/// id; cloud rows by their cloud id, keeping the local reference if the
/// provider sent one.
pub fn media_records(rows: &[ProviderRow], authority: &str, source: SyncSource) -> Vec<MediaRecord> {
    rows.iter()
        .map(|row| {
            let (local_id, cloud_id) = match source {
                SyncSource::Local => (Some(row.id.clone()), None),
                SyncSource::Cloud => (row.local_media_id.clone(), Some(row.id.clone())),
            };
            MediaRecord {
                authority: authority.to_string(),
                media_id: row.id.clone(),
                local_id,
                cloud_id,
                is_local: source.is_local(),
                mime_type: row.mime_type.clone(),
                date_taken_ms: row.date_taken_ms,
                size_bytes: row.size_bytes,
                duration_ms: row.duration_ms,
                width: row.width,
                height: row.height,
                display_name: row.display_name.clone(),
            }
        })
        .collect()
}

pub fn media_set_records(
    rows: &[ProviderRow],
    authority: &str,
    mime_types: Option<&[String]>,
) -> Vec<MediaSetRecord> {
    rows.iter()
        .map(|row| MediaSetRecord {
            media_set_id: row.id.clone(),
            authority: authority.to_string(),
            display_name: row.display_name.clone(),
            cover_media_id: row.cover_media_id.clone(),
            mime_types: mime_types.map(<[String]>::to_vec),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::{create_test_pool, MediaRepository, NewSearchRequest, SearchRequestRepository};
    use tokio_util::sync::CancellationToken;

    fn row(id: &str) -> ProviderRow {
        ProviderRow {
            id: id.to_string(),
            local_media_id: Some(format!("local-{}", id)),
            mime_type: Some("image/png".to_string()),
            date_taken_ms: Some(5),
            ..Default::default()
        }
    }

    #[test]
    fn test_media_records_tag_source() {
        let rows = vec![row("a")];

        let local = media_records(&rows, "local", SyncSource::Local);
        assert!(local[0].is_local);
        assert_eq!(local[0].local_id.as_deref(), Some("a"));
        assert_eq!(local[0].cloud_id, None);

        let cloud = media_records(&rows, "cloud", SyncSource::Cloud);
        assert!(!cloud[0].is_local);
        assert_eq!(cloud[0].cloud_id.as_deref(), Some("a"));
        assert_eq!(cloud[0].local_id.as_deref(), Some("local-a"));
        assert_eq!(cloud[0].authority, "cloud");
    }

    #[tokio::test]
    async fn test_cancelled_page_is_rolled_back() {
        let store = MediaIndexStore::from_pool(create_test_pool().await.unwrap());
        let id = store
            .search_requests()
            .insert(&NewSearchRequest::text("cats"), 0)
            .await
            .unwrap();
        let writer = CacheWriter::new(store.clone());
        let cancel = CancellationToken::new();
        let guard = RunGuard::cancellation_only(cancel.clone());
        let parent = MediaParent::SearchRequest(id);

        let written = writer
            .write_media_page(parent, "local", SyncSource::Local, &[row("a")], &guard)
            .await
            .unwrap();
        assert_eq!(written, 1);

        cancel.cancel();
        let result = writer
            .write_media_page(parent, "local", SyncSource::Local, &[row("b")], &guard)
            .await;
        assert!(result.unwrap_err().is_recoverable());
        assert_eq!(store.media().count(parent).await.unwrap(), 1);
    }
}
