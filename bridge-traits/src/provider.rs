//! Media Provider Abstraction
//!
//! A media provider is a remote authority (the device's local media provider
//! or the single active cloud provider) that serves paged catalog data:
//! media sets of a category, the media inside a media set, and search
//! results. Every call is read-only.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Sort order requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    DateTakenDesc,
    DateTakenAsc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::DateTakenDesc => "date_taken_desc",
            SortOrder::DateTakenAsc => "date_taken_asc",
        }
    }
}

/// What a page query enumerates, together with the key that scopes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryTarget {
    /// Media sets of a category.
    MediaSets { category_id: String },
    /// Media items inside one media set.
    MediaInMediaSet { media_set_id: String },
    /// Search results. At least one of the two fields is set.
    Search {
        search_text: Option<String>,
        media_set_id: Option<String>,
    },
}

impl QueryTarget {
    /// The key the provider is asked about, used for validation and logging.
    pub fn key(&self) -> Option<&str> {
        match self {
            QueryTarget::MediaSets { category_id } => Some(category_id.as_str()),
            QueryTarget::MediaInMediaSet { media_set_id } => Some(media_set_id.as_str()),
            QueryTarget::Search {
                search_text,
                media_set_id,
            } => media_set_id
                .as_deref()
                .filter(|s| !s.is_empty())
                .or(search_text.as_deref()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub target: QueryTarget,
    /// `None` requests the first page.
    pub page_token: Option<String>,
    pub page_size: u32,
    pub sort_order: SortOrder,
    pub mime_types: Option<Vec<String>>,
}

/// One row as returned by the provider. Media rows and media-set rows share
/// the shape; columns a domain does not use are left empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRow {
    /// Provider-local id of the media item or media set.
    pub id: String,
    /// For cloud media that mirrors a local item, the local item's id.
    pub local_media_id: Option<String>,
    pub mime_type: Option<String>,
    pub date_taken_ms: Option<i64>,
    pub size_bytes: Option<i64>,
    pub duration_ms: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub display_name: Option<String>,
    pub cover_media_id: Option<String>,
}

/// A page of rows plus the out-of-band continuation token. A missing token
/// means the provider has no further pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderPage {
    pub rows: Vec<ProviderRow>,
    pub next_page_token: Option<String>,
}

/// Capabilities advertised by a provider. The default is all-disabled and is
/// what callers assume when the capabilities call fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub search_enabled: bool,
    pub media_categories_enabled: bool,
}

#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Authority this provider answers for.
    fn authority(&self) -> &str;

    /// Fetch one page.
    ///
    /// Returns `Ok(None)` when the remote call completed without producing a
    /// page object at all, which callers must treat as a failure rather than
    /// as an empty result.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Cancelled` if `cancel` fires mid-call, or another
    /// `BridgeError` if the provider cannot be reached.
    async fn query_page(
        &self,
        query: &PageQuery,
        cancel: &CancellationToken,
    ) -> Result<Option<ProviderPage>>;

    /// Fetch the provider's capabilities descriptor.
    async fn capabilities(&self) -> Result<ProviderCapabilities>;
}

/// Resolves an authority name to a provider connection.
pub trait MediaProviderFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns `BridgeError::NotAvailable` if no provider serves `authority`.
    fn create(&self, authority: &str) -> Result<Arc<dyn MediaProvider>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_key_prefers_media_set() {
        let target = QueryTarget::Search {
            search_text: Some("dogs".to_string()),
            media_set_id: Some("person-7".to_string()),
        };
        assert_eq!(target.key(), Some("person-7"));

        let text_only = QueryTarget::Search {
            search_text: Some("dogs".to_string()),
            media_set_id: None,
        };
        assert_eq!(text_only.key(), Some("dogs"));
    }

    #[test]
    fn test_empty_search_has_no_key() {
        let target = QueryTarget::Search {
            search_text: None,
            media_set_id: None,
        };
        assert_eq!(target.key(), None);
    }

    #[test]
    fn test_default_capabilities_are_disabled() {
        let caps = ProviderCapabilities::default();
        assert!(!caps.search_enabled);
        assert!(!caps.media_categories_enabled);
    }

    #[test]
    fn test_sort_order_default() {
        assert_eq!(SortOrder::default().as_str(), "date_taken_desc");
    }
}
