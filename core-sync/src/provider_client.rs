//! # Provider Client
//!
//! Thin, validating wrapper over a [`MediaProvider`] connection.
//!
//! - Rejects empty query keys and zero page sizes before calling out
//! - Turns a missing page object into `RemoteUnavailable`
//! - Turns the page's continuation token into a [`ResumeKey`]
//! - Substitutes default capabilities when the capabilities call fails

use std::sync::Arc;

use bridge_traits::{
    MediaProvider, PageQuery, ProviderCapabilities, ProviderRow, QueryTarget, SortOrder,
};
use core_library::ResumeKey;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::{Result, SyncError};

/// One fetched page with its continuation already interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub rows: Vec<ProviderRow>,
    pub next: ResumeKey,
}

#[derive(Clone)]
pub struct ProviderClient {
    provider: Arc<dyn MediaProvider>,
    page_size: u32,
    sort_order: SortOrder,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn MediaProvider>, page_size: u32) -> Self {
        Self {
            provider,
            page_size,
            sort_order: SortOrder::default(),
        }
    }

    pub fn with_sort_order(mut self, sort_order: SortOrder) -> Self {
        self.sort_order = sort_order;
        self
    }

    pub fn authority(&self) -> &str {
        self.provider.authority()
    }

    /// Fetch one page of `target` starting at `page_token`.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if the target has no key or the page size is zero
    /// - `RemoteUnavailable` if the provider fails or returns no page object
    /// - `Obsolete` if `cancel` fires during the call
    #[instrument(skip(self, mime_types, cancel), fields(authority = %self.authority()))]
    pub async fn fetch_page(
        &self,
        target: &QueryTarget,
        page_token: Option<&str>,
        mime_types: Option<&[String]>,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage> {
        if target.key().map_or(true, str::is_empty) {
            return Err(SyncError::invalid_input(
                "target",
                "query key must not be empty",
            ));
        }
        if self.page_size == 0 {
            return Err(SyncError::invalid_input(
                "page_size",
                "page size must be greater than zero",
            ));
        }

        let query = PageQuery {
            target: target.clone(),
            page_token: page_token.map(str::to_string),
            page_size: self.page_size,
            sort_order: self.sort_order,
            mime_types: mime_types.map(<[String]>::to_vec),
        };

        let page = self
            .provider
            .query_page(&query, cancel)
            .await?
            .ok_or_else(|| {
                SyncError::RemoteUnavailable(format!(
                    "{} returned no page for {:?}",
                    self.authority(),
                    target.key()
                ))
            })?;

        let next = ResumeKey::from_provider(page.next_page_token.as_deref());
        debug!(rows = page.rows.len(), terminal = next.is_synced(), "Fetched page");

        Ok(FetchedPage {
            rows: page.rows,
            next,
        })
    }

    /// Capabilities of the provider, or the all-disabled default if they
    /// cannot be fetched.
    pub async fn fetch_capabilities(&self) -> ProviderCapabilities {
        match self.provider.capabilities().await {
            Ok(capabilities) => capabilities,
            Err(e) => {
                warn!(
                    authority = %self.authority(),
                    error = %e,
                    "Failed to fetch provider capabilities, using defaults"
                );
                ProviderCapabilities::default()
            }
        }
    }
}
