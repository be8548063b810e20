//! HTTP media provider connector
//!
//! Implements `MediaProvider` over the injected `HttpClient`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::{MediaProvider, PageQuery, ProviderCapabilities, ProviderPage, QueryTarget};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::{ProviderHttpError, Result};
use crate::types::{CapabilitiesResponse, PageResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Media provider reachable at `base_url`.
///
/// # Endpoints
///
/// | Query              | Path                              |
/// |--------------------|-----------------------------------|
/// | media sets         | `GET {base}/media_sets`           |
/// | media in a set     | `GET {base}/media_sets/{id}/media`|
/// | search             | `GET {base}/search`               |
/// | capabilities       | `GET {base}/capabilities`         |
///
/// A `204 No Content` answer to a page query means the provider produced no
/// page at all.
///
/// # Example
///
/// ```ignore
/// use provider_http::HttpMediaProvider;
///
/// let provider = HttpMediaProvider::new(http_client, "com.example.cloud", "https://media.example/v1");
/// let page = provider.query_page(&query, &cancel).await?;
/// ```
pub struct HttpMediaProvider {
    http_client: Arc<dyn HttpClient>,
    authority: String,
    base_url: String,
    access_token: Option<String>,
    retry_policy: RetryPolicy,
}

impl HttpMediaProvider {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        authority: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            authority: authority.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: None,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    fn request(&self, path: &str) -> HttpRequest {
        let request = HttpRequest::new(HttpMethod::Get, format!("{}{}", self.base_url, path))
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT);

        match &self.access_token {
            Some(token) => request.bearer_token(token),
            None => request,
        }
    }

    /// Build the request for one page query.
    fn page_request(&self, query: &PageQuery) -> Result<HttpRequest> {
        let request = match &query.target {
            QueryTarget::MediaSets { category_id } => {
                if category_id.is_empty() {
                    return Err(ProviderHttpError::InvalidQuery(
                        "category id is empty".to_string(),
                    ));
                }
                self.request("/media_sets")
                    .query_param("categoryId", category_id)
            }
            QueryTarget::MediaInMediaSet { media_set_id } => {
                if media_set_id.is_empty() {
                    return Err(ProviderHttpError::InvalidQuery(
                        "media set id is empty".to_string(),
                    ));
                }
                self.request(&format!(
                    "/media_sets/{}/media",
                    urlencoding::encode(media_set_id)
                ))
            }
            QueryTarget::Search {
                search_text,
                media_set_id,
            } => {
                if search_text.is_none() && media_set_id.is_none() {
                    return Err(ProviderHttpError::InvalidQuery(
                        "search needs text or a media set id".to_string(),
                    ));
                }
                self.request("/search")
                    .query_param_opt("searchText", search_text.as_deref())
                    .query_param_opt("mediaSetId", media_set_id.as_deref())
            }
        };

        let mime_types = query
            .mime_types
            .as_ref()
            .filter(|types| !types.is_empty())
            .map(|types| types.join(","));

        Ok(request
            .query_param("pageSize", query.page_size.to_string())
            .query_param("sortOrder", query.sort_order.as_str())
            .query_param_opt("pageToken", query.page_token.as_deref())
            .query_param_opt("mimeTypes", mime_types))
    }

    /// Execute with retry, abandoning the call when `cancel` fires.
    async fn send(&self, request: HttpRequest, cancel: &CancellationToken) -> Result<HttpResponse> {
        let url = request.url.clone();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%url, "Request cancelled");
                return Err(BridgeError::Cancelled(url).into());
            }
            response = self.http_client.execute_with_retry(request, self.retry_policy.clone()) => response?,
        };

        if response.is_success() {
            return Ok(response);
        }

        warn!(%url, status = response.status, "Provider request failed");
        if response.status == 429 {
            return Err(ProviderHttpError::RateLimitExceeded {
                attempts: self.retry_policy.max_attempts,
            });
        }
        Err(ProviderHttpError::ApiError {
            status_code: response.status,
            message: String::from_utf8_lossy(&response.body).to_string(),
        })
    }

    async fn fetch_page(
        &self,
        query: &PageQuery,
        cancel: &CancellationToken,
    ) -> Result<Option<ProviderPage>> {
        let request = self.page_request(query)?;
        let response = self.send(request, cancel).await?;

        if response.status == 204 {
            warn!(authority = %self.authority, "Provider returned no page");
            return Ok(None);
        }

        let page: PageResponse = serde_json::from_slice(&response.body).map_err(|e| {
            ProviderHttpError::ParseError(format!("Failed to parse page response: {}", e))
        })?;

        Ok(page.items.map(|items| ProviderPage {
            rows: items.into_iter().map(Into::into).collect(),
            next_page_token: page.next_page_token,
        }))
    }
}

#[async_trait]
impl MediaProvider for HttpMediaProvider {
    fn authority(&self) -> &str {
        &self.authority
    }

    #[instrument(skip(self, query, cancel), fields(authority = %self.authority, key = ?query.target.key()))]
    async fn query_page(
        &self,
        query: &PageQuery,
        cancel: &CancellationToken,
    ) -> BridgeResult<Option<ProviderPage>> {
        let page = self.fetch_page(query, cancel).await?;
        if let Some(page) = &page {
            debug!(
                rows = page.rows.len(),
                has_next = page.next_page_token.is_some(),
                "Received page"
            );
        }
        Ok(page)
    }

    #[instrument(skip(self), fields(authority = %self.authority))]
    async fn capabilities(&self) -> BridgeResult<ProviderCapabilities> {
        let response = self
            .send(self.request("/capabilities"), &CancellationToken::new())
            .await?;

        let capabilities: CapabilitiesResponse = serde_json::from_slice(&response.body)
            .map_err(|e| {
                ProviderHttpError::ParseError(format!("Failed to parse capabilities: {}", e))
            })?;

        Ok(capabilities.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::SortOrder;
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn query(target: QueryTarget, page_token: Option<&str>) -> PageQuery {
        PageQuery {
            target,
            page_token: page_token.map(str::to_string),
            page_size: 500,
            sort_order: SortOrder::DateTakenDesc,
            mime_types: None,
        }
    }

    fn provider(mock_http: MockHttpClient) -> HttpMediaProvider {
        HttpMediaProvider::new(
            Arc::new(mock_http),
            "com.example.cloud",
            "https://media.example/v1/",
        )
        .with_access_token("token")
    }

    #[tokio::test]
    async fn test_search_page_success() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(
                req.full_url(),
                "https://media.example/v1/search?searchText=beach%20day&mediaSetId=face-1\
                 &pageSize=500&sortOrder=date_taken_desc&pageToken=p1"
            );
            assert_eq!(
                req.headers.get("Authorization"),
                Some(&"Bearer token".to_string())
            );
            Ok(response(
                200,
                r#"{"items": [{"id": "m1"}, {"id": "m2"}], "nextPageToken": "p2"}"#,
            ))
        });

        let target = QueryTarget::Search {
            search_text: Some("beach day".to_string()),
            media_set_id: Some("face-1".to_string()),
        };
        let page = provider(mock_http)
            .query_page(&query(target, Some("p1")), &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.rows[0].id, "m1");
        assert_eq!(page.next_page_token.as_deref(), Some("p2"));
    }

    #[tokio::test]
    async fn test_media_in_media_set_path_and_mime_filter() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.url, "https://media.example/v1/media_sets/album%2F7/media");
            assert!(req
                .query
                .contains(&("mimeTypes".to_string(), "image/*,video/*".to_string())));
            assert!(!req.query.iter().any(|(k, _)| k == "pageToken"));
            Ok(response(200, r#"{"items": []}"#))
        });

        let mut query = query(
            QueryTarget::MediaInMediaSet {
                media_set_id: "album/7".to_string(),
            },
            None,
        );
        query.mime_types = Some(vec!["image/*".to_string(), "video/*".to_string()]);
        let page = provider(mock_http)
            .query_page(&query, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        assert!(page.rows.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_no_content_is_missing_page() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(204, "")));

        let target = QueryTarget::MediaSets {
            category_id: "people".to_string(),
        };
        let page = provider(mock_http)
            .query_page(&query(target, None), &CancellationToken::new())
            .await
            .unwrap();

        assert!(page.is_none());
    }

    #[tokio::test]
    async fn test_api_error_handling() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(response(404, "unknown category")));

        let target = QueryTarget::MediaSets {
            category_id: "people".to_string(),
        };
        let result = provider(mock_http)
            .query_page(&query(target, None), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(BridgeError::OperationFailed(_))));
    }

    #[tokio::test]
    async fn test_cancelled_query_makes_no_request() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().never();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let target = QueryTarget::MediaSets {
            category_id: "people".to_string(),
        };
        let result = provider(mock_http)
            .query_page(&query(target, None), &cancel)
            .await;

        assert!(matches!(result, Err(e) if e.is_cancelled()));
    }

    #[tokio::test]
    async fn test_empty_search_is_rejected() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().never();

        let target = QueryTarget::Search {
            search_text: None,
            media_set_id: None,
        };
        let result = provider(mock_http)
            .query_page(&query(target, None), &CancellationToken::new())
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_capabilities_success() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert!(req.url.ends_with("/capabilities"));
            Ok(response(200, r#"{"searchEnabled": true}"#))
        });

        let capabilities = provider(mock_http).capabilities().await.unwrap();

        assert!(capabilities.search_enabled);
        assert!(!capabilities.media_categories_enabled);
    }
}
