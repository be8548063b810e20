//! Provider factory keyed by authority

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpClient, RetryPolicy};
use bridge_traits::{MediaProvider, MediaProviderFactory};
use tracing::info;

use crate::connector::HttpMediaProvider;

/// Where and how to reach one authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub access_token: Option<String>,
}

impl ProviderEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token: None,
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }
}

/// Resolves authorities to [`HttpMediaProvider`]s sharing one `HttpClient`.
///
/// Endpoints can be registered while the engine runs, e.g. when the user
/// switches cloud accounts.
pub struct HttpMediaProviderFactory {
    http_client: Arc<dyn HttpClient>,
    retry_policy: RetryPolicy,
    endpoints: RwLock<HashMap<String, ProviderEndpoint>>,
}

impl HttpMediaProviderFactory {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            retry_policy: RetryPolicy::default(),
            endpoints: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Register or replace the endpoint serving `authority`.
    pub fn register(&self, authority: impl Into<String>, endpoint: ProviderEndpoint) {
        let authority = authority.into();
        info!(%authority, base_url = %endpoint.base_url, "Registered provider endpoint");
        self.endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(authority, endpoint);
    }

    pub fn unregister(&self, authority: &str) -> bool {
        self.endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(authority)
            .is_some()
    }
}

impl MediaProviderFactory for HttpMediaProviderFactory {
    fn create(&self, authority: &str) -> Result<Arc<dyn MediaProvider>> {
        let endpoint = self
            .endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(authority)
            .cloned()
            .ok_or_else(|| {
                BridgeError::NotAvailable(format!("No provider registered for {}", authority))
            })?;

        let mut provider =
            HttpMediaProvider::new(self.http_client.clone(), authority, endpoint.base_url)
                .with_retry_policy(self.retry_policy.clone());
        if let Some(token) = endpoint.access_token {
            provider = provider.with_access_token(token);
        }

        Ok(Arc::new(provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use mockall::mock;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
        }
    }

    #[test]
    fn test_create_registered_provider() {
        let factory = HttpMediaProviderFactory::new(Arc::new(MockHttpClient::new()));
        factory.register(
            "com.example.cloud",
            ProviderEndpoint::new("https://media.example/v1").with_access_token("token"),
        );

        let provider = factory.create("com.example.cloud").unwrap();
        assert_eq!(provider.authority(), "com.example.cloud");
    }

    #[test]
    fn test_unknown_authority_is_not_available() {
        let factory = HttpMediaProviderFactory::new(Arc::new(MockHttpClient::new()));
        factory.register("com.example.cloud", ProviderEndpoint::new("https://a"));
        assert!(factory.unregister("com.example.cloud"));

        let result = factory.create("com.example.cloud");
        assert!(matches!(result, Err(BridgeError::NotAvailable(_))));
    }
}
