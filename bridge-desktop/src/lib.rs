//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! - `HttpClient` using `reqwest`, with retry on 429/5xx
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use bridge_desktop::ReqwestHttpClient;
//!
//! let http_client = Arc::new(ReqwestHttpClient::new()?);
//! let providers = provider_http::HttpMediaProviderFactory::new(http_client);
//! providers.register(cloud_authority, provider_http::ProviderEndpoint::new(base_url));
//! ```

mod http;

pub use http::ReqwestHttpClient;
