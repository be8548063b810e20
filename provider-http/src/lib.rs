//! # HTTP Media Provider
//!
//! Implements `MediaProvider` for providers that serve the media index over a
//! JSON/REST dialect.
//!
//! ## Overview
//!
//! This module provides:
//! - Paged media-set, media-in-media-set and search queries
//! - Capabilities discovery
//! - Retry with exponential backoff through the injected `HttpClient`
//! - Cooperative cancellation of in-flight requests
//! - A factory resolving authorities to configured endpoints

pub mod connector;
pub mod error;
pub mod factory;
pub mod types;

pub use connector::HttpMediaProvider;
pub use error::{ProviderHttpError, Result};
pub use factory::{HttpMediaProviderFactory, ProviderEndpoint};
