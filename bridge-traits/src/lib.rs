//! # Host Bridge Traits
//!
//! Abstractions the media-index engine requires from its host.
//!
//! ## Overview
//!
//! The engine never talks to a network, a clock or a log pipeline directly.
//! Each of those is a trait defined here and implemented per host.
//!
//! ## Traits
//!
//! ### Remote authorities
//! - [`MediaProvider`](provider::MediaProvider) - Paged, read-only catalog queries against one authority
//! - [`MediaProviderFactory`](provider::MediaProviderFactory) - Resolves an authority name to a provider
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP transport used by remote providers
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for TTL expiry and deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate |
//! |----------|---------------------|
//! | Desktop  | `bridge-desktop`    |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). A provider call
//! interrupted by its cancellation token reports `BridgeError::Cancelled` so
//! the engine can tell an abandoned run from an unreachable provider.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`; the engine shares them across
//! tokio tasks behind `Arc`.

pub mod error;
pub mod http;
pub mod provider;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use provider::{
    MediaProvider, MediaProviderFactory, PageQuery, ProviderCapabilities, ProviderPage,
    ProviderRow, QueryTarget, SortOrder,
};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
