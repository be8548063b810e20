//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the media-index sync engine:
//! - Logging and tracing bootstrap
//! - Engine configuration
//! - Event bus for sync lifecycle and change notifications
//!
//! ## Overview
//!
//! Every other crate in the workspace depends on this one for its logging
//! conventions, its [`SyncEngineConfig`](config::SyncEngineConfig) and the
//! [`EventBus`](events::EventBus) that carries "data changed" signals to
//! readers of the cache.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
