//! # Media Index Cache Store
//!
//! Owns the relational cache of provider data: search requests and their
//! results, media sets and their contents, search history and cached
//! suggestions.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite database schema and migrations
//! - Repository traits for reads and single-statement updates
//! - [`CacheTransaction`] for page writes and resets that must be all-or-nothing
//! - Per-source resume state of every cached parent

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod store;
pub mod transaction;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{LibraryError, Result};
pub use models::{
    CachedSuggestion, ConflictPolicy, MediaParent, MediaRecord, MediaSet, MediaSetRecord,
    NewSearchRequest, ResumeKey, ResumeState, SearchHistoryEntry, SearchRequest, SuggestionRef,
    SuggestionType, SyncSource, SYNCED_RESUME_KEY,
};
pub use repositories::{
    MediaRepository, MediaSetRepository, SearchRequestRepository, SuggestionRepository,
};
pub use store::MediaIndexStore;
pub use transaction::CacheTransaction;
