//! # Sync Engine Configuration
//!
//! Builder-constructed settings for the media-index sync engine.
//!
//! ## Overview
//!
//! [`SyncEngineConfig`] carries where the cache lives, which authority is the
//! device's local provider, which cloud authority is bound at start-up and the
//! paging and expiry knobs. Validation is fail-fast: `build()` returns an
//! actionable [`Error::Config`] instead of letting a bad value reach a job.
//!
//! ## Usage
//!
//! ```no_run
//! use core_runtime::config::SyncEngineConfig;
//!
//! let config = SyncEngineConfig::builder()
//!     .database_path("/data/picker/index.db")
//!     .local_authority("com.example.media.local")
//!     .cloud_authority("com.example.photos.cloud")
//!     .build()?;
//! # Ok::<(), core_runtime::Error>(())
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;

/// Rows requested per provider page.
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// Upper bound accepted for `page_size`.
pub const MAX_PAGE_SIZE: u32 = 10_000;

/// Page ceiling per run. Practically unbounded; runs end on a terminal token.
pub const DEFAULT_MAX_PAGE_ITERATIONS: u32 = i32::MAX as u32;

/// Search history older than this is expired.
pub const DEFAULT_HISTORY_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Cached provider suggestions older than this are expired.
pub const DEFAULT_SUGGESTION_CACHE_TTL: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// Where the cache database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    InMemory,
}

#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    pub database: DatabaseLocation,
    /// Authority of the device's local provider. Fixed for the process.
    pub local_authority: String,
    /// Cloud authority bound at start-up, if any.
    pub cloud_authority: Option<String>,
    pub page_size: u32,
    pub max_page_iterations: u32,
    pub history_ttl: Duration,
    pub suggestion_cache_ttl: Duration,
    pub event_buffer_size: usize,
}

impl SyncEngineConfig {
    pub fn builder() -> SyncEngineConfigBuilder {
        SyncEngineConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if let DatabaseLocation::File(path) = &self.database {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path cannot be empty".to_string()));
            }
        }

        if self.local_authority.trim().is_empty() {
            return Err(Error::Config(
                "Local authority cannot be empty".to_string(),
            ));
        }

        if let Some(cloud) = &self.cloud_authority {
            if cloud.trim().is_empty() {
                return Err(Error::Config(
                    "Cloud authority cannot be empty. Omit it to run without a cloud provider."
                        .to_string(),
                ));
            }
            if cloud == &self.local_authority {
                return Err(Error::Config(format!(
                    "Cloud authority '{}' is already bound as the local authority",
                    cloud
                )));
            }
        }

        if self.page_size == 0 {
            return Err(Error::Config(
                "Page size must be greater than 0".to_string(),
            ));
        }

        if self.page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "Page size exceeds maximum of {}",
                MAX_PAGE_SIZE
            )));
        }

        if self.max_page_iterations == 0 {
            return Err(Error::Config(
                "Max page iterations must be greater than 0".to_string(),
            ));
        }

        if self.history_ttl.is_zero() || self.suggestion_cache_ttl.is_zero() {
            return Err(Error::Config(
                "Expiry TTLs must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SyncEngineConfigBuilder {
    database: Option<DatabaseLocation>,
    local_authority: Option<String>,
    cloud_authority: Option<String>,
    page_size: Option<u32>,
    max_page_iterations: Option<u32>,
    history_ttl: Option<Duration>,
    suggestion_cache_ttl: Option<Duration>,
    event_buffer_size: Option<usize>,
}

impl SyncEngineConfigBuilder {
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database = Some(DatabaseLocation::File(path.into()));
        self
    }

    /// Keep the cache in memory. Used by tests and ephemeral sessions.
    pub fn in_memory(mut self) -> Self {
        self.database = Some(DatabaseLocation::InMemory);
        self
    }

    pub fn local_authority(mut self, authority: impl Into<String>) -> Self {
        self.local_authority = Some(authority.into());
        self
    }

    pub fn cloud_authority(mut self, authority: impl Into<String>) -> Self {
        self.cloud_authority = Some(authority.into());
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn max_page_iterations(mut self, iterations: u32) -> Self {
        self.max_page_iterations = Some(iterations);
        self
    }

    pub fn history_ttl(mut self, ttl: Duration) -> Self {
        self.history_ttl = Some(ttl);
        self
    }

    pub fn suggestion_cache_ttl(mut self, ttl: Duration) -> Self {
        self.suggestion_cache_ttl = Some(ttl);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a required field is missing or a value is
    /// out of range.
    pub fn build(self) -> Result<SyncEngineConfig> {
        let database = self.database.ok_or_else(|| {
            Error::Config(
                "Database location is required. Use .database_path() or .in_memory() to set it."
                    .to_string(),
            )
        })?;

        let local_authority = self.local_authority.ok_or_else(|| {
            Error::Config(
                "Local authority is required. Use .local_authority() to set it.".to_string(),
            )
        })?;

        let config = SyncEngineConfig {
            database,
            local_authority,
            cloud_authority: self.cloud_authority,
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            max_page_iterations: self
                .max_page_iterations
                .unwrap_or(DEFAULT_MAX_PAGE_ITERATIONS),
            history_ttl: self.history_ttl.unwrap_or(DEFAULT_HISTORY_TTL),
            suggestion_cache_ttl: self
                .suggestion_cache_ttl
                .unwrap_or(DEFAULT_SUGGESTION_CACHE_TTL),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> SyncEngineConfigBuilder {
        SyncEngineConfig::builder()
            .in_memory()
            .local_authority("com.example.local")
    }

    #[test]
    fn test_builder_defaults() {
        let config = minimal().build().unwrap();

        assert_eq!(config.database, DatabaseLocation::InMemory);
        assert_eq!(config.cloud_authority, None);
        assert_eq!(config.page_size, 500);
        assert_eq!(config.max_page_iterations, i32::MAX as u32);
        assert_eq!(config.history_ttl, Duration::from_secs(604_800));
        assert_eq!(config.suggestion_cache_ttl, Duration::from_secs(259_200));
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
    }

    #[test]
    fn test_builder_requires_database() {
        let result = SyncEngineConfig::builder()
            .local_authority("com.example.local")
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Database location is required"));
    }

    #[test]
    fn test_builder_requires_local_authority() {
        let result = SyncEngineConfig::builder().database_path("/tmp/index.db").build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Local authority is required"));
    }

    #[test]
    fn test_empty_database_path_rejected() {
        let result = SyncEngineConfig::builder()
            .database_path("")
            .local_authority("com.example.local")
            .build();

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_cloud_authority_must_differ_from_local() {
        let result = minimal().cloud_authority("com.example.local").build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("already bound as the local authority"));
    }

    #[test]
    fn test_blank_cloud_authority_rejected() {
        assert!(minimal().cloud_authority("  ").build().is_err());
    }

    #[test]
    fn test_page_size_bounds() {
        assert!(minimal().page_size(0).build().is_err());
        assert!(minimal().page_size(MAX_PAGE_SIZE + 1).build().is_err());
        assert_eq!(minimal().page_size(50).build().unwrap().page_size, 50);
    }

    #[test]
    fn test_zero_iterations_rejected() {
        assert!(minimal().max_page_iterations(0).build().is_err());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        assert!(minimal().history_ttl(Duration::ZERO).build().is_err());
        assert!(minimal()
            .suggestion_cache_ttl(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn test_zero_event_buffer_rejected() {
        assert!(minimal().event_buffer_size(0).build().is_err());
    }
}
