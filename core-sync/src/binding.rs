//! Authority binding and run preconditions.

use std::sync::{Arc, PoisonError, RwLock};

use core_library::SyncSource;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{Result, SyncError};

/// The authorities currently bound to each sync source. The local authority
/// is fixed; the cloud authority may be rebound at any time.
#[derive(Debug, Clone)]
pub struct AuthorityBinding {
    local: Arc<str>,
    cloud: Arc<RwLock<Option<String>>>,
}

impl AuthorityBinding {
    pub fn new(local: impl Into<String>, cloud: Option<String>) -> Self {
        Self {
            local: Arc::from(local.into()),
            cloud: Arc::new(RwLock::new(cloud)),
        }
    }

    pub fn local_authority(&self) -> &str {
        &self.local
    }

    pub fn cloud_authority(&self) -> Option<String> {
        self.cloud
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rebind the cloud authority. Runs against the previous authority become
    /// obsolete at their next check.
    pub fn set_cloud_authority(&self, authority: Option<String>) {
        let mut cloud = self.cloud.write().unwrap_or_else(PoisonError::into_inner);
        if *cloud != authority {
            info!(
                previous = ?cloud.as_deref(),
                current = ?authority.as_deref(),
                "Cloud authority rebound"
            );
            *cloud = authority;
        }
    }

    pub fn bound_authority(&self, source: SyncSource) -> Option<String> {
        match source {
            SyncSource::Local => Some(self.local.to_string()),
            SyncSource::Cloud => self.cloud_authority(),
        }
    }

    /// The source `authority` is currently bound to, if any.
    pub fn source_of(&self, authority: &str) -> Option<SyncSource> {
        if authority == &*self.local {
            Some(SyncSource::Local)
        } else if self.cloud_authority().as_deref() == Some(authority) {
            Some(SyncSource::Cloud)
        } else {
            None
        }
    }

    pub fn is_current(&self, source: SyncSource, authority: &str) -> bool {
        match source {
            SyncSource::Local => authority == &*self.local,
            SyncSource::Cloud => self.cloud_authority().as_deref() == Some(authority),
        }
    }
}

/// Preconditions a run re-checks before every fetch and every commit.
#[derive(Debug, Clone)]
pub struct RunGuard {
    cancel: CancellationToken,
    binding: Option<(AuthorityBinding, SyncSource, String)>,
}

impl RunGuard {
    /// Guard that only watches for cancellation.
    pub fn cancellation_only(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            binding: None,
        }
    }

    /// Guard that also requires `authority` to stay bound to `source`.
    pub fn bound(
        cancel: CancellationToken,
        binding: AuthorityBinding,
        source: SyncSource,
        authority: impl Into<String>,
    ) -> Self {
        Self {
            cancel,
            binding: Some((binding, source, authority.into())),
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// # Errors
    ///
    /// Returns `Obsolete` if the run was cancelled or its authority is no
    /// longer bound.
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(SyncError::obsolete("sync job was cancelled"));
        }

        if let Some((binding, source, authority)) = &self.binding {
            if !binding.is_current(*source, authority) {
                return Err(SyncError::obsolete(format!(
                    "{} authority changed from {} to {}",
                    source,
                    authority,
                    binding
                        .bound_authority(*source)
                        .unwrap_or_else(|| "none".to_string())
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_of_authority() {
        let binding = AuthorityBinding::new("local", Some("cloud.a".to_string()));

        assert_eq!(binding.source_of("local"), Some(SyncSource::Local));
        assert_eq!(binding.source_of("cloud.a"), Some(SyncSource::Cloud));
        assert_eq!(binding.source_of("cloud.b"), None);
    }

    #[test]
    fn test_rebinding_cloud_makes_guard_obsolete() {
        let binding = AuthorityBinding::new("local", Some("cloud.a".to_string()));
        let guard = RunGuard::bound(
            CancellationToken::new(),
            binding.clone(),
            SyncSource::Cloud,
            "cloud.a",
        );
        assert!(guard.check().is_ok());

        binding.set_cloud_authority(Some("cloud.b".to_string()));
        let err = guard.check().unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_cancelled_guard_is_obsolete() {
        let cancel = CancellationToken::new();
        let guard = RunGuard::cancellation_only(cancel.clone());
        cancel.cancel();

        assert!(matches!(guard.check(), Err(SyncError::Obsolete(_))));
    }

    #[test]
    fn test_cleared_cloud_binding() {
        let binding = AuthorityBinding::new("local", Some("cloud.a".to_string()));
        binding.set_cloud_authority(None);

        assert!(!binding.is_current(SyncSource::Cloud, "cloud.a"));
        assert!(binding.is_current(SyncSource::Local, "local"));
    }
}
