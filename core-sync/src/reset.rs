//! # Reset Jobs
//!
//! Invalidate cached rows when the owning sync decided they are stale.
//!
//! | Mode        | Precondition                         | Transactions |
//! |-------------|--------------------------------------|--------------|
//! | `Partial`   | no search sync pending on the source | one          |
//! | `Full`      | no search sync pending on any source | one          |
//! | `Expired`   | none beyond cancellation             | none         |
//! | `MediaSets` | none beyond cancellation             | two          |
//!
//! Preconditions are checked before the first statement and again right
//! before commit; a violation drops the transaction and the run is reported
//! as obsolete. Every mode is idempotent, so a failed reset can simply be
//! scheduled again.

use std::time::Duration;

use core_library::{SuggestionRepository, SyncSource};
use core_runtime::events::SyncEvent;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::binding::RunGuard;
use crate::engine::SyncEngine;
use crate::error::{Result, SyncError};
use crate::job::{JobReport, JobRun, StepResult, SyncDomain, SyncJobId};
use crate::jobs::finish_run;
use crate::tracker::DomainTrackers;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ResetMode {
    /// Forget the synced search results of one source.
    Partial { source: SyncSource },
    /// Drop every search request and result.
    Full,
    /// Drop search history and cached suggestions past their TTL.
    Expired,
    /// Drop the media sets of a category and the media inside them.
    MediaSets {
        category_id: String,
        authority: String,
        source: SyncSource,
    },
}

impl ResetMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetMode::Partial { .. } => "partial",
            ResetMode::Full => "full",
            ResetMode::Expired => "expired",
            ResetMode::MediaSets { .. } => "media_sets",
        }
    }

    pub fn domain(&self) -> SyncDomain {
        match self {
            ResetMode::MediaSets { .. } => SyncDomain::MediaSets,
            _ => SyncDomain::SearchResults,
        }
    }

    pub fn source(&self) -> Option<SyncSource> {
        match self {
            ResetMode::Partial { source } | ResetMode::MediaSets { source, .. } => Some(*source),
            ResetMode::Full | ResetMode::Expired => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetParams {
    pub mode: ResetMode,
    #[serde(default)]
    pub attempt: u32,
}

impl ResetParams {
    pub fn new(mode: ResetMode) -> Self {
        Self { mode, attempt: 0 }
    }
}

/// Run a reset. A media-sets reset releases its media-sets tracker slot on
/// exit; the other modes are not tracked.
pub(crate) async fn run_reset_job(
    engine: &SyncEngine,
    params: ResetParams,
    job_id: SyncJobId,
    cancel: CancellationToken,
) -> JobReport {
    let mode = params.mode;
    let run = JobRun::new(job_id, mode.domain(), mode.source());
    info!(%job_id, mode = mode.as_str(), "Starting reset job");

    let result = if params.attempt > 0 {
        warn!(%job_id, attempt = params.attempt, "Reset job re-run detected, ending in failure");
        StepResult::Failed(SyncError::invalid_input(
            "attempt",
            "reset jobs are never retried in place",
        ))
    } else {
        let guard = RunGuard::cancellation_only(cancel);
        let reset = ResetJob { engine, guard };
        StepResult::from(match &mode {
            ResetMode::Partial { source } => reset.partial(*source).await,
            ResetMode::Full => reset.full().await,
            ResetMode::Expired => reset.expired().await,
            ResetMode::MediaSets {
                category_id,
                authority,
                ..
            } => reset.media_sets(category_id, authority).await,
        })
    };

    if let ResetMode::MediaSets { source, .. } = &mode {
        engine
            .trackers
            .tracker(SyncDomain::MediaSets, *source)
            .mark_complete(job_id);
    }

    let completed = SyncEvent::ResetCompleted {
        job_id: job_id.to_string(),
        domain: mode.domain().as_str().to_string(),
        mode: mode.as_str().to_string(),
    };
    finish_run(&engine.event_bus, run, result, completed)
}

struct ResetJob<'a> {
    engine: &'a SyncEngine,
    guard: RunGuard,
}

impl ResetJob<'_> {
    fn search_trackers(&self) -> &DomainTrackers {
        self.engine.trackers.domain(SyncDomain::SearchResults)
    }

    fn ensure_source_idle(&self, source: SyncSource) -> Result<()> {
        if self.search_trackers().for_source(source).has_pending() {
            return Err(SyncError::obsolete(format!(
                "{} search results sync is pending",
                source
            )));
        }
        Ok(())
    }

    fn ensure_all_idle(&self) -> Result<()> {
        SyncSource::ALL
            .iter()
            .try_for_each(|source| self.ensure_source_idle(*source))
    }

    async fn partial(&self, source: SyncSource) -> Result<()> {
        self.guard.check()?;
        self.ensure_source_idle(source)?;

        let mut tx = self.engine.store.begin().await?;
        let ids = tx.synced_search_request_ids(source).await?;
        let cleared = tx.clear_search_resume(&ids, source).await?;
        let deleted = tx.delete_search_results(&ids, source).await?;

        self.guard.check()?;
        self.ensure_source_idle(source)?;
        tx.commit().await?;

        info!(%source, requests = cleared, deleted, "Partial search cache reset");
        Ok(())
    }

    async fn full(&self) -> Result<()> {
        self.guard.check()?;
        self.ensure_all_idle()?;

        let mut tx = self.engine.store.begin().await?;
        let deleted = tx.clear_all_search_data().await?;

        self.guard.check()?;
        self.ensure_all_idle()?;
        tx.commit().await?;

        info!(deleted, "Full search cache reset");
        Ok(())
    }

    async fn expired(&self) -> Result<()> {
        self.guard.check()?;

        let config = &self.engine.config;
        let now = self.engine.clock.unix_timestamp_millis();
        let suggestions = self.engine.store.suggestions();

        let history = suggestions
            .delete_history_before(cutoff(now, config.history_ttl))
            .await?;
        let cached = suggestions
            .delete_suggestions_before(cutoff(now, config.suggestion_cache_ttl))
            .await?;

        info!(history, suggestions = cached, "Expired search suggestions reset");
        Ok(())
    }

    async fn media_sets(&self, category_id: &str, authority: &str) -> Result<()> {
        self.guard.check()?;
        let mut tx = self.engine.store.begin().await?;
        let picker_ids = tx.media_set_picker_ids(category_id, authority).await?;
        let media = tx.delete_media_in_media_sets(&picker_ids).await?;
        self.guard.check()?;
        tx.commit().await?;

        self.guard.check()?;
        let mut tx = self.engine.store.begin().await?;
        let sets = tx.delete_media_sets(category_id, authority).await?;
        self.guard.check()?;
        tx.commit().await?;

        info!(category_id, authority, sets, media, "Media sets cache reset");
        Ok(())
    }
}

fn cutoff(now_ms: i64, ttl: Duration) -> i64 {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now_ms.saturating_sub(ttl_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cutoff_subtracts_ttl() {
        assert_eq!(cutoff(10_000, Duration::from_secs(3)), 7_000);
        assert_eq!(cutoff(-10, Duration::MAX), i64::MIN);
    }

    #[test]
    fn test_reset_mode_serialization() {
        let mode = ResetMode::Partial {
            source: SyncSource::Cloud,
        };
        let json = serde_json::to_string(&mode).unwrap();
        assert_eq!(json, r#"{"mode":"partial","source":"cloud"}"#);

        let mode: ResetMode = serde_json::from_str(r#"{"mode":"full"}"#).unwrap();
        assert_eq!(mode, ResetMode::Full);
        assert_eq!(mode.domain(), SyncDomain::SearchResults);
        assert_eq!(mode.source(), None);
    }
}
