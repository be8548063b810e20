//! # Sync Tracker
//!
//! Records which sync jobs are outstanding so that readers can wait for the
//! first usable page and resets can refuse to run while a writer is active.
//!
//! A slot is created by [`SyncTracker::register`] and released by
//! [`SyncTracker::mark_complete`]. A sync job releases its slot as soon as
//! its first page is committed and again (as a no-op) when it exits.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use core_library::SyncSource;
use tokio::sync::watch;
use tracing::trace;

use crate::job::{SyncDomain, SyncJobId};

/// Outstanding jobs of one (domain, source) pair.
#[derive(Debug, Default)]
pub struct SyncTracker {
    slots: Mutex<HashMap<SyncJobId, watch::Sender<bool>>>,
}

impl SyncTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a slot for `job_id` and return a handle that resolves once the
    /// slot is marked complete.
    pub fn register(&self, job_id: SyncJobId) -> SyncCompletion {
        let (tx, rx) = watch::channel(false);
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.insert(job_id, tx);
        trace!(%job_id, pending = slots.len(), "Registered sync job");
        SyncCompletion { rx }
    }

    /// Release the slot of `job_id`. Returns `false` when it was already
    /// released or never registered.
    pub fn mark_complete(&self, job_id: SyncJobId) -> bool {
        let sender = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job_id);

        match sender {
            Some(sender) => {
                sender.send_replace(true);
                trace!(%job_id, "Marked sync job complete");
                true
            }
            None => false,
        }
    }

    pub fn pending_jobs(&self) -> HashSet<SyncJobId> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    pub fn is_pending(&self, job_id: SyncJobId) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&job_id)
    }

    pub fn has_pending(&self) -> bool {
        !self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

/// Resolves when a tracker slot is released.
#[derive(Debug, Clone)]
pub struct SyncCompletion {
    rx: watch::Receiver<bool>,
}

impl SyncCompletion {
    pub fn is_complete(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the slot is released. Also returns if the tracker itself
    /// is dropped, so callers never wait forever.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|complete| *complete).await;
    }
}

/// Local and cloud trackers of one domain.
#[derive(Debug, Default)]
pub struct DomainTrackers {
    local: SyncTracker,
    cloud: SyncTracker,
}

impl DomainTrackers {
    pub fn for_source(&self, source: SyncSource) -> &SyncTracker {
        match source {
            SyncSource::Local => &self.local,
            SyncSource::Cloud => &self.cloud,
        }
    }

    /// True when no job is pending on either source.
    pub fn is_idle(&self) -> bool {
        SyncSource::ALL
            .iter()
            .all(|source| !self.for_source(*source).has_pending())
    }
}

/// Every tracker of the engine.
#[derive(Debug, Default)]
pub struct SyncTrackerRegistry {
    search_results: DomainTrackers,
    media_sets: DomainTrackers,
    media_in_media_set: DomainTrackers,
}

impl SyncTrackerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn domain(&self, domain: SyncDomain) -> &DomainTrackers {
        match domain {
            SyncDomain::SearchResults => &self.search_results,
            SyncDomain::MediaSets => &self.media_sets,
            SyncDomain::MediaInMediaSet => &self.media_in_media_set,
        }
    }

    pub fn tracker(&self, domain: SyncDomain, source: SyncSource) -> &SyncTracker {
        self.domain(domain).for_source(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_complete_is_idempotent() {
        let tracker = SyncTracker::new();
        let job_id = SyncJobId::new();
        let completion = tracker.register(job_id);

        assert!(tracker.is_pending(job_id));
        assert!(tracker.mark_complete(job_id));
        assert!(!tracker.mark_complete(job_id));
        assert!(completion.is_complete());
        assert!(tracker.pending_jobs().is_empty());
    }

    #[test]
    fn test_pending_jobs() {
        let tracker = SyncTracker::new();
        let a = SyncJobId::new();
        let b = SyncJobId::new();
        let _ca = tracker.register(a);
        let _cb = tracker.register(b);
        tracker.mark_complete(a);

        let pending = tracker.pending_jobs();
        assert_eq!(pending.len(), 1);
        assert!(pending.contains(&b));
    }

    #[tokio::test]
    async fn test_wait_resolves_on_completion() {
        let tracker = std::sync::Arc::new(SyncTracker::new());
        let job_id = SyncJobId::new();
        let mut completion = tracker.register(job_id);

        let waiter = tokio::spawn(async move {
            completion.wait().await;
            completion.is_complete()
        });
        tracker.mark_complete(job_id);

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_after_completion_returns_immediately() {
        let tracker = SyncTracker::new();
        let job_id = SyncJobId::new();
        let mut completion = tracker.register(job_id);
        tracker.mark_complete(job_id);

        completion.wait().await;
        assert!(completion.is_complete());
    }

    #[test]
    fn test_domain_idle_checks_both_sources() {
        let registry = SyncTrackerRegistry::new();
        let job_id = SyncJobId::new();
        let _completion = registry
            .tracker(SyncDomain::SearchResults, SyncSource::Cloud)
            .register(job_id);

        assert!(!registry.domain(SyncDomain::SearchResults).is_idle());
        assert!(registry.domain(SyncDomain::MediaSets).is_idle());
    }
}
