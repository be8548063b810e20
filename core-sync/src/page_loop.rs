//! # Page Loop
//!
//! The fetch/cache cycle shared by every sync job.
//!
//! Each iteration re-checks the run guard, fetches one page, stops if the
//! provider repeated a token, re-checks the guard, and writes the page in
//! its own transaction. The first committed page releases the job's tracker
//! slot so readers can start on partial data. Every committed page that
//! changed at least one row sends one change notification.
//!
//! Pages are fetched and written strictly in sequence.

use std::collections::HashSet;

use async_trait::async_trait;
use bridge_traits::{ProviderRow, QueryTarget};
use core_library::ResumeKey;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use tracing::{debug, warn};

use crate::binding::RunGuard;
use crate::error::Result;
use crate::job::{step, JobRun, JobState, StepResult, SyncDomain};
use crate::notifier::ChangeNotifier;
use crate::provider_client::ProviderClient;
use crate::tracker::SyncTracker;

/// Destination of the pages of one run.
#[async_trait]
pub trait PageSink: Send + Sync {
    /// Write one page in a single transaction, re-checking `guard` before
    /// commit. Returns the number of rows inserted or changed.
    async fn write_page(&self, rows: &[ProviderRow], guard: &RunGuard) -> Result<u64>;
}

/// Why the loop stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The provider reported no further pages.
    Terminal,
    /// The provider repeated a page token.
    LoopDetected,
    /// The iteration ceiling was reached.
    IterationLimit,
}

pub struct PageLoop<'a> {
    pub client: &'a ProviderClient,
    pub target: &'a QueryTarget,
    pub mime_types: Option<&'a [String]>,
    pub guard: &'a RunGuard,
    pub tracker: &'a SyncTracker,
    pub notifier: &'a dyn ChangeNotifier,
    pub event_bus: &'a EventBus,
    pub domain: SyncDomain,
    pub parent_key: String,
    pub max_iterations: u32,
}

impl PageLoop<'_> {
    /// Run pages from `start` (`None` for the first page) until the provider
    /// reports the last page, repeats a token or a step fails.
    pub async fn run(
        &self,
        run: &mut JobRun,
        start: Option<String>,
        sink: &dyn PageSink,
    ) -> StepResult<LoopExit> {
        let mut known_tokens: HashSet<String> = start.iter().cloned().collect();
        let mut page_token = start;
        let mut marked_usable = false;

        for iteration in 0..self.max_iterations {
            step!(self.guard.check());
            step!(run.advance(JobState::Fetching));

            let page = step!(
                self.client
                    .fetch_page(
                        self.target,
                        page_token.as_deref(),
                        self.mime_types,
                        self.guard.cancel_token(),
                    )
                    .await
            );

            if let ResumeKey::Token(token) = &page.next {
                if known_tokens.contains(token) {
                    warn!(
                        job_id = %run.id,
                        domain = %self.domain,
                        parent_key = %self.parent_key,
                        iteration,
                        "Loop detected: provider sent the same page token twice"
                    );
                    run.mark_loop_detected();
                    return StepResult::Ok(LoopExit::LoopDetected);
                }
            }

            step!(self.guard.check());
            step!(run.advance(JobState::Caching));

            let written = step!(sink.write_page(&page.rows, self.guard).await);
            run.record_page(written);

            if !marked_usable {
                self.tracker.mark_complete(run.id);
                marked_usable = true;
            }
            if written > 0 {
                self.notifier.notify_changed(self.domain, &self.parent_key);
            }
            self.event_bus
                .emit(CoreEvent::Sync(SyncEvent::PageCached {
                    job_id: run.id.to_string(),
                    page: run.pages(),
                    rows_written: written,
                }))
                .ok();

            debug!(
                job_id = %run.id,
                page = run.pages(),
                rows = page.rows.len(),
                written,
                "Page cached"
            );

            match page.next {
                ResumeKey::Synced => return StepResult::Ok(LoopExit::Terminal),
                ResumeKey::Token(token) => {
                    known_tokens.insert(token.clone());
                    page_token = Some(token);
                }
            }
        }

        warn!(
            job_id = %run.id,
            iterations = self.max_iterations,
            "Page iteration ceiling reached"
        );
        StepResult::Ok(LoopExit::IterationLimit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::SyncJobId;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{MediaProvider, PageQuery, ProviderCapabilities, ProviderPage};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio_util::sync::CancellationToken;

    struct ScriptedProvider {
        pages: Mutex<VecDeque<Option<ProviderPage>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(pages: Vec<Option<ProviderPage>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MediaProvider for ScriptedProvider {
        fn authority(&self) -> &str {
            "local"
        }

        async fn query_page(
            &self,
            _query: &PageQuery,
            _cancel: &CancellationToken,
        ) -> BridgeResult<Option<ProviderPage>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.pages.lock().unwrap().pop_front().flatten())
        }

        async fn capabilities(&self) -> BridgeResult<ProviderCapabilities> {
            Ok(ProviderCapabilities::default())
        }
    }

    #[derive(Default)]
    struct CountingSink {
        rows: AtomicUsize,
    }

    #[async_trait]
    impl PageSink for CountingSink {
        async fn write_page(&self, rows: &[ProviderRow], guard: &RunGuard) -> Result<u64> {
            guard.check()?;
            self.rows.fetch_add(rows.len(), Ordering::SeqCst);
            Ok(rows.len() as u64)
        }
    }

    #[derive(Default)]
    struct CountingNotifier {
        count: AtomicUsize,
    }

    impl ChangeNotifier for CountingNotifier {
        fn notify_changed(&self, _domain: SyncDomain, _parent_key: &str) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn page(ids: &[&str], next: Option<&str>) -> Option<ProviderPage> {
        Some(ProviderPage {
            rows: ids
                .iter()
                .map(|id| ProviderRow {
                    id: id.to_string(),
                    ..Default::default()
                })
                .collect(),
            next_page_token: next.map(str::to_string),
        })
    }

    struct Harness {
        provider: Arc<ScriptedProvider>,
        client: ProviderClient,
        target: QueryTarget,
        guard: RunGuard,
        cancel: CancellationToken,
        tracker: SyncTracker,
        notifier: CountingNotifier,
        event_bus: EventBus,
    }

    impl Harness {
        fn new(pages: Vec<Option<ProviderPage>>) -> Self {
            let provider = Arc::new(ScriptedProvider::new(pages));
            let cancel = CancellationToken::new();
            Self {
                client: ProviderClient::new(provider.clone(), 10),
                provider,
                target: QueryTarget::MediaInMediaSet {
                    media_set_id: "set-1".to_string(),
                },
                guard: RunGuard::cancellation_only(cancel.clone()),
                cancel,
                tracker: SyncTracker::new(),
                notifier: CountingNotifier::default(),
                event_bus: EventBus::new(16),
            }
        }

        fn page_loop(&self) -> PageLoop<'_> {
            PageLoop {
                client: &self.client,
                target: &self.target,
                mime_types: None,
                guard: &self.guard,
                tracker: &self.tracker,
                notifier: &self.notifier,
                event_bus: &self.event_bus,
                domain: SyncDomain::MediaInMediaSet,
                parent_key: "1".to_string(),
                max_iterations: 100,
            }
        }
    }

    #[tokio::test]
    async fn test_runs_until_terminal_token() {
        let harness = Harness::new(vec![page(&["a", "b"], Some("t1")), page(&["c"], None)]);
        let sink = CountingSink::default();
        let mut run = JobRun::new(SyncJobId::new(), SyncDomain::MediaInMediaSet, None);

        let exit = harness.page_loop().run(&mut run, None, &sink).await;

        assert!(matches!(exit, StepResult::Ok(LoopExit::Terminal)));
        assert_eq!(run.pages(), 2);
        assert_eq!(sink.rows.load(Ordering::SeqCst), 3);
        assert_eq!(harness.notifier.count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_repeated_token_stops_before_writing() {
        let harness = Harness::new(vec![
            page(&["a"], Some("t1")),
            page(&["b"], Some("t1")),
            page(&["c"], None),
        ]);
        let sink = CountingSink::default();
        let mut run = JobRun::new(SyncJobId::new(), SyncDomain::MediaInMediaSet, None);

        let exit = harness.page_loop().run(&mut run, None, &sink).await;

        assert!(matches!(exit, StepResult::Ok(LoopExit::LoopDetected)));
        assert_eq!(sink.rows.load(Ordering::SeqCst), 1);
        assert_eq!(harness.provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_resume_token_counts_as_known() {
        let harness = Harness::new(vec![page(&["a"], Some("t0"))]);
        let sink = CountingSink::default();
        let mut run = JobRun::new(SyncJobId::new(), SyncDomain::MediaInMediaSet, None);

        let exit = harness
            .page_loop()
            .run(&mut run, Some("t0".to_string()), &sink)
            .await;

        assert!(matches!(exit, StepResult::Ok(LoopExit::LoopDetected)));
        assert_eq!(run.pages(), 0);
    }

    #[tokio::test]
    async fn test_first_page_releases_tracker_slot() {
        let harness = Harness::new(vec![page(&["a"], Some("t1")), None]);
        let sink = CountingSink::default();
        let mut run = JobRun::new(SyncJobId::new(), SyncDomain::MediaInMediaSet, None);
        let completion = harness.tracker.register(run.id);

        let exit = harness.page_loop().run(&mut run, None, &sink).await;

        assert!(matches!(exit, StepResult::Failed(_)));
        assert!(completion.is_complete());
        assert_eq!(run.pages(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_fetch() {
        let harness = Harness::new(vec![page(&["a"], None)]);
        harness.cancel.cancel();
        let sink = CountingSink::default();
        let mut run = JobRun::new(SyncJobId::new(), SyncDomain::MediaInMediaSet, None);

        let exit = harness.page_loop().run(&mut run, None, &sink).await;

        assert!(matches!(exit, StepResult::Obsolete(_)));
        assert_eq!(harness.provider.calls.load(Ordering::SeqCst), 0);
    }
}
