//! # Sync Engine
//!
//! The context object every sync and reset job runs against.
//!
//! ## Overview
//!
//! `SyncEngine` owns the pieces jobs share: the cache store and its writer,
//! the provider factory, the authority binding, the tracker registry, the
//! change notifier, the event bus and the clock. It is cheap to clone; all
//! clones share the same state.
//!
//! Jobs can be awaited in place (`run_*`, the caller owns cancellation) or
//! spawned on the tokio runtime (`spawn_*`, returning a [`JobHandle`]).
//! Spawning registers the job's tracker slot before the task starts, so a
//! reader holding the handle can wait for the first usable page.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SearchSyncParams, SyncEngine};
//! use core_library::SyncSource;
//!
//! let engine = SyncEngine::open(config, providers).await?;
//! let mut handle = engine.spawn_search_sync(SearchSyncParams::new(
//!     request_id,
//!     SyncSource::Local,
//!     "com.example.local",
//! ));
//!
//! // Returns after the first page is cached.
//! handle.wait_usable().await;
//!
//! let report = handle.join().await?;
//! assert!(report.outcome.is_success());
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use bridge_traits::{Clock, MediaProviderFactory, ProviderCapabilities, SystemClock};
use core_library::{DatabaseConfig, MediaIndexStore, SyncSource};
use core_runtime::config::{DatabaseLocation, SyncEngineConfig};
use core_runtime::events::EventBus;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::binding::AuthorityBinding;
use crate::cache_writer::CacheWriter;
use crate::error::{Result, SyncError};
use crate::job::{JobReport, SyncDomain, SyncJobId};
use crate::jobs::{
    run_sync_job, MediaInMediaSetSyncJob, MediaInMediaSetSyncParams, MediaSetsSyncJob,
    MediaSetsSyncParams, SearchResultsSyncJob, SearchSyncParams,
};
use crate::notifier::{ChangeNotifier, EventBusNotifier};
use crate::provider_client::ProviderClient;
use crate::reset::{run_reset_job, ResetMode, ResetParams};
use crate::tracker::{SyncCompletion, SyncTrackerRegistry};

#[derive(Clone)]
pub struct SyncEngine {
    pub(crate) config: Arc<SyncEngineConfig>,
    pub(crate) store: MediaIndexStore,
    pub(crate) writer: CacheWriter,
    pub(crate) providers: Arc<dyn MediaProviderFactory>,
    pub(crate) binding: AuthorityBinding,
    pub(crate) trackers: Arc<SyncTrackerRegistry>,
    pub(crate) notifier: Arc<dyn ChangeNotifier>,
    pub(crate) event_bus: Arc<EventBus>,
    pub(crate) clock: Arc<dyn Clock>,
    active: Arc<Mutex<HashMap<SyncJobId, CancellationToken>>>,
}

impl SyncEngine {
    /// Open the cache database named by `config` and build an engine on it.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the database
    /// cannot be opened and migrated.
    pub async fn open(
        config: SyncEngineConfig,
        providers: Arc<dyn MediaProviderFactory>,
    ) -> Result<Self> {
        config.validate()?;

        let database = match &config.database {
            DatabaseLocation::File(path) => DatabaseConfig::new(path.clone()),
            DatabaseLocation::InMemory => DatabaseConfig::in_memory(),
        };
        let store = MediaIndexStore::open(database).await?;

        info!(
            local_authority = %config.local_authority,
            cloud_authority = ?config.cloud_authority,
            "Opened media index sync engine"
        );
        Ok(Self::new(config, store, providers))
    }

    /// Build an engine on an already opened store. Change notifications go
    /// to the engine's event bus.
    pub fn new(
        config: SyncEngineConfig,
        store: MediaIndexStore,
        providers: Arc<dyn MediaProviderFactory>,
    ) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let binding =
            AuthorityBinding::new(config.local_authority.clone(), config.cloud_authority.clone());

        Self {
            writer: CacheWriter::new(store.clone()),
            store,
            providers,
            binding,
            trackers: Arc::new(SyncTrackerRegistry::new()),
            notifier: Arc::new(EventBusNotifier::new(event_bus.clone())),
            event_bus,
            clock: Arc::new(SystemClock),
            config: Arc::new(config),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &SyncEngineConfig {
        &self.config
    }

    pub fn store(&self) -> &MediaIndexStore {
        &self.store
    }

    pub fn binding(&self) -> &AuthorityBinding {
        &self.binding
    }

    pub fn trackers(&self) -> &SyncTrackerRegistry {
        &self.trackers
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Rebind the cloud authority. Cloud runs bound to the previous
    /// authority end as obsolete at their next check.
    pub fn set_cloud_authority(&self, authority: Option<String>) {
        self.binding.set_cloud_authority(authority);
    }

    /// Capabilities of `authority`, or the all-disabled default if the
    /// provider cannot answer.
    ///
    /// # Errors
    ///
    /// Returns `RemoteUnavailable` if no provider serves `authority`.
    pub async fn fetch_capabilities(&self, authority: &str) -> Result<ProviderCapabilities> {
        Ok(self.provider_client(authority)?.fetch_capabilities().await)
    }

    /// Cancel a spawned job. Returns `false` if it already finished.
    pub fn cancel_job(&self, job_id: SyncJobId) -> bool {
        let token = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
            .cloned();

        match token {
            Some(token) => {
                token.cancel();
                info!(%job_id, "Cancelled job");
                true
            }
            None => false,
        }
    }

    pub fn active_jobs(&self) -> Vec<SyncJobId> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    pub(crate) fn provider_client(&self, authority: &str) -> Result<ProviderClient> {
        let provider = self.providers.create(authority)?;
        Ok(ProviderClient::new(provider, self.config.page_size))
    }

    // ------------------------------------------------------------------------
    // Search results
    // ------------------------------------------------------------------------

    #[instrument(skip(self, cancel), fields(search_request_id = params.search_request_id, source = %params.source))]
    pub async fn run_search_sync(
        &self,
        params: SearchSyncParams,
        cancel: CancellationToken,
    ) -> JobReport {
        let job_id = self.register(Some((SyncDomain::SearchResults, params.source)));
        self.execute_search(params, job_id, cancel).await
    }

    pub fn spawn_search_sync(&self, params: SearchSyncParams) -> JobHandle {
        let slot = (SyncDomain::SearchResults, params.source);
        self.spawn(Some(slot), move |engine, job_id, cancel| async move {
            engine.execute_search(params, job_id, cancel).await
        })
    }

    async fn execute_search(
        &self,
        params: SearchSyncParams,
        job_id: SyncJobId,
        cancel: CancellationToken,
    ) -> JobReport {
        let job = SearchResultsSyncJob {
            engine: self,
            params,
        };
        run_sync_job(self, &job, job_id, cancel).await
    }

    // ------------------------------------------------------------------------
    // Media sets
    // ------------------------------------------------------------------------

    #[instrument(skip(self, cancel), fields(category_id = %params.category_id, source = %params.source))]
    pub async fn run_media_sets_sync(
        &self,
        params: MediaSetsSyncParams,
        cancel: CancellationToken,
    ) -> JobReport {
        let job_id = self.register(Some((SyncDomain::MediaSets, params.source)));
        self.execute_media_sets(params, job_id, cancel).await
    }

    pub fn spawn_media_sets_sync(&self, params: MediaSetsSyncParams) -> JobHandle {
        let slot = (SyncDomain::MediaSets, params.source);
        self.spawn(Some(slot), move |engine, job_id, cancel| async move {
            engine.execute_media_sets(params, job_id, cancel).await
        })
    }

    async fn execute_media_sets(
        &self,
        params: MediaSetsSyncParams,
        job_id: SyncJobId,
        cancel: CancellationToken,
    ) -> JobReport {
        let job = MediaSetsSyncJob {
            engine: self,
            params,
        };
        run_sync_job(self, &job, job_id, cancel).await
    }

    // ------------------------------------------------------------------------
    // Media in a media set
    // ------------------------------------------------------------------------

    #[instrument(skip(self, cancel), fields(picker_id = params.picker_id, source = %params.source))]
    pub async fn run_media_in_media_set_sync(
        &self,
        params: MediaInMediaSetSyncParams,
        cancel: CancellationToken,
    ) -> JobReport {
        let job_id = self.register(Some((SyncDomain::MediaInMediaSet, params.source)));
        self.execute_media_in_media_set(params, job_id, cancel).await
    }

    pub fn spawn_media_in_media_set_sync(&self, params: MediaInMediaSetSyncParams) -> JobHandle {
        let slot = (SyncDomain::MediaInMediaSet, params.source);
        self.spawn(Some(slot), move |engine, job_id, cancel| async move {
            engine.execute_media_in_media_set(params, job_id, cancel).await
        })
    }

    async fn execute_media_in_media_set(
        &self,
        params: MediaInMediaSetSyncParams,
        job_id: SyncJobId,
        cancel: CancellationToken,
    ) -> JobReport {
        let job = MediaInMediaSetSyncJob {
            engine: self,
            params,
        };
        run_sync_job(self, &job, job_id, cancel).await
    }

    // ------------------------------------------------------------------------
    // Resets
    // ------------------------------------------------------------------------

    #[instrument(skip(self, cancel), fields(mode = params.mode.as_str()))]
    pub async fn run_reset(&self, params: ResetParams, cancel: CancellationToken) -> JobReport {
        let job_id = self.register(reset_slot(&params.mode));
        run_reset_job(self, params, job_id, cancel).await
    }

    pub fn spawn_reset(&self, params: ResetParams) -> JobHandle {
        let slot = reset_slot(&params.mode);
        self.spawn(slot, move |engine, job_id, cancel| async move {
            run_reset_job(&engine, params, job_id, cancel).await
        })
    }

    // ------------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------------

    fn register(&self, slot: Option<(SyncDomain, SyncSource)>) -> SyncJobId {
        let job_id = SyncJobId::new();
        if let Some((domain, source)) = slot {
            self.trackers.tracker(domain, source).register(job_id);
        }
        job_id
    }

    fn spawn<F, Fut>(&self, slot: Option<(SyncDomain, SyncSource)>, job: F) -> JobHandle
    where
        F: FnOnce(SyncEngine, SyncJobId, CancellationToken) -> Fut,
        Fut: Future<Output = JobReport> + Send + 'static,
    {
        let job_id = SyncJobId::new();
        let cancel = CancellationToken::new();
        let completion =
            slot.map(|(domain, source)| self.trackers.tracker(domain, source).register(job_id));

        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id, cancel.clone());

        let active = Arc::clone(&self.active);
        let task = job(self.clone(), job_id, cancel.clone());
        let handle = tokio::spawn(async move {
            let report = task.await;
            active
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&job_id);
            report
        });

        debug!(%job_id, "Spawned job");
        JobHandle {
            job_id,
            completion,
            cancel,
            handle,
        }
    }
}

/// Media-sets resets hold a media-sets slot so that a media-sets sync
/// scheduled after them can wait for the cleanup. Search resets are not
/// tracked, or a full reset would see itself as a pending writer.
fn reset_slot(mode: &ResetMode) -> Option<(SyncDomain, SyncSource)> {
    match mode {
        ResetMode::MediaSets { source, .. } => Some((SyncDomain::MediaSets, *source)),
        _ => None,
    }
}

/// A job running on the tokio runtime.
pub struct JobHandle {
    job_id: SyncJobId,
    completion: Option<SyncCompletion>,
    cancel: CancellationToken,
    handle: JoinHandle<JobReport>,
}

impl JobHandle {
    pub fn job_id(&self) -> SyncJobId {
        self.job_id
    }

    /// Completion of the job's tracker slot. `None` for untracked resets.
    pub fn completion(&self) -> Option<&SyncCompletion> {
        self.completion.as_ref()
    }

    /// Wait until the first page is cached or the job ended.
    pub async fn wait_usable(&mut self) {
        if let Some(completion) = self.completion.as_mut() {
            completion.wait().await;
        }
    }

    /// Request cancellation. The job ends as obsolete at its next check.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the job to finish.
    ///
    /// # Errors
    ///
    /// Returns `TaskFailed` if the task panicked or was aborted.
    pub async fn join(self) -> Result<JobReport> {
        self.handle
            .await
            .map_err(|e| SyncError::TaskFailed(e.to_string()))
    }
}
