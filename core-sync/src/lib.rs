//! # Media Index Sync
//!
//! Pulls media sets, the media inside them and search results from the
//! local and cloud providers into the cache store, one page per
//! transaction, resumably.
//!
//! ## Overview
//!
//! A sync job validates its inputs and its authority binding, reconciles the
//! persisted resume state, then fetches and caches pages until the provider
//! reports the last page. Readers waiting on the job's tracker slot are
//! released after the first cached page. Reset jobs invalidate cached rows
//! and refuse to run while a writer for the same source is pending.
//!
//! ## Components
//!
//! - **Provider Client** (`provider_client`): Validated page and capabilities calls
//! - **Cache Writer** (`cache_writer`): Provider rows to cache rows, one transaction per page
//! - **Page Loop** (`page_loop`): Fetch/cache cycle with token-loop defense
//! - **Sync Jobs** (`jobs`): Search results, media sets, media in a media set
//! - **Sync Tracker** (`tracker`): Outstanding jobs per domain and source
//! - **Reset Jobs** (`reset`): Partial, full, expired and media-sets invalidation
//! - **Change Notifier** (`notifier`): "Data changed" signal for readers
//! - **Sync Engine** (`engine`): The context object jobs run against

pub mod binding;
pub mod cache_writer;
pub mod engine;
pub mod error;
pub mod job;
pub mod jobs;
pub mod notifier;
pub mod page_loop;
pub mod provider_client;
pub mod reset;
pub mod tracker;

pub use binding::{AuthorityBinding, RunGuard};
pub use cache_writer::CacheWriter;
pub use engine::{JobHandle, SyncEngine};
pub use error::{ErrorKind, Result, SyncError};
pub use job::{
    JobFailure, JobOutcome, JobReport, JobRun, JobState, StepResult, SyncDomain, SyncJobId,
};
pub use jobs::{MediaInMediaSetSyncParams, MediaSetsSyncParams, SearchSyncParams};
pub use notifier::{ChangeNotifier, EventBusNotifier};
pub use page_loop::{LoopExit, PageLoop, PageSink};
pub use provider_client::{FetchedPage, ProviderClient};
pub use reset::{ResetMode, ResetParams};
pub use tracker::{DomainTrackers, SyncCompletion, SyncTracker, SyncTrackerRegistry};
