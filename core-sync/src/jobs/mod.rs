//! # Sync Jobs
//!
//! One job per cached domain. Every job runs through [`run_sync_job`],
//! which owns the parts all domains share:
//!
//! 1. Refuse re-runs (`attempt > 0`) before any provider call
//! 2. Check that the requested authority is still bound to the source
//! 3. Execute the domain's steps under a [`RunGuard`]
//! 4. Release the tracker slot whatever happened
//! 5. Log, publish and report the outcome
//!
//! Nothing escapes a job as an error; the scheduler only sees a
//! [`JobReport`].

mod media_in_media_set;
mod media_sets;
mod search_results;

pub use media_in_media_set::MediaInMediaSetSyncParams;
pub use media_sets::MediaSetsSyncParams;
pub use search_results::SearchSyncParams;

pub(crate) use media_in_media_set::MediaInMediaSetSyncJob;
pub(crate) use media_sets::MediaSetsSyncJob;
pub(crate) use search_results::SearchResultsSyncJob;

use async_trait::async_trait;
use core_library::SyncSource;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::binding::RunGuard;
use crate::engine::SyncEngine;
use crate::error::SyncError;
use crate::job::{JobOutcome, JobReport, JobRun, StepResult, SyncDomain, SyncJobId};

#[async_trait]
pub(crate) trait SyncJob: Send + Sync {
    fn domain(&self) -> SyncDomain;
    fn source(&self) -> SyncSource;
    fn authority(&self) -> &str;
    fn attempt(&self) -> u32;

    /// Domain steps, run after the shared preconditions passed.
    async fn execute(&self, run: &mut JobRun, guard: &RunGuard) -> StepResult<()>;
}

/// Run `job` whose tracker slot is already registered under `job_id`.
pub(crate) async fn run_sync_job(
    engine: &SyncEngine,
    job: &dyn SyncJob,
    job_id: SyncJobId,
    cancel: CancellationToken,
) -> JobReport {
    let domain = job.domain();
    let source = job.source();
    let authority = job.authority();
    let mut run = JobRun::new(job_id, domain, Some(source));

    info!(
        %job_id,
        %domain,
        %source,
        authority,
        "Starting sync job"
    );
    engine
        .event_bus
        .emit(CoreEvent::Sync(SyncEvent::Started {
            job_id: job_id.to_string(),
            domain: domain.as_str().to_string(),
            source: source.as_str().to_string(),
            authority: authority.to_string(),
        }))
        .ok();

    let result = if job.attempt() > 0 {
        warn!(%job_id, attempt = job.attempt(), "Sync job re-run detected, ending in failure");
        StepResult::Failed(SyncError::invalid_input(
            "attempt",
            "sync jobs are never retried in place",
        ))
    } else if !engine.binding.is_current(source, authority) {
        StepResult::Obsolete(format!(
            "authority {} is no longer bound to {}",
            authority, source
        ))
    } else {
        let guard = RunGuard::bound(cancel, engine.binding.clone(), source, authority);
        job.execute(&mut run, &guard).await
    };

    engine.trackers.tracker(domain, source).mark_complete(job_id);

    let completed = SyncEvent::Completed {
        job_id: job_id.to_string(),
        pages: run.pages(),
        rows_written: run.rows_written(),
    };
    finish_run(&engine.event_bus, run, result, completed)
}

/// Log and publish the outcome of `run`, then close it. `completed` is
/// published on success.
pub(crate) fn finish_run(
    event_bus: &EventBus,
    run: JobRun,
    result: StepResult<()>,
    completed: SyncEvent,
) -> JobReport {
    let job_id = run.id;
    let event = match &result {
        StepResult::Ok(()) => {
            info!(
                %job_id,
                domain = %run.domain,
                pages = run.pages(),
                rows = run.rows_written(),
                "Job completed"
            );
            completed
        }
        StepResult::Obsolete(reason) => {
            info!(%job_id, domain = %run.domain, reason = %reason, "Job is obsolete");
            SyncEvent::Obsolete {
                job_id: job_id.to_string(),
                reason: reason.clone(),
            }
        }
        StepResult::Failed(err) => {
            error!(%job_id, domain = %run.domain, kind = %err.kind(), error = %err, "Job failed");
            SyncEvent::Failed {
                job_id: job_id.to_string(),
                message: err.to_string(),
            }
        }
    };

    event_bus.emit(CoreEvent::Sync(event)).ok();
    run.finish(JobOutcome::from(result))
}
