use async_trait::async_trait;
use bridge_traits::QueryTarget;
use core_library::{MediaParent, MediaSetRepository, ResumeKey, SyncSource};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::SyncJob;
use crate::binding::RunGuard;
use crate::cache_writer::MediaPageSink;
use crate::engine::SyncEngine;
use crate::error::SyncError;
use crate::job::{step, JobRun, StepResult, SyncDomain};
use crate::page_loop::{LoopExit, PageLoop};

/// Sync the media inside one cached media set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInMediaSetSyncParams {
    pub picker_id: i64,
    pub source: SyncSource,
    /// Authority of the media set.
    pub authority: String,
    #[serde(default)]
    pub attempt: u32,
}

impl MediaInMediaSetSyncParams {
    pub fn new(picker_id: i64, source: SyncSource, authority: impl Into<String>) -> Self {
        Self {
            picker_id,
            source,
            authority: authority.into(),
            attempt: 0,
        }
    }
}

pub(crate) struct MediaInMediaSetSyncJob<'a> {
    pub engine: &'a SyncEngine,
    pub params: MediaInMediaSetSyncParams,
}

#[async_trait]
impl<'a> SyncJob for MediaInMediaSetSyncJob<'a> {
    fn domain(&self) -> SyncDomain {
        SyncDomain::MediaInMediaSet
    }

    fn source(&self) -> SyncSource {
        self.params.source
    }

    fn authority(&self) -> &str {
        &self.params.authority
    }

    fn attempt(&self) -> u32 {
        self.params.attempt
    }

    #[instrument(skip_all, fields(job_id = %run.id, picker_id = self.params.picker_id))]
    async fn execute(&self, run: &mut JobRun, guard: &RunGuard) -> StepResult<()> {
        let params = &self.params;
        let media_sets = self.engine.store.media_sets();

        let media_set = match step!(media_sets
            .find_by_picker_id(params.picker_id)
            .await
            .map_err(SyncError::from))
        {
            Some(media_set) => media_set,
            None => {
                return StepResult::Failed(SyncError::invalid_input(
                    "picker_id",
                    format!("media set {} does not exist", params.picker_id),
                ))
            }
        };
        if media_set.authority != params.authority {
            return StepResult::Failed(SyncError::invalid_input(
                "authority",
                format!(
                    "media set {} belongs to {}, not {}",
                    params.picker_id, media_set.authority, params.authority
                ),
            ));
        }

        let start = match &media_set.resume_key {
            Some(ResumeKey::Synced) => {
                info!(picker_id = params.picker_id, "Media set is already synced");
                return StepResult::Ok(());
            }
            Some(ResumeKey::Token(token)) => Some(token.clone()),
            None => None,
        };

        let client = step!(self.engine.provider_client(&params.authority));
        let target = QueryTarget::MediaInMediaSet {
            media_set_id: media_set.media_set_id.clone(),
        };
        let page_loop = PageLoop {
            client: &client,
            target: &target,
            mime_types: media_set.mime_types.as_deref(),
            guard,
            tracker: self
                .engine
                .trackers
                .tracker(SyncDomain::MediaInMediaSet, params.source),
            notifier: self.engine.notifier.as_ref(),
            event_bus: &self.engine.event_bus,
            domain: SyncDomain::MediaInMediaSet,
            parent_key: params.picker_id.to_string(),
            max_iterations: self.engine.config.max_page_iterations,
        };
        let sink = MediaPageSink {
            writer: &self.engine.writer,
            parent: MediaParent::MediaSet(params.picker_id),
            authority: &params.authority,
            source: params.source,
        };

        let exit = step!(page_loop.run(run, start, &sink).await);
        if exit == LoopExit::Terminal {
            step!(guard.check());
            step!(media_sets
                .update_resume_key(params.picker_id, Some(&ResumeKey::Synced))
                .await
                .map_err(SyncError::from));
        }

        StepResult::Ok(())
    }
}
