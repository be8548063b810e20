use async_trait::async_trait;
use bridge_traits::QueryTarget;
use core_library::SyncSource;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::SyncJob;
use crate::binding::RunGuard;
use crate::cache_writer::MediaSetPageSink;
use crate::engine::SyncEngine;
use crate::error::SyncError;
use crate::job::{step, JobRun, StepResult, SyncDomain};
use crate::page_loop::PageLoop;

/// Enumerate the media sets of one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSetsSyncParams {
    pub category_id: String,
    pub source: SyncSource,
    /// Authority that owns the category.
    pub authority: String,
    #[serde(default)]
    pub mime_types: Option<Vec<String>>,
    #[serde(default)]
    pub attempt: u32,
}

impl MediaSetsSyncParams {
    pub fn new(
        category_id: impl Into<String>,
        source: SyncSource,
        authority: impl Into<String>,
    ) -> Self {
        Self {
            category_id: category_id.into(),
            source,
            authority: authority.into(),
            mime_types: None,
            attempt: 0,
        }
    }

    pub fn with_mime_types(mut self, mime_types: Vec<String>) -> Self {
        self.mime_types = Some(mime_types);
        self
    }
}

pub(crate) struct MediaSetsSyncJob<'a> {
    pub engine: &'a SyncEngine,
    pub params: MediaSetsSyncParams,
}

#[async_trait]
impl<'a> SyncJob for MediaSetsSyncJob<'a> {
    fn domain(&self) -> SyncDomain {
        SyncDomain::MediaSets
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

    /// Media sets carry no resume position: every run enumerates the
    /// category from its first page.
    #[instrument(skip_all, fields(job_id = %run.id, category_id = %self.params.category_id))]
    async fn execute(&self, run: &mut JobRun, guard: &RunGuard) -> StepResult<()> {
        let params = &self.params;
        if params.category_id.is_empty() {
            return StepResult::Failed(SyncError::invalid_input(
                "category_id",
                "category id must not be empty",
            ));
        }

        let client = step!(self.engine.provider_client(&params.authority));
        let target = QueryTarget::MediaSets {
            category_id: params.category_id.clone(),
        };
        let page_loop = PageLoop {
            client: &client,
            target: &target,
            mime_types: params.mime_types.as_deref(),
            guard,
            tracker: self
                .engine
                .trackers
                .tracker(SyncDomain::MediaSets, params.source),
            notifier: self.engine.notifier.as_ref(),
            event_bus: &self.engine.event_bus,
            domain: SyncDomain::MediaSets,
            parent_key: params.category_id.clone(),
            max_iterations: self.engine.config.max_page_iterations,
        };
        let sink = MediaSetPageSink {
            writer: &self.engine.writer,
            category_id: &params.category_id,
            authority: &params.authority,
            mime_types: params.mime_types.as_deref(),
        };

        page_loop.run(run, None, &sink).await.map(|_| ())
    }
}
