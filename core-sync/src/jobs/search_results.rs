use async_trait::async_trait;
use bridge_traits::QueryTarget;
use core_library::{
    MediaParent, ResumeState, SearchRequest, SearchRequestRepository, SuggestionType, SyncSource,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::SyncJob;
use crate::binding::RunGuard;
use crate::cache_writer::MediaPageSink;
use crate::engine::SyncEngine;
use crate::error::{Result, SyncError};
use crate::job::{step, JobRun, StepResult, SyncDomain};
use crate::page_loop::{LoopExit, PageLoop};

/// What the scheduler supplies to sync one search request from one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSyncParams {
    pub search_request_id: i64,
    pub source: SyncSource,
    pub authority: String,
    /// How many times the scheduler already ran this invocation.
    #[serde(default)]
    pub attempt: u32,
}

impl SearchSyncParams {
    pub fn new(search_request_id: i64, source: SyncSource, authority: impl Into<String>) -> Self {
        Self {
            search_request_id,
            source,
            authority: authority.into(),
            attempt: 0,
        }
    }
}

pub(crate) struct SearchResultsSyncJob<'a> {
    pub engine: &'a SyncEngine,
    pub params: SearchSyncParams,
}

#[async_trait]
impl<'a> SyncJob for SearchResultsSyncJob<'a> {
    fn domain(&self) -> SyncDomain {
        SyncDomain::SearchResults
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

    #[instrument(skip_all, fields(job_id = %run.id, search_request_id = self.params.search_request_id))]
    async fn execute(&self, run: &mut JobRun, guard: &RunGuard) -> StepResult<()> {
        let id = self.params.search_request_id;
        let source = self.params.source;
        let authority = self.params.authority.as_str();

        let request = match step!(self
            .engine
            .store
            .search_requests()
            .find_by_id(id)
            .await
            .map_err(SyncError::from))
        {
            Some(request) => request,
            None => {
                return StepResult::Failed(SyncError::invalid_input(
                    "search_request_id",
                    format!("search request {} does not exist", id),
                ))
            }
        };

        let target = step!(self.query_target(&request));

        let mut state = request.resume_state(source).clone();
        if state.is_bound_to_other(authority) {
            warn!(
                search_request_id = id,
                %source,
                previous = ?state.authority,
                current = authority,
                "Resume state belongs to another authority, purging cached results"
            );
            state = step!(self.purge_stale_binding(guard).await);
        }

        if state.is_synced() {
            info!(search_request_id = id, %source, "Search results are already synced");
            return StepResult::Ok(());
        }

        let client = step!(self.engine.provider_client(authority));
        let parent = MediaParent::SearchRequest(id);
        let tracker = self.engine.trackers.tracker(SyncDomain::SearchResults, source);
        let page_loop = PageLoop {
            client: &client,
            target: &target,
            mime_types: request.mime_types.as_deref(),
            guard,
            tracker,
            notifier: self.engine.notifier.as_ref(),
            event_bus: &self.engine.event_bus,
            domain: SyncDomain::SearchResults,
            parent_key: id.to_string(),
            max_iterations: self.engine.config.max_page_iterations,
        };
        let sink = MediaPageSink {
            writer: &self.engine.writer,
            parent,
            authority,
            source,
        };

        let exit = step!(
            page_loop
                .run(run, state.start_token().map(str::to_string), &sink)
                .await
        );
        if exit == LoopExit::Terminal {
            step!(self.persist_synced(guard).await);
        }

        StepResult::Ok(())
    }
}

impl SearchResultsSyncJob<'_> {
    /// Build the provider query for `request`. The suggestion's media set id
    /// is only meaningful to the authority that produced it.
    fn query_target(&self, request: &SearchRequest) -> Result<QueryTarget> {
        let authority = self.params.authority.as_str();
        let suggestion = request.suggestion.as_ref();

        if let Some(suggestion) = suggestion {
            if suggestion.suggestion_type == SuggestionType::Album
                && self.engine.binding.source_of(&suggestion.authority) != Some(self.params.source)
            {
                return Err(SyncError::invalid_input(
                    "source",
                    format!(
                        "album suggestion from {} cannot be synced from the {} source",
                        suggestion.authority, self.params.source
                    ),
                ));
            }
        }

        let media_set_id = suggestion
            .filter(|s| s.authority == authority)
            .map(|s| s.media_set_id.clone());
        let search_text = request
            .search_text
            .clone()
            .filter(|text| !text.is_empty());

        if search_text.is_none() && media_set_id.is_none() {
            return Err(SyncError::invalid_input(
                "search_request_id",
                format!(
                    "search request {} has nothing to query {}",
                    request.id, authority
                ),
            ));
        }

        Ok(QueryTarget::Search {
            search_text,
            media_set_id,
        })
    }

    /// Drop the source's cached results and resume state in one
    /// transaction, then return the state as re-read before commit.
    async fn purge_stale_binding(&self, guard: &RunGuard) -> Result<ResumeState> {
        let id = self.params.search_request_id;
        let source = self.params.source;

        let mut tx = self.engine.store.begin().await?;
        tx.clear_search_resume(&[id], source).await?;
        let deleted = tx.delete_search_results(&[id], source).await?;
        let state = tx
            .search_request(id)
            .await?
            .map(|request| request.resume_state(source).clone())
            .unwrap_or_default();

        guard.check()?;
        tx.commit().await?;

        info!(search_request_id = id, %source, deleted, "Purged stale search results");
        Ok(state)
    }

    async fn persist_synced(&self, guard: &RunGuard) -> Result<()> {
        let mut tx = self.engine.store.begin().await?;
        tx.update_search_resume(
            self.params.search_request_id,
            self.params.source,
            &ResumeState::synced(self.params.authority.as_str()),
        )
        .await?;

        guard.check()?;
        tx.commit().await?;
        Ok(())
    }
}
