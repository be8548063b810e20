//! # Sync Job State Machine
//!
//! Lifecycle bookkeeping shared by the sync and reset jobs.
//!
//! ## State Machine
//!
//! ```text
//! Validating → Fetching ⇄ Caching → Complete
//!      │           │         │
//!      └───────────┴─────────┴────→ Failed
//! ```
//!
//! `Validating → Complete` covers runs with nothing to do (already synced,
//! resets). `Fetching → Complete` covers a run that stops on a repeated page
//! token before writing the page.
//!
//! Every step of a run reports a [`StepResult`]; obsolescence is an ordinary
//! variant, not an error path.

use core_library::SyncSource;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{ErrorKind, Result, SyncError};

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a sync or reset job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncJobId(Uuid);

impl SyncJobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(
            Uuid::parse_str(s).map_err(|e| SyncError::InvalidJobId(e.to_string()))?,
        ))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SyncJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SyncJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SyncJobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Domains
// ============================================================================

/// The cached data set a job works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDomain {
    MediaSets,
    MediaInMediaSet,
    SearchResults,
}

impl SyncDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDomain::MediaSets => "media_sets",
            SyncDomain::MediaInMediaSet => "media_in_media_set",
            SyncDomain::SearchResults => "search_results",
        }
    }
}

impl FromStr for SyncDomain {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "media_sets" => Ok(SyncDomain::MediaSets),
            "media_in_media_set" => Ok(SyncDomain::MediaInMediaSet),
            "search_results" => Ok(SyncDomain::SearchResults),
            other => Err(SyncError::invalid_input(
                "domain",
                format!("unknown sync domain '{}'", other),
            )),
        }
    }
}

impl std::fmt::Display for SyncDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// States
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Validating,
    Fetching,
    Caching,
    Complete,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Validating => "validating",
            JobState::Fetching => "fetching",
            JobState::Caching => "caching",
            JobState::Complete => "complete",
            JobState::Failed => "failed",
        }
    }

    fn can_transition_to(&self, to: JobState) -> bool {
        match (self, to) {
            (_, JobState::Failed) => !self.is_terminal(),

            (JobState::Validating, JobState::Fetching) => true,
            (JobState::Validating, JobState::Complete) => true,

            (JobState::Fetching, JobState::Caching) => true,
            (JobState::Fetching, JobState::Complete) => true,

            (JobState::Caching, JobState::Fetching) => true,
            (JobState::Caching, JobState::Complete) => true,

            _ => false,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Step results
// ============================================================================

/// Result of one step of a run.
#[derive(Debug)]
#[must_use]
pub enum StepResult<T = u64> {
    Ok(T),
    Obsolete(String),
    Failed(SyncError),
}

impl<T> StepResult<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, StepResult::Ok(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StepResult<U> {
        match self {
            StepResult::Ok(value) => StepResult::Ok(f(value)),
            StepResult::Obsolete(reason) => StepResult::Obsolete(reason),
            StepResult::Failed(err) => StepResult::Failed(err),
        }
    }
}

impl<T> From<Result<T>> for StepResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => StepResult::Ok(value),
            Err(SyncError::Obsolete(reason)) => StepResult::Obsolete(reason),
            Err(err) => StepResult::Failed(err),
        }
    }
}

/// Unwrap a step, returning early from the enclosing function on anything
/// but `Ok`.
macro_rules! step {
    ($e:expr) => {
        match $crate::job::StepResult::from($e) {
            $crate::job::StepResult::Ok(value) => value,
            $crate::job::StepResult::Obsolete(reason) => {
                return $crate::job::StepResult::Obsolete(reason)
            }
            $crate::job::StepResult::Failed(err) => return $crate::job::StepResult::Failed(err),
        }
    };
}
pub(crate) use step;

// ============================================================================
// Outcomes
// ============================================================================

/// Why a run ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobFailure {
    pub fn is_recoverable(&self) -> bool {
        self.kind == ErrorKind::Obsolete
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    Complete,
    Failed(JobFailure),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Complete)
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        match self {
            JobOutcome::Complete => None,
            JobOutcome::Failed(failure) => Some(failure),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.failure().map(|f| f.kind)
    }
}

impl<T> From<StepResult<T>> for JobOutcome {
    fn from(result: StepResult<T>) -> Self {
        match result {
            StepResult::Ok(_) => JobOutcome::Complete,
            StepResult::Obsolete(reason) => JobOutcome::Failed(JobFailure {
                kind: ErrorKind::Obsolete,
                message: reason,
            }),
            StepResult::Failed(err) => JobOutcome::Failed(JobFailure {
                kind: err.kind(),
                message: err.to_string(),
            }),
        }
    }
}

/// What a finished run hands back to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: SyncJobId,
    pub domain: SyncDomain,
    pub source: Option<SyncSource>,
    pub outcome: JobOutcome,
    pub pages: u32,
    pub rows_written: u64,
    /// The provider repeated a page token and the run stopped early.
    pub loop_detected: bool,
}

// ============================================================================
// Run bookkeeping
// ============================================================================

/// Mutable state of one run, owned by the job executing it.
#[derive(Debug)]
pub struct JobRun {
    pub id: SyncJobId,
    pub domain: SyncDomain,
    pub source: Option<SyncSource>,
    state: JobState,
    pages: u32,
    rows_written: u64,
    loop_detected: bool,
}

impl JobRun {
    pub fn new(id: SyncJobId, domain: SyncDomain, source: Option<SyncSource>) -> Self {
        Self {
            id,
            domain,
            source,
            state: JobState::Validating,
            pages: 0,
            rows_written: 0,
            loop_detected: false,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn pages(&self) -> u32 {
        self.pages
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Move to `to`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` if the machine does not allow it.
    pub fn advance(&mut self, to: JobState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(SyncError::InvalidStateTransition {
                from: self.state.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!("Cannot transition from {} to {}", self.state, to),
            });
        }
        self.state = to;
        Ok(())
    }

    pub(crate) fn record_page(&mut self, rows_written: u64) {
        self.pages += 1;
        self.rows_written += rows_written;
    }

    pub(crate) fn mark_loop_detected(&mut self) {
        self.loop_detected = true;
    }

    /// Close the run with the outcome of its last step.
    pub fn finish(mut self, outcome: JobOutcome) -> JobReport {
        let terminal = if outcome.is_success() {
            JobState::Complete
        } else {
            JobState::Failed
        };
        if !self.state.is_terminal() && self.advance(terminal).is_err() {
            self.state = JobState::Failed;
        }

        JobReport {
            job_id: self.id,
            domain: self.domain,
            source: self.source,
            outcome,
            pages: self.pages,
            rows_written: self.rows_written,
            loop_detected: self.loop_detected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_job_id_from_string() {
        let uuid_str = "550e8400-e29b-41d4-a716-446655440000";
        let id = SyncJobId::from_string(uuid_str).unwrap();
        assert_eq!(id.as_str(), uuid_str);
        assert!(matches!(
            SyncJobId::from_string("not-a-uuid"),
            Err(SyncError::InvalidJobId(_))
        ));
    }

    #[test]
    fn test_sync_domain_parsing() {
        assert_eq!(
            "SEARCH_RESULTS".parse::<SyncDomain>().unwrap(),
            SyncDomain::SearchResults
        );
        assert!("albums".parse::<SyncDomain>().is_err());
    }

    #[test]
    fn test_page_loop_transitions() {
        let mut run = JobRun::new(SyncJobId::new(), SyncDomain::SearchResults, None);
        run.advance(JobState::Fetching).unwrap();
        run.advance(JobState::Caching).unwrap();
        run.advance(JobState::Fetching).unwrap();
        run.advance(JobState::Caching).unwrap();
        run.advance(JobState::Complete).unwrap();
        assert!(run.state().is_terminal());
    }

    #[test]
    fn test_terminal_states_cannot_transition() {
        let mut run = JobRun::new(SyncJobId::new(), SyncDomain::MediaSets, None);
        run.advance(JobState::Complete).unwrap();

        assert!(run.advance(JobState::Fetching).is_err());
        assert!(run.advance(JobState::Failed).is_err());
    }

    #[test]
    fn test_validating_cannot_skip_to_caching() {
        let mut run = JobRun::new(SyncJobId::new(), SyncDomain::MediaSets, None);
        let err = run.advance(JobState::Caching).unwrap_err();
        assert!(matches!(err, SyncError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_step_result_from_obsolete_error() {
        let step: StepResult<u64> = Err(SyncError::obsolete("cancelled")).into();
        assert!(matches!(step, StepResult::Obsolete(ref r) if r == "cancelled"));

        let outcome = JobOutcome::from(step);
        assert!(!outcome.is_success());
        assert!(outcome.failure().unwrap().is_recoverable());
    }

    #[test]
    fn test_finish_records_progress() {
        let mut run = JobRun::new(
            SyncJobId::new(),
            SyncDomain::SearchResults,
            Some(SyncSource::Cloud),
        );
        run.advance(JobState::Fetching).unwrap();
        run.advance(JobState::Caching).unwrap();
        run.record_page(500);
        run.advance(JobState::Fetching).unwrap();
        run.advance(JobState::Caching).unwrap();
        run.record_page(37);

        let report = run.finish(JobOutcome::Complete);
        assert_eq!(report.pages, 2);
        assert_eq!(report.rows_written, 537);
        assert!(report.outcome.is_success());
    }

    #[test]
    fn test_finish_failure_from_any_state() {
        let run = JobRun::new(SyncJobId::new(), SyncDomain::SearchResults, None);
        let report = run.finish(JobOutcome::from(StepResult::<()>::Failed(
            SyncError::RemoteUnavailable("no page".to_string()),
        )));
        assert_eq!(report.outcome.error_kind(), Some(ErrorKind::RemoteUnavailable));
    }
}
