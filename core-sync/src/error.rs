use bridge_traits::BridgeError;
use core_library::LibraryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid input for {field}: {message}")]
    InvalidInput { field: String, message: String },

    /// The run's precondition (bound authority, cancellation) went stale.
    #[error("Sync request is obsolete: {0}")]
    Obsolete(String),

    #[error("Remote provider unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Cache store error: {0}")]
    Library(#[from] LibraryError),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Invalid job ID: {0}")]
    InvalidJobId(String),

    #[error(transparent)]
    Runtime(#[from] core_runtime::Error),

    #[error("Job task failed: {0}")]
    TaskFailed(String),
}

impl SyncError {
    pub fn invalid_input(field: &str, message: impl Into<String>) -> Self {
        SyncError::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn obsolete(reason: impl Into<String>) -> Self {
        SyncError::Obsolete(reason.into())
    }

    /// Classify this error for the scheduler.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::InvalidInput { .. } | SyncError::InvalidJobId(_) => ErrorKind::InvalidInput,
            SyncError::Library(LibraryError::InvalidInput { .. })
            | SyncError::Library(LibraryError::NotFound { .. }) => ErrorKind::InvalidInput,
            SyncError::Obsolete(_) => ErrorKind::Obsolete,
            SyncError::RemoteUnavailable(_) => ErrorKind::RemoteUnavailable,
            SyncError::Runtime(core_runtime::Error::Config(_)) => ErrorKind::InvalidInput,
            SyncError::Library(_)
            | SyncError::Runtime(_)
            | SyncError::InvalidStateTransition { .. }
            | SyncError::TaskFailed(_) => ErrorKind::Internal,
        }
    }

    /// True when the scheduler may reschedule without a back-off penalty.
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::Obsolete
    }
}

impl From<BridgeError> for SyncError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Cancelled(reason) => SyncError::Obsolete(reason),
            other => SyncError::RemoteUnavailable(other.to_string()),
        }
    }
}

/// Why a run failed. A repeated page token is not a failure; it is reported
/// through `JobReport::loop_detected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    Obsolete,
    RemoteUnavailable,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Obsolete => "obsolete",
            ErrorKind::RemoteUnavailable => "remote_unavailable",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
