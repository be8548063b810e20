use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// The caller's cancellation token fired while the call was in flight.
    #[error("Bridge operation cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BridgeError::Cancelled(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
