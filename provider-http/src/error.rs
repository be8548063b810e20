//! Error types for the HTTP media provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// HTTP media provider errors
#[derive(Error, Debug)]
pub enum ProviderHttpError {
    /// The provider answered with a non-success status
    #[error("Provider API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Rate limit still exceeded after all retries
    #[error("Rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// The query cannot be expressed against this provider
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for HTTP media provider operations
pub type Result<T> = std::result::Result<T, ProviderHttpError>;

impl From<ProviderHttpError> for BridgeError {
    fn from(error: ProviderHttpError) -> Self {
        match error {
            ProviderHttpError::BridgeError(e) => e,
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ProviderHttpError::ApiError {
            status_code: 404,
            message: "unknown media set".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Provider API error (status 404): unknown media set"
        );
    }

    #[test]
    fn test_error_conversion() {
        let error = ProviderHttpError::ParseError("missing items".to_string());
        let bridge_error: BridgeError = error.into();

        assert!(matches!(bridge_error, BridgeError::OperationFailed(_)));
    }

    #[test]
    fn test_cancellation_survives_conversion() {
        let error = ProviderHttpError::from(BridgeError::Cancelled("search".to_string()));
        let bridge_error: BridgeError = error.into();

        assert!(bridge_error.is_cancelled());
    }
}
