//! Errors returned by provider operations.

use thiserror::Error;

use crate::client::{ApiError, Cause, TransportError};
use crate::config::ConfigError;

/// Errors that can occur while serving a provider request.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested object was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// User input failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),

    /// The provider is not configured or its configuration is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource or data source type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// State or configuration could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication or authorization failed.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Rate limit exceeded.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The API could not be reached.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// A request timed out.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Operation not supported for this type.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// The Twingate API rejected the operation.
    #[error("{0}")]
    Api(String),
}

impl ProviderError {
    /// The error message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::Internal(msg)
            | Self::Configuration(msg)
            | Self::UnknownResource(msg)
            | Self::PermissionDenied(msg)
            | Self::ResourceExhausted(msg)
            | Self::Unavailable(msg)
            | Self::DeadlineExceeded(msg)
            | Self::Unimplemented(msg)
            | Self::Api(msg) => msg,
            Self::Serialization(_err) => "serialization error (see Debug output)",
        }
    }

    /// Whether the error means the remote object no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<ApiError> for ProviderError {
    fn from(err: ApiError) -> Self {
        let msg = err.to_string();
        if err.is_not_found() {
            return Self::NotFound(msg);
        }
        if err.is_invalid_input() {
            return Self::Validation(msg);
        }

        match &err.cause {
            Cause::Transport(transport) => match transport {
                TransportError::ApiTokenNotSet => Self::Configuration(msg),
                TransportError::Http { status: 401 | 403, .. } => Self::PermissionDenied(msg),
                TransportError::Http { status: 429, .. } => Self::ResourceExhausted(msg),
                TransportError::Http { .. } => Self::Api(msg),
                TransportError::Timeout { .. } => Self::DeadlineExceeded(msg),
                TransportError::Certificate { .. }
                | TransportError::Request(_)
                | TransportError::Client(_) => Self::Unavailable(msg),
            },
            _ => Self::Api(msg),
        }
    }
}

impl From<ConfigError> for ProviderError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(msg) => tonic::Status::not_found(msg),
            ProviderError::Validation(msg) => tonic::Status::invalid_argument(msg),
            ProviderError::Configuration(msg) => tonic::Status::failed_precondition(msg),
            ProviderError::UnknownResource(msg) => tonic::Status::not_found(msg),
            ProviderError::Internal(msg) => tonic::Status::internal(msg),
            ProviderError::Serialization(err) => {
                tonic::Status::invalid_argument(format!("Serialization error: {}", err))
            },
            ProviderError::PermissionDenied(msg) => tonic::Status::permission_denied(msg),
            ProviderError::ResourceExhausted(msg) => tonic::Status::resource_exhausted(msg),
            ProviderError::Unavailable(msg) => tonic::Status::unavailable(msg),
            ProviderError::DeadlineExceeded(msg) => tonic::Status::deadline_exceeded(msg),
            ProviderError::Unimplemented(msg) => tonic::Status::unimplemented(msg),
            ProviderError::Api(msg) => tonic::Status::unknown(msg),
        }
    }
}
