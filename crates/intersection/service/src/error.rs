use intersection_invite::InviteError;
use intersection_negotiation::NegotiationError;
use intersection_runtime::RuntimeError;
use intersection_trust::TrustError;
use intersection_types::ErrorKind;
use thiserror::Error;

/// Errors surfaced by the service facade
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Invite(#[from] InviteError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Trust(#[from] TrustError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tracing setup failed: {0}")]
    Tracing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Runtime(e) => e.kind(),
            ServiceError::Invite(e) => e.kind(),
            ServiceError::Negotiation(e) => e.kind(),
            ServiceError::Trust(e) => e.kind(),
            ServiceError::Config(_) => ErrorKind::Validation,
            ServiceError::Tracing(_) | ServiceError::Io(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
