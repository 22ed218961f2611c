use intersection_types::{
    CircleId, CircleState, ContextError, ContractVersion, ErrorKind, GrantId, IntersectionId,
    IntersectionState,
};
use thiserror::Error;

/// Errors from the entity runtime
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("Circle not found: {0}")]
    CircleNotFound(CircleId),

    #[error("Intersection not found: {0}")]
    IntersectionNotFound(IntersectionId),

    #[error("Authority grant not found: {0}")]
    GrantNotFound(GrantId),

    #[error("Contract version {version} not found for intersection {intersection_id}")]
    ContractVersionNotFound {
        intersection_id: IntersectionId,
        version: ContractVersion,
    },

    #[error("Invalid circle transition for {circle_id}: {from} -> {to}")]
    InvalidCircleTransition {
        circle_id: CircleId,
        from: CircleState,
        to: CircleState,
    },

    #[error("Circle {circle_id} is not active (state: {state})")]
    CircleNotActive {
        circle_id: CircleId,
        state: CircleState,
    },

    #[error("Intersection {intersection_id} is not active (state: {state})")]
    IntersectionNotActive {
        intersection_id: IntersectionId,
        state: IntersectionState,
    },

    #[error("Authority grant already revoked: {0}")]
    GrantAlreadyRevoked(GrantId),

    #[error("Invalid contract: {0}")]
    InvalidContract(String),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("Lock error")]
    LockPoisoned,
}

impl RuntimeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::CircleNotFound(_)
            | RuntimeError::IntersectionNotFound(_)
            | RuntimeError::GrantNotFound(_)
            | RuntimeError::ContractVersionNotFound { .. } => ErrorKind::NotFound,
            RuntimeError::InvalidCircleTransition { .. }
            | RuntimeError::CircleNotActive { .. }
            | RuntimeError::IntersectionNotActive { .. }
            | RuntimeError::GrantAlreadyRevoked(_) => ErrorKind::InvalidState,
            RuntimeError::InvalidContract(_) => ErrorKind::Validation,
            RuntimeError::Context(_) => ErrorKind::Cancelled,
            RuntimeError::LockPoisoned => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Result type alias for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;
