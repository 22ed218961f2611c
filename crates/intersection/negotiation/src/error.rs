use intersection_runtime::RuntimeError;
use intersection_trust::TrustError;
use intersection_types::{
    CircleId, CommitmentId, ContextError, ErrorKind, IntersectionId, ProposalId, ProposalState,
    TrustLevel,
};
use thiserror::Error;

/// Errors from the negotiation engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    #[error("Proposal not found: {0}")]
    ProposalNotFound(ProposalId),

    #[error("Commitment not found: {0}")]
    CommitmentNotFound(CommitmentId),

    #[error("Circle {circle_id} is not a party to intersection {intersection_id}")]
    NotAParty {
        circle_id: CircleId,
        intersection_id: IntersectionId,
    },

    #[error("Proposal {proposal_id} is not open (state: {state})")]
    ProposalNotOpen {
        proposal_id: ProposalId,
        state: ProposalState,
    },

    #[error("not all parties accepted proposal {proposal_id} ({} pending)", .missing.len())]
    ConsensusIncomplete {
        proposal_id: ProposalId,
        missing: Vec<CircleId>,
    },

    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    #[error("Circle {circle_id} has trust {level}, below required {required}")]
    InsufficientTrust {
        circle_id: CircleId,
        level: TrustLevel,
        required: TrustLevel,
    },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Trust(#[from] TrustError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("Lock error")]
    LockPoisoned,
}

impl NegotiationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NegotiationError::ProposalNotFound(_) | NegotiationError::CommitmentNotFound(_) => {
                ErrorKind::NotFound
            }
            NegotiationError::NotAParty { .. } | NegotiationError::InsufficientTrust { .. } => {
                ErrorKind::Authorization
            }
            NegotiationError::ProposalNotOpen { .. } => ErrorKind::InvalidState,
            NegotiationError::ConsensusIncomplete { .. } => ErrorKind::ConsensusIncomplete,
            NegotiationError::InvalidProposal(_) => ErrorKind::Validation,
            NegotiationError::Runtime(e) => e.kind(),
            NegotiationError::Trust(e) => e.kind(),
            NegotiationError::Context(_) => ErrorKind::Cancelled,
            NegotiationError::LockPoisoned => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Result type alias for negotiation operations
pub type NegotiationResult<T> = Result<T, NegotiationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consensus_incomplete_is_the_only_retryable_error() {
        let pending = NegotiationError::ConsensusIncomplete {
            proposal_id: ProposalId::new("p"),
            missing: vec![CircleId::new("b")],
        };
        assert!(pending.is_retryable());
        assert!(pending.to_string().starts_with("not all parties accepted"));

        let closed = NegotiationError::ProposalNotOpen {
            proposal_id: ProposalId::new("p"),
            state: ProposalState::Finalized,
        };
        assert!(!closed.is_retryable());
        assert_eq!(closed.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn runtime_errors_keep_their_kind() {
        let e: NegotiationError =
            RuntimeError::IntersectionNotFound(IntersectionId::new("x")).into();
        assert_eq!(e.kind(), ErrorKind::NotFound);
    }
}
