use chrono::{DateTime, Utc};
use intersection_runtime::RuntimeError;
use intersection_types::{CircleId, ContextError, ErrorKind, SigningError, TokenId};
use thiserror::Error;

/// Errors from the invitation protocol.
///
/// Each missing token field is its own variant so clients can say exactly
/// what to fix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InviteError {
    #[error("invite token is missing its token id")]
    MissingTokenId,

    #[error("invite token is missing its issuer")]
    MissingIssuer,

    #[error("invite token is missing its expiry")]
    MissingExpiry,

    #[error("invite token is missing its signature")]
    MissingSignature,

    #[error("invite token is missing its signature key id")]
    MissingKeyId,

    #[error("invite token is missing its signature algorithm")]
    MissingAlgorithm,

    #[error("invite acceptor has an empty circle id")]
    MissingAcceptor,

    #[error("invalid validity period: {0}")]
    InvalidValidity(String),

    #[error("invite token {token_id} expired at {expired_at}")]
    TokenExpired {
        token_id: TokenId,
        expired_at: DateTime<Utc>,
    },

    #[error("invite token {0} has an invalid signature")]
    InvalidSignature(TokenId),

    #[error("circle {acceptor} is not authorized to accept invite token {token_id}")]
    UnauthorizedAcceptor {
        token_id: TokenId,
        acceptor: CircleId,
    },

    #[error("circle {0} cannot accept its own invite token")]
    SelfAcceptance(CircleId),

    #[error("signing failed: {0}")]
    Signing(SigningError),

    #[error("token encoding failed: {0}")]
    Encoding(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Context(#[from] ContextError),
}

impl InviteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InviteError::MissingTokenId
            | InviteError::MissingIssuer
            | InviteError::MissingExpiry
            | InviteError::MissingSignature
            | InviteError::MissingKeyId
            | InviteError::MissingAlgorithm
            | InviteError::MissingAcceptor
            | InviteError::InvalidValidity(_) => ErrorKind::Validation,
            InviteError::TokenExpired { .. }
            | InviteError::InvalidSignature(_)
            | InviteError::Signing(_) => ErrorKind::Cryptographic,
            InviteError::UnauthorizedAcceptor { .. } | InviteError::SelfAcceptance(_) => {
                ErrorKind::Authorization
            }
            InviteError::Encoding(_) => ErrorKind::Internal,
            InviteError::Runtime(e) => e.kind(),
            InviteError::Context(_) => ErrorKind::Cancelled,
        }
    }

    /// Short machine-readable reason used in audit metadata
    pub fn reason(&self) -> &'static str {
        match self {
            InviteError::MissingTokenId => "missing_token_id",
            InviteError::MissingIssuer => "missing_issuer",
            InviteError::MissingExpiry => "missing_expiry",
            InviteError::MissingSignature => "missing_signature",
            InviteError::MissingKeyId => "missing_key_id",
            InviteError::MissingAlgorithm => "missing_algorithm",
            InviteError::MissingAcceptor => "missing_acceptor",
            InviteError::InvalidValidity(_) => "invalid_validity",
            InviteError::TokenExpired { .. } => "token_expired",
            InviteError::InvalidSignature(_) => "invalid_signature",
            InviteError::UnauthorizedAcceptor { .. } => "unauthorized_acceptor",
            InviteError::SelfAcceptance(_) => "self_acceptance",
            InviteError::Signing(_) => "signing_failed",
            InviteError::Encoding(_) => "encoding_failed",
            InviteError::Runtime(_) => "runtime",
            InviteError::Context(_) => "cancelled",
        }
    }
}

/// Result type alias for invitation operations
pub type InviteResult<T> = Result<T, InviteError>;
