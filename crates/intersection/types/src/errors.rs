//! Error classification shared by every crate in the lifecycle

use serde::{Deserialize, Serialize};

/// Coarse category of a failure, used by callers to decide what to do next.
///
/// Only `ConsensusIncomplete` is recoverable by retrying the same call later;
/// everything else needs the caller to change something first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    Validation,
    Authorization,
    Cryptographic,
    ConsensusIncomplete,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::ConsensusIncomplete)
    }
}
