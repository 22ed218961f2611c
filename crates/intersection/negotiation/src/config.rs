use intersection_types::TrustLevel;
use serde::{Deserialize, Serialize};

/// Negotiation engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Submitters (and counter-proposers) below this trust level within the
    /// intersection are refused. `None` disables the gate.
    pub min_submitter_trust: Option<TrustLevel>,

    /// Refuse proposals with an empty reason
    pub require_reason: bool,
}
