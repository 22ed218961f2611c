use intersection_types::SIGNING_KEY_PREFIX;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Invitation protocol configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvitationConfig {
    /// Validity applied when an invite is issued with a zero duration
    pub default_validity_secs: u64,

    /// Create an unknown acceptor circle (in the issuer's tenant) instead of
    /// failing with not-found
    pub provision_missing_acceptor: bool,

    /// Issuer key IDs are `<prefix><circleID>`
    pub signing_key_prefix: String,
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self {
            default_validity_secs: 24 * 60 * 60,
            provision_missing_acceptor: false,
            signing_key_prefix: SIGNING_KEY_PREFIX.to_string(),
        }
    }
}

impl InvitationConfig {
    pub fn default_validity(&self) -> Duration {
        Duration::from_secs(self.default_validity_secs)
    }
}
