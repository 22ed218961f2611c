//! Invite tokens: signed, time-bounded artifacts that bootstrap an intersection

use crate::{Ceiling, CircleId, Governance, Scope, TokenId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Contract terms proposed by an invitation
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InviteTemplate {
    pub scopes: Vec<Scope>,
    #[serde(default)]
    pub ceilings: Vec<Ceiling>,
    #[serde(default)]
    pub governance: Governance,
}

impl InviteTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scopes.push(scope);
        self
    }

    pub fn with_ceiling(mut self, ceiling: Ceiling) -> Self {
        self.ceilings.push(ceiling);
        self
    }

    pub fn with_governance(mut self, governance: Governance) -> Self {
        self.governance = governance;
        self
    }
}

/// A signed invitation.
///
/// Immutable once signed: the signature covers every other field, so any
/// change after issuance invalidates it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InviteToken {
    pub token_id: TokenId,
    pub issuer_circle_id: CircleId,
    /// `None` (or empty) means an open invite acceptable by any circle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_circle_id: Option<CircleId>,
    pub proposed_name: String,
    pub template: InviteTemplate,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub signature_key_id: String,
    pub signature_algorithm: String,
    #[serde(default)]
    pub signature: Vec<u8>,
}

impl InviteToken {
    /// Whether `circle_id` is allowed to accept this token
    pub fn can_be_accepted_by(&self, circle_id: &CircleId) -> bool {
        match &self.target_circle_id {
            None => true,
            Some(target) => target.is_empty() || target == circle_id,
        }
    }

    pub fn is_open(&self) -> bool {
        self.target_circle_id
            .as_ref()
            .map(|t| t.is_empty())
            .unwrap_or(true)
    }

    /// A token with no expiry is never considered expired here; structural
    /// validation rejects it before expiry is checked.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }
}
