//! Audit entries, the event taxonomy and the audit sink boundary
//!
//! The core emits entries fire-and-forget: a failing sink never blocks or
//! fails the operation that produced the entry.

use crate::{CircleId, IntersectionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Every event type the core emits
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "invite.token.issued")]
    InviteTokenIssued,
    #[serde(rename = "invite.token.accepted")]
    InviteTokenAccepted,
    #[serde(rename = "invite.token.invalid")]
    InviteTokenInvalid,
    #[serde(rename = "invite.token.rejected")]
    InviteTokenRejected,
    #[serde(rename = "intersection.created")]
    IntersectionCreated,
    #[serde(rename = "intersection.amended")]
    IntersectionAmended,
    #[serde(rename = "proposal.submitted")]
    ProposalSubmitted,
    #[serde(rename = "proposal.rejected")]
    ProposalRejected,
    #[serde(rename = "proposal.counterproposal")]
    ProposalCounterproposal,
    #[serde(rename = "proposal.accepted")]
    ProposalAccepted,
    #[serde(rename = "negotiation.finalized")]
    NegotiationFinalized,
    #[serde(rename = "commitment.formed")]
    CommitmentFormed,
    #[serde(rename = "trust.updated")]
    TrustUpdated,
}

impl EventType {
    pub const ALL: [EventType; 13] = [
        EventType::InviteTokenIssued,
        EventType::InviteTokenAccepted,
        EventType::InviteTokenInvalid,
        EventType::InviteTokenRejected,
        EventType::IntersectionCreated,
        EventType::IntersectionAmended,
        EventType::ProposalSubmitted,
        EventType::ProposalRejected,
        EventType::ProposalCounterproposal,
        EventType::ProposalAccepted,
        EventType::NegotiationFinalized,
        EventType::CommitmentFormed,
        EventType::TrustUpdated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::InviteTokenIssued => "invite.token.issued",
            EventType::InviteTokenAccepted => "invite.token.accepted",
            EventType::InviteTokenInvalid => "invite.token.invalid",
            EventType::InviteTokenRejected => "invite.token.rejected",
            EventType::IntersectionCreated => "intersection.created",
            EventType::IntersectionAmended => "intersection.amended",
            EventType::ProposalSubmitted => "proposal.submitted",
            EventType::ProposalRejected => "proposal.rejected",
            EventType::ProposalCounterproposal => "proposal.counterproposal",
            EventType::ProposalAccepted => "proposal.accepted",
            EventType::NegotiationFinalized => "negotiation.finalized",
            EventType::CommitmentFormed => "commitment.formed",
            EventType::TrustUpdated => "trust.updated",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome recorded on an audit entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    Unauthorized,
}

/// A single audit record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circle_id: Option<CircleId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intersection_id: Option<IntersectionId>,
    pub event_type: EventType,
    /// ID of the entity the event is about (token, proposal, commitment...)
    pub subject_id: String,
    pub action: String,
    pub outcome: AuditOutcome,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        event_type: EventType,
        subject_id: impl Into<String>,
        action: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            circle_id: None,
            intersection_id: None,
            event_type,
            subject_id: subject_id.into(),
            action: action.into(),
            outcome,
            metadata: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn success(
        event_type: EventType,
        subject_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self::new(event_type, subject_id, action, AuditOutcome::Success)
    }

    pub fn with_circle(mut self, circle_id: &CircleId) -> Self {
        self.circle_id = Some(circle_id.clone());
        self
    }

    pub fn with_intersection(mut self, intersection_id: &IntersectionId) -> Self {
        self.intersection_id = Some(intersection_id.clone());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }
}

/// Failure reported by an audit sink
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("Lock error")]
    LockPoisoned,
}

/// Destination for audit entries
pub trait AuditSink: Send + Sync {
    fn log(&self, entry: AuditEntry) -> Result<(), AuditError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_names_match_taxonomy() {
        for event in EventType::ALL {
            let json = serde_json::to_string(&event).unwrap();
            assert_eq!(json, format!("\"{}\"", event.as_str()));
        }
    }

    #[test]
    fn builder_sets_context() {
        let entry = AuditEntry::success(EventType::ProposalSubmitted, "p-1", "submit")
            .with_circle(&CircleId::new("a"))
            .with_intersection(&IntersectionId::new("i"))
            .with_metadata("scope_additions", 2);
        assert_eq!(entry.circle_id, Some(CircleId::new("a")));
        assert_eq!(entry.metadata.get("scope_additions").unwrap(), "2");
        assert_eq!(entry.outcome, AuditOutcome::Success);
    }
}
