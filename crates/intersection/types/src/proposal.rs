//! Proposal threads, commitment records and finalize outcomes

use crate::{Ceiling, CircleId, CommitmentId, ContractVersion, IntersectionId, ProposalId, Scope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What finalizing a proposal produces
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalType {
    /// Mutates the contract into a new version
    Amendment,
    /// Emits an unexecuted commitment record
    Commitment,
}

impl std::fmt::Display for ProposalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProposalType::Amendment => f.write_str("amendment"),
            ProposalType::Commitment => f.write_str("commitment"),
        }
    }
}

/// Lifecycle state of a proposal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProposalState {
    #[default]
    Open,
    Accepted,
    Rejected,
    /// Superseded by a counter-proposal; frozen
    Countered,
    Finalized,
}

impl ProposalState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalState::Rejected | ProposalState::Countered | ProposalState::Finalized
        )
    }
}

impl std::fmt::Display for ProposalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProposalState::Open => "open",
            ProposalState::Accepted => "accepted",
            ProposalState::Rejected => "rejected",
            ProposalState::Countered => "countered",
            ProposalState::Finalized => "finalized",
        };
        f.write_str(s)
    }
}

/// Description of an action a commitment hands off for execution elsewhere
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub required_scopes: Vec<String>,
}

impl ActionSpec {
    pub fn new(action_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            description: description.into(),
            parameters: BTreeMap::new(),
            required_scopes: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn requiring_scope(mut self, scope: impl Into<String>) -> Self {
        self.required_scopes.push(scope.into());
        self
    }
}

/// Proposed content, shared by root submissions and counter-proposals
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProposalDraft {
    pub proposal_type: ProposalType,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub scope_additions: Vec<Scope>,
    #[serde(default)]
    pub ceiling_changes: Vec<Ceiling>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_spec: Option<ActionSpec>,
}

impl ProposalDraft {
    pub fn amendment(reason: impl Into<String>) -> Self {
        Self {
            proposal_type: ProposalType::Amendment,
            reason: reason.into(),
            scope_additions: Vec::new(),
            ceiling_changes: Vec::new(),
            action_spec: None,
        }
    }

    pub fn commitment(reason: impl Into<String>, action_spec: ActionSpec) -> Self {
        Self {
            proposal_type: ProposalType::Commitment,
            reason: reason.into(),
            scope_additions: Vec::new(),
            ceiling_changes: Vec::new(),
            action_spec: Some(action_spec),
        }
    }

    pub fn adding_scope(mut self, scope: Scope) -> Self {
        self.scope_additions.push(scope);
        self
    }

    pub fn changing_ceiling(mut self, ceiling: Ceiling) -> Self {
        self.ceiling_changes.push(ceiling);
        self
    }
}

/// A negotiable change request against an intersection's contract
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposalThread {
    pub id: ProposalId,
    pub intersection_id: IntersectionId,
    /// `None` for a root proposal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ProposalId>,
    pub issuer_circle_id: CircleId,
    pub proposal_type: ProposalType,
    pub state: ProposalState,
    pub reason: String,
    pub scope_additions: Vec<Scope>,
    pub ceiling_changes: Vec<Ceiling>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_spec: Option<ActionSpec>,
    pub approvals: BTreeMap<CircleId, bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProposalThread {
    /// Build an open proposal. The issuer approves its own proposal.
    pub fn new(
        intersection_id: IntersectionId,
        parent_id: Option<ProposalId>,
        issuer_circle_id: CircleId,
        draft: ProposalDraft,
    ) -> Self {
        let now = Utc::now();
        let mut approvals = BTreeMap::new();
        approvals.insert(issuer_circle_id.clone(), true);

        Self {
            id: ProposalId::generate(),
            intersection_id,
            parent_id,
            issuer_circle_id,
            proposal_type: draft.proposal_type,
            state: ProposalState::Open,
            reason: draft.reason,
            scope_additions: draft.scope_additions,
            ceiling_changes: draft.ceiling_changes,
            action_spec: draft.action_spec,
            approvals,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == ProposalState::Open
    }

    pub fn has_approved(&self, circle_id: &CircleId) -> bool {
        self.approvals.get(circle_id).copied().unwrap_or(false)
    }

    /// Parties from `parties` that have not approved yet
    pub fn missing_approvals(&self, parties: &[CircleId]) -> Vec<CircleId> {
        parties
            .iter()
            .filter(|p| !self.has_approved(p))
            .cloned()
            .collect()
    }

    /// Circles that have approved, in stable order
    pub fn approvers(&self) -> BTreeSet<CircleId> {
        self.approvals
            .iter()
            .filter(|(_, approved)| **approved)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// Outcome of finalizing a commitment proposal.
///
/// This is a handoff artifact for an external execution boundary and is
/// never invoked by the core.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommitmentRecord {
    pub commitment_id: CommitmentId,
    pub intersection_id: IntersectionId,
    pub proposal_id: ProposalId,
    pub action_spec: ActionSpec,
    /// Contract version the commitment was formed under
    pub contract_version: ContractVersion,
    pub parties: Vec<CircleId>,
    pub not_executed: bool,
    pub formed_at: DateTime<Utc>,
}

impl CommitmentRecord {
    pub fn new(
        intersection_id: IntersectionId,
        proposal_id: ProposalId,
        action_spec: ActionSpec,
        contract_version: ContractVersion,
        parties: Vec<CircleId>,
    ) -> Self {
        Self {
            commitment_id: CommitmentId::generate(),
            intersection_id,
            proposal_id,
            action_spec,
            contract_version,
            parties,
            not_executed: true,
            formed_at: Utc::now(),
        }
    }
}

/// What a successful finalize produced
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "result_type", rename_all = "snake_case")]
pub enum FinalizeResult {
    Amendment {
        new_version: ContractVersion,
    },
    Commitment {
        commitment_id: CommitmentId,
        record: CommitmentRecord,
    },
}

impl FinalizeResult {
    pub fn result_type(&self) -> &'static str {
        match self {
            FinalizeResult::Amendment { .. } => "amendment",
            FinalizeResult::Commitment { .. } => "commitment",
        }
    }
}
