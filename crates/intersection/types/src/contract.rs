//! Contract model: intersections, parties, scopes, ceilings and governance
//!
//! An intersection holds only a pointer to its current contract version.
//! The contract history itself is append-only and owned by the entity
//! runtime; a prior version is never mutated once written.

use crate::{CircleId, ContractVersion, IntersectionId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A contract boundary connecting two or more circles
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Intersection {
    pub id: IntersectionId,
    pub tenant_id: TenantId,
    pub state: IntersectionState,
    /// Version of the latest contract in the history
    pub version: ContractVersion,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Intersection {
    pub fn is_active(&self) -> bool {
        self.state == IntersectionState::Active
    }
}

/// Lifecycle state of an intersection. `Dissolved` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntersectionState {
    #[default]
    Active,
    Dissolved,
}

impl std::fmt::Display for IntersectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntersectionState::Active => f.write_str("active"),
            IntersectionState::Dissolved => f.write_str("dissolved"),
        }
    }
}

/// Lightweight handle returned when an invitation forms an intersection
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntersectionRef {
    pub intersection_id: IntersectionId,
    pub version: ContractVersion,
    pub created_at: DateTime<Utc>,
}

/// Role of a party within a contract
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyType {
    Initiator,
    Acceptor,
}

/// A circle bound by a contract
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub circle_id: CircleId,
    pub party_type: PartyType,
    pub joined_at: DateTime<Utc>,
    #[serde(default)]
    pub granted_scopes: Vec<String>,
}

impl Party {
    pub fn new(circle_id: CircleId, party_type: PartyType) -> Self {
        Self {
            circle_id,
            party_type,
            joined_at: Utc::now(),
            granted_scopes: Vec::new(),
        }
    }

    pub fn with_granted_scopes(mut self, scopes: Vec<String>) -> Self {
        self.granted_scopes = scopes;
        self
    }
}

/// A named capability grant, e.g. `calendar:read`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// `true` when the scope permits writes as well as reads
    pub read_write: bool,
}

impl Scope {
    pub fn read(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            read_write: false,
        }
    }

    pub fn read_write(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            read_write: true,
        }
    }
}

/// A quantitative limit on a grant (time window, duration, geography...)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ceiling {
    #[serde(rename = "type")]
    pub ceiling_type: String,
    pub value: String,
    #[serde(default)]
    pub unit: String,
}

impl Ceiling {
    pub fn new(
        ceiling_type: impl Into<String>,
        value: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            ceiling_type: ceiling_type.into(),
            value: value.into(),
            unit: unit.into(),
        }
    }
}

/// Governance rules carried by a contract
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Governance {
    pub amendment_requires: String,
    pub dissolution_policy: String,
}

impl Governance {
    pub const ALL_PARTIES: &'static str = "all_parties";
    pub const ANY_PARTY: &'static str = "any_party";
}

impl Default for Governance {
    fn default() -> Self {
        Self {
            amendment_requires: Self::ALL_PARTIES.to_string(),
            dissolution_policy: Self::ANY_PARTY.to_string(),
        }
    }
}

/// The negotiable content of a contract, without version bookkeeping
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractTerms {
    pub tenant_id: TenantId,
    pub parties: Vec<Party>,
    pub scopes: Vec<Scope>,
    #[serde(default)]
    pub ceilings: Vec<Ceiling>,
    #[serde(default)]
    pub governance: Governance,
}

impl ContractTerms {
    pub fn party_ids(&self) -> Vec<CircleId> {
        self.parties.iter().map(|p| p.circle_id.clone()).collect()
    }
}

/// One immutable version of an intersection's agreement
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub intersection_id: IntersectionId,
    pub version: ContractVersion,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<ContractVersion>,
    pub parties: Vec<Party>,
    pub scopes: Vec<Scope>,
    pub ceilings: Vec<Ceiling>,
    pub governance: Governance,
    pub created_at: DateTime<Utc>,
}

impl Contract {
    pub fn party_ids(&self) -> Vec<CircleId> {
        self.parties.iter().map(|p| p.circle_id.clone()).collect()
    }

    pub fn is_party(&self, circle_id: &CircleId) -> bool {
        self.parties.iter().any(|p| &p.circle_id == circle_id)
    }

    pub fn has_scope(&self, name: &str) -> bool {
        self.scopes.iter().any(|s| s.name == name)
    }

    /// Extract the negotiable terms of this version
    pub fn terms(&self, tenant_id: TenantId) -> ContractTerms {
        ContractTerms {
            tenant_id,
            parties: self.parties.clone(),
            scopes: self.scopes.clone(),
            ceilings: self.ceilings.clone(),
            governance: self.governance.clone(),
        }
    }

    /// Terms resulting from applying an amendment to this version.
    ///
    /// A scope addition replaces a scope with the same name; a ceiling change
    /// replaces a ceiling of the same type. Anything else is appended.
    pub fn amended_terms(
        &self,
        tenant_id: TenantId,
        scope_additions: &[Scope],
        ceiling_changes: &[Ceiling],
    ) -> ContractTerms {
        let mut terms = self.terms(tenant_id);

        for addition in scope_additions {
            match terms.scopes.iter_mut().find(|s| s.name == addition.name) {
                Some(existing) => *existing = addition.clone(),
                None => terms.scopes.push(addition.clone()),
            }
        }

        for change in ceiling_changes {
            match terms
                .ceilings
                .iter_mut()
                .find(|c| c.ceiling_type == change.ceiling_type)
            {
                Some(existing) => *existing = change.clone(),
                None => terms.ceilings.push(change.clone()),
            }
        }

        terms
    }
}
