//! Circle types: sovereign actors, their policies and authority grants

use crate::{Ceiling, CircleId, GrantId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A sovereign actor (person or agent)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Circle {
    pub id: CircleId,
    pub tenant_id: TenantId,
    pub state: CircleState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Circle {
    pub fn new(tenant_id: TenantId) -> Self {
        let now = Utc::now();
        Self {
            id: CircleId::generate(),
            tenant_id,
            state: CircleState::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == CircleState::Active
    }
}

/// Lifecycle state of a circle.
///
/// `Terminated` is absorbing; only `Active` and `Suspended` move back and forth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CircleState {
    #[default]
    Active,
    Suspended,
    Terminated,
}

impl CircleState {
    /// Whether a transition from `self` to `next` is permitted
    pub fn can_transition_to(&self, next: CircleState) -> bool {
        matches!(
            (self, next),
            (CircleState::Active, CircleState::Suspended)
                | (CircleState::Suspended, CircleState::Active)
                | (CircleState::Active, CircleState::Terminated)
                | (CircleState::Suspended, CircleState::Terminated)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CircleState::Active => "active",
            CircleState::Suspended => "suspended",
            CircleState::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for CircleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The current policy of a circle. Replaced wholesale on every update.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Policy {
    pub circle_id: CircleId,
    /// Monotonic, starts at 1
    pub version: u64,
    /// Hard limits the circle will not negotiate past
    #[serde(default)]
    pub boundaries: BTreeMap<String, String>,
    /// Soft preferences
    #[serde(default)]
    pub preferences: BTreeMap<String, String>,
    pub updated_at: DateTime<Utc>,
}

impl Policy {
    /// The empty policy a circle is created with
    pub fn initial(circle_id: CircleId) -> Self {
        Self {
            circle_id,
            version: 1,
            boundaries: BTreeMap::new(),
            preferences: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Replacement content for a circle's policy
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PolicyUpdate {
    #[serde(default)]
    pub boundaries: BTreeMap<String, String>,
    #[serde(default)]
    pub preferences: BTreeMap<String, String>,
}

impl PolicyUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_boundary(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.boundaries.insert(key.into(), value.into());
        self
    }

    pub fn with_preference(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.preferences.insert(key.into(), value.into());
        self
    }
}

/// A capability delegation issued by a circle
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthorityGrant {
    pub grant_id: GrantId,
    /// The circle delegating its authority
    pub circle_id: CircleId,
    /// Who receives the delegated authority
    pub grantee: String,
    pub scopes: Vec<String>,
    #[serde(default)]
    pub ceilings: Vec<Ceiling>,
    pub granted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl AuthorityGrant {
    /// A grant is in force when it is neither revoked nor past its expiry
    pub fn is_in_force_at(&self, now: DateTime<Utc>) -> bool {
        if self.revoked_at.is_some() {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => expires_at > now,
            None => true,
        }
    }
}

/// Request to delegate authority
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GrantRequest {
    pub grantee: String,
    pub scopes: Vec<String>,
    #[serde(default)]
    pub ceilings: Vec<Ceiling>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl GrantRequest {
    pub fn new(grantee: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            grantee: grantee.into(),
            scopes,
            ceilings: Vec::new(),
            expires_at: None,
        }
    }

    pub fn with_ceiling(mut self, ceiling: Ceiling) -> Self {
        self.ceilings.push(ceiling);
        self
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}
