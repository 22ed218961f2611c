//! Trust records derived from negotiation outcomes

use crate::{CircleId, IntersectionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse reputation bucket. Ordered from least to most trusted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    Unknown,
    Low,
    Medium,
    High,
}

impl std::fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrustLevel::Unknown => "unknown",
            TrustLevel::Low => "low",
            TrustLevel::Medium => "medium",
            TrustLevel::High => "high",
        };
        f.write_str(s)
    }
}

/// Negotiation outcome that moves a trust score
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustEvent {
    Acceptance,
    Rejection,
    Settlement,
}

/// Trust a circle has earned within one intersection
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustRecord {
    pub circle_id: CircleId,
    pub intersection_id: IntersectionId,
    pub level: TrustLevel,
    pub score: i64,
    pub acceptances: u64,
    pub rejections: u64,
    pub settlements: u64,
    pub last_updated: DateTime<Utc>,
}

impl TrustRecord {
    /// Record for a pair the ledger has never seen
    pub fn neutral(circle_id: CircleId, intersection_id: IntersectionId) -> Self {
        Self {
            circle_id,
            intersection_id,
            level: TrustLevel::Medium,
            score: 0,
            acceptances: 0,
            rejections: 0,
            settlements: 0,
            last_updated: Utc::now(),
        }
    }
}

/// An immutable record of a trust level transition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustUpdate {
    pub circle_id: CircleId,
    pub intersection_id: IntersectionId,
    pub previous_level: TrustLevel,
    pub new_level: TrustLevel,
    pub score: i64,
    pub cause: TrustEvent,
    pub timestamp: DateTime<Utc>,
}
