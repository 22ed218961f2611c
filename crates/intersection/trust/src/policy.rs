use intersection_types::{TrustEvent, TrustLevel};
use serde::{Deserialize, Serialize};

/// Score deltas and level thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustPolicy {
    pub acceptance_delta: i64,
    pub rejection_delta: i64,
    pub settlement_delta: i64,
    /// Scores at or above this are `High`
    pub high_threshold: i64,
    /// Scores at or above this (and below `high_threshold`) are `Medium`
    pub medium_threshold: i64,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            acceptance_delta: 1,
            rejection_delta: -1,
            settlement_delta: 2,
            high_threshold: 3,
            medium_threshold: 0,
        }
    }
}

impl TrustPolicy {
    pub fn delta(&self, event: TrustEvent) -> i64 {
        match event {
            TrustEvent::Acceptance => self.acceptance_delta,
            TrustEvent::Rejection => self.rejection_delta,
            TrustEvent::Settlement => self.settlement_delta,
        }
    }

    pub fn level_for(&self, score: i64) -> TrustLevel {
        if score >= self.high_threshold {
            TrustLevel::High
        } else if score >= self.medium_threshold {
            TrustLevel::Medium
        } else {
            TrustLevel::Low
        }
    }
}
