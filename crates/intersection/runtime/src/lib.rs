//! Entity Runtime - lifecycle management for circles and intersections
//!
//! Two stores, each guarded by one reader/writer lock over its tables:
//!
//! - [`CircleStore`]: circles, their policies and authority grants
//! - [`IntersectionStore`]: intersections and their append-only contract history
//!
//! Failures are returned synchronously and never retried here. Unknown IDs
//! are not-found errors; illegal transitions are invalid-state errors.

#![deny(unsafe_code)]

mod circles;
mod error;
mod intersections;

pub use circles::CircleStore;
pub use error::{RuntimeError, RuntimeResult};
pub use intersections::IntersectionStore;

use intersection_types::{CircleId, ContractTerms, Intersection, OperationContext};
use tracing::warn;

/// Owns both entity stores
pub struct EntityRuntime {
    circles: CircleStore,
    intersections: IntersectionStore,
}

impl EntityRuntime {
    pub fn new() -> Self {
        Self {
            circles: CircleStore::new(),
            intersections: IntersectionStore::new(),
        }
    }

    pub fn circles(&self) -> &CircleStore {
        &self.circles
    }

    pub fn intersections(&self) -> &IntersectionStore {
        &self.intersections
    }

    /// Create an intersection after checking every party is a known, active circle
    pub fn create_intersection(
        &self,
        ctx: &OperationContext,
        terms: ContractTerms,
    ) -> RuntimeResult<Intersection> {
        ctx.check()?;

        // Party states stay fixed until the intersection is stored
        let party_ids: Vec<CircleId> = terms
            .parties
            .iter()
            .map(|p| p.circle_id.clone())
            .collect();
        self.circles
            .with_active(&party_ids, || self.intersections.create(ctx, terms))
            .inspect_err(|e| {
                if matches!(
                    e,
                    RuntimeError::CircleNotFound(_) | RuntimeError::CircleNotActive { .. }
                ) {
                    warn!(error = %e, "Party cannot join intersection");
                }
            })
    }
}

impl Default for EntityRuntime {
    fn default() -> Self {
        Self::new()
    }
}
