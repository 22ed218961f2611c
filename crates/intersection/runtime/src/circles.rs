//! Circle store - lifecycle, policy and authority grants for sovereign actors
//!
//! Every mutation takes the write half of a single lock over all circle
//! tables, so a reader never observes a half-applied change. Every accessor
//! returns an owned snapshot.

use crate::{RuntimeError, RuntimeResult};
use chrono::Utc;
use intersection_types::{
    AuthorityGrant, Circle, CircleId, CircleState, GrantId, GrantRequest, OperationContext,
    Policy, PolicyUpdate, TenantId,
};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

#[derive(Default)]
struct CircleTables {
    circles: HashMap<CircleId, Circle>,
    policies: HashMap<CircleId, Policy>,
    grants: HashMap<CircleId, Vec<AuthorityGrant>>,
}

/// Store of circles and everything a circle owns
pub struct CircleStore {
    tables: RwLock<CircleTables>,
}

impl CircleStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(CircleTables::default()),
        }
    }

    /// Create an active circle with an empty version-1 policy
    pub fn create(&self, ctx: &OperationContext, tenant_id: TenantId) -> RuntimeResult<Circle> {
        ctx.check()?;

        let circle = Circle::new(tenant_id);
        let mut tables = self.write()?;
        tables
            .policies
            .insert(circle.id.clone(), Policy::initial(circle.id.clone()));
        tables.circles.insert(circle.id.clone(), circle.clone());

        info!(circle_id = %circle.id, tenant_id = %circle.tenant_id, "Circle created");
        Ok(circle)
    }

    /// Return the circle with `circle_id`, creating it active if it does not exist
    pub fn provision(
        &self,
        ctx: &OperationContext,
        circle_id: &CircleId,
        tenant_id: TenantId,
    ) -> RuntimeResult<Circle> {
        ctx.check()?;

        let mut tables = self.write()?;
        if let Some(existing) = tables.circles.get(circle_id) {
            return Ok(existing.clone());
        }

        let mut circle = Circle::new(tenant_id);
        circle.id = circle_id.clone();
        tables
            .policies
            .insert(circle.id.clone(), Policy::initial(circle.id.clone()));
        tables.circles.insert(circle.id.clone(), circle.clone());

        info!(circle_id = %circle.id, tenant_id = %circle.tenant_id, "Circle provisioned");
        Ok(circle)
    }

    pub fn get(&self, circle_id: &CircleId) -> RuntimeResult<Circle> {
        let tables = self.read()?;
        tables
            .circles
            .get(circle_id)
            .cloned()
            .ok_or_else(|| RuntimeError::CircleNotFound(circle_id.clone()))
    }

    /// All circles, optionally restricted to one tenant, oldest first
    pub fn list(&self, tenant_id: Option<&TenantId>) -> RuntimeResult<Vec<Circle>> {
        let tables = self.read()?;
        let mut circles: Vec<Circle> = tables
            .circles
            .values()
            .filter(|c| tenant_id.map(|t| &c.tenant_id == t).unwrap_or(true))
            .cloned()
            .collect();
        circles.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(circles)
    }

    /// Fails unless the circle exists and is active
    pub fn require_active(&self, circle_id: &CircleId) -> RuntimeResult<Circle> {
        let tables = self.read()?;
        active_in(&tables, circle_id).cloned()
    }

    /// Run `f` while every circle in `circle_ids` is held active.
    ///
    /// The circle tables stay read-locked until `f` returns, so none of the
    /// listed circles can change state in between.
    pub fn with_active<'a, T>(
        &self,
        circle_ids: impl IntoIterator<Item = &'a CircleId>,
        f: impl FnOnce() -> RuntimeResult<T>,
    ) -> RuntimeResult<T> {
        let tables = self.read()?;
        for circle_id in circle_ids {
            active_in(&tables, circle_id)?;
        }
        f()
    }

    pub fn suspend(&self, ctx: &OperationContext, circle_id: &CircleId) -> RuntimeResult<Circle> {
        self.transition(ctx, circle_id, CircleState::Suspended)
    }

    pub fn resume(&self, ctx: &OperationContext, circle_id: &CircleId) -> RuntimeResult<Circle> {
        self.transition(ctx, circle_id, CircleState::Active)
    }

    pub fn terminate(&self, ctx: &OperationContext, circle_id: &CircleId) -> RuntimeResult<Circle> {
        self.transition(ctx, circle_id, CircleState::Terminated)
    }

    fn transition(
        &self,
        ctx: &OperationContext,
        circle_id: &CircleId,
        to: CircleState,
    ) -> RuntimeResult<Circle> {
        ctx.check()?;

        let mut tables = self.write()?;
        let circle = tables
            .circles
            .get_mut(circle_id)
            .ok_or_else(|| RuntimeError::CircleNotFound(circle_id.clone()))?;

        if !circle.state.can_transition_to(to) {
            warn!(
                circle_id = %circle_id,
                from = %circle.state,
                to = %to,
                "Circle transition rejected"
            );
            return Err(RuntimeError::InvalidCircleTransition {
                circle_id: circle_id.clone(),
                from: circle.state,
                to,
            });
        }

        let from = circle.state;
        circle.state = to;
        circle.updated_at = Utc::now();

        info!(circle_id = %circle_id, from = %from, to = %to, "Circle state changed");
        Ok(circle.clone())
    }

    pub fn get_policy(&self, circle_id: &CircleId) -> RuntimeResult<Policy> {
        let tables = self.read()?;
        tables
            .policies
            .get(circle_id)
            .cloned()
            .ok_or_else(|| RuntimeError::CircleNotFound(circle_id.clone()))
    }

    /// Replace the circle's policy wholesale under the next version number
    pub fn update_policy(
        &self,
        ctx: &OperationContext,
        circle_id: &CircleId,
        update: PolicyUpdate,
    ) -> RuntimeResult<Policy> {
        ctx.check()?;

        let mut tables = self.write()?;
        let state = tables
            .circles
            .get(circle_id)
            .map(|c| c.state)
            .ok_or_else(|| RuntimeError::CircleNotFound(circle_id.clone()))?;
        if state == CircleState::Terminated {
            return Err(RuntimeError::CircleNotActive {
                circle_id: circle_id.clone(),
                state,
            });
        }

        let previous_version = tables
            .policies
            .get(circle_id)
            .map(|p| p.version)
            .unwrap_or(0);

        let policy = Policy {
            circle_id: circle_id.clone(),
            version: previous_version + 1,
            boundaries: update.boundaries,
            preferences: update.preferences,
            updated_at: Utc::now(),
        };
        tables.policies.insert(circle_id.clone(), policy.clone());

        info!(circle_id = %circle_id, version = policy.version, "Policy updated");
        Ok(policy)
    }

    /// Delegate part of a circle's authority
    pub fn grant_authority(
        &self,
        ctx: &OperationContext,
        circle_id: &CircleId,
        request: GrantRequest,
    ) -> RuntimeResult<AuthorityGrant> {
        ctx.check()?;

        let mut tables = self.write()?;
        let state = tables
            .circles
            .get(circle_id)
            .map(|c| c.state)
            .ok_or_else(|| RuntimeError::CircleNotFound(circle_id.clone()))?;
        if state == CircleState::Terminated {
            return Err(RuntimeError::CircleNotActive {
                circle_id: circle_id.clone(),
                state,
            });
        }

        let grant = AuthorityGrant {
            grant_id: GrantId::generate(),
            circle_id: circle_id.clone(),
            grantee: request.grantee,
            scopes: request.scopes,
            ceilings: request.ceilings,
            granted_at: Utc::now(),
            expires_at: request.expires_at,
            revoked_at: None,
        };
        tables
            .grants
            .entry(circle_id.clone())
            .or_default()
            .push(grant.clone());

        info!(
            circle_id = %circle_id,
            grant_id = %grant.grant_id,
            grantee = %grant.grantee,
            scopes = grant.scopes.len(),
            "Authority granted"
        );
        Ok(grant)
    }

    /// Stamp a grant as revoked. The record is kept.
    pub fn revoke_authority(
        &self,
        ctx: &OperationContext,
        circle_id: &CircleId,
        grant_id: &GrantId,
    ) -> RuntimeResult<AuthorityGrant> {
        ctx.check()?;

        let mut tables = self.write()?;
        if !tables.circles.contains_key(circle_id) {
            return Err(RuntimeError::CircleNotFound(circle_id.clone()));
        }

        let grant = tables
            .grants
            .get_mut(circle_id)
            .and_then(|grants| grants.iter_mut().find(|g| &g.grant_id == grant_id))
            .ok_or_else(|| RuntimeError::GrantNotFound(grant_id.clone()))?;

        if grant.revoked_at.is_some() {
            return Err(RuntimeError::GrantAlreadyRevoked(grant_id.clone()));
        }
        grant.revoked_at = Some(Utc::now());

        info!(circle_id = %circle_id, grant_id = %grant_id, "Authority revoked");
        Ok(grant.clone())
    }

    /// Grants currently in force: revoked and expired grants are excluded
    pub fn list_grants(&self, circle_id: &CircleId) -> RuntimeResult<Vec<AuthorityGrant>> {
        let tables = self.read()?;
        if !tables.circles.contains_key(circle_id) {
            return Err(RuntimeError::CircleNotFound(circle_id.clone()));
        }

        let now = Utc::now();
        let grants: Vec<AuthorityGrant> = tables
            .grants
            .get(circle_id)
            .map(|grants| {
                grants
                    .iter()
                    .filter(|g| g.is_in_force_at(now))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        debug!(circle_id = %circle_id, count = grants.len(), "Listed grants");
        Ok(grants)
    }

    fn read(&self) -> RuntimeResult<RwLockReadGuard<'_, CircleTables>> {
        self.tables.read().map_err(|_| RuntimeError::LockPoisoned)
    }

    fn write(&self) -> RuntimeResult<RwLockWriteGuard<'_, CircleTables>> {
        self.tables.write().map_err(|_| RuntimeError::LockPoisoned)
    }
}

impl Default for CircleStore {
    fn default() -> Self {
        Self::new()
    }
}

fn active_in<'t>(tables: &'t CircleTables, circle_id: &CircleId) -> RuntimeResult<&'t Circle> {
    let circle = tables
        .circles
        .get(circle_id)
        .ok_or_else(|| RuntimeError::CircleNotFound(circle_id.clone()))?;
    if !circle.is_active() {
        return Err(RuntimeError::CircleNotActive {
            circle_id: circle.id.clone(),
            state: circle.state,
        });
    }
    Ok(circle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use intersection_types::ContextError;

    fn ctx() -> OperationContext {
        OperationContext::background()
    }

    fn store_with_circle() -> (CircleStore, Circle) {
        let store = CircleStore::new();
        let circle = store.create(&ctx(), TenantId::new("tenant")).unwrap();
        (store, circle)
    }

    #[test]
    fn create_and_get() {
        let (store, circle) = store_with_circle();
        let fetched = store.get(&circle.id).unwrap();
        assert_eq!(fetched.state, CircleState::Active);
        assert_eq!(store.get_policy(&circle.id).unwrap().version, 1);
    }

    #[test]
    fn with_active_holds_off_state_changes() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let store = Arc::new(CircleStore::new());
        let circle = store.create(&ctx(), TenantId::new("tenant")).unwrap();
        let terminated = Arc::new(AtomicBool::new(false));

        let mut handle = None;
        let seen_inside = store
            .with_active([&circle.id], || {
                let store = store.clone();
                let id = circle.id.clone();
                let terminated_flag = terminated.clone();
                handle = Some(std::thread::spawn(move || {
                    store.terminate(&ctx(), &id).unwrap();
                    terminated_flag.store(true, Ordering::SeqCst);
                }));
                std::thread::sleep(std::time::Duration::from_millis(50));
                Ok(terminated.load(Ordering::SeqCst))
            })
            .unwrap();
        handle.unwrap().join().unwrap();

        assert!(!seen_inside);
        assert_eq!(store.get(&circle.id).unwrap().state, CircleState::Terminated);
        assert!(matches!(
            store.with_active([&circle.id], || Ok(())),
            Err(RuntimeError::CircleNotActive { .. })
        ));
    }

    #[test]
    fn unknown_circle_is_not_found() {
        let store = CircleStore::new();
        let missing = CircleId::new("nope");
        assert_eq!(
            store.get(&missing).unwrap_err(),
            RuntimeError::CircleNotFound(missing.clone())
        );
        assert!(store.suspend(&ctx(), &missing).unwrap_err().is_not_found());
    }

    #[test]
    fn suspend_resume_terminate() {
        let (store, circle) = store_with_circle();
        assert_eq!(
            store.suspend(&ctx(), &circle.id).unwrap().state,
            CircleState::Suspended
        );
        assert_eq!(
            store.resume(&ctx(), &circle.id).unwrap().state,
            CircleState::Active
        );
        assert_eq!(
            store.terminate(&ctx(), &circle.id).unwrap().state,
            CircleState::Terminated
        );

        let err = store.suspend(&ctx(), &circle.id).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::InvalidCircleTransition {
                from: CircleState::Terminated,
                to: CircleState::Suspended,
                ..
            }
        ));
        assert!(store.resume(&ctx(), &circle.id).is_err());
    }

    #[test]
    fn suspending_twice_is_rejected() {
        let (store, circle) = store_with_circle();
        store.suspend(&ctx(), &circle.id).unwrap();
        assert!(store.suspend(&ctx(), &circle.id).is_err());
        assert!(matches!(
            store.require_active(&circle.id),
            Err(RuntimeError::CircleNotActive { .. })
        ));
    }

    #[test]
    fn policy_updates_increment_version() {
        let (store, circle) = store_with_circle();
        let p2 = store
            .update_policy(
                &ctx(),
                &circle.id,
                PolicyUpdate::new().with_boundary("quiet_hours", "22:00-07:00"),
            )
            .unwrap();
        assert_eq!(p2.version, 2);

        // wholesale replacement: the boundary is gone in v3
        let p3 = store
            .update_policy(
                &ctx(),
                &circle.id,
                PolicyUpdate::new().with_preference("tone", "brief"),
            )
            .unwrap();
        assert_eq!(p3.version, 3);
        assert!(p3.boundaries.is_empty());
        assert_eq!(store.get_policy(&circle.id).unwrap().version, 3);
    }

    #[test]
    fn list_grants_excludes_revoked_and_expired() {
        let (store, circle) = store_with_circle();
        let live = store
            .grant_authority(
                &ctx(),
                &circle.id,
                GrantRequest::new("assistant", vec!["calendar:read".into()]),
            )
            .unwrap();
        let revoked = store
            .grant_authority(
                &ctx(),
                &circle.id,
                GrantRequest::new("assistant", vec!["calendar:write".into()]),
            )
            .unwrap();
        store
            .grant_authority(
                &ctx(),
                &circle.id,
                GrantRequest::new("assistant", vec!["finance:read".into()])
                    .expiring_at(Utc::now() - Duration::seconds(1)),
            )
            .unwrap();

        store
            .revoke_authority(&ctx(), &circle.id, &revoked.grant_id)
            .unwrap();

        let grants = store.list_grants(&circle.id).unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].grant_id, live.grant_id);

        assert_eq!(
            store
                .revoke_authority(&ctx(), &circle.id, &revoked.grant_id)
                .unwrap_err(),
            RuntimeError::GrantAlreadyRevoked(revoked.grant_id.clone())
        );
        assert!(store
            .revoke_authority(&ctx(), &circle.id, &GrantId::new("missing"))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn terminated_circle_cannot_grant_or_update_policy() {
        let (store, circle) = store_with_circle();
        store.terminate(&ctx(), &circle.id).unwrap();
        assert!(store
            .grant_authority(&ctx(), &circle.id, GrantRequest::new("x", vec![]))
            .is_err());
        assert!(store
            .update_policy(&ctx(), &circle.id, PolicyUpdate::new())
            .is_err());
    }

    #[test]
    fn cancelled_context_stops_before_work() {
        let store = CircleStore::new();
        let ctx = OperationContext::background();
        ctx.cancel();
        assert_eq!(
            store.create(&ctx, TenantId::new("t")).unwrap_err(),
            RuntimeError::Context(ContextError::Cancelled)
        );
        assert!(store.list(None).unwrap().is_empty());
    }

    #[test]
    fn provision_is_idempotent() {
        let store = CircleStore::new();
        let id = CircleId::new("bob");
        let first = store.provision(&ctx(), &id, TenantId::new("t")).unwrap();
        store.suspend(&ctx(), &id).unwrap();
        let second = store.provision(&ctx(), &id, TenantId::new("other")).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.state, CircleState::Suspended);
        assert_eq!(second.tenant_id, TenantId::new("t"));
    }

    #[test]
    fn list_filters_by_tenant() {
        let store = CircleStore::new();
        store.create(&ctx(), TenantId::new("a")).unwrap();
        store.create(&ctx(), TenantId::new("a")).unwrap();
        store.create(&ctx(), TenantId::new("b")).unwrap();
        assert_eq!(store.list(Some(&TenantId::new("a"))).unwrap().len(), 2);
        assert_eq!(store.list(None).unwrap().len(), 3);
    }
}
