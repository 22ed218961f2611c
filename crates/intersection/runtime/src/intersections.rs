//! Intersection store - contract boundaries and their append-only history
//!
//! The store is the single authority for contract versions. Creation seeds
//! `1.0.0`; each amendment appends the latest version's minor bump. A written
//! contract version is never modified.

use crate::{RuntimeError, RuntimeResult};
use chrono::Utc;
use intersection_types::{
    CircleId, Contract, ContractTerms, ContractVersion, Intersection, IntersectionId,
    IntersectionState, OperationContext, Party, TenantId,
};
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

#[derive(Default)]
struct IntersectionTables {
    intersections: HashMap<IntersectionId, Intersection>,
    history: HashMap<IntersectionId, Vec<Contract>>,
}

/// Store of intersections and their contract histories
pub struct IntersectionStore {
    tables: RwLock<IntersectionTables>,
}

impl IntersectionStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(IntersectionTables::default()),
        }
    }

    /// Create an intersection whose history starts with contract `1.0.0`
    pub fn create(
        &self,
        ctx: &OperationContext,
        terms: ContractTerms,
    ) -> RuntimeResult<Intersection> {
        ctx.check()?;
        validate_terms(&terms)?;

        let now = Utc::now();
        let intersection = Intersection {
            id: IntersectionId::generate(),
            tenant_id: terms.tenant_id.clone(),
            state: IntersectionState::Active,
            version: ContractVersion::INITIAL,
            created_at: now,
            updated_at: now,
        };

        let contract = Contract {
            intersection_id: intersection.id.clone(),
            version: ContractVersion::INITIAL,
            previous_version: None,
            parties: terms.parties,
            scopes: terms.scopes,
            ceilings: terms.ceilings,
            governance: terms.governance,
            created_at: now,
        };

        let mut tables = self.write()?;
        tables
            .history
            .insert(intersection.id.clone(), vec![contract]);
        tables
            .intersections
            .insert(intersection.id.clone(), intersection.clone());

        info!(
            intersection_id = %intersection.id,
            tenant_id = %intersection.tenant_id,
            version = %intersection.version,
            "Intersection created"
        );
        Ok(intersection)
    }

    pub fn get(&self, intersection_id: &IntersectionId) -> RuntimeResult<Intersection> {
        let tables = self.read()?;
        tables
            .intersections
            .get(intersection_id)
            .cloned()
            .ok_or_else(|| RuntimeError::IntersectionNotFound(intersection_id.clone()))
    }

    /// All intersections, optionally restricted to one tenant, oldest first
    pub fn list(&self, tenant_id: Option<&TenantId>) -> RuntimeResult<Vec<Intersection>> {
        let tables = self.read()?;
        let mut intersections: Vec<Intersection> = tables
            .intersections
            .values()
            .filter(|i| tenant_id.map(|t| &i.tenant_id == t).unwrap_or(true))
            .cloned()
            .collect();
        intersections.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(intersections)
    }

    /// Append a new contract version built from `terms`.
    ///
    /// The new version is computed under the write lock from the latest
    /// entry, so concurrent amendments serialize and each sees the version
    /// written by the one before it.
    pub fn amend(
        &self,
        ctx: &OperationContext,
        intersection_id: &IntersectionId,
        terms: ContractTerms,
    ) -> RuntimeResult<Intersection> {
        ctx.check()?;
        validate_terms(&terms)?;

        let mut tables = self.write()?;
        let tables = &mut *tables;

        let intersection = tables
            .intersections
            .get_mut(intersection_id)
            .ok_or_else(|| RuntimeError::IntersectionNotFound(intersection_id.clone()))?;

        if intersection.state != IntersectionState::Active {
            warn!(
                intersection_id = %intersection_id,
                state = %intersection.state,
                "Amend rejected"
            );
            return Err(RuntimeError::IntersectionNotActive {
                intersection_id: intersection_id.clone(),
                state: intersection.state,
            });
        }

        let history = tables
            .history
            .get_mut(intersection_id)
            .ok_or_else(|| RuntimeError::IntersectionNotFound(intersection_id.clone()))?;
        let previous = history
            .last()
            .map(|c| c.version)
            .unwrap_or(ContractVersion::INITIAL);
        let version = previous.bump_minor();
        let now = Utc::now();

        history.push(Contract {
            intersection_id: intersection_id.clone(),
            version,
            previous_version: Some(previous),
            parties: terms.parties,
            scopes: terms.scopes,
            ceilings: terms.ceilings,
            governance: terms.governance,
            created_at: now,
        });

        intersection.version = version;
        intersection.updated_at = now;

        info!(
            intersection_id = %intersection_id,
            previous_version = %previous,
            version = %version,
            "Intersection amended"
        );
        Ok(intersection.clone())
    }

    /// Dissolve an active intersection. One-way.
    pub fn dissolve(
        &self,
        ctx: &OperationContext,
        intersection_id: &IntersectionId,
    ) -> RuntimeResult<Intersection> {
        ctx.check()?;

        let mut tables = self.write()?;
        let intersection = tables
            .intersections
            .get_mut(intersection_id)
            .ok_or_else(|| RuntimeError::IntersectionNotFound(intersection_id.clone()))?;

        if intersection.state == IntersectionState::Dissolved {
            return Err(RuntimeError::IntersectionNotActive {
                intersection_id: intersection_id.clone(),
                state: intersection.state,
            });
        }

        intersection.state = IntersectionState::Dissolved;
        intersection.updated_at = Utc::now();

        info!(intersection_id = %intersection_id, "Intersection dissolved");
        Ok(intersection.clone())
    }

    /// Latest contract version
    pub fn get_contract(&self, intersection_id: &IntersectionId) -> RuntimeResult<Contract> {
        let tables = self.read()?;
        tables
            .history
            .get(intersection_id)
            .and_then(|h| h.last())
            .cloned()
            .ok_or_else(|| RuntimeError::IntersectionNotFound(intersection_id.clone()))
    }

    /// Full history, oldest first
    pub fn get_contract_history(
        &self,
        intersection_id: &IntersectionId,
    ) -> RuntimeResult<Vec<Contract>> {
        let tables = self.read()?;
        let history = tables
            .history
            .get(intersection_id)
            .cloned()
            .ok_or_else(|| RuntimeError::IntersectionNotFound(intersection_id.clone()))?;

        debug!(
            intersection_id = %intersection_id,
            versions = history.len(),
            "Read contract history"
        );
        Ok(history)
    }

    pub fn get_contract_version(
        &self,
        intersection_id: &IntersectionId,
        version: ContractVersion,
    ) -> RuntimeResult<Contract> {
        let tables = self.read()?;
        let history = tables
            .history
            .get(intersection_id)
            .ok_or_else(|| RuntimeError::IntersectionNotFound(intersection_id.clone()))?;

        history
            .iter()
            .find(|c| c.version == version)
            .cloned()
            .ok_or_else(|| RuntimeError::ContractVersionNotFound {
                intersection_id: intersection_id.clone(),
                version,
            })
    }

    /// Parties of the latest contract
    pub fn list_parties(&self, intersection_id: &IntersectionId) -> RuntimeResult<Vec<Party>> {
        Ok(self.get_contract(intersection_id)?.parties)
    }

    pub fn is_party(
        &self,
        intersection_id: &IntersectionId,
        circle_id: &CircleId,
    ) -> RuntimeResult<bool> {
        let tables = self.read()?;
        let contract = tables
            .history
            .get(intersection_id)
            .and_then(|h| h.last())
            .ok_or_else(|| RuntimeError::IntersectionNotFound(intersection_id.clone()))?;
        Ok(contract.is_party(circle_id))
    }

    fn read(&self) -> RuntimeResult<RwLockReadGuard<'_, IntersectionTables>> {
        self.tables.read().map_err(|_| RuntimeError::LockPoisoned)
    }

    fn write(&self) -> RuntimeResult<RwLockWriteGuard<'_, IntersectionTables>> {
        self.tables.write().map_err(|_| RuntimeError::LockPoisoned)
    }
}

impl Default for IntersectionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// At least two distinct parties and unique scope names
fn validate_terms(terms: &ContractTerms) -> RuntimeResult<()> {
    if terms.parties.len() < 2 {
        return Err(RuntimeError::InvalidContract(format!(
            "an intersection needs at least two parties, got {}",
            terms.parties.len()
        )));
    }

    let mut seen = HashSet::new();
    for party in &terms.parties {
        if party.circle_id.is_empty() {
            return Err(RuntimeError::InvalidContract("party with empty circle id".into()));
        }
        if !seen.insert(&party.circle_id) {
            return Err(RuntimeError::InvalidContract(format!(
                "duplicate party: {}",
                party.circle_id
            )));
        }
    }

    let mut scope_names = HashSet::new();
    for scope in &terms.scopes {
        if !scope_names.insert(scope.name.as_str()) {
            return Err(RuntimeError::InvalidContract(format!(
                "duplicate scope: {}",
                scope.name
            )));
        }
    }

    Ok(())
}
