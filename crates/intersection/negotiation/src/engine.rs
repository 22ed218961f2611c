//! The negotiation engine: one lock over every proposal and commitment
//!
//! Lock order is engine tables, then the entity runtime. Trust updates and
//! audit emission happen after the engine lock is released.

use crate::{NegotiationConfig, NegotiationError, NegotiationResult};
use chrono::Utc;
use intersection_audit::emit;
use intersection_runtime::{EntityRuntime, RuntimeError};
use intersection_trust::TrustLedger;
use intersection_types::{
    ActionSpec, AuditEntry, AuditSink, CircleId, CommitmentId, CommitmentRecord, Contract,
    EventType, FinalizeResult, IntersectionId, OperationContext, ProposalDraft, ProposalId,
    ProposalState, ProposalThread, ProposalType, TrustEvent,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Result of recording an approval
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// Approval recorded, these parties have not approved yet
    Pending { outstanding: Vec<CircleId> },
    /// Every current party has approved; the proposal can be finalized
    FullyApproved,
}

#[derive(Default)]
struct NegotiationTables {
    proposals: HashMap<ProposalId, ProposalThread>,
    commitments: HashMap<CommitmentId, CommitmentRecord>,
    /// Intersections that saw a rejection since their last finalize
    friction: HashSet<IntersectionId>,
}

/// Drives proposals from submission to finalize
pub struct NegotiationEngine {
    config: NegotiationConfig,
    runtime: Arc<EntityRuntime>,
    trust: Arc<TrustLedger>,
    audit: Arc<dyn AuditSink>,
    tables: RwLock<NegotiationTables>,
}

impl NegotiationEngine {
    pub fn new(
        config: NegotiationConfig,
        runtime: Arc<EntityRuntime>,
        trust: Arc<TrustLedger>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config,
            runtime,
            trust,
            audit,
            tables: RwLock::new(NegotiationTables::default()),
        }
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    /// Open a root proposal against an active intersection
    pub fn submit_proposal(
        &self,
        ctx: &OperationContext,
        intersection_id: &IntersectionId,
        issuer: &CircleId,
        draft: ProposalDraft,
    ) -> NegotiationResult<ProposalThread> {
        ctx.check()?;

        let contract = self.party_contract(intersection_id, issuer)?;
        self.validate_draft(&draft, &contract)?;
        self.check_trust_gate(issuer, intersection_id)?;

        let proposal = ProposalThread::new(intersection_id.clone(), None, issuer.clone(), draft);
        self.write()?
            .proposals
            .insert(proposal.id.clone(), proposal.clone());

        info!(
            proposal_id = %proposal.id,
            intersection_id = %intersection_id,
            issuer = %issuer,
            proposal_type = %proposal.proposal_type,
            "Proposal submitted"
        );

        emit(
            self.audit.as_ref(),
            AuditEntry::success(EventType::ProposalSubmitted, proposal.id.to_string(), "submit")
                .with_circle(issuer)
                .with_intersection(intersection_id)
                .with_metadata("proposal_type", proposal.proposal_type)
                .with_metadata("scope_additions", proposal.scope_additions.len())
                .with_metadata("ceiling_changes", proposal.ceiling_changes.len()),
        );

        Ok(proposal)
    }

    /// Record `by`'s approval of a proposal
    pub fn accept(
        &self,
        ctx: &OperationContext,
        proposal_id: &ProposalId,
        by: &CircleId,
    ) -> NegotiationResult<AcceptOutcome> {
        ctx.check()?;

        let (proposal, outcome, friction) = {
            let mut guard = self.write()?;
            let tables = &mut *guard;

            let intersection_id = Self::proposal_ref(tables, proposal_id)?
                .intersection_id
                .clone();
            let contract = self.party_contract(&intersection_id, by)?;
            let friction = tables.friction.contains(&intersection_id);

            let proposal = tables
                .proposals
                .get_mut(proposal_id)
                .ok_or_else(|| NegotiationError::ProposalNotFound(proposal_id.clone()))?;
            ensure_negotiable(proposal)?;

            proposal.approvals.insert(by.clone(), true);
            proposal.updated_at = Utc::now();

            let outstanding = proposal.missing_approvals(&contract.party_ids());
            let outcome = if outstanding.is_empty() {
                proposal.state = ProposalState::Accepted;
                AcceptOutcome::FullyApproved
            } else {
                AcceptOutcome::Pending { outstanding }
            };

            (proposal.clone(), outcome, friction)
        };

        info!(
            proposal_id = %proposal_id,
            by = %by,
            fully_approved = outcome == AcceptOutcome::FullyApproved,
            "Proposal accepted"
        );

        emit(
            self.audit.as_ref(),
            AuditEntry::success(EventType::ProposalAccepted, proposal_id.to_string(), "accept")
                .with_circle(by)
                .with_intersection(&proposal.intersection_id)
                .with_metadata("approvals", proposal.approvers().len())
                .with_metadata("fully_approved", outcome == AcceptOutcome::FullyApproved),
        );

        // An acceptance after a rejection on the same intersection is what
        // earns the issuer trust; a frictionless accept moves nothing.
        if friction && by != &proposal.issuer_circle_id {
            self.settle_trust(
                std::slice::from_ref(&proposal.issuer_circle_id),
                &proposal.intersection_id,
                TrustEvent::Acceptance,
            );
        }

        Ok(outcome)
    }

    /// Reject a proposal. Terminal for this proposal; the issuer loses trust.
    pub fn reject(
        &self,
        ctx: &OperationContext,
        proposal_id: &ProposalId,
        by: &CircleId,
        reason: impl Into<String>,
    ) -> NegotiationResult<ProposalThread> {
        ctx.check()?;
        let reason = reason.into();

        let proposal = {
            let mut guard = self.write()?;
            let tables = &mut *guard;

            let intersection_id = Self::proposal_ref(tables, proposal_id)?
                .intersection_id
                .clone();
            let contract = self.runtime.intersections().get_contract(&intersection_id)?;
            require_party(&contract, by)?;

            let proposal = tables
                .proposals
                .get_mut(proposal_id)
                .ok_or_else(|| NegotiationError::ProposalNotFound(proposal_id.clone()))?;
            ensure_negotiable(proposal)?;

            proposal.state = ProposalState::Rejected;
            proposal.updated_at = Utc::now();
            let proposal = proposal.clone();

            tables.friction.insert(intersection_id);
            proposal
        };

        info!(proposal_id = %proposal_id, by = %by, reason = %reason, "Proposal rejected");

        emit(
            self.audit.as_ref(),
            AuditEntry::success(EventType::ProposalRejected, proposal_id.to_string(), "reject")
                .with_circle(by)
                .with_intersection(&proposal.intersection_id)
                .with_metadata("issuer", &proposal.issuer_circle_id)
                .with_metadata("reason", &reason),
        );

        self.settle_trust(
            std::slice::from_ref(&proposal.issuer_circle_id),
            &proposal.intersection_id,
            TrustEvent::Rejection,
        );

        Ok(proposal)
    }

    /// Supersede an open proposal with a child proposed by `by`.
    ///
    /// The parent is frozen as `countered`; the child starts with only the
    /// counter-proposer's approval.
    pub fn counter_proposal(
        &self,
        ctx: &OperationContext,
        parent_id: &ProposalId,
        by: &CircleId,
        draft: ProposalDraft,
    ) -> NegotiationResult<ProposalThread> {
        ctx.check()?;

        let child = {
            let mut guard = self.write()?;
            let tables = &mut *guard;

            let intersection_id = Self::proposal_ref(tables, parent_id)?
                .intersection_id
                .clone();
            let contract = self.party_contract(&intersection_id, by)?;
            self.validate_draft(&draft, &contract)?;
            self.check_trust_gate(by, &intersection_id)?;

            let parent = tables
                .proposals
                .get_mut(parent_id)
                .ok_or_else(|| NegotiationError::ProposalNotFound(parent_id.clone()))?;
            ensure_negotiable(parent)?;
            parent.state = ProposalState::Countered;
            parent.updated_at = Utc::now();

            let child =
                ProposalThread::new(intersection_id, Some(parent_id.clone()), by.clone(), draft);
            tables.proposals.insert(child.id.clone(), child.clone());
            child
        };

        info!(
            parent_id = %parent_id,
            proposal_id = %child.id,
            by = %by,
            "Counter-proposal submitted"
        );

        emit(
            self.audit.as_ref(),
            AuditEntry::success(
                EventType::ProposalCounterproposal,
                child.id.to_string(),
                "counter",
            )
            .with_circle(by)
            .with_intersection(&child.intersection_id)
            .with_metadata("parent_id", parent_id)
            .with_metadata("proposal_type", child.proposal_type),
        );

        Ok(child)
    }

    /// Apply a fully approved proposal.
    ///
    /// Amendments append a new contract version; commitments form an
    /// unexecuted [`CommitmentRecord`]. A proposal finalizes at most once.
    pub fn finalize(
        &self,
        ctx: &OperationContext,
        proposal_id: &ProposalId,
    ) -> NegotiationResult<FinalizeResult> {
        ctx.check()?;

        let (proposal, contract, result) = {
            let mut guard = self.write()?;
            let tables = &mut *guard;

            let proposal = tables
                .proposals
                .get_mut(proposal_id)
                .ok_or_else(|| NegotiationError::ProposalNotFound(proposal_id.clone()))?;
            ensure_negotiable(proposal)?;

            let intersection = self.runtime.intersections().get(&proposal.intersection_id)?;
            if !intersection.is_active() {
                return Err(RuntimeError::IntersectionNotActive {
                    intersection_id: intersection.id,
                    state: intersection.state,
                }
                .into());
            }

            let contract = self
                .runtime
                .intersections()
                .get_contract(&proposal.intersection_id)?;
            let missing = proposal.missing_approvals(&contract.party_ids());
            if !missing.is_empty() {
                debug!(
                    proposal_id = %proposal_id,
                    pending = missing.len(),
                    "Finalize refused, consensus incomplete"
                );
                return Err(NegotiationError::ConsensusIncomplete {
                    proposal_id: proposal_id.clone(),
                    missing,
                });
            }

            let result = match proposal.proposal_type {
                ProposalType::Amendment => {
                    let terms = contract.amended_terms(
                        intersection.tenant_id,
                        &proposal.scope_additions,
                        &proposal.ceiling_changes,
                    );
                    let amended = self
                        .runtime
                        .intersections()
                        .amend(ctx, &proposal.intersection_id, terms)?;
                    FinalizeResult::Amendment {
                        new_version: amended.version,
                    }
                }
                ProposalType::Commitment => {
                    let action_spec = proposal.action_spec.clone().ok_or_else(|| {
                        NegotiationError::InvalidProposal(
                            "commitment proposal has no action spec".to_string(),
                        )
                    })?;
                    check_required_scopes(&action_spec, &contract)?;

                    let record = CommitmentRecord::new(
                        proposal.intersection_id.clone(),
                        proposal.id.clone(),
                        action_spec,
                        contract.version,
                        contract.party_ids(),
                    );
                    tables
                        .commitments
                        .insert(record.commitment_id.clone(), record.clone());
                    FinalizeResult::Commitment {
                        commitment_id: record.commitment_id.clone(),
                        record,
                    }
                }
            };

            proposal.state = ProposalState::Finalized;
            proposal.updated_at = Utc::now();
            let proposal = proposal.clone();
            tables.friction.remove(&proposal.intersection_id);

            (proposal, contract, result)
        };

        info!(
            proposal_id = %proposal_id,
            intersection_id = %proposal.intersection_id,
            result_type = result.result_type(),
            "Proposal finalized"
        );

        match &result {
            FinalizeResult::Amendment { new_version } => emit(
                self.audit.as_ref(),
                AuditEntry::success(
                    EventType::IntersectionAmended,
                    proposal.intersection_id.to_string(),
                    "amend",
                )
                .with_intersection(&proposal.intersection_id)
                .with_metadata("proposal_id", proposal_id)
                .with_metadata("previous_version", contract.version)
                .with_metadata("version", new_version),
            ),
            FinalizeResult::Commitment { record, .. } => emit(
                self.audit.as_ref(),
                AuditEntry::success(
                    EventType::CommitmentFormed,
                    record.commitment_id.to_string(),
                    "form_commitment",
                )
                .with_intersection(&proposal.intersection_id)
                .with_metadata("proposal_id", proposal_id)
                .with_metadata("action_type", &record.action_spec.action_type)
                .with_metadata("not_executed", record.not_executed),
            ),
        }

        emit(
            self.audit.as_ref(),
            AuditEntry::success(
                EventType::NegotiationFinalized,
                proposal_id.to_string(),
                "finalize",
            )
            .with_circle(&proposal.issuer_circle_id)
            .with_intersection(&proposal.intersection_id)
            .with_metadata("result_type", result.result_type()),
        );

        let event = match proposal.proposal_type {
            ProposalType::Amendment => TrustEvent::Acceptance,
            ProposalType::Commitment => TrustEvent::Settlement,
        };
        self.settle_trust(&contract.party_ids(), &proposal.intersection_id, event);

        Ok(result)
    }

    pub fn get_proposal(&self, proposal_id: &ProposalId) -> NegotiationResult<ProposalThread> {
        let tables = self.read()?;
        Self::proposal_ref(&tables, proposal_id).cloned()
    }

    /// Every proposal on an intersection, oldest first
    pub fn list_proposals(
        &self,
        intersection_id: &IntersectionId,
    ) -> NegotiationResult<Vec<ProposalThread>> {
        let tables = self.read()?;
        let mut proposals: Vec<ProposalThread> = tables
            .proposals
            .values()
            .filter(|p| &p.intersection_id == intersection_id)
            .cloned()
            .collect();
        proposals.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.0.cmp(&b.id.0)));
        Ok(proposals)
    }

    /// The chain of counter-proposals ending at `proposal_id`, root first
    pub fn proposal_lineage(
        &self,
        proposal_id: &ProposalId,
    ) -> NegotiationResult<Vec<ProposalThread>> {
        let tables = self.read()?;

        let mut lineage = Vec::new();
        let mut current = Some(proposal_id.clone());
        while let Some(id) = current {
            let proposal = Self::proposal_ref(&tables, &id)?;
            current = proposal.parent_id.clone();
            lineage.push(proposal.clone());
        }
        lineage.reverse();

        debug!(proposal_id = %proposal_id, depth = lineage.len(), "Read proposal lineage");
        Ok(lineage)
    }

    pub fn get_commitment(
        &self,
        commitment_id: &CommitmentId,
    ) -> NegotiationResult<CommitmentRecord> {
        let tables = self.read()?;
        tables
            .commitments
            .get(commitment_id)
            .cloned()
            .ok_or_else(|| NegotiationError::CommitmentNotFound(commitment_id.clone()))
    }

    /// Commitments formed on an intersection, oldest first
    pub fn list_commitments(
        &self,
        intersection_id: &IntersectionId,
    ) -> NegotiationResult<Vec<CommitmentRecord>> {
        let tables = self.read()?;
        let mut commitments: Vec<CommitmentRecord> = tables
            .commitments
            .values()
            .filter(|c| &c.intersection_id == intersection_id)
            .cloned()
            .collect();
        commitments.sort_by(|a, b| a.formed_at.cmp(&b.formed_at));
        Ok(commitments)
    }

    // --- Internal helpers ---

    fn read(&self) -> NegotiationResult<RwLockReadGuard<'_, NegotiationTables>> {
        self.tables.read().map_err(|_| NegotiationError::LockPoisoned)
    }

    fn write(&self) -> NegotiationResult<RwLockWriteGuard<'_, NegotiationTables>> {
        self.tables.write().map_err(|_| NegotiationError::LockPoisoned)
    }

    fn proposal_ref<'a>(
        tables: &'a NegotiationTables,
        proposal_id: &ProposalId,
    ) -> NegotiationResult<&'a ProposalThread> {
        tables
            .proposals
            .get(proposal_id)
            .ok_or_else(|| NegotiationError::ProposalNotFound(proposal_id.clone()))
    }

    /// Latest contract of an active intersection that `circle_id` belongs to
    fn party_contract(
        &self,
        intersection_id: &IntersectionId,
        circle_id: &CircleId,
    ) -> NegotiationResult<Contract> {
        let intersection = self.runtime.intersections().get(intersection_id)?;
        if !intersection.is_active() {
            warn!(
                intersection_id = %intersection_id,
                state = %intersection.state,
                "Negotiation on inactive intersection"
            );
            return Err(RuntimeError::IntersectionNotActive {
                intersection_id: intersection_id.clone(),
                state: intersection.state,
            }
            .into());
        }

        let contract = self.runtime.intersections().get_contract(intersection_id)?;
        require_party(&contract, circle_id)?;
        Ok(contract)
    }

    fn validate_draft(&self, draft: &ProposalDraft, contract: &Contract) -> NegotiationResult<()> {
        if self.config.require_reason && draft.reason.trim().is_empty() {
            return Err(NegotiationError::InvalidProposal(
                "a reason is required".to_string(),
            ));
        }

        match draft.proposal_type {
            ProposalType::Amendment => {
                if draft.scope_additions.is_empty() && draft.ceiling_changes.is_empty() {
                    return Err(NegotiationError::InvalidProposal(
                        "amendment changes nothing".to_string(),
                    ));
                }
            }
            ProposalType::Commitment => {
                let action_spec = draft.action_spec.as_ref().ok_or_else(|| {
                    NegotiationError::InvalidProposal(
                        "commitment requires an action spec".to_string(),
                    )
                })?;
                if action_spec.action_type.trim().is_empty() {
                    return Err(NegotiationError::InvalidProposal(
                        "action spec has no type".to_string(),
                    ));
                }
                check_required_scopes(action_spec, contract)?;
            }
        }

        Ok(())
    }

    /// Record trust for an outcome that has already committed.
    ///
    /// The caller's context was checked before the work began and is not
    /// consulted again; a ledger failure is logged, never returned.
    fn settle_trust(
        &self,
        circle_ids: &[CircleId],
        intersection_id: &IntersectionId,
        event: TrustEvent,
    ) {
        if let Err(e) = self.trust.record_all(circle_ids, intersection_id, event) {
            warn!(
                intersection_id = %intersection_id,
                event = ?event,
                error = %e,
                "Trust not recorded for committed outcome"
            );
        }
    }

    fn check_trust_gate(
        &self,
        circle_id: &CircleId,
        intersection_id: &IntersectionId,
    ) -> NegotiationResult<()> {
        let Some(required) = self.config.min_submitter_trust else {
            return Ok(());
        };

        let level = self.trust.level(circle_id, intersection_id)?;
        if level < required {
            warn!(
                circle_id = %circle_id,
                level = %level,
                required = %required,
                "Submitter below trust gate"
            );
            return Err(NegotiationError::InsufficientTrust {
                circle_id: circle_id.clone(),
                level,
                required,
            });
        }
        Ok(())
    }
}

fn ensure_negotiable(proposal: &ProposalThread) -> NegotiationResult<()> {
    if proposal.state.is_terminal() {
        return Err(NegotiationError::ProposalNotOpen {
            proposal_id: proposal.id.clone(),
            state: proposal.state,
        });
    }
    Ok(())
}

fn require_party(contract: &Contract, circle_id: &CircleId) -> NegotiationResult<()> {
    if !contract.is_party(circle_id) {
        return Err(NegotiationError::NotAParty {
            circle_id: circle_id.clone(),
            intersection_id: contract.intersection_id.clone(),
        });
    }
    Ok(())
}

fn check_required_scopes(action_spec: &ActionSpec, contract: &Contract) -> NegotiationResult<()> {
    match action_spec
        .required_scopes
        .iter()
        .find(|scope| !contract.has_scope(scope))
    {
        Some(scope) => Err(NegotiationError::InvalidProposal(format!(
            "action requires scope {} which the contract does not grant",
            scope
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intersection_audit::AuditJournal;
    use intersection_trust::TrustPolicy;
    use intersection_types::{
        Ceiling, ContractTerms, ContractVersion, ErrorKind, Governance, Party, PartyType, Scope,
        TenantId, TrustLevel,
    };

    struct Fixture {
        runtime: Arc<EntityRuntime>,
        trust: Arc<TrustLedger>,
        journal: Arc<AuditJournal>,
        engine: NegotiationEngine,
        a: CircleId,
        b: CircleId,
        int: IntersectionId,
    }

    fn ctx() -> OperationContext {
        OperationContext::background()
    }

    fn fixture_with(config: NegotiationConfig) -> Fixture {
        let runtime = Arc::new(EntityRuntime::new());
        let journal = Arc::new(AuditJournal::new());
        let trust = Arc::new(TrustLedger::new(TrustPolicy::default()));
        let a = runtime.circles().create(&ctx(), TenantId::new("t")).unwrap().id;
        let b = runtime.circles().create(&ctx(), TenantId::new("t")).unwrap().id;

        let int = runtime
            .create_intersection(
                &ctx(),
                ContractTerms {
                    tenant_id: TenantId::new("t"),
                    parties: vec![
                        Party::new(a.clone(), PartyType::Initiator),
                        Party::new(b.clone(), PartyType::Acceptor),
                    ],
                    scopes: vec![Scope::read("calendar:read", "")],
                    ceilings: vec![Ceiling::new("time_window", "17:00-21:00", "")],
                    governance: Governance::default(),
                },
            )
            .unwrap()
            .id;

        let engine =
            NegotiationEngine::new(config, runtime.clone(), trust.clone(), journal.clone());
        Fixture {
            runtime,
            trust,
            journal,
            engine,
            a,
            b,
            int,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(NegotiationConfig::default())
    }

    fn add_write() -> ProposalDraft {
        ProposalDraft::amendment("need write access")
            .adding_scope(Scope::read_write("calendar:write", ""))
    }

    #[test]
    fn submitter_must_be_a_party() {
        let f = fixture();
        let outsider = f.runtime.circles().create(&ctx(), TenantId::new("t")).unwrap().id;
        let err = f
            .engine
            .submit_proposal(&ctx(), &f.int, &outsider, add_write())
            .unwrap_err();
        assert!(matches!(err, NegotiationError::NotAParty { .. }));
    }

    #[test]
    fn issuer_approval_is_implicit() {
        let f = fixture();
        let p = f.engine.submit_proposal(&ctx(), &f.int, &f.a, add_write()).unwrap();
        assert!(p.has_approved(&f.a));
        assert!(!p.has_approved(&f.b));
        assert_eq!(p.state, ProposalState::Open);
    }

    #[test]
    fn finalize_waits_for_every_party() {
        let f = fixture();
        let p = f.engine.submit_proposal(&ctx(), &f.int, &f.a, add_write()).unwrap();

        let err = f.engine.finalize(&ctx(), &p.id).unwrap_err();
        match &err {
            NegotiationError::ConsensusIncomplete { missing, .. } => {
                assert_eq!(missing, &vec![f.b.clone()])
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_retryable());

        let outcome = f.engine.accept(&ctx(), &p.id, &f.b).unwrap();
        assert_eq!(outcome, AcceptOutcome::FullyApproved);
        assert_eq!(f.engine.get_proposal(&p.id).unwrap().state, ProposalState::Accepted);

        let result = f.engine.finalize(&ctx(), &p.id).unwrap();
        assert!(matches!(
            result,
            FinalizeResult::Amendment { new_version }
                if new_version == ContractVersion::new(1, 1, 0)
        ));

        let contract = f.runtime.intersections().get_contract(&f.int).unwrap();
        assert!(contract.has_scope("calendar:write"));
        assert_eq!(contract.previous_version, Some(ContractVersion::INITIAL));
    }

    #[test]
    fn second_finalize_never_double_applies() {
        let f = fixture();
        let p = f.engine.submit_proposal(&ctx(), &f.int, &f.a, add_write()).unwrap();
        f.engine.accept(&ctx(), &p.id, &f.b).unwrap();
        f.engine.finalize(&ctx(), &p.id).unwrap();

        let err = f.engine.finalize(&ctx(), &p.id).unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::ProposalNotOpen { state: ProposalState::Finalized, .. }
        ));
        assert_eq!(
            f.runtime.intersections().get_contract_history(&f.int).unwrap().len(),
            2
        );
    }

    /// Cancels the caller's context as soon as `event` is audited
    struct CancelOnEvent {
        ctx: OperationContext,
        event: EventType,
    }

    impl AuditSink for CancelOnEvent {
        fn log(&self, entry: AuditEntry) -> Result<(), intersection_types::AuditError> {
            if entry.event_type == self.event {
                self.ctx.cancel();
            }
            Ok(())
        }
    }

    fn engine_cancelling_on(
        f: &Fixture,
        caller: &OperationContext,
        event: EventType,
    ) -> NegotiationEngine {
        NegotiationEngine::new(
            NegotiationConfig::default(),
            f.runtime.clone(),
            f.trust.clone(),
            Arc::new(CancelOnEvent {
                ctx: caller.clone(),
                event,
            }),
        )
    }

    #[test]
    fn cancellation_after_commit_keeps_finalize_successful() {
        let f = fixture();
        let caller = OperationContext::background();
        let engine = engine_cancelling_on(&f, &caller, EventType::NegotiationFinalized);

        let p = engine.submit_proposal(&caller, &f.int, &f.a, add_write()).unwrap();
        engine.accept(&caller, &p.id, &f.b).unwrap();
        let result = engine.finalize(&caller, &p.id).unwrap();

        assert!(caller.is_cancelled());
        assert!(matches!(
            result,
            FinalizeResult::Amendment { new_version }
                if new_version == ContractVersion::new(1, 1, 0)
        ));
        assert_eq!(engine.get_proposal(&p.id).unwrap().state, ProposalState::Finalized);
        assert_eq!(f.trust.get_trust(&f.a, &f.int).unwrap().acceptances, 1);
        assert_eq!(f.trust.get_trust(&f.b, &f.int).unwrap().acceptances, 1);
    }

    #[test]
    fn cancellation_after_commit_keeps_reject_successful() {
        let f = fixture();
        let caller = OperationContext::background();
        let engine = engine_cancelling_on(&f, &caller, EventType::ProposalRejected);

        let p = engine.submit_proposal(&caller, &f.int, &f.a, add_write()).unwrap();
        let rejected = engine.reject(&caller, &p.id, &f.b, "no").unwrap();

        assert!(caller.is_cancelled());
        assert_eq!(rejected.state, ProposalState::Rejected);
        assert_eq!(f.trust.get_trust(&f.a, &f.int).unwrap().rejections, 1);
    }

    #[test]
    fn counter_supersedes_parent() {
        let f = fixture();
        let parent = f.engine.submit_proposal(&ctx(), &f.int, &f.a, add_write()).unwrap();
        let child = f
            .engine
            .counter_proposal(
                &ctx(),
                &parent.id,
                &f.b,
                ProposalDraft::amendment("narrower")
                    .changing_ceiling(Ceiling::new("time_window", "18:00-20:00", "")),
            )
            .unwrap();

        assert_eq!(
            f.engine.get_proposal(&parent.id).unwrap().state,
            ProposalState::Countered
        );
        assert_eq!(child.parent_id, Some(parent.id.clone()));
        assert!(child.has_approved(&f.b));
        assert!(!child.has_approved(&f.a));

        let err = f.engine.accept(&ctx(), &parent.id, &f.b).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let lineage = f.engine.proposal_lineage(&child.id).unwrap();
        let ids: Vec<_> = lineage.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec![parent.id, child.id]);
    }

    #[test]
    fn rejection_lowers_issuer_trust_and_creates_friction() {
        let f = fixture();
        let first = f.engine.submit_proposal(&ctx(), &f.int, &f.a, add_write()).unwrap();

        // No friction yet, so an accept moves nothing
        let probe = f.engine.submit_proposal(&ctx(), &f.int, &f.a, add_write()).unwrap();
        f.engine.accept(&ctx(), &probe.id, &f.b).unwrap();
        assert_eq!(f.trust.get_trust(&f.a, &f.int).unwrap().score, 0);

        let rejected = f.engine.reject(&ctx(), &first.id, &f.b, "too broad").unwrap();
        assert_eq!(rejected.state, ProposalState::Rejected);
        assert_eq!(f.trust.get_trust(&f.a, &f.int).unwrap().score, -1);

        let second = f.engine.submit_proposal(&ctx(), &f.int, &f.a, add_write()).unwrap();
        f.engine.accept(&ctx(), &second.id, &f.b).unwrap();
        assert_eq!(f.trust.get_trust(&f.a, &f.int).unwrap().acceptances, 1);
    }

    #[test]
    fn amendment_finalize_records_acceptance_for_every_party() {
        let f = fixture();
        let p = f.engine.submit_proposal(&ctx(), &f.int, &f.a, add_write()).unwrap();
        f.engine.accept(&ctx(), &p.id, &f.b).unwrap();
        f.engine.finalize(&ctx(), &p.id).unwrap();

        assert_eq!(f.trust.get_trust(&f.a, &f.int).unwrap().acceptances, 1);
        assert_eq!(f.trust.get_trust(&f.b, &f.int).unwrap().acceptances, 1);
    }

    #[test]
    fn commitment_forms_unexecuted_record() {
        let f = fixture();
        let spec = ActionSpec::new("calendar_suggestion", "Suggest dinner")
            .with_parameter("slot", "19:00")
            .requiring_scope("calendar:read");
        let p = f
            .engine
            .submit_proposal(&ctx(), &f.int, &f.a, ProposalDraft::commitment("dinner", spec))
            .unwrap();
        f.engine.accept(&ctx(), &p.id, &f.b).unwrap();

        let result = f.engine.finalize(&ctx(), &p.id).unwrap();
        let FinalizeResult::Commitment { commitment_id, record } = result else {
            panic!("expected a commitment");
        };
        assert!(record.not_executed);
        assert_eq!(record.contract_version, ContractVersion::INITIAL);
        assert_eq!(f.engine.get_commitment(&commitment_id).unwrap().proposal_id, p.id);
        assert_eq!(f.engine.list_commitments(&f.int).unwrap().len(), 1);

        // Commitments never touch the contract
        assert_eq!(
            f.runtime.intersections().get_contract_history(&f.int).unwrap().len(),
            1
        );
        assert_eq!(f.trust.get_trust(&f.b, &f.int).unwrap().settlements, 1);

        let events = f.journal.event_types().unwrap();
        assert!(events.contains(&EventType::CommitmentFormed));
        assert!(!events.contains(&EventType::IntersectionAmended));
    }

    #[test]
    fn commitment_needs_granted_scopes() {
        let f = fixture();
        let spec = ActionSpec::new("transfer", "").requiring_scope("bank:write");
        let err = f
            .engine
            .submit_proposal(&ctx(), &f.int, &f.a, ProposalDraft::commitment("pay", spec))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn empty_amendment_is_invalid() {
        let f = fixture();
        let err = f
            .engine
            .submit_proposal(&ctx(), &f.int, &f.a, ProposalDraft::amendment("nothing"))
            .unwrap_err();
        assert!(matches!(err, NegotiationError::InvalidProposal(_)));
    }

    #[test]
    fn reason_can_be_required() {
        let f = fixture_with(NegotiationConfig {
            require_reason: true,
            ..NegotiationConfig::default()
        });
        let draft = ProposalDraft::amendment("  ").adding_scope(Scope::read("x", ""));
        assert!(f.engine.submit_proposal(&ctx(), &f.int, &f.a, draft).is_err());
    }

    #[test]
    fn trust_gate_blocks_low_trust_submitters() {
        let f = fixture_with(NegotiationConfig {
            min_submitter_trust: Some(TrustLevel::Medium),
            ..NegotiationConfig::default()
        });
        f.engine.submit_proposal(&ctx(), &f.int, &f.a, add_write()).unwrap();

        f.trust.record_rejection(&ctx(), &f.a, &f.int).unwrap();
        let err = f
            .engine
            .submit_proposal(&ctx(), &f.int, &f.a, add_write())
            .unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::InsufficientTrust { level: TrustLevel::Low, .. }
        ));
    }

    #[test]
    fn dissolved_intersection_refuses_proposals() {
        let f = fixture();
        let p = f.engine.submit_proposal(&ctx(), &f.int, &f.a, add_write()).unwrap();
        f.engine.accept(&ctx(), &p.id, &f.b).unwrap();
        f.runtime.intersections().dissolve(&ctx(), &f.int).unwrap();

        let err = f.engine.submit_proposal(&ctx(), &f.int, &f.a, add_write()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = f.engine.finalize(&ctx(), &p.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(f.engine.get_proposal(&p.id).unwrap().state, ProposalState::Accepted);
    }

    #[test]
    fn unknown_proposal_is_not_found() {
        let f = fixture();
        let missing = ProposalId::new("nope");
        assert_eq!(
            f.engine.accept(&ctx(), &missing, &f.a).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert!(f.engine.proposal_lineage(&missing).is_err());
        assert!(f.engine.list_proposals(&f.int).unwrap().is_empty());
    }

    #[test]
    fn cancelled_context_changes_nothing() {
        let f = fixture();
        let cancelled = OperationContext::background();
        cancelled.cancel();
        let err = f
            .engine
            .submit_proposal(&cancelled, &f.int, &f.a, add_write())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(f.engine.list_proposals(&f.int).unwrap().is_empty());
        assert!(f.journal.is_empty());
    }
}
