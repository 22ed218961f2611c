use crate::{ServiceConfig, ServiceResult};
use intersection_audit::emit;
use intersection_invite::InvitationService;
use intersection_negotiation::{AcceptOutcome, NegotiationEngine};
use intersection_runtime::EntityRuntime;
use intersection_trust::TrustLedger;
use intersection_types::{
    AuditEntry, AuditSink, AuthorityGrant, Circle, CircleId, CommitmentId, CommitmentRecord,
    Contract, ContractTerms, ContractVersion, EventType, FinalizeResult, GrantId, GrantRequest,
    Intersection, IntersectionId, IntersectionRef, InviteTemplate, InviteToken, OperationContext,
    Party, Policy, PolicyUpdate, ProposalDraft, ProposalId, ProposalThread, SigningService,
    TenantId, TrustRecord, TrustUpdate,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Facade over every lifecycle component
#[derive(Clone)]
pub struct IntersectionService {
    config: Arc<ServiceConfig>,
    runtime: Arc<EntityRuntime>,
    invitations: Arc<InvitationService>,
    negotiation: Arc<NegotiationEngine>,
    trust: Arc<TrustLedger>,
    audit: Arc<dyn AuditSink>,
}

impl IntersectionService {
    pub fn new(
        config: ServiceConfig,
        signer: Arc<dyn SigningService>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let runtime = Arc::new(EntityRuntime::new());
        let trust = Arc::new(TrustLedger::new(config.trust.clone()).with_audit(audit.clone()));
        let invitations = Arc::new(InvitationService::new(
            config.invitation.clone(),
            runtime.clone(),
            signer,
            audit.clone(),
        ));
        let negotiation = Arc::new(NegotiationEngine::new(
            config.negotiation.clone(),
            runtime.clone(),
            trust.clone(),
            audit.clone(),
        ));

        info!(
            provision_missing_acceptor = config.invitation.provision_missing_acceptor,
            trust_gate = ?config.negotiation.min_submitter_trust,
            "Intersection service ready"
        );

        Self {
            config: Arc::new(config),
            runtime,
            invitations,
            negotiation,
            trust,
            audit,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn runtime(&self) -> &EntityRuntime {
        &self.runtime
    }

    pub fn invitations(&self) -> &InvitationService {
        &self.invitations
    }

    pub fn negotiation(&self) -> &NegotiationEngine {
        &self.negotiation
    }

    pub fn trust(&self) -> &TrustLedger {
        &self.trust
    }

    // --- Circles ---

    pub fn create_circle(
        &self,
        ctx: &OperationContext,
        tenant_id: TenantId,
    ) -> ServiceResult<Circle> {
        Ok(self.runtime.circles().create(ctx, tenant_id)?)
    }

    pub fn get_circle(&self, circle_id: &CircleId) -> ServiceResult<Circle> {
        Ok(self.runtime.circles().get(circle_id)?)
    }

    pub fn list_circles(&self, tenant_id: Option<&TenantId>) -> ServiceResult<Vec<Circle>> {
        Ok(self.runtime.circles().list(tenant_id)?)
    }

    pub fn suspend_circle(
        &self,
        ctx: &OperationContext,
        circle_id: &CircleId,
    ) -> ServiceResult<Circle> {
        Ok(self.runtime.circles().suspend(ctx, circle_id)?)
    }

    pub fn resume_circle(
        &self,
        ctx: &OperationContext,
        circle_id: &CircleId,
    ) -> ServiceResult<Circle> {
        Ok(self.runtime.circles().resume(ctx, circle_id)?)
    }

    pub fn terminate_circle(
        &self,
        ctx: &OperationContext,
        circle_id: &CircleId,
    ) -> ServiceResult<Circle> {
        Ok(self.runtime.circles().terminate(ctx, circle_id)?)
    }

    pub fn get_policy(&self, circle_id: &CircleId) -> ServiceResult<Policy> {
        Ok(self.runtime.circles().get_policy(circle_id)?)
    }

    pub fn update_policy(
        &self,
        ctx: &OperationContext,
        circle_id: &CircleId,
        update: PolicyUpdate,
    ) -> ServiceResult<Policy> {
        Ok(self.runtime.circles().update_policy(ctx, circle_id, update)?)
    }

    pub fn grant_authority(
        &self,
        ctx: &OperationContext,
        circle_id: &CircleId,
        request: GrantRequest,
    ) -> ServiceResult<AuthorityGrant> {
        Ok(self.runtime.circles().grant_authority(ctx, circle_id, request)?)
    }

    pub fn revoke_authority(
        &self,
        ctx: &OperationContext,
        circle_id: &CircleId,
        grant_id: &GrantId,
    ) -> ServiceResult<AuthorityGrant> {
        Ok(self.runtime.circles().revoke_authority(ctx, circle_id, grant_id)?)
    }

    pub fn list_grants(&self, circle_id: &CircleId) -> ServiceResult<Vec<AuthorityGrant>> {
        Ok(self.runtime.circles().list_grants(circle_id)?)
    }

    // --- Intersections ---

    /// Form an intersection directly from agreed terms, without an invitation.
    ///
    /// Supports multilateral contracts; invitations only ever form two-party ones.
    pub fn create_intersection(
        &self,
        ctx: &OperationContext,
        terms: ContractTerms,
    ) -> ServiceResult<Intersection> {
        let party_count = terms.parties.len();
        let intersection = self.runtime.create_intersection(ctx, terms)?;

        emit(
            self.audit.as_ref(),
            AuditEntry::success(
                EventType::IntersectionCreated,
                intersection.id.to_string(),
                "create_intersection",
            )
            .with_intersection(&intersection.id)
            .with_metadata("version", intersection.version)
            .with_metadata("parties", party_count),
        );

        Ok(intersection)
    }

    pub fn get_intersection(
        &self,
        intersection_id: &IntersectionId,
    ) -> ServiceResult<Intersection> {
        Ok(self.runtime.intersections().get(intersection_id)?)
    }

    pub fn list_intersections(
        &self,
        tenant_id: Option<&TenantId>,
    ) -> ServiceResult<Vec<Intersection>> {
        Ok(self.runtime.intersections().list(tenant_id)?)
    }

    pub fn dissolve_intersection(
        &self,
        ctx: &OperationContext,
        intersection_id: &IntersectionId,
    ) -> ServiceResult<Intersection> {
        Ok(self.runtime.intersections().dissolve(ctx, intersection_id)?)
    }

    pub fn get_contract(&self, intersection_id: &IntersectionId) -> ServiceResult<Contract> {
        Ok(self.runtime.intersections().get_contract(intersection_id)?)
    }

    pub fn get_contract_history(
        &self,
        intersection_id: &IntersectionId,
    ) -> ServiceResult<Vec<Contract>> {
        Ok(self.runtime.intersections().get_contract_history(intersection_id)?)
    }

    pub fn get_contract_version(
        &self,
        intersection_id: &IntersectionId,
        version: ContractVersion,
    ) -> ServiceResult<Contract> {
        Ok(self
            .runtime
            .intersections()
            .get_contract_version(intersection_id, version)?)
    }

    pub fn list_parties(&self, intersection_id: &IntersectionId) -> ServiceResult<Vec<Party>> {
        Ok(self.runtime.intersections().list_parties(intersection_id)?)
    }

    pub fn is_party(
        &self,
        intersection_id: &IntersectionId,
        circle_id: &CircleId,
    ) -> ServiceResult<bool> {
        Ok(self.runtime.intersections().is_party(intersection_id, circle_id)?)
    }

    // --- Invitations ---

    pub fn issue_invite(
        &self,
        ctx: &OperationContext,
        issuer: &CircleId,
        target: Option<CircleId>,
        proposed_name: impl Into<String>,
        template: InviteTemplate,
        valid_for: Duration,
    ) -> ServiceResult<InviteToken> {
        Ok(self.invitations.issue_invite_token(
            ctx,
            issuer,
            target,
            proposed_name,
            template,
            valid_for,
        )?)
    }

    pub fn validate_invite(&self, token: &InviteToken) -> ServiceResult<()> {
        Ok(self.invitations.validate_invite_token(token)?)
    }

    pub fn accept_invite(
        &self,
        ctx: &OperationContext,
        token: &InviteToken,
        acceptor: &CircleId,
    ) -> ServiceResult<IntersectionRef> {
        Ok(self.invitations.accept_invite_token(ctx, token, acceptor)?)
    }

    // --- Negotiation ---

    pub fn submit_proposal(
        &self,
        ctx: &OperationContext,
        intersection_id: &IntersectionId,
        issuer: &CircleId,
        draft: ProposalDraft,
    ) -> ServiceResult<ProposalThread> {
        Ok(self
            .negotiation
            .submit_proposal(ctx, intersection_id, issuer, draft)?)
    }

    pub fn accept_proposal(
        &self,
        ctx: &OperationContext,
        proposal_id: &ProposalId,
        by: &CircleId,
    ) -> ServiceResult<AcceptOutcome> {
        Ok(self.negotiation.accept(ctx, proposal_id, by)?)
    }

    pub fn reject_proposal(
        &self,
        ctx: &OperationContext,
        proposal_id: &ProposalId,
        by: &CircleId,
        reason: impl Into<String>,
    ) -> ServiceResult<ProposalThread> {
        Ok(self.negotiation.reject(ctx, proposal_id, by, reason)?)
    }

    pub fn counter_proposal(
        &self,
        ctx: &OperationContext,
        parent_id: &ProposalId,
        by: &CircleId,
        draft: ProposalDraft,
    ) -> ServiceResult<ProposalThread> {
        Ok(self.negotiation.counter_proposal(ctx, parent_id, by, draft)?)
    }

    pub fn finalize(
        &self,
        ctx: &OperationContext,
        proposal_id: &ProposalId,
    ) -> ServiceResult<FinalizeResult> {
        Ok(self.negotiation.finalize(ctx, proposal_id)?)
    }

    pub fn get_proposal(&self, proposal_id: &ProposalId) -> ServiceResult<ProposalThread> {
        Ok(self.negotiation.get_proposal(proposal_id)?)
    }

    pub fn list_proposals(
        &self,
        intersection_id: &IntersectionId,
    ) -> ServiceResult<Vec<ProposalThread>> {
        Ok(self.negotiation.list_proposals(intersection_id)?)
    }

    pub fn proposal_lineage(&self, proposal_id: &ProposalId) -> ServiceResult<Vec<ProposalThread>> {
        Ok(self.negotiation.proposal_lineage(proposal_id)?)
    }

    pub fn get_commitment(&self, commitment_id: &CommitmentId) -> ServiceResult<CommitmentRecord> {
        Ok(self.negotiation.get_commitment(commitment_id)?)
    }

    pub fn list_commitments(
        &self,
        intersection_id: &IntersectionId,
    ) -> ServiceResult<Vec<CommitmentRecord>> {
        Ok(self.negotiation.list_commitments(intersection_id)?)
    }

    // --- Trust ---

    pub fn get_trust(
        &self,
        circle_id: &CircleId,
        intersection_id: &IntersectionId,
    ) -> ServiceResult<TrustRecord> {
        Ok(self.trust.get_trust(circle_id, intersection_id)?)
    }

    pub fn trust_updates(&self) -> ServiceResult<Vec<TrustUpdate>> {
        Ok(self.trust.updates()?)
    }

    pub fn trust_updates_for(&self, circle_id: &CircleId) -> ServiceResult<Vec<TrustUpdate>> {
        Ok(self.trust.updates_for(circle_id)?)
    }
}
