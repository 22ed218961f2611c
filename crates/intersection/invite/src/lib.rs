//! Invitation Protocol - signed invite tokens that bootstrap intersections
//!
//! An issuer circle signs a token proposing contract terms. The acceptor
//! presents it back; once the token validates and the acceptor is allowed
//! to accept, a two-party intersection is created from the template.
//!
//! Validation order is fixed: structure, then expiry, then signature.

#![deny(unsafe_code)]

mod config;
mod error;
mod token;

pub use config::InvitationConfig;
pub use error::{InviteError, InviteResult};
pub use token::{canonical_payload, payload_digest};

use chrono::Utc;
use intersection_audit::emit;
use intersection_runtime::EntityRuntime;
use intersection_types::{
    AuditEntry, AuditOutcome, AuditSink, CircleId, ContractTerms, EventType, IntersectionRef,
    InviteTemplate, InviteToken, OperationContext, Party, PartyType, SigningService, TokenId,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Issues, validates and accepts invite tokens
pub struct InvitationService {
    config: InvitationConfig,
    runtime: Arc<EntityRuntime>,
    signer: Arc<dyn SigningService>,
    audit: Arc<dyn AuditSink>,
}

impl InvitationService {
    pub fn new(
        config: InvitationConfig,
        runtime: Arc<EntityRuntime>,
        signer: Arc<dyn SigningService>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config,
            runtime,
            signer,
            audit,
        }
    }

    pub fn config(&self) -> &InvitationConfig {
        &self.config
    }

    /// Key ID the issuer's signature is made with
    pub fn key_id_for(&self, circle_id: &CircleId) -> String {
        format!("{}{}", self.config.signing_key_prefix, circle_id)
    }

    /// Sign a new invite on behalf of `issuer`.
    ///
    /// `target` of `None` makes an open invite. A zero `valid_for` falls
    /// back to the configured default validity.
    pub fn issue_invite_token(
        &self,
        ctx: &OperationContext,
        issuer: &CircleId,
        target: Option<CircleId>,
        proposed_name: impl Into<String>,
        template: InviteTemplate,
        valid_for: Duration,
    ) -> InviteResult<InviteToken> {
        ctx.check()?;
        self.runtime.circles().require_active(issuer)?;

        let valid_for = if valid_for.is_zero() {
            self.config.default_validity()
        } else {
            valid_for
        };
        let valid_for = chrono::Duration::from_std(valid_for)
            .map_err(|e| InviteError::InvalidValidity(e.to_string()))?;

        let issued_at = Utc::now();
        let expires_at = issued_at
            .checked_add_signed(valid_for)
            .ok_or_else(|| InviteError::InvalidValidity("expiry out of range".to_string()))?;

        let mut token = InviteToken {
            token_id: TokenId::generate(),
            issuer_circle_id: issuer.clone(),
            target_circle_id: target,
            proposed_name: proposed_name.into(),
            template,
            issued_at,
            expires_at: Some(expires_at),
            signature_key_id: self.key_id_for(issuer),
            signature_algorithm: self.signer.algorithm().to_string(),
            signature: Vec::new(),
        };

        let digest = payload_digest(&token)?;
        token.signature = self
            .signer
            .sign(&token.signature_key_id, &digest)
            .map_err(InviteError::Signing)?;

        info!(
            token_id = %token.token_id,
            issuer = %issuer,
            open = token.is_open(),
            "Invite token issued"
        );

        emit(
            self.audit.as_ref(),
            AuditEntry::success(
                EventType::InviteTokenIssued,
                token.token_id.to_string(),
                "issue_invite",
            )
            .with_circle(issuer)
            .with_metadata("scope_count", token.template.scopes.len())
            .with_metadata("ceiling_count", token.template.ceilings.len())
            .with_metadata("expires_at", expires_at.to_rfc3339())
            .with_metadata("open", token.is_open()),
        );

        Ok(token)
    }

    /// Check structure, expiry and signature, in that order
    pub fn validate_invite_token(&self, token: &InviteToken) -> InviteResult<()> {
        if token.token_id.is_empty() {
            return Err(InviteError::MissingTokenId);
        }
        if token.issuer_circle_id.is_empty() {
            return Err(InviteError::MissingIssuer);
        }
        let expires_at = token.expires_at.ok_or(InviteError::MissingExpiry)?;
        if token.signature.is_empty() {
            return Err(InviteError::MissingSignature);
        }
        if token.signature_key_id.is_empty() {
            return Err(InviteError::MissingKeyId);
        }
        if token.signature_algorithm.is_empty() {
            return Err(InviteError::MissingAlgorithm);
        }

        if token.is_expired_at(Utc::now()) {
            return Err(InviteError::TokenExpired {
                token_id: token.token_id.clone(),
                expired_at: expires_at,
            });
        }

        if token.signature_algorithm != self.signer.algorithm() {
            return Err(InviteError::InvalidSignature(token.token_id.clone()));
        }
        // Only the issuer's own key may vouch for the issuer
        if token.signature_key_id != self.key_id_for(&token.issuer_circle_id) {
            debug!(
                token_id = %token.token_id,
                issuer = %token.issuer_circle_id,
                key_id = %token.signature_key_id,
                "Invite signed with a key that is not the issuer's"
            );
            return Err(InviteError::InvalidSignature(token.token_id.clone()));
        }
        let digest = payload_digest(token)?;
        self.signer
            .verify(&token.signature_key_id, &digest, &token.signature)
            .map_err(|e| {
                debug!(token_id = %token.token_id, error = %e, "Invite signature rejected");
                InviteError::InvalidSignature(token.token_id.clone())
            })
    }

    /// Accept `token` as `acceptor`, forming a new two-party intersection
    pub fn accept_invite_token(
        &self,
        ctx: &OperationContext,
        token: &InviteToken,
        acceptor: &CircleId,
    ) -> InviteResult<IntersectionRef> {
        ctx.check()?;

        if let Err(e) = self.validate_invite_token(token) {
            warn!(token_id = %token.token_id, error = %e, "Invalid invite token presented");
            emit(
                self.audit.as_ref(),
                AuditEntry::new(
                    EventType::InviteTokenInvalid,
                    token.token_id.to_string(),
                    "accept_invite",
                    AuditOutcome::Failure,
                )
                .with_circle(acceptor)
                .with_metadata("reason", e.reason()),
            );
            return Err(e);
        }

        if acceptor.is_empty() {
            return Err(InviteError::MissingAcceptor);
        }

        if !token.can_be_accepted_by(acceptor) {
            warn!(
                token_id = %token.token_id,
                acceptor = %acceptor,
                "Invite presented by non-target circle"
            );
            self.audit_rejection(token, acceptor, "not_target");
            return Err(InviteError::UnauthorizedAcceptor {
                token_id: token.token_id.clone(),
                acceptor: acceptor.clone(),
            });
        }

        if acceptor == &token.issuer_circle_id {
            warn!(
                token_id = %token.token_id,
                acceptor = %acceptor,
                "Issuer tried to accept own invite"
            );
            self.audit_rejection(token, acceptor, "self_acceptance");
            return Err(InviteError::SelfAcceptance(acceptor.clone()));
        }

        let issuer = self.runtime.circles().get(&token.issuer_circle_id)?;
        if self.config.provision_missing_acceptor {
            self.runtime
                .circles()
                .provision(ctx, acceptor, issuer.tenant_id.clone())?;
        }
        self.runtime.circles().require_active(acceptor)?;

        let scope_names: Vec<String> = token
            .template
            .scopes
            .iter()
            .map(|s| s.name.clone())
            .collect();
        let terms = ContractTerms {
            tenant_id: issuer.tenant_id,
            parties: vec![
                Party::new(token.issuer_circle_id.clone(), PartyType::Initiator)
                    .with_granted_scopes(scope_names.clone()),
                Party::new(acceptor.clone(), PartyType::Acceptor)
                    .with_granted_scopes(scope_names),
            ],
            scopes: token.template.scopes.clone(),
            ceilings: token.template.ceilings.clone(),
            governance: token.template.governance.clone(),
        };

        let intersection = self.runtime.create_intersection(ctx, terms)?;

        info!(
            token_id = %token.token_id,
            intersection_id = %intersection.id,
            issuer = %token.issuer_circle_id,
            acceptor = %acceptor,
            "Invite token accepted"
        );

        emit(
            self.audit.as_ref(),
            AuditEntry::success(
                EventType::InviteTokenAccepted,
                token.token_id.to_string(),
                "accept_invite",
            )
            .with_circle(acceptor)
            .with_intersection(&intersection.id)
            .with_metadata("issuer", &token.issuer_circle_id),
        );
        emit(
            self.audit.as_ref(),
            AuditEntry::success(
                EventType::IntersectionCreated,
                intersection.id.to_string(),
                "create_intersection",
            )
            .with_circle(&token.issuer_circle_id)
            .with_intersection(&intersection.id)
            .with_metadata("version", intersection.version)
            .with_metadata("proposed_name", &token.proposed_name),
        );

        Ok(IntersectionRef {
            intersection_id: intersection.id,
            version: intersection.version,
            created_at: intersection.created_at,
        })
    }

    fn audit_rejection(&self, token: &InviteToken, acceptor: &CircleId, reason: &str) {
        emit(
            self.audit.as_ref(),
            AuditEntry::new(
                EventType::InviteTokenRejected,
                token.token_id.to_string(),
                "accept_invite",
                AuditOutcome::Unauthorized,
            )
            .with_circle(acceptor)
            .with_metadata("reason", reason),
        );
    }
}
