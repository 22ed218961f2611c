#![allow(dead_code)]

use intersection_audit::AuditJournal;
use intersection_crypto::Ed25519Keyring;
use intersection_service::{IntersectionService, ServiceConfig};
use intersection_types::{
    Ceiling, CircleId, IntersectionRef, InviteTemplate, OperationContext, Scope, TenantId,
};
use std::sync::Arc;
use std::time::Duration;

pub struct Harness {
    pub service: IntersectionService,
    pub keyring: Arc<Ed25519Keyring>,
    pub journal: Arc<AuditJournal>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ServiceConfig::default())
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        let keyring = Arc::new(Ed25519Keyring::new());
        let journal = Arc::new(AuditJournal::new());
        let service = IntersectionService::new(config, keyring.clone(), journal.clone());
        Self {
            service,
            keyring,
            journal,
        }
    }

    /// An active circle in tenant `t` with its signing key registered
    pub fn circle(&self) -> CircleId {
        let circle = self
            .service
            .create_circle(&ctx(), TenantId::new("t"))
            .unwrap();
        self.keyring.generate_for_circle(&circle.id).unwrap();
        circle.id
    }

    /// Invite `target` from `issuer` and accept it
    pub fn connect(&self, issuer: &CircleId, target: &CircleId) -> IntersectionRef {
        let token = self
            .service
            .issue_invite(
                &ctx(),
                issuer,
                Some(target.clone()),
                "shared calendar",
                calendar_template(),
                Duration::from_secs(3600),
            )
            .unwrap();
        self.service.accept_invite(&ctx(), &token, target).unwrap()
    }
}

pub fn ctx() -> OperationContext {
    OperationContext::background()
}

pub fn calendar_template() -> InviteTemplate {
    InviteTemplate::new()
        .with_scope(Scope::read("calendar:read", "Read free/busy"))
        .with_scope(Scope::read_write("calendar:write", "Create events"))
        .with_ceiling(Ceiling::new("time_window", "17:00-21:00", "local_time"))
}
