//! Intersection Service - one handle over the whole contract lifecycle
//!
//! Wires the entity runtime, invitation protocol, negotiation engine and
//! trust ledger together around a shared signing service and audit sink.
//! The handle is cheap to clone; clones share every store.

#![deny(unsafe_code)]

mod config;
mod error;
mod observability;
mod service;

pub use config::ServiceConfig;
pub use error::{ServiceError, ServiceResult};
pub use observability::{init_tracing, TracingConfig};
pub use service::IntersectionService;

pub use intersection_invite::InvitationConfig;
pub use intersection_negotiation::{AcceptOutcome, NegotiationConfig};
pub use intersection_trust::TrustPolicy;
