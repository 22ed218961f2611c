//! Intersection Domain Types
//!
//! This crate defines the domain types shared by every layer of the
//! intersection contract lifecycle.
//!
//! # Key Concepts
//!
//! - **Circle**: a sovereign actor with its own policy and authority grants.
//! - **Intersection**: a contract boundary connecting two or more circles.
//! - **Contract**: the versioned, append-only terms of an intersection.
//! - **Invite Token**: a signed, time-bounded artifact that bootstraps an
//!   intersection between two circles.
//! - **Proposal Thread**: a negotiable change request against a contract.
//! - **Commitment**: a finalized action handoff that is never executed here.
//! - **Trust Record**: a coarse reputation bucket derived from negotiation.
//!
//! # Architecture
//!
//! This is a pure types crate with no runtime behaviour beyond value
//! helpers. IDs use the newtype pattern and implement `Display`,
//! `generate()`, and `new()`. Collaborator boundaries (signing, audit) are
//! expressed as traits so the runtime crates never depend on a concrete
//! implementation.

#![deny(unsafe_code)]

mod audit;
mod circle;
mod context;
mod contract;
mod errors;
mod ids;
mod invite;
mod proposal;
mod signing;
mod trust;
mod version;

pub use audit::*;
pub use circle::*;
pub use context::*;
pub use contract::*;
pub use errors::*;
pub use ids::*;
pub use invite::*;
pub use proposal::*;
pub use signing::*;
pub use trust::*;
pub use version::*;
