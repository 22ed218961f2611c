//! Negotiation Engine - proposal state machine over intersection contracts
//!
//! Proposals move `open → {rejected | countered | accepted → finalized}`.
//! A counter-proposal freezes its parent and opens a child. Finalize needs
//! the approval of every party of the latest contract, and either appends a
//! new contract version or forms an unexecuted commitment.

#![deny(unsafe_code)]

mod config;
mod engine;
mod error;

pub use config::NegotiationConfig;
pub use engine::{AcceptOutcome, NegotiationEngine};
pub use error::{NegotiationError, NegotiationResult};
