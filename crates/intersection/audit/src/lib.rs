//! Audit sinks for the intersection lifecycle
//!
//! - [`AuditJournal`]: append-only in-memory journal with simple queries
//! - [`TracingAuditSink`]: forwards every entry to `tracing`
//! - [`emit`]: best-effort delivery used by the core; sink failures are
//!   logged and swallowed so they never fail the primary operation

#![deny(unsafe_code)]

use intersection_types::{
    AuditEntry, AuditError, AuditOutcome, AuditSink, CircleId, EventType, IntersectionId,
};
use std::sync::RwLock;
use tracing::{info, warn};

/// Deliver an entry to `sink`, logging instead of failing on error
pub fn emit(sink: &dyn AuditSink, entry: AuditEntry) {
    let event_type = entry.event_type;
    if let Err(e) = sink.log(entry) {
        warn!(event_type = %event_type, error = %e, "Audit entry dropped");
    }
}

/// Append-only in-memory audit journal
pub struct AuditJournal {
    entries: RwLock<Vec<AuditEntry>>,
}

impl AuditJournal {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// All entries in the order they were logged
    pub fn entries(&self) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self.entries.read().map_err(|_| AuditError::LockPoisoned)?;
        Ok(entries.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn by_event_type(&self, event_type: EventType) -> Result<Vec<AuditEntry>, AuditError> {
        self.filter(|e| e.event_type == event_type)
    }

    pub fn by_event_name(&self, name: &str) -> Result<Vec<AuditEntry>, AuditError> {
        self.filter(|e| e.event_type.as_str() == name)
    }

    pub fn for_intersection(
        &self,
        intersection_id: &IntersectionId,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        self.filter(|e| e.intersection_id.as_ref() == Some(intersection_id))
    }

    pub fn for_circle(&self, circle_id: &CircleId) -> Result<Vec<AuditEntry>, AuditError> {
        self.filter(|e| e.circle_id.as_ref() == Some(circle_id))
    }

    pub fn failures(&self) -> Result<Vec<AuditEntry>, AuditError> {
        self.filter(|e| e.outcome != AuditOutcome::Success)
    }

    /// Event types in log order, handy for asserting sequences
    pub fn event_types(&self) -> Result<Vec<EventType>, AuditError> {
        let entries = self.entries.read().map_err(|_| AuditError::LockPoisoned)?;
        Ok(entries.iter().map(|e| e.event_type).collect())
    }

    fn filter(&self, pred: impl Fn(&AuditEntry) -> bool) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self.entries.read().map_err(|_| AuditError::LockPoisoned)?;
        Ok(entries.iter().filter(|e| pred(e)).cloned().collect())
    }
}

impl Default for AuditJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for AuditJournal {
    fn log(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let mut entries = self.entries.write().map_err(|_| AuditError::LockPoisoned)?;
        entries.push(entry);
        Ok(())
    }
}

/// Forwards audit entries to the `tracing` subscriber under the `audit` target
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn log(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let metadata = serde_json::to_string(&entry.metadata)
            .map_err(|e| AuditError::Unavailable(e.to_string()))?;

        match entry.outcome {
            AuditOutcome::Success => info!(
                target: "audit",
                event_type = %entry.event_type,
                subject_id = %entry.subject_id,
                action = %entry.action,
                circle_id = ?entry.circle_id.as_ref().map(|c| c.as_str()),
                intersection_id = ?entry.intersection_id.as_ref().map(|i| i.as_str()),
                metadata = %metadata,
                "audit"
            ),
            outcome => warn!(
                target: "audit",
                event_type = %entry.event_type,
                subject_id = %entry.subject_id,
                action = %entry.action,
                outcome = ?outcome,
                circle_id = ?entry.circle_id.as_ref().map(|c| c.as_str()),
                intersection_id = ?entry.intersection_id.as_ref().map(|i| i.as_str()),
                metadata = %metadata,
                "audit"
            ),
        }
        Ok(())
    }
}

/// Fans an entry out to several sinks; each sink fails independently
pub struct FanoutAuditSink {
    sinks: Vec<std::sync::Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

impl AuditSink for FanoutAuditSink {
    fn log(&self, entry: AuditEntry) -> Result<(), AuditError> {
        for sink in &self.sinks {
            emit(sink.as_ref(), entry.clone());
        }
        Ok(())
    }
}
