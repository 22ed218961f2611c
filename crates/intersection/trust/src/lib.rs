//! Trust Ledger - per-party reputation derived from negotiation outcomes
//!
//! Scores move by fixed deltas (acceptance +1, rejection −1, settlement +2 by
//! default) and map onto coarse levels. Every level transition appends an
//! immutable [`TrustUpdate`]; that list is the ledger's only observable
//! history and is never edited.

#![deny(unsafe_code)]

mod policy;

pub use policy::TrustPolicy;

use chrono::Utc;
use intersection_audit::emit;
use intersection_types::{
    AuditEntry, AuditSink, CircleId, ContextError, ErrorKind, EventType, IntersectionId,
    OperationContext, TrustEvent, TrustLevel, TrustRecord, TrustUpdate,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from the trust ledger
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrustError {
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("Lock error")]
    LockPoisoned,
}

impl TrustError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrustError::Context(_) => ErrorKind::Cancelled,
            TrustError::LockPoisoned => ErrorKind::Internal,
        }
    }
}

/// Result type alias for trust operations
pub type TrustResult<T> = Result<T, TrustError>;

#[derive(Default)]
struct TrustTables {
    records: HashMap<(CircleId, IntersectionId), TrustRecord>,
    updates: Vec<TrustUpdate>,
}

/// Tracks trust per (circle, intersection) pair
pub struct TrustLedger {
    policy: TrustPolicy,
    tables: RwLock<TrustTables>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl TrustLedger {
    pub fn new(policy: TrustPolicy) -> Self {
        Self {
            policy,
            tables: RwLock::new(TrustTables::default()),
            audit: None,
        }
    }

    /// Emit `trust.updated` to `audit` on every level transition
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    /// Snapshot of a pair's trust; neutral (medium, 0) when never recorded
    pub fn get_trust(
        &self,
        circle_id: &CircleId,
        intersection_id: &IntersectionId,
    ) -> TrustResult<TrustRecord> {
        let tables = self.tables.read().map_err(|_| TrustError::LockPoisoned)?;
        Ok(tables
            .records
            .get(&(circle_id.clone(), intersection_id.clone()))
            .cloned()
            .unwrap_or_else(|| TrustRecord::neutral(circle_id.clone(), intersection_id.clone())))
    }

    pub fn record_acceptance(
        &self,
        ctx: &OperationContext,
        circle_id: &CircleId,
        intersection_id: &IntersectionId,
    ) -> TrustResult<TrustRecord> {
        self.record(ctx, circle_id, intersection_id, TrustEvent::Acceptance)
    }

    pub fn record_rejection(
        &self,
        ctx: &OperationContext,
        circle_id: &CircleId,
        intersection_id: &IntersectionId,
    ) -> TrustResult<TrustRecord> {
        self.record(ctx, circle_id, intersection_id, TrustEvent::Rejection)
    }

    pub fn record_settlement(
        &self,
        ctx: &OperationContext,
        circle_id: &CircleId,
        intersection_id: &IntersectionId,
    ) -> TrustResult<TrustRecord> {
        self.record(ctx, circle_id, intersection_id, TrustEvent::Settlement)
    }

    /// Apply one outcome and recompute the level
    pub fn record(
        &self,
        ctx: &OperationContext,
        circle_id: &CircleId,
        intersection_id: &IntersectionId,
        event: TrustEvent,
    ) -> TrustResult<TrustRecord> {
        ctx.check()?;

        let (record, update) = {
            let mut tables = self.tables.write().map_err(|_| TrustError::LockPoisoned)?;
            self.apply(&mut tables, circle_id, intersection_id, event)
        };
        self.announce(&record, event, update);
        Ok(record)
    }

    /// Apply one outcome to every circle in `circle_ids` under a single
    /// lock acquisition.
    ///
    /// Takes no context: it settles trust for work that has already
    /// committed, so either every circle is recorded or none is.
    pub fn record_all(
        &self,
        circle_ids: &[CircleId],
        intersection_id: &IntersectionId,
        event: TrustEvent,
    ) -> TrustResult<Vec<TrustRecord>> {
        let applied: Vec<(TrustRecord, Option<TrustUpdate>)> = {
            let mut tables = self.tables.write().map_err(|_| TrustError::LockPoisoned)?;
            circle_ids
                .iter()
                .map(|circle_id| self.apply(&mut tables, circle_id, intersection_id, event))
                .collect()
        };

        Ok(applied
            .into_iter()
            .map(|(record, update)| {
                self.announce(&record, event, update);
                record
            })
            .collect())
    }

    fn apply(
        &self,
        tables: &mut TrustTables,
        circle_id: &CircleId,
        intersection_id: &IntersectionId,
        event: TrustEvent,
    ) -> (TrustRecord, Option<TrustUpdate>) {
        let record = tables
            .records
            .entry((circle_id.clone(), intersection_id.clone()))
            .or_insert_with(|| TrustRecord::neutral(circle_id.clone(), intersection_id.clone()));

        let previous_level = record.level;
        record.score += self.policy.delta(event);
        match event {
            TrustEvent::Acceptance => record.acceptances += 1,
            TrustEvent::Rejection => record.rejections += 1,
            TrustEvent::Settlement => record.settlements += 1,
        }
        record.level = self.policy.level_for(record.score);
        record.last_updated = Utc::now();
        let record = record.clone();

        let update = (record.level != previous_level).then(|| TrustUpdate {
            circle_id: circle_id.clone(),
            intersection_id: intersection_id.clone(),
            previous_level,
            new_level: record.level,
            score: record.score,
            cause: event,
            timestamp: record.last_updated,
        });
        if let Some(update) = &update {
            tables.updates.push(update.clone());
        }

        (record, update)
    }

    fn announce(&self, record: &TrustRecord, event: TrustEvent, update: Option<TrustUpdate>) {
        let circle_id = &record.circle_id;
        let intersection_id = &record.intersection_id;
        debug!(
            circle_id = %circle_id,
            intersection_id = %intersection_id,
            event = ?event,
            score = record.score,
            "Trust recorded"
        );

        let Some(update) = update else {
            return;
        };
        info!(
            circle_id = %circle_id,
            intersection_id = %intersection_id,
            from = %update.previous_level,
            to = %update.new_level,
            "Trust level changed"
        );
        if let Some(audit) = &self.audit {
            emit(
                audit.as_ref(),
                AuditEntry::success(EventType::TrustUpdated, circle_id.as_str(), "trust_update")
                    .with_circle(circle_id)
                    .with_intersection(intersection_id)
                    .with_metadata("previous_level", update.previous_level)
                    .with_metadata("new_level", update.new_level)
                    .with_metadata("score", update.score),
            );
        }
    }

    /// Every level transition, in the order they happened
    pub fn updates(&self) -> TrustResult<Vec<TrustUpdate>> {
        let tables = self.tables.read().map_err(|_| TrustError::LockPoisoned)?;
        Ok(tables.updates.clone())
    }

    pub fn updates_for(&self, circle_id: &CircleId) -> TrustResult<Vec<TrustUpdate>> {
        let tables = self.tables.read().map_err(|_| TrustError::LockPoisoned)?;
        Ok(tables
            .updates
            .iter()
            .filter(|u| &u.circle_id == circle_id)
            .cloned()
            .collect())
    }

    /// Current level for a pair, neutral when unknown
    pub fn level(
        &self,
        circle_id: &CircleId,
        intersection_id: &IntersectionId,
    ) -> TrustResult<TrustLevel> {
        Ok(self.get_trust(circle_id, intersection_id)?.level)
    }
}

impl Default for TrustLedger {
    fn default() -> Self {
        Self::new(TrustPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intersection_audit::AuditJournal;
    use proptest::prelude::*;

    fn ids() -> (CircleId, IntersectionId) {
        (CircleId::new("a"), IntersectionId::new("i"))
    }

    fn ctx() -> OperationContext {
        OperationContext::background()
    }

    #[test]
    fn unknown_pair_is_neutral() {
        let ledger = TrustLedger::default();
        let (c, i) = ids();
        let record = ledger.get_trust(&c, &i).unwrap();
        assert_eq!(record.level, TrustLevel::Medium);
        assert_eq!(record.score, 0);
        assert!(ledger.updates().unwrap().is_empty());
    }

    #[test]
    fn level_thresholds() {
        let ledger = TrustLedger::default();
        let (c, i) = ids();

        let r = ledger.record_acceptance(&ctx(), &c, &i).unwrap();
        assert_eq!((r.score, r.level), (1, TrustLevel::Medium));
        let r = ledger.record_settlement(&ctx(), &c, &i).unwrap();
        assert_eq!((r.score, r.level), (3, TrustLevel::High));

        for _ in 0..4 {
            ledger.record_rejection(&ctx(), &c, &i).unwrap();
        }
        let r = ledger.get_trust(&c, &i).unwrap();
        assert_eq!((r.score, r.level), (-1, TrustLevel::Low));
        assert_eq!((r.acceptances, r.rejections, r.settlements), (1, 4, 1));
    }

    #[test]
    fn only_level_changes_produce_updates() {
        let journal = Arc::new(AuditJournal::new());
        let ledger = TrustLedger::default().with_audit(journal.clone());
        let (c, i) = ids();

        ledger.record_acceptance(&ctx(), &c, &i).unwrap(); // 1 medium
        ledger.record_acceptance(&ctx(), &c, &i).unwrap(); // 2 medium
        ledger.record_acceptance(&ctx(), &c, &i).unwrap(); // 3 high
        ledger.record_rejection(&ctx(), &c, &i).unwrap(); // 2 medium

        let updates = ledger.updates().unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].previous_level, TrustLevel::Medium);
        assert_eq!(updates[0].new_level, TrustLevel::High);
        assert_eq!(updates[0].cause, TrustEvent::Acceptance);
        assert_eq!(updates[1].new_level, TrustLevel::Medium);
        assert_eq!(updates[1].cause, TrustEvent::Rejection);

        assert_eq!(journal.by_event_type(EventType::TrustUpdated).unwrap().len(), 2);
        assert_eq!(ledger.updates_for(&c).unwrap().len(), 2);
        assert!(ledger.updates_for(&CircleId::new("z")).unwrap().is_empty());
    }

    #[test]
    fn returned_records_are_snapshots() {
        let ledger = TrustLedger::default();
        let (c, i) = ids();
        let mut snapshot = ledger.record_acceptance(&ctx(), &c, &i).unwrap();
        snapshot.score = 100;
        assert_eq!(ledger.get_trust(&c, &i).unwrap().score, 1);
    }

    #[test]
    fn pairs_are_independent() {
        let ledger = TrustLedger::default();
        let c = CircleId::new("a");
        ledger
            .record_rejection(&ctx(), &c, &IntersectionId::new("one"))
            .unwrap();
        assert_eq!(
            ledger.get_trust(&c, &IntersectionId::new("two")).unwrap().score,
            0
        );
    }

    #[test]
    fn cancelled_context_records_nothing() {
        let ledger = TrustLedger::default();
        let (c, i) = ids();
        let cancelled = OperationContext::background();
        cancelled.cancel();
        assert!(ledger.record_settlement(&cancelled, &c, &i).is_err());
        assert_eq!(ledger.get_trust(&c, &i).unwrap().settlements, 0);
    }

    #[test]
    fn record_all_covers_every_circle() {
        let journal = Arc::new(AuditJournal::new());
        let ledger = TrustLedger::default().with_audit(journal.clone());
        let i = IntersectionId::new("i");
        let circles = vec![CircleId::new("a"), CircleId::new("b"), CircleId::new("c")];

        ledger.record_all(&circles, &i, TrustEvent::Settlement).unwrap();
        let records = ledger
            .record_all(&circles, &i, TrustEvent::Settlement)
            .unwrap();

        assert_eq!(records.len(), 3);
        for (record, circle) in records.iter().zip(&circles) {
            assert_eq!(&record.circle_id, circle);
            assert_eq!((record.score, record.settlements), (4, 2));
            assert_eq!(record.level, TrustLevel::High);
        }
        assert_eq!(ledger.updates().unwrap().len(), 3);
        assert_eq!(journal.by_event_type(EventType::TrustUpdated).unwrap().len(), 3);
    }

    proptest! {
        #[test]
        fn rejections_never_increase_score(
            start in prop::collection::vec(0u8..3, 0..10),
            n in 1usize..20,
        ) {
            let ledger = TrustLedger::default();
            let (c, i) = ids();
            for e in start {
                let event = match e {
                    0 => TrustEvent::Acceptance,
                    1 => TrustEvent::Rejection,
                    _ => TrustEvent::Settlement,
                };
                ledger.record(&ctx(), &c, &i, event).unwrap();
            }

            let mut last = ledger.get_trust(&c, &i).unwrap().score;
            for _ in 0..n {
                let score = ledger.record_rejection(&ctx(), &c, &i).unwrap().score;
                prop_assert!(score <= last);
                last = score;
            }

            let before = ledger.get_trust(&c, &i).unwrap().score;
            let after = ledger.record_settlement(&ctx(), &c, &i).unwrap().score;
            prop_assert_eq!(after, before + 2);
        }
    }
}
