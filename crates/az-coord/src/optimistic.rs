//! Optimistic status mutations with rollback and refresh reconciliation.

use std::collections::HashMap;

use az_core::types::{BeadId, BeadStatus};
use az_store::Bead;

/// One pending status mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimisticRecord {
    /// Status before the mutation, for rollback
    pub pre: BeadStatus,
    /// Status the UI renders while the mutation is in flight
    pub target: BeadStatus,
}

/// Table of pending optimistic status mutations, keyed by bead id.
#[derive(Debug, Clone, Default)]
pub struct OptimisticTable {
    records: HashMap<BeadId, OptimisticRecord>,
}

impl OptimisticTable {
    /// Record a pending mutation. A second move on the same bead keeps the
    /// original pre-image so rollback restores the true backend state.
    pub fn record(&mut self, id: BeadId, pre: BeadStatus, target: BeadStatus) {
        match self.records.get_mut(&id) {
            Some(existing) => existing.target = target,
            None => {
                self.records.insert(id, OptimisticRecord { pre, target });
            }
        }
    }

    /// Pending record for a bead.
    pub fn get(&self, id: &BeadId) -> Option<&OptimisticRecord> {
        self.records.get(id)
    }

    /// Whether any mutation is pending for a bead.
    pub fn is_pending(&self, id: &BeadId) -> bool {
        self.records.contains_key(id)
    }

    /// Remove and return a record (mutation settled).
    pub fn clear(&mut self, id: &BeadId) -> Option<OptimisticRecord> {
        self.records.remove(id)
    }

    /// Number of pending records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no mutation is pending.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Overlay pending targets onto a snapshot so the UI renders in-flight
    /// moves.
    pub fn overlay(&self, beads: &mut [Bead]) {
        for bead in beads {
            if let Some(record) = self.records.get(&bead.id) {
                bead.status = record.target;
            }
        }
    }

    /// Reconcile against a fresh snapshot: a record whose observed status
    /// equals its target has settled and is cleared; others stay pending.
    /// Idempotent: reconciling the same snapshot twice is a no-op the
    /// second time.
    pub fn reconcile(&mut self, beads: &[Bead]) {
        let observed: HashMap<&BeadId, BeadStatus> =
            beads.iter().map(|b| (&b.id, b.status)).collect();
        self.records.retain(|id, record| match observed.get(id) {
            Some(status) => *status != record.target,
            // Bead vanished from the snapshot: nothing left to reconcile
            None => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use az_store::bead::test_support::bead;

    #[test]
    fn test_record_and_clear() {
        let mut table = OptimisticTable::default();
        table.record("az-1".into(), BeadStatus::Open, BeadStatus::InProgress);
        assert!(table.is_pending(&"az-1".to_string()));

        let record = table.clear(&"az-1".to_string()).unwrap();
        assert_eq!(record.pre, BeadStatus::Open);
        assert_eq!(record.target, BeadStatus::InProgress);
        assert!(table.is_empty());
    }

    #[test]
    fn test_second_move_keeps_original_pre_image() {
        let mut table = OptimisticTable::default();
        table.record("az-1".into(), BeadStatus::Open, BeadStatus::InProgress);
        table.record("az-1".into(), BeadStatus::InProgress, BeadStatus::Review);

        let record = table.get(&"az-1".to_string()).unwrap();
        assert_eq!(record.pre, BeadStatus::Open);
        assert_eq!(record.target, BeadStatus::Review);
    }

    #[test]
    fn test_overlay_applies_targets() {
        let mut table = OptimisticTable::default();
        table.record("az-1".into(), BeadStatus::Open, BeadStatus::InProgress);

        let mut beads = vec![
            bead("az-1", "a", BeadStatus::Open),
            bead("az-2", "b", BeadStatus::Open),
        ];
        table.overlay(&mut beads);
        assert_eq!(beads[0].status, BeadStatus::InProgress);
        assert_eq!(beads[1].status, BeadStatus::Open);
    }

    #[test]
    fn test_reconcile_clears_settled() {
        let mut table = OptimisticTable::default();
        table.record("az-1".into(), BeadStatus::Open, BeadStatus::InProgress);
        table.record("az-2".into(), BeadStatus::Open, BeadStatus::Done);

        let beads = vec![
            bead("az-1", "a", BeadStatus::InProgress), // settled
            bead("az-2", "b", BeadStatus::Open),       // still pending
        ];
        table.reconcile(&beads);
        assert!(!table.is_pending(&"az-1".to_string()));
        assert!(table.is_pending(&"az-2".to_string()));
    }

    #[test]
    fn test_reconcile_idempotent() {
        let mut table = OptimisticTable::default();
        table.record("az-1".into(), BeadStatus::Open, BeadStatus::InProgress);
        table.record("az-2".into(), BeadStatus::Open, BeadStatus::Done);

        let beads = vec![
            bead("az-1", "a", BeadStatus::InProgress),
            bead("az-2", "b", BeadStatus::Open),
        ];
        table.reconcile(&beads);
        let after_once: Vec<_> = {
            let mut ids: Vec<_> = table.records.keys().cloned().collect();
            ids.sort();
            ids
        };
        table.reconcile(&beads);
        let after_twice: Vec<_> = {
            let mut ids: Vec<_> = table.records.keys().cloned().collect();
            ids.sort();
            ids
        };
        assert_eq!(after_once, after_twice);
    }

    #[test]
    fn test_reconcile_drops_vanished_beads() {
        let mut table = OptimisticTable::default();
        table.record("az-9".into(), BeadStatus::Open, BeadStatus::Done);
        table.reconcile(&[]);
        assert!(table.is_empty());
    }
}
