//! Reconciliation report

use chrono::{DateTime, Utc};
use serde::Serialize;
use slotpool_core::{AuditAction, SlotId};
use std::collections::BTreeMap;

/// Outcome of one [`crate::Reconciler::sweep`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Slots in the allocation store at sweep time
    pub slots_scanned: usize,
    /// Phase A: free slots with engine resources, forced assigned
    pub forced_from_resources: Vec<SlotId>,
    /// Phase B: free slots with metadata, owner recovered
    pub recovered_from_metadata: Vec<SlotId>,
    /// Phase C: engine tags that match no slot, with row counts
    pub orphans: BTreeMap<String, u64>,
    /// Phase C could not run
    pub orphan_scan_error: Option<String>,
    /// Phase D: idle assigned slots recorded as verified
    pub verified_empty: Vec<SlotId>,
    /// Empty assigned slots still inside the idle grace period
    pub recently_assigned: Vec<SlotId>,
    /// Ownership or integrity findings written as `suspicious`
    pub suspicious: Vec<SlotId>,
    /// Slots whose scan was inconclusive; kept out of the safe view
    pub scan_degraded: Vec<SlotId>,
    /// Planned corrections skipped because a concurrent acquire got there first
    pub superseded: Vec<SlotId>,
    /// Phase E: rows in the rebuilt safe view
    pub safe_view_size: usize,
    /// Audit entries written by this sweep, by action
    pub audit_written: BTreeMap<AuditAction, usize>,
}

impl ReconciliationReport {
    pub(crate) fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            slots_scanned: 0,
            forced_from_resources: Vec::new(),
            recovered_from_metadata: Vec::new(),
            orphans: BTreeMap::new(),
            orphan_scan_error: None,
            verified_empty: Vec::new(),
            recently_assigned: Vec::new(),
            suspicious: Vec::new(),
            scan_degraded: Vec::new(),
            superseded: Vec::new(),
            safe_view_size: 0,
            audit_written: BTreeMap::new(),
        }
    }

    /// Slots moved from free to assigned
    #[inline]
    #[must_use]
    pub fn total_corrections(&self) -> usize {
        self.forced_from_resources.len() + self.recovered_from_metadata.len()
    }

    /// Audit entries written by this sweep
    #[must_use]
    pub fn total_audit_entries(&self) -> usize {
        self.audit_written.values().sum()
    }

    /// Nothing corrected and nothing needing review
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.total_corrections() == 0
            && self.suspicious.is_empty()
            && self.orphans.is_empty()
            && self.scan_degraded.is_empty()
    }

    /// Whether the sweep wrote anything an operator should look at
    #[must_use]
    pub fn needs_review(&self) -> bool {
        self.audit_written.keys().any(AuditAction::needs_review) || !self.orphans.is_empty()
    }

    pub(crate) fn record_audit(&mut self, action: AuditAction) {
        *self.audit_written.entry(action).or_default() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotpool_core::now;

    #[test]
    fn totals_and_json_shape() {
        let mut report = ReconciliationReport::new(now());
        report.forced_from_resources.push(SlotId::from("a"));
        report.recovered_from_metadata.push(SlotId::from("b"));
        report.record_audit(AuditAction::Warning);
        report.record_audit(AuditAction::Warning);

        assert_eq!(report.total_corrections(), 2);
        assert_eq!(report.total_audit_entries(), 2);
        assert!(!report.is_clean());
        assert!(report.needs_review());

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["audit_written"]["warning"], 2);
        assert_eq!(value["forced_from_resources"][0], "a");
    }

    #[test]
    fn empty_report_is_clean() {
        let report = ReconciliationReport::new(now());
        assert!(report.is_clean());
        assert!(!report.needs_review());
    }
}
