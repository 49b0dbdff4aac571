//! Reconciler: detect drift against engine ground truth and heal toward occupied
//!
//! One sweep is a single bounded pass:
//! - **A** free slot with tagged engine rows: force assigned, `warning`
//! - **B** free slot with metadata: recover owner, force assigned, `warning`
//! - **C** engine tags matching no slot: reported only
//! - **D** assigned slot with no rows: `verified` once past the idle grace;
//!   never unassigned
//! - **E** rebuild the safe view
//!
//! Ownership mismatches and tampered metadata are written as `suspicious` and
//! left for an operator. Every correction is a conditional write executed
//! under the snapshot guard, so a slot that `acquire` took mid-sweep is
//! never overwritten, and no sweep ever frees a slot.

use crate::report::ReconciliationReport;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use slotpool_core::{
    now, AssignedBy, AuditAction, AuditEntry, ReconcilerConfig, Slot, SlotId, SlotMetadata, UserId,
};
use slotpool_scanner::{ContentScanner, ScanOutcome};
use slotpool_store::{audit, metadata, slots, view, Connection, SlotStore, StoreError};
use std::collections::{BTreeMap, BTreeSet};

/// Strengthening write planned from a free slot. The owner is resolved
/// under the guard, from whatever metadata exists at apply time.
#[derive(Debug, Clone)]
enum Correction {
    /// Phase A
    Resources { slot_id: SlotId, count: u64 },
    /// Phase B
    Metadata { slot_id: SlotId },
}

impl Correction {
    fn slot_id(&self) -> &SlotId {
        match self {
            Self::Resources { slot_id, .. } | Self::Metadata { slot_id } => slot_id,
        }
    }

    fn details(&self, from_metadata: bool) -> Value {
        match self {
            Self::Resources { count, .. } => json!({
                "phase": "A",
                "reason": "resources_present",
                "resource_count": count,
                "owner_source": if from_metadata { "metadata" } else { "unattributed" },
            }),
            Self::Metadata { .. } => json!({
                "phase": "B",
                "reason": "metadata_present",
            }),
        }
    }
}

/// Audit-only finding on a slot
#[derive(Debug, Clone)]
enum Finding {
    /// Phase D
    Verified {
        slot_id: SlotId,
        user_id: UserId,
        assigned_at: DateTime<Utc>,
        idle_secs: i64,
    },
    Suspicious {
        slot_id: SlotId,
        user_id: Option<UserId>,
        reason: &'static str,
        details: Value,
    },
}

#[derive(Debug, Default)]
struct Plan {
    corrections: Vec<Correction>,
    findings: Vec<Finding>,
    safe: Vec<SlotId>,
    degraded: Vec<SlotId>,
    recently_assigned: Vec<SlotId>,
}

/// Drift reconciler over an injected store and scanner
#[derive(Debug, Clone)]
pub struct Reconciler {
    store: SlotStore,
    scanner: ContentScanner,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create new reconciler with default tuning
    #[must_use]
    pub fn new(store: SlotStore, scanner: ContentScanner) -> Self {
        Self {
            store,
            scanner,
            config: ReconcilerConfig::default(),
        }
    }

    /// Set reconciler configuration
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Run all five phases once
    ///
    /// # Errors
    /// - [`StoreError::SnapshotFailed`]: nothing was written
    /// - [`StoreError::RollbackFailed`]: fatal, the store needs review
    /// - any other store error: the correction batch was rolled back
    pub fn sweep(&self) -> Result<ReconciliationReport, StoreError> {
        let started_at = now();
        let mut report = ReconciliationReport::new(started_at);

        let (all_slots, metas) = self.store.read(|c| {
            let metas: BTreeMap<SlotId, SlotMetadata> = metadata::list(c)?
                .into_iter()
                .map(|m| (m.slot_id.clone(), m))
                .collect();
            Ok((slots::list(c)?, metas))
        })?;
        report.slots_scanned = all_slots.len();

        let ids: Vec<SlotId> = all_slots.iter().map(|s| s.slot_id.clone()).collect();
        let scans = self.scanner.scan_many(&ids);
        let plan = self.plan(&all_slots, &metas, &scans, started_at);

        report.scan_degraded.clone_from(&plan.degraded);
        report.recently_assigned.clone_from(&plan.recently_assigned);
        for slot_id in &plan.degraded {
            tracing::warn!("Scan degraded for {}, excluding from safe view", slot_id);
        }

        self.store.guarded(|c| apply(c, &plan, &mut report))?;

        // Phase C
        let known: BTreeSet<SlotId> = ids.into_iter().collect();
        match self.scanner.orphan_tags(&known) {
            Ok(orphans) => {
                for (tag, rows) in &orphans {
                    tracing::warn!("Orphan engine resources: {} row(s) tagged {:?}", rows, tag);
                }
                report.orphans = orphans;
            }
            Err(e) => {
                tracing::warn!("Orphan scan skipped: {}", e);
                report.orphan_scan_error = Some(e.to_string());
            }
        }

        report.finished_at = now();
        tracing::info!(
            "Sweep finished: {} slot(s), {} correction(s), {} audit entr(ies), safe view {}",
            report.slots_scanned,
            report.total_corrections(),
            report.total_audit_entries(),
            report.safe_view_size
        );
        Ok(report)
    }

    fn plan(
        &self,
        all_slots: &[Slot],
        metas: &BTreeMap<SlotId, SlotMetadata>,
        scans: &BTreeMap<SlotId, ScanOutcome>,
        at: DateTime<Utc>,
    ) -> Plan {
        let grace = self.config.idle_grace();
        let mut plan = Plan::default();

        for slot in all_slots {
            let id = &slot.slot_id;
            let meta = metas.get(id);
            let scan = scans
                .get(id)
                .cloned()
                .unwrap_or_else(|| ScanOutcome::Unknown("not scanned".to_string()));
            if let ScanOutcome::Unknown(_) = scan {
                plan.degraded.push(id.clone());
            }

            if let Some(meta) = meta.filter(|m| !m.verify()) {
                plan.findings.push(Finding::Suspicious {
                    slot_id: id.clone(),
                    user_id: Some(meta.owner_user_id.clone()),
                    reason: "metadata_hash_mismatch",
                    details: json!({
                        "reason": "metadata_hash_mismatch",
                        "metadata_owner": meta.owner_user_id,
                    }),
                });
            }

            match &slot.assignment {
                None => match (&scan, meta) {
                    (ScanOutcome::Count(n), _) if *n > 0 => {
                        plan.corrections.push(Correction::Resources {
                            slot_id: id.clone(),
                            count: *n,
                        });
                    }
                    (_, Some(meta)) => {
                        plan.corrections.push(Correction::Metadata { slot_id: id.clone() });
                        // Recovery keeps the recorded assigned_at, so an idle
                        // slot is verified now rather than on the next sweep
                        let idle = at.signed_duration_since(meta.assigned_at);
                        if scan.is_provably_empty() && idle >= grace {
                            plan.findings.push(Finding::Verified {
                                slot_id: id.clone(),
                                user_id: meta.owner_user_id.clone(),
                                assigned_at: meta.assigned_at,
                                idle_secs: idle.num_seconds(),
                            });
                        }
                    }
                    (ScanOutcome::Count(_), None) => plan.safe.push(id.clone()),
                    (ScanOutcome::Unknown(_), None) => {}
                },
                Some(assignment) => {
                    if let Some(meta) = meta.filter(|m| m.owner_user_id != assignment.user_id) {
                        plan.findings.push(Finding::Suspicious {
                            slot_id: id.clone(),
                            user_id: Some(assignment.user_id.clone()),
                            reason: "owner_mismatch",
                            details: json!({
                                "reason": "owner_mismatch",
                                "slot_user": assignment.user_id,
                                "metadata_owner": meta.owner_user_id,
                            }),
                        });
                    }

                    if scan.is_provably_empty() {
                        let idle = at.signed_duration_since(assignment.assigned_at);
                        if idle >= grace {
                            plan.findings.push(Finding::Verified {
                                slot_id: id.clone(),
                                user_id: assignment.user_id.clone(),
                                assigned_at: assignment.assigned_at,
                                idle_secs: idle.num_seconds(),
                            });
                        } else {
                            plan.recently_assigned.push(id.clone());
                        }
                    }
                }
            }
        }
        plan
    }
}

/// Write the planned corrections and findings, then rebuild the view.
/// Runs inside the snapshot guard.
fn apply(
    c: &Connection,
    plan: &Plan,
    report: &mut ReconciliationReport,
) -> Result<(), StoreError> {
    let at = now();

    for correction in &plan.corrections {
        let slot_id = correction.slot_id();
        let recorded = metadata::get(c, slot_id)?;
        let (owner, assigned_at) = recorded.as_ref().map_or_else(
            || (UserId::unattributed(), at),
            |m| (m.owner_user_id.clone(), m.assigned_at),
        );
        if !slots::mark_assigned_if_free(c, slot_id, &owner, &assigned_at)? {
            tracing::info!("Slot {} was assigned concurrently, skipping correction", slot_id);
            report.superseded.push(slot_id.clone());
            continue;
        }
        if recorded.is_none() {
            let meta =
                SlotMetadata::new(slot_id.clone(), owner.clone(), at, AssignedBy::Reconciler);
            metadata::insert(c, &meta)?;
        }

        let details = correction.details(recorded.is_some());
        let entry = AuditEntry::new(slot_id.clone(), AuditAction::Warning, details)
            .with_user(owner.clone())
            .at(at);
        audit::append(c, &entry)?;
        report.record_audit(AuditAction::Warning);

        match correction {
            Correction::Resources { count, .. } => {
                tracing::warn!(
                    "Slot {} marked free but {} resource(s) reference it; assigned to {}",
                    slot_id,
                    count,
                    owner
                );
                report.forced_from_resources.push(slot_id.clone());
            }
            Correction::Metadata { .. } => {
                tracing::warn!(
                    "Slot {} marked free but has metadata; recovered owner {}",
                    slot_id,
                    owner
                );
                report.recovered_from_metadata.push(slot_id.clone());
            }
        }
    }

    for finding in &plan.findings {
        match finding {
            Finding::Verified {
                slot_id,
                user_id,
                assigned_at,
                idle_secs,
            } => {
                if report.superseded.contains(slot_id)
                    || recorded_since(c, slot_id, AuditAction::Verified, assigned_at)?
                {
                    continue;
                }
                let entry = AuditEntry::new(
                    slot_id.clone(),
                    AuditAction::Verified,
                    json!({ "phase": "D", "reason": "likely new user", "idle_secs": idle_secs }),
                )
                .with_user(user_id.clone())
                .at(at);
                audit::append(c, &entry)?;
                report.record_audit(AuditAction::Verified);
                report.verified_empty.push(slot_id.clone());
            }
            Finding::Suspicious {
                slot_id,
                user_id,
                reason,
                details,
            } => {
                if recorded_reason(c, slot_id, reason)? {
                    continue;
                }
                tracing::warn!("Suspicious slot {}: {}", slot_id, reason);
                let mut entry =
                    AuditEntry::new(slot_id.clone(), AuditAction::Suspicious, details.clone())
                        .at(at);
                if let Some(user_id) = user_id {
                    entry = entry.with_user(user_id.clone());
                }
                audit::append(c, &entry)?;
                report.record_audit(AuditAction::Suspicious);
                if !report.suspicious.contains(slot_id) {
                    report.suspicious.push(slot_id.clone());
                }
            }
        }
    }

    // Phase E
    report.safe_view_size = view::replace(c, &plan.safe, &at)?;
    Ok(())
}

fn recorded_since(
    c: &Connection,
    slot_id: &SlotId,
    action: AuditAction,
    since: &DateTime<Utc>,
) -> Result<bool, StoreError> {
    Ok(audit::for_slot(c, slot_id)?
        .iter()
        .any(|e| e.action == action && e.created_at >= *since))
}

fn recorded_reason(c: &Connection, slot_id: &SlotId, reason: &str) -> Result<bool, StoreError> {
    Ok(audit::for_slot(c, slot_id)?
        .iter()
        .any(|e| e.action == AuditAction::Suspicious && e.details["reason"] == reason))
}

/// Recompute the safe view from scratch: free, no metadata, provably empty
///
/// # Errors
/// Returns error on store failure
pub fn rebuild_safe_view(
    store: &SlotStore,
    scanner: &ContentScanner,
) -> Result<usize, StoreError> {
    let candidates: Vec<SlotId> = store.read(|c| {
        let with_meta: BTreeSet<SlotId> =
            metadata::list(c)?.into_iter().map(|m| m.slot_id).collect();
        Ok(slots::list(c)?
            .into_iter()
            .filter(|s| !s.is_assigned() && !with_meta.contains(&s.slot_id))
            .map(|s| s.slot_id)
            .collect())
    })?;

    let safe: Vec<SlotId> = scanner
        .scan_many(&candidates)
        .into_iter()
        .filter(|(_, outcome)| outcome.is_provably_empty())
        .map(|(id, _)| id)
        .collect();

    let written = store.write(|c| Ok(view::replace(c, &safe, &now())?))?;
    tracing::info!("Safe view rebuilt: {} of {} free slot(s)", written, candidates.len());
    Ok(written)
}
