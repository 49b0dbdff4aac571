//! Four-layer candidate verification
//!
//! The safe view is only a hint. Before committing, each candidate is
//! re-checked against every occupancy signal:
//! 1. Allocation store says free
//! 2. Scanner proves zero tagged resources
//! 3. No metadata row
//! 4. Latest audit action is not `assigned`

use slotpool_core::{AuditAction, SlotId};
use slotpool_scanner::{ContentScanner, ScanOutcome};
use slotpool_store::{audit, metadata, slots, SlotStore, StoreError};
use std::fmt;

/// Why a candidate was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Slot no longer exists in the allocation store
    Missing,
    /// Allocation store already marks it assigned
    AlreadyAssigned,
    /// Engine rows reference the slot
    ResourcesPresent(u64),
    /// Engine could not prove the slot empty
    ScanUnknown(String),
    /// A metadata row exists
    MetadataPresent,
    /// Latest audit entry records an assignment
    AuditShowsAssigned,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("slot missing from allocation store"),
            Self::AlreadyAssigned => f.write_str("allocation store marks slot assigned"),
            Self::ResourcesPresent(n) => write!(f, "{n} engine resource(s) reference slot"),
            Self::ScanUnknown(reason) => write!(f, "scan inconclusive: {reason}"),
            Self::MetadataPresent => f.write_str("metadata row exists"),
            Self::AuditShowsAssigned => f.write_str("latest audit action is assigned"),
        }
    }
}

/// Check one candidate. `Ok(None)` means it passed all four layers.
///
/// The scan runs outside the store lock so a slow engine does not block
/// other users of the same handle.
///
/// # Errors
/// Returns error on store failure
pub fn verify_candidate(
    store: &SlotStore,
    scanner: &ContentScanner,
    slot_id: &SlotId,
) -> Result<Option<Rejection>, StoreError> {
    match store.read(|c| Ok(slots::get(c, slot_id)?))? {
        None => return Ok(Some(Rejection::Missing)),
        Some(slot) if slot.is_assigned() => return Ok(Some(Rejection::AlreadyAssigned)),
        Some(_) => {}
    }

    match scanner.scan(slot_id) {
        ScanOutcome::Count(0) => {}
        ScanOutcome::Count(n) => return Ok(Some(Rejection::ResourcesPresent(n))),
        ScanOutcome::Unknown(reason) => return Ok(Some(Rejection::ScanUnknown(reason))),
    }

    store.read(|c| {
        if metadata::exists(c, slot_id)? {
            return Ok(Some(Rejection::MetadataPresent));
        }
        let latest = audit::latest_for_slot(c, slot_id)?;
        if latest.is_some_and(|e| e.action == AuditAction::Assigned) {
            return Ok(Some(Rejection::AuditShowsAssigned));
        }
        Ok(None)
    })
}
