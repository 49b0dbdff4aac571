//! Bulk pool provisioning

use crate::reconciler::rebuild_safe_view;
use serde::Serialize;
use slotpool_core::PoolLayout;
use slotpool_scanner::ContentScanner;
use slotpool_store::{slots, SlotStore, StoreError};

/// What a provisioning run changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProvisionSummary {
    /// Slots described by the layout
    pub requested: usize,
    /// Slots newly inserted
    pub created: usize,
    /// Rows in the safe view afterwards
    pub safe_view_size: usize,
}

/// Insert every slot of `layout` that does not exist yet, then rebuild the
/// safe view. Idempotent; existing slots are never touched.
///
/// # Errors
/// Store errors from the guarded insert or the view rebuild
pub fn provision_pool(
    store: &SlotStore,
    scanner: &ContentScanner,
    layout: &PoolLayout,
) -> Result<ProvisionSummary, StoreError> {
    let ids = layout.slot_ids();
    let created = store.guarded(|c| {
        let mut created = 0usize;
        for (project_id, slot_id) in &ids {
            if slots::insert_if_missing(c, slot_id, project_id)? {
                created += 1;
            }
        }
        Ok(created)
    })?;
    tracing::info!(
        "Provisioned pool: {} of {} slot(s) created across {} project(s)",
        created,
        ids.len(),
        layout.project_count
    );

    let safe_view_size = rebuild_safe_view(store, scanner)?;
    Ok(ProvisionSummary {
        requested: ids.len(),
        created,
        safe_view_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotpool_core::UserId;
    use slotpool_test_utils::{force_assign, seed_layout, FakeEngine};

    #[test]
    fn provisioning_is_idempotent() {
        let store = SlotStore::open_in_memory().unwrap();
        let scanner = ContentScanner::new(FakeEngine::new());
        let layout = PoolLayout::new("proj", 2, 3);

        let first = provision_pool(&store, &scanner, &layout).unwrap();
        assert_eq!((first.requested, first.created, first.safe_view_size), (6, 6, 6));

        let second = provision_pool(&store, &scanner, &layout).unwrap();
        assert_eq!((second.created, second.safe_view_size), (0, 6));
        assert_eq!(store.capacities().unwrap().len(), 2);
    }

    #[test]
    fn occupied_slots_stay_out_of_view() {
        let store = SlotStore::open_in_memory().unwrap();
        let engine = FakeEngine::new();
        let layout = PoolLayout::new("proj", 1, 2);
        let (_, first) = layout.slot_ids().remove(0);
        engine.tag(&first, 4);

        let summary = provision_pool(&store, &ContentScanner::new(engine), &layout).unwrap();
        assert_eq!(summary.safe_view_size, 1);
        assert!(store.safe_view().unwrap().iter().all(|s| s.slot_id != first));
    }

    #[test]
    fn growing_a_pool_keeps_existing_slots() {
        let store = SlotStore::open_in_memory().unwrap();
        let scanner = ContentScanner::new(FakeEngine::new());
        seed_layout(&store, &PoolLayout::new("proj", 1, 3));
        let (_, held) = PoolLayout::new("proj", 1, 3).slot_ids().remove(0);
        force_assign(&store, &held, "alice");

        let summary = provision_pool(&store, &scanner, &PoolLayout::new("proj", 2, 3)).unwrap();
        assert_eq!((summary.requested, summary.created, summary.safe_view_size), (6, 3, 5));
        assert_eq!(store.slot(&held).unwrap().user_id(), Some(&UserId::from("alice")));
    }
}
