//! Allocator: hand out one verified-free slot per call
//!
//! `acquire` reads up to K candidates from the safe view, re-verifies each
//! against every occupancy signal, and commits the first survivor in a
//! single immediate transaction whose slot update only matches a row that is
//! still free. Losing that race is not an error; the next candidate is tried.

use crate::{
    error::AllocationError,
    placement::placement_order,
    verification::{verify_candidate, Rejection},
};
use serde_json::json;
use slotpool_core::{
    now, AllocatorConfig, AssignedBy, AuditAction, AuditEntry, ProjectId, Slot, SlotId,
    SlotMetadata, UserId,
};
use slotpool_scanner::ContentScanner;
use slotpool_store::{audit, metadata, slots, view, SlotStore, StoreError};

/// Slot allocator over an injected store and scanner
#[derive(Debug, Clone)]
pub struct Allocator {
    store: SlotStore,
    scanner: ContentScanner,
    config: AllocatorConfig,
}

impl Allocator {
    /// Create new allocator with default tuning
    #[must_use]
    pub fn new(store: SlotStore, scanner: ContentScanner) -> Self {
        Self {
            store,
            scanner,
            config: AllocatorConfig::default(),
        }
    }

    /// Set allocator configuration
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: AllocatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Assign a free slot in `project_id` to `user_id`
    ///
    /// # Errors
    /// - [`AllocationError::NoAvailableSlots`] when all K candidates were
    ///   rejected or lost to concurrent winners
    /// - [`AllocationError::Store`] on store failure, including a store that
    ///   stayed locked past its busy timeout
    pub fn acquire(
        &self,
        user_id: &UserId,
        project_id: &ProjectId,
    ) -> Result<Slot, AllocationError> {
        let limit = self.config.candidate_limit;
        let candidates = self
            .store
            .read(|c| Ok(view::candidates(c, project_id, limit)?))?;
        tracing::debug!(
            "Acquire for {} in {}: {} candidate(s)",
            user_id,
            project_id,
            candidates.len()
        );

        for slot_id in &candidates {
            if let Some(rejection) = verify_candidate(&self.store, &self.scanner, slot_id)? {
                self.reject(slot_id, &rejection)?;
                continue;
            }

            match self.commit(slot_id, project_id, user_id) {
                Ok(slot) => {
                    tracing::info!("Assigned slot {} to user {}", slot_id, user_id);
                    return Ok(slot);
                }
                Err(e) if e.is_conflict() => {
                    tracing::debug!("Lost slot {} to a concurrent writer: {}", slot_id, e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!("No available slots in {} for user {}", project_id, user_id);
        Err(AllocationError::NoAvailableSlots {
            project: Some(project_id.clone()),
        })
    }

    /// Assign a slot in whichever project the placement policy prefers
    ///
    /// # Errors
    /// [`AllocationError::NoAvailableSlots`] when every project is exhausted
    pub fn acquire_any(&self, user_id: &UserId) -> Result<Slot, AllocationError> {
        let capacities = self.store.capacities()?;
        for project_id in placement_order(&capacities) {
            match self.acquire(user_id, &project_id) {
                Err(e) if e.is_exhausted() => continue,
                other => return other,
            }
        }
        Err(AllocationError::NoAvailableSlots { project: None })
    }

    /// Slots currently held by `user_id`
    ///
    /// # Errors
    /// Returns error on store failure
    pub fn slot_for_user(&self, user_id: &UserId) -> Result<Vec<Slot>, AllocationError> {
        Ok(self.store.slots_for_user(user_id)?)
    }

    /// Note that the tenant created a workflow in `slot_id`
    ///
    /// # Errors
    /// Returns error if the slot has no metadata or the store fails
    pub fn record_workflow_created(&self, slot_id: &SlotId) -> Result<(), AllocationError> {
        Ok(self.store.record_workflow_created(slot_id)?)
    }

    /// Drop a rejected candidate from the view. Only ever makes a slot look
    /// less available.
    fn reject(&self, slot_id: &SlotId, rejection: &Rejection) -> Result<(), StoreError> {
        tracing::warn!("Rejected candidate {}: {}", slot_id, rejection);
        self.store.write(|c| Ok(view::remove(c, slot_id)?))?;
        Ok(())
    }

    fn commit(
        &self,
        slot_id: &SlotId,
        project_id: &ProjectId,
        user_id: &UserId,
    ) -> Result<Slot, StoreError> {
        self.store.write(|c| {
            let at = now();
            if !slots::mark_assigned_if_free(c, slot_id, user_id, &at)? {
                return Err(StoreError::Conflict(slot_id.clone()));
            }

            let meta =
                SlotMetadata::new(slot_id.clone(), user_id.clone(), at, AssignedBy::Allocator);
            metadata::insert(c, &meta).map_err(|e| {
                let e = StoreError::from(e);
                if e.is_constraint_violation() {
                    StoreError::Conflict(slot_id.clone())
                } else {
                    e
                }
            })?;

            let entry = AuditEntry::new(
                slot_id.clone(),
                AuditAction::Assigned,
                json!({ "project_id": project_id, "assigned_by": AssignedBy::Allocator.as_str() }),
            )
            .with_user(user_id.clone())
            .at(at);
            audit::append(c, &entry)?;
            view::remove(c, slot_id)?;

            slots::get(c, slot_id)?.ok_or_else(|| StoreError::SlotNotFound(slot_id.clone()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotpool_test_utils::{seed_metadata, seed_project, FakeEngine};

    fn setup(count: usize) -> (SlotStore, FakeEngine, Allocator, Vec<SlotId>) {
        let store = SlotStore::open_in_memory().unwrap();
        let ids = seed_project(&store, "p", count);
        store.write(|c| Ok(view::replace(c, &ids, &now())?)).unwrap();
        let engine = FakeEngine::new();
        let allocator = Allocator::new(store.clone(), ContentScanner::new(engine.clone()));
        (store, engine, allocator, ids)
    }

    #[test]
    fn commit_writes_all_three_stores() {
        let (store, _, allocator, ids) = setup(1);
        let user = UserId::from("alice");

        let slot = allocator.acquire(&user, &ProjectId::from("p")).unwrap();
        assert_eq!(slot.slot_id, ids[0]);
        assert_eq!(slot.user_id(), Some(&user));

        let meta = store.metadata(&ids[0]).unwrap().unwrap();
        assert_eq!(meta.owner_user_id, user);
        assert_eq!(meta.assigned_by, AssignedBy::Allocator);
        let history = store.audit_for_slot(&ids[0]).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, AuditAction::Assigned);
        assert!(store.safe_view().unwrap().is_empty());
    }

    #[test]
    fn stale_view_entries_are_rejected_and_dropped() {
        let (store, engine, allocator, ids) = setup(3);
        engine.tag(&ids[0], 1);
        seed_metadata(&store, &ids[1], "ghost", AssignedBy::Human);
        let scanner = ContentScanner::new(engine.clone());
        assert_eq!(
            verify_candidate(&store, &scanner, &ids[0]).unwrap(),
            Some(Rejection::ResourcesPresent(1))
        );
        assert_eq!(
            verify_candidate(&store, &scanner, &ids[1]).unwrap(),
            Some(Rejection::MetadataPresent)
        );

        let slot = allocator.acquire(&UserId::from("u"), &ProjectId::from("p")).unwrap();
        assert_eq!(slot.slot_id, ids[2]);
        assert!(store.safe_view().unwrap().is_empty());
        assert!(!store.slot(&ids[0]).unwrap().is_assigned());
    }

    #[test]
    fn audited_assignment_blocks_reuse() {
        let (store, _, allocator, ids) = setup(2);
        store
            .write(|c| {
                let entry = AuditEntry::new(ids[0].clone(), AuditAction::Assigned, json!({}))
                    .with_user(UserId::from("previous"));
                Ok(audit::append(c, &entry)?)
            })
            .unwrap();

        let slot = allocator.acquire(&UserId::from("u"), &ProjectId::from("p")).unwrap();
        assert_eq!(slot.slot_id, ids[1]);
        assert!(!store.slot(&ids[0]).unwrap().is_assigned());
        assert!(store.metadata(&ids[0]).unwrap().is_none());
        assert!(store.safe_view().unwrap().is_empty());
    }

    #[test]
    fn candidate_limit_bounds_attempts() {
        let (_, engine, allocator, ids) = setup(3);
        engine.tag(&ids[0], 1);
        engine.tag(&ids[1], 1);
        let allocator = allocator.with_config(AllocatorConfig { candidate_limit: 2 });

        let err = allocator.acquire(&UserId::from("u"), &ProjectId::from("p")).unwrap_err();
        assert!(err.is_exhausted());
    }

    #[test]
    fn workflow_counter_requires_assignment() {
        let (_, _, allocator, ids) = setup(1);
        assert!(allocator.record_workflow_created(&ids[0]).is_err());
        allocator.acquire(&UserId::from("u"), &ProjectId::from("p")).unwrap();
        allocator.record_workflow_created(&ids[0]).unwrap();
        assert_eq!(allocator.slot_for_user(&UserId::from("u")).unwrap().len(), 1);
    }
}
