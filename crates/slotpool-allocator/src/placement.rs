//! Placement policy: which project to try first
//!
//! Least-assigned project first, ties broken by project id. With equal pool
//! sizes this deals slots out round-robin. Placement only spreads load;
//! correctness never depends on it.

use slotpool_core::{ProjectCapacity, ProjectId};

/// Projects with free capacity, in the order `acquire_any` should try them
#[must_use]
pub fn placement_order(capacities: &[ProjectCapacity]) -> Vec<ProjectId> {
    let mut open: Vec<&ProjectCapacity> = capacities.iter().filter(|c| c.free() > 0).collect();
    open.sort_by(|a, b| {
        a.assigned
            .cmp(&b.assigned)
            .then_with(|| a.project_id.cmp(&b.project_id))
    });
    open.into_iter().map(|c| c.project_id.clone()).collect()
}
