//! End-to-end onboarding and drift scenarios

use pretty_assertions::assert_eq;
use slotpool_allocator::{provision_pool, rebuild_safe_view, Allocator, Reconciler};
use slotpool_core::{AuditAction, PoolLayout, ProjectId, SlotId, SlotpoolConfig, UserId};
use slotpool_scanner::ContentScanner;
use slotpool_store::SlotStore;
use slotpool_test_utils::{seed_project, FakeEngine};

struct Harness {
    store: SlotStore,
    engine: FakeEngine,
    allocator: Allocator,
    reconciler: Reconciler,
}

impl Harness {
    fn with_slots(count: usize) -> (Self, Vec<SlotId>) {
        let store = SlotStore::open_in_memory().unwrap();
        let engine = FakeEngine::new();
        let ids = seed_project(&store, "p", count);
        let scanner = ContentScanner::new(engine.clone());
        rebuild_safe_view(&store, &scanner).unwrap();
        let harness = Self {
            allocator: Allocator::new(store.clone(), scanner.clone()),
            reconciler: Reconciler::new(store.clone(), scanner),
            store,
            engine,
        };
        (harness, ids)
    }

    fn acquire(&self, user: &str) -> Result<SlotId, slotpool_allocator::AllocationError> {
        self.allocator
            .acquire(&UserId::from(user), &ProjectId::from("p"))
            .map(|slot| slot.slot_id)
    }
}

#[test]
fn two_slots_three_users() {
    let (h, ids) = Harness::with_slots(2);

    assert_eq!(h.acquire("userA").unwrap(), ids[0]);
    assert_eq!(h.acquire("userB").unwrap(), ids[1]);
    assert!(h.acquire("userC").unwrap_err().is_exhausted());
}

#[test]
fn drifted_slot_is_healed_and_never_handed_out() {
    let (h, ids) = Harness::with_slots(2);
    h.engine.tag(&ids[0], 2);

    let report = h.reconciler.sweep().unwrap();
    assert!(h.store.slot(&ids[0]).unwrap().is_assigned());
    assert_eq!(report.audit_written.get(&AuditAction::Warning), Some(&1));
    assert_eq!(report.total_audit_entries(), 1);

    assert_eq!(h.acquire("userA").unwrap(), ids[1]);
    assert!(h.acquire("userB").unwrap_err().is_exhausted());
}

#[test]
fn sweep_right_after_acquire_is_silent() {
    let (h, ids) = Harness::with_slots(1);
    assert_eq!(h.acquire("userA").unwrap(), ids[0]);

    h.reconciler.sweep().unwrap();

    let slot = h.store.slot(&ids[0]).unwrap();
    assert_eq!(slot.user_id(), Some(&UserId::from("userA")));
    let history = h.store.audit_for_slot(&ids[0]).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, AuditAction::Assigned);
}

#[test]
fn provisioned_pool_is_dealt_round_robin() {
    let config = SlotpoolConfig::from_toml_str(
        r#"
        [pool]
        project_prefix = "proj"
        project_count = 3
        slots_per_project = 2
        "#,
    )
    .unwrap();
    let store = SlotStore::open_in_memory().unwrap();
    let scanner = ContentScanner::new(FakeEngine::new());
    provision_pool(&store, &scanner, &config.pool).unwrap();
    let allocator = Allocator::new(store.clone(), scanner).with_config(config.allocator.clone());

    let projects: Vec<ProjectId> = (0..6)
        .map(|i| {
            allocator
                .acquire_any(&UserId::new(format!("u{i}")))
                .unwrap()
                .project_id
        })
        .collect();
    let expected: Vec<ProjectId> = ["proj-01", "proj-02", "proj-03"]
        .repeat(2)
        .into_iter()
        .map(ProjectId::from)
        .collect();
    assert_eq!(projects, expected);

    let err = allocator.acquire_any(&UserId::from("late")).unwrap_err();
    assert!(err.is_exhausted());
    assert_eq!(err.to_string(), "no available slots in any project");
    assert_eq!(store.capacities().unwrap().iter().map(|c| c.free()).sum::<usize>(), 0);
    assert_eq!(config.pool, PoolLayout::new("proj", 3, 2));
}
