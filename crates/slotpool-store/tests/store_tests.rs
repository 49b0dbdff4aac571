//! Store integration tests against a file-backed database
//!
//! Run with: cargo test --package slotpool-store --test store_tests

use pretty_assertions::assert_eq;
use slotpool_core::{now, AuditAction, AuditEntry, SlotId, UserId};
use slotpool_store::{audit, slots, view, StoreError, StoreSnapshot};
use slotpool_test_utils::{seed_project, temp_store};
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn conditional_assignment_has_one_winner_across_connections() {
    let fixture = temp_store();
    seed_project(&fixture.store, "p", 1);
    let slot = SlotId::from("p-1");
    let winners = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for i in 0..8 {
            let store = fixture.reopen();
            let slot = slot.clone();
            let winners = &winners;
            scope.spawn(move || {
                let user = UserId::new(format!("user-{i}"));
                let won = store
                    .write(|c| Ok(slots::mark_assigned_if_free(c, &slot, &user, &now())?))
                    .unwrap();
                if won {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert!(fixture.store.slot(&slot).unwrap().is_assigned());
}

#[test]
fn state_survives_reopen() {
    let fixture = temp_store();
    let ids = seed_project(&fixture.store, "p", 3);
    fixture
        .store
        .write(|c| {
            view::replace(c, &ids, &now())?;
            let entry =
                AuditEntry::new(ids[0].clone(), AuditAction::Verified, serde_json::json!({}));
            audit::append(c, &entry)?;
            Ok(())
        })
        .unwrap();

    let reopened = fixture.reopen();
    assert_eq!(reopened.slots().unwrap().len(), 3);
    assert_eq!(reopened.safe_view().unwrap().len(), 3);
    assert_eq!(reopened.audit_log().unwrap().len(), 1);
}

#[test]
fn guarded_failure_leaves_file_untouched() {
    let fixture = temp_store();
    let ids = seed_project(&fixture.store, "p", 2);
    let before = fixture
        .store
        .read(|c| Ok(<StoreSnapshot as slotpool_store::Snapshot>::capture(c)?))
        .unwrap();

    let err = fixture
        .store
        .guarded(|c| {
            for id in &ids {
                slots::mark_assigned_if_free(c, id, &UserId::from("bulk"), &now())?;
            }
            Err::<(), _>(StoreError::Conflict(ids[1].clone()))
        })
        .unwrap_err();
    assert!(!err.is_fatal());

    let after = fixture
        .reopen()
        .read(|c| Ok(<StoreSnapshot as slotpool_store::Snapshot>::capture(c)?))
        .unwrap();
    assert_eq!(after, before);
}
