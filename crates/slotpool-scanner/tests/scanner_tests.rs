//! Scanner integration tests: file-backed engine and the shared fake

use pretty_assertions::assert_eq;
use rusqlite::Connection;
use slotpool_core::{EngineSchema, SlotId};
use slotpool_scanner::{ContentScanner, ScanOutcome, SqliteEngine};
use slotpool_test_utils::FakeEngine;
use std::collections::BTreeSet;

#[test]
fn scans_engine_file_read_only() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("engine.db");
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE runs (id INTEGER PRIMARY KEY, tenant_slot TEXT);
             INSERT INTO runs (tenant_slot) VALUES ('p-1'), ('p-1'), ('stray');",
        )
        .unwrap();
    }

    let engine = SqliteEngine::open(&path, EngineSchema::new("runs", "tenant_slot")).unwrap();
    let scanner = ContentScanner::new(engine);

    assert_eq!(scanner.scan(&SlotId::from("p-1")), ScanOutcome::Count(2));
    assert!(scanner.scan(&SlotId::from("p-2")).is_provably_empty());

    let known = BTreeSet::from([SlotId::from("p-1"), SlotId::from("p-2")]);
    let orphans = scanner.orphan_tags(&known).unwrap();
    assert_eq!(orphans.keys().collect::<Vec<_>>(), vec!["stray"]);
}

#[test]
fn missing_engine_file_is_unreachable() {
    let dir = tempfile::TempDir::new().unwrap();
    let result = SqliteEngine::open(dir.path().join("absent.db"), EngineSchema::default());
    assert!(matches!(result, Err(slotpool_core::EngineError::Unreachable(_))));
}

#[test]
fn fake_engine_outage_is_never_free() {
    let engine = FakeEngine::new();
    let scanner = ContentScanner::new(engine.clone());
    let slot = SlotId::from("p-1");

    assert!(scanner.scan(&slot).is_provably_empty());

    engine.set_unreachable(true);
    assert!(scanner.scan(&slot).might_be_occupied());
    assert!(scanner.orphan_tags(&BTreeSet::new()).is_err());

    engine.set_unreachable(false);
    engine.set_table_missing(true);
    let outcomes = scanner.scan_many(&[slot.clone()]);
    assert!(matches!(outcomes[&slot], ScanOutcome::Unknown(_)));
}
