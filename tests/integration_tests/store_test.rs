//! Object and resource store integration tests
//!
//! Runs against file-backed databases to cover what in-memory unit tests
//! cannot: state surviving a reopen and writes from several threads.

use std::sync::Arc;

use minion::models::{Coordinate, Identity, ObjectKind, ScanObject, StatusEntry};
use minion::storage::{ObjectStore, ResourceStore, SqliteStore};
use tempfile::TempDir;

/// Metres per degree of latitude
const M_PER_DEG: f64 = 111_195.0;

fn north_of(origin: Coordinate, metres: f64) -> Coordinate {
    Coordinate::new(origin.lat + metres / M_PER_DEG, origin.lng)
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("minion.db");
    let origin = Coordinate::new(0.0, 0.0);

    {
        let store = SqliteStore::open(&path).unwrap();
        store.add_identity(&Identity::new("ash", "pikachu")).unwrap();
        store.add_egress(4).unwrap();
        store.claim_identity().unwrap();
        store.kill_egress(4).unwrap();
        store
            .write(&ScanObject::stronghold("gym", north_of(origin, 10.0), 2))
            .unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    let ash = store.get_identity("ash").unwrap().unwrap();
    assert!(ash.used);
    assert_eq!(ash.secret, "pikachu");
    assert!(store.get_egress(4).unwrap().unwrap().dead);
    assert_eq!(store.get("gym").unwrap().unwrap().team, Some(2));

    // Startup clears stale claims but keeps flags
    store.mark_all_unused().unwrap();
    assert!(!store.get_identity("ash").unwrap().unwrap().used);
    assert!(store.claim_egress().is_err());
}

#[test]
fn test_concurrent_writers_keep_ids_unique() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("minion.db")).unwrap());
    let origin = Coordinate::new(48.8566, 2.3522);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                let mut written = 0;
                for i in 0..20 {
                    let creature = ScanObject::creature(
                        format!("enc-{i}"),
                        1,
                        north_of(origin, i as f64),
                        i64::MAX / 2,
                    );
                    match store.write(&creature) {
                        Ok(()) => written += 1,
                        Err(e) => assert!(e.is_duplicate(), "unexpected error: {e}"),
                    }
                }
                written
            })
        })
        .collect();

    let written: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(written, 20);
    assert_eq!(store.count().unwrap(), 20);
}

// ============================================================================
// Area Queries
// ============================================================================

#[test]
fn test_query_radius_boundary() {
    let store = SqliteStore::in_memory().unwrap();
    let center = Coordinate::new(60.0, 25.0);
    let now = 1_700_000_000;

    store
        .write(&ScanObject::creature("inside", 1, north_of(center, 990.0), now + 60))
        .unwrap();
    store
        .write(&ScanObject::creature("outside", 1, north_of(center, 1010.0), now + 60))
        .unwrap();

    // East-west the degree box is wider at high latitudes
    let east = Coordinate::new(60.0, 25.0 + 1500.0 / (M_PER_DEG * 0.5));
    store
        .write(&ScanObject::checkpoint("east-far", east, false))
        .unwrap();

    let found = store
        .query_at(center, 1000.0, &ObjectKind::ALL, now)
        .unwrap();
    let ids: Vec<&str> = found.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec!["inside"]);

    for object in &found {
        assert!(center.distance_m(&object.coordinate()) <= 1000.0);
    }
}

#[test]
fn test_query_expiry_is_exclusive_of_now() {
    let store = SqliteStore::in_memory().unwrap();
    let center = Coordinate::new(0.0, 0.0);
    let now = 1_700_000_000;

    store
        .write(&ScanObject::creature("now", 1, center, now))
        .unwrap();
    store
        .write(&ScanObject::creature("later", 1, center, now + 1))
        .unwrap();

    let found = store
        .query_at(center, 10.0, &[ObjectKind::Creature], now)
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "later");
}

// ============================================================================
// Reconciliation
// ============================================================================

#[test]
fn test_reconcile_restores_assignments() {
    let store = SqliteStore::in_memory().unwrap();
    for name in ["ash", "misty", "brock"] {
        store.add_identity(&Identity::new(name, "x")).unwrap();
    }
    for id in 1..=3 {
        store.add_egress(id).unwrap();
    }

    let snapshot = vec![
        StatusEntry {
            account_name: "misty".into(),
            proxy_id: 2,
        },
        StatusEntry {
            account_name: "brock".into(),
            proxy_id: 3,
        },
    ];
    store.reconcile(&snapshot).unwrap();

    assert!(!store.get_identity("ash").unwrap().unwrap().used);
    assert!(store.get_identity("misty").unwrap().unwrap().used);
    assert!(!store.get_egress(1).unwrap().unwrap().in_use);
    assert!(store.get_egress(3).unwrap().unwrap().in_use);

    assert_eq!(store.claim_identity().unwrap().name, "ash");
    assert_eq!(store.claim_egress().unwrap().id, 1);
}
