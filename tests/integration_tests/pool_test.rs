//! Session pool integration tests
//!
//! Exercises exclusive checkout of identity + egress pairs under contention
//! and the cooldown between reuses of the same session.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use minion::pool::PoolError;
use minion::scanner::{ScanError, ScanSettings};
use minion::storage::ResourceStore;

use crate::common::{berlin, fast_settings, harness, settle, Call};

// ============================================================================
// Exclusive Checkout
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquire_never_shares_resources() {
    let h = harness(3, 3, fast_settings());
    let pool = Arc::clone(h.orchestrator.pool());

    let mut handles = Vec::new();
    for _ in 0..10 {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            pool.acquire_or_construct(Duration::from_millis(20)).await
        }));
    }

    let mut sessions = Vec::new();
    let mut exhausted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(session) => sessions.push(session),
            Err(e) => {
                assert!(e.is_exhausted(), "unexpected error: {e}");
                exhausted += 1;
            }
        }
    }

    assert_eq!(sessions.len(), 3);
    assert_eq!(exhausted, 7);

    let identities: HashSet<String> = sessions
        .iter()
        .map(|s| s.identity().name.clone())
        .collect();
    let egress: HashSet<i64> = sessions.iter().map(|s| s.egress().id).collect();
    assert_eq!(identities.len(), 3);
    assert_eq!(egress.len(), 3);

    let stats = h.store.identity_stats().unwrap();
    assert_eq!(stats.used, 3);
}

#[tokio::test]
async fn test_released_session_is_reused() {
    let h = harness(2, 2, fast_settings());
    let pool = h.orchestrator.pool();

    let session = pool.construct().unwrap();
    let name = session.identity().name.clone();
    pool.release(session, Duration::ZERO);
    settle().await;
    assert_eq!(pool.parked(), 1);

    let again = pool.acquire(Duration::from_millis(50)).await.unwrap();
    assert_eq!(again.identity().name, name);
    assert_eq!(pool.parked(), 0);

    // Nothing new was claimed from the store
    assert_eq!(h.store.identity_stats().unwrap().used, 1);
}

// ============================================================================
// Cooldown
// ============================================================================

#[tokio::test]
async fn test_cooldown_forces_a_second_identity() {
    let settings = ScanSettings {
        cooldown: Duration::from_millis(200),
        ..fast_settings()
    };
    let h = harness(2, 2, settings);

    h.orchestrator.scan(berlin()).await.unwrap();
    h.orchestrator.scan(berlin()).await.unwrap();

    let calls = h.remote.calls();
    let fetched_by: Vec<String> = calls
        .iter()
        .filter_map(|call| match call {
            Call::Fetch { identity, .. } => Some(identity.clone()),
            Call::Login { .. } => None,
        })
        .collect();
    assert_eq!(fetched_by.len(), 2);
    assert_ne!(fetched_by[0], fetched_by[1]);

    // Both sessions are cooling down and the store is empty
    let err = h.orchestrator.scan(berlin()).await.unwrap_err();
    assert!(matches!(err, ScanError::Busy));

    tokio::time::sleep(Duration::from_millis(300)).await;
    h.orchestrator.scan(berlin()).await.unwrap();
    assert_eq!(h.store.identity_stats().unwrap().used, 2);
}

// ============================================================================
// Partial Construction
// ============================================================================

#[tokio::test]
async fn test_missing_identity_releases_claimed_egress() {
    let h = harness(0, 2, fast_settings());

    let err = h.orchestrator.scan(berlin()).await.unwrap_err();
    assert!(err.is_busy());

    let egress = h.store.egress_stats().unwrap();
    assert_eq!(egress.alive, 2);
    assert_eq!(egress.alive_used, 0);
    assert!(h.remote.calls().is_empty());
}

#[tokio::test]
async fn test_missing_egress_claims_no_identity() {
    let h = harness(2, 0, fast_settings());

    let err = h.orchestrator.pool().construct().unwrap_err();
    assert!(matches!(err, PoolError::Exhausted { resource: "egress" }));
    assert_eq!(h.store.identity_stats().unwrap().used, 0);
}
