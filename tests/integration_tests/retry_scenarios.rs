//! Retry scenario integration tests
//!
//! Tests how scan failures are classified and recovered from:
//! 1. Transport failures (egress substitution, then retirement)
//! 2. Query deadlines
//! 3. Credential failures (identity ban)
//! 4. Refused auth tokens (forced login)
//! 5. Transient protocol failures (one retry)
//! 6. Everything else (plain release)
//! 7. Scans abandoned mid-flight

use std::sync::Arc;
use std::time::Duration;

use minion::remote::RemoteError;
use minion::scanner::{ScanError, ScanSettings};
use minion::storage::ResourceStore;

use crate::common::{berlin, creature_response, fast_settings, harness, settle, Call};

// ============================================================================
// Transport Failures
// ============================================================================

#[tokio::test]
async fn test_transport_failure_substitutes_egress() {
    let h = harness(1, 2, fast_settings());
    h.remote.push_fetch(Err(RemoteError::EgressDead));
    h.remote.push_fetch(Ok(creature_response(7, berlin())));

    let objects = h.orchestrator.scan(berlin()).await.unwrap();
    assert_eq!(objects.len(), 1);

    let used = h.remote.fetch_egress();
    assert_eq!(used.len(), 2);
    assert_ne!(used[0], used[1]);

    // Re-authenticated through the substitute
    let logins: Vec<i64> = h
        .remote
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::Login { egress, .. } => Some(egress),
            Call::Fetch { .. } => None,
        })
        .collect();
    assert_eq!(logins, used);

    assert!(h.store.get_egress(used[0]).unwrap().unwrap().dead);

    // The session keeps the substitute and reports it
    let status = h.orchestrator.status().snapshot().await;
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].proxy_id, used[1]);

    settle().await;
    assert_eq!(h.orchestrator.shutdown().await, 1);
    let substitute = h.store.get_egress(used[1]).unwrap().unwrap();
    assert!(!substitute.dead);
    assert!(!substitute.in_use);
}

#[tokio::test]
async fn test_second_transport_failure_retires_session() {
    let h = harness(1, 2, fast_settings());
    h.remote.push_fetch(Err(RemoteError::EgressDead));
    h.remote.push_fetch(Err(RemoteError::EgressDead));

    let err = h.orchestrator.scan(berlin()).await.unwrap_err();
    assert!(matches!(err, ScanError::Remote(RemoteError::EgressDead)));

    for id in h.remote.fetch_egress() {
        assert!(h.store.get_egress(id).unwrap().unwrap().dead);
    }
    assert_eq!(h.store.egress_stats().unwrap().alive, 0);

    let identity = h.store.get_identity("trainer0").unwrap().unwrap();
    assert!(!identity.banned);
    assert!(!identity.used);
    assert!(h.orchestrator.status().is_empty().await);
}

#[tokio::test]
async fn test_no_substitute_egress_reports_busy() {
    let h = harness(1, 1, fast_settings());
    h.remote.push_fetch(Err(RemoteError::EgressDead));

    let err = h.orchestrator.scan(berlin()).await.unwrap_err();
    assert!(err.is_busy());

    assert!(h.store.get_egress(1).unwrap().unwrap().dead);
    assert!(!h.store.get_identity("trainer0").unwrap().unwrap().used);
}

#[tokio::test]
async fn test_deadline_counts_as_transport_failure() {
    let settings = ScanSettings {
        query_timeout: Duration::from_millis(50),
        ..fast_settings()
    };
    let h = harness(1, 2, settings);
    h.remote.push_hang();
    h.remote.push_fetch(Ok(creature_response(9, berlin())));

    let objects = h.orchestrator.scan(berlin()).await.unwrap();
    assert_eq!(objects.len(), 1);

    let used = h.remote.fetch_egress();
    assert_eq!(used.len(), 2);
    assert!(h.store.get_egress(used[0]).unwrap().unwrap().dead);
    assert_eq!(h.remote.overlaps(), 0);
}

// ============================================================================
// Credential Failures
// ============================================================================

#[tokio::test]
async fn test_banned_on_fetch_retires_identity() {
    let h = harness(1, 1, fast_settings());
    h.remote.push_fetch(Err(RemoteError::AccountBanned));

    let err = h.orchestrator.scan(berlin()).await.unwrap_err();
    assert!(matches!(err, ScanError::Remote(RemoteError::AccountBanned)));
    assert_eq!(h.remote.fetch_egress().len(), 1);

    assert!(h.store.get_identity("trainer0").unwrap().unwrap().banned);
    let egress = h.store.get_egress(1).unwrap().unwrap();
    assert!(!egress.in_use);
    assert!(!egress.dead);
    assert!(h.orchestrator.status().is_empty().await);

    // The only identity is gone
    settle().await;
    let err = h.orchestrator.scan(berlin()).await.unwrap_err();
    assert!(err.is_busy());
}

#[tokio::test]
async fn test_rejected_login_never_queries() {
    let h = harness(1, 1, fast_settings());
    h.remote.push_login(Err(RemoteError::CredentialRejected));

    let err = h.orchestrator.scan(berlin()).await.unwrap_err();
    assert!(matches!(err, ScanError::Remote(RemoteError::CredentialRejected)));
    assert!(h.remote.fetch_egress().is_empty());

    assert!(h.store.get_identity("trainer0").unwrap().unwrap().banned);
    assert!(!h.store.get_egress(1).unwrap().unwrap().in_use);
}

#[tokio::test]
async fn test_empty_response_is_a_credential_failure() {
    let h = harness(2, 1, fast_settings());
    h.remote.push_fetch(Err(RemoteError::EmptyResponse));

    h.orchestrator.scan(berlin()).await.unwrap_err();

    let stats = h.store.identity_stats().unwrap();
    assert_eq!(stats.banned, 1);

    // The released egress serves the remaining identity
    settle().await;
    h.orchestrator.scan(berlin()).await.unwrap();
}

// ============================================================================
// Auth Token Refresh
// ============================================================================

#[tokio::test]
async fn test_refused_token_forces_login() {
    let h = harness(1, 1, fast_settings());
    h.remote.push_login(Err(RemoteError::InvalidAuthToken));

    h.orchestrator.scan(berlin()).await.unwrap();

    let calls = h.remote.calls();
    assert_eq!(
        calls,
        vec![
            Call::Login {
                identity: "trainer0".into(),
                egress: 1,
                force: false
            },
            Call::Login {
                identity: "trainer0".into(),
                egress: 1,
                force: true
            },
            Call::Fetch {
                identity: "trainer0".into(),
                egress: 1
            },
        ]
    );
}

// ============================================================================
// Transient Failures
// ============================================================================

#[tokio::test]
async fn test_transient_failure_retried_once() {
    let h = harness(1, 1, fast_settings());
    h.remote.push_fetch(Err(RemoteError::InvalidPlatformRequest));
    h.remote.push_fetch(Ok(creature_response(3, berlin())));

    let objects = h.orchestrator.scan(berlin()).await.unwrap();
    assert_eq!(objects.len(), 1);

    // Same session, no second login
    assert_eq!(h.remote.fetch_egress(), vec![1, 1]);
    let logins = h
        .remote
        .calls()
        .iter()
        .filter(|call| matches!(call, Call::Login { .. }))
        .count();
    assert_eq!(logins, 1);
}

#[tokio::test]
async fn test_second_transient_failure_releases_session() {
    let h = harness(1, 1, fast_settings());
    h.remote.push_fetch(Err(RemoteError::InvalidPlatformRequest));
    h.remote.push_fetch(Err(RemoteError::InvalidPlatformRequest));

    let err = h.orchestrator.scan(berlin()).await.unwrap_err();
    assert!(matches!(
        err,
        ScanError::Remote(RemoteError::InvalidPlatformRequest)
    ));
    assert_eq!(h.remote.fetch_egress().len(), 2);

    settle().await;
    assert_eq!(h.orchestrator.pool().parked(), 1);
    assert!(!h.store.get_identity("trainer0").unwrap().unwrap().banned);
    assert!(!h.store.get_egress(1).unwrap().unwrap().dead);
}

#[tokio::test]
async fn test_unclassified_failure_releases_without_retry() {
    let h = harness(1, 1, fast_settings());
    h.remote
        .push_fetch(Err(RemoteError::Protocol("unexpected envelope".into())));

    let err = h.orchestrator.scan(berlin()).await.unwrap_err();
    assert!(!err.is_busy());
    assert_eq!(h.remote.fetch_egress().len(), 1);

    settle().await;
    assert_eq!(h.orchestrator.pool().parked(), 1);

    // The parked session scans again
    h.orchestrator.scan(berlin()).await.unwrap();
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_aborted_scan_returns_resources() {
    let settings = ScanSettings {
        query_timeout: Duration::from_secs(60),
        ..fast_settings()
    };
    let h = harness(1, 1, settings);
    h.remote.push_hang();

    let orchestrator = Arc::clone(&h.orchestrator);
    let scan = tokio::spawn(async move { orchestrator.scan(berlin()).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.store.get_identity("trainer0").unwrap().unwrap().used);

    scan.abort();
    assert!(scan.await.unwrap_err().is_cancelled());
    settle().await;

    assert!(!h.store.get_identity("trainer0").unwrap().unwrap().used);
    assert!(!h.store.get_egress(1).unwrap().unwrap().in_use);
    assert!(h.orchestrator.status().is_empty().await);
    assert_eq!(h.orchestrator.pool().parked(), 0);

    // The pair is available to the next scan
    h.orchestrator.scan(berlin()).await.unwrap();
}

#[tokio::test]
async fn test_aborted_scan_after_substitution_keeps_dead_flag() {
    let settings = ScanSettings {
        query_timeout: Duration::from_secs(60),
        ..fast_settings()
    };
    let h = harness(1, 2, settings);
    h.remote.push_fetch(Err(RemoteError::EgressDead));
    h.remote.push_hang();

    let orchestrator = Arc::clone(&h.orchestrator);
    let scan = tokio::spawn(async move { orchestrator.scan(berlin()).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    scan.abort();
    let _ = scan.await;
    settle().await;

    let used = h.remote.fetch_egress();
    assert_eq!(used.len(), 2);

    let dead = h.store.get_egress(used[0]).unwrap().unwrap();
    assert!(dead.dead);
    let substitute = h.store.get_egress(used[1]).unwrap().unwrap();
    assert!(!substitute.in_use);
    assert!(!substitute.dead);
    assert!(!h.store.get_identity("trainer0").unwrap().unwrap().used);
}
