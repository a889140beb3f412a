//! Scan orchestration
//!
//! Runs one scan request end to end:
//!
//! ```text
//! ┌─────────┐   ┌──────────────┐   ┌───────────┐   ┌───────┐   ┌───────────┐   ┌─────────┐   ┌─────────┐
//! │ ACQUIRE │──▶│ AUTHENTICATE │──▶│ RATE_GATE │──▶│ QUERY │──▶│ NORMALIZE │──▶│ PERSIST │──▶│ RELEASE │
//! └─────────┘   └──────────────┘   └───────────┘   └───────┘   └───────────┘   └─────────┘   └─────────┘
//!                      ▲                                │
//!                      └──── retry policy (policy.rs) ◀─┘
//! ```
//!
//! Every session checked out by a scan is handed back exactly once, either
//! to the pool after the cooldown or to the store through retirement.

pub mod error;
pub mod policy;
pub mod rate;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::ClassifiedError;
use crate::metrics;
use crate::models::{Coordinate, ScanObject};
use crate::pool::{PoolError, Retirement, Session, SessionPool};
use crate::remote::{normalize, MapObjectsResponse, RemoteError};
use crate::status::StatusRegistry;
use crate::storage::{ObjectStore, ResourceStore};

pub use error::ScanError;
pub use policy::{Decision, RetryBudget};
pub use rate::RateGate;

// ============================================================================
// Settings
// ============================================================================

/// Timing policy for scans
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// How long to wait for a parked session before building a new one
    pub acquire_wait: Duration,

    /// Minimum delay before a released session can scan again
    pub cooldown: Duration,

    /// Deadline for a single map query
    pub query_timeout: Duration,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            acquire_wait: Duration::from_secs(5),
            cooldown: Duration::from_secs(10),
            query_timeout: Duration::from_secs(10),
        }
    }
}

impl ScanSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            acquire_wait: config.pool.acquire_wait(),
            cooldown: config.pool.scan_delay(),
            query_timeout: config.scan.query_timeout(),
        }
    }
}

/// What happens to the session once the attempt loop is done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Release,
    Retire(Retirement),
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives scan requests through the session pool and the remote service
pub struct ScanOrchestrator {
    pool: Arc<SessionPool>,
    objects: Arc<dyn ObjectStore>,
    status: StatusRegistry,
    gate: Arc<RateGate>,
    settings: ScanSettings,
}

impl ScanOrchestrator {
    pub fn new(
        pool: Arc<SessionPool>,
        objects: Arc<dyn ObjectStore>,
        status: StatusRegistry,
        gate: Arc<RateGate>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            pool,
            objects,
            status,
            gate,
            settings,
        }
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    pub fn status(&self) -> &StatusRegistry {
        &self.status
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// Scan the area around `at` and return the normalized objects
    ///
    /// # Errors
    ///
    /// - [`ScanError::Busy`] when no session could be acquired or built
    /// - [`ScanError::Remote`] when the remote failed and no retry was left
    /// - [`ScanError::Store`] when the resource store is unreachable
    pub async fn scan(&self, at: Coordinate) -> Result<Vec<ScanObject>, ScanError> {
        let started = Instant::now();
        let result = self.run(at).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.outcome(),
        };
        metrics::record_scan(outcome, started.elapsed().as_secs_f64());
        result
    }

    async fn run(&self, at: Coordinate) -> Result<Vec<ScanObject>, ScanError> {
        let mut session = match self
            .pool
            .acquire_or_construct(self.settings.acquire_wait)
            .await
        {
            Ok(session) => session,
            Err(PoolError::Store(e)) => {
                error!(error = %e, "Resource store failure while acquiring session");
                return Err(ScanError::Store(e));
            }
            Err(e) => {
                info!(reason = %e, "No session available");
                return Err(ScanError::Busy);
            }
        };

        let mut checkout = Checkout::new(self, &session);
        self.status.assign(session.status_entry()).await;
        info!(
            identity = %session.identity().name,
            egress = session.egress().id,
            lat = at.lat,
            lng = at.lng,
            "Using session for request"
        );

        session.client_mut().move_to(at);
        let (result, disposition) = self.attempt(&mut session, &mut checkout).await;

        let result = result.map(|response| {
            let objects = normalize(&response, Utc::now().timestamp_millis());
            self.persist(&objects);
            objects
        });

        self.dispose(session, disposition, checkout).await;
        result
    }

    /// Run AUTHENTICATE → RATE_GATE → QUERY under the retry policy
    async fn attempt(
        &self,
        session: &mut Session,
        checkout: &mut Checkout,
    ) -> (Result<MapObjectsResponse, ScanError>, Disposition) {
        let mut budget = RetryBudget::default();
        let mut authenticated = false;

        loop {
            let outcome = if authenticated {
                self.query(session).await
            } else {
                match self.authenticate(session).await {
                    Ok(()) => {
                        authenticated = true;
                        self.query(session).await
                    }
                    Err(e) => Err(e),
                }
            };

            let err = match outcome {
                Ok(response) => return (Ok(response), Disposition::Release),
                Err(err) => err,
            };

            let category = err.category();
            let decision = budget.decide(category);
            if decision.is_retry() {
                metrics::record_retry(category.label());
            }

            match decision {
                Decision::SubstituteEgress => {
                    warn!(
                        identity = %session.identity().name,
                        egress = session.egress().id,
                        error = %err,
                        "Egress failed, substituting"
                    );
                    self.kill_egress(session);

                    match self.pool.replace_egress(session) {
                        Ok(()) => {
                            checkout.track(session);
                            self.status.assign(session.status_entry()).await;
                            authenticated = false;
                        }
                        Err(PoolError::Store(e)) => {
                            error!(error = %e, "Resource store failure while replacing egress");
                            return (
                                Err(ScanError::Store(e)),
                                Disposition::Retire(Retirement::EgressDead),
                            );
                        }
                        Err(e) => {
                            info!(reason = %e, "No replacement egress available");
                            return (
                                Err(ScanError::Busy),
                                Disposition::Retire(Retirement::EgressDead),
                            );
                        }
                    }
                }
                Decision::KillEgress => {
                    warn!(
                        identity = %session.identity().name,
                        egress = session.egress().id,
                        error = %err,
                        "Substitute egress failed too"
                    );
                    self.kill_egress(session);
                    return (Err(err.into()), Disposition::Retire(Retirement::EgressDead));
                }
                Decision::BanIdentity => {
                    warn!(
                        identity = %session.identity().name,
                        error = %err,
                        "Identity rejected, banning"
                    );
                    if let Err(e) = self.pool.store().ban_identity(&session.identity().name) {
                        error!(identity = %session.identity().name, error = %e, "Failed to ban identity");
                    }
                    return (
                        Err(err.into()),
                        Disposition::Retire(Retirement::IdentityBanned),
                    );
                }
                Decision::RetryQuery => {
                    debug!(identity = %session.identity().name, error = %err, "Transient failure, retrying");
                }
                Decision::GiveUp => {
                    info!(identity = %session.identity().name, error = %err, "Scan failed");
                    return (Err(err.into()), Disposition::Release);
                }
            }
        }
    }

    /// Log in, forcing a fresh login once if the cached token is refused
    async fn authenticate(&self, session: &mut Session) -> Result<(), RemoteError> {
        let (identity, egress, client) = session.parts_mut();
        match client.login(identity, egress, false).await {
            Err(RemoteError::InvalidAuthToken) => {
                debug!(identity = %identity.name, "Auth token refused, forcing login");
                client.login(identity, egress, true).await
            }
            other => other,
        }
    }

    async fn query(&self, session: &mut Session) -> Result<MapObjectsResponse, RemoteError> {
        self.gate.wait().await;

        let deadline = self.settings.query_timeout;
        match tokio::time::timeout(deadline, session.client_mut().fetch_map_objects()).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::DeadlineExceeded(deadline.as_millis() as u64)),
        }
    }

    fn kill_egress(&self, session: &Session) {
        if let Err(e) = self.pool.store().kill_egress(session.egress().id) {
            error!(egress = session.egress().id, error = %e, "Failed to mark egress dead");
        }
    }

    /// Best-effort write-through; failures never fail the scan
    fn persist(&self, objects: &[ScanObject]) {
        let mut stored = 0usize;
        for object in objects {
            match self.objects.write(object) {
                Ok(()) => stored += 1,
                Err(e) if e.is_duplicate() => {
                    debug!(id = %object.id, "Object already stored");
                }
                Err(e) => {
                    error!(id = %object.id, error = %e, "Failed to store object");
                }
            }
        }
        debug!(total = objects.len(), stored, "Persisted scan results");
    }

    async fn dispose(&self, session: Session, disposition: Disposition, checkout: Checkout) {
        match disposition {
            Disposition::Release => self.pool.release(session, self.settings.cooldown),
            Disposition::Retire(reason) => {
                self.status.remove(&session.identity().name).await;
                if let Err(e) = self.pool.retire(session, reason) {
                    error!(error = %e, "Failed to return healthy resource to store");
                }
            }
        }
        checkout.disarm();
    }

    /// Release every parked session and forget their assignments
    pub async fn shutdown(&self) -> usize {
        let drained = self.pool.drain().await;
        self.status.clear().await;
        info!(drained, "Session pool drained");
        drained
    }
}

// ============================================================================
// Checkout Guard
// ============================================================================

/// Returns a checked-out session's resources to the store when a scan ends
/// without disposing of it (the caller was cancelled or the task panicked)
///
/// Banned and dead flags set before the scan stopped are kept; only the
/// in-use flags are cleared.
struct Checkout {
    store: Arc<dyn ResourceStore>,
    status: StatusRegistry,
    identity: String,
    egress: i64,
    armed: bool,
}

impl Checkout {
    fn new(orchestrator: &ScanOrchestrator, session: &Session) -> Self {
        Self {
            store: Arc::clone(orchestrator.pool.store()),
            status: orchestrator.status.clone(),
            identity: session.identity().name.clone(),
            egress: session.egress().id,
            armed: true,
        }
    }

    /// Follow an egress substitution
    fn track(&mut self, session: &Session) {
        self.egress = session.egress().id;
    }

    /// The session was released or retired normally
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Checkout {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        warn!(
            identity = %self.identity,
            egress = self.egress,
            "Scan abandoned, returning resources to store"
        );

        if !self.status.try_remove(&self.identity) {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let status = self.status.clone();
                let identity = self.identity.clone();
                handle.spawn(async move {
                    status.remove(&identity).await;
                });
            }
        }

        if let Err(e) = self.store.release_identity(&self.identity) {
            error!(identity = %self.identity, error = %e, "Failed to release identity");
        }
        if let Err(e) = self.store.release_egress(self.egress) {
            error!(egress = self.egress, error = %e, "Failed to release egress");
        }
    }
}
