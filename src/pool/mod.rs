//! Session pool
//!
//! Keeps already-built sessions (identity + egress + remote handle) parked in
//! a bounded queue so scans do not pay for claiming resources every time.
//!
//! ```text
//!   release(session, cooldown)                 acquire(max_wait)
//!            │                                        ▲
//!            ▼                                        │
//!   ┌─────────────────┐   after cooldown   ┌──────────────────┐
//!   │  cooldown task  │ ─────────────────▶ │  mpsc queue      │
//!   └─────────────────┘                    │  (parked)        │
//!                                          └──────────────────┘
//!   timeout ──▶ construct(): claim egress, claim identity, bind client
//! ```
//!
//! A session is owned by exactly one holder at a time: the queue, a cooldown
//! task, or the scan that acquired it.

mod session;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, warn};

use crate::error::{ClassifiedError, ErrorCategory};
use crate::metrics;
use crate::remote::ClientFactory;
use crate::storage::{ResourceStore, StoreError};

pub use session::Session;

// ============================================================================
// Errors
// ============================================================================

/// Session pool errors
#[derive(Error, Debug)]
pub enum PoolError {
    /// No parked session showed up within the wait
    #[error("No session available within {0:?}")]
    Timeout(Duration),

    /// The store has no free resource of this kind
    #[error("No {resource} available")]
    Exhausted { resource: &'static str },

    /// The pool queue was closed
    #[error("Session pool closed")]
    Closed,

    /// Store failure while claiming or releasing
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for PoolError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotAvailable { resource } => Self::Exhausted { resource },
            other => Self::Store(other),
        }
    }
}

impl PoolError {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. } | Self::Timeout(_))
    }
}

impl ClassifiedError for PoolError {
    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Closed)
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Timeout(_) | Self::Exhausted { .. } => ErrorCategory::ResourceExhausted,
            Self::Closed => ErrorCategory::Other,
            Self::Store(e) => e.category(),
        }
    }
}

// ============================================================================
// Retirement
// ============================================================================

/// Why a session leaves service for good
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retirement {
    /// The identity was banned; the egress goes back to the store
    IdentityBanned,
    /// The egress was killed; the identity goes back to the store
    EgressDead,
}

impl Retirement {
    pub fn label(&self) -> &'static str {
        match self {
            Self::IdentityBanned => "identity_banned",
            Self::EgressDead => "egress_dead",
        }
    }
}

// ============================================================================
// Session Pool
// ============================================================================

/// Bounded pool of reusable sessions
pub struct SessionPool {
    store: Arc<dyn ResourceStore>,
    factory: Arc<dyn ClientFactory>,
    tx: mpsc::Sender<Session>,
    rx: Mutex<mpsc::Receiver<Session>>,
    parked: Arc<AtomicUsize>,
}

impl SessionPool {
    /// Create a pool whose queue holds at most `capacity` parked sessions
    pub fn new(
        store: Arc<dyn ResourceStore>,
        factory: Arc<dyn ClientFactory>,
        capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            store,
            factory,
            tx,
            rx: Mutex::new(rx),
            parked: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    /// Number of sessions currently parked and ready
    pub fn parked(&self) -> usize {
        self.parked.load(Ordering::SeqCst)
    }

    /// Take a parked session, waiting at most `max_wait` for one
    pub async fn acquire(&self, max_wait: Duration) -> Result<Session, PoolError> {
        let wait = async {
            let mut rx = self.rx.lock().await;
            rx.recv().await
        };

        match tokio::time::timeout(max_wait, wait).await {
            Ok(Some(session)) => {
                let parked = self.parked.fetch_sub(1, Ordering::SeqCst) - 1;
                metrics::set_parked_sessions(parked);
                debug!(session = %session.id(), identity = %session.identity().name, "Reusing parked session");
                Ok(session)
            }
            Ok(None) => Err(PoolError::Closed),
            Err(_) => Err(PoolError::Timeout(max_wait)),
        }
    }

    /// Build a brand-new session from the resource store
    ///
    /// Claims the egress first, then the identity. If the identity claim
    /// fails the egress is released again before the error is returned.
    pub fn construct(&self) -> Result<Session, PoolError> {
        let egress = self.store.claim_egress()?;

        let identity = match self.store.claim_identity() {
            Ok(identity) => identity,
            Err(err) => {
                if let Err(release_err) = self.store.release_egress(egress.id) {
                    error!(egress = egress.id, error = %release_err, "Failed to release egress after partial construction");
                }
                return Err(err.into());
            }
        };

        let client = self.factory.create(&identity, &egress);
        let session = Session::new(identity, egress, client);
        debug!(session = %session.id(), identity = %session.identity().name, egress = session.egress().id, "Constructed session");
        Ok(session)
    }

    /// Take a parked session or, once `max_wait` elapses, build a new one
    pub async fn acquire_or_construct(&self, max_wait: Duration) -> Result<Session, PoolError> {
        match self.acquire(max_wait).await {
            Ok(session) => Ok(session),
            Err(PoolError::Timeout(_)) => self.construct(),
            Err(err) => Err(err),
        }
    }

    /// Park `session` again once `cooldown` has elapsed
    ///
    /// Returns immediately; the wait happens in a background task.
    pub fn release(&self, session: Session, cooldown: Duration) {
        let tx = self.tx.clone();
        let parked = Arc::clone(&self.parked);
        let store = Arc::clone(&self.store);

        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;

            parked.fetch_add(1, Ordering::SeqCst);
            match tx.send(session).await {
                Ok(()) => metrics::set_parked_sessions(parked.load(Ordering::SeqCst)),
                Err(mpsc::error::SendError(session)) => {
                    parked.fetch_sub(1, Ordering::SeqCst);
                    warn!(session = %session.id(), "Pool closed, returning resources to store");
                    release_resources(store.as_ref(), &session);
                }
            }
        });
    }

    /// Take a failed session out of service for good
    ///
    /// The failed resource stays claimed and flagged in the store; the
    /// healthy one is released.
    pub fn retire(&self, session: Session, reason: Retirement) -> Result<(), PoolError> {
        warn!(
            session = %session.id(),
            identity = %session.identity().name,
            egress = session.egress().id,
            reason = reason.label(),
            "Retiring session"
        );
        metrics::record_retirement(reason.label());

        match reason {
            Retirement::IdentityBanned => self.store.release_egress(session.egress().id)?,
            Retirement::EgressDead => self.store.release_identity(&session.identity().name)?,
        }
        Ok(())
    }

    /// Claim a fresh egress for `session`, replacing its current one
    ///
    /// The old egress is left untouched; callers kill it first.
    pub fn replace_egress(&self, session: &mut Session) -> Result<(), PoolError> {
        let egress = self.store.claim_egress()?;
        let old = session.rebind_egress(egress);
        debug!(session = %session.id(), old = old.id, new = egress.id, "Replaced egress");
        Ok(())
    }

    /// Release the resources of every parked session back to the store
    ///
    /// Sessions still cooling down are not affected.
    pub async fn drain(&self) -> usize {
        let mut rx = self.rx.lock().await;
        let mut drained = 0;

        while let Ok(session) = rx.try_recv() {
            self.parked.fetch_sub(1, Ordering::SeqCst);
            release_resources(self.store.as_ref(), &session);
            drained += 1;
        }

        metrics::set_parked_sessions(self.parked());
        debug!(drained, "Drained session pool");
        drained
    }
}

fn release_resources(store: &dyn ResourceStore, session: &Session) {
    if let Err(err) = store.release_identity(&session.identity().name) {
        error!(identity = %session.identity().name, error = %err, "Failed to release identity");
    }
    if let Err(err) = store.release_egress(session.egress().id) {
        error!(egress = session.egress().id, error = %err, "Failed to release egress");
    }
}
