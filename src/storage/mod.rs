//! Resource and object persistence
//!
//! Business logic talks to storage through two narrow traits so the
//! backend can be swapped or faked in tests:
//!
//! ```text
//! ┌──────────────────────┐   ┌──────────────────────┐
//! │    Session Pool /    │   │   Scan Orchestrator  │
//! │     Orchestrator     │   │    / cache queries   │
//! └──────────┬───────────┘   └──────────┬───────────┘
//!            ▼                          ▼
//! ┌──────────────────────┐   ┌──────────────────────┐
//! │    ResourceStore     │   │     ObjectStore      │
//! │ identities / egress  │   │  geolocated objects  │
//! └──────────┬───────────┘   └──────────┬───────────┘
//!            └────────────┬─────────────┘
//!                         ▼
//!               ┌───────────────────┐
//!               │    SqliteStore    │
//!               └───────────────────┘
//! ```
//!
//! Claiming a resource is a single conditional update, so two concurrent
//! claims can never return the same record.

pub mod error;
pub mod objects;
pub mod resources;
pub mod sqlite;

use chrono::Utc;

use crate::models::{
    Coordinate, Egress, EgressStats, Identity, IdentityStats, ObjectKind, ScanObject, StatusEntry,
};

pub use error::{StoreError, StoreResult};
pub use sqlite::SqliteStore;

// ============================================================================
// Repository Traits
// ============================================================================

/// Durable identity and egress records
///
/// A failed claim ([`StoreError::NotAvailable`]) is the normal "pool
/// exhausted" condition. Connectivity failures are returned as-is and never
/// retried inside the store.
pub trait ResourceStore: Send + Sync {
    /// Claim one identity that is neither used nor banned
    fn claim_identity(&self) -> StoreResult<Identity>;

    /// Claim one egress point that is neither in use nor dead
    fn claim_egress(&self) -> StoreResult<Egress>;

    /// Mark an identity unused (idempotent)
    fn release_identity(&self, name: &str) -> StoreResult<()>;

    /// Mark an egress point unused (idempotent)
    fn release_egress(&self, id: i64) -> StoreResult<()>;

    /// Ban an identity; it is never claimed again
    fn ban_identity(&self, name: &str) -> StoreResult<()>;

    /// Mark an egress point dead; it is never claimed again
    fn kill_egress(&self, id: i64) -> StoreResult<()>;

    /// Set the usage flags to match exactly the given live assignments
    ///
    /// Returns the number of records whose flag changed.
    fn reconcile(&self, assignments: &[StatusEntry]) -> StoreResult<usize>;

    /// Mark every identity and egress point unused
    fn mark_all_unused(&self) -> StoreResult<usize> {
        self.reconcile(&[])
    }

    fn identity_stats(&self) -> StoreResult<IdentityStats>;

    fn egress_stats(&self) -> StoreResult<EgressStats>;

    fn get_identity(&self, name: &str) -> StoreResult<Option<Identity>>;

    fn get_egress(&self, id: i64) -> StoreResult<Option<Egress>>;

    fn banned_identities(&self) -> StoreResult<Vec<Identity>>;

    /// Provision a new identity
    fn add_identity(&self, identity: &Identity) -> StoreResult<()>;

    /// Provision a new egress point
    fn add_egress(&self, id: i64) -> StoreResult<()>;

    /// Remove every egress point
    fn drop_all_egress(&self) -> StoreResult<usize>;

    /// Remove egress points marked dead
    fn remove_dead_egress(&self) -> StoreResult<usize>;
}

/// Geolocated object records with time-based expiry
pub trait ObjectStore: Send + Sync {
    /// Live objects of the given kinds within `radius_m` metres of `center`
    /// at unix time `now`, nearest first
    fn query_at(
        &self,
        center: Coordinate,
        radius_m: f64,
        kinds: &[ObjectKind],
        now: i64,
    ) -> StoreResult<Vec<ScanObject>>;

    /// Live objects of the given kinds within `radius_m` metres of `center`
    fn query(
        &self,
        center: Coordinate,
        radius_m: f64,
        kinds: &[ObjectKind],
    ) -> StoreResult<Vec<ScanObject>> {
        self.query_at(center, radius_m, kinds, Utc::now().timestamp())
    }

    /// Insert an ephemeral object or upsert a static one by id
    ///
    /// A second ephemeral object with an existing id fails with
    /// [`StoreError::Duplicate`].
    fn write(&self, object: &ScanObject) -> StoreResult<()>;

    /// Remove ephemeral objects that expired before `threshold`
    fn purge_expired(&self, threshold: i64) -> StoreResult<usize>;

    /// Look up a single object by id
    fn get(&self, id: &str) -> StoreResult<Option<ScanObject>>;

    fn count(&self) -> StoreResult<usize>;
}
