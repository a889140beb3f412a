//! Contract with the remote map service
//!
//! The wire protocol lives outside this crate. The scanner only needs a
//! handle that can log in through an egress point, move to a coordinate and
//! fetch the map objects around it, plus a factory that binds such a handle
//! to a freshly built session.

pub mod error;
pub mod gateway;
pub mod normalize;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Coordinate, Egress, Identity};

pub use error::RemoteError;
pub use gateway::GatewayFactory;
pub use normalize::normalize;

// ============================================================================
// Client Contract
// ============================================================================

/// A remote-service handle owned by one session
#[async_trait]
pub trait RemoteClient: Send {
    /// Authenticate `identity` through `egress`
    ///
    /// Implementations may reuse a cached token unless `force` is set.
    async fn login(
        &mut self,
        identity: &Identity,
        egress: &Egress,
        force: bool,
    ) -> Result<(), RemoteError>;

    /// Set the position subsequent requests are made from
    fn move_to(&mut self, coordinate: Coordinate);

    /// Fetch the raw map objects around the current position
    async fn fetch_map_objects(&mut self) -> Result<MapObjectsResponse, RemoteError>;
}

/// Builds remote handles for new sessions
pub trait ClientFactory: Send + Sync {
    fn create(&self, identity: &Identity, egress: &Egress) -> Box<dyn RemoteClient>;
}

// ============================================================================
// Raw Response Model
// ============================================================================

/// Map objects response as reported by the remote service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapObjectsResponse {
    pub cells: Vec<MapCell>,
}

/// One spatial cell of a response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapCell {
    pub wild_creatures: Vec<WildCreature>,
    pub forts: Vec<Fort>,
}

/// A creature visible in the wild
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WildCreature {
    pub encounter_id: u64,
    pub species: u32,
    pub lat: f64,
    pub lng: f64,
    /// Milliseconds until the creature disappears
    pub time_till_hidden_ms: i64,
}

/// Kind of a fort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FortKind {
    Checkpoint,
    Stronghold,
}

/// A static map feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fort {
    pub id: String,
    pub kind: FortKind,
    pub lat: f64,
    pub lng: f64,
    pub owned_by_team: u8,
    /// Whether any modifier (lure) is currently active
    pub active_modifier: bool,
    pub lure: Option<LureInfo>,
}

/// Creature attracted by a lure on a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LureInfo {
    pub encounter_id: u64,
    pub active_species: u32,
    /// Absolute unix time in milliseconds
    pub expires_at_ms: i64,
}
