//! Core data structures shared across the scanner
//!
//! Resource records ([`Identity`], [`Egress`]) are what the resource store
//! hands out; [`ScanObject`] is the normalized form of everything the remote
//! service reports and what the object store persists.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Mean earth radius in metres used for great-circle distances
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

// ============================================================================
// Coordinates
// ============================================================================

/// A WGS84 point
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Check that the point lies on the globe
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Haversine distance to `other` in metres
    pub fn distance_m(&self, other: &Coordinate) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlng = (other.lng - self.lng).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
    }

    /// Degree extents `(dlat, dlng)` of a box that contains every point
    /// within `radius_m` of this one
    ///
    /// `dlng` is 360 when the circle reaches a pole.
    pub fn bounding_deltas(&self, radius_m: f64) -> (f64, f64) {
        let angular = radius_m / EARTH_RADIUS_M;
        let dlat = angular.to_degrees();

        if self.lat.abs() + dlat >= 90.0 {
            return (dlat, 360.0);
        }

        let ratio = angular.sin() / self.lat.to_radians().cos();
        let dlng = if ratio >= 1.0 {
            360.0
        } else {
            ratio.asin().to_degrees()
        };
        (dlat, dlng)
    }
}

// ============================================================================
// Scan Objects
// ============================================================================

/// Closed set of object types reported by the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Short-lived creature, always carries an expiry
    Creature,
    /// Static checkpoint, may be lured
    Checkpoint,
    /// Static stronghold owned by a team
    Stronghold,
}

impl ObjectKind {
    /// All kinds, used when a query names no filter
    pub const ALL: [ObjectKind; 3] = [Self::Creature, Self::Checkpoint, Self::Stronghold];

    /// Stable integer code used by the object store
    pub fn code(&self) -> i64 {
        match self {
            Self::Creature => 1,
            Self::Checkpoint => 2,
            Self::Stronghold => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Creature),
            2 => Some(Self::Checkpoint),
            3 => Some(Self::Stronghold),
            _ => None,
        }
    }

    /// Ephemeral objects are insert-only and purged once expired
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Self::Creature)
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Creature => write!(f, "creature"),
            Self::Checkpoint => write!(f, "checkpoint"),
            Self::Stronghold => write!(f, "stronghold"),
        }
    }
}

/// A normalized object discovered by a scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanObject {
    #[serde(rename = "type")]
    pub kind: ObjectKind,

    /// Stable identifier, unique per object
    pub id: String,

    pub lat: f64,
    pub lng: f64,

    /// Absolute unix timestamp in seconds; 0 means the object never expires
    pub expiry: i64,

    /// Creature species
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub species: Option<u32>,

    /// Owning team of a stronghold
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub team: Option<u8>,

    /// Lure flag of a checkpoint
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub lured: Option<bool>,
}

impl ScanObject {
    /// Create a creature visible until `expiry`
    pub fn creature(id: impl Into<String>, species: u32, at: Coordinate, expiry: i64) -> Self {
        Self {
            kind: ObjectKind::Creature,
            id: id.into(),
            lat: at.lat,
            lng: at.lng,
            expiry,
            species: Some(species),
            team: None,
            lured: None,
        }
    }

    pub fn checkpoint(id: impl Into<String>, at: Coordinate, lured: bool) -> Self {
        Self {
            kind: ObjectKind::Checkpoint,
            id: id.into(),
            lat: at.lat,
            lng: at.lng,
            expiry: 0,
            species: None,
            team: None,
            lured: Some(lured),
        }
    }

    pub fn stronghold(id: impl Into<String>, at: Coordinate, team: u8) -> Self {
        Self {
            kind: ObjectKind::Stronghold,
            id: id.into(),
            lat: at.lat,
            lng: at.lng,
            expiry: 0,
            species: None,
            team: Some(team),
            lured: None,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }

    /// Check whether the object is still visible at unix time `now`
    pub fn is_live_at(&self, now: i64) -> bool {
        self.expiry == 0 || self.expiry > now
    }

    /// Check whether the object is still visible
    pub fn is_live(&self) -> bool {
        self.is_live_at(Utc::now().timestamp())
    }
}

// ============================================================================
// Resources
// ============================================================================

/// A credential used to authenticate against the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Unique account name
    pub name: String,

    /// Opaque authentication material handed to the remote client
    #[serde(skip_serializing)]
    pub secret: String,

    /// Authentication provider understood by the remote client
    pub provider: String,

    pub used: bool,
    pub banned: bool,
}

impl Identity {
    pub fn new(name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secret: secret.into(),
            provider: String::from("ptc"),
            used: false,
            banned: false,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }
}

/// A network egress point requests are routed through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Egress {
    pub id: i64,
    pub in_use: bool,
    pub dead: bool,
}

impl Egress {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            in_use: false,
            dead: false,
        }
    }
}

/// Identity aggregate counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityStats {
    pub total: usize,
    /// In use and not banned
    pub used: usize,
    pub banned: usize,
}

/// Egress aggregate counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EgressStats {
    pub alive: usize,
    pub alive_used: usize,
}

// ============================================================================
// Status
// ============================================================================

/// Which egress an identity is currently bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    pub account_name: String,
    pub proxy_id: i64,
}

impl StatusEntry {
    pub fn new(identity: &Identity, egress: &Egress) -> Self {
        Self {
            account_name: identity.name.clone(),
            proxy_id: egress.id,
        }
    }
}
