//! minion - rotating scan session pool and geolocated object cache
//!
//! Hands out exclusive identity + egress pairs ("sessions") to concurrent
//! scan requests, drives a rate-limited remote map service through them,
//! retires resources the remote rejects, and caches the normalized results
//! in a geospatial store with time-based expiry.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Core data structures and geodesy helpers
//! - [`storage`] - Resource and object stores (SQLite)
//! - [`remote`] - Remote service contract, gateway client and normalization
//! - [`pool`] - Session pool with cooldown and retirement
//! - [`scanner`] - Scan orchestration, retry policy and rate gate
//! - [`status`] - Live session assignment registry
//! - [`server`] - HTTP API and background maintenance
//! - [`metrics`] - Prometheus metrics
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use minion::config::Config;
//! use minion::remote::GatewayFactory;
//! use minion::server::MinionServer;
//! use minion::storage::SqliteStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = Arc::new(SqliteStore::open(&config.database.path)?);
//!     let factory = Arc::new(GatewayFactory::from_config(&config.remote));
//!     let server = MinionServer::new(config, store.clone(), store, factory)?;
//!     server.start_with_shutdown(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     }).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod pool;
pub mod remote;
pub mod scanner;
pub mod server;
pub mod status;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{ClassifiedError, Error, ErrorCategory, Result};
    pub use crate::models::{Coordinate, Egress, Identity, ObjectKind, ScanObject, StatusEntry};
    pub use crate::pool::{Retirement, Session, SessionPool};
    pub use crate::remote::{ClientFactory, RemoteClient, RemoteError};
    pub use crate::scanner::{RateGate, ScanError, ScanOrchestrator, ScanSettings};
    pub use crate::status::StatusRegistry;
    pub use crate::storage::{ObjectStore, ResourceStore, SqliteStore};
}

// Direct re-exports for convenience
pub use models::{Coordinate, ObjectKind, ScanObject};
