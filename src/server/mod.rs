//! Scan server
//!
//! Wires the stores, session pool, rate gate and orchestrator together and
//! serves them over HTTP.
//!
//! # Lifecycle
//!
//! 1. Resource flags are reset to "nothing in use" (no session survives a restart)
//! 2. A background task purges expired creatures every `purge_interval_secs`
//! 3. Requests are served until the shutdown signal fires
//! 4. Parked sessions are drained so their resources go back to the store

pub mod api;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{HeaderValue, Method};
use axum::Router;
use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::metrics;
use crate::pool::SessionPool;
use crate::remote::ClientFactory;
use crate::scanner::{RateGate, ScanOrchestrator, ScanSettings};
use crate::status::StatusRegistry;
use crate::storage::{ObjectStore, ResourceStore};

pub use api::{create_router, ApiResponse};

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Scan orchestrator (owns the pool and status registry)
    pub orchestrator: Arc<ScanOrchestrator>,

    /// Resource store for aggregate counts
    pub resources: Arc<dyn ResourceStore>,

    /// Object store for cached lookups
    pub objects: Arc<dyn ObjectStore>,

    /// Secret guarding the status endpoints
    pub secret: Option<String>,

    /// Radius served by cached lookups
    pub cache_radius_m: f64,

    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Build the full scan stack from configuration
    pub fn build(
        config: &Config,
        resources: Arc<dyn ResourceStore>,
        objects: Arc<dyn ObjectStore>,
        factory: Arc<dyn ClientFactory>,
    ) -> Result<Self, ServerError> {
        let gate = RateGate::per_second(config.scan.ticks_per_second)?;
        let pool = SessionPool::new(
            Arc::clone(&resources),
            factory,
            config.pool.queue_capacity,
        );

        let orchestrator = ScanOrchestrator::new(
            Arc::new(pool),
            Arc::clone(&objects),
            StatusRegistry::new(),
            Arc::new(gate),
            ScanSettings::from_config(config),
        );

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            resources,
            objects,
            secret: config.server.secret.clone(),
            cache_radius_m: config.cache.radius_m,
            start_time: Instant::now(),
        })
    }
}

// ============================================================================
// Minion Server
// ============================================================================

/// Main scan server
pub struct MinionServer {
    config: Config,
    state: AppState,
}

impl MinionServer {
    /// Create a new server
    pub fn new(
        config: Config,
        resources: Arc<dyn ResourceStore>,
        objects: Arc<dyn ObjectStore>,
        factory: Arc<dyn ClientFactory>,
    ) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;

        let state = AppState::build(&config, resources, objects, factory)?;
        Ok(Self { config, state })
    }

    /// Get the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Result<Router, ServerError> {
        let cors = cors_layer(&self.config.server.allow_origin)?;

        Ok(create_router(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http()))
    }

    /// Start with graceful shutdown
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let router = self.build_router()?;
        let addr = self.config.server.listen_addr;

        let reset = self
            .state
            .resources
            .mark_all_unused()
            .map_err(crate::error::Error::from)?;
        info!(reset, "Reset resource flags");

        let purge = self.start_background_tasks();

        info!("Starting minion server on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()));

        purge.abort();
        self.state.orchestrator.shutdown().await;

        info!("Minion server shutdown complete");
        served
    }

    /// Start background tasks
    fn start_background_tasks(&self) -> JoinHandle<()> {
        spawn_purge_task(
            Arc::clone(&self.state.objects),
            self.config.cache.purge_interval(),
        )
    }
}

/// Periodically remove expired creatures from the object store
pub fn spawn_purge_task(objects: Arc<dyn ObjectStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match objects.purge_expired(Utc::now().timestamp()) {
                Ok(removed) => {
                    metrics::record_purge("creature", removed);
                    if removed > 0 {
                        info!(removed, "Purged expired objects");
                    }
                }
                Err(e) => error!(error = %e, "Failed to purge expired objects"),
            }
        }
    })
}

fn cors_layer(allow_origin: &str) -> Result<CorsLayer, ServerError> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if allow_origin == "*" {
        return Ok(layer.allow_origin(Any));
    }

    let origin = HeaderValue::from_str(allow_origin)
        .map_err(|e| ServerError::Config(format!("invalid allow_origin: {e}")))?;
    Ok(layer.allow_origin(origin))
}

// ============================================================================
// Server Errors
// ============================================================================

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Building the scan stack or resetting the stores failed
    #[error("Initialization error: {0}")]
    Setup(#[from] crate::error::Error),

    #[error("Failed to bind: {0}")]
    Bind(String),

    #[error("Server error: {0}")]
    Serve(String),
}

// ============================================================================
// Tests
// ============================================================================
