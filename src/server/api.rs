//! REST API handlers for the scan server
//!
//! Scan and cache lookups take form-encoded `lat`/`lng` and answer with an
//! [`ApiResponse`]. Status endpoints are guarded by the shared secret.

use std::collections::HashMap;
use std::time::Instant;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::metrics;
use crate::models::{Coordinate, EgressStats, IdentityStats, ObjectKind, ScanObject};
use crate::storage::{ObjectStore, ResourceStore};

use super::AppState;

// ============================================================================
// API Response Types
// ============================================================================

/// Response for scan and cache requests
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub ok: bool,
    pub error: String,
    pub map_objects: Option<Vec<ScanObject>>,
}

impl ApiResponse {
    pub fn success(objects: Vec<ScanObject>) -> Self {
        Self {
            ok: true,
            error: String::new(),
            map_objects: Some(objects),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: message.into(),
            map_objects: None,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Resource aggregate counts
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub identities: IdentityStats,
    pub egress: EgressStats,
    pub parked_sessions: usize,
    pub assigned_sessions: usize,
    pub uptime_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct SecretQuery {
    pub secret: Option<String>,
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/q", post(scan))
        .route("/c", post(cached))
        .route("/s", get(status))
        .route("/stats", get(stats))
        .route("/api/health", get(health_check))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state)
}

/// Parse the `lat`/`lng` form fields into a valid coordinate
fn parse_coordinate(form: &HashMap<String, String>) -> Result<Coordinate, String> {
    let field = |name: &str| -> Result<f64, String> {
        let raw = form.get(name).map(String::as_str).unwrap_or_default();
        raw.trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid {name} '{raw}': {e}"))
    };

    let coordinate = Coordinate::new(field("lat")?, field("lng")?);
    if !coordinate.is_valid() {
        return Err(format!(
            "coordinate ({}, {}) out of range",
            coordinate.lat, coordinate.lng
        ));
    }
    Ok(coordinate)
}

/// Kinds selected by the `p`/`s`/`g` flags; none set means all kinds
fn kind_filter(form: &HashMap<String, String>) -> Vec<ObjectKind> {
    let flagged = |name: &str| form.get(name).is_some_and(|v| !v.is_empty());

    let mut kinds = Vec::new();
    if flagged("p") {
        kinds.push(ObjectKind::Creature);
    }
    if flagged("s") {
        kinds.push(ObjectKind::Checkpoint);
    }
    if flagged("g") {
        kinds.push(ObjectKind::Stronghold);
    }

    if kinds.is_empty() {
        ObjectKind::ALL.to_vec()
    } else {
        kinds
    }
}

fn authorized(state: &AppState, provided: Option<&str>) -> bool {
    matches!((state.secret.as_deref(), provided), (Some(secret), Some(given)) if secret == given)
}

fn forbidden() -> Response {
    (StatusCode::FORBIDDEN, "nope").into_response()
}

// ============================================================================
// Scan Handlers
// ============================================================================

/// Run one scan at the given coordinate
async fn scan(
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    let started = Instant::now();

    let (status, body) = match parse_coordinate(&form) {
        Err(message) => (StatusCode::BAD_REQUEST, ApiResponse::failure(message)),
        Ok(at) => match state.orchestrator.scan(at).await {
            Ok(objects) => (StatusCode::OK, ApiResponse::success(objects)),
            Err(e) => (StatusCode::OK, ApiResponse::failure(e.public_message())),
        },
    };

    metrics::record_api_request("/q", status.as_u16(), started.elapsed().as_secs_f64());
    (status, Json(body))
}

/// Serve stored objects around the given coordinate
async fn cached(
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    let started = Instant::now();

    let (status, body) = match parse_coordinate(&form) {
        Err(message) => (StatusCode::BAD_REQUEST, ApiResponse::failure(message)),
        Ok(at) => {
            let kinds = kind_filter(&form);
            match state.objects.query(at, state.cache_radius_m, &kinds) {
                Ok(objects) => (StatusCode::OK, ApiResponse::success(objects)),
                Err(e) => {
                    error!(error = %e, "Failed to query object store");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ApiResponse::failure("Failed to get map objects"),
                    )
                }
            }
        }
    };

    metrics::record_api_request("/c", status.as_u16(), started.elapsed().as_secs_f64());
    (status, Json(body))
}

// ============================================================================
// Status Handlers
// ============================================================================

/// Current identity → egress assignments
async fn status(State(state): State<AppState>, Query(query): Query<SecretQuery>) -> Response {
    if !authorized(&state, query.secret.as_deref()) {
        return forbidden();
    }

    Json(state.orchestrator.status().snapshot().await).into_response()
}

/// Aggregate resource counts
async fn stats(State(state): State<AppState>, Query(query): Query<SecretQuery>) -> Response {
    if !authorized(&state, query.secret.as_deref()) {
        return forbidden();
    }

    let counts = state
        .resources
        .identity_stats()
        .and_then(|identities| Ok((identities, state.resources.egress_stats()?)));

    match counts {
        Ok((identities, egress)) => Json(StatsResponse {
            identities,
            egress,
            parked_sessions: state.orchestrator.pool().parked(),
            assigned_sessions: state.orchestrator.status().len().await,
            uptime_secs: state.start_time.elapsed().as_secs(),
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to read resource stats");
            (StatusCode::INTERNAL_SERVER_ERROR, "store unavailable").into_response()
        }
    }
}

// ============================================================================
// Health Handlers
// ============================================================================

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Prometheus text exposition
async fn prometheus_metrics() -> Response {
    match metrics::encode_metrics() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// ============================================================================
// Tests
// ============================================================================
