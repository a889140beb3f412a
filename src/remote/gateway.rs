//! JSON gateway client
//!
//! Talks to a protocol gateway over HTTP. The gateway speaks the remote
//! service's wire protocol; this client only forwards logins and map queries
//! and routes them through the session's egress proxy.
//!
//! Gateway endpoints:
//! - `POST /login` `{username, secret, provider, force}` → `{token}`
//! - `POST /map-objects` `{token, lat, lng}` → [`MapObjectsResponse`]
//!
//! Failures come back as a non-2xx status with `{"error": "<code>"}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ClientFactory, MapObjectsResponse, RemoteClient, RemoteError};
use crate::config::RemoteConfig;
use crate::models::{Coordinate, Egress, Identity};

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    secret: &'a str,
    provider: &'a str,
    force: bool,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Serialize)]
struct MapObjectsRequest<'a> {
    token: &'a str,
    lat: f64,
    lng: f64,
}

#[derive(Deserialize)]
struct GatewayFailure {
    error: String,
}

/// Map a gateway error code onto a remote signal
pub fn error_from_code(code: &str) -> RemoteError {
    match code {
        "invalid_auth_token" => RemoteError::InvalidAuthToken,
        "egress_dead" | "proxy_dead" => RemoteError::EgressDead,
        "credential_rejected" => RemoteError::CredentialRejected,
        "account_banned" => RemoteError::AccountBanned,
        "account_not_active" => RemoteError::AccountNotActive,
        "empty_response" => RemoteError::EmptyResponse,
        "invalid_platform_request" => RemoteError::InvalidPlatformRequest,
        other => RemoteError::Protocol(other.to_string()),
    }
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_connect() || err.is_timeout() {
        RemoteError::EgressDead
    } else if err.is_decode() {
        RemoteError::EmptyResponse
    } else {
        RemoteError::Protocol(err.to_string())
    }
}

/// Builds [`GatewayClient`]s bound to a session's egress
#[derive(Debug, Clone)]
pub struct GatewayFactory {
    base_url: String,
    proxy_template: Option<String>,
    connect_timeout: Duration,
}

impl GatewayFactory {
    pub fn new(base_url: impl Into<String>, proxy_template: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            proxy_template,
            connect_timeout: Duration::from_secs(5),
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Self {
        let mut factory = Self::new(&config.gateway_url, config.proxy_template.clone());
        factory.connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        factory
    }
}

impl ClientFactory for GatewayFactory {
    fn create(&self, _identity: &Identity, _egress: &Egress) -> Box<dyn RemoteClient> {
        Box::new(GatewayClient {
            base_url: self.base_url.clone(),
            proxy_template: self.proxy_template.clone(),
            connect_timeout: self.connect_timeout,
            http: None,
            bound_egress: None,
            token: None,
            position: Coordinate::default(),
        })
    }
}

/// Remote handle that forwards calls to the gateway
pub struct GatewayClient {
    base_url: String,
    proxy_template: Option<String>,
    connect_timeout: Duration,
    http: Option<Client>,
    bound_egress: Option<i64>,
    token: Option<String>,
    position: Coordinate,
}

impl GatewayClient {
    /// HTTP client routed through `egress`, rebuilt when the egress changes
    fn http_for(&mut self, egress: &Egress) -> Result<Client, RemoteError> {
        if self.bound_egress == Some(egress.id) {
            if let Some(http) = &self.http {
                return Ok(http.clone());
            }
        }

        let mut builder = Client::builder()
            .connect_timeout(self.connect_timeout)
            .gzip(true);

        if let Some(template) = &self.proxy_template {
            let url = template.replace("{id}", &egress.id.to_string());
            let proxy =
                reqwest::Proxy::all(&url).map_err(|e| RemoteError::Protocol(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        let http = builder
            .build()
            .map_err(|e| RemoteError::Protocol(e.to_string()))?;

        debug!(egress = egress.id, "Bound gateway client to egress");
        self.http = Some(http.clone());
        self.bound_egress = Some(egress.id);
        self.token = None;
        Ok(http)
    }

    async fn failure(response: reqwest::Response) -> RemoteError {
        let status = response.status();
        match response.json::<GatewayFailure>().await {
            Ok(failure) => error_from_code(&failure.error),
            Err(_) => RemoteError::Protocol(format!("gateway returned {status}")),
        }
    }
}

#[async_trait]
impl RemoteClient for GatewayClient {
    async fn login(
        &mut self,
        identity: &Identity,
        egress: &Egress,
        force: bool,
    ) -> Result<(), RemoteError> {
        let http = self.http_for(egress)?;
        if self.token.is_some() && !force {
            return Ok(());
        }

        let request = LoginRequest {
            username: &identity.name,
            secret: &identity.secret,
            provider: &identity.provider,
            force,
        };

        let response = http
            .post(format!("{}/login", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            self.token = None;
            return Err(Self::failure(response).await);
        }

        let login: LoginResponse = response.json().await.map_err(transport_error)?;
        self.token = Some(login.token);
        Ok(())
    }

    fn move_to(&mut self, coordinate: Coordinate) {
        self.position = coordinate;
    }

    async fn fetch_map_objects(&mut self) -> Result<MapObjectsResponse, RemoteError> {
        let (Some(http), Some(token)) = (&self.http, &self.token) else {
            return Err(RemoteError::InvalidAuthToken);
        };

        let request = MapObjectsRequest {
            token,
            lat: self.position.lat,
            lng: self.position.lng,
        };

        let response = http
            .post(format!("{}/map-objects", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let err = Self::failure(response).await;
            if err == RemoteError::InvalidAuthToken {
                self.token = None;
            }
            return Err(err);
        }

        response.json().await.map_err(transport_error)
    }
}
