//! Health check endpoint.
//!
//! Reports how claims are resolved and how full the claims cache is, so an
//! operator can tell a cold cache from a gateway deployment at a glance.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// How the server obtains claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticatorMode {
    /// Bearer tokens are introspected and results cached.
    Introspection,
    /// A trusted gateway forwards claims as headers.
    Headers,
}

/// Claims cache occupancy.
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheHealth {
    pub entries: usize,
    pub capacity: usize,
    /// Entries waiting for the next sweep.
    pub expired: usize,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub api_name: String,
    pub version: String,
    pub authenticator: AuthenticatorMode,
    /// Absent in header mode, where nothing is cached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheHealth>,
}

/// `GET /health` (no auth required).
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (authenticator, cache) = if state.resolver.validates_bearer_token() {
        let stats = state.resolver.cache().stats().await;
        let cache = CacheHealth {
            entries: stats.size,
            capacity: stats.capacity,
            expired: stats.expired,
        };
        (AuthenticatorMode::Introspection, Some(cache))
    } else {
        (AuthenticatorMode::Headers, None)
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        api_name: state.config().api_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        authenticator,
        cache,
    })
}

/// Create health check routes.
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
