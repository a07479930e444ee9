//! Claims-resolving HTTP API server.
//!
//! Every secured request passes through [`auth_middleware`], which asks the
//! [`ClaimsResolver`] for the caller's claims. Resolved claims are cached by
//! token hash until the token expires, so repeat requests skip the
//! authorization server entirely.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use claimgate_server::{IntrospectionAuthenticator, Server, ServerConfig, TokenIntrospector};
//!
//! let introspector = TokenIntrospector::new(reqwest::Client::new(), authority, client_id, secret);
//! let config = ServerConfig::new("SampleApi")
//!     .with_bind_address("127.0.0.1:8080".parse()?);
//!
//! let server = Server::new(config, Arc::new(IntrospectionAuthenticator::new(introspector)));
//! server.run().await?;
//! ```

pub mod auth;
pub mod authenticator;
pub mod claims;
pub mod config;
pub mod error;
pub mod introspection;
pub mod request_context;
pub mod resolver;
pub mod routes;
pub mod state;

pub use auth::auth_middleware;
pub use authenticator::{
    AuthenticatedClaims, Authenticator, HeaderAuthenticator, IntrospectionAuthenticator,
};
pub use claims::{Claims, ClaimsCache, CustomClaimsProvider, NoCustomClaims};
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use introspection::{TokenClaims, TokenIntrospector, UserInfo};
pub use request_context::{CORRELATION_ID_HEADER, CorrelationId, TEST_EXCEPTION_HEADER};
pub use resolver::{ClaimsResolver, bearer_token};
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, middleware, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The claimgate API server.
pub struct Server {
    /// Application state.
    state: AppState,
}

impl Server {
    /// Create a server with a fresh claims cache built from `config.cache`.
    pub fn new(config: ServerConfig, authenticator: Arc<dyn Authenticator>) -> Self {
        let cache = ClaimsCache::new(config.cache.clone());
        let resolver = ClaimsResolver::new(cache, authenticator);
        Self {
            state: AppState::new(config, resolver),
        }
    }

    /// Create a server from a pre-built application state.
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        Router::new()
            .merge(routes::health_routes())
            .nest("/api", self.api_routes())
            // Unsecured prefixes are skipped inside the middleware
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                auth::auth_middleware,
            ))
            .layer(TraceLayer::new_for_http().make_span_with(request_context::make_request_span))
            .layer(middleware::from_fn(request_context::correlation_middleware))
            .with_state(self.state.clone())
    }

    fn api_routes(&self) -> Router<AppState> {
        Router::new()
            .route("/userinfo", get(routes::userinfo_handler))
            // Runs after authorization, so only authenticated callers can trigger it
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                request_context::exception_simulation_middleware,
            ))
    }

    /// Run the server.
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.bind_address;
        self.run_on(addr).await
    }

    /// Run the server on a specific address (useful for testing).
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        let router = self.router();
        let cleanup = self.state.resolver.cache().spawn_cleanup_task();

        info!(api = %self.state.config.api_name, "Starting server on {}", addr);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind: {}", e)))?;

        let served = axum::serve(listener, router)
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {}", e)));

        if let Some(task) = cleanup {
            task.abort();
        }
        served
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}
