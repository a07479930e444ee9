//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::resolver::ClaimsResolver;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,

    /// Resolves claims for secured requests.
    pub resolver: Arc<ClaimsResolver>,
}

impl AppState {
    pub fn new(config: ServerConfig, resolver: ClaimsResolver) -> Self {
        Self {
            config: Arc::new(config),
            resolver: Arc::new(resolver),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
