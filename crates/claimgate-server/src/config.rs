//! Server configuration.

use std::net::{Ipv4Addr, SocketAddr};

use claimgate_cache::CacheConfig;

/// Default API name reported in 5xx error bodies.
pub const DEFAULT_API_NAME: &str = "SampleApi";

/// Default bind port.
pub const DEFAULT_PORT: u16 = 8080;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to.
    pub bind_address: SocketAddr,

    /// Name reported as `area` in server error responses.
    pub api_name: String,

    /// Path prefixes served without authentication.
    pub unsecured_paths: Vec<String>,

    /// Claims cache settings.
    pub cache: CacheConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            api_name: DEFAULT_API_NAME.to_string(),
            unsecured_paths: vec!["/health".to_string()],
            cache: CacheConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(api_name: impl Into<String>) -> Self {
        Self {
            api_name: api_name.into(),
            ..Default::default()
        }
    }

    /// Set the bind address.
    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    /// Replace the unsecured path prefixes.
    pub fn with_unsecured_paths(mut self, paths: Vec<String>) -> Self {
        self.unsecured_paths = paths;
        self
    }

    /// Set the claims cache settings.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Whether `path` bypasses authentication.
    pub fn is_unsecured(&self, path: &str) -> bool {
        self.unsecured_paths
            .iter()
            .any(|prefix| path.to_lowercase().starts_with(&prefix.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address.port(), DEFAULT_PORT);
        assert_eq!(config.api_name, DEFAULT_API_NAME);
        assert!(config.is_unsecured("/health"));
        assert!(!config.is_unsecured("/api/userinfo"));
    }

    #[test]
    fn test_builders() {
        let addr: SocketAddr = "0.0.0.0:9000".parse().unwrap();
        let config = ServerConfig::new("FinalApi")
            .with_bind_address(addr)
            .with_unsecured_paths(vec!["/public".to_string()])
            .with_cache(CacheConfig::default().with_max_ttl(Duration::from_secs(60)));

        assert_eq!(config.bind_address, addr);
        assert_eq!(config.api_name, "FinalApi");
        assert!(config.is_unsecured("/Public/docs"));
        assert!(!config.is_unsecured("/health"));
        assert_eq!(config.cache.max_ttl, Duration::from_secs(60));
    }
}
