//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [api]        # claims-resolving API
//! [cache]      # claims cache bounds
//! [desktop]    # interactive PKCE login
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimgateConfig {
    /// API settings.
    pub api: Option<ApiConfig>,

    /// Claims cache settings.
    pub cache: Option<CacheSection>,

    /// Desktop login settings.
    pub desktop: Option<DesktopConfig>,
}

impl ClaimgateConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Merging is per section: a section present in `other` replaces the
    /// whole section here.
    pub fn merge(&mut self, other: ClaimgateConfig) {
        if other.api.is_some() {
            self.api = other.api;
        }
        if other.cache.is_some() {
            self.cache = other.cache;
        }
        if other.desktop.is_some() {
            self.desktop = other.desktop;
        }
    }

    /// The `[api]` section, validated.
    pub fn api(&self) -> Result<&ApiConfig> {
        let api = self
            .api
            .as_ref()
            .ok_or_else(|| ConfigError::missing("api", "config"))?;
        api.validate()?;
        Ok(api)
    }

    /// The `[cache]` section, falling back to defaults, validated.
    pub fn cache(&self) -> Result<CacheSection> {
        let cache = self.cache.clone().unwrap_or_default();
        cache.validate()?;
        Ok(cache)
    }

    /// The `[desktop]` section, validated.
    pub fn desktop(&self) -> Result<&DesktopConfig> {
        let desktop = self
            .desktop
            .as_ref()
            .ok_or_else(|| ConfigError::missing("desktop", "config"))?;
        desktop.validate()?;
        Ok(desktop)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API
// ─────────────────────────────────────────────────────────────────────────────

/// How the API turns an access token into claims.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticatorKind {
    /// Introspect the token and look up user info at the authorization server.
    #[default]
    Introspection,
    /// Read pre-resolved claims from headers set by a trusted upstream API.
    Headers,
}

/// `[api]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Authorization server base URL (the OpenID issuer).
    pub authority: Option<String>,

    /// Client id used to authenticate introspection calls.
    pub client_id: Option<String>,

    /// Client secret. Prefer the `CLAIMGATE_CLIENT_SECRET` env var.
    pub client_secret: Option<String>,

    /// Name reported as the `area` of error responses.
    pub api_name: String,

    /// Address the API listens on.
    pub bind_address: String,

    /// Path prefixes that skip authentication.
    pub unsecured_paths: Vec<String>,

    /// Authenticator implementation.
    pub authenticator: AuthenticatorKind,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            authority: None,
            client_id: None,
            client_secret: None,
            api_name: "SampleApi".to_string(),
            bind_address: "127.0.0.1:3100".to_string(),
            unsecured_paths: vec!["/health".to_string()],
            authenticator: AuthenticatorKind::Introspection,
        }
    }
}

impl ApiConfig {
    /// Check required fields for the configured authenticator.
    pub fn validate(&self) -> Result<()> {
        if self.authenticator == AuthenticatorKind::Introspection {
            self.authority_url()?;
            if self.client_id.as_deref().is_none_or(str::is_empty) {
                return Err(ConfigError::missing("client_id", "[api]"));
            }
        }
        Ok(())
    }

    /// The authority as a parsed URL.
    pub fn authority_url(&self) -> Result<Url> {
        parse_authority(self.authority.as_deref(), "[api]")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cache
// ─────────────────────────────────────────────────────────────────────────────

/// Default maximum time a token's claims stay cached (30 minutes).
pub const DEFAULT_MAX_TTL_SECS: u64 = 30 * 60;

/// Default maximum number of cached tokens.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Default interval between expired-entry sweeps.
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Upper bound on how long claims are cached, whatever the token expiry.
    pub max_ttl_secs: u64,

    /// Maximum number of cached tokens before LRU eviction.
    pub max_entries: usize,

    /// Interval for the background sweep.
    pub cleanup_interval_secs: u64,

    /// Whether to run the background sweep at all.
    pub enable_cleanup_task: bool,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_ttl_secs: DEFAULT_MAX_TTL_SECS,
            max_entries: DEFAULT_MAX_ENTRIES,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
            enable_cleanup_task: true,
        }
    }
}

impl CacheSection {
    /// Reject values the background sweep cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.cleanup_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "cleanup_interval_secs",
                "[cache]",
                "must be at least 1 second",
            ));
        }
        Ok(())
    }

    pub fn max_ttl(&self) -> Duration {
        Duration::from_secs(self.max_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Desktop
// ─────────────────────────────────────────────────────────────────────────────

/// Default login timeout (5 minutes).
pub const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 300;

/// `[desktop]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DesktopConfig {
    /// Authorization server base URL (the OpenID issuer).
    pub authority: Option<String>,

    /// Public client id of the desktop app.
    pub client_id: Option<String>,

    /// Space-separated scopes to request.
    pub scope: String,

    /// Host the loopback listener binds to and the redirect URI names.
    pub loopback_hostname: String,

    /// Lowest port the loopback listener may bind.
    pub loopback_min_port: u16,

    /// Highest port the loopback listener may bind.
    pub loopback_max_port: u16,

    /// Path the browser is redirected to on the loopback listener.
    pub redirect_path: String,

    /// Page the browser is sent to once the listener has the response.
    pub post_login_page: String,

    /// How long an interactive login may wait for the browser.
    pub login_timeout_secs: u64,
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            authority: None,
            client_id: None,
            scope: "openid profile email".to_string(),
            loopback_hostname: "127.0.0.1".to_string(),
            loopback_min_port: 8001,
            loopback_max_port: 8003,
            redirect_path: "/callback".to_string(),
            post_login_page: "https://authsamples.com/apps/desktop/postlogin.html".to_string(),
            login_timeout_secs: DEFAULT_LOGIN_TIMEOUT_SECS,
        }
    }
}

impl DesktopConfig {
    /// Check required fields and ranges.
    pub fn validate(&self) -> Result<()> {
        self.authority_url()?;
        if self.client_id.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::missing("client_id", "[desktop]"));
        }
        if self.loopback_min_port > self.loopback_max_port {
            return Err(ConfigError::invalid(
                "loopback_min_port",
                "[desktop]",
                format!(
                    "{} is above loopback_max_port {}",
                    self.loopback_min_port, self.loopback_max_port
                ),
            ));
        }
        if !self.redirect_path.starts_with('/') {
            return Err(ConfigError::invalid(
                "redirect_path",
                "[desktop]",
                "must start with '/'",
            ));
        }
        Url::parse(&self.post_login_page)
            .map_err(|e| ConfigError::invalid("post_login_page", "[desktop]", e.to_string()))?;
        Ok(())
    }

    /// The authority as a parsed URL.
    pub fn authority_url(&self) -> Result<Url> {
        parse_authority(self.authority.as_deref(), "[desktop]")
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }
}

fn parse_authority(authority: Option<&str>, context: &str) -> Result<Url> {
    let raw = authority
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ConfigError::missing("authority", context))?;
    Url::parse(raw).map_err(|e| ConfigError::invalid("authority", context, e.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
