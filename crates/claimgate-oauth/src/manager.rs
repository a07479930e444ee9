//! Desktop token lifecycle: interactive login, refresh, logout.
//!
//! ```text
//! LoggedOut ──login()──▶ LoginInFlight ──code exchanged──▶ LoggedIn
//!     ▲                        │                            │   ▲
//!     └──── cancel / timeout ──┘        refresh_access_token()  │
//!     ▲                                                     ▼   │
//!     └──────── invalid_grant / logout() ─────────── RefreshInFlight
//! ```
//!
//! Tokens live in memory only.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::browser::{BrowserLauncher, SystemBrowser};
use crate::correlation::LoginCorrelationStore;
use crate::error::{ErrorCode, OAuthError, Result};
use crate::loopback::{LoopbackConfig, LoopbackListener};
use crate::metadata::{AuthorizationServerMetadata, MetadataResolver};
use crate::pkce::{AuthorizationRequest, PkceChallenge, build_authorization_url, generate_state};
use crate::token_client::TokenClient;

/// Default time to wait for the browser redirect.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Settings for a desktop OAuth client.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub authority: String,
    pub client_id: String,
    pub scope: String,
    pub loopback: LoopbackConfig,
    pub login_timeout: Duration,
}

impl OAuthConfig {
    pub fn new(authority: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            client_id: client_id.into(),
            scope: "openid profile email".to_string(),
            loopback: LoopbackConfig::default(),
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_loopback(mut self, loopback: LoopbackConfig) -> Self {
        self.loopback = loopback;
        self
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Tokens held by the manager.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shown = |t: &Option<String>| if t.is_some() { "<present>" } else { "<none>" };
        f.debug_struct("TokenSet")
            .field("access_token", &shown(&self.access_token))
            .field("refresh_token", &shown(&self.refresh_token))
            .field("id_token", &shown(&self.id_token))
            .finish()
    }
}

/// Observable state of the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    LoggedOut,
    LoginInFlight,
    LoggedIn,
    RefreshInFlight,
}

/// Sets a flag for as long as it is alive.
struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Tears down a login attempt on every exit path.
struct AttemptGuard<'a> {
    manager: &'a TokenLifecycleManager,
    state: String,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        self.manager.store.abandon(&self.state);
        self.manager.listener.stop();
        let mut pending = self.manager.pending_state.lock();
        if pending.as_deref() == Some(self.state.as_str()) {
            *pending = None;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TokenLifecycleManager
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the desktop token set and every operation that changes it.
pub struct TokenLifecycleManager {
    config: OAuthConfig,
    metadata: MetadataResolver,
    token_client: TokenClient,
    tokens: RwLock<Option<TokenSet>>,

    refresh_lock: tokio::sync::Mutex<()>,
    refresh_generation: AtomicU64,
    last_refresh: Mutex<Option<Result<String>>>,
    refreshing: AtomicBool,

    login_lock: tokio::sync::Mutex<()>,
    logging_in: AtomicBool,
    pending_state: Mutex<Option<String>>,
    store: Arc<LoginCorrelationStore>,
    listener: LoopbackListener,
    browser: Arc<dyn BrowserLauncher>,
}

impl TokenLifecycleManager {
    /// Create a manager that opens the system browser.
    pub fn new(config: OAuthConfig) -> Self {
        Self::with_http_client(config, reqwest::Client::new())
    }

    /// Create a manager with a preconfigured HTTP client.
    pub fn with_http_client(config: OAuthConfig, http: reqwest::Client) -> Self {
        let store = Arc::new(LoginCorrelationStore::new());
        Self {
            metadata: MetadataResolver::new(http.clone(), config.authority.clone()),
            token_client: TokenClient::new(http, config.client_id.clone()),
            tokens: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
            refresh_generation: AtomicU64::new(0),
            last_refresh: Mutex::new(None),
            refreshing: AtomicBool::new(false),
            login_lock: tokio::sync::Mutex::new(()),
            logging_in: AtomicBool::new(false),
            pending_state: Mutex::new(None),
            listener: LoopbackListener::new(config.loopback.clone(), store.clone()),
            store,
            browser: Arc::new(SystemBrowser),
            config,
        }
    }

    /// Replace the browser launcher.
    pub fn with_browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = browser;
        self
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ManagerState {
        if self.logging_in.load(Ordering::SeqCst) {
            ManagerState::LoginInFlight
        } else if self.refreshing.load(Ordering::SeqCst) {
            ManagerState::RefreshInFlight
        } else if self.tokens.read().is_some() {
            ManagerState::LoggedIn
        } else {
            ManagerState::LoggedOut
        }
    }

    /// Snapshot of the current tokens.
    pub fn tokens(&self) -> Option<TokenSet> {
        self.tokens.read().clone()
    }

    /// Authorization server metadata, fetched on first use.
    pub async fn metadata(&self) -> Result<&AuthorizationServerMetadata> {
        self.metadata.get().await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Login
    // ─────────────────────────────────────────────────────────────────────────

    /// Run an interactive PKCE login through the browser.
    ///
    /// Only one login may run at a time; a concurrent call fails with
    /// [`OAuthError::LoginInProgress`].
    pub async fn login(&self) -> Result<()> {
        let _login = self
            .login_lock
            .try_lock()
            .map_err(|_| OAuthError::LoginInProgress)?;
        let _in_flight = FlagGuard::raise(&self.logging_in);

        let metadata = self.metadata.get().await?;
        let pkce = PkceChallenge::generate();
        let state = generate_state();

        let receiver = self.store.register(&state);
        *self.pending_state.lock() = Some(state.clone());
        let _attempt = AttemptGuard {
            manager: self,
            state: state.clone(),
        };

        let port = self.listener.start().await?;
        let redirect_uri = self.config.loopback.redirect_uri(port);
        let url = build_authorization_url(&AuthorizationRequest {
            authorization_endpoint: &metadata.authorization_endpoint,
            client_id: &self.config.client_id,
            redirect_uri: &redirect_uri,
            scope: &self.config.scope,
            challenge: &pkce.challenge,
            state: &state,
        });

        info!(port, "Opening browser for login");
        self.browser
            .open(&url)
            .await
            .map_err(|e| OAuthError::LoginRequestFailed(format!("Failed to open browser: {}", e)))?;

        let response = match tokio::time::timeout(self.config.login_timeout, receiver).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                info!("Login abandoned");
                return Err(OAuthError::LoginCancelled);
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.config.login_timeout.as_secs(),
                    "Timed out waiting for login response"
                );
                return Err(OAuthError::LoginCancelled);
            }
        };

        if let Some(code) = response.error {
            warn!(error = %code, "Login response returned an error");
            return Err(OAuthError::LoginFailed {
                code,
                description: response.error_description,
            });
        }
        let code = response.code.ok_or_else(|| OAuthError::LoginFailed {
            code: "missing_code".to_string(),
            description: None,
        })?;

        let endpoint = &metadata.token_endpoint;
        let granted = self
            .token_client
            .exchange_code(endpoint, &code, &pkce.verifier, &redirect_uri)
            .await
            .map_err(|e| e.into_operation(ErrorCode::AuthorizationCodeGrantFailed, endpoint))?;

        *self.tokens.write() = Some(TokenSet {
            access_token: Some(granted.access_token),
            refresh_token: granted.refresh_token.filter(|t| !t.is_empty()),
            id_token: granted.id_token.filter(|t| !t.is_empty()),
        });
        info!("Login completed");
        Ok(())
    }

    /// Abandon the in-flight login, if any. The waiting `login()` returns
    /// [`OAuthError::LoginCancelled`].
    pub fn cancel_login(&self) -> bool {
        match self.pending_state.lock().take() {
            Some(state) => self.store.abandon(&state),
            None => false,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tokens
    // ─────────────────────────────────────────────────────────────────────────

    /// Current access token, refreshing once if there is none.
    ///
    /// Never starts an interactive login.
    pub async fn get_access_token(&self) -> Result<String> {
        let current = self
            .tokens
            .read()
            .as_ref()
            .and_then(|t| t.access_token.clone());
        match current {
            Some(token) => Ok(token),
            None => self.refresh_access_token().await,
        }
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Overlapping calls are serialized; a caller that waited behind an
    /// in-flight refresh receives that refresh's outcome.
    pub async fn refresh_access_token(&self) -> Result<String> {
        let observed = self.refresh_generation.load(Ordering::Acquire);
        let _serialized = self.refresh_lock.lock().await;

        if self.refresh_generation.load(Ordering::Acquire) != observed
            && let Some(outcome) = self.last_refresh.lock().clone()
        {
            debug!("Reusing result of refresh that completed while waiting");
            return outcome;
        }

        let outcome = {
            let _in_flight = FlagGuard::raise(&self.refreshing);
            self.perform_refresh().await
        };

        *self.last_refresh.lock() = Some(outcome.clone());
        self.refresh_generation.fetch_add(1, Ordering::Release);
        outcome
    }

    async fn perform_refresh(&self) -> Result<String> {
        let refresh_token = self
            .tokens
            .read()
            .as_ref()
            .and_then(|t| t.refresh_token.clone());
        let Some(refresh_token) = refresh_token else {
            debug!("No refresh token available");
            return Err(OAuthError::LoginRequired);
        };

        let metadata = self.metadata.get().await?;
        let endpoint = &metadata.token_endpoint;

        match self
            .token_client
            .refresh(endpoint, &refresh_token, &self.config.scope)
            .await
        {
            Ok(granted) => {
                let mut tokens = self.tokens.write();
                let Some(previous) = tokens.take() else {
                    // Logged out while the refresh was in flight.
                    return Err(OAuthError::LoginRequired);
                };

                let access_token = granted.access_token;
                *tokens = Some(TokenSet {
                    access_token: Some(access_token.clone()),
                    refresh_token: granted
                        .refresh_token
                        .filter(|t| !t.is_empty())
                        .or(previous.refresh_token),
                    id_token: granted
                        .id_token
                        .filter(|t| !t.is_empty())
                        .or(previous.id_token),
                });
                info!("Access token refreshed");
                Ok(access_token)
            }
            Err(e) if e.is_protocol("invalid_grant") => {
                warn!("Refresh token rejected, clearing tokens");
                *self.tokens.write() = None;
                Err(OAuthError::LoginRequired)
            }
            Err(e) => Err(e.into_operation(ErrorCode::TokenRefreshFailed, endpoint)),
        }
    }

    /// Corrupt the access token so the next API call is rejected.
    pub fn expire_access_token(&self) {
        if let Some(token) = self
            .tokens
            .write()
            .as_mut()
            .and_then(|t| t.access_token.as_mut())
        {
            token.push('x');
        }
    }

    /// Corrupt the refresh token and drop the access token, so the next
    /// refresh is rejected.
    pub fn expire_refresh_token(&self) {
        if let Some(tokens) = self.tokens.write().as_mut() {
            if let Some(token) = tokens.refresh_token.as_mut() {
                token.push('x');
            }
            tokens.access_token = None;
        }
    }

    /// Forget all tokens. No call is made to the authorization server.
    ///
    /// A caller still queued behind a refresh that finished before logout
    /// must not be handed that refresh's token.
    pub fn logout(&self) {
        *self.tokens.write() = None;
        *self.last_refresh.lock() = None;
        self.refresh_generation.fetch_add(1, Ordering::Release);
        info!("Logged out");
    }

    #[cfg(test)]
    pub(crate) fn set_tokens(&self, tokens: TokenSet) {
        *self.tokens.write() = Some(tokens);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
