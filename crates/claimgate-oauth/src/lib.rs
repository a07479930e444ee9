//! OAuth 2.0 plumbing shared by the API and desktop sides of claimgate.
//!
//! # Components
//!
//! - [`pkce`] - PKCE challenge generation, state values, authorization URL
//! - [`metadata`] - OpenID discovery, fetched lazily once per component
//! - [`token_client`] - authorization-code and refresh-token grants
//! - [`correlation`] - maps a login attempt's `state` to its pending completion
//! - [`loopback`] - single-shot local listener for the browser redirect
//! - [`manager`] - desktop token lifecycle: login, refresh, logout
//! - [`api_client`] - calls an API with the current token, refreshing once on 401

pub mod api_client;
pub mod browser;
pub mod correlation;
pub mod error;
pub mod loopback;
pub mod manager;
pub mod metadata;
pub mod pkce;
pub mod token_client;

pub use api_client::ApiClient;
pub use browser::{BrowserLauncher, SystemBrowser};
pub use correlation::{LoginCorrelationStore, LoginResponse};
pub use error::{ErrorCode, OAuthError, OAuthErrorBody, Result};
pub use loopback::{LoopbackConfig, LoopbackListener};
pub use manager::{ManagerState, OAuthConfig, TokenLifecycleManager, TokenSet};
pub use metadata::{AuthorizationServerMetadata, MetadataResolver};
pub use pkce::PkceChallenge;
pub use token_client::{TokenClient, TokenResponse};
