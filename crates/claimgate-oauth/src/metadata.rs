//! OpenID Connect discovery.

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::error::{ErrorCode, OAuthError, Result};

const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// The subset of the discovery document claimgate uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub introspection_endpoint: Option<String>,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

impl AuthorizationServerMetadata {
    /// Fetch the discovery document for `authority`.
    pub async fn discover(http: &reqwest::Client, authority: &str) -> Result<Self> {
        let url = discovery_url(authority);
        tracing::debug!(url = %url, "Fetching authorization server metadata");

        let response = http
            .get(&url)
            .send()
            .await
            .map_err(|e| OAuthError::operation(ErrorCode::MetadataLookupFailure, e.to_string(), &url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OAuthError::operation(
                ErrorCode::MetadataLookupFailure,
                format!("Discovery returned status {}", status.as_u16()),
                &url,
            ));
        }

        response.json().await.map_err(|e| {
            OAuthError::operation(
                ErrorCode::MetadataLookupFailure,
                format!("Failed to parse discovery document: {}", e),
                &url,
            )
        })
    }

    /// Introspection endpoint, or a metadata failure if the server has none.
    pub fn require_introspection_endpoint(&self) -> Result<&str> {
        self.introspection_endpoint.as_deref().ok_or_else(|| {
            OAuthError::operation(
                ErrorCode::MetadataLookupFailure,
                "Authorization server does not advertise an introspection endpoint",
                &self.issuer,
            )
        })
    }

    /// Userinfo endpoint, or a metadata failure if the server has none.
    pub fn require_userinfo_endpoint(&self) -> Result<&str> {
        self.userinfo_endpoint.as_deref().ok_or_else(|| {
            OAuthError::operation(
                ErrorCode::MetadataLookupFailure,
                "Authorization server does not advertise a userinfo endpoint",
                &self.issuer,
            )
        })
    }
}

fn discovery_url(authority: &str) -> String {
    format!("{}{}", authority.trim_end_matches('/'), DISCOVERY_PATH)
}

/// Fetches the discovery document on first use and keeps it for the
/// component's lifetime. A failed lookup is retried on the next call.
#[derive(Debug)]
pub struct MetadataResolver {
    authority: String,
    http: reqwest::Client,
    metadata: OnceCell<AuthorizationServerMetadata>,
}

impl MetadataResolver {
    pub fn new(http: reqwest::Client, authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            http,
            metadata: OnceCell::new(),
        }
    }

    /// Get the metadata, fetching it if this is the first call.
    pub async fn get(&self) -> Result<&AuthorizationServerMetadata> {
        self.metadata
            .get_or_try_init(|| AuthorizationServerMetadata::discover(&self.http, &self.authority))
            .await
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }
}
