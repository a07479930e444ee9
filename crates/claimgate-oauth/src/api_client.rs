//! Calls an API with the desktop access token.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::{OAuthError, Result};
use crate::manager::TokenLifecycleManager;

/// Sends bearer-authenticated requests, refreshing once when the API
/// answers `401`.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    manager: Arc<TokenLifecycleManager>,
}

impl ApiClient {
    pub fn new(http: reqwest::Client, manager: Arc<TokenLifecycleManager>) -> Self {
        Self { http, manager }
    }

    /// GET `url` and decode the JSON body.
    ///
    /// A `401` triggers one refresh and one retry. If the refresh needs a new
    /// login, [`OAuthError::LoginRequired`] is returned.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let token = self.manager.get_access_token().await?;
        let mut response = self.send(url, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!(url, "API rejected access token, refreshing");
            let token = self.manager.refresh_access_token().await?;
            response = self.send(url, &token).await?;
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::ApiRequest {
                status: Some(status.as_u16()),
                message: api_error_message(&body).unwrap_or_else(|| status.to_string()),
            });
        }

        response.json().await.map_err(|e| OAuthError::ApiRequest {
            status: Some(status.as_u16()),
            message: format!("Failed to parse response: {}", e),
        })
    }

    async fn send(&self, url: &str, token: &str) -> Result<reqwest::Response> {
        self.http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| OAuthError::ApiRequest {
                status: None,
                message: e.to_string(),
            })
    }
}

/// Pull `message` out of a claimgate JSON error body, if present.
fn api_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("message")?.as_str().map(str::to_string)
}
