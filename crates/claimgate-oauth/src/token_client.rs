//! Token endpoint grants.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, OAuthError, OAuthErrorBody, Result};

/// Successful token endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Posts grants to a token endpoint as a public client.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    client_id: String,
}

impl TokenClient {
    pub fn new(http: reqwest::Client, client_id: impl Into<String>) -> Self {
        Self {
            http,
            client_id: client_id.into(),
        }
    }

    /// Exchange an authorization code for tokens.
    ///
    /// An OAuth error body from the server is returned as
    /// [`OAuthError::Protocol`] so the caller can decide how to treat it.
    pub async fn exchange_code(
        &self,
        token_endpoint: &str,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", verifier),
            ("redirect_uri", redirect_uri),
            ("client_id", self.client_id.as_str()),
        ];
        self.post_form(token_endpoint, &form, ErrorCode::AuthorizationCodeGrantFailed)
            .await
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh(
        &self,
        token_endpoint: &str,
        refresh_token: &str,
        scope: &str,
    ) -> Result<TokenResponse> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("scope", scope),
        ];
        self.post_form(token_endpoint, &form, ErrorCode::TokenRefreshFailed)
            .await
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        code: ErrorCode,
    ) -> Result<TokenResponse> {
        let response = self
            .http
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| OAuthError::operation(code, format!("Request failed: {}", e), url))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OAuthError::operation(code, format!("Failed to read response: {}", e), url))?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<OAuthErrorBody>(&body) {
                return Err(OAuthError::Protocol {
                    error: err.error,
                    description: err.error_description,
                });
            }
            return Err(OAuthError::operation(
                code,
                format!("Token endpoint returned status {}", status.as_u16()),
                url,
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            OAuthError::operation(code, format!("Failed to parse token response: {}", e), url)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_exchange_code_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code_verifier=verifier-1"))
            .and(body_string_contains("client_id=desktop"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at-1",
                "refresh_token": "rt-1",
                "expires_in": 300,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = TokenClient::new(reqwest::Client::new(), "desktop");
        let tokens = client
            .exchange_code(
                &format!("{}/token", server.uri()),
                "code-1",
                "verifier-1",
                "http://127.0.0.1:8001/callback",
            )
            .await
            .unwrap();

        assert_eq!(tokens.access_token, "at-1");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt-1"));
        assert!(tokens.id_token.is_none());
    }

    #[tokio::test]
    async fn test_refresh_includes_scope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("scope=openid+profile"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "at-2"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = TokenClient::new(reqwest::Client::new(), "desktop");
        let tokens = client
            .refresh(&format!("{}/token", server.uri()), "rt-1", "openid profile")
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "at-2");
        assert!(tokens.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_oauth_error_body_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "refresh token expired",
            })))
            .mount(&server)
            .await;

        let client = TokenClient::new(reqwest::Client::new(), "desktop");
        let err = client
            .refresh(&format!("{}/token", server.uri()), "rt-1", "openid")
            .await
            .unwrap_err();
        assert!(err.is_protocol("invalid_grant"));
    }

    #[tokio::test]
    async fn test_non_oauth_failure_is_operation_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = TokenClient::new(reqwest::Client::new(), "desktop");
        let err = client
            .refresh(&format!("{}/token", server.uri()), "rt-1", "openid")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::TokenRefreshFailed));
    }
}
