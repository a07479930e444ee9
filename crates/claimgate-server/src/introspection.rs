//! Token introspection (RFC 7662) and userinfo lookup.

use axum::http::{StatusCode, header::WWW_AUTHENTICATE};
use claimgate_oauth::{ErrorCode, MetadataResolver, OAuthErrorBody};
use serde_json::{Map, Value};
use tracing::debug;

use crate::claims::split_scope;
use crate::error::{Result, ServerError};

/// Claims carried by the access token itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub subject: String,
    pub client_id: String,
    pub scope: Vec<String>,
    /// Unix time at which the token expires.
    pub expiry: i64,
}

/// Identity attributes from the userinfo endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub given_name: String,
    pub family_name: String,
    pub email: String,
}

/// Validates opaque access tokens against the authorization server.
pub struct TokenIntrospector {
    http: reqwest::Client,
    metadata: MetadataResolver,
    client_id: String,
    client_secret: String,
}

impl std::fmt::Debug for TokenIntrospector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIntrospector")
            .field("metadata", &self.metadata)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl TokenIntrospector {
    pub fn new(
        http: reqwest::Client,
        authority: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            metadata: MetadataResolver::new(http.clone(), authority),
            http,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Introspect `access_token` and read its core claims.
    pub async fn validate(&self, access_token: &str) -> Result<TokenClaims> {
        let metadata = self.metadata.get().await?;
        let url = metadata
            .require_introspection_endpoint()
            .map_err(ServerError::from)?;

        let failure = |message: String| {
            ServerError::operation(
                ErrorCode::IntrospectionFailure,
                format!("Token validation failed : {}", message),
                url,
            )
        };

        let response = self
            .http
            .post(url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("token", access_token)])
            .send()
            .await
            .map_err(|e| failure(without_url(e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| failure(without_url(e)))?;

        if !status.is_success() {
            return Err(failure(describe_error_body(&body, status)));
        }

        let fields = parse_object(&body).ok_or_else(|| failure("Unparsable response".to_string()))?;

        if !fields.get("active").and_then(Value::as_bool).unwrap_or(false) {
            return Err(ServerError::unauthorized(
                "Access token is expired and failed introspection",
            ));
        }

        let subject = required_string(&fields, "uid")?;
        let client_id = required_string(&fields, "client_id")?;
        let scope = split_scope(&required_string(&fields, "scope")?);
        let expiry = required_expiry(&fields).map_err(failure)?;

        debug!(client_id = %client_id, expiry, "Token introspection succeeded");
        Ok(TokenClaims {
            subject,
            client_id,
            scope,
            expiry,
        })
    }

    /// Look up the caller's identity attributes.
    ///
    /// An `invalid_token` response means the token expired between
    /// introspection and this call, and is reported as a 401.
    pub async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo> {
        let metadata = self.metadata.get().await?;
        let url = metadata
            .require_userinfo_endpoint()
            .map_err(ServerError::from)?;

        let failure = |message: String| {
            ServerError::operation(
                ErrorCode::UserinfoFailure,
                format!("User info lookup failed : {}", message),
                url,
            )
        };

        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| failure(without_url(e)))?;

        let status = response.status();
        let challenge_invalid = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("invalid_token"));
        let body = response
            .text()
            .await
            .map_err(|e| failure(without_url(e)))?;

        if !status.is_success() {
            let body_invalid = serde_json::from_str::<OAuthErrorBody>(&body)
                .is_ok_and(|e| e.error == "invalid_token");
            if challenge_invalid || body_invalid {
                return Err(ServerError::unauthorized(
                    "Access token expired during user info lookup",
                ));
            }
            return Err(failure(describe_error_body(&body, status)));
        }

        let fields = parse_object(&body).ok_or_else(|| failure("Unparsable response".to_string()))?;
        Ok(UserInfo {
            given_name: required_string(&fields, "given_name")?,
            family_name: required_string(&fields, "family_name")?,
            email: required_string(&fields, "email")?,
        })
    }
}

fn parse_object(body: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str(body).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// A claim that must be present and non-empty.
fn required_string(fields: &Map<String, Value>, name: &str) -> Result<String> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ServerError::missing_claim(name))
}

/// The `exp` claim as a positive integer, given as a number or a string.
fn required_expiry(fields: &Map<String, Value>) -> std::result::Result<i64, String> {
    let exp = fields
        .get("exp")
        .ok_or_else(|| "Missing expiry claim".to_string())?;
    let parsed = match exp {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed
        .filter(|v| *v > 0)
        .ok_or_else(|| format!("Invalid expiry claim: {}", exp))
}

/// Summarize a failed response without echoing request data.
fn describe_error_body(body: &str, status: StatusCode) -> String {
    match serde_json::from_str::<OAuthErrorBody>(body) {
        Ok(err) => match err.error_description {
            Some(description) => format!("{}, {}", err.error, description),
            None => err.error,
        },
        Err(_) => format!("status {}", status.as_u16()),
    }
}

fn without_url(e: reqwest::Error) -> String {
    e.without_url().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_debug_redacts_client_secret() {
        let introspector = TokenIntrospector::new(
            reqwest::Client::new(),
            "https://login.example.com",
            "api-client",
            "s3cr3t-value",
        );
        let rendered = format!("{:?}", introspector);
        assert!(rendered.contains("api-client"));
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("s3cr3t-value"));
    }

    #[test]
    fn test_required_string() {
        let fields = object(json!({"uid": "u1", "email": ""}));
        assert_eq!(required_string(&fields, "uid").unwrap(), "u1");

        let err = required_string(&fields, "email").unwrap_err();
        assert!(matches!(err, ServerError::Claims { ref claim } if claim == "email"));
        assert!(required_string(&fields, "scope").is_err());
    }

    #[test]
    fn test_required_expiry() {
        assert_eq!(required_expiry(&object(json!({"exp": 1700000000}))), Ok(1_700_000_000));
        assert_eq!(required_expiry(&object(json!({"exp": "1700000000"}))), Ok(1_700_000_000));
        assert!(required_expiry(&object(json!({"exp": 0}))).is_err());
        assert!(required_expiry(&object(json!({"exp": "soon"}))).is_err());
        assert!(required_expiry(&object(json!({"exp": 1.5}))).is_err());
        assert!(required_expiry(&object(json!({}))).is_err());
    }

    #[test]
    fn test_describe_error_body() {
        assert_eq!(
            describe_error_body(
                r#"{"error":"invalid_client","error_description":"bad secret"}"#,
                StatusCode::UNAUTHORIZED
            ),
            "invalid_client, bad secret"
        );
        assert_eq!(
            describe_error_body("<html>", StatusCode::BAD_GATEWAY),
            "status 502"
        );
    }
}
