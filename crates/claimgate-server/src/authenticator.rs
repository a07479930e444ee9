//! Authenticators turn an incoming request into core claims.
//!
//! Public APIs use [`IntrospectionAuthenticator`], which calls the
//! authorization server. Private APIs sitting behind a trusted gateway use
//! [`HeaderAuthenticator`], which reads claims the gateway already resolved.

use std::collections::BTreeMap;

use async_trait::async_trait;
use axum::http::HeaderMap;

use crate::claims::{Claims, split_scope};
use crate::error::{Result, ServerError};
use crate::introspection::TokenIntrospector;

// ─────────────────────────────────────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Core claims plus the time they stop being valid.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedClaims {
    pub claims: Claims,
    /// Unix time at which the claims expire.
    pub expiry: i64,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Whether this authenticator needs a bearer token.
    ///
    /// When false, the resolver neither requires the token nor caches.
    fn validates_bearer_token(&self) -> bool;

    async fn authenticate(
        &self,
        access_token: Option<&str>,
        headers: &HeaderMap,
    ) -> Result<AuthenticatedClaims>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Introspection
// ─────────────────────────────────────────────────────────────────────────────

/// Validates the token, then looks up the user's identity.
#[derive(Debug)]
pub struct IntrospectionAuthenticator {
    introspector: TokenIntrospector,
}

impl IntrospectionAuthenticator {
    pub fn new(introspector: TokenIntrospector) -> Self {
        Self { introspector }
    }
}

#[async_trait]
impl Authenticator for IntrospectionAuthenticator {
    fn validates_bearer_token(&self) -> bool {
        true
    }

    async fn authenticate(
        &self,
        access_token: Option<&str>,
        _headers: &HeaderMap,
    ) -> Result<AuthenticatedClaims> {
        let token = access_token
            .ok_or_else(|| ServerError::unauthorized("No access token was supplied"))?;

        let token_claims = self.introspector.validate(token).await?;
        let user_info = self.introspector.fetch_user_info(token).await?;

        Ok(AuthenticatedClaims {
            claims: Claims {
                user_id: token_claims.subject,
                client_id: token_claims.client_id,
                scope: token_claims.scope,
                given_name: user_info.given_name,
                family_name: user_info.family_name,
                email: user_info.email,
                custom: BTreeMap::new(),
            },
            expiry: token_claims.expiry,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Headers
// ─────────────────────────────────────────────────────────────────────────────

pub const USER_ID_HEADER: &str = "x-claimgate-user-id";
pub const CLIENT_ID_HEADER: &str = "x-claimgate-client-id";
pub const SCOPE_HEADER: &str = "x-claimgate-scope";
pub const EXPIRY_HEADER: &str = "x-claimgate-expiry";
pub const GIVEN_NAME_HEADER: &str = "x-claimgate-given-name";
pub const FAMILY_NAME_HEADER: &str = "x-claimgate-family-name";
pub const EMAIL_HEADER: &str = "x-claimgate-email";

/// Reads claims forwarded by a trusted gateway.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderAuthenticator;

#[async_trait]
impl Authenticator for HeaderAuthenticator {
    fn validates_bearer_token(&self) -> bool {
        false
    }

    async fn authenticate(
        &self,
        _access_token: Option<&str>,
        headers: &HeaderMap,
    ) -> Result<AuthenticatedClaims> {
        let expiry_value = required_header(headers, EXPIRY_HEADER)?;
        let expiry = expiry_value
            .parse::<i64>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| ServerError::missing_claim(EXPIRY_HEADER))?;

        Ok(AuthenticatedClaims {
            claims: Claims {
                user_id: required_header(headers, USER_ID_HEADER)?,
                client_id: required_header(headers, CLIENT_ID_HEADER)?,
                scope: split_scope(&required_header(headers, SCOPE_HEADER)?),
                given_name: required_header(headers, GIVEN_NAME_HEADER)?,
                family_name: required_header(headers, FAMILY_NAME_HEADER)?,
                email: required_header(headers, EMAIL_HEADER)?,
                custom: BTreeMap::new(),
            },
            expiry,
        })
    }
}

fn required_header(headers: &HeaderMap, name: &str) -> Result<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ServerError::missing_claim(name))
}
