//! The claims object produced for each authenticated caller.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Cache of resolved claims keyed by access token hash.
pub type ClaimsCache = claimgate_cache::TokenCache<Arc<Claims>>;

/// Everything the API knows about the caller.
///
/// Built once per resolution and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    pub client_id: String,
    pub scope: Vec<String>,
    pub given_name: String,
    pub family_name: String,
    pub email: String,
    /// Fields contributed by a [`CustomClaimsProvider`].
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, serde_json::Value>,
}

impl Claims {
    /// Whether the token was issued with `scope`.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope.iter().any(|s| s == scope)
    }

    /// A custom claim by name.
    pub fn custom_claim(&self, name: &str) -> Option<&serde_json::Value> {
        self.custom.get(name)
    }
}

/// Split a space-delimited OAuth scope string.
pub(crate) fn split_scope(scope: &str) -> Vec<String> {
    scope.split_whitespace().map(str::to_string).collect()
}

/// Adds API-specific claims after the core claims are populated.
#[async_trait]
pub trait CustomClaimsProvider: Send + Sync {
    async fn custom_claims(&self, claims: &Claims) -> Result<BTreeMap<String, serde_json::Value>>;
}

/// Contributes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCustomClaims;

#[async_trait]
impl CustomClaimsProvider for NoCustomClaims {
    async fn custom_claims(&self, _claims: &Claims) -> Result<BTreeMap<String, serde_json::Value>> {
        Ok(BTreeMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_scope() {
        assert_eq!(
            split_scope("openid  profile investments"),
            vec!["openid", "profile", "investments"]
        );
        assert!(split_scope("").is_empty());
    }

    #[test]
    fn test_serializes_camel_case() {
        let claims = Claims {
            user_id: "u1".to_string(),
            client_id: "c1".to_string(),
            scope: vec!["openid".to_string()],
            given_name: "Guest".to_string(),
            family_name: "User".to_string(),
            email: "guest@example.com".to_string(),
            custom: BTreeMap::new(),
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["givenName"], "Guest");
        assert!(json.get("custom").is_none());
        assert!(claims.has_scope("openid"));
        assert!(!claims.has_scope("admin"));
    }
}
