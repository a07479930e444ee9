//! Per-request claims resolution.

use std::sync::Arc;

use axum::http::{HeaderMap, header::AUTHORIZATION};
use tracing::debug;

use crate::authenticator::Authenticator;
use crate::claims::{Claims, ClaimsCache, CustomClaimsProvider, NoCustomClaims};
use crate::error::{Result, ServerError};

/// Resolves the caller's claims, consulting the cache first.
///
/// Concurrent requests with the same uncached token may each authenticate.
/// Their cache writes are equivalent, so the last one wins.
#[derive(Clone)]
pub struct ClaimsResolver {
    cache: ClaimsCache,
    authenticator: Arc<dyn Authenticator>,
    custom: Arc<dyn CustomClaimsProvider>,
}

impl ClaimsResolver {
    pub fn new(cache: ClaimsCache, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            cache,
            authenticator,
            custom: Arc::new(NoCustomClaims),
        }
    }

    /// Set the provider of API-specific claims.
    pub fn with_custom_claims(mut self, provider: Arc<dyn CustomClaimsProvider>) -> Self {
        self.custom = provider;
        self
    }

    /// Whether callers must present a bearer token.
    pub fn validates_bearer_token(&self) -> bool {
        self.authenticator.validates_bearer_token()
    }

    pub fn cache(&self) -> &ClaimsCache {
        &self.cache
    }

    /// Resolve claims for a request.
    pub async fn authorize(&self, headers: &HeaderMap) -> Result<Arc<Claims>> {
        if !self.authenticator.validates_bearer_token() {
            let result = self.authenticator.authenticate(None, headers).await?;
            return self.apply_custom_claims(result.claims).await;
        }

        let token = bearer_token(headers)
            .ok_or_else(|| ServerError::unauthorized("No access token was supplied"))?;

        if let Some(claims) = self.cache.lookup(token).await {
            debug!("Claims cache hit");
            return Ok(claims);
        }
        debug!("Claims cache miss");

        let result = self.authenticator.authenticate(Some(token), headers).await?;
        let claims = self.apply_custom_claims(result.claims).await?;

        self.cache
            .store_until(token, claims.clone(), result.expiry)
            .await;
        Ok(claims)
    }

    async fn apply_custom_claims(&self, mut claims: Claims) -> Result<Arc<Claims>> {
        let custom = self.custom.custom_claims(&claims).await?;
        claims.custom.extend(custom);
        Ok(Arc::new(claims))
    }
}

/// The token from an `Authorization: Bearer <token>` header.
///
/// The value must be exactly two space-separated parts.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator::AuthenticatedClaims;
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use claimgate_cache::{CacheConfig, ManualClock};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const NOW: i64 = 1_700_000_000;

    struct CountingAuthenticator {
        calls: AtomicUsize,
        expiry: i64,
    }

    #[async_trait]
    impl Authenticator for CountingAuthenticator {
        fn validates_bearer_token(&self) -> bool {
            true
        }

        async fn authenticate(
            &self,
            access_token: Option<&str>,
            _headers: &HeaderMap,
        ) -> Result<AuthenticatedClaims> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if access_token == Some("inactive") {
                return Err(ServerError::unauthorized("inactive"));
            }
            Ok(AuthenticatedClaims {
                claims: Claims {
                    user_id: "u1".to_string(),
                    client_id: "web".to_string(),
                    scope: vec!["openid".to_string()],
                    given_name: "Guest".to_string(),
                    family_name: "User".to_string(),
                    email: "guest@example.com".to_string(),
                    custom: BTreeMap::new(),
                },
                expiry: self.expiry,
            })
        }
    }

    struct RegionClaims;

    #[async_trait]
    impl CustomClaimsProvider for RegionClaims {
        async fn custom_claims(
            &self,
            claims: &Claims,
        ) -> Result<BTreeMap<String, serde_json::Value>> {
            let mut custom = BTreeMap::new();
            custom.insert(
                "regions".to_string(),
                serde_json::json!([format!("{}-region", claims.user_id)]),
            );
            Ok(custom)
        }
    }

    fn resolver(expiry: i64) -> (ClaimsResolver, Arc<CountingAuthenticator>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(NOW));
        let cache = ClaimsCache::with_clock(
            CacheConfig::default().with_cleanup_task(false),
            clock.clone(),
        );
        let authenticator = Arc::new(CountingAuthenticator {
            calls: AtomicUsize::new(0),
            expiry,
        });
        (ClaimsResolver::new(cache, authenticator.clone()), authenticator, clock)
    }

    fn bearer(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&bearer("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&bearer("bearer abc")), None);
        assert_eq!(bearer_token(&bearer("Bearer")), None);
        assert_eq!(bearer_token(&bearer("Bearer a b")), None);
        assert_eq!(bearer_token(&bearer("Basic abc")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let (resolver, authenticator, _) = resolver(NOW + 600);
        let err = resolver.authorize(&HeaderMap::new()).await.unwrap_err();
        assert!(matches!(err, ServerError::Unauthorized(_)));
        assert_eq!(authenticator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_second_request_uses_cache() {
        let (resolver, authenticator, _) = resolver(NOW + 600);
        let headers = bearer("Bearer t1");

        let first = resolver.authorize(&headers).await.unwrap();
        let second = resolver.authorize(&headers).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(authenticator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_reauthenticates() {
        let (resolver, authenticator, clock) = resolver(NOW + 600);
        let headers = bearer("Bearer t1");

        resolver.authorize(&headers).await.unwrap();
        clock.advance(Duration::from_secs(601));
        resolver.authorize(&headers).await.unwrap();

        assert_eq!(authenticator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let (resolver, authenticator, _) = resolver(NOW + 600);
        let headers = bearer("Bearer inactive");

        assert!(resolver.authorize(&headers).await.is_err());
        assert!(resolver.authorize(&headers).await.is_err());
        assert_eq!(authenticator.calls.load(Ordering::SeqCst), 2);
        assert!(resolver.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_already_expired_token_is_not_cached() {
        let (resolver, _, _) = resolver(NOW - 1);
        resolver.authorize(&bearer("Bearer t1")).await.unwrap();
        assert!(resolver.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_custom_claims_are_merged() {
        let (resolver, _, _) = resolver(NOW + 600);
        let resolver = resolver.with_custom_claims(Arc::new(RegionClaims));

        let claims = resolver.authorize(&bearer("Bearer t1")).await.unwrap();
        assert_eq!(
            claims.custom_claim("regions"),
            Some(&serde_json::json!(["u1-region"]))
        );
    }

    #[tokio::test]
    async fn test_concurrent_requests_agree() {
        let (resolver, _, _) = resolver(NOW + 600);
        let headers = bearer("Bearer t-new");

        let (a, b) = tokio::join!(resolver.authorize(&headers), resolver.authorize(&headers));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(resolver.cache().len().await, 1);
    }
}
