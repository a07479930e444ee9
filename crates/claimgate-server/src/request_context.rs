//! Per-request context headers.
//!
//! Every request gets a correlation id, taken from the caller's header or
//! generated. It is echoed on the response, recorded on the request span and
//! quoted in 5xx bodies. A second middleware lets testers force a 500 from a
//! named API without touching the code.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Span;

use crate::error::ServerError;
use crate::state::AppState;

/// Caller-supplied correlation id.
pub const CORRELATION_ID_HEADER: &str = "x-claimgate-correlation-id";

/// Name of the calling application, recorded on the request span.
pub const API_CLIENT_HEADER: &str = "x-claimgate-api-client";

/// Groups requests that belong to one load test or batch run.
pub const BATCH_ID_HEADER: &str = "x-claimgate-batch-id";

/// Forces a simulated exception when it names this API.
pub const TEST_EXCEPTION_HEADER: &str = "x-claimgate-test-exception";

/// Correlation id for the current request, stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Look up the correlation id placed by [`correlation_middleware`].
pub fn correlation_id(request: &Request<Body>) -> Option<&str> {
    request
        .extensions()
        .get::<CorrelationId>()
        .map(CorrelationId::as_str)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Assign a correlation id and echo it on the response.
///
/// Runs outermost so the trace span and every error body can see the id.
pub async fn correlation_middleware(mut request: Request<Body>, next: Next) -> Response {
    let id = header_str(request.headers(), CORRELATION_ID_HEADER)
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let value = HeaderValue::from_str(&id).ok();
    if let Some(value) = &value {
        request
            .headers_mut()
            .insert(CORRELATION_ID_HEADER, value.clone());
    }
    request.extensions_mut().insert(CorrelationId(id));

    let mut response = next.run(request).await;
    if let Some(value) = value {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

/// Build the span for one HTTP request.
///
/// Used with `TraceLayer::make_span_with`.
pub fn make_request_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        correlation_id = header_str(headers, CORRELATION_ID_HEADER),
        api_client = header_str(headers, API_CLIENT_HEADER),
        batch_id = header_str(headers, BATCH_ID_HEADER),
    )
}

/// Return a simulated 500 when the test-exception header names this API.
pub async fn exception_simulation_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let api_name = &state.config().api_name;
    let requested = header_str(request.headers(), TEST_EXCEPTION_HEADER)
        .is_some_and(|name| name.eq_ignore_ascii_case(api_name));

    if requested {
        return ServerError::ExceptionSimulation
            .into_response_for(api_name, correlation_id(&request));
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{Router, http::StatusCode, middleware, routing::get};
    use tower::ServiceExt;

    use crate::authenticator::HeaderAuthenticator;
    use crate::claims::ClaimsCache;
    use crate::config::ServerConfig;
    use crate::resolver::ClaimsResolver;
    use claimgate_cache::CacheConfig;

    fn app() -> Router {
        let resolver = ClaimsResolver::new(
            ClaimsCache::new(CacheConfig::default().with_cleanup_task(false)),
            Arc::new(HeaderAuthenticator),
        );
        let state = AppState::new(ServerConfig::new("SampleApi"), resolver);
        Router::new()
            .route(
                "/echo",
                get(|request: Request<Body>| async move {
                    correlation_id(&request).unwrap_or_default().to_string()
                }),
            )
            .layer(middleware::from_fn_with_state(
                state.clone(),
                exception_simulation_middleware,
            ))
            .layer(middleware::from_fn(correlation_middleware))
            .with_state(state)
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_caller_correlation_id_is_echoed() {
        let request = Request::builder()
            .uri("/echo")
            .header(CORRELATION_ID_HEADER, "abc-123")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CORRELATION_ID_HEADER], "abc-123");
        assert_eq!(body_string(response).await, "abc-123");
    }

    #[tokio::test]
    async fn test_correlation_id_generated_when_absent() {
        let request = Request::builder().uri("/echo").body(Body::empty()).unwrap();

        let response = app().oneshot(request).await.unwrap();
        let echoed = response.headers()[CORRELATION_ID_HEADER]
            .to_str()
            .unwrap()
            .to_string();
        assert!(uuid::Uuid::parse_str(&echoed).is_ok());
        assert_eq!(body_string(response).await, echoed);
    }

    #[tokio::test]
    async fn test_exception_simulation_matches_api_name() {
        let request = Request::builder()
            .uri("/echo")
            .header(TEST_EXCEPTION_HEADER, "sampleapi")
            .header(CORRELATION_ID_HEADER, "load-7")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CORRELATION_ID_HEADER], "load-7");

        let body: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["code"], "exception_simulation");
        assert_eq!(body["area"], "SampleApi");
        assert_eq!(body["correlationId"], "load-7");
    }

    #[tokio::test]
    async fn test_exception_simulation_ignores_other_apis() {
        let request = Request::builder()
            .uri("/echo")
            .header(TEST_EXCEPTION_HEADER, "OtherApi")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_header_str_ignores_blank_values() {
        let mut headers = HeaderMap::new();
        headers.insert(BATCH_ID_HEADER, HeaderValue::from_static("  "));
        assert_eq!(header_str(&headers, BATCH_ID_HEADER), None);

        headers.insert(BATCH_ID_HEADER, HeaderValue::from_static("batch-1"));
        assert_eq!(header_str(&headers, BATCH_ID_HEADER), Some("batch-1"));
    }
}
