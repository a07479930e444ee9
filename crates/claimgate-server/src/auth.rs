//! Authorization middleware.
//!
//! Resolves claims for every secured request and places them in the request
//! extensions as `Arc<Claims>`.

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::request_context::correlation_id;
use crate::state::AppState;

/// Authorization middleware function.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if state.config().is_unsecured(request.uri().path()) {
        return next.run(request).await;
    }

    match state.resolver.authorize(request.headers()).await {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => e.into_response_for(&state.config().api_name, correlation_id(&request)),
    }
}
