//! The caller's own name, read from resolved claims.

use std::sync::Arc;

use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::claims::Claims;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfoResponse {
    pub given_name: String,
    pub family_name: String,
}

/// `GET /api/userinfo`
pub async fn userinfo_handler(Extension(claims): Extension<Arc<Claims>>) -> Json<UserInfoResponse> {
    tracing::debug!(user_id = %claims.user_id, "Returning user info");
    Json(UserInfoResponse {
        given_name: claims.given_name.clone(),
        family_name: claims.family_name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        routing::get,
    };
    use std::collections::BTreeMap;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_returns_names_only() {
        let claims = Arc::new(Claims {
            user_id: "u1".to_string(),
            client_id: "web".to_string(),
            scope: vec!["openid".to_string()],
            given_name: "Guest".to_string(),
            family_name: "User".to_string(),
            email: "guest@example.com".to_string(),
            custom: BTreeMap::new(),
        });
        let app = Router::new()
            .route("/api/userinfo", get(userinfo_handler))
            .layer(Extension(claims));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/userinfo")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["givenName"], "Guest");
        assert_eq!(json["familyName"], "User");
        assert!(json.get("email").is_none());
    }
}
