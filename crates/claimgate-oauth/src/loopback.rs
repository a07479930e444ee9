//! Local listener that receives the browser's authorization redirect.
//!
//! The listener serves a single route (the redirect path) and shuts itself
//! down after the first redirect that matches a pending login. Requests
//! that don't qualify are answered with an empty `400` and the listener
//! keeps waiting.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{RawQuery, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::correlation::{LoginCorrelationStore, LoginResponse};
use crate::error::{OAuthError, Result};

/// Where and how the loopback listener binds.
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    pub hostname: String,
    pub min_port: u16,
    pub max_port: u16,
    pub redirect_path: String,
    pub post_login_page: String,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_string(),
            min_port: 8001,
            max_port: 8003,
            redirect_path: "/callback".to_string(),
            post_login_page: "https://authsamples.com/apps/desktop/postlogin.html".to_string(),
        }
    }
}

impl LoopbackConfig {
    pub fn with_port_range(mut self, min_port: u16, max_port: u16) -> Self {
        self.min_port = min_port;
        self.max_port = max_port;
        self
    }

    pub fn with_post_login_page(mut self, page: impl Into<String>) -> Self {
        self.post_login_page = page.into();
        self
    }

    /// Redirect URI to register with the authorization request.
    pub fn redirect_uri(&self, port: u16) -> String {
        format!("http://{}:{}{}", self.hostname, port, self.redirect_path)
    }
}

struct Running {
    port: u16,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

#[derive(Clone)]
struct CallbackState {
    store: Arc<LoginCorrelationStore>,
    post_login_page: String,
    shutdown: Arc<Notify>,
}

/// Single-shot HTTP listener for authorization redirects.
pub struct LoopbackListener {
    config: LoopbackConfig,
    store: Arc<LoginCorrelationStore>,
    running: Mutex<Option<Running>>,
}

impl LoopbackListener {
    pub fn new(config: LoopbackConfig, store: Arc<LoginCorrelationStore>) -> Self {
        Self {
            config,
            store,
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &LoopbackConfig {
        &self.config
    }

    /// Port currently bound, if the listener is running.
    pub fn port(&self) -> Option<u16> {
        self.running
            .lock()
            .as_ref()
            .filter(|r| !r.task.is_finished())
            .map(|r| r.port)
    }

    /// Bind the first free port in the configured range and start serving.
    ///
    /// Returns the existing port if the listener is already running.
    pub async fn start(&self) -> Result<u16> {
        if let Some(port) = self.port() {
            return Ok(port);
        }

        let (listener, port) = self.bind().await?;
        let shutdown = Arc::new(Notify::new());
        let router = self.router(shutdown.clone());

        let mut running = self.running.lock();
        if let Some(existing) = running.as_ref().filter(|r| !r.task.is_finished()) {
            // Lost a race with a concurrent start; our socket is dropped here.
            return Ok(existing.port);
        }

        let signal = shutdown.clone();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.notified().await })
                .await;
            if let Err(e) = result {
                tracing::warn!(error = %e, "Loopback listener failed");
            }
            tracing::debug!(port, "Loopback listener closed");
        });

        *running = Some(Running {
            port,
            shutdown,
            task,
        });
        tracing::info!(port, "Loopback listener started");
        Ok(port)
    }

    /// Stop the listener and release its socket. Safe to call repeatedly.
    pub fn stop(&self) {
        if let Some(running) = self.running.lock().take() {
            running.shutdown.notify_one();
        }
    }

    async fn bind(&self) -> Result<(TcpListener, u16)> {
        let LoopbackConfig {
            hostname,
            min_port,
            max_port,
            ..
        } = &self.config;

        for port in *min_port..=*max_port {
            match TcpListener::bind((hostname.as_str(), port)).await {
                Ok(listener) => {
                    let bound = listener
                        .local_addr()
                        .map(|a| a.port())
                        .map_err(|e| OAuthError::LoginRequestFailed(e.to_string()))?;
                    return Ok((listener, bound));
                }
                Err(e) => tracing::debug!(port, error = %e, "Loopback port unavailable"),
            }
        }

        Err(OAuthError::LoginRequestFailed(format!(
            "No free loopback port between {} and {} on {}",
            min_port, max_port, hostname
        )))
    }

    fn router(&self, shutdown: Arc<Notify>) -> Router {
        let state = CallbackState {
            store: self.store.clone(),
            post_login_page: self.config.post_login_page.clone(),
            shutdown,
        };
        Router::new()
            .route(&self.config.redirect_path, get(handle_callback))
            .with_state(state)
    }
}

impl Drop for LoopbackListener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Handle GET on the redirect path.
async fn handle_callback(
    State(state): State<CallbackState>,
    RawQuery(query): RawQuery,
) -> Response {
    let params: HashMap<String, String> = url::form_urlencoded::parse(
        query.as_deref().unwrap_or_default().as_bytes(),
    )
    .into_owned()
    .collect();

    let Some(response) = LoginResponse::from_query(&params) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    if !state.store.handle_login_response(&params) {
        return StatusCode::BAD_REQUEST.into_response();
    }

    state.shutdown.notify_one();

    let location = post_login_location(&state.post_login_page, response.error.as_deref());
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
}

fn post_login_location(page: &str, error: Option<&str>) -> String {
    match error {
        Some(code) => {
            let separator = if page.contains('?') { '&' } else { '?' };
            format!("{}{}error={}", page, separator, urlencoding::encode(code))
        }
        None => page.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_config() -> LoopbackConfig {
        // Port 0 lets the OS pick, so tests never collide.
        LoopbackConfig::default()
            .with_port_range(0, 0)
            .with_post_login_page("https://example.com/postlogin.html")
    }

    fn no_redirect_client() -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    async fn oneshot(listener: &LoopbackListener, uri: &str) -> Response {
        listener
            .router(Arc::new(Notify::new()))
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[test]
    fn test_post_login_location() {
        assert_eq!(post_login_location("https://a/b", None), "https://a/b");
        assert_eq!(
            post_login_location("https://a/b", Some("access_denied")),
            "https://a/b?error=access_denied"
        );
        assert_eq!(
            post_login_location("https://a/b?x=1", Some("e")),
            "https://a/b?x=1&error=e"
        );
    }

    #[tokio::test]
    async fn test_missing_state_is_ignored() {
        let store = Arc::new(LoginCorrelationStore::new());
        let _rx = store.register("s1");
        let listener = LoopbackListener::new(test_config(), store.clone());

        let response = oneshot(&listener, "/callback?code=abc").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_state_is_ignored() {
        let store = Arc::new(LoginCorrelationStore::new());
        let _rx = store.register("s2");
        let listener = LoopbackListener::new(test_config(), store.clone());

        let response = oneshot(&listener, "/callback?state=s1&code=abc").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_error_redirects_with_code() {
        let store = Arc::new(LoginCorrelationStore::new());
        let rx = store.register("s1");
        let listener = LoopbackListener::new(test_config(), store);

        let response = oneshot(
            &listener,
            "/callback?state=s1&error=access_denied&error_description=nope",
        )
        .await;
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://example.com/postlogin.html?error=access_denied"
        );
        let delivered = rx.await.unwrap();
        assert_eq!(delivered.error_description.as_deref(), Some("nope"));
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let store = Arc::new(LoginCorrelationStore::new());
        let listener = LoopbackListener::new(test_config(), store);

        let first = listener.start().await.unwrap();
        let second = listener.start().await.unwrap();
        assert_eq!(first, second);

        listener.stop();
        listener.stop();
        assert!(listener.port().is_none());
    }

    #[tokio::test]
    async fn test_no_free_port() {
        let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let busy = blocker.local_addr().unwrap().port();

        let store = Arc::new(LoginCorrelationStore::new());
        let listener =
            LoopbackListener::new(test_config().with_port_range(busy, busy), store);

        let err = listener.start().await.unwrap_err();
        assert!(matches!(err, OAuthError::LoginRequestFailed(_)));
    }

    #[tokio::test]
    async fn test_stale_state_keeps_listener_open() {
        let store = Arc::new(LoginCorrelationStore::new());
        let rx = store.register("s2");
        let listener = LoopbackListener::new(test_config(), store);
        let port = listener.start().await.unwrap();
        let client = no_redirect_client();

        let stale = client
            .get(format!("http://127.0.0.1:{port}/callback?state=s1&code=old"))
            .send()
            .await
            .unwrap();
        assert_eq!(stale.status().as_u16(), 400);
        assert!(stale.text().await.unwrap().is_empty());

        let fresh = client
            .get(format!("http://127.0.0.1:{port}/callback?state=s2&code=new"))
            .send()
            .await
            .unwrap();
        assert_eq!(fresh.status().as_u16(), 301);
        assert_eq!(
            fresh.headers()["location"],
            "https://example.com/postlogin.html"
        );
        assert_eq!(rx.await.unwrap().code.as_deref(), Some("new"));
        drop(client);

        // The listener closes itself after a matching redirect.
        tokio::time::timeout(Duration::from_secs(5), async {
            while listener.port().is_some() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
    }
}
