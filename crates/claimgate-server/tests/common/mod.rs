//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use claimgate_cache::CacheConfig;
use claimgate_server::{
    Authenticator, IntrospectionAuthenticator, Server, ServerConfig, TokenIntrospector,
};

pub const CLIENT_ID: &str = "api-client";
pub const CLIENT_SECRET: &str = "api-secret";
pub const API_NAME: &str = "SampleApi";

/// A mock authorization server with discovery already mounted.
pub struct AuthServer {
    pub mock: MockServer,
}

impl AuthServer {
    pub async fn start() -> Self {
        let mock = MockServer::start().await;
        let base = mock.uri();
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": base,
                "authorization_endpoint": format!("{base}/authorize"),
                "token_endpoint": format!("{base}/token"),
                "introspection_endpoint": format!("{base}/introspect"),
                "userinfo_endpoint": format!("{base}/userinfo"),
            })))
            .mount(&mock)
            .await;
        Self { mock }
    }

    pub fn uri(&self) -> String {
        self.mock.uri()
    }

    pub fn introspector(&self) -> TokenIntrospector {
        TokenIntrospector::new(Client::new(), self.uri(), CLIENT_ID, CLIENT_SECRET)
    }
}

/// Introspection body for an active token expiring in an hour.
pub fn active_token() -> serde_json::Value {
    json!({
        "active": true,
        "uid": "u1",
        "client_id": "web",
        "scope": "openid profile investments",
        "exp": chrono::Utc::now().timestamp() + 3600,
    })
}

pub fn user_info() -> serde_json::Value {
    json!({
        "given_name": "Guest",
        "family_name": "User",
        "email": "guest.user@example.com",
    })
}

/// A test server that runs in the background.
pub struct TestServer {
    /// The server's address.
    pub addr: SocketAddr,
    /// HTTP client configured for this server.
    pub client: Client,
    /// Handle to the server task.
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a server that introspects tokens against `auth`.
    pub async fn start(auth: &AuthServer) -> Result<Self> {
        Self::start_with(Arc::new(IntrospectionAuthenticator::new(auth.introspector()))).await
    }

    pub async fn start_with(authenticator: Arc<dyn Authenticator>) -> Result<Self> {
        let addr = find_available_port().await?;

        let config = ServerConfig::new(API_NAME)
            .with_bind_address(addr)
            .with_cache(CacheConfig::default().with_cleanup_task(false));

        let server = Server::new(config, authenticator);
        let handle = tokio::spawn(async move {
            let _ = server.run_on(addr).await;
        });

        let client = Client::new();
        wait_for_server(&client, addr).await?;

        Ok(Self {
            addr,
            client,
            _handle: handle,
        })
    }

    /// Get the base URL for the server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// GET with a bearer token.
    pub fn get(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url(), path))
            .bearer_auth(token)
    }
}

/// Find an available port for the test server.
async fn find_available_port() -> Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

/// Wait for the server to become ready.
async fn wait_for_server(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/health", addr);

    let result = timeout(Duration::from_secs(5), async {
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await;

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => anyhow::bail!("Timeout waiting for server to start"),
    }
}
