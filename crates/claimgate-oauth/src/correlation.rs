//! Correlates browser redirects with the login attempt that issued them.
//!
//! Each attempt registers its unguessable `state` value and parks on the
//! returned receiver. The loopback listener hands the redirect's query
//! parameters to [`LoginCorrelationStore::handle_login_response`], which
//! delivers them to the matching attempt at most once.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Query parameters of an authorization redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResponse {
    pub state: String,
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl LoginResponse {
    /// Parse redirect parameters. Requires `state` plus either `code` or `error`.
    pub fn from_query(params: &HashMap<String, String>) -> Option<Self> {
        let non_empty = |key: &str| params.get(key).filter(|v| !v.is_empty()).cloned();

        let state = non_empty("state")?;
        let code = non_empty("code");
        let error = non_empty("error");
        if code.is_none() && error.is_none() {
            return None;
        }

        Some(Self {
            state,
            code,
            error,
            error_description: non_empty("error_description"),
        })
    }
}

/// Pending login attempts keyed by `state`.
#[derive(Debug, Default)]
pub struct LoginCorrelationStore {
    pending: Mutex<HashMap<String, oneshot::Sender<LoginResponse>>>,
}

impl LoginCorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending attempt and get the receiver it should await.
    ///
    /// Registering the same state twice replaces the earlier attempt, whose
    /// receiver then observes a closed channel.
    pub fn register(&self, state: &str) -> oneshot::Receiver<LoginResponse> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(state.to_string(), tx);
        rx
    }

    /// Deliver redirect parameters to the matching attempt.
    ///
    /// Returns `false` without touching any pending attempt when the
    /// parameters are incomplete or the state is unknown.
    pub fn handle_login_response(&self, params: &HashMap<String, String>) -> bool {
        let Some(response) = LoginResponse::from_query(params) else {
            tracing::debug!("Ignoring login response without state and code or error");
            return false;
        };

        let Some(sender) = self.pending.lock().remove(&response.state) else {
            tracing::debug!("Ignoring login response with unrecognized state");
            return false;
        };

        sender.send(response).is_ok()
    }

    /// Drop a pending attempt. Its receiver observes a closed channel.
    pub fn abandon(&self, state: &str) -> bool {
        self.pending.lock().remove(state).is_some()
    }

    /// Number of attempts still waiting for a redirect.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
