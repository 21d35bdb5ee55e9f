//! Identity backend gateway — sign-in, sign-up, sign-out, and "who am I".
//!
//! ERROR HANDLING
//! ==============
//! Every backend outcome is a typed [`IdentityError`]; nothing in this module
//! panics or throws for control flow. The session controller decides which
//! failures reach [`crate::state::session::Session::last_error`] and which are
//! only returned to the calling screen.

#[cfg(test)]
#[path = "identity_test.rs"]
mod identity_test;

use std::sync::{Arc, Mutex, PoisonError};

use crate::net::types::{AuthResponse, SignInCredentials, SignUpCredentials, User};

// =============================================================================
// ERROR
// =============================================================================

/// Typed failures produced by identity backend operations.
///
/// `Clone + PartialEq` so the session store can hold the most recent failure
/// and tests can assert on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// The email/password pair was rejected.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Sign-up with an email that already has an account.
    #[error("email is already registered")]
    EmailTaken,

    /// The backend rejected the submitted fields. The message is the
    /// validation engine's output, treated as opaque text.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No persisted session exists, or the persisted token is no longer
    /// accepted. Expected on first launch.
    #[error("no active session")]
    NoSession,

    /// The backend could not be reached (includes timeouts).
    #[error("network error: {0}")]
    Network(String),

    /// Any response this client does not understand.
    #[error("unexpected error: {0}")]
    Unknown(String),
}

// =============================================================================
// GATEWAY TRAIT
// =============================================================================

/// Async seam to the identity backend. Enables mocking in tests.
#[async_trait::async_trait]
pub trait IdentityGateway: Send + Sync {
    /// Exchange credentials for a user profile.
    ///
    /// # Errors
    ///
    /// `InvalidCredentials` for a rejected pair, `Validation` for malformed
    /// fields, `Network`/`Unknown` for transport and server failures.
    async fn sign_in(&self, credentials: &SignInCredentials) -> Result<User, IdentityError>;

    /// Create an account and sign in as it.
    ///
    /// # Errors
    ///
    /// `EmailTaken` when the address already has an account, `Validation`
    /// for malformed fields, `Network`/`Unknown` otherwise.
    async fn sign_up(&self, credentials: &SignUpCredentials) -> Result<User, IdentityError>;

    /// Invalidate the backend session. Local state never depends on the
    /// outcome; callers log and move on.
    ///
    /// # Errors
    ///
    /// `Network`/`Unknown` when the round-trip fails.
    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Resolve the persisted credential to a profile.
    ///
    /// # Errors
    ///
    /// `NoSession` when nothing is persisted or the token is stale,
    /// `Network` when the backend is unreachable.
    async fn who_am_i(&self) -> Result<User, IdentityError>;
}

// =============================================================================
// TOKEN STORE
// =============================================================================

/// Platform secure-storage collaborator holding the opaque session token
/// between launches. The controller never sees the token itself.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, token: &str);
    fn clear(&self);
}

/// Process-local token store. Used by tests and by embedders that opt out of
/// persistent sessions.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl TokenStore for InMemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn save(&self, token: &str) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_owned());
    }

    fn clear(&self) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// Identity backend location loaded from environment.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub base_url: String,
}

impl IdentityConfig {
    /// Load from `API_BASE_URL`. Returns `None` if unset or blank (the HTTP
    /// gateway is then unavailable and the app shell must surface that).
    #[must_use]
    pub fn from_env() -> Option<Self> {
        Self::from_env_var("API_BASE_URL")
    }

    pub(crate) fn from_env_var(key: &str) -> Option<Self> {
        let raw = std::env::var(key).ok()?;
        let base_url = raw.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            return None;
        }
        Some(Self { base_url })
    }
}

// =============================================================================
// HTTP GATEWAY
// =============================================================================

/// `IdentityGateway` over the backend's REST endpoints.
pub struct HttpIdentityGateway {
    base_url: String,
    client: reqwest::Client,
    tokens: Arc<dyn TokenStore>,
}

impl HttpIdentityGateway {
    #[must_use]
    pub fn new(config: IdentityConfig, tokens: Arc<dyn TokenStore>) -> Self {
        Self { base_url: config.base_url, client: reqwest::Client::new(), tokens }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Pull a human-readable message out of an error body. Backends answer with
/// `{"error": "..."}`; anything else is passed through verbatim.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(ToOwned::to_owned))
        .unwrap_or_else(|| body.trim().to_owned())
}

/// Map a non-success sign-in response onto the taxonomy.
pub(crate) fn sign_in_failure(status: u16, body: &str) -> IdentityError {
    match status {
        401 | 403 => IdentityError::InvalidCredentials,
        422 => IdentityError::Validation(error_message(body)),
        _ => IdentityError::Unknown(format!("{status}: {}", error_message(body))),
    }
}

/// Map a non-success sign-up response onto the taxonomy.
pub(crate) fn sign_up_failure(status: u16, body: &str) -> IdentityError {
    match status {
        409 => IdentityError::EmailTaken,
        400 | 422 => IdentityError::Validation(error_message(body)),
        _ => IdentityError::Unknown(format!("{status}: {}", error_message(body))),
    }
}

/// Map a non-success "who am I" response onto the taxonomy.
pub(crate) fn who_am_i_failure(status: u16, body: &str) -> IdentityError {
    match status {
        401 | 403 => IdentityError::NoSession,
        _ => IdentityError::Unknown(format!("{status}: {}", error_message(body))),
    }
}

async fn failure_body(resp: reqwest::Response) -> (u16, String) {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    (status, body)
}

#[async_trait::async_trait]
impl IdentityGateway for HttpIdentityGateway {
    async fn sign_in(&self, credentials: &SignInCredentials) -> Result<User, IdentityError> {
        let resp = self
            .client
            .post(self.url("/api/auth/login"))
            .json(credentials)
            .send()
            .await
            .map_err(|e| IdentityError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let (status, body) = failure_body(resp).await;
            return Err(sign_in_failure(status, &body));
        }

        let auth: AuthResponse = resp
            .json()
            .await
            .map_err(|e| IdentityError::Unknown(format!("malformed sign-in response: {e}")))?;
        self.tokens.save(&auth.token);
        Ok(auth.user)
    }

    async fn sign_up(&self, credentials: &SignUpCredentials) -> Result<User, IdentityError> {
        let resp = self
            .client
            .post(self.url("/api/auth/register"))
            .json(credentials)
            .send()
            .await
            .map_err(|e| IdentityError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let (status, body) = failure_body(resp).await;
            return Err(sign_up_failure(status, &body));
        }

        let auth: AuthResponse = resp
            .json()
            .await
            .map_err(|e| IdentityError::Unknown(format!("malformed sign-up response: {e}")))?;
        self.tokens.save(&auth.token);
        Ok(auth.user)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        // Drop the persisted token first: local teardown must not wait on
        // the network.
        let Some(token) = self.tokens.load() else {
            return Ok(());
        };
        self.tokens.clear();

        let resp = self
            .client
            .post(self.url("/api/auth/logout"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| IdentityError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let (status, body) = failure_body(resp).await;
            return Err(IdentityError::Unknown(format!("{status}: {}", error_message(&body))));
        }
        Ok(())
    }

    async fn who_am_i(&self) -> Result<User, IdentityError> {
        let Some(token) = self.tokens.load() else {
            return Err(IdentityError::NoSession);
        };

        let resp = self
            .client
            .get(self.url("/api/auth/me"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| IdentityError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let (status, body) = failure_body(resp).await;
            let err = who_am_i_failure(status, &body);
            if err == IdentityError::NoSession {
                // Stale token; forget it so the next launch skips the call.
                self.tokens.clear();
            }
            return Err(err);
        }

        resp.json::<User>()
            .await
            .map_err(|e| IdentityError::Unknown(format!("malformed profile response: {e}")))
    }
}
