//! Session bootstrap — one-shot hydration from the persisted credential.

#[cfg(test)]
#[path = "bootstrap_test.rs"]
mod bootstrap_test;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::net::identity::{IdentityError, IdentityGateway};
use crate::state::session::{Session, SessionStore};

/// Moves the store out of its initial indeterminate state exactly once per
/// process, via the gateway's "who am I" call.
pub struct SessionBootstrap {
    store: Arc<SessionStore>,
    gateway: Arc<dyn IdentityGateway>,
    started: AtomicBool,
}

impl SessionBootstrap {
    #[must_use]
    pub fn new(store: Arc<SessionStore>, gateway: Arc<dyn IdentityGateway>) -> Self {
        Self { store, gateway, started: AtomicBool::new(false) }
    }

    /// Resolve the persisted credential and commit the result. Every failure
    /// path commits a clean `Unauthenticated` with no `last_error`: a missing
    /// session is the normal first-launch outcome, and an unreachable backend
    /// must not greet the user with an error banner. Repeat calls are no-ops.
    pub async fn run(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("session bootstrap already ran");
            return;
        }

        self.store.commit(Session::loading());

        match self.gateway.who_am_i().await {
            Ok(user) => self.store.commit(Session::authenticated(user)),
            Err(IdentityError::NoSession) => {
                tracing::debug!("no persisted session");
                self.store.commit(Session::unauthenticated());
            }
            Err(error) => {
                tracing::warn!(error = %error, "session bootstrap failed");
                self.store.commit(Session::unauthenticated());
            }
        }
    }
}
