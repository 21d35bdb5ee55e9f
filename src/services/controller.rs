//! Session controller — sign-in, sign-up, sign-out.
//!
//! CONCURRENCY
//! ===========
//! Overlapping in-flight calls of the same kind are resolved by issue order,
//! not completion order: each call takes a per-kind sequence number, and only
//! the newest issued call may commit its outcome. A slow stale response still
//! settles (so `is_pending` clears correctly) and is still returned to its
//! caller, but never touches the store.
//!
//! Sign-out is exempt: it commits locally before the backend round-trip and
//! ignores its outcome entirely.

#[cfg(test)]
#[path = "controller_test.rs"]
mod controller_test;

use std::sync::{Arc, Mutex, PoisonError};

use crate::net::identity::{IdentityError, IdentityGateway};
use crate::net::types::{SignInCredentials, SignUpCredentials, User};
use crate::state::session::{Session, SessionStatus, SessionStore};

/// The three user-triggered mutating operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    SignIn,
    SignUp,
    SignOut,
}

// =============================================================================
// OPERATION TRACKING
// =============================================================================

/// Per-kind in-flight bookkeeping. A call is pending while its sequence
/// number has been issued but not yet settled.
#[derive(Debug, Default)]
struct OpSlot {
    last_issued: u64,
    last_settled: u64,
    error: Option<IdentityError>,
}

impl OpSlot {
    fn begin(&mut self) -> u64 {
        self.last_issued += 1;
        self.error = None;
        self.last_issued
    }

    /// Record that `seq` settled. Returns `true` when `seq` is still the
    /// newest issued call of this kind, i.e. its outcome may be committed.
    fn settle(&mut self, seq: u64, error: Option<IdentityError>) -> bool {
        self.last_settled = self.last_settled.max(seq);
        let newest = seq == self.last_issued;
        if newest {
            self.error = error;
        }
        newest
    }

    fn pending(&self) -> bool {
        self.last_issued > self.last_settled
    }
}

#[derive(Debug, Default)]
struct OpTable {
    sign_in: OpSlot,
    sign_up: OpSlot,
    sign_out: OpSlot,
}

impl OpTable {
    fn slot(&mut self, kind: OperationKind) -> &mut OpSlot {
        match kind {
            OperationKind::SignIn => &mut self.sign_in,
            OperationKind::SignUp => &mut self.sign_up,
            OperationKind::SignOut => &mut self.sign_out,
        }
    }

    fn slot_ref(&self, kind: OperationKind) -> &OpSlot {
        match kind {
            OperationKind::SignIn => &self.sign_in,
            OperationKind::SignUp => &self.sign_up,
            OperationKind::SignOut => &self.sign_out,
        }
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

/// Orchestrates identity gateway calls and commits their outcomes into the
/// session store.
pub struct SessionController {
    store: Arc<SessionStore>,
    gateway: Arc<dyn IdentityGateway>,
    ops: Mutex<OpTable>,
}

impl SessionController {
    #[must_use]
    pub fn new(store: Arc<SessionStore>, gateway: Arc<dyn IdentityGateway>) -> Self {
        Self { store, gateway, ops: Mutex::new(OpTable::default()) }
    }

    /// `true` while the newest issued call of `kind` has not settled.
    #[must_use]
    pub fn is_pending(&self, kind: OperationKind) -> bool {
        self.ops.lock().unwrap_or_else(PoisonError::into_inner).slot_ref(kind).pending()
    }

    /// Failure of the most recent committed call of `kind`, if any. Cleared
    /// when a new call of that kind starts.
    #[must_use]
    pub fn error(&self, kind: OperationKind) -> Option<IdentityError> {
        self.ops.lock().unwrap_or_else(PoisonError::into_inner).slot_ref(kind).error.clone()
    }

    fn begin(&self, kind: OperationKind) -> u64 {
        self.ops.lock().unwrap_or_else(PoisonError::into_inner).slot(kind).begin()
    }

    fn settle(&self, kind: OperationKind, seq: u64, error: Option<IdentityError>) -> bool {
        self.ops.lock().unwrap_or_else(PoisonError::into_inner).slot(kind).settle(seq, error)
    }

    /// Exchange credentials for an authenticated session.
    ///
    /// # Errors
    ///
    /// Returns the gateway's typed failure whether or not it was committed,
    /// so the calling screen can show per-field feedback without reading
    /// global state.
    pub async fn sign_in(&self, credentials: SignInCredentials) -> Result<User, IdentityError> {
        let seq = self.begin(OperationKind::SignIn);
        self.store.commit(Session::loading());
        let result = self.gateway.sign_in(&credentials).await;
        self.finish_credential_op(OperationKind::SignIn, seq, result)
    }

    /// Create an account and sign in as it.
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::sign_in`].
    pub async fn sign_up(&self, credentials: SignUpCredentials) -> Result<User, IdentityError> {
        let seq = self.begin(OperationKind::SignUp);
        self.store.commit(Session::loading());
        let result = self.gateway.sign_up(&credentials).await;
        self.finish_credential_op(OperationKind::SignUp, seq, result)
    }

    fn finish_credential_op(
        &self,
        kind: OperationKind,
        seq: u64,
        result: Result<User, IdentityError>,
    ) -> Result<User, IdentityError> {
        match result {
            Ok(user) => {
                if self.settle(kind, seq, None) {
                    self.store.commit(Session::authenticated(user.clone()));
                } else {
                    tracing::debug!(?kind, seq, "superseded success discarded");
                }
                Ok(user)
            }
            Err(error) => {
                if self.settle(kind, seq, Some(error.clone())) {
                    self.store.commit(Session::unauthenticated_with_error(error.clone()));
                } else {
                    tracing::debug!(?kind, seq, "superseded failure discarded");
                }
                Err(error)
            }
        }
    }

    /// Clear the session locally and invalidate the backend session in the
    /// background. The local clear happens before this function returns; the
    /// backend outcome is logged and never re-authenticates. A call while
    /// already unauthenticated is a no-op.
    ///
    /// Must run inside a tokio runtime (the backend round-trip is spawned).
    pub fn sign_out(&self) {
        if self.store.snapshot().status() == SessionStatus::Unauthenticated {
            return;
        }

        let seq = self.begin(OperationKind::SignOut);
        self.store.commit(Session::unauthenticated());
        let _ = self.settle(OperationKind::SignOut, seq, None);

        let gateway = Arc::clone(&self.gateway);
        tokio::spawn(async move {
            if let Err(error) = gateway.sign_out().await {
                tracing::warn!(error = %error, "sign-out backend call failed; local session already cleared");
            }
        });
    }
}
