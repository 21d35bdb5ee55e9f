//! Session value and store.
//!
//! DESIGN
//! ======
//! `Session` is an immutable snapshot; `SessionStore` holds the current one
//! behind a mutex and notifies subscribers synchronously after each commit.
//! Subscribers receive the committed clone, never a reference into the store,
//! so readers cannot observe a torn `status`/`user` pair. Commits are
//! crate-private: only the controller and bootstrap mutate session state.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::net::identity::IdentityError;
use crate::net::types::User;

// =============================================================================
// SESSION VALUE
// =============================================================================

/// Where the session state machine currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionStatus {
    /// Process start; bootstrap has not begun.
    #[default]
    Unknown,
    /// An operation (bootstrap, sign-in, sign-up) is in flight.
    Loading,
    Authenticated,
    Unauthenticated,
}

/// The authoritative record of auth state. `user` is `Some` if and only if
/// `status == Authenticated`; the constructors are the only way to build one,
/// so the pair can never disagree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    status: SessionStatus,
    user: Option<User>,
    last_error: Option<IdentityError>,
}

impl Session {
    #[must_use]
    pub fn loading() -> Self {
        Self { status: SessionStatus::Loading, user: None, last_error: None }
    }

    #[must_use]
    pub fn authenticated(user: User) -> Self {
        Self { status: SessionStatus::Authenticated, user: Some(user), last_error: None }
    }

    #[must_use]
    pub fn unauthenticated() -> Self {
        Self { status: SessionStatus::Unauthenticated, user: None, last_error: None }
    }

    #[must_use]
    pub fn unauthenticated_with_error(error: IdentityError) -> Self {
        Self { status: SessionStatus::Unauthenticated, user: None, last_error: Some(error) }
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Failure from the most recent committed mutating operation, cleared
    /// whenever a new operation starts.
    #[must_use]
    pub fn last_error(&self) -> Option<&IdentityError> {
        self.last_error.as_ref()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }

    /// `true` until bootstrap (or a later operation) has settled the state.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self.status, SessionStatus::Unknown | SessionStatus::Loading)
    }
}

// =============================================================================
// STORE
// =============================================================================

type Callback = Arc<dyn Fn(&Session) + Send + Sync>;

/// Process-wide holder of the current [`Session`] with synchronous change
/// notification. Pure value container: no operation on it can fail.
#[derive(Default)]
pub struct SessionStore {
    session: Mutex<Session>,
    subscribers: Mutex<Vec<(u64, Callback)>>,
    next_subscriber_id: AtomicU64,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Immutable snapshot of the current session.
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.session.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.lock().unwrap_or_else(PoisonError::into_inner).is_authenticated()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.session.lock().unwrap_or_else(PoisonError::into_inner).is_loading()
    }

    /// Replace the session and notify every subscriber with the committed
    /// value. The value lock is released before callbacks run, and callbacks
    /// are invoked on cloned handles, so a subscriber may read the store or
    /// (un)subscribe without deadlocking.
    pub(crate) fn commit(&self, next: Session) {
        {
            let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            *session = next.clone();
        }

        let callbacks: Vec<Callback> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(&next);
        }
    }

    /// Register a change callback. Notification is synchronous with the
    /// commit. The callback stays registered until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(&Session) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));
        Subscription { store: Arc::downgrade(self), id }
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(sub_id, _)| *sub_id != id);
    }
}

/// Handle for an active store subscription; dropping it deregisters the
/// callback.
pub struct Subscription {
    store: Weak<SessionStore>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(self.id);
        }
    }
}
