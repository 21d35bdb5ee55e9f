//! Route guards — session-state-driven redirects.
//!
//! DESIGN
//! ======
//! A guard owns a subscription to the session store and re-evaluates on every
//! commit. Three rules shape the logic:
//! - while the session is loading, a guard renders nothing and redirects
//!   nothing (no flash of the wrong screen before the session is known);
//! - redirects go through the navigator only once it reports ready; a
//!   redirect decided earlier is remembered and flushed on readiness, never
//!   dropped;
//! - a redirect is issued at most once per unmet episode, so repeated
//!   evaluations cannot enqueue duplicates.

#[cfg(test)]
#[path = "guard_test.rs"]
mod guard_test;

use std::sync::{Arc, Mutex, PoisonError};

use crate::routes::navigator::Navigator;
use crate::state::session::{SessionStore, Subscription};

/// Destination for guests bounced off protected screens.
pub const SIGN_IN_ROUTE: &str = "/login";
/// Destination for authenticated users bounced off guest-only screens.
pub const DASHBOARD_ROUTE: &str = "/dashboard";

/// What a guard requires of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardPolicy {
    /// Protect-from-guest: only an authenticated session may pass.
    RequireAuthenticated,
    /// Guest-only: only an unauthenticated session may pass.
    RequireGuest,
}

/// What the host screen should render after an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Session not yet known; render nothing, redirect nothing.
    Loading,
    /// Condition met; render the guarded content.
    Content,
    /// Condition unmet; render nothing, a redirect was issued or queued.
    Blocked,
}

// =============================================================================
// REDIRECT LATCH
// =============================================================================

/// Memo of the redirect already issued for the current unmet episode, plus
/// the one queued while the navigator was not ready.
#[derive(Debug, Default)]
struct RedirectLatch {
    issued: Option<String>,
    pending: Option<String>,
}

impl RedirectLatch {
    fn reset(&mut self) {
        self.issued = None;
        self.pending = None;
    }

    /// Decide whether `dest` should be sent to the navigator now. Returns
    /// `false` when it was already issued this episode or the navigator is
    /// not ready (then it is queued instead).
    fn request(&mut self, dest: &str, ready: bool) -> bool {
        if self.issued.as_deref() == Some(dest) {
            return false;
        }
        if ready {
            self.issued = Some(dest.to_owned());
            self.pending = None;
            true
        } else {
            self.pending = Some(dest.to_owned());
            false
        }
    }

    fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

// =============================================================================
// ROUTE GUARD
// =============================================================================

/// Guard for a single mounted route. Build via [`RouteGuard::protect_from_guest`]
/// or [`RouteGuard::guest_only`]; keep the `Arc` alive for as long as the
/// route is mounted (dropping it detaches the store subscription).
pub struct RouteGuard {
    policy: GuardPolicy,
    redirect_to: String,
    store: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
    latch: Mutex<RedirectLatch>,
    // Keeps the store subscription alive for the guard's lifetime.
    _subscription: Mutex<Option<Subscription>>,
}

impl RouteGuard {
    /// Guard requiring an authenticated session; guests go to the sign-in
    /// screen.
    pub fn protect_from_guest(store: Arc<SessionStore>, navigator: Arc<dyn Navigator>) -> Arc<Self> {
        Self::new(GuardPolicy::RequireAuthenticated, SIGN_IN_ROUTE, store, navigator)
    }

    /// Guard requiring a guest session; authenticated users go to the
    /// dashboard.
    pub fn guest_only(store: Arc<SessionStore>, navigator: Arc<dyn Navigator>) -> Arc<Self> {
        Self::new(GuardPolicy::RequireGuest, DASHBOARD_ROUTE, store, navigator)
    }

    /// Guard with an explicit policy and redirect destination.
    pub fn new(
        policy: GuardPolicy,
        redirect_to: impl Into<String>,
        store: Arc<SessionStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Arc<Self> {
        let guard = Arc::new(Self {
            policy,
            redirect_to: redirect_to.into(),
            store: Arc::clone(&store),
            navigator,
            latch: Mutex::new(RedirectLatch::default()),
            _subscription: Mutex::new(None),
        });

        let weak = Arc::downgrade(&guard);
        let subscription = store.subscribe(move |_| {
            if let Some(guard) = weak.upgrade() {
                let _ = guard.evaluate();
            }
        });
        *guard._subscription.lock().unwrap_or_else(PoisonError::into_inner) = Some(subscription);

        let _ = guard.evaluate();
        guard
    }

    /// Evaluate the condition against the current session and issue a
    /// redirect if warranted. Also runs automatically on every store commit.
    pub fn evaluate(&self) -> GuardOutcome {
        let session = self.store.snapshot();
        if session.is_loading() {
            self.latch.lock().unwrap_or_else(PoisonError::into_inner).reset();
            return GuardOutcome::Loading;
        }

        let met = match self.policy {
            GuardPolicy::RequireAuthenticated => session.is_authenticated(),
            GuardPolicy::RequireGuest => !session.is_authenticated(),
        };
        if met {
            self.latch.lock().unwrap_or_else(PoisonError::into_inner).reset();
            return GuardOutcome::Content;
        }

        request_redirect(&self.latch, self.navigator.as_ref(), &self.redirect_to);
        GuardOutcome::Blocked
    }

    /// Tell the guard the navigator became ready; flushes a queued redirect
    /// after re-checking the condition.
    pub fn navigator_ready(&self) {
        if self.latch.lock().unwrap_or_else(PoisonError::into_inner).has_pending() {
            let _ = self.evaluate();
        }
    }
}

// =============================================================================
// ENTRY REDIRECT
// =============================================================================

/// Landing-route resolver: once the session is known it always redirects —
/// to the dashboard when authenticated, to sign-in otherwise — and never
/// renders content of its own.
pub struct EntryRedirect {
    authenticated_to: String,
    guest_to: String,
    store: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
    latch: Mutex<RedirectLatch>,
    _subscription: Mutex<Option<Subscription>>,
}

impl EntryRedirect {
    pub fn new(store: Arc<SessionStore>, navigator: Arc<dyn Navigator>) -> Arc<Self> {
        Self::with_destinations(store, navigator, DASHBOARD_ROUTE, SIGN_IN_ROUTE)
    }

    pub fn with_destinations(
        store: Arc<SessionStore>,
        navigator: Arc<dyn Navigator>,
        authenticated_to: impl Into<String>,
        guest_to: impl Into<String>,
    ) -> Arc<Self> {
        let entry = Arc::new(Self {
            authenticated_to: authenticated_to.into(),
            guest_to: guest_to.into(),
            store: Arc::clone(&store),
            navigator,
            latch: Mutex::new(RedirectLatch::default()),
            _subscription: Mutex::new(None),
        });

        let weak = Arc::downgrade(&entry);
        let subscription = store.subscribe(move |_| {
            if let Some(entry) = weak.upgrade() {
                let _ = entry.evaluate();
            }
        });
        *entry._subscription.lock().unwrap_or_else(PoisonError::into_inner) = Some(subscription);

        let _ = entry.evaluate();
        entry
    }

    /// Never returns [`GuardOutcome::Content`]: the landing route only ever
    /// shows its spinner or hands off elsewhere.
    pub fn evaluate(&self) -> GuardOutcome {
        let session = self.store.snapshot();
        if session.is_loading() {
            self.latch.lock().unwrap_or_else(PoisonError::into_inner).reset();
            return GuardOutcome::Loading;
        }

        let dest = if session.is_authenticated() { &self.authenticated_to } else { &self.guest_to };
        request_redirect(&self.latch, self.navigator.as_ref(), dest);
        GuardOutcome::Blocked
    }

    /// See [`RouteGuard::navigator_ready`].
    pub fn navigator_ready(&self) {
        if self.latch.lock().unwrap_or_else(PoisonError::into_inner).has_pending() {
            let _ = self.evaluate();
        }
    }
}

/// Issue `dest` through the navigator unless it was already issued this
/// episode; queue it when the navigator is not ready. Readiness is sampled
/// before taking the latch lock so a navigator cannot re-enter the guard
/// under it.
fn request_redirect(latch: &Mutex<RedirectLatch>, navigator: &dyn Navigator, dest: &str) {
    let ready = navigator.is_ready();
    let issue = latch.lock().unwrap_or_else(PoisonError::into_inner).request(dest, ready);
    if issue {
        navigator.replace(dest);
    }
}
