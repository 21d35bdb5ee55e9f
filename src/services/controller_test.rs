use super::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::net::types::UserRole;

fn user(email: &str) -> User {
    User {
        id: Uuid::new_v4(),
        email: email.to_owned(),
        display_name: None,
        role: UserRole::User,
    }
}

fn sign_in_credentials(email: &str) -> SignInCredentials {
    SignInCredentials { email: email.to_owned(), password: "hunter2".to_owned() }
}

fn sign_up_credentials(email: &str) -> SignUpCredentials {
    SignUpCredentials {
        email: email.to_owned(),
        password: "hunter2".to_owned(),
        first_name: Some("Ada".to_owned()),
        last_name: None,
    }
}

// =============================================================================
// StubGateway — scripted immediate responses
// =============================================================================

#[derive(Default)]
struct StubGateway {
    sign_in: Mutex<VecDeque<Result<User, IdentityError>>>,
    sign_up: Mutex<VecDeque<Result<User, IdentityError>>>,
    sign_out: Mutex<VecDeque<Result<(), IdentityError>>>,
    sign_out_calls: AtomicUsize,
}

#[async_trait::async_trait]
impl IdentityGateway for StubGateway {
    async fn sign_in(&self, _credentials: &SignInCredentials) -> Result<User, IdentityError> {
        self.sign_in.lock().unwrap().pop_front().expect("unscripted sign_in call")
    }

    async fn sign_up(&self, _credentials: &SignUpCredentials) -> Result<User, IdentityError> {
        self.sign_up.lock().unwrap().pop_front().expect("unscripted sign_up call")
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.sign_out.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn who_am_i(&self) -> Result<User, IdentityError> {
        panic!("unexpected who_am_i call")
    }
}

fn controller_with(gateway: Arc<StubGateway>) -> (Arc<SessionStore>, SessionController) {
    let store = Arc::new(SessionStore::new());
    let controller = SessionController::new(Arc::clone(&store), gateway);
    (store, controller)
}

// =============================================================================
// GatedGateway — responses held back until the test releases them
// =============================================================================

struct GatedGateway {
    sign_in_gates: Mutex<VecDeque<oneshot::Receiver<Result<User, IdentityError>>>>,
}

impl GatedGateway {
    fn new(gates: Vec<oneshot::Receiver<Result<User, IdentityError>>>) -> Self {
        Self { sign_in_gates: Mutex::new(gates.into()) }
    }
}

#[async_trait::async_trait]
impl IdentityGateway for GatedGateway {
    async fn sign_in(&self, _credentials: &SignInCredentials) -> Result<User, IdentityError> {
        let gate = self.sign_in_gates.lock().unwrap().pop_front().expect("unscripted sign_in call");
        gate.await.expect("gate sender dropped")
    }

    async fn sign_up(&self, _credentials: &SignUpCredentials) -> Result<User, IdentityError> {
        panic!("unexpected sign_up call")
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        Ok(())
    }

    async fn who_am_i(&self) -> Result<User, IdentityError> {
        panic!("unexpected who_am_i call")
    }
}

// =============================================================================
// sign_in — happy path and failures
// =============================================================================

#[tokio::test]
async fn sign_in_success_commits_authenticated() {
    let gateway = Arc::new(StubGateway::default());
    gateway.sign_in.lock().unwrap().push_back(Ok(user("a@example.com")));
    let (store, controller) = controller_with(gateway);

    let profile = controller.sign_in(sign_in_credentials("a@example.com")).await.unwrap();
    assert_eq!(profile.email, "a@example.com");

    let session = store.snapshot();
    assert!(session.is_authenticated());
    assert_eq!(session.user().map(|u| u.email.as_str()), Some("a@example.com"));
    assert!(session.last_error().is_none());
}

#[tokio::test]
async fn sign_in_failure_commits_error() {
    let gateway = Arc::new(StubGateway::default());
    gateway.sign_in.lock().unwrap().push_back(Err(IdentityError::InvalidCredentials));
    let (store, controller) = controller_with(gateway);

    let result = controller.sign_in(sign_in_credentials("a@example.com")).await;
    assert_eq!(result, Err(IdentityError::InvalidCredentials));

    let session = store.snapshot();
    assert_eq!(session.status(), SessionStatus::Unauthenticated);
    assert!(session.user().is_none());
    assert_eq!(session.last_error(), Some(&IdentityError::InvalidCredentials));
    assert_eq!(controller.error(OperationKind::SignIn), Some(IdentityError::InvalidCredentials));
}

#[tokio::test]
async fn new_sign_in_clears_previous_error() {
    let gateway = Arc::new(StubGateway::default());
    {
        let mut queue = gateway.sign_in.lock().unwrap();
        queue.push_back(Err(IdentityError::InvalidCredentials));
        queue.push_back(Ok(user("a@example.com")));
    }
    let (store, controller) = controller_with(gateway);

    let _ = controller.sign_in(sign_in_credentials("a@example.com")).await;
    controller.sign_in(sign_in_credentials("a@example.com")).await.unwrap();

    assert_eq!(controller.error(OperationKind::SignIn), None);
    assert!(store.snapshot().last_error().is_none());
}

#[tokio::test]
async fn sign_in_pending_while_in_flight() {
    let (release, gate) = oneshot::channel();
    let gateway = Arc::new(GatedGateway::new(vec![gate]));
    let store = Arc::new(SessionStore::new());
    let controller = Arc::new(SessionController::new(Arc::clone(&store), gateway));

    let task = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.sign_in(sign_in_credentials("a@example.com")).await })
    };
    tokio::task::yield_now().await;

    assert!(controller.is_pending(OperationKind::SignIn));
    assert!(store.is_loading());

    release.send(Ok(user("a@example.com"))).unwrap();
    task.await.unwrap().unwrap();

    assert!(!controller.is_pending(OperationKind::SignIn));
    assert!(store.is_authenticated());
}

// =============================================================================
// sign_in — overlapping calls resolve by issue order
// =============================================================================

#[tokio::test]
async fn stale_sign_in_success_is_discarded() {
    let (release_a, gate_a) = oneshot::channel();
    let (release_b, gate_b) = oneshot::channel();
    let gateway = Arc::new(GatedGateway::new(vec![gate_a, gate_b]));
    let store = Arc::new(SessionStore::new());
    let controller = Arc::new(SessionController::new(Arc::clone(&store), gateway));

    let task_a = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.sign_in(sign_in_credentials("a@example.com")).await })
    };
    tokio::task::yield_now().await;
    let task_b = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.sign_in(sign_in_credentials("b@example.com")).await })
    };
    tokio::task::yield_now().await;

    // B settles first and wins.
    release_b.send(Ok(user("b@example.com"))).unwrap();
    task_b.await.unwrap().unwrap();
    assert_eq!(store.snapshot().user().map(|u| u.email.as_str()), Some("b@example.com"));

    // A's slow response arrives afterwards: returned to its caller, never
    // committed.
    release_a.send(Ok(user("a@example.com"))).unwrap();
    let stale = task_a.await.unwrap().unwrap();
    assert_eq!(stale.email, "a@example.com");

    let session = store.snapshot();
    assert_eq!(session.user().map(|u| u.email.as_str()), Some("b@example.com"));
    assert!(!controller.is_pending(OperationKind::SignIn));
}

#[tokio::test]
async fn stale_sign_in_failure_does_not_disturb_fresh_session() {
    let (release_a, gate_a) = oneshot::channel();
    let (release_b, gate_b) = oneshot::channel();
    let gateway = Arc::new(GatedGateway::new(vec![gate_a, gate_b]));
    let store = Arc::new(SessionStore::new());
    let controller = Arc::new(SessionController::new(Arc::clone(&store), gateway));

    let task_a = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.sign_in(sign_in_credentials("a@example.com")).await })
    };
    tokio::task::yield_now().await;
    let task_b = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.sign_in(sign_in_credentials("b@example.com")).await })
    };
    tokio::task::yield_now().await;

    release_b.send(Ok(user("b@example.com"))).unwrap();
    task_b.await.unwrap().unwrap();

    release_a.send(Err(IdentityError::Network("timed out".into()))).unwrap();
    let stale = task_a.await.unwrap();
    assert_eq!(stale, Err(IdentityError::Network("timed out".into())));

    // The committed session still reflects B; the stale failure reached only
    // its caller.
    let session = store.snapshot();
    assert!(session.is_authenticated());
    assert!(session.last_error().is_none());
    assert_eq!(controller.error(OperationKind::SignIn), None);
}

// =============================================================================
// sign_up
// =============================================================================

#[tokio::test]
async fn sign_up_success_commits_authenticated() {
    let gateway = Arc::new(StubGateway::default());
    gateway.sign_up.lock().unwrap().push_back(Ok(user("new@example.com")));
    let (store, controller) = controller_with(gateway);

    controller.sign_up(sign_up_credentials("new@example.com")).await.unwrap();
    assert!(store.is_authenticated());
}

#[tokio::test]
async fn sign_up_email_taken_commits_error() {
    let gateway = Arc::new(StubGateway::default());
    gateway.sign_up.lock().unwrap().push_back(Err(IdentityError::EmailTaken));
    let (store, controller) = controller_with(gateway);

    let result = controller.sign_up(sign_up_credentials("dup@example.com")).await;
    assert_eq!(result, Err(IdentityError::EmailTaken));
    assert_eq!(store.snapshot().last_error(), Some(&IdentityError::EmailTaken));
    assert_eq!(controller.error(OperationKind::SignUp), Some(IdentityError::EmailTaken));
}

#[tokio::test]
async fn sign_up_and_sign_in_track_separately() {
    let gateway = Arc::new(StubGateway::default());
    gateway.sign_up.lock().unwrap().push_back(Err(IdentityError::EmailTaken));
    let (_store, controller) = controller_with(gateway);

    let _ = controller.sign_up(sign_up_credentials("dup@example.com")).await;
    assert_eq!(controller.error(OperationKind::SignUp), Some(IdentityError::EmailTaken));
    assert_eq!(controller.error(OperationKind::SignIn), None);
}

// =============================================================================
// sign_out
// =============================================================================

#[tokio::test]
async fn sign_out_clears_session_before_backend_resolves() {
    let gateway = Arc::new(StubGateway::default());
    let (store, controller) = controller_with(Arc::clone(&gateway));
    store.commit(Session::authenticated(user("a@example.com")));

    controller.sign_out();

    // Local teardown is synchronous; the backend call has not even started.
    let session = store.snapshot();
    assert_eq!(session.status(), SessionStatus::Unauthenticated);
    assert!(session.user().is_none());
    assert!(session.last_error().is_none());
}

#[tokio::test]
async fn sign_out_survives_backend_failure() {
    let gateway = Arc::new(StubGateway::default());
    gateway
        .sign_out
        .lock()
        .unwrap()
        .push_back(Err(IdentityError::Network("unreachable".into())));
    let (store, controller) = controller_with(Arc::clone(&gateway));
    store.commit(Session::authenticated(user("a@example.com")));

    controller.sign_out();
    tokio::task::yield_now().await;

    assert_eq!(gateway.sign_out_calls.load(Ordering::SeqCst), 1);
    let session = store.snapshot();
    assert_eq!(session.status(), SessionStatus::Unauthenticated);
    assert!(session.user().is_none());
}

#[tokio::test]
async fn sign_out_when_already_signed_out_is_a_no_op() {
    let gateway = Arc::new(StubGateway::default());
    let (store, controller) = controller_with(Arc::clone(&gateway));
    store.commit(Session::unauthenticated());

    controller.sign_out();
    tokio::task::yield_now().await;

    assert_eq!(gateway.sign_out_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn double_sign_out_calls_backend_once() {
    let gateway = Arc::new(StubGateway::default());
    let (store, controller) = controller_with(Arc::clone(&gateway));
    store.commit(Session::authenticated(user("a@example.com")));

    controller.sign_out();
    controller.sign_out();
    tokio::task::yield_now().await;

    assert_eq!(gateway.sign_out_calls.load(Ordering::SeqCst), 1);
}
