//! Auth flow controller: orchestrates sign-in and routes between screens.
//!
//! The controller registers completion work on the credential exchange and
//! returns immediately; completions are delivered over an internal channel
//! in arrival order and applied one at a time by `next_transition`. No
//! direct stdout/stderr writes occur in this module.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::auth::exchange::{AuthFuture, CredentialExchange};
use crate::auth::federated::FederatedProvider;
use crate::auth::session::{Session, SessionStore};
use crate::auth::{AuthError, AuthErrorKind};

/// Authentication phase of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    /// No session; the login screen is active.
    LoggedOut,
    /// A sign-in attempt is in flight.
    Authenticating,
    /// A session exists; the landing screen is active.
    LoggedIn,
    /// The last attempt failed; surfaced transiently before settling
    /// back at `LoggedOut` for retry.
    Failed,
}

/// Events emitted by the controller during sign-in and sign-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthEvent {
    /// The controller moved to a new phase.
    PhaseChanged { phase: AuthPhase },

    /// A session was established.
    SignedIn {
        #[serde(skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },

    /// Routing to the landing screen. Emitted exactly once per sign-in;
    /// the login screen's lifecycle ends here.
    NavigatedToLanding,

    /// The session was cleared.
    SignedOut,

    /// A sign-in attempt failed.
    Error {
        kind: AuthErrorKind,
        message: String,
    },
}

/// Default capacity for the controller's event channel.
const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Completion of one spawned sign-in attempt.
struct AttemptCompletion {
    attempt: u64,
    outcome: Result<Session, AuthError>,
}

/// State machine driving login, routing, and sign-out.
pub struct AuthFlowController {
    store: SessionStore,
    exchange: Arc<dyn CredentialExchange>,
    phase: AuthPhase,
    /// Monotonic attempt id. Bumped on every new attempt and on sign-out,
    /// which makes completions of superseded attempts stale.
    attempt: u64,
    last_error: Option<AuthError>,
    events_tx: mpsc::Sender<AuthEvent>,
    events_rx: Option<mpsc::Receiver<AuthEvent>>,
    completions_tx: mpsc::Sender<AttemptCompletion>,
    completions_rx: mpsc::Receiver<AttemptCompletion>,
}

impl AuthFlowController {
    /// Creates a controller over an injected store and exchange.
    ///
    /// Entry guard: if the store already holds a valid session, the
    /// controller starts in `LoggedIn` and routes to landing immediately.
    pub fn new(store: SessionStore, exchange: Arc<dyn CredentialExchange>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (completions_tx, completions_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let mut controller = Self {
            store,
            exchange,
            phase: AuthPhase::LoggedOut,
            attempt: 0,
            last_error: None,
            events_tx,
            events_rx: Some(events_rx),
            completions_tx,
            completions_rx,
        };

        if controller.store.current_user().is_some() {
            tracing::debug!("existing session found, skipping login");
            controller.set_phase(AuthPhase::LoggedIn);
            controller.emit(AuthEvent::NavigatedToLanding);
        }

        controller
    }

    /// Current phase.
    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    /// Current session, if any.
    pub fn current_user(&self) -> Option<&Session> {
        self.store.current_user()
    }

    /// The error from the most recent failed attempt.
    pub fn last_error(&self) -> Option<&AuthError> {
        self.last_error.as_ref()
    }

    /// Takes the event receiver. Can only be taken once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<AuthEvent>> {
        self.events_rx.take()
    }

    /// Submits an email/password sign-in.
    ///
    /// Empty fields fail locally before any network call is issued; the
    /// exchange is never invoked and the phase stays `LoggedOut`.
    ///
    /// # Errors
    /// Returns a `Validation` error when a required field is empty.
    pub fn submit_password(&mut self, email: &str, password: &str) -> Result<(), AuthError> {
        self.validate_fields(email, password)?;
        let future = self.exchange.sign_in_with_password(email, password);
        self.begin_attempt(future);
        Ok(())
    }

    /// Submits an account creation with email/password.
    ///
    /// # Errors
    /// Returns a `Validation` error when a required field is empty.
    pub fn submit_sign_up(&mut self, email: &str, password: &str) -> Result<(), AuthError> {
        self.validate_fields(email, password)?;
        let future = self.exchange.sign_up_with_password(email, password);
        self.begin_attempt(future);
        Ok(())
    }

    /// Launches a federated sign-in flow.
    ///
    /// The provider flow and the subsequent token exchange run as one
    /// attempt; a cancelled flow completes it with `Cancelled`.
    pub fn begin_federated(&mut self, provider: Arc<dyn FederatedProvider>) {
        self.attempt += 1;
        let attempt = self.attempt;
        self.set_phase(AuthPhase::Authenticating);

        let exchange = Arc::clone(&self.exchange);
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let outcome = match provider.launch_sign_in().await {
                Ok(token) => exchange.sign_in_with_federated_token(&token).await,
                Err(err) => Err(err),
            };
            let _ = tx.send(AttemptCompletion { attempt, outcome }).await;
        });
    }

    /// Awaits the next attempt completion and applies it.
    ///
    /// Completions are applied strictly in arrival order. A completion of a
    /// superseded attempt (a newer submit, or sign-out in the meantime) is
    /// discarded without touching the store. Returns the phase afterward.
    pub async fn next_transition(&mut self) -> AuthPhase {
        if let Some(completion) = self.completions_rx.recv().await {
            self.apply(completion);
        }
        self.phase
    }

    /// Unconditionally clears the session and returns to `LoggedOut`,
    /// cancelling any in-flight attempt. Returns whether a session existed;
    /// a no-op when already signed out.
    pub fn sign_out(&mut self) -> bool {
        self.attempt += 1;

        let had_session = match self.store.sign_out() {
            Ok(had) => had,
            Err(err) => {
                tracing::warn!(error = %err, "failed to clear persisted session");
                false
            }
        };

        if self.phase != AuthPhase::LoggedOut {
            self.set_phase(AuthPhase::LoggedOut);
        }
        if had_session {
            self.emit(AuthEvent::SignedOut);
        }
        had_session
    }

    fn validate_fields(&mut self, email: &str, password: &str) -> Result<(), AuthError> {
        if email.is_empty() || password.is_empty() {
            let err = AuthError::validation("Email and password must not be empty");
            self.emit(AuthEvent::Error {
                kind: err.kind,
                message: err.message.clone(),
            });
            return Err(err);
        }
        Ok(())
    }

    fn begin_attempt(&mut self, future: AuthFuture) {
        self.attempt += 1;
        let attempt = self.attempt;
        self.set_phase(AuthPhase::Authenticating);

        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let outcome = future.await;
            let _ = tx.send(AttemptCompletion { attempt, outcome }).await;
        });
    }

    fn apply(&mut self, completion: AttemptCompletion) {
        if completion.attempt != self.attempt || self.phase != AuthPhase::Authenticating {
            tracing::debug!(attempt = completion.attempt, "discarding stale auth completion");
            return;
        }

        match completion.outcome {
            Ok(session) => {
                let display_name = session.display_name.clone();
                if let Err(err) = self.store.set_session(session) {
                    tracing::warn!(error = %err, "failed to persist session");
                }
                self.last_error = None;
                self.set_phase(AuthPhase::LoggedIn);
                self.emit(AuthEvent::SignedIn { display_name });
                self.emit(AuthEvent::NavigatedToLanding);
            }
            Err(err) => {
                self.set_phase(AuthPhase::Failed);
                self.emit(AuthEvent::Error {
                    kind: err.kind,
                    message: err.message.clone(),
                });
                self.last_error = Some(err);
                // Failed is transient: settle at LoggedOut for retry.
                self.set_phase(AuthPhase::LoggedOut);
            }
        }
    }

    fn set_phase(&mut self, phase: AuthPhase) {
        self.phase = phase;
        self.emit(AuthEvent::PhaseChanged { phase });
    }

    /// Best-effort send: never awaits, drops if nobody is listening.
    fn emit(&self, event: AuthEvent) {
        let _ = self.events_tx.try_send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::auth::federated::{FederatedToken, TokenFuture};

    fn sample_session() -> Session {
        Session {
            access_token: "vst-test".to_string(),
            refresh_token: None,
            expires_at: crate::auth::session::now_millis_u64() + 3_600_000,
            display_name: Some("Ada".to_string()),
            email: Some("a@b.com".to_string()),
        }
    }

    fn expired_session() -> Session {
        Session {
            expires_at: 0,
            ..sample_session()
        }
    }

    /// Scripted exchange: each call pops the next (delay, outcome) pair.
    #[derive(Default)]
    struct MockExchange {
        calls: AtomicUsize,
        plan: Mutex<VecDeque<(Duration, Result<Session, AuthError>)>>,
    }

    impl MockExchange {
        fn planned(outcomes: Vec<Result<Session, AuthError>>) -> Arc<Self> {
            let plan = outcomes
                .into_iter()
                .map(|o| (Duration::ZERO, o))
                .collect();
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                plan: Mutex::new(plan),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn next_outcome(&self) -> AuthFuture {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (delay, outcome) = self
                .plan
                .lock()
                .unwrap()
                .pop_front()
                .expect("exchange called without a planned outcome");
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                outcome
            })
        }
    }

    impl CredentialExchange for MockExchange {
        fn sign_in_with_password(&self, _email: &str, _password: &str) -> AuthFuture {
            self.next_outcome()
        }

        fn sign_in_with_federated_token(&self, _token: &FederatedToken) -> AuthFuture {
            self.next_outcome()
        }

        fn sign_up_with_password(&self, _email: &str, _password: &str) -> AuthFuture {
            self.next_outcome()
        }
    }

    struct MockProvider {
        outcome: Mutex<Option<Result<FederatedToken, AuthError>>>,
    }

    impl MockProvider {
        fn with(outcome: Result<FederatedToken, AuthError>) -> Arc<Self> {
            Arc::new(Self {
                outcome: Mutex::new(Some(outcome)),
            })
        }
    }

    impl FederatedProvider for MockProvider {
        fn launch_sign_in(&self) -> TokenFuture {
            let outcome = self.outcome.lock().unwrap().take().expect("provider reused");
            Box::pin(async move { outcome })
        }
    }

    fn fresh_store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::load_from(dir.path().join("session.json")).unwrap();
        (dir, store)
    }

    fn drain(rx: &mut mpsc::Receiver<AuthEvent>) -> Vec<AuthEvent> {
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        events
    }

    #[tokio::test]
    async fn test_empty_fields_rejected_without_network_call() {
        let (_dir, store) = fresh_store();
        let exchange = MockExchange::planned(vec![]);
        let mut controller = AuthFlowController::new(store, Arc::clone(&exchange) as Arc<dyn CredentialExchange>);

        for (email, password) in [("", "pw1"), ("a@b.com", ""), ("", "")] {
            let err = controller.submit_password(email, password).unwrap_err();
            assert_eq!(err.kind, AuthErrorKind::Validation);
        }

        assert_eq!(exchange.call_count(), 0);
        assert_eq!(controller.phase(), AuthPhase::LoggedOut);
    }

    #[tokio::test]
    async fn test_successful_exchange_reaches_logged_in() {
        let (_dir, store) = fresh_store();
        let exchange = MockExchange::planned(vec![Ok(sample_session())]);
        let mut controller = AuthFlowController::new(store, exchange);
        let mut events = controller.take_events().unwrap();

        controller.submit_password("a@b.com", "pw1").unwrap();
        assert_eq!(controller.phase(), AuthPhase::Authenticating);

        let phase = controller.next_transition().await;
        assert_eq!(phase, AuthPhase::LoggedIn);
        assert!(controller.current_user().is_some());

        let navigations = drain(&mut events)
            .iter()
            .filter(|e| matches!(e, AuthEvent::NavigatedToLanding))
            .count();
        assert_eq!(navigations, 1, "navigation to landing must occur exactly once");
    }

    #[tokio::test]
    async fn test_failed_exchange_settles_logged_out() {
        let (_dir, store) = fresh_store();
        let exchange = MockExchange::planned(vec![Err(AuthError::invalid_credential(
            401,
            r#"{"error": {"message": "bad password"}}"#,
        ))]);
        let mut controller = AuthFlowController::new(store, exchange);
        let mut events = controller.take_events().unwrap();

        controller.submit_password("a@b.com", "wrong").unwrap();
        let phase = controller.next_transition().await;

        assert_eq!(phase, AuthPhase::LoggedOut);
        assert!(controller.current_user().is_none());
        assert_eq!(
            controller.last_error().unwrap().kind,
            AuthErrorKind::InvalidCredential
        );

        // Failed is observable through the emitted phases before settling.
        let phases: Vec<AuthPhase> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                AuthEvent::PhaseChanged { phase } => Some(phase),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![
                AuthPhase::Authenticating,
                AuthPhase::Failed,
                AuthPhase::LoggedOut
            ]
        );
    }

    #[tokio::test]
    async fn test_sign_out_when_logged_out_is_noop() {
        let (_dir, store) = fresh_store();
        let exchange = MockExchange::planned(vec![]);
        let mut controller = AuthFlowController::new(store, exchange);

        assert!(!controller.sign_out());
        assert!(!controller.sign_out());
        assert_eq!(controller.phase(), AuthPhase::LoggedOut);
    }

    #[tokio::test]
    async fn test_sign_out_cancels_in_flight_attempt() {
        let (_dir, store) = fresh_store();
        let exchange = MockExchange::planned(vec![Ok(sample_session())]);
        let mut controller = AuthFlowController::new(store, exchange);

        controller.submit_password("a@b.com", "pw1").unwrap();
        controller.sign_out();

        // The attempt still completes, but its result is stale and discarded.
        let phase = controller.next_transition().await;
        assert_eq!(phase, AuthPhase::LoggedOut);
        assert!(controller.current_user().is_none());
    }

    #[tokio::test]
    async fn test_newer_submit_supersedes_older_attempt() {
        let (_dir, store) = fresh_store();
        let failed = Err(AuthError::network("connection reset"));
        let exchange = MockExchange::planned(vec![failed, Ok(sample_session())]);
        let mut controller = AuthFlowController::new(store, exchange);

        controller.submit_password("a@b.com", "pw1").unwrap();
        controller.submit_password("a@b.com", "pw1").unwrap();

        // First completion belongs to the superseded attempt: discarded.
        controller.next_transition().await;
        let phase = controller.next_transition().await;

        assert_eq!(phase, AuthPhase::LoggedIn);
        assert!(controller.current_user().is_some());
    }

    #[tokio::test]
    async fn test_auto_login_with_valid_stored_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut seed = SessionStore::load_from(path.clone()).unwrap();
        seed.set_session(sample_session()).unwrap();

        let store = SessionStore::load_from(path).unwrap();
        let exchange = MockExchange::planned(vec![]);
        let mut controller = AuthFlowController::new(store, exchange);
        let mut events = controller.take_events().unwrap();

        assert_eq!(controller.phase(), AuthPhase::LoggedIn);
        let navigations = drain(&mut events)
            .iter()
            .filter(|e| matches!(e, AuthEvent::NavigatedToLanding))
            .count();
        assert_eq!(navigations, 1);
    }

    #[tokio::test]
    async fn test_expired_stored_session_starts_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut seed = SessionStore::load_from(path.clone()).unwrap();
        seed.set_session(expired_session()).unwrap();

        let store = SessionStore::load_from(path).unwrap();
        let exchange = MockExchange::planned(vec![]);
        let controller = AuthFlowController::new(store, exchange);

        assert_eq!(controller.phase(), AuthPhase::LoggedOut);
        assert!(controller.current_user().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_federated_flow_skips_exchange() {
        let (_dir, store) = fresh_store();
        let exchange = MockExchange::planned(vec![]);
        let mut controller = AuthFlowController::new(store, Arc::clone(&exchange) as Arc<dyn CredentialExchange>);

        let provider = MockProvider::with(Err(AuthError::cancelled("flow abandoned")));
        controller.begin_federated(provider);
        assert_eq!(controller.phase(), AuthPhase::Authenticating);

        let phase = controller.next_transition().await;
        assert_eq!(phase, AuthPhase::LoggedOut);
        assert_eq!(exchange.call_count(), 0);
        assert_eq!(
            controller.last_error().unwrap().kind,
            AuthErrorKind::Cancelled
        );
    }

    #[tokio::test]
    async fn test_federated_token_is_exchanged_for_session() {
        let (_dir, store) = fresh_store();
        let exchange = MockExchange::planned(vec![Ok(sample_session())]);
        let mut controller = AuthFlowController::new(store, Arc::clone(&exchange) as Arc<dyn CredentialExchange>);

        let provider = MockProvider::with(Ok(FederatedToken::new("id-token-1")));
        controller.begin_federated(provider);

        let phase = controller.next_transition().await;
        assert_eq!(phase, AuthPhase::LoggedIn);
        assert_eq!(exchange.call_count(), 1);
    }

    #[tokio::test]
    async fn test_sign_up_reaches_logged_in() {
        let (_dir, store) = fresh_store();
        let exchange = MockExchange::planned(vec![Ok(sample_session())]);
        let mut controller = AuthFlowController::new(store, Arc::clone(&exchange) as Arc<dyn CredentialExchange>);

        controller.submit_sign_up("new@b.com", "pw1").unwrap();
        let phase = controller.next_transition().await;

        assert_eq!(phase, AuthPhase::LoggedIn);
        assert_eq!(exchange.call_count(), 1);
    }
}
