//! In-memory doubles for tests: a scriptable backend and a recording
//! navigator. Enabled for this crate's tests and, via the `testing`
//! feature, for downstream crates.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tokio::sync::{Semaphore, broadcast};

use crate::backend::{AuthBackend, SignUpResponse};
use crate::error::BackendError;
use crate::guard::Navigator;
use crate::session::{Credentials, Identity, Session, SessionEvent};

const SESSION_TTL: Duration = Duration::hours(1);

/// A session for `id`/`email`, valid for an hour from now.
#[must_use]
pub fn session_for(id: &str, email: &str) -> Session {
    let now = OffsetDateTime::now_utc();
    Session {
        identity: Identity::new(id, email),
        issued_at: now,
        expires_at: now + SESSION_TTL,
        access_token: format!("access-{id}"),
        refresh_token: Some(format!("refresh-{id}")),
    }
}

// =============================================================================
// MOCK BACKEND
// =============================================================================

/// Backend entry points, for call counting, scripted failures and gates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Call {
    Lookup,
    SignUp,
    SignIn,
    SignOut,
}

struct Account {
    identity: Identity,
    password: String,
    confirmed: bool,
}

#[derive(Default)]
struct MockInner {
    accounts: HashMap<String, Account>,
    /// Live sessions by access token.
    sessions: HashMap<String, Session>,
    failures: HashMap<Call, VecDeque<BackendError>>,
    gates: HashMap<Call, Arc<Semaphore>>,
    calls: Vec<Call>,
    require_confirmation: bool,
    next_id: u64,
}

/// Scriptable stand-in for the external auth service.
///
/// Accounts and sessions live in memory. Sign-in and sign-out also emit
/// the matching event on the change feed, as a real backend does.
pub struct MockBackend {
    inner: Mutex<MockInner>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for MockBackend {
    fn default() -> Self {
        let (events, _) = broadcast::channel(64);
        Self { inner: Mutex::new(MockInner::default()), events }
    }
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, MockInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a confirmed account.
    pub fn add_account(&self, email: &str, password: &str) -> Identity {
        self.insert_account(email, password, true)
    }

    /// Register an account whose email was never confirmed.
    pub fn add_unconfirmed_account(&self, email: &str, password: &str) -> Identity {
        self.insert_account(email, password, false)
    }

    /// Make a session resolvable by `lookup_session`.
    pub fn insert_session(&self, session: Session) {
        self.lock().sessions.insert(session.access_token.clone(), session);
    }

    /// Forget every issued session, as a server-side revocation would.
    pub fn revoke_all(&self) {
        self.lock().sessions.clear();
    }

    /// Live receivers of the change feed.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Events not yet received by every subscriber.
    #[must_use]
    pub fn undelivered(&self) -> usize {
        self.events.len()
    }

    /// Sign-up creates accounts but issues no session.
    pub fn require_confirmation(&self, required: bool) {
        self.lock().require_confirmation = required;
    }

    /// Fail the next `call` with `error`. Queued failures are consumed in order.
    pub fn fail_next(&self, call: Call, error: BackendError) {
        self.lock().failures.entry(call).or_default().push_back(error);
    }

    /// Hold every `call` until a permit is added to the returned semaphore.
    pub fn gate(&self, call: Call) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.lock().gates.insert(call, Arc::clone(&gate));
        gate
    }

    /// Push an event onto the change feed.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    #[must_use]
    pub fn calls(&self, call: Call) -> usize {
        self.lock().calls.iter().filter(|c| **c == call).count()
    }

    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.lock().calls.len()
    }

    fn insert_account(&self, email: &str, password: &str, confirmed: bool) -> Identity {
        let mut inner = self.lock();
        inner.next_id += 1;
        let identity = Identity::new(format!("user-{}", inner.next_id), email);
        inner.accounts.insert(
            email.to_owned(),
            Account { identity: identity.clone(), password: password.to_owned(), confirmed },
        );
        identity
    }

    /// Record the call, wait on its gate, then pop a scripted failure.
    async fn enter(&self, call: Call) -> Result<(), BackendError> {
        let gate = {
            let mut inner = self.lock();
            inner.calls.push(call);
            inner.gates.get(&call).cloned()
        };
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        match self.lock().failures.get_mut(&call).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn issue(inner: &mut MockInner, identity: Identity) -> Session {
        inner.next_id += 1;
        let now = OffsetDateTime::now_utc();
        let session = Session {
            identity,
            issued_at: now,
            expires_at: now + SESSION_TTL,
            access_token: format!("token-{}", inner.next_id),
            refresh_token: Some(format!("refresh-{}", inner.next_id)),
        };
        inner.sessions.insert(session.access_token.clone(), session.clone());
        session
    }
}

#[async_trait]
impl AuthBackend for MockBackend {
    async fn lookup_session(&self, credentials: &Credentials) -> Result<Option<Session>, BackendError> {
        self.enter(Call::Lookup).await?;
        let now = OffsetDateTime::now_utc();
        let mut inner = self.lock();

        if let Some(session) = credentials.access_token.as_ref().and_then(|t| inner.sessions.get(t)) {
            if !session.is_expired(now) {
                return Ok(Some(session.clone()));
            }
        }

        let Some(refresh) = credentials.refresh_token.as_deref() else {
            return Ok(None);
        };
        let previous = inner
            .sessions
            .values()
            .find(|s| s.refresh_token.as_deref() == Some(refresh))
            .cloned();
        let Some(previous) = previous else {
            return Ok(None);
        };
        inner.sessions.remove(&previous.access_token);
        let rotated = Self::issue(&mut inner, previous.identity);
        drop(inner);
        self.emit(SessionEvent::token_refreshed(rotated.clone()));
        Ok(Some(rotated))
    }

    async fn sign_up_with_password(&self, email: &str, password: &str) -> Result<SignUpResponse, BackendError> {
        self.enter(Call::SignUp).await?;
        if self.lock().accounts.contains_key(email) {
            return Err(BackendError::rejected(Some(422), "User already registered"));
        }
        if password.len() < 6 {
            return Err(BackendError::rejected(Some(422), "Password should be at least 6 characters"));
        }
        let confirmed = !self.lock().require_confirmation;
        let identity = self.insert_account(email, password, confirmed);
        if !confirmed {
            return Ok(SignUpResponse { identity: Some(identity), session: None });
        }
        let session = Self::issue(&mut self.lock(), identity.clone());
        self.emit(SessionEvent::signed_in(session.clone()));
        Ok(SignUpResponse { identity: Some(identity), session: Some(session) })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        self.enter(Call::SignIn).await?;
        let session = {
            let mut inner = self.lock();
            let (identity, confirmed) = match inner.accounts.get(email) {
                Some(account) if account.password == password => (account.identity.clone(), account.confirmed),
                _ => return Err(BackendError::rejected(Some(400), "Invalid login credentials")),
            };
            if !confirmed {
                return Err(BackendError::rejected(Some(400), "Email not confirmed"));
            }
            Self::issue(&mut inner, identity)
        };
        self.emit(SessionEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self, access_token: Option<&str>) -> Result<(), BackendError> {
        self.enter(Call::SignOut).await?;
        if let Some(token) = access_token {
            self.lock().sessions.remove(token);
        }
        self.emit(SessionEvent::signed_out());
        Ok(())
    }

    fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

// =============================================================================
// RECORDING NAVIGATOR
// =============================================================================

/// Navigator that records every `replace` and follows it.
#[derive(Debug)]
pub struct RecordingNavigator {
    path: Mutex<String>,
    history: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    #[must_use]
    pub fn at(path: &str) -> Arc<Self> {
        Arc::new(Self { path: Mutex::new(path.to_owned()), history: Mutex::new(Vec::new()) })
    }

    /// Simulate the user navigating without going through the guard.
    pub fn visit(&self, path: &str) {
        *self.path.lock().unwrap_or_else(PoisonError::into_inner) = path.to_owned();
    }

    #[must_use]
    pub fn replacements(&self) -> Vec<String> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Navigator for RecordingNavigator {
    fn current_path(&self) -> String {
        self.path.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn replace(&self, path: &str) {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).push(path.to_owned());
        self.visit(path);
    }
}
