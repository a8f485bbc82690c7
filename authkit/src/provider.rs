//! Auth context provider: one per client lifetime.
//!
//! SYSTEM CONTEXT
//! ==============
//! The provider owns a `SessionStore`, the backend subscription feeding it,
//! and the `AuthOperations` bound to both. Hosts hold it in an `Arc` and
//! hand out `AuthState` snapshots and subscriptions to their views.
//!
//! LIFECYCLE
//! =========
//! `initialize` runs the startup sequence at most once: capture the store
//! revision, subscribe to backend events, start the event pump, then look
//! the initial credentials up. Events that arrive while the lookup is in
//! flight win over its result. Dropping the provider (or `shutdown`)
//! aborts the pump and the monitor task.
//!
//! TRADE-OFFS
//! ==========
//! Operations and lookups run on spawned tasks. A caller that goes away
//! does not cancel them; the store still gets the result.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::backend::AuthBackend;
use crate::error::AuthError;
use crate::monitor::{LAST_ACTIVITY_KEY, MonitorConfig, MonitorVerdict, SessionMonitor};
use crate::ops::{AuthOperations, SignUpOutcome};
use crate::session::{Credentials, Identity, Session, SessionEvent, SessionEventKind};
use crate::state::{AuthState, Phase};
use crate::storage::ClientStorage;
use crate::store::{SessionStore, Subscription};

#[derive(Clone, Debug)]
pub struct ProviderConfig {
    /// How long a verified session is trusted without asking the backend.
    pub session_cache_ttl: Duration,
    /// Credentials the host already holds (cookies, persisted tokens).
    pub initial_credentials: Credentials,
    pub monitor: MonitorConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            session_cache_ttl: Duration::from_secs(30),
            initial_credentials: Credentials::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl ProviderConfig {
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.initial_credentials = credentials;
        self
    }
}

pub struct AuthProvider {
    backend: Arc<dyn AuthBackend>,
    store: SessionStore,
    ops: AuthOperations,
    storage: Arc<dyn ClientStorage>,
    config: ProviderConfig,
    startup_done: watch::Sender<bool>,
    verified_at: Mutex<Option<Instant>>,
    monitor: Mutex<SessionMonitor>,
    pump: Mutex<Option<JoinHandle<()>>>,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Last activity mirrored by `record_activity`; unreadable values are ignored.
fn stored_activity(storage: &dyn ClientStorage) -> Option<OffsetDateTime> {
    let raw = storage.get(LAST_ACTIVITY_KEY)?;
    let seconds = raw.parse::<i64>().ok()?;
    OffsetDateTime::from_unix_timestamp(seconds).ok()
}

impl AuthProvider {
    #[must_use]
    pub fn new(backend: Arc<dyn AuthBackend>, storage: Arc<dyn ClientStorage>, config: ProviderConfig) -> Arc<Self> {
        let store = SessionStore::new();
        let ops = AuthOperations::new(Arc::clone(&backend), store.clone()).with_storage(Arc::clone(&storage));
        let (startup_done, _) = watch::channel(false);
        let now = OffsetDateTime::now_utc();
        let monitor = match stored_activity(storage.as_ref()) {
            Some(at) => SessionMonitor::resume(config.monitor, at, now),
            None => SessionMonitor::new(config.monitor, now),
        };
        Arc::new(Self {
            backend,
            store,
            ops,
            storage,
            config,
            startup_done,
            verified_at: Mutex::new(None),
            monitor: Mutex::new(monitor),
            pump: Mutex::new(None),
            monitor_task: Mutex::new(None),
        })
    }

    // =========================================================================
    // READ SURFACE
    // =========================================================================

    #[must_use]
    pub fn state(&self) -> AuthState {
        self.store.get_current()
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.store.get_current().identity
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.store.get_current().phase
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AuthState) + Send + Sync + 'static,
    {
        self.store.subscribe(listener)
    }

    // =========================================================================
    // STARTUP
    // =========================================================================

    /// Run the startup sequence once and wait for it to finish. Later calls
    /// only wait.
    pub async fn initialize(self: &Arc<Self>) -> AuthState {
        if let Some(revision) = self.store.begin_startup() {
            let events = self.backend.session_events();
            self.start_pump(events);

            let this = Arc::clone(self);
            tokio::spawn(async move {
                let session = if this.config.initial_credentials.is_empty() {
                    None
                } else {
                    lookup(&this.backend, this.config.initial_credentials.clone()).await
                };
                if this.store.complete_startup(revision, session) {
                    this.mark_verified();
                }
                this.startup_done.send_replace(true);
                tracing::info!(authenticated = this.store.get_current().is_authenticated(), "auth provider ready");
            });
        }

        let mut done = self.startup_done.subscribe();
        let _ = done.wait_for(|done| *done).await;
        self.store.get_current()
    }

    fn start_pump(self: &Arc<Self>, mut events: broadcast::Receiver<SessionEvent>) {
        let provider = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                let received = events.recv().await;
                let Some(this) = provider.upgrade() else { break };
                match received {
                    Ok(event) => this.on_event(event),
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "session event feed lagged; forcing refresh");
                        this.invalidate_cache();
                        this.check_session(true).await;
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!("session event feed closed");
                        break;
                    }
                }
            }
        });
        if let Some(previous) = lock(&self.pump).replace(handle) {
            previous.abort();
        }
    }

    fn on_event(&self, event: SessionEvent) {
        let kind = event.kind;
        if self.store.apply_event(event) {
            self.invalidate_cache();
            if kind == SessionEventKind::SignedIn {
                self.record_activity();
            }
        }
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    /// See [`AuthOperations::sign_up`].
    ///
    /// # Errors
    ///
    /// As for [`AuthOperations::sign_up`]; a crashed operation task is `system`.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError> {
        let ops = self.ops.clone();
        let (email, password) = (email.to_owned(), password.to_owned());
        let outcome = detached(async move { ops.sign_up(&email, &password).await }).await?;
        if !outcome.needs_confirmation {
            self.mark_verified();
            self.record_activity();
        }
        Ok(outcome)
    }

    /// See [`AuthOperations::sign_in`].
    ///
    /// # Errors
    ///
    /// As for [`AuthOperations::sign_in`]; a crashed operation task is `system`.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let ops = self.ops.clone();
        let (email, password) = (email.to_owned(), password.to_owned());
        let identity = detached(async move { ops.sign_in(&email, &password).await }).await?;
        self.mark_verified();
        self.record_activity();
        Ok(identity)
    }

    /// See [`AuthOperations::sign_out`].
    ///
    /// # Errors
    ///
    /// As for [`AuthOperations::sign_out`]; a crashed operation task is `system`.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.invalidate_cache();
        let ops = self.ops.clone();
        detached(async move { ops.sign_out().await }).await
    }

    // =========================================================================
    // SESSION CACHE
    // =========================================================================

    /// Current identity, re-verified with the backend unless a verification
    /// younger than the cache TTL exists. A failed or empty lookup clears
    /// the identity.
    pub async fn check_session(&self, force_refresh: bool) -> Option<Identity> {
        if !force_refresh && self.cache_is_fresh() {
            return self.identity();
        }

        let revision = self.store.revision();
        let session = match self.store.session() {
            Some(current) => lookup(&self.backend, current.credentials()).await,
            None => None,
        };
        if self.store.apply_lookup(revision, session) {
            self.mark_verified();
        }
        self.identity()
    }

    fn cache_is_fresh(&self) -> bool {
        lock(&self.verified_at).is_some_and(|at| at.elapsed() < self.config.session_cache_ttl)
    }

    fn mark_verified(&self) {
        *lock(&self.verified_at) = Some(Instant::now());
    }

    fn invalidate_cache(&self) {
        *lock(&self.verified_at) = None;
    }

    // =========================================================================
    // SESSION MONITOR
    // =========================================================================

    /// Note user activity; it postpones the inactivity sign-out.
    pub fn record_activity(&self) {
        let now = OffsetDateTime::now_utc();
        lock(&self.monitor).record_activity_at(now);
        if let Err(e) = self.storage.set(LAST_ACTIVITY_KEY, &now.unix_timestamp().to_string()) {
            tracing::debug!(error = %e, "could not persist last activity");
        }
    }

    pub async fn check_health(&self) -> MonitorVerdict {
        self.check_health_at(OffsetDateTime::now_utc()).await
    }

    /// Evaluate the session at `now` and act on the verdict. Activity that
    /// another handle recorded in the shared storage counts too.
    pub async fn check_health_at(&self, now: OffsetDateTime) -> MonitorVerdict {
        let session: Option<Session> = self.store.session();
        let verdict = {
            let mut monitor = lock(&self.monitor);
            if let Some(at) = stored_activity(self.storage.as_ref()) {
                monitor.record_activity_at(at);
            }
            monitor.evaluate_at(session.as_ref(), now)
        };
        match verdict {
            MonitorVerdict::Healthy => {}
            MonitorVerdict::Expired | MonitorVerdict::Inactive => {
                tracing::info!(target: "security", ?verdict, "ending session");
                self.end_session().await;
            }
            MonitorVerdict::VerifyIntegrity => {
                if self.check_session(true).await.is_none() {
                    tracing::warn!(target: "security", "session failed integrity check");
                    self.end_session().await;
                }
            }
        }
        verdict
    }

    async fn end_session(&self) {
        if let Err(e) = self.sign_out().await {
            tracing::error!(error = %e, "sign-out after session check failed");
        }
    }

    /// Start the periodic health check. It stops when the provider is dropped.
    pub fn spawn_monitor(self: &Arc<Self>) {
        let provider = Arc::downgrade(self);
        let period = self.config.monitor.check_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(this) = provider.upgrade() else { break };
                this.check_health().await;
            }
        });
        if let Some(previous) = lock(&self.monitor_task).replace(handle) {
            previous.abort();
        }
    }

    /// Abort the background tasks. The store keeps its last state.
    pub fn shutdown(&self) {
        for slot in [&self.pump, &self.monitor_task] {
            if let Some(handle) = lock(slot).take() {
                handle.abort();
            }
        }
    }
}

impl Drop for AuthProvider {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Run an operation on its own task so the caller cannot cancel it.
async fn detached<T, F>(operation: F) -> Result<T, AuthError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, AuthError>> + Send + 'static,
{
    tokio::spawn(operation).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "auth operation task failed");
        Err(AuthError::system(e.to_string()))
    })
}

/// Backend lookup on its own task. Failures and unusable sessions count as
/// "no session".
async fn lookup(backend: &Arc<dyn AuthBackend>, credentials: Credentials) -> Option<Session> {
    let backend = Arc::clone(backend);
    let result = tokio::spawn(async move { backend.lookup_session(&credentials).await }).await;
    let session = match result {
        Ok(Ok(session)) => session?,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "session lookup failed; treating as signed out");
            return None;
        }
        Err(e) => {
            tracing::error!(error = %e, "session lookup task failed");
            return None;
        }
    };
    if !session.identity.is_well_formed() {
        tracing::warn!(target: "security", token = %session.fingerprint(), "backend returned a malformed identity");
        return None;
    }
    if session.is_expired(OffsetDateTime::now_utc()) {
        tracing::debug!(token = %session.fingerprint(), "backend returned an expired session");
        return None;
    }
    Some(session)
}

#[cfg(test)]
#[path = "provider_test.rs"]
mod tests;
