//! Session store: the single owner of the current session.
//!
//! DESIGN
//! ======
//! One `SessionStore` per client context (per request on the server). It is
//! mutated only by auth operations and by the backend event feed; everything
//! else reads `AuthState` snapshots or subscribes.
//!
//! Every applied session mutation bumps `revision`. A lookup that started
//! before a mutation must not overwrite it, so lookups apply their result
//! with a compare-and-set on the revision they captured.
//!
//! Notifications go through an outbox so listeners observe transitions in
//! mutation order, even when a listener mutates the store re-entrantly or
//! another thread mutates while a dispatch is running.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::error::AuthError;
use crate::session::{Session, SessionEvent, SessionEventKind};
use crate::state::{AuthState, Phase};

/// Callback invoked with every new `AuthState`.
pub type Listener = Arc<dyn Fn(&AuthState) + Send + Sync>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Startup {
    #[default]
    NotStarted,
    Pending,
    Done,
}

struct ListenerEntry {
    id: u64,
    /// Sequence number of the snapshot this listener was primed with.
    since: u64,
    callback: Listener,
}

#[derive(Default)]
struct StoreInner {
    session: Option<Session>,
    last_error: Option<AuthError>,
    startup: Startup,
    pending_ops: usize,
    revision: u64,
    published: AuthState,
    published_seq: u64,
    outbox: VecDeque<(u64, AuthState)>,
    dispatching: bool,
    listeners: Vec<ListenerEntry>,
    next_listener_id: u64,
}

impl StoreInner {
    fn phase(&self) -> Phase {
        match self.startup {
            Startup::NotStarted if self.pending_ops == 0 => Phase::Uninitialized,
            Startup::Done if self.pending_ops == 0 => Phase::Ready,
            _ => Phase::Loading,
        }
    }

    fn snapshot(&self) -> AuthState {
        AuthState {
            identity: self.session.as_ref().map(|s| s.identity.clone()),
            phase: self.phase(),
            last_error: self.last_error.clone(),
        }
    }
}

// =============================================================================
// SESSION STORE
// =============================================================================

/// Shared handle to one client context's session state. Cloning shares it.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Non-blocking snapshot of the current state.
    #[must_use]
    pub fn get_current(&self) -> AuthState {
        self.lock().snapshot()
    }

    /// The full session, tokens included. Only auth plumbing should need this.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.lock().session.clone()
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    /// Register `listener`. It is called immediately with the current state,
    /// then once per transition until the returned `Subscription` is dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AuthState) + Send + Sync + 'static,
    {
        let callback: Listener = Arc::new(listener);
        let (id, primed) = {
            let mut inner = self.lock();
            let id = inner.next_listener_id;
            inner.next_listener_id += 1;
            let since = inner.published_seq;
            inner.listeners.push(ListenerEntry { id, since, callback: Arc::clone(&callback) });
            (id, inner.published.clone())
        };
        invoke(&callback, &primed);
        Subscription { store: Arc::downgrade(&self.inner), id }
    }

    /// Apply one backend session-change event.
    ///
    /// `signed-in` and `token-refreshed` need a session with a well-formed
    /// identity and are ignored otherwise; `signed-out` clears the session
    /// whatever the payload.
    /// Returns whether the event was applied.
    pub fn set_from_backend_event(&self, kind: SessionEventKind, session: Option<Session>) -> bool {
        match (kind, session) {
            (SessionEventKind::SignedOut, _) => {
                self.mutate(|inner| {
                    inner.revision += 1;
                    inner.session = None;
                });
                tracing::debug!("session cleared by signed-out event");
                true
            }
            (kind, Some(session)) if !session.identity.is_well_formed() => {
                tracing::warn!(target: "security", ?kind, token = %session.fingerprint(), "session event with malformed identity ignored");
                false
            }
            (kind, Some(session)) => {
                tracing::debug!(?kind, token = %session.fingerprint(), "session replaced by backend event");
                self.mutate(|inner| {
                    inner.revision += 1;
                    if kind == SessionEventKind::SignedIn {
                        inner.last_error = None;
                    }
                    inner.session = Some(session);
                });
                true
            }
            (kind, None) => {
                tracing::warn!(?kind, "session event without a session ignored");
                false
            }
        }
    }

    pub fn apply_event(&self, event: SessionEvent) -> bool {
        self.set_from_backend_event(event.kind, event.session)
    }

    // -------------------------------------------------------------------------
    // Crate-internal mutations (auth operations and provider)
    // -------------------------------------------------------------------------

    pub(crate) fn replace_session(&self, session: Session) {
        self.mutate(|inner| {
            inner.revision += 1;
            inner.last_error = None;
            inner.session = Some(session);
        });
    }

    pub(crate) fn clear_session(&self) -> Option<Session> {
        self.mutate(|inner| {
            inner.revision += 1;
            inner.session.take()
        })
    }

    pub(crate) fn record_error(&self, error: AuthError) {
        self.mutate(|inner| inner.last_error = Some(error));
    }

    pub(crate) fn clear_error(&self) {
        self.mutate(|inner| inner.last_error = None);
    }

    /// Mark an explicit operation in flight until the guard drops.
    pub(crate) fn begin_operation(&self) -> OperationGuard {
        self.mutate(|inner| inner.pending_ops += 1);
        OperationGuard { store: self.clone() }
    }

    /// Enter the startup lookup. Returns the revision to compare against, or
    /// `None` if startup already began.
    pub(crate) fn begin_startup(&self) -> Option<u64> {
        self.mutate(|inner| {
            (inner.startup == Startup::NotStarted).then(|| {
                inner.startup = Startup::Pending;
                inner.revision
            })
        })
    }

    /// Finish startup. The lookup result is applied only if nothing else
    /// touched the session since `expected_revision`; `phase` leaves
    /// `loading` either way.
    pub(crate) fn complete_startup(&self, expected_revision: u64, session: Option<Session>) -> bool {
        self.mutate(|inner| {
            inner.startup = Startup::Done;
            apply_if_current(inner, expected_revision, session)
        })
    }

    /// Apply a refresh lookup under the same compare-and-set rule.
    pub(crate) fn apply_lookup(&self, expected_revision: u64, session: Option<Session>) -> bool {
        self.mutate(|inner| apply_if_current(inner, expected_revision, session))
    }

    // -------------------------------------------------------------------------
    // Notification
    // -------------------------------------------------------------------------

    fn mutate<R>(&self, f: impl FnOnce(&mut StoreInner) -> R) -> R {
        let mut inner = self.lock();
        let out = f(&mut inner);
        self.publish(inner);
        out
    }

    fn publish<'a>(&'a self, mut inner: MutexGuard<'a, StoreInner>) {
        let snapshot = inner.snapshot();
        if snapshot == inner.published {
            return;
        }
        inner.published_seq += 1;
        inner.published = snapshot.clone();
        let seq = inner.published_seq;
        inner.outbox.push_back((seq, snapshot));
        if inner.dispatching {
            return;
        }

        inner.dispatching = true;
        loop {
            let Some((seq, state)) = inner.outbox.pop_front() else {
                inner.dispatching = false;
                return;
            };
            let targets: Vec<Listener> = inner
                .listeners
                .iter()
                .filter(|entry| entry.since < seq)
                .map(|entry| Arc::clone(&entry.callback))
                .collect();
            drop(inner);
            for callback in &targets {
                invoke(callback, &state);
            }
            inner = self.lock();
        }
    }
}

fn apply_if_current(inner: &mut StoreInner, expected_revision: u64, session: Option<Session>) -> bool {
    if inner.revision != expected_revision {
        tracing::debug!(expected_revision, revision = inner.revision, "stale session lookup discarded");
        return false;
    }
    inner.revision += 1;
    inner.session = session;
    true
}

fn invoke(callback: &Listener, state: &AuthState) {
    if panic::catch_unwind(AssertUnwindSafe(|| callback(state))).is_err() {
        tracing::error!("auth state listener panicked");
    }
}

// =============================================================================
// GUARDS
// =============================================================================

/// Scoped listener registration. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    store: Weak<Mutex<StoreInner>>,
    id: u64,
}

impl Subscription {
    /// Explicit form of dropping the subscription.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.store.upgrade() {
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.listeners.retain(|entry| entry.id != self.id);
        }
    }
}

/// Keeps `phase` at `loading` while an operation runs, including when the
/// operation's future is dropped half-way.
pub(crate) struct OperationGuard {
    store: SessionStore,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.store.mutate(|inner| inner.pending_ops = inner.pending_ops.saturating_sub(1));
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
