//! Client-side route guard.
//!
//! Mirrors the edge filter for the window after the client has booted,
//! reacting to store transitions (sign-in elsewhere, refresh, sign-out,
//! expiry). It never redirects while the store is not `ready`, and it does
//! not re-issue a redirect that is already in flight.

use std::sync::{Arc, Mutex, PoisonError};

use crate::routes::{Access, RouteTable};
use crate::state::AuthState;
use crate::store::{SessionStore, Subscription};

/// Pure decision for one path and one state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    /// State not trusted yet; render a neutral placeholder.
    Wait,
    Allow,
    Redirect(String),
}

/// Apply the route table, but only once `phase == ready`.
#[must_use]
pub fn decide(routes: &RouteTable, path: &str, state: &AuthState) -> GuardDecision {
    if !state.is_ready() {
        return GuardDecision::Wait;
    }
    match routes.access(path, state.is_authenticated()) {
        Access::Allow => GuardDecision::Allow,
        Access::Redirect(to) => GuardDecision::Redirect(to),
    }
}

/// What the host should do after an evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardOutcome {
    Loading,
    Render,
    /// Replace the current history entry with this path.
    Navigate(String),
    /// A redirect to the same target was already issued.
    AwaitingNavigation,
}

/// Host navigation surface.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;

    /// Navigate without adding a history entry.
    fn replace(&self, path: &str);
}

pub struct RouteGuard {
    routes: Arc<RouteTable>,
    pending: Mutex<Option<String>>,
}

impl RouteGuard {
    #[must_use]
    pub fn new(routes: Arc<RouteTable>) -> Arc<Self> {
        Arc::new(Self { routes, pending: Mutex::new(None) })
    }

    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Decide for `path`, deduplicating redirects to the pending target.
    pub fn evaluate(&self, path: &str, state: &AuthState) -> GuardOutcome {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        match decide(&self.routes, path, state) {
            GuardDecision::Wait => GuardOutcome::Loading,
            GuardDecision::Allow => {
                *pending = None;
                GuardOutcome::Render
            }
            GuardDecision::Redirect(to) if pending.as_deref() == Some(to.as_str()) => GuardOutcome::AwaitingNavigation,
            GuardDecision::Redirect(to) => {
                tracing::debug!(from = path, to = %to, authenticated = state.is_authenticated(), "guard redirect");
                *pending = Some(to.clone());
                GuardOutcome::Navigate(to)
            }
        }
    }

    /// Called by the host router once a navigation has landed.
    pub fn route_changed(&self, path: &str, state: &AuthState) -> GuardOutcome {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.evaluate(path, state)
    }

    /// Evaluate the navigator's current path and follow a redirect.
    pub fn enforce(&self, state: &AuthState, navigator: &dyn Navigator) -> GuardOutcome {
        let outcome = self.evaluate(&navigator.current_path(), state);
        if let GuardOutcome::Navigate(to) = &outcome {
            navigator.replace(to);
        }
        outcome
    }

    /// Re-enforce on every store transition, starting with the current one.
    pub fn attach(self: &Arc<Self>, store: &SessionStore, navigator: Arc<dyn Navigator>) -> Subscription {
        let guard = Arc::clone(self);
        store.subscribe(move |state| {
            guard.enforce(state, navigator.as_ref());
        })
    }
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
