//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers and the edge filter via the
//! `State` extractor. It holds the auth backend client, the route table
//! shared with every enforcement point, and edge/cookie settings. No
//! per-user state lives here: each request builds its own `SessionStore`.

use std::sync::Arc;

use authkit::{AuthBackend, AuthOperations, RouteTable, SessionStore};

use crate::config::EdgeConfig;

/// Clone is required by Axum; all fields are `Arc`-wrapped or `Copy`.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn AuthBackend>,
    pub routes: Arc<RouteTable>,
    pub edge: EdgeConfig,
    pub cookie_secure: bool,
}

impl AppState {
    #[must_use]
    pub fn new(backend: Arc<dyn AuthBackend>, routes: RouteTable, edge: EdgeConfig, cookie_secure: bool) -> Self {
        Self { backend, routes: Arc::new(routes), edge, cookie_secure }
    }

    /// Auth operations over a fresh, request-scoped store.
    #[must_use]
    pub fn operations(&self) -> AuthOperations {
        AuthOperations::new(Arc::clone(&self.backend), SessionStore::new())
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
