//! Contract required from the external authentication service.
//!
//! The backend is opaque: it issues sessions, verifies credentials and
//! pushes change events. Implementations report failures as
//! [`BackendError`]; mapping those to user-facing errors is not their job.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::BackendError;
use crate::session::{Credentials, Identity, Session, SessionEvent};

/// Result of a sign-up call. `session` is absent when the backend requires
/// email confirmation before issuing one.
#[derive(Clone, Debug, PartialEq)]
pub struct SignUpResponse {
    pub identity: Option<Identity>,
    pub session: Option<Session>,
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Resolve credentials to a live session. `Ok(None)` means "no session".
    async fn lookup_session(&self, credentials: &Credentials) -> Result<Option<Session>, BackendError>;

    async fn sign_up_with_password(&self, email: &str, password: &str) -> Result<SignUpResponse, BackendError>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError>;

    /// Revoke the session behind `access_token`, if any.
    async fn sign_out(&self, access_token: Option<&str>) -> Result<(), BackendError>;

    /// Subscribe to the session-change feed. Events are delivered in
    /// emission order; a slow receiver may observe `Lagged`.
    fn session_events(&self) -> broadcast::Receiver<SessionEvent>;
}
