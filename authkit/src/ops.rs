//! Auth operations: validated, backend-mediated session mutations.
//!
//! ERROR HANDLING
//! ==============
//! Every operation resolves to `Result<_, AuthError>`. Input problems are
//! caught before any network call. Backend failures go through [`classify`],
//! the only place where backend free text is matched to error kinds.
//!
//! Concurrent calls are not deduplicated; whichever finishes last decides
//! the store's session.

use std::sync::Arc;

use crate::backend::{AuthBackend, SignUpResponse};
use crate::error::{AuthError, AuthErrorKind, BackendError, Suggestion};
use crate::session::{Identity, Session};
use crate::storage::ClientStorage;
use crate::store::SessionStore;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Successful sign-up.
#[derive(Clone, Debug, PartialEq)]
pub struct SignUpOutcome {
    pub identity: Identity,
    /// The backend created the account but issued no session; the user must
    /// confirm their email first.
    pub needs_confirmation: bool,
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Trim and lower-case an address shaped like `local@domain.tld`.
#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_lowercase();
    if normalized.is_empty() || normalized.chars().any(char::is_whitespace) {
        return None;
    }
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty() || domain.contains('@') {
        return None;
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return None;
    }
    Some(normalized)
}

/// Check inputs before touching the backend. Returns the normalized email.
///
/// # Errors
///
/// Returns a `validation` error for a missing field, a malformed email, or a
/// password shorter than [`MIN_PASSWORD_LEN`].
pub fn validate_credentials(email: &str, password: &str) -> Result<String, AuthError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(AuthError::validation("Email and password are required."));
    }
    let Some(email) = normalize_email(email) else {
        return Err(AuthError::validation("Invalid email format."));
    };
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters."
        )));
    }
    Ok(email)
}

// =============================================================================
// BACKEND ERROR MAPPING
// =============================================================================

/// Map a backend failure to the user-facing taxonomy.
///
/// Matching on message text is a best-effort heuristic; keep it here.
#[must_use]
pub fn classify(error: &BackendError) -> AuthError {
    match error {
        BackendError::Transport(detail) => network_error().with_detail(detail.clone()),
        BackendError::Timeout => network_error().with_detail("request timed out"),
        BackendError::Protocol(detail) => AuthError::system(detail.clone()),
        BackendError::Rejected { status, message } => classify_rejection(*status, message),
    }
}

fn network_error() -> AuthError {
    AuthError::new(AuthErrorKind::Network, "Connection problem. Check your network and try again.")
}

fn classify_rejection(status: Option<u16>, message: &str) -> AuthError {
    let lower = message.to_lowercase();
    let has = |needle: &str| lower.contains(needle);

    if has("invalid login credentials") {
        AuthError::new(AuthErrorKind::InvalidCredentials, "Incorrect email or password.")
            .with_suggestion(Suggestion::AccountNotFound)
    } else if has("already registered") || has("already exists") {
        AuthError::new(
            AuthErrorKind::UserExists,
            "This email is already registered. Sign in or use another email.",
        )
        .with_suggestion(Suggestion::SignInInstead)
    } else if has("email not confirmed") {
        AuthError::new(AuthErrorKind::EmailNotConfirmed, "Account not confirmed. Check your inbox or contact support.")
    } else if status == Some(429) || has("too many requests") || has("rate limit") {
        AuthError::new(AuthErrorKind::RateLimited, "Too many attempts. Wait a few minutes and try again.")
    } else if has("invalid email") || has("unable to validate email") {
        AuthError::validation("Invalid email. Check the address and try again.")
    } else if has("password") {
        AuthError::validation(format!(
            "Password too weak. Use at least {MIN_PASSWORD_LEN} characters with letters and numbers."
        ))
        .with_detail(message.to_owned())
    } else if has("network") {
        network_error().with_detail(message.to_owned())
    } else {
        AuthError::new(
            AuthErrorKind::Unexpected,
            "The request could not be completed. Try again or contact support.",
        )
        .with_detail(message.to_owned())
    }
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Sign-up, sign-in and sign-out against one store and one backend.
#[derive(Clone)]
pub struct AuthOperations {
    backend: Arc<dyn AuthBackend>,
    store: SessionStore,
    storage: Option<Arc<dyn ClientStorage>>,
}

impl AuthOperations {
    #[must_use]
    pub fn new(backend: Arc<dyn AuthBackend>, store: SessionStore) -> Self {
        Self { backend, store, storage: None }
    }

    /// Client storage to wipe on sign-out.
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn ClientStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Create an account. With a session in the response the user is signed
    /// in before this returns; without one, `needs_confirmation` is set.
    ///
    /// # Errors
    ///
    /// Returns `validation` without a backend call for bad input, otherwise
    /// the classified backend failure.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError> {
        let email = self.validated(email, password)?;
        let _op = self.store.begin_operation();
        tracing::debug!(%email, "creating account");

        match self.backend.sign_up_with_password(&email, password).await {
            Err(e) => Err(self.reject("sign-up", &e)),
            Ok(SignUpResponse { session: Some(session), .. }) if !session.identity.is_well_formed() => {
                Err(self.malformed("sign-up", &session))
            }
            Ok(SignUpResponse { session: Some(session), .. }) => {
                let identity = session.identity.clone();
                self.store.replace_session(session);
                tracing::info!(user_id = %identity.id, "account created and signed in");
                Ok(SignUpOutcome { identity, needs_confirmation: false })
            }
            Ok(SignUpResponse { identity: Some(identity), session: None }) => {
                self.store.clear_error();
                tracing::info!(user_id = %identity.id, "account created; awaiting email confirmation");
                Ok(SignUpOutcome { identity, needs_confirmation: true })
            }
            Ok(SignUpResponse { identity: None, session: None }) => {
                let error = AuthError::new(AuthErrorKind::Unexpected, "Unexpected error creating the account. Try again.")
                    .with_detail("sign-up response carried neither user nor session");
                self.store.record_error(error.clone());
                Err(error)
            }
        }
    }

    /// Verify credentials and replace the store's session.
    ///
    /// # Errors
    ///
    /// Returns `validation` without a backend call for bad input, otherwise
    /// the classified backend failure. Rejected credentials carry the
    /// `account_not_found` hint.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let email = self.validated(email, password)?;
        let _op = self.store.begin_operation();
        tracing::debug!(%email, "signing in");

        match self.backend.sign_in_with_password(&email, password).await {
            Err(e) => Err(self.reject("sign-in", &e)),
            Ok(session) if !session.identity.is_well_formed() => Err(self.malformed("sign-in", &session)),
            Ok(session) => {
                let identity = session.identity.clone();
                self.store.replace_session(session);
                tracing::info!(user_id = %identity.id, "signed in");
                Ok(identity)
            }
        }
    }

    /// Clear the local session first, then client storage, then tell the
    /// backend. A backend failure is logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns `system` only if clearing client storage fails. The backend
    /// is still told about the sign-out in that case.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let _op = self.store.begin_operation();
        let previous = self.store.clear_session();
        self.store.clear_error();

        let storage_result = self.storage.as_ref().map_or(Ok(()), |storage| storage.clear());

        let token = previous.as_ref().map(|s| s.access_token.as_str());
        match self.backend.sign_out(token).await {
            Ok(()) => tracing::info!(had_session = previous.is_some(), "signed out"),
            Err(e) => tracing::warn!(error = %e, "backend sign-out failed; local session already cleared"),
        }

        storage_result.map_err(|e| {
            let error = AuthError::system(e.to_string());
            self.store.record_error(error.clone());
            error
        })
    }

    fn validated(&self, email: &str, password: &str) -> Result<String, AuthError> {
        validate_credentials(email, password).inspect_err(|e| self.store.record_error(e.clone()))
    }

    /// A backend session the route guards would disagree about is refused.
    fn malformed(&self, op: &'static str, session: &Session) -> AuthError {
        tracing::warn!(target: "security", op, token = %session.fingerprint(), "backend session with malformed identity refused");
        let error = AuthError::new(AuthErrorKind::Unexpected, "The request could not be completed. Try again or contact support.")
            .with_detail("backend session carried a malformed identity");
        self.store.record_error(error.clone());
        error
    }

    fn reject(&self, op: &'static str, error: &BackendError) -> AuthError {
        let auth_error = classify(error);
        tracing::warn!(op, kind = auth_error.kind.as_str(), error = %error, "auth operation failed");
        self.store.record_error(auth_error.clone());
        auth_error
    }
}

#[cfg(test)]
#[path = "ops_test.rs"]
mod tests;
