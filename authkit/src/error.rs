//! Error taxonomy for auth operations and the backend contract.
//!
//! ERROR HANDLING
//! ==============
//! `BackendError` is what the external service reports. `AuthError` is what
//! callers see: a value carried in `Result`, never a panic. The translation
//! between the two lives in [`crate::ops::classify`] and nowhere else.

use serde::{Deserialize, Serialize};

// =============================================================================
// AUTH ERROR
// =============================================================================

/// Category of a failed auth operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthErrorKind {
    /// Input rejected before (or, late, by) the backend.
    Validation,
    /// Email/password pair not accepted.
    InvalidCredentials,
    /// Sign-up for an email that already has an account.
    UserExists,
    /// Account exists but the email was never confirmed.
    EmailNotConfirmed,
    /// Backend throttled the request.
    RateLimited,
    /// Backend unreachable or timed out.
    Network,
    /// Local failure or malformed backend response.
    System,
    /// Backend rejected the request for a reason we do not recognize.
    Unexpected,
}

impl AuthErrorKind {
    /// Stable kebab-case label, used in logs and API bodies.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::InvalidCredentials => "invalid-credentials",
            Self::UserExists => "user-exists",
            Self::EmailNotConfirmed => "email-not-confirmed",
            Self::RateLimited => "rate-limited",
            Self::Network => "network",
            Self::System => "system",
            Self::Unexpected => "unexpected",
        }
    }

    /// Whether retrying the same request later may succeed.
    #[must_use]
    pub fn retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::Network | Self::System)
    }
}

/// Next action the UI may offer alongside an error.
///
/// `AccountNotFound` is a UX hint only: the backend answers the same way for
/// a wrong password and for an unknown account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Suggestion {
    AccountNotFound,
    SignInInstead,
    Retry,
}

/// A failed auth operation, as shown to the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct AuthError {
    pub kind: AuthErrorKind,
    /// Human-readable message, safe to display.
    pub message: String,
    /// Diagnostic text from the backend or the runtime, not for display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<Suggestion>,
}

impl AuthError {
    #[must_use]
    pub fn new(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        let suggestion = kind.retryable().then_some(Suggestion::Retry);
        Self { kind, message: message.into(), detail: None, suggestion }
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Validation, message)
    }

    /// Local failure with diagnostic detail attached.
    #[must_use]
    pub fn system(detail: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::System, "Internal error. Try again in a few minutes.").with_detail(detail)
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: Suggestion) -> Self {
        self.suggestion = Some(suggestion);
        self
    }
}

// =============================================================================
// BACKEND ERROR
// =============================================================================

/// Failure reported by the external auth backend.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend answered and refused. `message` is its free text.
    #[error("backend rejected request: {message}")]
    Rejected { status: Option<u16>, message: String },
    /// The request never got an answer.
    #[error("backend unreachable: {0}")]
    Transport(String),
    #[error("backend request timed out")]
    Timeout,
    /// The backend answered with something we could not parse.
    #[error("unexpected backend response: {0}")]
    Protocol(String),
}

impl BackendError {
    #[must_use]
    pub fn rejected(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Rejected { status, message: message.into() }
    }

    /// HTTP status of a rejection, when the backend gave one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => *status,
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
