//! Identity, session and credential value types.
//!
//! A `Session` is issued by the backend and replaced wholesale on
//! re-authentication; nothing in this crate edits one in place.

use std::fmt::{self, Write};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

const FINGERPRINT_LEN: usize = 12;

// =============================================================================
// IDENTITY
// =============================================================================

/// The authenticated principal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Backend-assigned opaque identifier.
    pub id: String,
    pub email: String,
    /// Arbitrary backend-issued metadata (`user_metadata`).
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Identity {
    #[must_use]
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self { id: id.into(), email: email.into(), metadata: serde_json::Value::Null }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// An identity without an id or email cannot be trusted for routing.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.id.trim().is_empty() && !self.email.trim().is_empty()
    }

    /// Role stored under `metadata.role`, if any.
    #[must_use]
    pub fn role(&self) -> Option<&str> {
        self.metadata.get("role").and_then(serde_json::Value::as_str)
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.role() == Some(role)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.has_role("admin")
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Backend-issued proof of authentication.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub identity: Identity,
    #[serde(with = "time::serde::timestamp")]
    pub issued_at: OffsetDateTime,
    #[serde(with = "time::serde::timestamp")]
    pub expires_at: OffsetDateTime,
    pub access_token: String,
    /// Opaque handle the backend accepts to mint a new access token.
    pub refresh_token: Option<String>,
}

impl Session {
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }

    /// Time left before expiry; zero once expired.
    #[must_use]
    pub fn remaining(&self, now: OffsetDateTime) -> Duration {
        let left = self.expires_at - now;
        if left.is_negative() { Duration::ZERO } else { left }
    }

    /// Short, log-safe digest of the access token.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        token_fingerprint(&self.access_token)
    }

    /// Credentials a client would present to look this session up again.
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials {
            access_token: Some(self.access_token.clone()),
            refresh_token: self.refresh_token.clone(),
            expires_at: Some(self.expires_at.unix_timestamp()),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("token", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

/// Hex SHA-256 prefix of a token, for correlating log lines without leaking it.
#[must_use]
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let mut s = String::with_capacity(FINGERPRINT_LEN);
    for b in digest.iter().take(FINGERPRINT_LEN / 2) {
        let _ = write!(s, "{b:02x}");
    }
    s
}

// =============================================================================
// CREDENTIALS
// =============================================================================

/// What a request or client carries to `lookup_session`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Unix seconds at which `access_token` stops being valid, when known.
    pub expires_at: Option<i64>,
}

impl Credentials {
    /// No token of either kind: a lookup cannot succeed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.access_token.as_deref().is_none_or(str::is_empty)
            && self.refresh_token.as_deref().is_none_or(str::is_empty)
    }

    /// Whether the access token is known to be expired at `now`.
    #[must_use]
    pub fn access_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|at| at <= now.unix_timestamp())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &self.access_token.as_deref().map(token_fingerprint))
            .field("refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// =============================================================================
// SESSION EVENTS
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// One entry of the backend's session-change feed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub session: Option<Session>,
}

impl SessionEvent {
    #[must_use]
    pub fn signed_in(session: Session) -> Self {
        Self { kind: SessionEventKind::SignedIn, session: Some(session) }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self { kind: SessionEventKind::SignedOut, session: None }
    }

    #[must_use]
    pub fn token_refreshed(session: Session) -> Self {
        Self { kind: SessionEventKind::TokenRefreshed, session: Some(session) }
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
