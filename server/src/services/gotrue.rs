//! HTTP adapter for a GoTrue-compatible auth service.
//!
//! Thin wrapper over `/auth/v1`. Response parsing is pure (`parse_*`) for
//! testability. Tokens never appear in logs or error strings; request URLs
//! carry only the grant type.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::broadcast;

use authkit::{AuthBackend, BackendError, Credentials, Identity, Session, SessionEvent, SignUpResponse};

use crate::config::BackendConfig;

const API_PREFIX: &str = "/auth/v1";
const CONNECT_TIMEOUT_SECS: u64 = 5;
/// GoTrue's default access-token lifetime, used when a response omits it.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;
const EVENT_CAPACITY: usize = 64;

// =============================================================================
// CLIENT
// =============================================================================

pub struct HttpAuthBackend {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    events: broadcast::Sender<SessionEvent>,
}

impl HttpAuthBackend {
    /// # Errors
    ///
    /// Returns `Transport` if the HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(config.timeout))
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            http,
            base_url: format!("{}{API_PREFIX}", config.url.trim_end_matches('/')),
            anon_key: config.anon_key.clone(),
            events,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is normal on the server.
        let _ = self.events.send(event);
    }

    /// Send with the API key and return the body of a 2xx response.
    async fn send(&self, request: RequestBuilder) -> Result<String, BackendError> {
        let response = request.header("apikey", &self.anon_key).send().await.map_err(transport)?;
        let status = response.status();
        let text = response.text().await.map_err(transport)?;
        if !status.is_success() {
            return Err(BackendError::rejected(Some(status.as_u16()), error_message(status, &text)));
        }
        Ok(text)
    }

    async fn get_user(&self, access_token: &str) -> Result<Identity, BackendError> {
        let body = self.send(self.http.get(self.url("/user")).bearer_auth(access_token)).await?;
        parse_user(&body)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let request = self
            .http
            .post(self.url("/token?grant_type=refresh_token"))
            .json(&RefreshRequest { refresh_token });
        let session = parse_session(&self.send(request).await?, OffsetDateTime::now_utc())?;
        tracing::debug!(user_id = %session.identity.id, token = %session.fingerprint(), "access token refreshed");
        self.emit(SessionEvent::token_refreshed(session.clone()));
        Ok(session)
    }
}

fn transport(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Transport(e.without_url().to_string())
    }
}

/// 4xx means "these credentials are no good"; anything else is a real failure.
fn no_session_on_client_error(e: BackendError) -> Result<Option<Session>, BackendError> {
    match e.status() {
        Some(status) if (400..500).contains(&status) => Ok(None),
        _ => Err(e),
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn lookup_session(&self, credentials: &Credentials) -> Result<Option<Session>, BackendError> {
        let now = OffsetDateTime::now_utc();

        if let Some(access) = credentials.access_token.as_deref().filter(|t| !t.is_empty()) {
            if !credentials.access_expired(now) {
                match self.get_user(access).await {
                    Ok(identity) => {
                        let expires_at = credentials
                            .expires_at
                            .and_then(|at| OffsetDateTime::from_unix_timestamp(at).ok())
                            .unwrap_or_else(|| default_expiry(now));
                        return Ok(Some(Session {
                            identity,
                            issued_at: now,
                            expires_at,
                            access_token: access.to_owned(),
                            refresh_token: credentials.refresh_token.clone(),
                        }));
                    }
                    Err(e) if matches!(e.status(), Some(401 | 403)) => {
                        tracing::debug!("access token rejected; trying refresh");
                    }
                    Err(e) => return no_session_on_client_error(e),
                }
            }
        }

        match credentials.refresh_token.as_deref().filter(|t| !t.is_empty()) {
            Some(refresh) => self.refresh(refresh).await.map(Some).or_else(no_session_on_client_error),
            None => Ok(None),
        }
    }

    async fn sign_up_with_password(&self, email: &str, password: &str) -> Result<SignUpResponse, BackendError> {
        let request = self.http.post(self.url("/signup")).json(&PasswordRequest { email, password });
        let response = parse_sign_up(&self.send(request).await?, OffsetDateTime::now_utc())?;
        if let Some(session) = &response.session {
            self.emit(SessionEvent::signed_in(session.clone()));
        }
        Ok(response)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let request = self
            .http
            .post(self.url("/token?grant_type=password"))
            .json(&PasswordRequest { email, password });
        let session = parse_session(&self.send(request).await?, OffsetDateTime::now_utc())?;
        self.emit(SessionEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self, access_token: Option<&str>) -> Result<(), BackendError> {
        if let Some(token) = access_token {
            let request = self.http.post(self.url("/logout")).bearer_auth(token);
            match self.send(request).await {
                Ok(_) => {}
                // Already invalid on the backend side.
                Err(e) if matches!(e.status(), Some(401 | 403 | 404)) => {}
                Err(e) => return Err(e),
            }
        }
        self.emit(SessionEvent::signed_out());
        Ok(())
    }

    fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct WireUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: serde_json::Value,
    /// Present on sign-up responses; empty for an already-registered email
    /// when confirmation is on.
    #[serde(default)]
    identities: Option<Vec<serde_json::Value>>,
}

#[derive(Deserialize)]
struct WireSession {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: WireUser,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireSignUp {
    Session(WireSession),
    User(WireUser),
}

#[derive(Deserialize)]
struct WireError {
    msg: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

// =============================================================================
// PARSING
// =============================================================================

fn default_expiry(now: OffsetDateTime) -> OffsetDateTime {
    now.saturating_add(time::Duration::seconds(DEFAULT_EXPIRES_IN_SECS))
}

fn identity(user: WireUser) -> Identity {
    Identity::new(user.id, user.email.unwrap_or_default()).with_metadata(user.user_metadata)
}

fn session(wire: WireSession, now: OffsetDateTime) -> Result<Session, BackendError> {
    if wire.access_token.is_empty() {
        return Err(BackendError::Protocol("empty access_token".into()));
    }
    let expires_at = match (wire.expires_at, wire.expires_in) {
        (Some(at), _) => OffsetDateTime::from_unix_timestamp(at)
            .map_err(|e| BackendError::Protocol(format!("expires_at out of range: {e}")))?,
        (None, Some(secs)) => now
            .checked_add(time::Duration::seconds(secs))
            .ok_or_else(|| BackendError::Protocol(format!("expires_in out of range: {secs}")))?,
        (None, None) => default_expiry(now),
    };
    Ok(Session {
        identity: identity(wire.user),
        issued_at: now,
        expires_at,
        access_token: wire.access_token,
        refresh_token: wire.refresh_token.filter(|t| !t.is_empty()),
    })
}

pub(crate) fn parse_session(body: &str, now: OffsetDateTime) -> Result<Session, BackendError> {
    let wire: WireSession = serde_json::from_str(body).map_err(|e| BackendError::Protocol(e.to_string()))?;
    session(wire, now)
}

pub(crate) fn parse_user(body: &str) -> Result<Identity, BackendError> {
    let wire: WireUser = serde_json::from_str(body).map_err(|e| BackendError::Protocol(e.to_string()))?;
    Ok(identity(wire))
}

pub(crate) fn parse_sign_up(body: &str, now: OffsetDateTime) -> Result<SignUpResponse, BackendError> {
    let wire: WireSignUp = serde_json::from_str(body).map_err(|e| BackendError::Protocol(e.to_string()))?;
    match wire {
        WireSignUp::Session(wire) => {
            let session = session(wire, now)?;
            Ok(SignUpResponse { identity: Some(session.identity.clone()), session: Some(session) })
        }
        WireSignUp::User(user) if user.identities.as_ref().is_some_and(Vec::is_empty) => {
            Err(BackendError::rejected(Some(422), "User already registered"))
        }
        WireSignUp::User(user) => Ok(SignUpResponse { identity: Some(identity(user)), session: None }),
    }
}

/// Human text from an error body, falling back to the status reason.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<WireError>(body)
        .ok()
        .and_then(|e| e.msg.or(e.error_description).or(e.message).or(e.error))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() || trimmed.starts_with('{') {
                status.canonical_reason().unwrap_or("request failed").to_owned()
            } else {
                trimmed.to_owned()
            }
        })
}

#[cfg(test)]
#[path = "gotrue_test.rs"]
mod tests;
