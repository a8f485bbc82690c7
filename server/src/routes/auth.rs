//! Auth API: JSON endpoints over `AuthOperations`.
//!
//! DESIGN
//! ======
//! Every request gets its own store through `AppState::operations`, so no
//! session outlives the request that carried it. Credentials travel in the
//! cookies from `crate::cookies`; bodies never contain tokens.

use axum::extract::{FromRef, FromRequestParts, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Json, Response};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use time::OffsetDateTime;

use authkit::{AuthError, AuthErrorKind, Credentials, Session, SessionEvent, ops};

use crate::cookies;
use crate::state::AppState;

// =============================================================================
// ERRORS
// =============================================================================

/// HTTP status for each error category.
pub(crate) fn status_for(kind: AuthErrorKind) -> StatusCode {
    match kind {
        AuthErrorKind::Validation => StatusCode::BAD_REQUEST,
        AuthErrorKind::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AuthErrorKind::EmailNotConfirmed => StatusCode::FORBIDDEN,
        AuthErrorKind::UserExists => StatusCode::CONFLICT,
        AuthErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        AuthErrorKind::System => StatusCode::INTERNAL_SERVER_ERROR,
        AuthErrorKind::Unexpected => StatusCode::BAD_GATEWAY,
        AuthErrorKind::Network => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// `AuthError` as an HTTP response. Diagnostic detail stays in the logs.
#[derive(Debug)]
pub struct ApiError(pub AuthError);

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let Self(mut error) = self;
        if let Some(detail) = error.detail.take() {
            tracing::debug!(kind = error.kind.as_str(), %detail, "auth api error");
        }
        (status_for(error.kind), Json(serde_json::json!({ "error": error }))).into_response()
    }
}

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Session resolved from the request's credential cookies.
/// Use as a handler parameter to require authentication.
pub struct AuthUser {
    pub session: Session,
    /// The backend issued new tokens during the lookup.
    pub rotated: bool,
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);
        let credentials = cookies::credentials(&jar);
        if credentials.is_empty() {
            return Err(StatusCode::UNAUTHORIZED.into_response());
        }

        match current_session(&app_state, &credentials).await {
            Ok(Some(session)) => {
                let rotated = credentials.access_token.as_deref() != Some(session.access_token.as_str());
                Ok(Self { session, rotated })
            }
            Ok(None) => {
                let jar = cookies::clear(jar, app_state.cookie_secure);
                Err((StatusCode::UNAUTHORIZED, jar).into_response())
            }
            Err(e) => Err(ApiError(e).into_response()),
        }
    }
}

/// A usable session for `credentials`. Malformed and expired sessions count
/// as none.
async fn current_session(state: &AppState, credentials: &Credentials) -> Result<Option<Session>, AuthError> {
    let session = state
        .backend
        .lookup_session(credentials)
        .await
        .map_err(|e| ops::classify(&e))?;
    Ok(session.filter(|s| s.identity.is_well_formed() && !s.is_expired(OffsetDateTime::now_utc())))
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Deserialize)]
pub struct PasswordBody {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

/// `POST /api/auth/sign-in`: verify credentials and set auth cookies.
pub async fn sign_in(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<PasswordBody>,
) -> Result<(CookieJar, Json<serde_json::Value>), ApiError> {
    let ops = state.operations();
    let identity = ops.sign_in(&body.email, &body.password).await?;
    let jar = match ops.store().session() {
        Some(session) => cookies::set_session(jar, &session, state.cookie_secure),
        None => jar,
    };
    Ok((jar, Json(serde_json::json!({ "user": identity }))))
}

/// `POST /api/auth/sign-up`: create an account; sets cookies only when the
/// backend issued a session.
pub async fn sign_up(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<PasswordBody>,
) -> Result<(CookieJar, Json<serde_json::Value>), ApiError> {
    let ops = state.operations();
    let outcome = ops.sign_up(&body.email, &body.password).await?;
    let jar = match ops.store().session() {
        Some(session) => cookies::set_session(jar, &session, state.cookie_secure),
        None => jar,
    };
    Ok((
        jar,
        Json(serde_json::json!({
            "user": outcome.identity,
            "needs_confirmation": outcome.needs_confirmation,
        })),
    ))
}

/// `POST /api/auth/sign-out`: always succeeds and clears the cookies.
/// The backend is told about the session only if it can still be resolved.
pub async fn sign_out(State(state): State<AppState>, jar: CookieJar) -> (StatusCode, CookieJar) {
    let ops = state.operations();
    let credentials = cookies::credentials(&jar);
    if !credentials.is_empty() {
        match current_session(&state, &credentials).await {
            Ok(Some(session)) => {
                ops.store().apply_event(SessionEvent::signed_in(session));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(kind = e.kind.as_str(), "session lookup before sign-out failed"),
        }
    }
    if let Err(e) = ops.sign_out().await {
        tracing::warn!(kind = e.kind.as_str(), "sign-out reported an error; cookies cleared anyway");
    }
    (StatusCode::NO_CONTENT, cookies::clear(jar, state.cookie_secure))
}

/// `GET /api/auth/session`: the caller's identity and token expiry.
pub async fn session(State(state): State<AppState>, jar: CookieJar, user: AuthUser) -> (CookieJar, Json<serde_json::Value>) {
    let jar = if user.rotated { cookies::set_session(jar, &user.session, state.cookie_secure) } else { jar };
    (
        jar,
        Json(serde_json::json!({
            "user": user.session.identity,
            "expires_at": user.session.expires_at.unix_timestamp(),
        })),
    )
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
