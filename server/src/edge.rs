//! Edge redirect filter: the server-side gate in front of every page.
//!
//! SYSTEM CONTEXT
//! ==============
//! Runs as `axum::middleware::from_fn_with_state` around the whole router,
//! before any page is served. It knows nothing about client state; it looks
//! the request's credential cookies up against the backend and applies the
//! shared `RouteTable` decision table.
//!
//! ERROR HANDLING
//! ==============
//! A lookup that fails or exceeds `EdgeConfig::lookup_timeout` follows the
//! configured `FailPolicy`. Either way a `security` event is logged. The
//! default is fail-open so a backend outage does not lock every user out.

use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use time::OffsetDateTime;

use authkit::{Access, Credentials, RouteTable, Session};

use crate::config::FailPolicy;
use crate::cookies;
use crate::state::AppState;

/// Result of the server-side session lookup for one request.
#[derive(Debug)]
enum Lookup {
    /// No credential cookies at all.
    Anonymous,
    /// Credentials present but the backend does not honor them.
    Stale,
    Session(Session),
    /// Backend error or timeout.
    Failed(String),
}

/// Paths the filter never gates.
#[must_use]
pub fn bypasses(routes: &RouteTable, path: &str) -> bool {
    path == "/healthz" || path == "/api" || path.starts_with("/api/") || routes.is_static_asset(path)
}

pub async fn redirect_filter(State(state): State<AppState>, jar: CookieJar, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_owned();
    if bypasses(&state.routes, &path) {
        return next.run(request).await;
    }

    let started = Instant::now();
    let client_ip = client_ip(request.headers());
    let credentials = cookies::credentials(&jar);
    let lookup = lookup(&state, &credentials).await;
    let stale = matches!(lookup, Lookup::Stale);
    let secure = state.cookie_secure;

    let (response, outcome) = match lookup {
        Lookup::Failed(reason) => match state.edge.fail_policy {
            FailPolicy::Open => {
                tracing::warn!(target: "security", %path, %client_ip, %reason, "edge session lookup failed; allowing request (fail-open)");
                (next.run(request).await, "fail-open")
            }
            FailPolicy::Closed => {
                tracing::warn!(target: "security", %path, %client_ip, %reason, "edge session lookup failed; treating as anonymous (fail-closed)");
                let jar = cookies::clear(jar, secure);
                match state.routes.access(&path, false) {
                    Access::Allow => ((jar, next.run(request).await).into_response(), "fail-closed"),
                    Access::Redirect(to) => ((jar, Redirect::temporary(&to)).into_response(), "fail-closed"),
                }
            }
        },
        Lookup::Session(session) => {
            let rotated = credentials.access_token.as_deref() != Some(session.access_token.as_str());
            let jar = if rotated { cookies::set_session(jar, &session, secure) } else { jar };
            match state.routes.access(&path, true) {
                Access::Allow => ((jar, next.run(request).await).into_response(), "allow"),
                Access::Redirect(to) => {
                    tracing::debug!(%path, user_id = %session.identity.id, to = %to, "signed-in user sent to private entry");
                    ((jar, Redirect::temporary(&to)).into_response(), "redirect")
                }
            }
        }
        Lookup::Anonymous | Lookup::Stale => {
            let jar = if stale { cookies::clear(jar, secure) } else { jar };
            match state.routes.access(&path, false) {
                Access::Allow => ((jar, next.run(request).await).into_response(), "allow"),
                Access::Redirect(to) => {
                    tracing::info!(target: "security", %path, %client_ip, stale, "unauthenticated request to private route");
                    ((jar, Redirect::temporary(&to)).into_response(), "redirect")
                }
            }
        }
    };

    tracing::info!(
        target: "audit",
        %path,
        %client_ip,
        outcome,
        status = response.status().as_u16(),
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "edge decision"
    );
    response
}

async fn lookup(state: &AppState, credentials: &Credentials) -> Lookup {
    if credentials.is_empty() {
        return Lookup::Anonymous;
    }
    let lookup = tokio::time::timeout(state.edge.lookup_timeout, state.backend.lookup_session(credentials)).await;
    match lookup {
        Err(_) => Lookup::Failed(format!("timed out after {}ms", state.edge.lookup_timeout.as_millis())),
        Ok(Err(e)) => Lookup::Failed(e.to_string()),
        Ok(Ok(None)) => Lookup::Stale,
        Ok(Ok(Some(session))) if !session.identity.is_well_formed() => {
            tracing::warn!(target: "security", token = %session.fingerprint(), "backend session with malformed identity rejected");
            Lookup::Stale
        }
        Ok(Ok(Some(session))) if session.is_expired(OffsetDateTime::now_utc()) => Lookup::Stale,
        Ok(Ok(Some(session))) => Lookup::Session(session),
    }
}

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("unknown")
        .to_owned()
}

#[cfg(test)]
#[path = "edge_test.rs"]
mod tests;
