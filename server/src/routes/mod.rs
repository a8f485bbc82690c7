//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the auth API and health check, serves the dashboard pages as static
//! files from the site directory, and wraps everything in the edge redirect
//! filter. Security headers are added to every response a handler did not
//! already decorate.

pub mod auth;

use std::path::Path;

use axum::Router;
use axum::extract::State;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::response::Redirect;
use axum::routing::{get, post};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::edge;
use crate::state::AppState;

fn security_headers() -> [(HeaderName, HeaderValue); 5] {
    [
        (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
        (header::X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block")),
        (header::REFERRER_POLICY, HeaderValue::from_static("strict-origin-when-cross-origin")),
        (
            HeaderName::from_static("permissions-policy"),
            HeaderValue::from_static("camera=(), microphone=(), geolocation=()"),
        ),
    ]
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/sign-in", post(auth::sign_in))
        .route("/api/auth/sign-up", post(auth::sign_up))
        .route("/api/auth/sign-out", post(auth::sign_out))
        .route("/api/auth/session", get(auth::session))
        .route("/healthz", get(healthz))
}

/// Full application: API, pages from `site_dir`, edge filter and headers.
pub fn app(state: AppState, site_dir: &Path) -> Router {
    let pages = ServeDir::new(site_dir).append_index_html_on_directories(true);

    let router = api_routes()
        .route("/", get(root))
        .fallback_service(pages)
        .layer(from_fn_with_state(state.clone(), edge::redirect_filter));

    security_headers()
        .into_iter()
        .fold(router, |router, (name, value)| router.layer(SetResponseHeaderLayer::if_not_present(name, value)))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `/` only reaches here for signed-in users; the filter sends everyone else
/// to the public entry.
async fn root(State(state): State<AppState>) -> Redirect {
    Redirect::temporary(state.routes.private_entry())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
