use axum::Router;
use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{Method, Request};
use axum::routing::{get, post};
use tower::ServiceExt;

use authkit::BackendError;
use authkit::testing::{Call, MockBackend, session_for};

use super::*;
use crate::state::test_helpers::test_app_state;

fn router(backend: &std::sync::Arc<MockBackend>) -> Router {
    Router::new()
        .route("/api/auth/sign-in", post(sign_in))
        .route("/api/auth/sign-up", post(sign_up))
        .route("/api/auth/sign-out", post(sign_out))
        .route("/api/auth/session", get(session))
        .with_state(test_app_state(backend))
}

async fn send(app: Router, method: Method, uri: &str, cookie: Option<&str>, body: Option<serde_json::Value>) -> Response {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(COOKIE, cookie);
    }
    let body = match body {
        Some(json) => {
            request = request.header(CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.oneshot(request.body(body).unwrap()).await.unwrap()
}

async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    send(app, Method::POST, uri, None, Some(body)).await
}

async fn json_body(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn cookie_value(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|c| c.strip_prefix(&format!("{name}=")))
        .map(|rest| rest.split(';').next().unwrap_or_default().to_owned())
}

// =============================================================================
// status mapping
// =============================================================================

#[test]
fn every_error_kind_has_a_status() {
    let cases = [
        (AuthErrorKind::Validation, 400),
        (AuthErrorKind::InvalidCredentials, 401),
        (AuthErrorKind::EmailNotConfirmed, 403),
        (AuthErrorKind::UserExists, 409),
        (AuthErrorKind::RateLimited, 429),
        (AuthErrorKind::System, 500),
        (AuthErrorKind::Unexpected, 502),
        (AuthErrorKind::Network, 503),
    ];
    for (kind, status) in cases {
        assert_eq!(status_for(kind).as_u16(), status, "{kind:?}");
    }
}

#[tokio::test]
async fn api_error_body_omits_detail() {
    let error = AuthError::system("pool exhausted");
    let response = ApiError(error).into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"]["kind"], "system");
    assert_eq!(body["error"]["suggestion"], "retry");
    assert!(body["error"].get("detail").is_none());
}

// =============================================================================
// sign-in
// =============================================================================

#[tokio::test]
async fn sign_in_sets_cookies_and_returns_user() {
    let backend = MockBackend::new();
    backend.add_account("admin@example.com", "secret123");
    let body = serde_json::json!({ "email": " Admin@Example.com ", "password": "secret123" });
    let response = post_json(router(&backend), "/api/auth/sign-in", body).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(cookie_value(&response, cookies::ACCESS_COOKIE).unwrap().starts_with("token-"));
    assert!(cookie_value(&response, cookies::REFRESH_COOKIE).unwrap().starts_with("refresh-"));
    assert!(cookie_value(&response, cookies::EXPIRES_COOKIE).is_some());
    assert_eq!(json_body(response).await["user"]["email"], "admin@example.com");
}

#[tokio::test]
async fn sign_in_wrong_password_is_401_with_hint() {
    let backend = MockBackend::new();
    backend.add_account("admin@example.com", "secret123");
    let body = serde_json::json!({ "email": "admin@example.com", "password": "wrong-one" });
    let response = post_json(router(&backend), "/api/auth/sign-in", body).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(cookie_value(&response, cookies::ACCESS_COOKIE).is_none());
    let body = json_body(response).await;
    assert_eq!(body["error"]["kind"], "invalid-credentials");
    assert_eq!(body["error"]["suggestion"], "account_not_found");
}

#[tokio::test]
async fn sign_in_validation_never_reaches_backend() {
    let backend = MockBackend::new();
    let body = serde_json::json!({ "email": "not-an-email", "password": "secret123" });
    let response = post_json(router(&backend), "/api/auth/sign-in", body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["message"], "Invalid email format.");

    let response = post_json(router(&backend), "/api/auth/sign-in", serde_json::json!({})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(backend.total_calls(), 0);
}

#[tokio::test]
async fn sign_in_unconfirmed_email_is_403() {
    let backend = MockBackend::new();
    backend.add_unconfirmed_account("new@example.com", "secret123");
    let body = serde_json::json!({ "email": "new@example.com", "password": "secret123" });
    let response = post_json(router(&backend), "/api/auth/sign-in", body).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"]["kind"], "email-not-confirmed");
}

#[tokio::test]
async fn sign_in_backend_down_is_503() {
    let backend = MockBackend::new();
    backend.fail_next(Call::SignIn, BackendError::Transport("connection refused".into()));
    let body = serde_json::json!({ "email": "admin@example.com", "password": "secret123" });
    let response = post_json(router(&backend), "/api/auth/sign-in", body).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["error"]["kind"], "network");
}

// =============================================================================
// sign-up
// =============================================================================

#[tokio::test]
async fn sign_up_with_session_signs_in() {
    let backend = MockBackend::new();
    let body = serde_json::json!({ "email": "new@example.com", "password": "secret123" });
    let response = post_json(router(&backend), "/api/auth/sign-up", body).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(cookie_value(&response, cookies::ACCESS_COOKIE).is_some());
    let body = json_body(response).await;
    assert_eq!(body["needs_confirmation"], false);
    assert_eq!(body["user"]["email"], "new@example.com");
}

#[tokio::test]
async fn sign_up_awaiting_confirmation_sets_no_cookies() {
    let backend = MockBackend::new();
    backend.require_confirmation(true);
    let body = serde_json::json!({ "email": "new@example.com", "password": "secret123" });
    let response = post_json(router(&backend), "/api/auth/sign-up", body).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(cookie_value(&response, cookies::ACCESS_COOKIE).is_none());
    assert_eq!(json_body(response).await["needs_confirmation"], true);
}

#[tokio::test]
async fn sign_up_existing_account_is_409() {
    let backend = MockBackend::new();
    backend.add_account("admin@example.com", "secret123");
    let body = serde_json::json!({ "email": "admin@example.com", "password": "other-secret" });
    let response = post_json(router(&backend), "/api/auth/sign-up", body).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["error"]["kind"], "user-exists");
    assert_eq!(body["error"]["suggestion"], "sign_in_instead");
}

#[tokio::test]
async fn sign_up_short_password_is_400() {
    let backend = MockBackend::new();
    let body = serde_json::json!({ "email": "new@example.com", "password": "12345" });
    let response = post_json(router(&backend), "/api/auth/sign-up", body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(backend.calls(Call::SignUp), 0);
}

// =============================================================================
// sign-out
// =============================================================================

#[tokio::test]
async fn sign_out_revokes_and_clears() {
    let backend = MockBackend::new();
    backend.insert_session(session_for("u1", "a@example.com"));
    let cookie = "sb-access-token=access-u1; sb-refresh-token=refresh-u1";
    let response = send(router(&backend), Method::POST, "/api/auth/sign-out", Some(cookie), None).await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(cookie_value(&response, cookies::ACCESS_COOKIE).as_deref(), Some(""));
    assert_eq!(cookie_value(&response, cookies::REFRESH_COOKIE).as_deref(), Some(""));
    assert_eq!(backend.calls(Call::SignOut), 1);

    let again = send(router(&backend), Method::GET, "/api/auth/session", Some("sb-access-token=access-u1"), None).await;
    assert_eq!(again.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sign_out_without_cookies_still_succeeds() {
    let backend = MockBackend::new();
    let response = send(router(&backend), Method::POST, "/api/auth/sign-out", None, None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(cookie_value(&response, cookies::ACCESS_COOKIE).as_deref(), Some(""));
    assert_eq!(backend.calls(Call::Lookup), 0);
}

#[tokio::test]
async fn sign_out_survives_backend_failures() {
    let backend = MockBackend::new();
    backend.fail_next(Call::Lookup, BackendError::Timeout);
    let response = send(router(&backend), Method::POST, "/api/auth/sign-out", Some("sb-access-token=x"), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(cookie_value(&response, cookies::ACCESS_COOKIE).as_deref(), Some(""));
}

// =============================================================================
// session
// =============================================================================

#[tokio::test]
async fn session_returns_identity_and_expiry() {
    let backend = MockBackend::new();
    let stored = session_for("u1", "a@example.com");
    let expires_at = stored.expires_at.unix_timestamp();
    backend.insert_session(stored);
    let response = send(router(&backend), Method::GET, "/api/auth/session", Some("sb-access-token=access-u1"), None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(cookie_value(&response, cookies::ACCESS_COOKIE).is_none());
    let body = json_body(response).await;
    assert_eq!(body["user"]["id"], "u1");
    assert_eq!(body["expires_at"], expires_at);
}

#[tokio::test]
async fn session_without_cookies_is_401() {
    let backend = MockBackend::new();
    let response = send(router(&backend), Method::GET, "/api/auth/session", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(backend.calls(Call::Lookup), 0);
}

#[tokio::test]
async fn stale_session_is_401_and_cleared() {
    let backend = MockBackend::new();
    let response = send(router(&backend), Method::GET, "/api/auth/session", Some("sb-access-token=revoked"), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(cookie_value(&response, cookies::ACCESS_COOKIE).as_deref(), Some(""));
}

#[tokio::test]
async fn session_refresh_rewrites_cookies() {
    let backend = MockBackend::new();
    backend.insert_session(session_for("u1", "a@example.com"));
    let cookie = "sb-access-token=expired; sb-refresh-token=refresh-u1";
    let response = send(router(&backend), Method::GET, "/api/auth/session", Some(cookie), None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(cookie_value(&response, cookies::ACCESS_COOKIE).unwrap().starts_with("token-"));
}

#[tokio::test]
async fn session_lookup_failure_maps_to_503() {
    let backend = MockBackend::new();
    backend.fail_next(Call::Lookup, BackendError::Timeout);
    let response = send(router(&backend), Method::GET, "/api/auth/session", Some("sb-access-token=x"), None).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
