use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::http::header::{COOKIE, LOCATION};
use axum::response::Response;
use tower::ServiceExt;

use authkit::testing::{Call, MockBackend, session_for};

use super::*;
use crate::state::test_helpers::test_app_state;

/// A throwaway site directory with a login page and a dashboard page.
fn site(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("server-site-{name}-{}", std::process::id()));
    for page in ["login", "dashboard"] {
        std::fs::create_dir_all(dir.join(page)).unwrap();
        std::fs::write(dir.join(page).join("index.html"), format!("<h1>{page}</h1>")).unwrap();
    }
    dir
}

async fn get_page(backend: &Arc<MockBackend>, site_dir: &Path, path: &str, cookie: Option<&str>) -> Response {
    let mut request = Request::builder().uri(path);
    if let Some(cookie) = cookie {
        request = request.header(COOKIE, cookie);
    }
    app(test_app_state(backend), site_dir)
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn healthz_is_ok_with_security_headers() {
    let backend = MockBackend::new();
    let response = get_page(&backend, &site("healthz"), "/healthz", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers.get("X-Content-Type-Options").unwrap(), "nosniff");
    assert_eq!(headers.get("X-Frame-Options").unwrap(), "DENY");
    assert_eq!(headers.get("X-XSS-Protection").unwrap(), "1; mode=block");
    assert_eq!(headers.get("Referrer-Policy").unwrap(), "strict-origin-when-cross-origin");
    assert!(headers.contains_key("Permissions-Policy"));
}

#[tokio::test]
async fn redirects_carry_security_headers() {
    let backend = MockBackend::new();
    let response = get_page(&backend, &site("redirect-headers"), "/dashboard/", None).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers().get("X-Frame-Options").unwrap(), "DENY");
}

#[tokio::test]
async fn root_sends_anonymous_users_to_login() {
    let backend = MockBackend::new();
    let response = get_page(&backend, &site("root-anon"), "/", None).await;
    assert_eq!(response.headers().get(LOCATION).unwrap(), "/login");
}

#[tokio::test]
async fn root_sends_signed_in_users_to_dashboard() {
    let backend = MockBackend::new();
    backend.insert_session(session_for("u1", "a@example.com"));
    let response = get_page(&backend, &site("root-user"), "/", Some("sb-access-token=access-u1")).await;
    assert_eq!(response.headers().get(LOCATION).unwrap(), "/dashboard");
}

#[tokio::test]
async fn pages_are_served_behind_the_filter() {
    let backend = MockBackend::new();
    backend.insert_session(session_for("u1", "a@example.com"));
    let dir = site("pages");

    let login = get_page(&backend, &dir, "/login/", None).await;
    assert_eq!(login.status(), StatusCode::OK);
    assert_eq!(text(login).await, "<h1>login</h1>");

    let dashboard = get_page(&backend, &dir, "/dashboard/", Some("sb-access-token=access-u1")).await;
    assert_eq!(dashboard.status(), StatusCode::OK);
    assert_eq!(text(dashboard).await, "<h1>dashboard</h1>");
}

#[tokio::test]
async fn api_is_not_gated_by_the_filter() {
    let backend = MockBackend::new();
    let response = get_page(&backend, &site("api"), "/api/auth/session", Some("sb-access-token=revoked")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(LOCATION).is_none());
    assert_eq!(backend.calls(Call::Lookup), 1);
}
