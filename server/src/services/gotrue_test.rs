use super::*;

fn now() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
}

fn user_json() -> serde_json::Value {
    serde_json::json!({
        "id": "8d0fd2b3-9ca7-4a5f-9b8a-2f6c3f2a1b00",
        "email": "user@example.com",
        "user_metadata": { "role": "admin" },
        "identities": [{ "provider": "email" }]
    })
}

fn session_json() -> serde_json::Value {
    serde_json::json!({
        "access_token": "jwt-abc",
        "token_type": "bearer",
        "expires_in": 3600,
        "expires_at": 1_700_003_600,
        "refresh_token": "r-123",
        "user": user_json()
    })
}

// =============================================================================
// sessions
// =============================================================================

#[test]
fn parse_password_grant_response() {
    let session = parse_session(&session_json().to_string(), now()).unwrap();
    assert_eq!(session.access_token, "jwt-abc");
    assert_eq!(session.refresh_token.as_deref(), Some("r-123"));
    assert_eq!(session.expires_at.unix_timestamp(), 1_700_003_600);
    assert_eq!(session.issued_at, now());
    assert_eq!(session.identity.email, "user@example.com");
    assert!(session.identity.is_admin());
}

#[test]
fn expires_in_used_when_expires_at_missing() {
    let mut json = session_json();
    json.as_object_mut().unwrap().remove("expires_at");
    json["expires_in"] = serde_json::json!(60);
    let session = parse_session(&json.to_string(), now()).unwrap();
    assert_eq!(session.expires_at, now() + time::Duration::seconds(60));
}

#[test]
fn out_of_range_expiry_is_protocol_error() {
    let mut json = session_json();
    json.as_object_mut().unwrap().remove("expires_at");
    json["expires_in"] = serde_json::json!(i64::MAX / 2);
    let err = parse_session(&json.to_string(), now()).unwrap_err();
    assert!(matches!(err, BackendError::Protocol(_)));

    json["expires_at"] = serde_json::json!(i64::MAX);
    assert!(matches!(parse_session(&json.to_string(), now()).unwrap_err(), BackendError::Protocol(_)));
}

#[test]
fn default_expiry_saturates_instead_of_panicking() {
    assert_eq!(default_expiry(now()), now() + time::Duration::seconds(DEFAULT_EXPIRES_IN_SECS));
    let edge = time::PrimitiveDateTime::MAX.assume_utc();
    assert!(default_expiry(edge) >= edge);
}

#[test]
fn empty_refresh_token_is_absent() {
    let mut json = session_json();
    json["refresh_token"] = serde_json::json!("");
    assert!(parse_session(&json.to_string(), now()).unwrap().refresh_token.is_none());
}

#[test]
fn missing_access_token_is_protocol_error() {
    let err = parse_session(&user_json().to_string(), now()).unwrap_err();
    assert!(matches!(err, BackendError::Protocol(_)));
}

#[test]
fn empty_access_token_is_protocol_error() {
    let mut json = session_json();
    json["access_token"] = serde_json::json!("");
    assert!(matches!(parse_session(&json.to_string(), now()).unwrap_err(), BackendError::Protocol(_)));
}

#[test]
fn user_without_email_parses_as_malformed_identity() {
    let identity = parse_user(r#"{"id":"u1"}"#).unwrap();
    assert_eq!(identity.id, "u1");
    assert!(!identity.is_well_formed());
}

// =============================================================================
// sign-up
// =============================================================================

#[test]
fn sign_up_with_session() {
    let response = parse_sign_up(&session_json().to_string(), now()).unwrap();
    assert!(response.session.is_some());
    assert_eq!(response.identity.unwrap().email, "user@example.com");
}

#[test]
fn sign_up_awaiting_confirmation_returns_user_only() {
    let response = parse_sign_up(&user_json().to_string(), now()).unwrap();
    assert!(response.session.is_none());
    assert_eq!(response.identity.unwrap().id, "8d0fd2b3-9ca7-4a5f-9b8a-2f6c3f2a1b00");
}

#[test]
fn sign_up_with_empty_identities_means_already_registered() {
    let mut json = user_json();
    json["identities"] = serde_json::json!([]);
    let err = parse_sign_up(&json.to_string(), now()).unwrap_err();
    assert_eq!(err, BackendError::rejected(Some(422), "User already registered"));
}

#[test]
fn sign_up_garbage_is_protocol_error() {
    assert!(matches!(parse_sign_up("[]", now()).unwrap_err(), BackendError::Protocol(_)));
}

// =============================================================================
// error bodies
// =============================================================================

#[test]
fn error_message_prefers_known_fields() {
    let cases = [
        (r#"{"msg":"Email not confirmed"}"#, "Email not confirmed"),
        (r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#, "Invalid login credentials"),
        (r#"{"message":"User already registered"}"#, "User already registered"),
        (r#"{"error":"over_request_rate_limit"}"#, "over_request_rate_limit"),
    ];
    for (body, expected) in cases {
        assert_eq!(error_message(StatusCode::BAD_REQUEST, body), expected);
    }
}

#[test]
fn error_message_falls_back_to_text_or_reason() {
    assert_eq!(error_message(StatusCode::BAD_GATEWAY, "upstream down"), "upstream down");
    assert_eq!(error_message(StatusCode::TOO_MANY_REQUESTS, ""), "Too Many Requests");
    assert_eq!(error_message(StatusCode::INTERNAL_SERVER_ERROR, "{}"), "Internal Server Error");
}

#[test]
fn client_errors_mean_no_session() {
    assert_eq!(no_session_on_client_error(BackendError::rejected(Some(400), "bad refresh")), Ok(None));
    assert!(no_session_on_client_error(BackendError::rejected(Some(503), "down")).is_err());
    assert!(no_session_on_client_error(BackendError::Timeout).is_err());
}

#[test]
fn base_url_gets_api_prefix() {
    let config = BackendConfig {
        url: "https://auth.example.com/".into(),
        anon_key: "anon".into(),
        timeout: Duration::from_secs(10),
    };
    let backend = HttpAuthBackend::new(&config).unwrap();
    assert_eq!(backend.url("/user"), "https://auth.example.com/auth/v1/user");
}
