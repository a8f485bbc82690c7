//! Auth credential cookies shared by the edge filter and the auth API.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::{Duration, OffsetDateTime};

use authkit::{Credentials, Session};

pub const ACCESS_COOKIE: &str = "sb-access-token";
pub const REFRESH_COOKIE: &str = "sb-refresh-token";
pub const EXPIRES_COOKIE: &str = "sb-expires-at";

const REFRESH_MAX_AGE: Duration = Duration::days(30);

/// Credentials carried by a request. Empty or unparsable values count as absent.
#[must_use]
pub fn credentials(jar: &CookieJar) -> Credentials {
    let value = |name: &str| {
        jar.get(name)
            .map(Cookie::value)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    };
    Credentials {
        access_token: value(ACCESS_COOKIE),
        refresh_token: value(REFRESH_COOKIE),
        expires_at: value(EXPIRES_COOKIE).and_then(|v| v.parse().ok()),
    }
}

fn build(name: &'static str, value: String, secure: bool, max_age: Duration) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(max_age)
        .build()
}

/// Set all auth cookies for `session`.
#[must_use]
pub fn set_session(jar: CookieJar, session: &Session, secure: bool) -> CookieJar {
    let access_age = session.remaining(OffsetDateTime::now_utc());
    let jar = jar
        .add(build(ACCESS_COOKIE, session.access_token.clone(), secure, access_age))
        .add(build(EXPIRES_COOKIE, session.expires_at.unix_timestamp().to_string(), secure, access_age));
    match &session.refresh_token {
        Some(refresh) => jar.add(build(REFRESH_COOKIE, refresh.clone(), secure, REFRESH_MAX_AGE)),
        None => jar.add(build(REFRESH_COOKIE, String::new(), secure, Duration::ZERO)),
    }
}

/// Expire every auth cookie.
#[must_use]
pub fn clear(jar: CookieJar, secure: bool) -> CookieJar {
    [ACCESS_COOKIE, REFRESH_COOKIE, EXPIRES_COOKIE]
        .into_iter()
        .fold(jar, |jar, name| jar.add(build(name, String::new(), secure, Duration::ZERO)))
}
