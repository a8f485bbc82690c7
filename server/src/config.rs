//! Server configuration parsed from environment variables.
//!
//! Required:
//! - `AUTH_BACKEND_URL`: base URL of the auth service
//! - `AUTH_BACKEND_ANON_KEY`: public API key sent as `apikey`
//!
//! Optional:
//! - `PORT`: default 3000
//! - `AUTH_BACKEND_TIMEOUT_SECS`: default 10
//! - `PUBLIC_ROUTES`: comma-separated prefixes, default `/login,/signup`
//! - `PUBLIC_ENTRY`: default `/login`
//! - `PRIVATE_ENTRY`: default `/dashboard`
//! - `EDGE_LOOKUP_TIMEOUT_MS`: default 2000
//! - `EDGE_FAIL_POLICY`: `open` (default) or `closed`
//! - `COOKIE_SECURE`: default true when `AUTH_BACKEND_URL` is https
//! - `SITE_DIR`: default `./site`

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use authkit::{RouteTable, RouteTableError};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_EDGE_LOOKUP_TIMEOUT_MS: u64 = 2000;
const DEFAULT_PUBLIC_ROUTES: &str = "/login,/signup";
const DEFAULT_PUBLIC_ENTRY: &str = "/login";
const DEFAULT_PRIVATE_ENTRY: &str = "/dashboard";
const DEFAULT_SITE_DIR: &str = "./site";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("route table: {0}")]
    Routes(#[from] RouteTableError),
}

/// What the edge filter does when the session lookup fails or times out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailPolicy {
    /// Let the request through.
    #[default]
    Open,
    /// Treat the request as anonymous.
    Closed,
}

impl FromStr for FailPolicy {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendConfig {
    /// Base URL without a trailing slash.
    pub url: String,
    pub anon_key: String,
    pub timeout: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdgeConfig {
    pub lookup_timeout: Duration,
    pub fail_policy: FailPolicy,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            lookup_timeout: Duration::from_millis(DEFAULT_EDGE_LOOKUP_TIMEOUT_MS),
            fail_policy: FailPolicy::Open,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub backend: BackendConfig,
    pub edge: EdgeConfig,
    pub routes: RouteTable,
    pub cookie_secure: bool,
    pub site_dir: PathBuf,
}

impl ServerConfig {
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value does
    /// not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// As for [`ServerConfig::from_env`].
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let url = required(&var, "AUTH_BACKEND_URL")?.trim_end_matches('/').to_owned();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid { var: "AUTH_BACKEND_URL", value: url });
        }
        let anon_key = required(&var, "AUTH_BACKEND_ANON_KEY")?;
        let backend = BackendConfig {
            timeout: Duration::from_secs(parse_or(&var, "AUTH_BACKEND_TIMEOUT_SECS", DEFAULT_BACKEND_TIMEOUT_SECS)?),
            url,
            anon_key,
        };

        let fail_policy = match var("EDGE_FAIL_POLICY") {
            None => FailPolicy::default(),
            Some(raw) => raw
                .parse()
                .map_err(|()| ConfigError::Invalid { var: "EDGE_FAIL_POLICY", value: raw })?,
        };
        let edge = EdgeConfig {
            lookup_timeout: Duration::from_millis(parse_or(&var, "EDGE_LOOKUP_TIMEOUT_MS", DEFAULT_EDGE_LOOKUP_TIMEOUT_MS)?),
            fail_policy,
        };

        let public = var("PUBLIC_ROUTES").unwrap_or_else(|| DEFAULT_PUBLIC_ROUTES.to_owned());
        let public_entry = var("PUBLIC_ENTRY").unwrap_or_else(|| DEFAULT_PUBLIC_ENTRY.to_owned());
        let private_entry = var("PRIVATE_ENTRY").unwrap_or_else(|| DEFAULT_PRIVATE_ENTRY.to_owned());
        let routes = RouteTable::new(
            public.split(',').map(str::trim).filter(|p| !p.is_empty()),
            public_entry.trim(),
            private_entry.trim(),
        )?;

        let cookie_secure = match var("COOKIE_SECURE") {
            None => backend.url.starts_with("https://"),
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid { var: "COOKIE_SECURE", value: raw })?,
        };

        Ok(Self {
            port: parse_or(&var, "PORT", DEFAULT_PORT)?,
            backend,
            edge,
            routes,
            cookie_secure,
            site_dir: var("SITE_DIR").map_or_else(|| PathBuf::from(DEFAULT_SITE_DIR), PathBuf::from),
        })
    }
}

/// `1/true/yes/on` and `0/false/no/off`, case-insensitive.
pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn required(var: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<String, ConfigError> {
    var(key)
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parse_or<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match var(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var: key, value: raw }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
