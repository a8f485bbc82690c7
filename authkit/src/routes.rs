//! Route classification shared by the client guard and the edge filter.
//!
//! DESIGN
//! ======
//! One `RouteTable` is built at startup and injected into both enforcement
//! points. Anything not listed as public (and not a static asset) is
//! private. [`RouteTable::access`] is the only place the allow/redirect
//! table is written down.

use std::fmt;

/// How a path is treated by route protection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteClass {
    Public,
    Private,
    /// Never gated.
    StaticAsset,
}

/// Result of checking a path against an authentication state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Access {
    Allow,
    Redirect(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RouteTableError {
    #[error("route prefix must start with '/': {0:?}")]
    NotAbsolute(String),
    #[error("public entry {0:?} is not covered by a public prefix")]
    EntryNotPublic(String),
    #[error("private entry {0:?} is covered by a public prefix")]
    PrivateEntryIsPublic(String),
}

const DEFAULT_PUBLIC: &[&str] = &["/login", "/signup"];
const DEFAULT_ASSET_PREFIXES: &[&str] = &["/pkg/", "/assets/", "/static/", "/_next/"];
const DEFAULT_ASSET_FILES: &[&str] = &["/favicon.ico", "/robots.txt", "/manifest.json"];
const ASSET_EXTENSIONS: &[&str] = &[
    "css", "js", "mjs", "map", "wasm", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "woff", "woff2", "ttf",
];

#[derive(Clone, PartialEq, Eq)]
pub struct RouteTable {
    public: Vec<String>,
    public_entry: String,
    private_entry: String,
    asset_prefixes: Vec<String>,
    asset_files: Vec<String>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            public: owned(DEFAULT_PUBLIC),
            public_entry: "/login".to_owned(),
            private_entry: "/dashboard".to_owned(),
            asset_prefixes: owned(DEFAULT_ASSET_PREFIXES),
            asset_files: owned(DEFAULT_ASSET_FILES),
        }
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("public", &self.public)
            .field("public_entry", &self.public_entry)
            .field("private_entry", &self.private_entry)
            .finish_non_exhaustive()
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

impl RouteTable {
    /// Build a table, rejecting configurations that would loop.
    ///
    /// # Errors
    ///
    /// Returns an error if a prefix or entry is not absolute, if the public
    /// entry is not public, or if the private entry is public.
    pub fn new<I, S>(public: I, public_entry: &str, private_entry: &str) -> Result<Self, RouteTableError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let public: Vec<String> = public
            .into_iter()
            .map(Into::into)
            .map(|p| normalize_prefix(&p))
            .collect();
        for p in public.iter().map(String::as_str).chain([public_entry, private_entry]) {
            if !p.starts_with('/') {
                return Err(RouteTableError::NotAbsolute(p.to_owned()));
            }
        }

        let table = Self {
            public,
            public_entry: public_entry.to_owned(),
            private_entry: private_entry.to_owned(),
            ..Self::default()
        };
        if table.classify(public_entry) != RouteClass::Public {
            return Err(RouteTableError::EntryNotPublic(public_entry.to_owned()));
        }
        if table.classify(private_entry) != RouteClass::Private {
            return Err(RouteTableError::PrivateEntryIsPublic(private_entry.to_owned()));
        }
        Ok(table)
    }

    #[must_use]
    pub fn public_entry(&self) -> &str {
        &self.public_entry
    }

    #[must_use]
    pub fn private_entry(&self) -> &str {
        &self.private_entry
    }

    #[must_use]
    pub fn public_prefixes(&self) -> &[String] {
        &self.public
    }

    #[must_use]
    pub fn classify(&self, path: &str) -> RouteClass {
        let path = strip_query(path);
        if self.is_static_asset(path) {
            RouteClass::StaticAsset
        } else if self.is_public(path) {
            RouteClass::Public
        } else {
            RouteClass::Private
        }
    }

    #[must_use]
    pub fn is_public(&self, path: &str) -> bool {
        let path = strip_query(path);
        self.public.iter().any(|prefix| matches_prefix(path, prefix))
    }

    #[must_use]
    pub fn is_static_asset(&self, path: &str) -> bool {
        let path = strip_query(path);
        if self.asset_files.iter().any(|f| f == path) {
            return true;
        }
        if self.asset_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            return true;
        }
        let last = path.rsplit('/').next().unwrap_or_default();
        last.rsplit_once('.')
            .is_some_and(|(stem, ext)| !stem.is_empty() && ASSET_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
    }

    /// The decision table, for an already-trusted authentication state.
    #[must_use]
    pub fn access(&self, path: &str, authenticated: bool) -> Access {
        match (self.classify(path), authenticated) {
            (RouteClass::StaticAsset, _) | (RouteClass::Private, true) | (RouteClass::Public, false) => Access::Allow,
            (RouteClass::Public, true) => Access::Redirect(self.private_entry.clone()),
            (RouteClass::Private, false) => Access::Redirect(self.public_entry.clone()),
        }
    }
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

/// `/` only matches itself; trailing slashes on configured prefixes are ignored.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim();
    if trimmed.len() > 1 {
        trimmed.trim_end_matches('/').to_owned()
    } else {
        trimmed.to_owned()
    }
}

fn matches_prefix(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return path == "/";
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

#[cfg(test)]
#[path = "routes_test.rs"]
mod tests;
