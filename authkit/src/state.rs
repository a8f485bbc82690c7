//! Auth-session state as seen by route guards and identity-aware views.
//!
//! SYSTEM CONTEXT
//! ==============
//! `AuthState` is the snapshot handed to store listeners. Guards must not
//! redirect on it until `phase` is [`Phase::Ready`].

use serde::Serialize;

use crate::error::AuthError;
use crate::session::Identity;

/// Initialization phase of the client's belief about its session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Startup lookup not issued yet.
    #[default]
    Uninitialized,
    /// Startup lookup or an explicit operation in flight.
    Loading,
    Ready,
}

/// Current identity plus loading status and the last operation error.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AuthState {
    pub identity: Option<Identity>,
    pub phase: Phase,
    pub last_error: Option<AuthError>,
}

impl AuthState {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}
