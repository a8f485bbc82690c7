//! Session health checks: expiry, inactivity and periodic integrity checks.
//!
//! `SessionMonitor` is pure bookkeeping with explicit `now` arguments; the
//! provider owns the timer and acts on the verdicts.

use std::time::Duration;

use time::OffsetDateTime;

use crate::session::Session;

/// Key under which the last activity time is mirrored to client storage.
pub const LAST_ACTIVITY_KEY: &str = "lastActivity";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Sign out after this long without recorded activity.
    pub inactivity_limit: Duration,
    /// Re-verify the session with the backend this often.
    pub integrity_interval: Duration,
    /// Tick period of the background task.
    pub check_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            inactivity_limit: Duration::from_secs(30 * 60),
            integrity_interval: Duration::from_secs(5 * 60),
            check_interval: Duration::from_secs(60),
        }
    }
}

/// Outcome of one check, highest priority first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonitorVerdict {
    Expired,
    Inactive,
    VerifyIntegrity,
    Healthy,
}

#[derive(Debug)]
pub struct SessionMonitor {
    config: MonitorConfig,
    last_activity: OffsetDateTime,
    last_integrity_check: OffsetDateTime,
}

impl SessionMonitor {
    #[must_use]
    pub fn new(config: MonitorConfig, now: OffsetDateTime) -> Self {
        Self { config, last_activity: now, last_integrity_check: now }
    }

    /// Start from activity recorded before this monitor existed, such as a
    /// previous page load. A stored time in the future is clamped to `now`.
    #[must_use]
    pub fn resume(config: MonitorConfig, last_activity: OffsetDateTime, now: OffsetDateTime) -> Self {
        Self { config, last_activity: last_activity.min(now), last_integrity_check: now }
    }

    #[must_use]
    pub fn config(&self) -> MonitorConfig {
        self.config
    }

    #[must_use]
    pub fn last_activity(&self) -> OffsetDateTime {
        self.last_activity
    }

    pub fn record_activity_at(&mut self, now: OffsetDateTime) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    /// Check `session` at `now`. A `VerifyIntegrity` verdict restarts the
    /// integrity interval. Without a session there is nothing to watch.
    pub fn evaluate_at(&mut self, session: Option<&Session>, now: OffsetDateTime) -> MonitorVerdict {
        let Some(session) = session else {
            return MonitorVerdict::Healthy;
        };
        if session.is_expired(now) {
            MonitorVerdict::Expired
        } else if self.last_activity + self.config.inactivity_limit <= now {
            MonitorVerdict::Inactive
        } else if self.last_integrity_check + self.config.integrity_interval <= now {
            self.last_integrity_check = now;
            MonitorVerdict::VerifyIntegrity
        } else {
            MonitorVerdict::Healthy
        }
    }
}
