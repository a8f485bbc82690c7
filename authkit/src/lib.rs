//! Session and route-authorization core for the back-office dashboard.
//!
//! ARCHITECTURE
//! ============
//! Leaf first: [`session`] value types, the [`store::SessionStore`] that
//! owns the current session, [`ops::AuthOperations`] that mutate it through
//! an [`backend::AuthBackend`], the [`provider::AuthProvider`] that wires the
//! store to the backend's change feed, and the [`guard::RouteGuard`] that
//! turns store transitions into navigation decisions. The server-side edge
//! filter lives in the `server` crate and shares [`routes::RouteTable`].
//!
//! Nothing here renders UI. A host supplies a [`guard::Navigator`] and reads
//! [`state::AuthState`] snapshots.

pub mod backend;
pub mod error;
pub mod guard;
pub mod monitor;
pub mod ops;
pub mod provider;
pub mod routes;
pub mod session;
pub mod state;
pub mod storage;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backend::{AuthBackend, SignUpResponse};
pub use error::{AuthError, AuthErrorKind, BackendError, Suggestion};
pub use guard::{GuardDecision, GuardOutcome, Navigator, RouteGuard};
pub use monitor::{MonitorConfig, MonitorVerdict, SessionMonitor};
pub use ops::{AuthOperations, SignUpOutcome};
pub use provider::{AuthProvider, ProviderConfig};
pub use routes::{Access, RouteClass, RouteTable, RouteTableError};
pub use session::{Credentials, Identity, Session, SessionEvent, SessionEventKind};
pub use state::{AuthState, Phase};
pub use storage::{ClientStorage, MemoryStorage, StorageError};
pub use store::{SessionStore, Subscription};
