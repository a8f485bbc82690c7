//! Adapters for external services used by the HTTP layer.
//!
//! ARCHITECTURE
//! ============
//! Each adapter implements a contract from `authkit` so route handlers and
//! the edge filter stay backend-agnostic.

pub mod gotrue;
