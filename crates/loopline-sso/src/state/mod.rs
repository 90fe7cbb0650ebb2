//! Ephemeral authorization state for the OIDC login flow.

pub mod store;
pub mod types;

pub use store::{AuthStateStore, InMemoryAuthStateStore, PostgresAuthStateStore};
pub use types::{AuthState, StateStoreError, STATE_TTL_MINUTES};
