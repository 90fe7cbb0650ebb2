//! Loopline core library.
//!
//! Shared types used across the Loopline platform crates.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed identifiers (`OrgId`, `UserId`, `TeamId`,
//!   `SsoConfigId`, `SsoSessionId`)

pub mod ids;

pub use ids::{OrgId, ParseIdError, SsoConfigId, SsoSessionId, TeamId, UserId};
