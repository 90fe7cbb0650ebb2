//! HTTP handlers for the SSO API.

pub mod admin;
pub mod federation;

pub use admin::*;
pub use federation::*;
