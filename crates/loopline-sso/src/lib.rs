//! Multi-tenant single sign-on.
//!
//! Lets each organization authenticate its users against its own identity
//! provider over SAML 2.0 or OIDC, with envelope-encrypted credentials,
//! just-in-time provisioning and fixed-lifetime SSO sessions.

pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod saml;
pub mod services;
pub mod state;

pub use error::{SsoError, SsoResult};
pub use router::{
    admin_routes, create_sso_router, federation_routes, SsoModuleConfig, SsoState,
};
pub use services::AuthFlow;
