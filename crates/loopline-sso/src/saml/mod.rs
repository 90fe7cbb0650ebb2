//! Service-provider side SAML 2.0: request building, response validation,
//! XML signature verification.

pub mod client;
pub mod response;
pub mod signature;

pub use client::{SamlProfile, SamlProviderClient};
