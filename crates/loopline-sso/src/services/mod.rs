//! SSO services: crypto, provider clients, configuration, login flows.

pub mod attributes;
pub mod auth_flow;
pub mod client_cache;
pub mod config_store;
pub mod discovery;
pub mod encryption;
pub mod oidc_client;
pub mod provisioning;
pub mod session;

pub use attributes::MappedAttributes;
pub use auth_flow::{AuthFlow, CompletedLogin, LoginRedirect, LogoutOutcome, OidcCallbackParams};
pub use client_cache::{OidcClientCache, ProviderClientCache, SamlClientCache};
pub use config_store::{ConfigStore, NewSsoConfiguration, SsoConfigurationPatch};
pub use discovery::{DiscoveredEndpoints, DiscoveryService};
pub use encryption::{generate_master_key, generate_master_key_base64, CredentialCipher};
pub use oidc_client::{OidcProviderClient, TokenSet};
pub use provisioning::{ProvisionedUser, Provisioner};
pub use session::SessionManager;
