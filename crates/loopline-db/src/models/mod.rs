//! Database entity models.

pub mod membership;
pub mod organization;
pub mod sso_configuration;
pub mod sso_session;
pub mod user;

pub use membership::{OrgMembership, TeamMembership};
pub use organization::Organization;
pub use sso_configuration::{
    CreateSsoConfiguration, SsoConfiguration, SsoProviderKind, UpdateSsoConfiguration,
};
pub use sso_session::{CreateSsoSession, SsoSession, SsoSessionStatus, SESSION_LIFETIME_HOURS};
pub use user::User;
