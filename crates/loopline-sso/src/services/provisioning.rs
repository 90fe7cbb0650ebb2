//! Just-in-time user provisioning.
//!
//! Resolves a federated identity to a local user after a validated login.
//! Everything runs in one transaction: user creation, organization
//! membership and default-team membership land together or not at all.

use crate::error::{SsoError, SsoResult};
use crate::services::attributes::MappedAttributes;
use loopline_db::models::{OrgMembership, Organization, SsoConfiguration, TeamMembership, User};
use sqlx::PgPool;
use tracing::instrument;

/// Outcome of resolving a federated identity.
#[derive(Debug, Clone)]
pub struct ProvisionedUser {
    pub user: User,
    /// True when this login created the account.
    pub newly_created: bool,
}

/// JIT provisioner. Matches on email; never updates fields of an existing
/// account (the IdP does not own accounts that predate federation).
#[derive(Clone)]
pub struct Provisioner {
    pool: PgPool,
}

impl Provisioner {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve the mapped attributes to a local user, creating the account
    /// and memberships if the configuration allows it.
    #[instrument(skip(self, config, attrs), fields(org_id = %config.org_id, config_id = %config.id))]
    pub async fn resolve_user(
        &self,
        config: &SsoConfiguration,
        attrs: &MappedAttributes,
    ) -> SsoResult<ProvisionedUser> {
        let mut tx = self.pool.begin().await?;

        let existing = User::find_by_email(&mut *tx, &attrs.email).await?;

        let (user, newly_created) = match existing {
            Some(user) => (user, false),
            None => {
                if !config.auto_provision {
                    tx.rollback().await.ok();
                    return Err(SsoError::UserNotFoundAutoProvisionDisabled);
                }

                let display_name = attrs.display_name();
                let user = User::create_federated(
                    &mut *tx,
                    &attrs.email,
                    Some(&display_name),
                    attrs.first_name.as_deref(),
                    attrs.last_name.as_deref(),
                    &config.default_role,
                )
                .await
                .map_err(|e| SsoError::ProvisioningFailed(format!("User creation failed: {e}")))?;
                (user, true)
            }
        };

        OrgMembership::ensure(
            &mut *tx,
            config.org_id,
            user.id,
            &config.default_role,
            attrs.employee_id.as_deref(),
            attrs.department.as_deref(),
        )
        .await
        .map_err(|e| {
            SsoError::ProvisioningFailed(format!("Organization membership failed: {e}"))
        })?;

        // Every federated login, not just the first: an organization may gain
        // a default team after the account already exists.
        let org = Organization::find_by_id(&mut *tx, config.org_id)
            .await?
            .ok_or_else(|| {
                SsoError::ProvisioningFailed("Organization does not exist".to_string())
            })?;
        if let Some(team_id) = org.default_team_id {
            TeamMembership::ensure(&mut *tx, team_id, user.id, "member")
                .await
                .map_err(|e| {
                    SsoError::ProvisioningFailed(format!("Team membership failed: {e}"))
                })?;
        }

        tx.commit().await?;

        if newly_created {
            tracing::info!(user_id = %user.id, "Provisioned new federated user");
        }

        Ok(ProvisionedUser {
            user,
            newly_created,
        })
    }
}
